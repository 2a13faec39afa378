/// Errors that can occur in the transport layer.
///
/// The session layer absorbs all of these: a connect failure becomes a
/// disconnect, a timeout becomes a failed probe. Only `send_message`
/// surfaces them to an external caller.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The transport could not be brought up for an account.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// Sending a command or message failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// The underlying connection is gone.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// A bounded-time operation exceeded its deadline.
    #[error("transport operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// A frame could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] switchboard_protocol::ProtocolError),
}
