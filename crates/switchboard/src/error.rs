//! Unified error type for Switchboard.

use switchboard_dispatch::DispatchError;
use switchboard_protocol::ProtocolError;
use switchboard_session::SessionError;
use switchboard_transport::TransportError;

use crate::StoreError;

/// Top-level error that wraps all crate-specific errors.
///
/// Only caller-input errors (duplicate initialize, unknown account, send on
/// a session that is not ready) and configuration errors reach callers.
/// Transport failures inside background tasks are absorbed there and turn
/// into state transitions or retries.
#[derive(Debug, thiserror::Error)]
pub enum SwitchboardError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("cannot read configuration: {0}")]
    Io(#[from] std::io::Error),
}
