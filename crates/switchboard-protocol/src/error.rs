//! Error types for the protocol layer.
//!
//! Everything that can go wrong between "bytes arrived from the bridge"
//! and "a validated [`TransportEvent`](crate::TransportEvent) exists"
//! lands here. None of these are fatal to a session: the caller logs
//! them and drops the offending frame.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, an unknown `type` tag, or a
    /// missing required field.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// A pairing payload failed format validation.
    ///
    /// Pairing payloads must be longer than the configured minimum and
    /// contain the `@` domain separator. Invalid payloads are discarded.
    #[error("invalid pairing payload: {0}")]
    InvalidPairingPayload(String),

    /// The frame decoded but violates a protocol rule, e.g. an inbound
    /// message with an empty sender.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}
