//! Codec trait and implementations for bridge frames.
//!
//! A codec converts between Rust types and the bytes that travel over the
//! bridge socket. The bridge speaks JSON today; [`Codec`] keeps the
//! transport independent of that choice.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes Rust values to bytes and decodes bytes back.
///
/// `Send + Sync + 'static` because a codec is shared by every reader task
/// the transport spawns.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or don't
    /// match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ```rust
/// use switchboard_protocol::{BridgeCommand, Codec, JsonCodec};
///
/// let codec = JsonCodec;
/// let cmd = BridgeCommand::Refresh;
/// let bytes = codec.encode(&cmd).unwrap();
/// let decoded: BridgeCommand = codec.decode(&bytes).unwrap();
/// assert_eq!(cmd, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::BridgeFrame;

    #[test]
    fn test_decode_malformed_json_returns_decode_error() {
        let result: Result<BridgeFrame, _> = JsonCodec.decode(b"{not json");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_unknown_tag_returns_decode_error() {
        let result: Result<BridgeFrame, _> = JsonCodec.decode(br#"{"type":"battery"}"#);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }
}
