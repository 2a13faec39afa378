//! Wire frames exchanged with the protocol bridge.
//!
//! The bridge is the sidecar that actually speaks the chat network's
//! protocol. It pushes [`BridgeFrame`]s (lifecycle events and inbound
//! messages) and accepts [`BridgeCommand`]s. Frames are loosely typed on
//! purpose: strings for kinds and reasons, optional fields everywhere.
//! [`BridgeFrame::into_event`] is the single place where a frame becomes a
//! validated [`TransportEvent`].

use serde::{Deserialize, Serialize};

use crate::{DisconnectReason, InboundMessage, MessageKind, ProtocolError, TransportEvent};

/// A frame pushed by the bridge, tagged by its `type` field.
///
/// ```json
/// {"type":"qr","payload":"2@...","artifact":"data:image/png;base64,..."}
/// {"type":"message","id":"ABC","from":"5511...@c.us","body":"hi","kind":"chat","timestamp":1700000000}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeFrame {
    Qr {
        payload: String,
        #[serde(default)]
        artifact: Option<String>,
    },
    Authenticated,
    AuthFailure {
        #[serde(default)]
        message: String,
    },
    Ready,
    Disconnected {
        #[serde(default)]
        reason: String,
    },
    Message {
        id: String,
        from: String,
        #[serde(default)]
        to: Option<String>,
        #[serde(default)]
        body: String,
        #[serde(default = "default_kind")]
        kind: String,
        #[serde(default)]
        timestamp: u64,
        #[serde(default)]
        media_ref: Option<String>,
    },
}

fn default_kind() -> String {
    "chat".to_string()
}

impl BridgeFrame {
    /// Converts the wire frame into a validated event.
    ///
    /// # Errors
    /// [`ProtocolError::InvalidFrame`] if a message frame has an empty id
    /// or sender.
    pub fn into_event(self) -> Result<TransportEvent, ProtocolError> {
        let event = match self {
            Self::Qr { payload, artifact } => TransportEvent::PairingPayload { payload, artifact },
            Self::Authenticated => TransportEvent::Authenticated,
            Self::AuthFailure { message } => TransportEvent::AuthFailure { message },
            Self::Ready => TransportEvent::Ready,
            Self::Disconnected { reason } => TransportEvent::Disconnected {
                reason: DisconnectReason::from_wire(&reason),
            },
            Self::Message {
                id,
                from,
                to,
                body,
                kind,
                timestamp,
                media_ref,
            } => {
                if id.is_empty() {
                    return Err(ProtocolError::InvalidFrame("message without id".into()));
                }
                if from.is_empty() {
                    return Err(ProtocolError::InvalidFrame(format!(
                        "message {id} without sender"
                    )));
                }
                TransportEvent::IncomingMessage(InboundMessage {
                    id,
                    from,
                    to,
                    body,
                    kind: MessageKind::from_wire(&kind),
                    timestamp,
                    media_ref,
                })
            }
        };
        Ok(event)
    }
}

/// A command sent to the bridge, tagged by its `op` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BridgeCommand {
    /// Send a text message. `id` is generated locally and echoed in logs.
    Send { id: String, to: String, body: String },
    /// Lightweight recovery: ask the bridge to refresh its page/socket
    /// without tearing the session down.
    Refresh,
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{Codec, JsonCodec};

    fn decode(json: &str) -> BridgeFrame {
        JsonCodec.decode(json.as_bytes()).expect("frame should decode")
    }

    #[test]
    fn test_qr_frame_becomes_pairing_payload() {
        let frame = decode(r#"{"type":"qr","payload":"2@abcXYZ123456789012345"}"#);
        let event = frame.into_event().unwrap();
        assert_eq!(
            event,
            TransportEvent::PairingPayload {
                payload: "2@abcXYZ123456789012345".into(),
                artifact: None,
            }
        );
    }

    #[test]
    fn test_disconnected_frame_maps_reason() {
        let frame = decode(r#"{"type":"disconnected","reason":"CONFLICT"}"#);
        assert_eq!(
            frame.into_event().unwrap(),
            TransportEvent::Disconnected {
                reason: DisconnectReason::Conflict
            }
        );
    }

    #[test]
    fn test_message_frame_defaults_kind_to_text() {
        let frame = decode(r#"{"type":"message","id":"m1","from":"55@c.us","body":"hola"}"#);
        match frame.into_event().unwrap() {
            TransportEvent::IncomingMessage(msg) => {
                assert_eq!(msg.kind, MessageKind::Text);
                assert_eq!(msg.body, "hola");
                assert_eq!(msg.to, None);
            }
            other => panic!("expected IncomingMessage, got {other:?}"),
        }
    }

    #[test]
    fn test_voice_message_frame_is_voice() {
        let frame = decode(
            r#"{"type":"message","id":"m2","from":"55@c.us","kind":"ptt","media_ref":"media/1"}"#,
        );
        match frame.into_event().unwrap() {
            TransportEvent::IncomingMessage(msg) => {
                assert!(msg.is_voice());
                assert_eq!(msg.media_ref.as_deref(), Some("media/1"));
            }
            other => panic!("expected IncomingMessage, got {other:?}"),
        }
    }

    #[test]
    fn test_message_frame_without_sender_rejected() {
        let frame = decode(r#"{"type":"message","id":"m3","from":""}"#);
        assert!(matches!(
            frame.into_event(),
            Err(ProtocolError::InvalidFrame(_))
        ));
    }

    #[test]
    fn test_command_serializes_with_op_tag() {
        let cmd = BridgeCommand::Send {
            id: "abc".into(),
            to: "55@c.us".into(),
            body: "hi".into(),
        };
        let json = String::from_utf8(JsonCodec.encode(&cmd).unwrap()).unwrap();
        assert!(json.contains(r#""op":"send""#), "got {json}");
    }
}
