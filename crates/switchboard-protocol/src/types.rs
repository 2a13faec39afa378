//! Core types shared by every Switchboard layer.
//!
//! The transport speaks in loosely-typed JSON frames; everything past the
//! protocol boundary speaks in the types defined here.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Stable identifier of a business account (one messaging session each).
///
/// Newtype over `u64` so an account id can't be confused with a message
/// id or a generation counter. Serializes as the bare number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub u64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Disconnect reasons
// ---------------------------------------------------------------------------

/// Why the transport dropped a session.
///
/// The state machine treats every reason the same way (grace delay, then
/// recovery); the reason is carried for logging and status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    /// The user logged the device out from their phone.
    Logout,
    /// The socket dropped or the network went away.
    NetworkLoss,
    /// Another client took over the session.
    Conflict,
    /// The transport could not be brought up at all.
    ConnectFailed,
    /// Anything the bridge reports that we don't model.
    Other(String),
}

impl DisconnectReason {
    /// Maps the bridge's reason string onto a known variant.
    ///
    /// Matching is case-insensitive; unknown strings become [`Self::Other`].
    pub fn from_wire(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "logout" => Self::Logout,
            "navigation" | "network" | "network_loss" | "timeout" => Self::NetworkLoss,
            "conflict" | "replaced" => Self::Conflict,
            "connect_failed" => Self::ConnectFailed,
            _ => Self::Other(raw.to_string()),
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Logout => write!(f, "logout"),
            Self::NetworkLoss => write!(f, "network loss"),
            Self::Conflict => write!(f, "conflict"),
            Self::ConnectFailed => write!(f, "connect failed"),
            Self::Other(reason) => write!(f, "{reason}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound messages
// ---------------------------------------------------------------------------

/// Classification of an inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    /// Push-to-talk voice note or forwarded audio.
    Voice,
    Image,
    Video,
    Document,
    Other(String),
}

impl MessageKind {
    /// Maps the bridge's message type tag onto a known kind.
    pub fn from_wire(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "chat" | "text" => Self::Text,
            "ptt" | "audio" | "voice" => Self::Voice,
            "image" | "sticker" => Self::Image,
            "video" => Self::Video,
            "document" => Self::Document,
            other => Self::Other(other.to_string()),
        }
    }
}

/// One inbound chat message, already validated at the protocol boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Transport-assigned message id.
    pub id: String,
    /// Chat the message came from (phone-number jid or group jid).
    pub from: String,
    /// Recipient as reported by the transport, usually our own number.
    pub to: Option<String>,
    /// Text body. Empty for media without a caption.
    pub body: String,
    pub kind: MessageKind,
    /// Unix timestamp (seconds) reported by the transport.
    pub timestamp: u64,
    /// Opaque reference the transcriber uses to fetch voice-note audio.
    pub media_ref: Option<String>,
}

impl InboundMessage {
    /// Returns `true` if this message should go through transcription.
    pub fn is_voice(&self) -> bool {
        matches!(self.kind, MessageKind::Voice)
    }
}

// ---------------------------------------------------------------------------
// Transport events
// ---------------------------------------------------------------------------

/// A lifecycle or message event emitted by the transport for one account.
///
/// This is the closed set of inputs the session state machine accepts.
/// Pairing payloads are carried raw here; the state machine validates
/// them with [`PairingCode::parse`](crate::PairingCode::parse) so that an
/// invalid one can be discarded without affecting state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A new pairing (QR) payload, optionally with a rendered image.
    PairingPayload {
        payload: String,
        artifact: Option<String>,
    },
    /// The pairing was scanned and the credentials accepted.
    Authenticated,
    /// Stored credentials were rejected. Irrecoverable without user action.
    AuthFailure { message: String },
    /// The session is fully synced and can send/receive.
    Ready,
    /// The transport dropped the session.
    Disconnected { reason: DisconnectReason },
    /// An inbound chat message.
    IncomingMessage(InboundMessage),
}

impl TransportEvent {
    /// Short name used in log fields.
    pub fn name(&self) -> &'static str {
        match self {
            Self::PairingPayload { .. } => "pairing-payload",
            Self::Authenticated => "authenticated",
            Self::AuthFailure { .. } => "auth-failure",
            Self::Ready => "ready",
            Self::Disconnected { .. } => "disconnected",
            Self::IncomingMessage(_) => "incoming-message",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_id_display() {
        assert_eq!(AccountId(42).to_string(), "A-42");
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_account_id_serializes_transparently() {
        let json = serde_json::to_string(&AccountId(7)).unwrap();
        assert_eq!(json, "7");
    }

    #[test]
    fn test_disconnect_reason_from_wire_known_and_unknown() {
        assert_eq!(DisconnectReason::from_wire("LOGOUT"), DisconnectReason::Logout);
        assert_eq!(DisconnectReason::from_wire("CONFLICT"), DisconnectReason::Conflict);
        assert_eq!(
            DisconnectReason::from_wire("NAVIGATION"),
            DisconnectReason::NetworkLoss
        );
        assert_eq!(
            DisconnectReason::from_wire("UNPAIRED_IDLE"),
            DisconnectReason::Other("UNPAIRED_IDLE".into())
        );
    }

    #[test]
    fn test_message_kind_from_wire_voice_aliases() {
        assert_eq!(MessageKind::from_wire("ptt"), MessageKind::Voice);
        assert_eq!(MessageKind::from_wire("audio"), MessageKind::Voice);
        assert_eq!(MessageKind::from_wire("chat"), MessageKind::Text);
        assert_eq!(
            MessageKind::from_wire("location"),
            MessageKind::Other("location".into())
        );
    }

    #[test]
    fn test_is_voice_only_for_voice_kind() {
        let mut msg = InboundMessage {
            id: "m1".into(),
            from: "5511999999999@c.us".into(),
            to: None,
            body: String::new(),
            kind: MessageKind::Voice,
            timestamp: 0,
            media_ref: None,
        };
        assert!(msg.is_voice());
        msg.kind = MessageKind::Text;
        assert!(!msg.is_voice());
    }
}
