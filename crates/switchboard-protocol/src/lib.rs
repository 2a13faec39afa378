//! Protocol types for Switchboard.
//!
//! This crate defines the vocabulary every other layer shares:
//!
//! - **Identity** ([`AccountId`]): which business account a session
//!   belongs to.
//! - **Events** ([`TransportEvent`], [`InboundMessage`]): the closed set of
//!   things a transport can tell the session state machine.
//! - **Pairing** ([`PairingCode`]): validated pairing (QR) payloads.
//! - **Wire frames** ([`BridgeFrame`], [`BridgeCommand`]) and the
//!   [`Codec`] that turns them into bytes.
//!
//! ```text
//! Bridge socket (bytes) → BridgeFrame → TransportEvent → session state machine
//! ```

mod codec;
mod error;
mod frame;
mod pairing;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use frame::{BridgeCommand, BridgeFrame};
pub use pairing::{DEFAULT_MIN_PAIRING_LEN, PairingCode};
pub use types::{AccountId, DisconnectReason, InboundMessage, MessageKind, TransportEvent};
