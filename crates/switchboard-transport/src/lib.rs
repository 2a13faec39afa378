//! Transport provider abstraction for Switchboard.
//!
//! Switchboard never speaks the chat network's protocol itself. It drives
//! a [`TransportProvider`]: something that can bring a session up for an
//! account, answer "are you alive?", send a message, nudge a stuck
//! session, and tear it down. Lifecycle events and inbound messages flow
//! back through the per-session [`EventSender`] handed to
//! [`TransportProvider::connect`].
//!
//! # Feature Flags
//!
//! - `websocket` (default): [`WsBridgeProvider`], which talks to a
//!   protocol sidecar over WebSocket via `tokio-tungstenite`.

#![allow(async_fn_in_trait)]

#[cfg(feature = "websocket")]
mod bridge;
mod error;

#[cfg(feature = "websocket")]
pub use bridge::{WsBridgeConfig, WsBridgeHandle, WsBridgeProvider};
pub use error::TransportError;

use std::future::Future;

use rand::Rng;
use switchboard_protocol::{AccountId, TransportEvent};
use tokio::sync::mpsc;

/// Channel a transport uses to push events for one session.
///
/// One channel per session, consumed in order by that session's driver.
pub type EventSender = mpsc::Sender<TransportEvent>;

/// Receiving side of [`EventSender`].
pub type EventReceiver = mpsc::Receiver<TransportEvent>;

/// Acknowledgement returned by [`TransportProvider::send_message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageAck {
    /// Locally generated id the bridge echoes in its own logs.
    pub message_id: String,
    pub to: String,
}

/// The primitives the session manager drives.
///
/// # Trait bounds
///
/// Every method returns a `Send` future because the manager calls them
/// from spawned Tokio tasks (keep-alive probes, recovery attempts).
/// Implementors can simply write `async fn`.
pub trait TransportProvider: Send + Sync + 'static {
    /// Live connection state for one account.
    type Handle: Send + Sync + 'static;

    /// Brings a session up for `account` and starts pushing its events
    /// (pairing payloads, authenticated, ready, disconnected, messages)
    /// into `events`.
    ///
    /// Returning `Ok` means the transport is running, not that the session
    /// is authenticated.
    fn connect(
        &self,
        account: AccountId,
        events: EventSender,
    ) -> impl Future<Output = Result<Self::Handle, TransportError>> + Send;

    /// Lightweight liveness query. `Ok(true)` means the session answered.
    ///
    /// Callers bound this with their own timeout; a timeout counts as a
    /// failed probe.
    fn query_liveness(
        &self,
        handle: &Self::Handle,
    ) -> impl Future<Output = Result<bool, TransportError>> + Send;

    /// Sends a text message to `to`.
    fn send_message(
        &self,
        handle: &Self::Handle,
        to: &str,
        body: &str,
    ) -> impl Future<Output = Result<MessageAck, TransportError>> + Send;

    /// Provider-specific soft recovery (e.g. refresh the page) that does
    /// not tear the session down.
    fn soft_refresh(
        &self,
        handle: &Self::Handle,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Tears the session down. Best-effort: callers log failures and move on.
    fn teardown(
        &self,
        handle: &Self::Handle,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Generates a random 32-character hex message id (128 bits).
pub fn generate_message_id() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
