//! Session lifecycle building blocks for Switchboard.
//!
//! This crate holds the synchronous core of the session manager. Nothing
//! in here spawns tasks or talks to a transport; the composition root
//! (`switchboard`) does that and uses these types to decide what is
//! allowed:
//!
//! 1. **State machine**: [`SessionState`] and its transition table
//! 2. **Registry**: [`SessionRegistry`], which owns sessions, their
//!    transport handles and their background tasks
//! 3. **Credential cache**: [`CredentialCache`], pairing payloads with
//!    TTL and regeneration throttle
//! 4. **Reconnect throttle**: [`ReconnectThrottle`], minimum spacing
//!    between recovery attempts
//!
//! # How it fits in the stack
//!
//! ```text
//! Composition root (above)  ← drives sessions with a TransportProvider
//!     ↕
//! Session Layer (this crate)  ← state, timers, caches, throttles
//!     ↕
//! Protocol Layer (below)  ← AccountId, PairingCode, DisconnectReason
//! ```

mod clock;
mod config;
mod credential;
mod error;
mod reconnect;
mod registry;
mod session;
mod state;

pub use clock::{Clock, ManualClock, TokioClock};
pub use config::SessionConfig;
pub use credential::{CredentialCache, CredentialEntry, StoreOutcome};
pub use error::SessionError;
pub use reconnect::ReconnectThrottle;
pub use registry::{Removed, SessionRegistry, TimerKind};
pub use session::{PingStats, PingStatus, Session, SessionSummary};
pub use state::SessionState;
