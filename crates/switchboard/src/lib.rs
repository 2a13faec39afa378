//! # Switchboard
//!
//! Multi-account messaging session lifecycle manager.
//!
//! Each account owns one session on an external messaging transport.
//! Switchboard brings the sessions up, caches the pairing codes a user
//! scans to authenticate, watches `Ready` sessions with a keep-alive probe,
//! recovers dropped sessions after a grace period (at most one attempt per
//! account per spacing window), and fans inbound messages out to
//! downstream consumers in per-account order.
//!
//! The transport is pluggable through [`TransportProvider`]; account
//! records come from an [`AccountStore`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use switchboard::{MemoryAccountStore, SwitchboardBuilder};
//! use switchboard::transport::{WsBridgeConfig, WsBridgeProvider};
//! use switchboard::protocol::AccountId;
//!
//! # async fn run() -> Result<(), switchboard::SwitchboardError> {
//! let provider = WsBridgeProvider::new(WsBridgeConfig::default());
//! let switchboard = SwitchboardBuilder::new().build(provider, MemoryAccountStore::default());
//!
//! switchboard.initialize(AccountId(1), "bakery").await?;
//! if let Some(code) = switchboard.get_credential_artifact(AccountId(1)).await {
//!     println!("scan: {}", code.text);
//! }
//! # Ok(())
//! # }
//! ```

mod config;
mod driver;
mod error;
mod keepalive;
mod recovery;
mod store;
mod sweeper;
mod switchboard;

pub use config::SwitchboardConfig;
pub use error::SwitchboardError;
pub use store::{AccountRecord, AccountStatus, AccountStore, MemoryAccountStore, StoreError};
pub use switchboard::{CredentialArtifact, SessionStatus, Switchboard, SwitchboardBuilder};

pub use switchboard_dispatch as dispatch;
pub use switchboard_protocol as protocol;
pub use switchboard_session as session;
pub use switchboard_transport as transport;
pub use switchboard_transport::TransportProvider;
