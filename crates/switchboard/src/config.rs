//! Top-level configuration, loadable from JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};
use switchboard_dispatch::DispatchConfig;
use switchboard_session::SessionConfig;

use crate::{AccountRecord, SwitchboardError};

/// Everything a deployment configures.
///
/// ```json
/// {
///   "session": { "reconnect_grace_secs": 30 },
///   "dispatch": { "queue_capacity": 128 },
///   "accounts": [ { "account_id": 1, "name": "bakery", "status": "active" } ]
/// }
/// ```
///
/// Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchboardConfig {
    pub session: SessionConfig,
    pub dispatch: DispatchConfig,
    /// Seed records for an in-memory account store.
    pub accounts: Vec<AccountRecord>,
}

impl SwitchboardConfig {
    pub fn from_json(json: &str) -> Result<Self, SwitchboardError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SwitchboardError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}
