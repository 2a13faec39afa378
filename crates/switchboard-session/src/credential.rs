//! The pairing credential cache.
//!
//! While a session waits to be scanned the transport keeps emitting fresh
//! pairing payloads. The cache keeps the latest valid one per account so
//! the UI can render it, with three rules:
//!
//! - **Validation.** Only payloads that parse as a
//!   [`PairingCode`] are stored.
//! - **TTL.** An entry is retrievable for `[0, ttl)` after it was
//!   generated and gone at `ttl`.
//! - **Regeneration throttle.** While a stored entry is still valid and
//!   younger than the throttle window, new payloads for the same account
//!   are ignored, so a code the user is scanning is not swapped under them.
//!
//! Entries are replaced wholesale, never edited in place.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use switchboard_protocol::{AccountId, PairingCode, ProtocolError};
use tokio::time::Instant;

use crate::Clock;

/// A cached pairing payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialEntry {
    pub payload: PairingCode,
    /// Rendered form (e.g. a data URL of the QR image), if the transport
    /// produced one.
    pub artifact: Option<String>,
    pub generated_at: Instant,
}

/// What [`CredentialCache::store`] did with a payload.
#[derive(Debug)]
#[must_use]
pub enum StoreOutcome {
    Stored,
    /// A recent valid entry exists; the new payload was ignored.
    Throttled,
    /// The payload failed validation and was discarded.
    Rejected(ProtocolError),
}

impl StoreOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, Self::Stored)
    }
}

/// Per-account pairing payloads with TTL and regeneration throttle.
///
/// Not thread-safe by itself; the manager keeps it behind a mutex.
pub struct CredentialCache {
    entries: HashMap<AccountId, CredentialEntry>,
    ttl: Duration,
    regen_throttle: Duration,
    min_payload_len: usize,
    clock: Arc<dyn Clock>,
}

impl CredentialCache {
    pub fn new(
        ttl: Duration,
        regen_throttle: Duration,
        min_payload_len: usize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            regen_throttle,
            min_payload_len,
            clock,
        }
    }

    /// Validates and stores a payload for `account`.
    pub fn store(
        &mut self,
        account: AccountId,
        raw: &str,
        artifact: Option<String>,
    ) -> StoreOutcome {
        let payload = match PairingCode::parse_with_min_len(raw, self.min_payload_len) {
            Ok(code) => code,
            Err(e) => return StoreOutcome::Rejected(e),
        };

        let now = self.clock.now();
        if let Some(existing) = self.entries.get(&account) {
            let age = now.saturating_duration_since(existing.generated_at);
            if age < self.ttl && age < self.regen_throttle {
                tracing::debug!(%account, age_secs = age.as_secs(), "pairing payload throttled");
                return StoreOutcome::Throttled;
            }
        }

        self.entries.insert(
            account,
            CredentialEntry {
                payload,
                artifact,
                generated_at: now,
            },
        );
        tracing::debug!(%account, "pairing payload cached");
        StoreOutcome::Stored
    }

    /// Returns the entry if it is still inside its TTL; evicts it otherwise.
    pub fn fetch(&mut self, account: AccountId) -> Option<CredentialEntry> {
        let now = self.clock.now();
        let entry = self.entries.get(&account)?;
        if now.saturating_duration_since(entry.generated_at) >= self.ttl {
            self.entries.remove(&account);
            tracing::debug!(%account, "expired pairing payload evicted on fetch");
            return None;
        }
        Some(entry.clone())
    }

    /// Drops the entry for `account`. Returns whether one existed.
    pub fn evict(&mut self, account: AccountId) -> bool {
        self.entries.remove(&account).is_some()
    }

    /// Drops every expired entry and returns how many went.
    pub fn sweep_expired(&mut self) -> usize {
        let now = self.clock.now();
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.generated_at) < ttl);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
