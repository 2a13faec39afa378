//! Session-layer configuration.
//!
//! Every timing constant the lifecycle manager uses lives here so a
//! deployment can tune it. The defaults are the values the manager has
//! always run with.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use switchboard_protocol::DEFAULT_MIN_PAIRING_LEN;

/// Timing and sizing knobs for sessions.
///
/// Deserializes from a partial object: missing fields take their default.
///
/// ```json
/// { "reconnect_grace_secs": 10, "keepalive_interval_secs": 15 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long a cached pairing payload stays retrievable.
    pub credential_ttl_secs: u64,
    /// A new pairing payload is ignored while a valid entry younger than
    /// this exists.
    pub credential_regen_throttle_secs: u64,
    /// Period of the background sweep that drops expired cache entries.
    pub credential_sweep_interval_secs: u64,
    /// Minimum spacing between two recovery attempts for one account.
    pub min_reconnect_spacing_secs: u64,
    /// Delay between `Disconnected` and `Reconnecting`.
    pub reconnect_grace_secs: u64,
    /// Period of the keep-alive probe on a `Ready` session.
    pub keepalive_interval_secs: u64,
    /// Pause after a soft refresh before the probe is marked active again.
    pub keepalive_recovery_delay_secs: u64,
    /// Upper bound on a single liveness query.
    pub probe_timeout_secs: u64,
    /// Upper bound on bringing a transport up.
    pub connect_timeout_secs: u64,
    /// Upper bound on an outbound send.
    pub send_timeout_secs: u64,
    /// Upper bound on tearing a transport down.
    pub teardown_timeout_secs: u64,
    /// Pairing payloads must be strictly longer than this.
    pub min_pairing_payload_len: usize,
    /// Capacity of each session's transport event channel.
    pub event_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            credential_ttl_secs: 20 * 60,
            credential_regen_throttle_secs: 15 * 60,
            credential_sweep_interval_secs: 10 * 60,
            min_reconnect_spacing_secs: 60,
            reconnect_grace_secs: 30,
            keepalive_interval_secs: 30,
            keepalive_recovery_delay_secs: 5,
            probe_timeout_secs: 10,
            connect_timeout_secs: 60,
            send_timeout_secs: 30,
            teardown_timeout_secs: 10,
            min_pairing_payload_len: DEFAULT_MIN_PAIRING_LEN,
            event_buffer: 256,
        }
    }
}

impl SessionConfig {
    /// Clamps values that would stall or panic the runtime.
    ///
    /// Zero periods and timeouts become one second, a zero event buffer
    /// becomes one, and a regeneration throttle longer than the TTL is cut
    /// down to the TTL. Grace and reconnect spacing may legitimately be
    /// zero and are left alone.
    pub fn validated(mut self) -> Self {
        for (name, value) in [
            ("credential_ttl_secs", &mut self.credential_ttl_secs),
            (
                "credential_sweep_interval_secs",
                &mut self.credential_sweep_interval_secs,
            ),
            ("keepalive_interval_secs", &mut self.keepalive_interval_secs),
            ("probe_timeout_secs", &mut self.probe_timeout_secs),
            ("connect_timeout_secs", &mut self.connect_timeout_secs),
            ("send_timeout_secs", &mut self.send_timeout_secs),
            ("teardown_timeout_secs", &mut self.teardown_timeout_secs),
        ] {
            if *value == 0 {
                tracing::warn!(field = name, "zero duration in session config, using 1s");
                *value = 1;
            }
        }
        if self.event_buffer == 0 {
            tracing::warn!("event_buffer of 0 is not allowed, using 1");
            self.event_buffer = 1;
        }
        if self.credential_regen_throttle_secs > self.credential_ttl_secs {
            tracing::warn!(
                throttle = self.credential_regen_throttle_secs,
                ttl = self.credential_ttl_secs,
                "regeneration throttle exceeds credential TTL, clamping"
            );
            self.credential_regen_throttle_secs = self.credential_ttl_secs;
        }
        self
    }

    pub fn credential_ttl(&self) -> Duration {
        Duration::from_secs(self.credential_ttl_secs)
    }

    pub fn credential_regen_throttle(&self) -> Duration {
        Duration::from_secs(self.credential_regen_throttle_secs)
    }

    pub fn credential_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.credential_sweep_interval_secs)
    }

    pub fn min_reconnect_spacing(&self) -> Duration {
        Duration::from_secs(self.min_reconnect_spacing_secs)
    }

    pub fn reconnect_grace(&self) -> Duration {
        Duration::from_secs(self.reconnect_grace_secs)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }

    pub fn keepalive_recovery_delay(&self) -> Duration {
        Duration::from_secs(self.keepalive_recovery_delay_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub fn teardown_timeout(&self) -> Duration {
        Duration::from_secs(self.teardown_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_documented_constants() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.credential_ttl(), Duration::from_secs(1200));
        assert_eq!(cfg.credential_regen_throttle(), Duration::from_secs(900));
        assert_eq!(cfg.credential_sweep_interval(), Duration::from_secs(600));
        assert_eq!(cfg.min_reconnect_spacing(), Duration::from_secs(60));
        assert_eq!(cfg.reconnect_grace(), Duration::from_secs(30));
        assert_eq!(cfg.keepalive_interval(), Duration::from_secs(30));
        assert_eq!(cfg.probe_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.min_pairing_payload_len, 20);
    }

    #[test]
    fn test_deserialize_partial_object_fills_defaults() {
        let cfg: SessionConfig =
            serde_json::from_str(r#"{"reconnect_grace_secs": 5}"#).expect("should parse");
        assert_eq!(cfg.reconnect_grace_secs, 5);
        assert_eq!(cfg.keepalive_interval_secs, 30);
    }

    #[test]
    fn test_validated_clamps_zero_periods() {
        let cfg = SessionConfig {
            keepalive_interval_secs: 0,
            event_buffer: 0,
            reconnect_grace_secs: 0,
            ..SessionConfig::default()
        }
        .validated();
        assert_eq!(cfg.keepalive_interval_secs, 1);
        assert_eq!(cfg.event_buffer, 1);
        assert_eq!(cfg.reconnect_grace_secs, 0);
    }

    #[test]
    fn test_validated_caps_regen_throttle_at_ttl() {
        let cfg = SessionConfig {
            credential_ttl_secs: 60,
            credential_regen_throttle_secs: 120,
            ..SessionConfig::default()
        }
        .validated();
        assert_eq!(cfg.credential_regen_throttle_secs, 60);
    }
}
