//! The per-account session record and its keep-alive statistics.

use std::time::Duration;

use serde::Serialize;
use switchboard_protocol::{AccountId, DisconnectReason};
use tokio::time::Instant;

use crate::SessionState;

/// Keep-alive probe statistics for one session.
///
/// Written only by the keep-alive monitor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PingStats {
    /// Successful probes since the monitor was attached.
    pub count: u64,
    pub last_success: Option<Instant>,
    pub next_due: Option<Instant>,
    /// `false` between a failed probe and the end of its soft recovery.
    pub active: bool,
    pub consecutive_failures: u32,
}

impl PingStats {
    /// Called when the monitor attaches to a `Ready` session.
    pub fn arm(&mut self, now: Instant, interval: Duration) {
        self.active = true;
        self.next_due = Some(now + interval);
    }

    pub fn record_success(&mut self, now: Instant, interval: Duration) {
        self.count += 1;
        self.last_success = Some(now);
        self.next_due = Some(now + interval);
        self.active = true;
        self.consecutive_failures = 0;
    }

    pub fn record_failure(&mut self) {
        self.active = false;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }

    /// Optimistically re-marks the probe active after a soft refresh.
    pub fn restore_active(&mut self) {
        self.active = true;
    }

    /// A serializable view relative to `now`.
    pub fn status(&self, now: Instant) -> PingStatus {
        PingStatus {
            count: self.count,
            active: self.active,
            consecutive_failures: self.consecutive_failures,
            last_success_secs_ago: self
                .last_success
                .map(|at| now.saturating_duration_since(at).as_secs()),
            next_due_in_secs: self
                .next_due
                .map(|at| at.saturating_duration_since(now).as_secs()),
        }
    }
}

/// Snapshot of [`PingStats`] for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PingStatus {
    pub count: u64,
    pub active: bool,
    pub consecutive_failures: u32,
    pub last_success_secs_ago: Option<u64>,
    pub next_due_in_secs: Option<u64>,
}

/// One account's runtime record.
///
/// Values handed out by the registry are snapshots: mutating one changes
/// nothing in the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub account_id: AccountId,
    pub name: String,
    pub state: SessionState,
    /// Distinguishes this incarnation from earlier ones for the same
    /// account. Background tasks carry the generation they were started
    /// for and their writes are refused once it no longer matches.
    pub generation: u64,
    pub ping: PingStats,
    pub last_disconnect: Option<DisconnectReason>,
    pub created_at: Instant,
}

impl Session {
    pub(crate) fn new(
        account_id: AccountId,
        name: String,
        state: SessionState,
        generation: u64,
        now: Instant,
    ) -> Self {
        Self {
            account_id,
            name,
            state,
            generation,
            ping: PingStats::default(),
            last_disconnect: None,
            created_at: now,
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            account_id: self.account_id,
            name: self.name.clone(),
            state: self.state,
        }
    }
}

/// One row of `list_active`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub account_id: AccountId,
    pub name: String,
    pub state: SessionState,
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_secs(30);

    #[tokio::test(start_paused = true)]
    async fn test_record_success_advances_next_due_and_counts() {
        let mut stats = PingStats::default();
        let now = Instant::now();

        stats.record_success(now, INTERVAL);
        stats.record_success(now + INTERVAL, INTERVAL);

        assert_eq!(stats.count, 2);
        assert_eq!(stats.last_success, Some(now + INTERVAL));
        assert_eq!(stats.next_due, Some(now + INTERVAL * 2));
        assert!(stats.active);
    }

    #[test]
    fn test_record_failure_marks_inactive_until_restored() {
        let mut stats = PingStats {
            active: true,
            ..PingStats::default()
        };

        stats.record_failure();
        stats.record_failure();
        assert!(!stats.active);
        assert_eq!(stats.consecutive_failures, 2);

        stats.restore_active();
        assert!(stats.active);
        assert_eq!(stats.consecutive_failures, 2, "only a success resets the streak");
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_reports_relative_seconds() {
        let mut stats = PingStats::default();
        let start = Instant::now();
        stats.record_success(start, INTERVAL);

        let status = stats.status(start + Duration::from_secs(10));

        assert_eq!(status.last_success_secs_ago, Some(10));
        assert_eq!(status.next_due_in_secs, Some(20));
        assert_eq!(status.count, 1);
    }
}
