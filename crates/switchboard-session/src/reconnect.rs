//! Minimum spacing between recovery attempts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use switchboard_protocol::AccountId;
use tokio::time::Instant;

use crate::Clock;

/// Remembers when each account last started a recovery attempt.
///
/// The timestamp is taken when an attempt *starts*, not when it succeeds,
/// so a transport that keeps failing still gets at most one attempt per
/// window. Timestamps outlive the session itself: removing and recreating
/// an account does not reset its window.
pub struct ReconnectThrottle {
    spacing: Duration,
    last_attempt: HashMap<AccountId, Instant>,
    clock: Arc<dyn Clock>,
}

impl ReconnectThrottle {
    pub fn new(spacing: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            spacing,
            last_attempt: HashMap::new(),
            clock,
        }
    }

    /// Claims an attempt slot for `account`.
    ///
    /// Returns `false` without touching state if the previous attempt is
    /// inside the spacing window; otherwise records now and returns `true`.
    pub fn try_begin(&mut self, account: AccountId) -> bool {
        let now = self.clock.now();
        if let Some(last) = self.last_attempt.get(&account) {
            if now.saturating_duration_since(*last) < self.spacing {
                return false;
            }
        }
        self.last_attempt.insert(account, now);
        true
    }

    /// Time left until `account` may attempt again, or `None` if it may
    /// attempt now.
    pub fn remaining(&self, account: AccountId) -> Option<Duration> {
        let last = self.last_attempt.get(&account)?;
        let elapsed = self.clock.now().saturating_duration_since(*last);
        self.spacing.checked_sub(elapsed).filter(|d| !d.is_zero())
    }

    pub fn last_attempt(&self, account: AccountId) -> Option<Instant> {
        self.last_attempt.get(&account).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualClock;

    fn throttle() -> (ReconnectThrottle, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (
            ReconnectThrottle::new(Duration::from_secs(60), clock.clone()),
            clock,
        )
    }

    #[test]
    fn test_try_begin_first_attempt_allowed() {
        let (mut throttle, clock) = throttle();

        assert!(throttle.try_begin(AccountId(1)));
        assert_eq!(throttle.last_attempt(AccountId(1)), Some(clock.now()));
    }

    #[test]
    fn test_try_begin_inside_window_refused() {
        let (mut throttle, clock) = throttle();
        assert!(throttle.try_begin(AccountId(1)));
        let first = throttle.last_attempt(AccountId(1));

        clock.advance(Duration::from_secs(59));

        assert!(!throttle.try_begin(AccountId(1)));
        assert_eq!(
            throttle.last_attempt(AccountId(1)),
            first,
            "a refused attempt must not move the window"
        );
    }

    #[test]
    fn test_try_begin_after_window_allowed() {
        let (mut throttle, clock) = throttle();
        assert!(throttle.try_begin(AccountId(1)));

        clock.advance(Duration::from_secs(60));

        assert!(throttle.try_begin(AccountId(1)));
    }

    #[test]
    fn test_try_begin_accounts_are_independent() {
        let (mut throttle, _clock) = throttle();
        assert!(throttle.try_begin(AccountId(1)));
        assert!(throttle.try_begin(AccountId(2)));
    }

    #[test]
    fn test_remaining_counts_down_to_none() {
        let (mut throttle, clock) = throttle();
        assert_eq!(throttle.remaining(AccountId(1)), None);
        assert!(throttle.try_begin(AccountId(1)));

        clock.advance(Duration::from_secs(45));
        assert_eq!(throttle.remaining(AccountId(1)), Some(Duration::from_secs(15)));

        clock.advance(Duration::from_secs(15));
        assert_eq!(throttle.remaining(AccountId(1)), None);
    }
}
