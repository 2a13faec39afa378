//! Fixed-period interval ticker for Switchboard.
//!
//! Every periodic loop in Switchboard (per-session keep-alive probes, the
//! credential sweep) is driven by an [`IntervalTicker`]. It adds two
//! things over a bare `tokio::time::interval`:
//!
//! - **Initial jitter.** At process start every active account is
//!   initialized at once; without jitter all of their keep-alive probes
//!   would hit the transport in the same instant, forever.
//! - **Explicit late-tick policy** with counters, so a loop that fell
//!   behind (a probe that took most of the period) is visible in logs.
//!
//! The ticker reads `tokio::time::Instant`, so tests drive it with
//! `tokio::time::pause()` instead of waiting on the wall clock.
//!
//! ```ignore
//! let mut ticker = IntervalTicker::new(IntervalConfig::every(Duration::from_secs(30)));
//! loop {
//!     ticker.wait_for_tick().await;
//!     probe().await;
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What to do when a tick fires later than scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LatePolicy {
    /// Keep the original grid: missed slots are dropped and the next tick
    /// lands on the next grid point after now.
    #[default]
    Skip,
    /// Restart the period from the moment the tick fired. Use when the
    /// period means "time between the end of one run and the next".
    Delay,
}

/// Configuration for an [`IntervalTicker`].
#[derive(Debug, Clone)]
pub struct IntervalConfig {
    /// Time between ticks.
    pub period: Duration,
    pub policy: LatePolicy,
    /// Upper bound of the random delay added to the *first* tick only.
    pub initial_jitter: Duration,
}

impl IntervalConfig {
    /// Shortest period accepted; anything lower is clamped up.
    pub const MIN_PERIOD: Duration = Duration::from_millis(1);

    /// A config ticking every `period`, no jitter, [`LatePolicy::Skip`].
    pub fn every(period: Duration) -> Self {
        Self {
            period,
            policy: LatePolicy::default(),
            initial_jitter: Duration::ZERO,
        }
    }

    pub fn with_policy(mut self, policy: LatePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.initial_jitter = jitter;
        self
    }

    /// Clamps out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`IntervalTicker::new`].
    pub fn validated(mut self) -> Self {
        if self.period < Self::MIN_PERIOD {
            warn!(period = ?self.period, "interval period below minimum, clamping");
            self.period = Self::MIN_PERIOD;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Tick info and metrics
// ---------------------------------------------------------------------------

/// Information about a fired tick.
#[derive(Debug, Clone)]
pub struct TickInfo {
    /// Monotonically increasing tick number (starts at 1).
    pub tick: u64,
    /// How far past its deadline the tick fired.
    pub late_by: Duration,
    /// Whole periods that were skipped because the tick was late.
    pub ticks_skipped: u64,
}

/// Counters for an [`IntervalTicker`].
#[derive(Debug, Clone, Default)]
pub struct TickMetrics {
    pub total_ticks: u64,
    /// Ticks that fired at least one full period late.
    pub total_late: u64,
    pub total_skipped: u64,
}

// ---------------------------------------------------------------------------
// Ticker
// ---------------------------------------------------------------------------

/// Fixed-period ticker. One per periodic loop.
pub struct IntervalTicker {
    config: IntervalConfig,
    tick_count: u64,
    next_tick: Instant,
    metrics: TickMetrics,
}

impl IntervalTicker {
    /// Creates a ticker whose first tick fires one period (plus jitter)
    /// from now.
    pub fn new(config: IntervalConfig) -> Self {
        let config = config.validated();
        let jitter = if config.initial_jitter > Duration::ZERO {
            let max_ms = config.initial_jitter.as_millis().max(1) as u64;
            Duration::from_millis(rand::rng().random_range(0..max_ms))
        } else {
            Duration::ZERO
        };
        let next_tick = Instant::now() + config.period + jitter;

        debug!(
            period_ms = config.period.as_millis() as u64,
            jitter_ms = jitter.as_millis() as u64,
            policy = ?config.policy,
            "interval ticker created"
        );

        Self {
            config,
            tick_count: 0,
            next_tick,
            metrics: TickMetrics::default(),
        }
    }

    /// Waits until the next tick is due.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let deadline = self.next_tick;
        time::sleep_until(deadline).await;

        let now = Instant::now();
        let period = self.config.period;
        let late_by = now.saturating_duration_since(deadline);
        let late_periods = late_by.as_nanos() / period.as_nanos();
        let ticks_skipped = u64::try_from(late_periods).unwrap_or(u64::MAX);
        self.tick_count += 1;

        self.next_tick = match self.config.policy {
            LatePolicy::Skip => {
                let ahead = period.as_nanos().saturating_mul(late_periods + 1);
                u64::try_from(ahead)
                    .ok()
                    .and_then(|nanos| deadline.checked_add(Duration::from_nanos(nanos)))
                    .unwrap_or(now + period)
            }
            LatePolicy::Delay => now + period,
        };

        if ticks_skipped > 0 {
            self.metrics.total_late += 1;
            self.metrics.total_skipped += ticks_skipped;
            warn!(
                tick = self.tick_count,
                skipped = ticks_skipped,
                late_ms = late_by.as_millis() as u64,
                "interval tick fired late"
            );
        }
        self.metrics.total_ticks += 1;
        trace!(tick = self.tick_count, "interval tick fired");

        TickInfo {
            tick: self.tick_count,
            late_by,
            ticks_skipped,
        }
    }

    /// Re-arms the ticker so the next tick fires one full period from now.
    pub fn reset(&mut self) {
        self.next_tick = Instant::now() + self.config.period;
    }

    /// When the next tick is due.
    pub fn next_due(&self) -> Instant {
        self.next_tick
    }

    pub fn period(&self) -> Duration {
        self.config.period
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn metrics(&self) -> &TickMetrics {
        &self.metrics
    }
}
