//! Integration tests for the interval ticker.
//!
//! Uses `start_paused = true` so time only moves when every task is idle
//! (auto-advance) or when we call `tokio::time::advance` ourselves.

use std::time::Duration;

use switchboard_tick::{IntervalConfig, IntervalTicker, LatePolicy};
use tokio::time::Instant;

fn every_50ms() -> IntervalConfig {
    IntervalConfig::every(Duration::from_millis(50))
}

// =========================================================================
// IntervalConfig
// =========================================================================

#[test]
fn test_every_defaults_to_skip_without_jitter() {
    let cfg = every_50ms();
    assert_eq!(cfg.policy, LatePolicy::Skip);
    assert_eq!(cfg.initial_jitter, Duration::ZERO);
}

#[test]
fn test_validated_clamps_zero_period() {
    let cfg = IntervalConfig::every(Duration::ZERO).validated();
    assert_eq!(cfg.period, IntervalConfig::MIN_PERIOD);
}

// =========================================================================
// Tick firing
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_first_tick_fires_after_one_period() {
    let start = Instant::now();
    let mut ticker = IntervalTicker::new(every_50ms());

    let info = ticker.wait_for_tick().await;

    assert_eq!(info.tick, 1);
    assert_eq!(info.ticks_skipped, 0);
    assert_eq!(start.elapsed(), Duration::from_millis(50));
}

#[tokio::test(start_paused = true)]
async fn test_ticks_increment_monotonically() {
    let mut ticker = IntervalTicker::new(every_50ms());

    for expected in 1..=5 {
        assert_eq!(ticker.wait_for_tick().await.tick, expected);
    }
    assert_eq!(ticker.tick_count(), 5);
    assert_eq!(ticker.metrics().total_ticks, 5);
}

#[tokio::test(start_paused = true)]
async fn test_jitter_delays_first_tick_within_bound() {
    let start = Instant::now();
    let mut ticker = IntervalTicker::new(every_50ms().with_jitter(Duration::from_millis(20)));

    ticker.wait_for_tick().await;

    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_millis(70), "elapsed {elapsed:?}");
}

// =========================================================================
// Late ticks
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_skip_policy_keeps_original_grid() {
    let start = Instant::now();
    let mut ticker = IntervalTicker::new(every_50ms());

    tokio::time::advance(Duration::from_millis(175)).await;
    let info = ticker.wait_for_tick().await;
    assert_eq!(info.ticks_skipped, 2);
    assert_eq!(ticker.next_due() - start, Duration::from_millis(200));
    assert_eq!(ticker.metrics().total_late, 1);
    assert_eq!(ticker.metrics().total_skipped, 2);

    let info = ticker.wait_for_tick().await;
    assert_eq!(info.tick, 2);
    assert_eq!(info.ticks_skipped, 0);
}

#[tokio::test(start_paused = true)]
async fn test_skip_policy_long_stall_stays_on_grid() {
    let start = Instant::now();
    let mut ticker = IntervalTicker::new(IntervalConfig::every(Duration::from_millis(1)));

    // More missed periods than fit in a u32.
    let stall = Duration::from_secs(60 * 24 * 60 * 60);
    tokio::time::advance(stall).await;
    let info = ticker.wait_for_tick().await;

    assert_eq!(info.ticks_skipped, 5_183_999_999);
    assert!(ticker.next_due() > Instant::now());
    assert_eq!(ticker.next_due() - start, stall + Duration::from_millis(1));
}

#[tokio::test(start_paused = true)]
async fn test_delay_policy_restarts_from_fire_time() {
    let start = Instant::now();
    let mut ticker = IntervalTicker::new(every_50ms().with_policy(LatePolicy::Delay));

    tokio::time::advance(Duration::from_millis(175)).await;
    ticker.wait_for_tick().await;

    assert_eq!(ticker.next_due() - start, Duration::from_millis(225));
}

// =========================================================================
// Reset
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_reset_pushes_next_tick_one_period_out() {
    let start = Instant::now();
    let mut ticker = IntervalTicker::new(every_50ms());

    tokio::time::advance(Duration::from_millis(40)).await;
    ticker.reset();

    ticker.wait_for_tick().await;
    assert_eq!(start.elapsed(), Duration::from_millis(90));
}

// =========================================================================
// select! loop (mirrors the keep-alive monitor)
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_select_loop_stops_on_command() {
    let mut ticker = IntervalTicker::new(every_50ms());
    let (tx, mut rx) = tokio::sync::mpsc::channel::<&str>(1);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(160)).await;
        tx.send("stop").await.ok();
    });

    let mut fired = 0u64;
    loop {
        tokio::select! {
            Some(cmd) = rx.recv() => {
                assert_eq!(cmd, "stop");
                break;
            }
            info = ticker.wait_for_tick() => {
                fired += 1;
                assert_eq!(info.tick, fired);
            }
        }
    }

    assert_eq!(fired, 3);
}
