//! Keep-alive monitor for `Ready` sessions.
//!
//! Probes the transport on a fixed interval and records the outcome in the
//! session's ping stats. A failed probe triggers a soft refresh; it never
//! changes the session state. Real disconnects arrive as transport events.

use std::ops::ControlFlow;
use std::sync::Arc;

use switchboard_protocol::AccountId;
use switchboard_session::PingStats;
use switchboard_tick::{IntervalConfig, IntervalTicker, LatePolicy};
use switchboard_transport::TransportProvider;
use tokio::task::AbortHandle;

use crate::AccountStore;
use crate::switchboard::Shared;

pub(crate) fn spawn_keepalive<P, S>(
    shared: Arc<Shared<P, S>>,
    account: AccountId,
    generation: u64,
) -> AbortHandle
where
    P: TransportProvider,
    S: AccountStore,
{
    tokio::spawn(run_keepalive(shared, account, generation)).abort_handle()
}

async fn run_keepalive<P, S>(shared: Arc<Shared<P, S>>, account: AccountId, generation: u64)
where
    P: TransportProvider,
    S: AccountStore,
{
    let interval = shared.config.keepalive_interval();
    let mut ticker = IntervalTicker::new(
        IntervalConfig::every(interval)
            .with_policy(LatePolicy::Delay)
            .with_jitter(interval / 10),
    );
    tracing::debug!(%account, generation, "keep-alive monitor started");

    loop {
        ticker.wait_for_tick().await;
        if probe(&shared, account, generation).await.is_break() {
            tracing::debug!(%account, generation, "keep-alive monitor stopped");
            return;
        }
    }
}

async fn probe<P, S>(shared: &Shared<P, S>, account: AccountId, generation: u64) -> ControlFlow<()>
where
    P: TransportProvider,
    S: AccountStore,
{
    let handle = {
        let registry = shared.registry.lock().await;
        if registry.generation(account) != Some(generation) {
            return ControlFlow::Break(());
        }
        match registry.handle(account) {
            Some(handle) => handle,
            None => return ControlFlow::Break(()),
        }
    };

    let limit = shared.config.probe_timeout();
    let alive = match tokio::time::timeout(limit, shared.provider.query_liveness(&handle)).await {
        Ok(Ok(alive)) => alive,
        Ok(Err(e)) => {
            tracing::debug!(%account, error = %e, "liveness query failed");
            false
        }
        Err(_) => {
            tracing::debug!(%account, ?limit, "liveness query timed out");
            false
        }
    };

    if alive {
        let now = shared.clock.now();
        let interval = shared.config.keepalive_interval();
        return update(shared, account, generation, |ping| {
            ping.record_success(now, interval)
        })
        .await;
    }

    update(shared, account, generation, PingStats::record_failure).await?;
    tracing::warn!(%account, "keep-alive probe failed, soft refresh");
    match tokio::time::timeout(limit, shared.provider.soft_refresh(&handle)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(%account, error = %e, "soft refresh failed"),
        Err(_) => tracing::warn!(%account, ?limit, "soft refresh timed out"),
    }

    tokio::time::sleep(shared.config.keepalive_recovery_delay()).await;
    update(shared, account, generation, PingStats::restore_active).await
}

async fn update<P, S>(
    shared: &Shared<P, S>,
    account: AccountId,
    generation: u64,
    apply: impl FnOnce(&mut PingStats),
) -> ControlFlow<()>
where
    P: TransportProvider,
    S: AccountStore,
{
    match shared.registry.lock().await.update_ping(account, generation, apply) {
        Ok(()) => ControlFlow::Continue(()),
        Err(_) => ControlFlow::Break(()),
    }
}
