//! Periodic eviction of expired pairing codes.

use std::sync::Arc;

use switchboard_tick::{IntervalConfig, IntervalTicker};
use switchboard_transport::TransportProvider;
use tokio::task::AbortHandle;

use crate::AccountStore;
use crate::switchboard::Shared;

pub(crate) fn spawn_sweeper<P, S>(shared: &Arc<Shared<P, S>>) -> AbortHandle
where
    P: TransportProvider,
    S: AccountStore,
{
    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        let mut ticker =
            IntervalTicker::new(IntervalConfig::every(shared.config.credential_sweep_interval()));
        loop {
            ticker.wait_for_tick().await;
            let evicted = shared.cache.lock().await.sweep_expired();
            if evicted > 0 {
                tracing::debug!(evicted, "expired pairing codes swept");
            }
        }
    })
    .abort_handle()
}
