//! Reconnection controller.
//!
//! A disconnected session waits out the grace period, moves to
//! `Reconnecting`, and is then replaced by a fresh incarnation. Attempts
//! for one account are spaced by the reconnect throttle; a throttled
//! attempt from the controller waits for the window to reopen and retries.

use std::sync::Arc;
use std::time::Duration;

use switchboard_protocol::AccountId;
use switchboard_session::{SessionError, SessionState};
use switchboard_transport::TransportProvider;
use tokio::task::AbortHandle;

use crate::switchboard::{Shared, teardown_best_effort};
use crate::{AccountStore, driver};

/// Result of one recovery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RecoveryOutcome {
    /// The session was recreated and a new driver started.
    Started,
    /// Refused by the throttle; the window reopens after this long.
    Throttled(Duration),
    /// The generation is no longer live.
    Gone,
}

pub(crate) fn spawn_grace<P, S>(
    shared: Arc<Shared<P, S>>,
    account: AccountId,
    generation: u64,
) -> AbortHandle
where
    P: TransportProvider,
    S: AccountStore,
{
    tokio::spawn(run_grace(shared, account, generation)).abort_handle()
}

async fn run_grace<P, S>(shared: Arc<Shared<P, S>>, account: AccountId, generation: u64)
where
    P: TransportProvider,
    S: AccountStore,
{
    tokio::time::sleep(shared.config.reconnect_grace()).await;

    let moved = shared
        .registry
        .lock()
        .await
        .transition(account, generation, SessionState::Reconnecting);
    match moved {
        Ok(_) => schedule_recovery(&shared, account, generation).await,
        Err(SessionError::Removed(_)) => {}
        Err(e) => tracing::debug!(%account, error = %e, "grace expired without reconnect"),
    }
}

/// Starts the controller task for `account`, replacing any earlier one.
async fn schedule_recovery<P, S>(shared: &Arc<Shared<P, S>>, account: AccountId, generation: u64)
where
    P: TransportProvider,
    S: AccountStore,
{
    let task = spawn_recovery(Arc::clone(shared), account, generation);
    if let Some(previous) = shared.recoveries.lock().await.insert(account, task) {
        previous.abort();
    }
}

fn spawn_recovery<P, S>(
    shared: Arc<Shared<P, S>>,
    account: AccountId,
    generation: u64,
) -> AbortHandle
where
    P: TransportProvider,
    S: AccountStore,
{
    tokio::spawn(run_recovery(shared, account, generation)).abort_handle()
}

async fn run_recovery<P, S>(shared: Arc<Shared<P, S>>, account: AccountId, generation: u64)
where
    P: TransportProvider,
    S: AccountStore,
{
    loop {
        match try_recover(&shared, account, generation).await {
            RecoveryOutcome::Started | RecoveryOutcome::Gone => return,
            RecoveryOutcome::Throttled(wait) => {
                tracing::debug!(
                    %account,
                    wait_ms = wait.as_millis() as u64,
                    "recovery waiting for throttle"
                );
                tokio::time::sleep(wait).await;
            }
        }
    }
}

/// One recovery attempt for generation `generation` of `account`.
///
/// Claims a throttle slot, replaces the session with a new incarnation
/// (which aborts the old one's tasks), drops its cached pairing code,
/// tears the old transport down and starts a new driver.
pub(crate) async fn try_recover<P, S>(
    shared: &Arc<Shared<P, S>>,
    account: AccountId,
    generation: u64,
) -> RecoveryOutcome
where
    P: TransportProvider,
    S: AccountStore,
{
    if shared.registry.lock().await.generation(account) != Some(generation) {
        return RecoveryOutcome::Gone;
    }

    {
        let mut throttle = shared.throttle.lock().await;
        if !throttle.try_begin(account) {
            let wait = throttle.remaining(account).unwrap_or_default();
            tracing::info!(%account, wait_secs = wait.as_secs(), "recovery attempt throttled");
            return RecoveryOutcome::Throttled(wait);
        }
    }

    let now = shared.clock.now();
    let recreated = shared.registry.lock().await.recreate(account, generation, now);
    let (session, old_handle) = match recreated {
        Ok(recreated) => recreated,
        Err(_) => return RecoveryOutcome::Gone,
    };
    shared.cache.lock().await.evict(account);

    if let Some(handle) = old_handle {
        teardown_best_effort(shared, account, &handle).await;
    }
    tracing::info!(%account, generation = session.generation, "recovery attempt started");
    driver::start_session(shared, account, session.generation).await;
    RecoveryOutcome::Started
}
