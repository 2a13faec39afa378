//! Per-session driver: brings the transport up and turns its event stream
//! into state transitions.
//!
//! One driver task runs per session incarnation. It is owned by the
//! registry entry (as [`TimerKind::Driver`]), so removing or recreating the
//! session aborts it.

use std::ops::ControlFlow;
use std::sync::Arc;

use switchboard_protocol::{AccountId, DisconnectReason, TransportEvent};
use switchboard_session::{SessionError, SessionState, StoreOutcome, TimerKind};
use switchboard_transport::TransportProvider;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::switchboard::{Persist, Shared, remove_session, teardown_best_effort};
use crate::{AccountStore, keepalive, recovery};

/// Spawns the driver for generation `generation` of `account` and hands it
/// to the registry.
pub(crate) async fn start_session<P, S>(
    shared: &Arc<Shared<P, S>>,
    account: AccountId,
    generation: u64,
) where
    P: TransportProvider,
    S: AccountStore,
{
    let task = spawn_driver(Arc::clone(shared), account, generation);
    // Err means the session went away already; attach_timer aborted the task.
    let _ = shared
        .registry
        .lock()
        .await
        .attach_timer(account, generation, TimerKind::Driver, task);
}

fn spawn_driver<P, S>(shared: Arc<Shared<P, S>>, account: AccountId, generation: u64) -> AbortHandle
where
    P: TransportProvider,
    S: AccountStore,
{
    tokio::spawn(run_driver(shared, account, generation)).abort_handle()
}

async fn run_driver<P, S>(shared: Arc<Shared<P, S>>, account: AccountId, generation: u64)
where
    P: TransportProvider,
    S: AccountStore,
{
    if let Err(e) = shared
        .registry
        .lock()
        .await
        .transition(account, generation, SessionState::Authenticating)
    {
        tracing::debug!(%account, generation, error = %e, "driver not started");
        return;
    }

    let (events, mut rx) = mpsc::channel(shared.config.event_buffer);
    let limit = shared.config.connect_timeout();
    let handle = match tokio::time::timeout(limit, shared.provider.connect(account, events)).await {
        Ok(Ok(handle)) => Arc::new(handle),
        Ok(Err(e)) => {
            tracing::warn!(%account, error = %e, "transport connect failed");
            on_disconnected(&shared, account, generation, DisconnectReason::ConnectFailed).await;
            return;
        }
        Err(_) => {
            tracing::warn!(%account, ?limit, "transport connect timed out");
            on_disconnected(&shared, account, generation, DisconnectReason::ConnectFailed).await;
            return;
        }
    };

    let attached = shared
        .registry
        .lock()
        .await
        .set_handle(account, generation, Arc::clone(&handle));
    if attached.is_err() {
        tracing::debug!(%account, generation, "session gone before transport came up");
        teardown_best_effort(&shared, account, &handle).await;
        return;
    }
    tracing::debug!(%account, generation, "transport connected");

    while let Some(event) = rx.recv().await {
        tracing::trace!(%account, event = event.name(), "transport event");
        if handle_event(&shared, account, generation, event).await.is_break() {
            return;
        }
    }

    // The transport dropped its sender without saying why.
    let state = shared.registry.lock().await.state(account);
    if matches!(
        state,
        Some(
            SessionState::Authenticating
                | SessionState::AwaitingScan
                | SessionState::Authenticated
                | SessionState::Ready
        )
    ) {
        on_disconnected(
            &shared,
            account,
            generation,
            DisconnectReason::Other("event stream closed".into()),
        )
        .await;
    }
}

async fn handle_event<P, S>(
    shared: &Arc<Shared<P, S>>,
    account: AccountId,
    generation: u64,
    event: TransportEvent,
) -> ControlFlow<()>
where
    P: TransportProvider,
    S: AccountStore,
{
    match event {
        TransportEvent::PairingPayload { payload, artifact } => {
            // Checked and cached under the registry lock so a payload racing
            // the authentication events is never served.
            let mut registry = shared.registry.lock().await;
            if registry.generation(account) != Some(generation) {
                tracing::debug!(%account, "session replaced, driver stopping");
                return ControlFlow::Break(());
            }
            let state = registry.state(account);
            if !state.is_some_and(SessionState::is_pairing) {
                tracing::debug!(%account, ?state, "pairing payload dropped, session not pairing");
                return ControlFlow::Continue(());
            }
            let outcome = shared.cache.lock().await.store(account, &payload, artifact);
            if let StoreOutcome::Rejected(e) = outcome {
                tracing::warn!(%account, error = %e, "invalid pairing payload ignored");
                return ControlFlow::Continue(());
            }
            let moved = registry.transition(account, generation, SessionState::AwaitingScan);
            settle(account, moved)
        }
        TransportEvent::Authenticated => {
            shared.cache.lock().await.evict(account);
            let moved = shared
                .registry
                .lock()
                .await
                .transition(account, generation, SessionState::Authenticated);
            settle(account, moved)
        }
        TransportEvent::Ready => on_ready(shared, account, generation).await,
        TransportEvent::Disconnected { reason } => {
            on_disconnected(shared, account, generation, reason).await;
            ControlFlow::Continue(())
        }
        TransportEvent::AuthFailure { message } => {
            tracing::warn!(%account, %message, "authentication failed, removing session");
            // Removal aborts this driver, so it runs on its own task.
            let shared = Arc::clone(shared);
            tokio::spawn(async move {
                remove_session(&shared, account, Persist::Yes).await;
            });
            ControlFlow::Break(())
        }
        TransportEvent::IncomingMessage(message) => {
            let state = shared.registry.lock().await.state(account);
            if state != Some(SessionState::Ready) {
                tracing::debug!(
                    %account,
                    message_id = %message.id,
                    ?state,
                    "message dropped, session not ready"
                );
                return ControlFlow::Continue(());
            }
            if let Err(e) = shared.dispatch.on_incoming(account, message).await {
                tracing::warn!(%account, error = %e, "message not dispatched");
            }
            ControlFlow::Continue(())
        }
    }
}

/// Moves to `Ready` and, on the first arrival, arms the keep-alive monitor
/// under the same registry lock.
async fn on_ready<P, S>(
    shared: &Arc<Shared<P, S>>,
    account: AccountId,
    generation: u64,
) -> ControlFlow<()>
where
    P: TransportProvider,
    S: AccountStore,
{
    let mut registry = shared.registry.lock().await;
    let previous = match registry.transition(account, generation, SessionState::Ready) {
        Ok(previous) => previous,
        Err(e) => return settle::<()>(account, Err(e)),
    };
    if previous == SessionState::Ready {
        return ControlFlow::Continue(());
    }

    let interval = shared.config.keepalive_interval();
    let now = shared.clock.now();
    let armed = registry.update_ping(account, generation, |ping| ping.arm(now, interval));
    if armed.is_err() {
        return ControlFlow::Break(());
    }
    let monitor = keepalive::spawn_keepalive(Arc::clone(shared), account, generation);
    let attached = registry.attach_timer(account, generation, TimerKind::KeepAlive, monitor);
    settle(account, attached)
}

/// Records the disconnect and, unless a grace timer is already running,
/// schedules the move to `Reconnecting`.
pub(crate) async fn on_disconnected<P, S>(
    shared: &Arc<Shared<P, S>>,
    account: AccountId,
    generation: u64,
    reason: DisconnectReason,
) where
    P: TransportProvider,
    S: AccountStore,
{
    let mut registry = shared.registry.lock().await;
    match registry.mark_disconnected(account, generation, reason.clone()) {
        Ok(SessionState::Disconnected) => {}
        Ok(_) => {
            let grace = recovery::spawn_grace(Arc::clone(shared), account, generation);
            let _ = registry.attach_timer(account, generation, TimerKind::Grace, grace);
            tracing::info!(
                %account,
                %reason,
                grace_secs = shared.config.reconnect_grace_secs,
                "session disconnected, recovery scheduled"
            );
        }
        Err(SessionError::Removed(_)) => {}
        Err(e) => tracing::debug!(%account, error = %e, "disconnect ignored"),
    }
}

/// `Removed` stops the caller; a rejected transition is already logged by
/// the registry and leaves the driver running.
fn settle<T>(account: AccountId, result: Result<T, SessionError>) -> ControlFlow<()> {
    match result {
        Ok(_) => ControlFlow::Continue(()),
        Err(SessionError::Removed(_)) => {
            tracing::debug!(%account, "session replaced, driver stopping");
            ControlFlow::Break(())
        }
        Err(_) => ControlFlow::Continue(()),
    }
}
