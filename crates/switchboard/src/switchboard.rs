//! `Switchboard` builder and public API.
//!
//! This is the composition root. It owns the registry, the credential
//! cache, the reconnect throttle and the dispatch pipeline, and hands an
//! `Arc` of all of them to every background task it spawns.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use switchboard_dispatch::{DispatchConfig, DispatchConsumers, DispatchPipeline};
use switchboard_protocol::{AccountId, DisconnectReason};
use switchboard_session::{
    Clock, CredentialCache, PingStatus, ReconnectThrottle, Session, SessionConfig, SessionError,
    SessionRegistry, SessionState, SessionSummary, TimerKind, TokioClock,
};
use switchboard_transport::{MessageAck, TransportError, TransportProvider};
use tokio::sync::Mutex;
use tokio::task::AbortHandle;

use crate::recovery::{RecoveryOutcome, try_recover};
use crate::{AccountStore, SwitchboardConfig, SwitchboardError, driver, sweeper};

/// State shared by the public handle and every background task.
pub(crate) struct Shared<P: TransportProvider, S: AccountStore> {
    pub(crate) provider: P,
    pub(crate) store: S,
    pub(crate) config: SessionConfig,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) registry: Mutex<SessionRegistry<P::Handle>>,
    pub(crate) cache: Mutex<CredentialCache>,
    pub(crate) throttle: Mutex<ReconnectThrottle>,
    /// In-flight recovery tasks. Kept outside the registry because a
    /// recovery replaces the very entry it would otherwise belong to.
    pub(crate) recoveries: Mutex<HashMap<AccountId, AbortHandle>>,
    pub(crate) dispatch: DispatchPipeline,
    sweeper: Mutex<Option<AbortHandle>>,
}

/// Builder for a [`Switchboard`].
///
/// # Example
///
/// ```rust,ignore
/// let switchboard = SwitchboardBuilder::new()
///     .session_config(SessionConfig { reconnect_grace_secs: 10, ..Default::default() })
///     .consumers(DispatchConsumers::new().with_tickets(tickets))
///     .build(WsBridgeProvider::new(bridge), MemoryAccountStore::default());
/// switchboard.start().await?;
/// ```
pub struct SwitchboardBuilder {
    session: SessionConfig,
    dispatch: DispatchConfig,
    consumers: DispatchConsumers,
    clock: Arc<dyn Clock>,
}

impl SwitchboardBuilder {
    pub fn new() -> Self {
        Self {
            session: SessionConfig::default(),
            dispatch: DispatchConfig::default(),
            consumers: DispatchConsumers::default(),
            clock: Arc::new(TokioClock),
        }
    }

    /// Takes the session and dispatch sections of a loaded config.
    pub fn config(mut self, config: &SwitchboardConfig) -> Self {
        self.session = config.session.clone();
        self.dispatch = config.dispatch.clone();
        self
    }

    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session = config;
        self
    }

    pub fn dispatch_config(mut self, config: DispatchConfig) -> Self {
        self.dispatch = config;
        self
    }

    /// Registers the downstream consumers of inbound messages.
    pub fn consumers(mut self, consumers: DispatchConsumers) -> Self {
        self.consumers = consumers;
        self
    }

    /// Replaces the time source used for TTLs, throttles and ping stats.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build<P, S>(self, provider: P, store: S) -> Switchboard<P, S>
    where
        P: TransportProvider,
        S: AccountStore,
    {
        let config = self.session.validated();
        let cache = CredentialCache::new(
            config.credential_ttl(),
            config.credential_regen_throttle(),
            config.min_pairing_payload_len,
            Arc::clone(&self.clock),
        );
        let throttle =
            ReconnectThrottle::new(config.min_reconnect_spacing(), Arc::clone(&self.clock));

        Switchboard {
            shared: Arc::new(Shared {
                provider,
                store,
                clock: self.clock,
                registry: Mutex::new(SessionRegistry::new()),
                cache: Mutex::new(cache),
                throttle: Mutex::new(throttle),
                recoveries: Mutex::new(HashMap::new()),
                dispatch: DispatchPipeline::new(self.consumers, self.dispatch),
                sweeper: Mutex::new(None),
                config,
            }),
        }
    }
}

impl Default for SwitchboardBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Health summary returned by [`Switchboard::get_session_status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    /// A session exists for the account.
    pub initialized: bool,
    pub ready: bool,
    pub authenticated: bool,
    pub state: Option<SessionState>,
    pub ping: Option<PingStatus>,
    pub last_disconnect: Option<DisconnectReason>,
    /// Seconds since the last recovery attempt started, if there was one.
    pub last_reconnect_attempt_secs_ago: Option<u64>,
}

/// The pairing code to show a user, from
/// [`Switchboard::get_credential_artifact`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialArtifact {
    pub text: String,
    pub artifact: Option<String>,
}

/// Multi-account session lifecycle manager.
///
/// Cheap to clone; clones share the same sessions.
pub struct Switchboard<P: TransportProvider, S: AccountStore> {
    shared: Arc<Shared<P, S>>,
}

impl<P: TransportProvider, S: AccountStore> Clone for Switchboard<P, S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<P, S> Switchboard<P, S>
where
    P: TransportProvider,
    S: AccountStore,
{
    /// Initializes every account the store reports active and starts the
    /// credential sweeper. Returns how many sessions were started.
    ///
    /// Accounts that already have a session are skipped.
    pub async fn start(&self) -> Result<usize, SwitchboardError> {
        let accounts = self.shared.store.load_active().await?;
        let mut started = 0;
        for record in accounts {
            match self.initialize(record.account_id, record.name).await {
                Ok(()) => started += 1,
                Err(e) => {
                    tracing::warn!(
                        account = %record.account_id,
                        error = %e,
                        "skipping account at start"
                    )
                }
            }
        }

        let mut slot = self.shared.sweeper.lock().await;
        if slot.is_none() {
            *slot = Some(sweeper::spawn_sweeper(&self.shared));
        }
        tracing::info!(sessions = started, "switchboard started");
        Ok(started)
    }

    /// Registers a session for `account` and starts bringing its transport
    /// up. Returns once the session exists; authentication continues in the
    /// background.
    ///
    /// # Errors
    /// [`SessionError::AlreadyExists`] if the account already has a session.
    pub async fn initialize(
        &self,
        account: AccountId,
        name: impl Into<String>,
    ) -> Result<(), SwitchboardError> {
        let session = {
            let mut registry = self.shared.registry.lock().await;
            registry.create(account, name, self.shared.clock.now())?
        };
        driver::start_session(&self.shared, account, session.generation).await;
        Ok(())
    }

    /// Removes the session, tears its transport down and marks the account
    /// disconnected in the store.
    ///
    /// # Errors
    /// [`SessionError::NotFound`] if the account has no session.
    pub async fn disconnect(&self, account: AccountId) -> Result<(), SwitchboardError> {
        remove_session(&self.shared, account, Persist::Yes)
            .await
            .map(|_| ())
            .ok_or(SwitchboardError::Session(SessionError::NotFound(account)))
    }

    /// Snapshot of the session's health. Never fails: an unknown account is
    /// reported as not initialized.
    pub async fn get_session_status(&self, account: AccountId) -> SessionStatus {
        let session = self.shared.registry.lock().await.get(account);
        let last_attempt = self.shared.throttle.lock().await.last_attempt(account);
        let now = self.shared.clock.now();

        SessionStatus {
            initialized: session.is_some(),
            ready: session.as_ref().is_some_and(|s| s.state == SessionState::Ready),
            authenticated: session.as_ref().is_some_and(|s| s.state.is_authenticated()),
            state: session.as_ref().map(|s| s.state),
            ping: session.as_ref().map(|s| s.ping.status(now)),
            last_disconnect: session.and_then(|s| s.last_disconnect),
            last_reconnect_attempt_secs_ago: last_attempt
                .map(|at| now.saturating_duration_since(at).as_secs()),
        }
    }

    /// The current pairing code for `account`, if one is cached and still
    /// inside its TTL.
    pub async fn get_credential_artifact(&self, account: AccountId) -> Option<CredentialArtifact> {
        let entry = self.shared.cache.lock().await.fetch(account)?;
        Some(CredentialArtifact {
            text: entry.payload.as_str().to_string(),
            artifact: entry.artifact,
        })
    }

    /// Drops the cached pairing code and, if the session is still pairing,
    /// asks the reconnection controller for a fresh transport.
    ///
    /// Returns whether a refresh was started. A refresh inside the
    /// reconnect spacing window is refused like any other attempt.
    ///
    /// # Errors
    /// [`SessionError::NotFound`] if the account has no session.
    pub async fn force_credential_refresh(
        &self,
        account: AccountId,
    ) -> Result<bool, SwitchboardError> {
        let (state, generation) = {
            let registry = self.shared.registry.lock().await;
            match (registry.state(account), registry.generation(account)) {
                (Some(state), Some(generation)) => (state, generation),
                _ => return Err(SessionError::NotFound(account).into()),
            }
        };
        self.shared.cache.lock().await.evict(account);

        if !state.is_pairing() {
            tracing::debug!(%account, %state, "credential refresh skipped, session not pairing");
            return Ok(false);
        }
        let outcome = try_recover(&self.shared, account, generation).await;
        Ok(outcome == RecoveryOutcome::Started)
    }

    /// Every registered session, ordered by account id.
    pub async fn list_active_accounts(&self) -> Vec<SessionSummary> {
        self.shared.registry.lock().await.list_active()
    }

    /// Tears down and recreates the account's session, unless an attempt
    /// for the same account started within the reconnect spacing window.
    ///
    /// Returns `true` if an attempt was started.
    pub async fn attempt_recovery(&self, account: AccountId) -> bool {
        let Some(generation) = self.shared.registry.lock().await.generation(account) else {
            return false;
        };
        try_recover(&self.shared, account, generation).await == RecoveryOutcome::Started
    }

    /// Sends a text message through a `Ready` session.
    ///
    /// # Errors
    /// - [`SessionError::NotFound`] / [`SessionError::NotReady`]
    /// - [`TransportError::Timeout`] if the transport did not answer within
    ///   `send_timeout_secs`
    /// - any other [`TransportError`] from the provider
    pub async fn send_message(
        &self,
        account: AccountId,
        to: &str,
        body: &str,
    ) -> Result<MessageAck, SwitchboardError> {
        let handle = {
            let registry = self.shared.registry.lock().await;
            let state = registry
                .state(account)
                .ok_or(SessionError::NotFound(account))?;
            if state != SessionState::Ready {
                return Err(SessionError::NotReady { account, state }.into());
            }
            registry
                .handle(account)
                .ok_or(SessionError::NotReady { account, state })?
        };

        let limit = self.shared.config.send_timeout();
        let ack = tokio::time::timeout(limit, self.shared.provider.send_message(&handle, to, body))
            .await
            .map_err(|_| TransportError::Timeout(limit))??;
        tracing::debug!(%account, message_id = %ack.message_id, "message sent");
        Ok(ack)
    }

    /// Snapshot of the full session record.
    pub async fn session(&self, account: AccountId) -> Option<Session> {
        self.shared.registry.lock().await.get(account)
    }

    /// Background tasks currently running for the account.
    pub async fn active_timers(&self, account: AccountId) -> Vec<TimerKind> {
        self.shared.registry.lock().await.active_timers(account)
    }

    /// Number of pairing codes held by the credential cache.
    pub async fn cached_credentials(&self) -> usize {
        self.shared.cache.lock().await.len()
    }

    /// Removes every session without touching the store, stops the sweeper
    /// and waits for queued messages to finish dispatching.
    pub async fn shutdown(&self) {
        if let Some(sweeper) = self.shared.sweeper.lock().await.take() {
            sweeper.abort();
        }
        let accounts: Vec<AccountId> = self
            .list_active_accounts()
            .await
            .into_iter()
            .map(|s| s.account_id)
            .collect();
        let mut removed = 0;
        for account in accounts {
            if remove_session(&self.shared, account, Persist::No).await.is_some() {
                removed += 1;
            }
        }
        for (_, recovery) in self.shared.recoveries.lock().await.drain() {
            recovery.abort();
        }
        self.shared.dispatch.shutdown().await;
        tracing::info!(sessions = removed, "switchboard shut down");
    }
}

/// Whether a removal writes `disconnected` to the account store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Persist {
    Yes,
    No,
}

/// The removal path: take the session out of the registry (aborting its
/// tasks), cancel any in-flight recovery, tear the transport down, close
/// its dispatch queue and optionally persist the new status.
pub(crate) async fn remove_session<P, S>(
    shared: &Arc<Shared<P, S>>,
    account: AccountId,
    persist: Persist,
) -> Option<Session>
where
    P: TransportProvider,
    S: AccountStore,
{
    let removed = shared.registry.lock().await.remove(account)?;
    if let Some(recovery) = shared.recoveries.lock().await.remove(&account) {
        recovery.abort();
    }
    shared.cache.lock().await.evict(account);

    if let Some(handle) = &removed.handle {
        teardown_best_effort(shared, account, handle).await;
    }
    shared.dispatch.close_account(account).await;

    if persist == Persist::Yes {
        if let Err(e) = shared.store.mark_disconnected(account).await {
            tracing::warn!(%account, error = %e, "failed to persist disconnected status");
        }
    }
    Some(removed.session)
}

/// Tears a transport handle down, bounded by the teardown timeout.
/// Failures are logged, never raised.
pub(crate) async fn teardown_best_effort<P, S>(
    shared: &Shared<P, S>,
    account: AccountId,
    handle: &P::Handle,
) where
    P: TransportProvider,
    S: AccountStore,
{
    let limit = shared.config.teardown_timeout();
    match tokio::time::timeout(limit, shared.provider.teardown(handle)).await {
        Ok(Ok(())) => tracing::debug!(%account, "transport torn down"),
        Ok(Err(e)) => tracing::warn!(%account, error = %e, "transport teardown failed"),
        Err(_) => tracing::warn!(%account, ?limit, "transport teardown timed out"),
    }
}
