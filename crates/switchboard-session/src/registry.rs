//! The session registry: the single source of truth for which accounts
//! have a live session.
//!
//! Besides the [`Session`] records, the registry owns everything that can
//! act on a session later: its transport handle and the abort handles of
//! its background tasks (event driver, keep-alive, grace timer). Removal
//! takes the entry out of the map and then aborts every one of those tasks
//! in the same call, so nothing can fire against a session once it is gone.
//!
//! # Generations
//!
//! Every session gets a fresh generation number when it is created or
//! recreated. Background tasks remember the generation they were started
//! for and pass it to every mutating call; a mismatch (or a missing entry)
//! yields [`SessionError::Removed`], which callers treat as a no-op. This
//! closes the window between a task waking up and the abort reaching it.
//!
//! # Concurrency note
//!
//! `SessionRegistry` is NOT thread-safe by itself. The manager keeps it
//! behind a mutex and never holds that lock across an `.await`, so the
//! critical sections stay short and unrelated accounts never wait on each
//! other's transport calls.

use std::collections::HashMap;
use std::sync::Arc;

use switchboard_protocol::{AccountId, DisconnectReason};
use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::{PingStats, Session, SessionError, SessionState, SessionSummary};

/// Background tasks a session can own, at most one of each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerKind {
    /// Consumes the transport's event channel.
    Driver,
    /// Periodic liveness probe. Only attached while `Ready`.
    KeepAlive,
    /// The delay between `Disconnected` and `Reconnecting`.
    Grace,
}

struct Entry<H> {
    session: Session,
    handle: Option<Arc<H>>,
    timers: HashMap<TimerKind, AbortHandle>,
}

impl<H> Entry<H> {
    fn cancel_timers(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.abort();
        }
    }
}

/// What was left of a session after [`SessionRegistry::remove`].
pub struct Removed<H> {
    /// Final snapshot, with state `Terminated`.
    pub session: Session,
    /// The transport handle, for the caller to tear down.
    pub handle: Option<Arc<H>>,
}

/// Owns every live session, keyed by account.
///
/// `H` is the transport handle type.
pub struct SessionRegistry<H> {
    entries: HashMap<AccountId, Entry<H>>,
    next_generation: u64,
}

impl<H> Default for SessionRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> SessionRegistry<H> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            next_generation: 1,
        }
    }

    fn bump_generation(&mut self) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        generation
    }

    /// Registers a new session in `Created`.
    ///
    /// # Errors
    /// [`SessionError::AlreadyExists`] if the account already has one.
    pub fn create(
        &mut self,
        account: AccountId,
        name: impl Into<String>,
        now: Instant,
    ) -> Result<Session, SessionError> {
        if self.entries.contains_key(&account) {
            return Err(SessionError::AlreadyExists(account));
        }
        let generation = self.bump_generation();
        let session = Session::new(account, name.into(), SessionState::Created, generation, now);
        self.entries.insert(
            account,
            Entry {
                session: session.clone(),
                handle: None,
                timers: HashMap::new(),
            },
        );
        tracing::info!(%account, generation, "session created");
        Ok(session)
    }

    /// Replaces generation `generation` of `account` with a fresh session
    /// in `Reconnecting`, keeping its name.
    ///
    /// The old entry's tasks are aborted and its transport handle is
    /// returned for teardown.
    ///
    /// # Errors
    /// [`SessionError::Removed`] if that generation is no longer live.
    pub fn recreate(
        &mut self,
        account: AccountId,
        generation: u64,
        now: Instant,
    ) -> Result<(Session, Option<Arc<H>>), SessionError> {
        self.live(account, generation)?;
        let new_generation = self.bump_generation();
        let Some(mut old) = self.entries.remove(&account) else {
            return Err(SessionError::Removed(account));
        };
        old.cancel_timers();

        let session = Session::new(
            account,
            old.session.name,
            SessionState::Reconnecting,
            new_generation,
            now,
        );
        self.entries.insert(
            account,
            Entry {
                session: session.clone(),
                handle: None,
                timers: HashMap::new(),
            },
        );
        tracing::info!(
            %account,
            old_generation = generation,
            generation = new_generation,
            "session recreated for recovery"
        );
        Ok((session, old.handle))
    }

    /// Removes the session and aborts all of its tasks.
    ///
    /// Returns `None` if the account had no session.
    pub fn remove(&mut self, account: AccountId) -> Option<Removed<H>> {
        let mut entry = self.entries.remove(&account)?;
        entry.cancel_timers();
        entry.session.state = SessionState::Terminated;
        tracing::info!(%account, generation = entry.session.generation, "session removed");
        Some(Removed {
            session: entry.session,
            handle: entry.handle,
        })
    }

    /// Removes every session. Used on shutdown.
    pub fn drain(&mut self) -> Vec<Removed<H>> {
        let mut accounts: Vec<AccountId> = self.entries.keys().copied().collect();
        accounts.sort();
        accounts
            .into_iter()
            .filter_map(|account| self.remove(account))
            .collect()
    }

    /// Snapshot of the session for `account`.
    pub fn get(&self, account: AccountId) -> Option<Session> {
        self.entries.get(&account).map(|e| e.session.clone())
    }

    pub fn state(&self, account: AccountId) -> Option<SessionState> {
        self.entries.get(&account).map(|e| e.session.state)
    }

    pub fn generation(&self, account: AccountId) -> Option<u64> {
        self.entries.get(&account).map(|e| e.session.generation)
    }

    pub fn contains(&self, account: AccountId) -> bool {
        self.entries.contains_key(&account)
    }

    /// Every registered session, ordered by account id.
    pub fn list_active(&self) -> Vec<SessionSummary> {
        let mut list: Vec<SessionSummary> =
            self.entries.values().map(|e| e.session.summary()).collect();
        list.sort_by_key(|s| s.account_id);
        list
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn live(&self, account: AccountId, generation: u64) -> Result<&Entry<H>, SessionError> {
        match self.entries.get(&account) {
            Some(entry) if entry.session.generation == generation => Ok(entry),
            _ => Err(SessionError::Removed(account)),
        }
    }

    fn live_mut(
        &mut self,
        account: AccountId,
        generation: u64,
    ) -> Result<&mut Entry<H>, SessionError> {
        match self.entries.get_mut(&account) {
            Some(entry) if entry.session.generation == generation => Ok(entry),
            _ => Err(SessionError::Removed(account)),
        }
    }

    /// Moves the session to `to` if the state table allows it.
    ///
    /// A move to the current state is accepted and changes nothing.
    /// Leaving `Ready` aborts the keep-alive task. Returns the previous
    /// state.
    ///
    /// # Errors
    /// - [`SessionError::Removed`]: generation no longer live
    /// - [`SessionError::InvalidTransition`]: not in the table
    pub fn transition(
        &mut self,
        account: AccountId,
        generation: u64,
        to: SessionState,
    ) -> Result<SessionState, SessionError> {
        let entry = self.live_mut(account, generation)?;
        let from = entry.session.state;
        if from == to {
            return Ok(from);
        }
        if !from.can_transition_to(to) {
            tracing::warn!(%account, %from, %to, "illegal transition rejected");
            return Err(SessionError::InvalidTransition { account, from, to });
        }

        entry.session.state = to;
        if from == SessionState::Ready {
            if let Some(keepalive) = entry.timers.remove(&TimerKind::KeepAlive) {
                keepalive.abort();
            }
        }
        tracing::info!(%account, %from, %to, "session state changed");
        Ok(from)
    }

    /// Moves the session to `Disconnected` and records why.
    pub fn mark_disconnected(
        &mut self,
        account: AccountId,
        generation: u64,
        reason: DisconnectReason,
    ) -> Result<SessionState, SessionError> {
        let from = self.transition(account, generation, SessionState::Disconnected)?;
        let entry = self.live_mut(account, generation)?;
        entry.session.last_disconnect = Some(reason);
        Ok(from)
    }

    /// Applies `update` to the session's ping stats.
    pub fn update_ping(
        &mut self,
        account: AccountId,
        generation: u64,
        update: impl FnOnce(&mut PingStats),
    ) -> Result<(), SessionError> {
        let entry = self.live_mut(account, generation)?;
        update(&mut entry.session.ping);
        Ok(())
    }

    /// Stores the transport handle for the session.
    ///
    /// # Errors
    /// [`SessionError::Removed`] if the session went away while the
    /// transport was coming up; the caller owns tearing `handle` down.
    pub fn set_handle(
        &mut self,
        account: AccountId,
        generation: u64,
        handle: Arc<H>,
    ) -> Result<(), SessionError> {
        let entry = self.live_mut(account, generation)?;
        entry.handle = Some(handle);
        Ok(())
    }

    /// The current transport handle, if the transport is up.
    pub fn handle(&self, account: AccountId) -> Option<Arc<H>> {
        self.entries.get(&account).and_then(|e| e.handle.clone())
    }

    /// Hands ownership of a spawned task to the session.
    ///
    /// A previous task of the same kind is aborted first. If the session
    /// is no longer live the task is aborted immediately.
    pub fn attach_timer(
        &mut self,
        account: AccountId,
        generation: u64,
        kind: TimerKind,
        timer: AbortHandle,
    ) -> Result<(), SessionError> {
        let entry = match self.live_mut(account, generation) {
            Ok(entry) => entry,
            Err(e) => {
                timer.abort();
                return Err(e);
            }
        };
        if let Some(previous) = entry.timers.insert(kind, timer) {
            previous.abort();
        }
        tracing::trace!(%account, ?kind, "timer attached");
        Ok(())
    }

    /// Aborts and forgets the session's task of `kind`.
    pub fn detach_timer(&mut self, account: AccountId, generation: u64, kind: TimerKind) -> bool {
        let Ok(entry) = self.live_mut(account, generation) else {
            return false;
        };
        match entry.timers.remove(&kind) {
            Some(timer) => {
                timer.abort();
                true
            }
            None => false,
        }
    }

    /// Kinds of the session's tasks that are still running.
    pub fn active_timers(&self, account: AccountId) -> Vec<TimerKind> {
        let Some(entry) = self.entries.get(&account) else {
            return Vec::new();
        };
        let mut kinds: Vec<TimerKind> = entry
            .timers
            .iter()
            .filter(|(_, timer)| !timer.is_finished())
            .map(|(kind, _)| *kind)
            .collect();
        kinds.sort();
        kinds
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    /// Stand-in transport handle.
    #[derive(Debug, PartialEq)]
    struct FakeHandle(u32);

    fn registry() -> SessionRegistry<FakeHandle> {
        SessionRegistry::new()
    }

    fn acct(id: u64) -> AccountId {
        AccountId(id)
    }

    fn parked_task() -> tokio::task::JoinHandle<()> {
        tokio::spawn(std::future::pending::<()>())
    }

    /// Walks a fresh session up to `Ready`.
    fn ready(reg: &mut SessionRegistry<FakeHandle>, account: AccountId) -> u64 {
        let generation = reg.create(account, "shop", Instant::now()).unwrap().generation;
        for to in [
            SessionState::Authenticating,
            SessionState::AwaitingScan,
            SessionState::Authenticated,
            SessionState::Ready,
        ] {
            reg.transition(account, generation, to).unwrap();
        }
        generation
    }

    // =====================================================================
    // create() / get()
    // =====================================================================

    #[tokio::test]
    async fn test_create_new_account_returns_created_session() {
        let mut reg = registry();

        let session = reg.create(acct(42), "bakery", Instant::now()).expect("should create");

        assert_eq!(session.state, SessionState::Created);
        assert_eq!(session.name, "bakery");
        assert_eq!(reg.get(acct(42)), Some(session));
    }

    #[tokio::test]
    async fn test_create_duplicate_returns_already_exists() {
        let mut reg = registry();
        reg.create(acct(1), "a", Instant::now()).unwrap();

        let result = reg.create(acct(1), "a", Instant::now());

        assert!(matches!(result, Err(SessionError::AlreadyExists(a)) if a == acct(1)));
    }

    #[tokio::test]
    async fn test_create_assigns_distinct_generations() {
        let mut reg = registry();
        let g1 = reg.create(acct(1), "a", Instant::now()).unwrap().generation;
        let g2 = reg.create(acct(2), "b", Instant::now()).unwrap().generation;
        assert_ne!(g1, g2);
    }

    // =====================================================================
    // remove()
    // =====================================================================

    #[tokio::test]
    async fn test_remove_returns_terminated_snapshot_and_handle() {
        let mut reg = registry();
        let generation = reg.create(acct(1), "a", Instant::now()).unwrap().generation;
        reg.set_handle(acct(1), generation, Arc::new(FakeHandle(7))).unwrap();

        let removed = reg.remove(acct(1)).expect("should remove");

        assert_eq!(removed.session.state, SessionState::Terminated);
        assert_eq!(removed.handle.as_deref(), Some(&FakeHandle(7)));
        assert!(reg.get(acct(1)).is_none());
        assert!(reg.remove(acct(1)).is_none());
    }

    #[tokio::test]
    async fn test_remove_aborts_every_timer() {
        let mut reg = registry();
        let generation = reg.create(acct(1), "a", Instant::now()).unwrap().generation;
        let driver = parked_task();
        let grace = parked_task();
        reg.attach_timer(acct(1), generation, TimerKind::Driver, driver.abort_handle())
            .unwrap();
        reg.attach_timer(acct(1), generation, TimerKind::Grace, grace.abort_handle())
            .unwrap();

        reg.remove(acct(1));

        assert!(driver.await.unwrap_err().is_cancelled());
        assert!(grace.await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_remove_then_stale_generation_writes_are_refused() {
        let mut reg = registry();
        let generation = reg.create(acct(1), "a", Instant::now()).unwrap().generation;
        reg.remove(acct(1));

        assert!(matches!(
            reg.transition(acct(1), generation, SessionState::Authenticating),
            Err(SessionError::Removed(_))
        ));
        assert!(matches!(
            reg.update_ping(acct(1), generation, |p| p.count += 1),
            Err(SessionError::Removed(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_then_create_old_generation_still_refused() {
        let mut reg = registry();
        let old = reg.create(acct(1), "a", Instant::now()).unwrap().generation;
        reg.remove(acct(1));
        let new = reg.create(acct(1), "a", Instant::now()).unwrap().generation;

        assert!(reg.transition(acct(1), old, SessionState::Authenticating).is_err());
        assert!(reg.transition(acct(1), new, SessionState::Authenticating).is_ok());
    }

    // =====================================================================
    // transition()
    // =====================================================================

    #[tokio::test]
    async fn test_transition_illegal_move_rejected_and_not_applied() {
        let mut reg = registry();
        let generation = reg.create(acct(1), "a", Instant::now()).unwrap().generation;

        let result = reg.transition(acct(1), generation, SessionState::Ready);

        assert!(matches!(
            result,
            Err(SessionError::InvalidTransition {
                from: SessionState::Created,
                to: SessionState::Ready,
                ..
            })
        ));
        assert_eq!(reg.state(acct(1)), Some(SessionState::Created));
    }

    #[tokio::test]
    async fn test_transition_same_state_is_noop() {
        let mut reg = registry();
        let generation = reg.create(acct(1), "a", Instant::now()).unwrap().generation;
        reg.transition(acct(1), generation, SessionState::Authenticating).unwrap();
        reg.transition(acct(1), generation, SessionState::AwaitingScan).unwrap();

        let prev = reg.transition(acct(1), generation, SessionState::AwaitingScan);

        assert_eq!(prev.unwrap(), SessionState::AwaitingScan);
    }

    #[tokio::test]
    async fn test_transition_leaving_ready_aborts_keepalive() {
        let mut reg = registry();
        let generation = ready(&mut reg, acct(1));
        let keepalive = parked_task();
        reg.attach_timer(acct(1), generation, TimerKind::KeepAlive, keepalive.abort_handle())
            .unwrap();

        reg.mark_disconnected(acct(1), generation, DisconnectReason::NetworkLoss)
            .unwrap();

        assert!(keepalive.await.unwrap_err().is_cancelled());
        let session = reg.get(acct(1)).unwrap();
        assert_eq!(session.state, SessionState::Disconnected);
        assert_eq!(session.last_disconnect, Some(DisconnectReason::NetworkLoss));
    }

    #[tokio::test]
    async fn test_transition_terminated_target_rejected() {
        let mut reg = registry();
        let generation = ready(&mut reg, acct(1));

        assert!(reg.transition(acct(1), generation, SessionState::Terminated).is_err());
    }

    // =====================================================================
    // recreate()
    // =====================================================================

    #[tokio::test]
    async fn test_recreate_bumps_generation_and_returns_old_handle() {
        let mut reg = registry();
        let generation = ready(&mut reg, acct(1));
        reg.set_handle(acct(1), generation, Arc::new(FakeHandle(3))).unwrap();
        let driver = parked_task();
        reg.attach_timer(acct(1), generation, TimerKind::Driver, driver.abort_handle())
            .unwrap();

        let (session, old_handle) = reg.recreate(acct(1), generation, Instant::now()).unwrap();

        assert_eq!(session.state, SessionState::Reconnecting);
        assert_eq!(session.name, "shop");
        assert!(session.generation > generation);
        assert_eq!(old_handle.as_deref(), Some(&FakeHandle(3)));
        assert!(reg.handle(acct(1)).is_none());
        assert!(driver.await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_recreate_stale_generation_refused() {
        let mut reg = registry();
        let generation = reg.create(acct(1), "a", Instant::now()).unwrap().generation;
        reg.recreate(acct(1), generation, Instant::now()).unwrap();

        assert!(matches!(
            reg.recreate(acct(1), generation, Instant::now()),
            Err(SessionError::Removed(_))
        ));
    }

    // =====================================================================
    // Timers
    // =====================================================================

    #[tokio::test]
    async fn test_attach_timer_replaces_previous_of_same_kind() {
        let mut reg = registry();
        let generation = reg.create(acct(1), "a", Instant::now()).unwrap().generation;
        let first = parked_task();
        let second = parked_task();

        reg.attach_timer(acct(1), generation, TimerKind::Grace, first.abort_handle())
            .unwrap();
        reg.attach_timer(acct(1), generation, TimerKind::Grace, second.abort_handle())
            .unwrap();

        assert!(first.await.unwrap_err().is_cancelled());
        assert_eq!(reg.active_timers(acct(1)), vec![TimerKind::Grace]);
    }

    #[tokio::test]
    async fn test_attach_timer_to_removed_session_aborts_it() {
        let mut reg = registry();
        let generation = reg.create(acct(1), "a", Instant::now()).unwrap().generation;
        reg.remove(acct(1));
        let task = parked_task();

        let result = reg.attach_timer(acct(1), generation, TimerKind::Driver, task.abort_handle());

        assert!(matches!(result, Err(SessionError::Removed(_))));
        assert!(task.await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_detach_timer_aborts_and_forgets() {
        let mut reg = registry();
        let generation = reg.create(acct(1), "a", Instant::now()).unwrap().generation;
        let task = parked_task();
        reg.attach_timer(acct(1), generation, TimerKind::KeepAlive, task.abort_handle())
            .unwrap();

        assert!(reg.detach_timer(acct(1), generation, TimerKind::KeepAlive));
        assert!(!reg.detach_timer(acct(1), generation, TimerKind::KeepAlive));
        assert!(task.await.unwrap_err().is_cancelled());
    }

    // =====================================================================
    // list_active() / update_ping() / drain()
    // =====================================================================

    #[tokio::test]
    async fn test_list_active_sorted_by_account() {
        let mut reg = registry();
        reg.create(acct(3), "c", Instant::now()).unwrap();
        reg.create(acct(1), "a", Instant::now()).unwrap();

        let list = reg.list_active();

        let ids: Vec<u64> = list.iter().map(|s| s.account_id.0).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(list[0].state, SessionState::Created);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_ping_writes_through() {
        let mut reg = registry();
        let generation = ready(&mut reg, acct(1));

        reg.update_ping(acct(1), generation, |p| {
            p.record_success(Instant::now(), Duration::from_secs(30))
        })
        .unwrap();

        assert_eq!(reg.get(acct(1)).unwrap().ping.count, 1);
    }

    #[tokio::test]
    async fn test_drain_removes_everything() {
        let mut reg = registry();
        reg.create(acct(1), "a", Instant::now()).unwrap();
        reg.create(acct(2), "b", Instant::now()).unwrap();

        let removed = reg.drain();

        assert_eq!(removed.len(), 2);
        assert!(reg.is_empty());
    }
}
