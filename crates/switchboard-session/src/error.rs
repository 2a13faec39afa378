//! Error types for the session layer.

use switchboard_protocol::AccountId;

use crate::SessionState;

/// Errors that can occur while managing sessions.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// `create` was called for an account that already has a session.
    /// Returned to the caller, never retried.
    #[error("account {0} already has a session")]
    AlreadyExists(AccountId),

    /// An explicit operation named an account with no session.
    #[error("no session for account {0}")]
    NotFound(AccountId),

    /// A background task targeted a session that was removed (or replaced
    /// by a newer incarnation) while it was running. Callers treat this as
    /// a no-op.
    #[error("session for account {0} was removed")]
    Removed(AccountId),

    /// The state table does not allow this move.
    #[error("illegal transition {from} -> {to} for account {account}")]
    InvalidTransition {
        account: AccountId,
        from: SessionState,
        to: SessionState,
    },

    /// The operation needs a `Ready` session.
    #[error("account {account} is not ready (state: {state})")]
    NotReady {
        account: AccountId,
        state: SessionState,
    },
}
