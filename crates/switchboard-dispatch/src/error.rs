//! Error types for the dispatch layer.

use std::time::Duration;

use switchboard_protocol::AccountId;

use crate::DispatchStep;

/// Failure reported by a downstream consumer.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{consumer}: {message}")]
pub struct ConsumerError {
    pub consumer: &'static str,
    pub message: String,
}

impl ConsumerError {
    pub fn new(consumer: &'static str, message: impl Into<String>) -> Self {
        Self {
            consumer,
            message: message.into(),
        }
    }
}

/// Errors that can occur in the dispatch pipeline.
///
/// Step failures never propagate past the pipeline: they are logged and
/// the next step runs. Only the enqueue side can return an error to the
/// caller.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The pipeline was shut down.
    #[error("dispatch pipeline is shut down")]
    ShutDown,

    /// The account's worker stopped before the message could be queued.
    #[error("dispatch queue for account {0} is closed")]
    QueueClosed(AccountId),

    #[error("{step} step failed: {source}")]
    StepFailed {
        step: DispatchStep,
        source: ConsumerError,
    },

    #[error("{step} step timed out after {after:?}")]
    StepTimedOut { step: DispatchStep, after: Duration },

    #[error("{step} step panicked")]
    StepPanicked { step: DispatchStep },
}
