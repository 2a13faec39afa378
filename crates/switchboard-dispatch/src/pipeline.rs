//! The dispatch pipeline: one ordered worker per account.
//!
//! Each account gets its own Tokio task fed by a bounded mpsc queue, the
//! same actor shape the rest of the system uses. Messages for one account
//! are handled strictly in arrival order; different accounts run fully in
//! parallel. Inside a worker every message goes through the steps in a
//! fixed order, each one bounded by a timeout and shielded from panics.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::FutureExt;
use switchboard_protocol::{AccountId, InboundMessage};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use crate::{ConsumerError, DispatchConfig, DispatchConsumers, DispatchError};

/// The pipeline steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStep {
    Archive,
    Transcribe,
    AutoReply,
    Ticket,
}

impl fmt::Display for DispatchStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Archive => "archive",
            Self::Transcribe => "transcribe",
            Self::AutoReply => "auto_reply",
            Self::Ticket => "ticket",
        })
    }
}

/// Fans inbound messages out to the registered consumers.
///
/// Cheap to clone; clones share the same workers.
#[derive(Clone)]
pub struct DispatchPipeline {
    inner: Arc<Inner>,
}

struct Inner {
    steps: Arc<Steps>,
    workers: Mutex<HashMap<AccountId, Worker>>,
    shut_down: AtomicBool,
}

struct Worker {
    queue: mpsc::Sender<InboundMessage>,
    task: JoinHandle<()>,
}

struct Steps {
    consumers: DispatchConsumers,
    config: DispatchConfig,
}

impl DispatchPipeline {
    pub fn new(consumers: DispatchConsumers, config: DispatchConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                steps: Arc::new(Steps {
                    consumers,
                    config: config.validated(),
                }),
                workers: Mutex::new(HashMap::new()),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    /// Queues `message` for `account`'s worker, starting the worker on
    /// first use.
    ///
    /// Waits if the account's queue is full, which keeps the caller (the
    /// session's event loop) from outrunning the consumers.
    ///
    /// # Errors
    /// - [`DispatchError::ShutDown`]: the pipeline was shut down
    /// - [`DispatchError::QueueClosed`]: the worker is gone
    pub async fn on_incoming(
        &self,
        account: AccountId,
        message: InboundMessage,
    ) -> Result<(), DispatchError> {
        let queue = {
            let mut workers = self.inner.workers.lock().await;
            if self.inner.shut_down.load(Ordering::Acquire) {
                return Err(DispatchError::ShutDown);
            }
            workers
                .entry(account)
                .or_insert_with(|| self.spawn_worker(account))
                .queue
                .clone()
        };
        queue
            .send(message)
            .await
            .map_err(|_| DispatchError::QueueClosed(account))
    }

    fn spawn_worker(&self, account: AccountId) -> Worker {
        let (queue, rx) = mpsc::channel(self.inner.steps.config.queue_capacity);
        let steps = Arc::clone(&self.inner.steps);
        let task = tokio::spawn(run_worker(account, rx, steps));
        tracing::debug!(%account, "dispatch worker started");
        Worker { queue, task }
    }

    /// Stops accepting messages for `account`. Already queued messages are
    /// still delivered. Returns whether a worker existed.
    pub async fn close_account(&self, account: AccountId) -> bool {
        self.inner.workers.lock().await.remove(&account).is_some()
    }

    /// Number of accounts with a running worker.
    pub async fn active_workers(&self) -> usize {
        self.inner.workers.lock().await.len()
    }

    /// Refuses new messages and waits until every queued message has gone
    /// through the pipeline.
    pub async fn shutdown(&self) {
        let workers: Vec<Worker> = {
            let mut workers = self.inner.workers.lock().await;
            self.inner.shut_down.store(true, Ordering::Release);
            workers.drain().map(|(_, w)| w).collect()
        };
        let tasks: Vec<JoinHandle<()>> = workers
            .into_iter()
            .map(|Worker { queue, task }| {
                drop(queue);
                task
            })
            .collect();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "dispatch worker ended abnormally");
            }
        }
        tracing::info!("dispatch pipeline shut down");
    }
}

async fn run_worker(account: AccountId, mut rx: mpsc::Receiver<InboundMessage>, steps: Arc<Steps>) {
    while let Some(message) = rx.recv().await {
        steps.run(account, message).await;
    }
    tracing::debug!(%account, "dispatch worker stopped");
}

impl Steps {
    async fn run(&self, account: AccountId, mut message: InboundMessage) {
        tracing::trace!(%account, message_id = %message.id, "dispatching message");

        if let Some(archive) = &self.consumers.archive {
            let result = self
                .guarded(DispatchStep::Archive, archive.archive(account, &message))
                .await;
            log_failure(account, &message, result);
        }

        if message.is_voice() {
            let transcript = match &self.consumers.transcriber {
                Some(transcriber) => {
                    let result = self
                        .guarded(
                            DispatchStep::Transcribe,
                            transcriber.transcribe(account, &message),
                        )
                        .await
                        .and_then(non_empty_transcript);
                    match result {
                        Ok(text) => Some(text),
                        Err(e) => {
                            log_failure::<()>(account, &message, Err(e));
                            None
                        }
                    }
                }
                None => None,
            };
            message.body = transcript.unwrap_or_else(|| self.config.voice_placeholder.clone());
        }

        if let Some(replier) = &self.consumers.auto_replier {
            let result = self
                .guarded(DispatchStep::AutoReply, replier.reply(account, &message))
                .await;
            log_failure(account, &message, result);
        }

        if let Some(tickets) = &self.consumers.tickets {
            let result = self
                .guarded(DispatchStep::Ticket, tickets.submit(account, &message))
                .await;
            log_failure(account, &message, result);
        }
    }

    /// Runs one consumer call with the step timeout, turning a panic into
    /// an error.
    async fn guarded<T, F>(&self, step: DispatchStep, call: F) -> Result<T, DispatchError>
    where
        F: Future<Output = Result<T, ConsumerError>>,
    {
        let limit = self.config.step_timeout();
        match tokio::time::timeout(limit, AssertUnwindSafe(call).catch_unwind()).await {
            Err(_) => Err(DispatchError::StepTimedOut { step, after: limit }),
            Ok(Err(_panic)) => Err(DispatchError::StepPanicked { step }),
            Ok(Ok(Err(source))) => Err(DispatchError::StepFailed { step, source }),
            Ok(Ok(Ok(value))) => Ok(value),
        }
    }
}

fn non_empty_transcript(text: String) -> Result<String, DispatchError> {
    if text.trim().is_empty() {
        return Err(DispatchError::StepFailed {
            step: DispatchStep::Transcribe,
            source: ConsumerError::new("transcriber", "empty transcript"),
        });
    }
    Ok(text)
}

fn log_failure<T>(account: AccountId, message: &InboundMessage, result: Result<T, DispatchError>) {
    if let Err(e) = result {
        tracing::warn!(%account, message_id = %message.id, error = %e, "dispatch step failed");
    }
}
