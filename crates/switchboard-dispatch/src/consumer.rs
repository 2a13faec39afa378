//! Downstream consumers of inbound messages.
//!
//! Each consumer is an external collaborator behind a narrow trait. The
//! traits use `#[async_trait]` so they can be stored as `Arc<dyn _>` and
//! registered independently of each other.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use switchboard_protocol::{AccountId, InboundMessage};

use crate::ConsumerError;

/// Step 1: persists the raw event for analytics.
#[async_trait]
pub trait EventArchive: Send + Sync {
    async fn archive(&self, account: AccountId, message: &InboundMessage)
    -> Result<(), ConsumerError>;
}

/// Step 2: turns a voice note into text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        account: AccountId,
        message: &InboundMessage,
    ) -> Result<String, ConsumerError>;
}

/// Step 3: the automated-reply generator.
#[async_trait]
pub trait AutoReplier: Send + Sync {
    async fn reply(&self, account: AccountId, message: &InboundMessage)
    -> Result<(), ConsumerError>;
}

/// Step 4: ticket creation.
#[async_trait]
pub trait TicketSink: Send + Sync {
    async fn submit(&self, account: AccountId, message: &InboundMessage)
    -> Result<(), ConsumerError>;
}

/// The set of registered consumers. Any of them may be absent; an absent
/// step is skipped.
#[derive(Clone, Default)]
pub struct DispatchConsumers {
    pub(crate) archive: Option<Arc<dyn EventArchive>>,
    pub(crate) transcriber: Option<Arc<dyn Transcriber>>,
    pub(crate) auto_replier: Option<Arc<dyn AutoReplier>>,
    pub(crate) tickets: Option<Arc<dyn TicketSink>>,
}

impl DispatchConsumers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_archive(mut self, archive: Arc<dyn EventArchive>) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn with_transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    pub fn with_auto_replier(mut self, auto_replier: Arc<dyn AutoReplier>) -> Self {
        self.auto_replier = Some(auto_replier);
        self
    }

    pub fn with_tickets(mut self, tickets: Arc<dyn TicketSink>) -> Self {
        self.tickets = Some(tickets);
        self
    }
}

impl fmt::Debug for DispatchConsumers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchConsumers")
            .field("archive", &self.archive.is_some())
            .field("transcriber", &self.transcriber.is_some())
            .field("auto_replier", &self.auto_replier.is_some())
            .field("tickets", &self.tickets.is_some())
            .finish()
    }
}
