//! Message dispatch pipeline for Switchboard.
//!
//! Every inbound message on a `Ready` session goes through four steps, in
//! this order:
//!
//! 1. archive the raw event
//! 2. transcribe it if it is a voice note (the transcript, or a fixed
//!    placeholder, replaces the body for the later steps)
//! 3. hand it to the auto-replier
//! 4. hand it to the ticket sink
//!
//! A failing, hanging or panicking step is logged and the next one still
//! runs. Messages of one account are processed in arrival order; accounts
//! do not wait on each other.
//!
//! # Key types
//!
//! - [`DispatchPipeline`]: per-account ordered workers
//! - [`DispatchConsumers`]: the registered collaborators
//! - [`EventArchive`], [`Transcriber`], [`AutoReplier`], [`TicketSink`]:
//!   the collaborator traits

mod config;
mod consumer;
mod error;
mod pipeline;

pub use config::{DEFAULT_VOICE_PLACEHOLDER, DispatchConfig};
pub use consumer::{AutoReplier, DispatchConsumers, EventArchive, TicketSink, Transcriber};
pub use error::{ConsumerError, DispatchError};
pub use pipeline::{DispatchPipeline, DispatchStep};
