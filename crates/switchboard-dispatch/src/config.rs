//! Dispatch pipeline configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Body substituted for a voice note that could not be transcribed.
pub const DEFAULT_VOICE_PLACEHOLDER: &str = "[voice message could not be transcribed]";

/// Settings for a [`DispatchPipeline`](crate::DispatchPipeline).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Messages buffered per account before `on_incoming` waits.
    pub queue_capacity: usize,
    /// Upper bound on a single consumer call. A step that runs longer is
    /// abandoned and counted as failed.
    pub step_timeout_secs: u64,
    /// Body used for voice notes when transcription fails or no
    /// transcriber is configured.
    pub voice_placeholder: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            step_timeout_secs: 30,
            voice_placeholder: DEFAULT_VOICE_PLACEHOLDER.to_string(),
        }
    }
}

impl DispatchConfig {
    /// Clamps zero capacity and zero timeout up to one.
    pub fn validated(mut self) -> Self {
        if self.queue_capacity == 0 {
            tracing::warn!("dispatch queue_capacity of 0 is not allowed, using 1");
            self.queue_capacity = 1;
        }
        if self.step_timeout_secs == 0 {
            tracing::warn!("dispatch step_timeout_secs of 0 is not allowed, using 1");
            self.step_timeout_secs = 1;
        }
        self
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }
}
