use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::shared::ValidationError;

/// Settings for the dispatch buffer that sits between the tokenizer and the row processor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BufferConfig {
    /// Maximum time, in milliseconds, that disposal waits for the delivery worker to exit
    /// before aborting it.
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

impl BufferConfig {
    /// Default upper bound for worker shutdown.
    pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 5_000;

    /// Returns the shutdown timeout as a [`Duration`].
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Validates buffer settings.
    ///
    /// A zero shutdown timeout would abort the worker before it can observe the signal.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.shutdown_timeout_ms == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "buffer.shutdown_timeout_ms".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

fn default_shutdown_timeout_ms() -> u64 {
    BufferConfig::DEFAULT_SHUTDOWN_TIMEOUT_MS
}
