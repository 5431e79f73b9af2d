//! Engine configuration.

use std::time::Duration;

use ferry_transfer::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_SIZE_MB, MAX_RETRIES};
use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// Default delay unit between chunk retries, in milliseconds.
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1000;

/// Tunables of the chunked upload engine.
///
/// Missing fields fall back to the platform defaults: 5 MiB chunks,
/// 3 attempts per chunk, 1 s linear backoff and a 10240 MiB size cap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UploadConfig {
    pub chunk_size_bytes: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub max_size_mb: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size_bytes: DEFAULT_CHUNK_SIZE,
            max_retries: MAX_RETRIES,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            max_size_mb: DEFAULT_MAX_SIZE_MB,
        }
    }
}

impl UploadConfig {
    /// Retry policy derived from this config. At least one attempt is made.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries.max(1),
            Duration::from_millis(self.retry_base_delay_ms),
        )
    }
}
