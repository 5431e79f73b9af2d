//! Per-chunk retry with linear backoff.

use std::time::Duration;

use tracing::{debug, warn};

use crate::backend::TransferBackend;
use crate::error::UploadError;
use crate::signal::CancelSignal;

/// How often, and how patiently, a failing chunk is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Total attempts allowed per chunk, first try included.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait after failed attempt `attempt` (1-indexed): `attempt * base_delay`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// Uploads one chunk, retrying transient failures.
///
/// Returns the number of attempts used. The in-flight call and the backoff
/// sleep are both abandoned as soon as `signal` is raised.
pub(crate) async fn upload_chunk_with_retry(
    backend: &dyn TransferBackend,
    signal: &CancelSignal,
    policy: &RetryPolicy,
    data: &[u8],
    index: usize,
    session_id: &str,
) -> Result<u32, UploadError> {
    let mut attempt = 0;

    loop {
        attempt += 1;
        let result = signal
            .guard(backend.upload_chunk(data, index, session_id))
            .await
            .map_err(UploadError::Cancelled)?;

        match result {
            Ok(()) => {
                if attempt > 1 {
                    debug!(chunk = index, attempt, "chunk succeeded after retry");
                }
                return Ok(attempt);
            }
            Err(e) if attempt < policy.max_attempts() => {
                let delay = policy.delay_after(attempt);
                warn!(
                    chunk = index,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "chunk upload failed, retrying"
                );
                signal
                    .guard(tokio::time::sleep(delay))
                    .await
                    .map_err(UploadError::Cancelled)?;
            }
            Err(e) => {
                return Err(UploadError::Transfer {
                    index,
                    attempts: attempt,
                    last_error: e,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, BackendFuture, FinalizedUpload};
    use crate::signal::CancelIntent;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Backend whose chunk uploads fail a fixed number of times.
    struct FlakyBackend {
        failures_left: Mutex<u32>,
        attempts: Mutex<Vec<Instant>>,
    }

    impl FlakyBackend {
        fn new(failures: u32) -> Self {
            Self {
                failures_left: Mutex::new(failures),
                attempts: Mutex::new(Vec::new()),
            }
        }

        fn attempt_times(&self) -> Vec<Instant> {
            self.attempts.lock().unwrap().clone()
        }
    }

    impl TransferBackend for FlakyBackend {
        fn init_upload(&self, _: &str, _: u64, _: usize) -> BackendFuture<'_, String> {
            Box::pin(async { Ok("s".to_string()) })
        }

        fn upload_chunk(&self, _data: &[u8], _index: usize, _sid: &str) -> BackendFuture<'_, ()> {
            Box::pin(async move {
                self.attempts.lock().unwrap().push(Instant::now());
                let mut left = self.failures_left.lock().unwrap();
                if *left > 0 {
                    *left -= 1;
                    Err(BackendError::Transport("connection reset".into()))
                } else {
                    Ok(())
                }
            })
        }

        fn merge_chunks(&self, _: &str) -> BackendFuture<'_, FinalizedUpload> {
            Box::pin(async {
                Ok(FinalizedUpload {
                    reference: "r".into(),
                })
            })
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1000))
    }

    #[test]
    fn delay_is_linear() {
        let p = policy();
        assert_eq!(p.delay_after(1), Duration::from_secs(1));
        assert_eq!(p.delay_after(2), Duration::from_secs(2));
        assert_eq!(p.delay_after(3), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn first_try_success_uses_one_attempt() {
        let backend = FlakyBackend::new(0);
        let signal = CancelSignal::new();
        let attempts = upload_chunk_with_retry(&backend, &signal, &policy(), b"x", 0, "s")
            .await
            .unwrap();
        assert_eq!(attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn two_failures_then_success_waits_1s_then_2s() {
        let backend = FlakyBackend::new(2);
        let signal = CancelSignal::new();
        let attempts = upload_chunk_with_retry(&backend, &signal, &policy(), b"x", 1, "s")
            .await
            .unwrap();
        assert_eq!(attempts, 3);

        let times = backend.attempt_times();
        assert_eq!(times.len(), 3);
        assert_eq!(times[1] - times[0], Duration::from_millis(1000));
        assert_eq!(times[2] - times[1], Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_reports_index_and_attempts() {
        let backend = FlakyBackend::new(10);
        let signal = CancelSignal::new();
        let err = upload_chunk_with_retry(&backend, &signal, &policy(), b"x", 2, "s")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            UploadError::Transfer {
                index: 2,
                attempts: 3,
                ..
            }
        ));
        let msg = err.to_string();
        assert!(msg.contains("chunk 3"), "{msg}");
        assert!(msg.contains("3 retries"), "{msg}");
        assert_eq!(backend.attempt_times().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn raise_during_backoff_stops_retrying() {
        let backend = FlakyBackend::new(10);
        let signal = CancelSignal::new();
        let raiser = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            raiser.raise(CancelIntent::Pause);
        });

        let err = upload_chunk_with_retry(&backend, &signal, &policy(), b"x", 0, "s")
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Cancelled(CancelIntent::Pause)));
        assert_eq!(backend.attempt_times().len(), 1);
    }

    #[tokio::test]
    async fn raised_signal_makes_no_attempt() {
        let backend = FlakyBackend::new(0);
        let signal = CancelSignal::new();
        signal.raise(CancelIntent::Cancel);
        let err = upload_chunk_with_retry(&backend, &signal, &policy(), b"x", 0, "s")
            .await
            .unwrap_err();
        assert!(err.is_cancellation());
        assert!(backend.attempt_times().is_empty());
    }
}
