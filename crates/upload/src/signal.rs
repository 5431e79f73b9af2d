//! Cooperative stop signal shared between the controller and the chunk loop.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio_util::sync::CancellationToken;

/// Why the upload loop was asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelIntent {
    /// Keep the file and session so the upload can be resumed.
    Pause,
    /// Discard everything and return to idle.
    Cancel,
}

impl fmt::Display for CancelIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelIntent::Pause => f.write_str("paused"),
            CancelIntent::Cancel => f.write_str("cancelled"),
        }
    }
}

const INTENT_NONE: u8 = 0;
const INTENT_PAUSE: u8 = 1;
const INTENT_CANCEL: u8 = 2;

/// A cancellation token that also records the intent behind it.
///
/// One signal belongs to exactly one run of the chunk loop. The first
/// raised intent wins; later calls only re-fire the token.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    token: CancellationToken,
    intent: Arc<AtomicU8>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the signal with `intent`.
    pub fn raise(&self, intent: CancelIntent) {
        let code = match intent {
            CancelIntent::Pause => INTENT_PAUSE,
            CancelIntent::Cancel => INTENT_CANCEL,
        };
        let _ = self
            .intent
            .compare_exchange(INTENT_NONE, code, Ordering::AcqRel, Ordering::Acquire);
        self.token.cancel();
    }

    /// Intent of the raised signal, `None` while the run may continue.
    pub fn raised(&self) -> Option<CancelIntent> {
        match self.intent.load(Ordering::Acquire) {
            INTENT_PAUSE => Some(CancelIntent::Pause),
            INTENT_CANCEL => Some(CancelIntent::Cancel),
            _ => None,
        }
    }

    /// Returns `Err` carrying the intent once the signal is raised.
    pub fn check(&self) -> Result<(), CancelIntent> {
        match self.raised() {
            Some(intent) => Err(intent),
            None => Ok(()),
        }
    }

    /// Resolves when the signal is raised. Cancel-safe.
    pub async fn wait(&self) -> CancelIntent {
        self.token.cancelled().await;
        self.raised().unwrap_or(CancelIntent::Cancel)
    }

    /// Runs `fut` until it completes or the signal is raised, whichever
    /// comes first. A raised signal drops the in-flight future.
    pub async fn guard<F: Future>(&self, fut: F) -> Result<F::Output, CancelIntent> {
        self.check()?;
        tokio::select! {
            biased;
            intent = self.wait() => Err(intent),
            out = fut => Ok(out),
        }
    }
}
