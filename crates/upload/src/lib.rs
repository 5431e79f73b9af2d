//! Resumable chunked upload engine.
//!
//! This crate implements the **upload state machine**: it validates the
//! file, opens a backend session, sends chunks strictly in order with
//! per-chunk retry, and finalizes with a merge. It has no transport
//! dependencies; callers provide a [`TransferBackend`].
//!
//! # Lifecycle
//!
//! 1. **Validate**: reject files above the configured size cap
//! 2. **Init**: open a session on the backend
//! 3. **Upload**: one chunk at a time, retried with linear backoff
//! 4. **Merge**: reassemble the chunks into the stored artifact
//!
//! `pause`, `resume`, `retry` and `cancel` steer the run from another task.

pub mod backend;
pub mod config;
pub mod error;
pub mod retry;
pub mod session;
pub mod signal;
pub mod types;

pub use backend::{BackendError, BackendFuture, FinalizedUpload, TransferBackend};
pub use config::UploadConfig;
pub use error::UploadError;
pub use retry::RetryPolicy;
pub use session::Uploader;
pub use signal::{CancelIntent, CancelSignal};
pub use types::{SessionSnapshot, UploadEvent, UploadOutcome, UploadStatus};

pub use ferry_transfer::SourceFile;
