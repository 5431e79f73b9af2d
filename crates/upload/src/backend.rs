//! The remote side of an upload.
//!
//! `TransferBackend` is implemented by whatever actually moves bytes
//! (the HTTP client in `ferry-http-backend`, or mocks in tests). Keeping it a
//! trait keeps the session logic decoupled from transport.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

/// Boxed future returned by [`TransferBackend`] operations.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BackendError>> + Send + 'a>>;

/// Errors reported by a transfer backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Reference to the stored artifact returned by a successful merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizedUpload {
    pub reference: String,
}

/// Session-init, per-chunk upload and merge operations.
///
/// Implementations must not retry internally; the session owns the retry
/// policy. Futures borrow only `self`, so arguments needed after the call
/// returns must be copied into the future.
pub trait TransferBackend: Send + Sync {
    /// Opens a multi-chunk upload and returns the backend session ID.
    fn init_upload(
        &self,
        file_name: &str,
        file_size: u64,
        total_chunks: usize,
    ) -> BackendFuture<'_, String>;

    /// Sends one chunk. Any error counts as one failed attempt.
    fn upload_chunk(&self, data: &[u8], index: usize, session_id: &str) -> BackendFuture<'_, ()>;

    /// Reassembles all acknowledged chunks into the final artifact.
    fn merge_chunks(&self, session_id: &str) -> BackendFuture<'_, FinalizedUpload>;
}
