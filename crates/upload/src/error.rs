//! Upload error types.

use crate::backend::BackendError;
use crate::signal::CancelIntent;
use crate::types::UploadStatus;

/// Errors produced while driving an upload session.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error(transparent)]
    Validation(ferry_transfer::TransferError),

    #[error("failed to start upload session: {0}")]
    Init(BackendError),

    #[error("failed to read chunk {}: {source}", .index + 1)]
    Read {
        index: usize,
        #[source]
        source: ferry_transfer::TransferError,
    },

    #[error("chunk {} failed after {attempts} retries: {last_error}", .index + 1)]
    Transfer {
        index: usize,
        attempts: u32,
        last_error: BackendError,
    },

    #[error("upload {0}")]
    Cancelled(CancelIntent),

    #[error("failed to merge chunks: {0}")]
    Merge(BackendError),

    #[error("cannot {action} while {status}")]
    InvalidState {
        action: &'static str,
        status: UploadStatus,
    },
}

impl UploadError {
    /// Cancellation drives a state change rather than surfacing as a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, UploadError::Cancelled(_))
    }
}
