//! Chunk planning, source slicing and progress math for chunked uploads.
//!
//! Everything here is backend-agnostic: the upload state machine lives in
//! `ferry-upload` and only consumes these building blocks.

mod plan;
mod progress;
mod source;
mod validation;

pub use plan::{Chunk, ChunkPlan};
pub use progress::{ProgressReporter, percent};
pub use source::SourceFile;
pub use validation::{format_size, max_size_bytes, validate_file_size};

/// Default chunk size: 5 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Attempts per chunk before the whole session is aborted.
pub const MAX_RETRIES: u32 = 3;

/// Default upper bound on the source file size, in MiB (10 GiB).
pub const DEFAULT_MAX_SIZE_MB: u64 = 10240;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file size {size} exceeds the {limit} limit")]
    Validation { size: String, limit: String },

    #[error("chunk range {start}..{end} is outside the {size}-byte source")]
    RangeOutOfBounds { start: u64, end: u64, size: u64 },
}
