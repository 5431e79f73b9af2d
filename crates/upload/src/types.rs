//! Data types for the upload flow.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::backend::FinalizedUpload;

/// Lifecycle state of an upload session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    #[default]
    Idle,
    Uploading,
    Paused,
    Success,
    Error,
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UploadStatus::Idle => "idle",
            UploadStatus::Uploading => "uploading",
            UploadStatus::Paused => "paused",
            UploadStatus::Success => "success",
            UploadStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Event emitted while an upload runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadEvent {
    /// Session moved to a new state.
    StatusChanged(UploadStatus),
    /// A chunk was acknowledged.
    Progress {
        percent: u8,
        completed: usize,
        total: usize,
    },
    /// Merge succeeded; fired once per successful run.
    Completed { file_name: String, reference: String },
    /// Terminal failure; fired once per failure.
    Failed { message: String },
}

/// How a run of the upload procedure came to rest without failing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Completed(FinalizedUpload),
    Paused,
    Cancelled,
}

/// Read-only copy of the session state for UIs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub status: UploadStatus,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub total_chunks: usize,
    pub completed_chunks: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
