//! Wire and configuration types for the HTTP backend.

use serde::{Deserialize, Serialize};

/// Connection settings for [`HttpBackend`](crate::HttpBackend).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpBackendConfig {
    /// Base URL of the upload API, e.g. `https://compute.example.com/api/v1`.
    pub endpoint: String,
    /// Bearer token sent with every request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    /// Per-request timeout; no timeout when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InitUploadRequest {
    pub file_name: String,
    pub file_size: u64,
    pub total_chunks: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InitUploadResponse {
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MergeResponse {
    pub reference: String,
}
