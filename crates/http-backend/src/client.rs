//! Upload API client.
//!
//! Async HTTP client using `reqwest` with optional Bearer token authentication.

use std::time::Duration;

use ferry_upload::{BackendError, BackendFuture, FinalizedUpload, TransferBackend};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::types::{HttpBackendConfig, InitUploadRequest, InitUploadResponse, MergeResponse};

/// Characters escaped in a session ID path segment (all but RFC 3986 unreserved).
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Errors building an [`HttpBackend`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid API token")]
    InvalidToken,

    #[error("invalid endpoint: {0:?}")]
    InvalidEndpoint(String),
}

/// Transfer backend speaking the platform's REST upload API.
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    /// Creates a client for `config.endpoint`.
    pub fn new(config: &HttpBackendConfig) -> Result<Self, Error> {
        let base_url = config.endpoint.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(Error::InvalidEndpoint(config.endpoint.clone()));
        }

        let mut headers = HeaderMap::new();
        if let Some(token) = config.api_token.as_deref().filter(|t| !t.is_empty()) {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| Error::InvalidToken)?,
            );
        }

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(secs) = config.request_timeout_secs.filter(|s| *s > 0) {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            http: builder.build()?,
            base_url,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn session_url(&self, session_id: &str, tail: &str) -> String {
        let encoded = utf8_percent_encode(session_id, PATH_SEGMENT);
        format!("{}/uploads/{encoded}{tail}", self.base_url)
    }

    /// Sends a request and returns the body of a 2xx response.
    async fn send(&self, req: reqwest::RequestBuilder) -> Result<Vec<u8>, BackendError> {
        let resp = req.send().await.map_err(transport)?;
        let status = resp.status();

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::Server {
                status: status.as_u16(),
                message: body,
            });
        }

        Ok(resp.bytes().await.map_err(transport)?.to_vec())
    }
}

impl TransferBackend for HttpBackend {
    fn init_upload(
        &self,
        file_name: &str,
        file_size: u64,
        total_chunks: usize,
    ) -> BackendFuture<'_, String> {
        let req = InitUploadRequest {
            file_name: file_name.to_string(),
            file_size,
            total_chunks,
        };
        Box::pin(async move {
            let url = format!("{}/uploads/init", self.base_url);
            let body = self.send(self.http.post(&url).json(&req)).await?;
            let resp: InitUploadResponse = decode(&body)?;
            trace!(session = %resp.session_id, "init acknowledged");
            Ok(resp.session_id)
        })
    }

    fn upload_chunk(&self, data: &[u8], index: usize, session_id: &str) -> BackendFuture<'_, ()> {
        let url = self.session_url(session_id, &format!("/chunks/{index}"));
        let data = data.to_vec();
        Box::pin(async move {
            let req = self
                .http
                .post(&url)
                .header(CONTENT_TYPE, "application/octet-stream")
                .body(data);
            self.send(req).await?;
            Ok(())
        })
    }

    fn merge_chunks(&self, session_id: &str) -> BackendFuture<'_, FinalizedUpload> {
        let url = self.session_url(session_id, "/merge");
        Box::pin(async move {
            let body = self.send(self.http.post(&url)).await?;
            let resp: MergeResponse = decode(&body)?;
            Ok(FinalizedUpload {
                reference: resp.reference,
            })
        })
    }
}

fn transport(e: reqwest::Error) -> BackendError {
    BackendError::Transport(e.to_string())
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, BackendError> {
    serde_json::from_slice(body).map_err(|e| BackendError::InvalidResponse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Starts a one-shot mock HTTP server.
    ///
    /// Replies with `status` and `body` after reading the whole request, and
    /// hands the raw request back through the join handle.
    async fn mock_server(status: u16, body: &str) -> (String, tokio::task::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{port}");
        let body = body.to_string();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = vec![0u8; 8192];
            loop {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                if request_complete(&request) {
                    break;
                }
            }

            let resp = format!(
                "HTTP/1.1 {status} Mock\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(resp.as_bytes()).await;
            let _ = stream.shutdown().await;
            request
        });

        (url, handle)
    }

    /// True once the headers and `Content-Length` bytes of body have arrived.
    fn request_complete(raw: &[u8]) -> bool {
        let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") else {
            return false;
        };
        let head = String::from_utf8_lossy(&raw[..pos]).to_lowercase();
        let length = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        raw.len() >= pos + 4 + length
    }

    fn backend(url: &str, token: Option<&str>) -> HttpBackend {
        HttpBackend::new(&HttpBackendConfig {
            endpoint: url.to_string(),
            api_token: token.map(String::from),
            request_timeout_secs: Some(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn init_posts_manifest_and_returns_session_id() {
        let (url, handle) = mock_server(200, r#"{"sessionId":"sess-42"}"#).await;

        let client = backend(&url, Some("secret"));
        let id = client.init_upload("weights.bin", 12, 3).await.unwrap();
        assert_eq!(id, "sess-42");

        let raw = String::from_utf8(handle.await.unwrap()).unwrap();
        assert!(raw.starts_with("POST /uploads/init HTTP/1.1"), "{raw}");
        assert!(raw.to_lowercase().contains("authorization: bearer secret"));
        assert!(raw.ends_with(r#"{"fileName":"weights.bin","fileSize":12,"totalChunks":3}"#));
    }

    #[tokio::test]
    async fn upload_chunk_sends_raw_bytes() {
        let (url, handle) = mock_server(204, "").await;

        let client = backend(&url, None);
        client.upload_chunk(b"CHUNK-DATA", 2, "sess-42").await.unwrap();

        let raw = handle.await.unwrap();
        let text = String::from_utf8_lossy(&raw);
        assert!(text.starts_with("POST /uploads/sess-42/chunks/2 HTTP/1.1"), "{text}");
        assert!(text.to_lowercase().contains("content-type: application/octet-stream"));
        assert!(!text.to_lowercase().contains("authorization"));
        assert!(raw.ends_with(b"CHUNK-DATA"));
    }

    #[tokio::test]
    async fn merge_returns_reference() {
        let (url, handle) = mock_server(200, r#"{"reference":"datasets/7/weights.bin"}"#).await;

        let client = backend(&url, None);
        let finalized = client.merge_chunks("s1").await.unwrap();
        assert_eq!(finalized.reference, "datasets/7/weights.bin");

        let raw = String::from_utf8(handle.await.unwrap()).unwrap();
        assert!(raw.starts_with("POST /uploads/s1/merge HTTP/1.1"), "{raw}");
    }

    #[tokio::test]
    async fn server_error_carries_status_and_body() {
        let (url, handle) = mock_server(503, r#"{"error":"busy"}"#).await;

        let client = backend(&url, None);
        let err = client.upload_chunk(b"x", 0, "s1").await.unwrap_err();
        assert_eq!(
            err,
            BackendError::Server {
                status: 503,
                message: r#"{"error":"busy"}"#.into()
            }
        );

        handle.await.unwrap();
    }

    #[tokio::test]
    async fn undecodable_body_is_invalid_response() {
        let (url, handle) = mock_server(200, "not json").await;

        let client = backend(&url, None);
        let err = client.init_upload("a.bin", 1, 1).await.unwrap_err();
        assert!(matches!(err, BackendError::InvalidResponse(_)));

        handle.await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_server_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = backend(&format!("http://127.0.0.1:{port}"), None);
        let err = client.merge_chunks("s1").await.unwrap_err();
        assert!(matches!(err, BackendError::Transport(_)));
    }

    #[test]
    fn endpoint_must_be_http() {
        let result = HttpBackend::new(&HttpBackendConfig {
            endpoint: "ftp://example.com".into(),
            ..HttpBackendConfig::default()
        });
        assert!(matches!(result, Err(Error::InvalidEndpoint(_))));
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let client = backend("http://localhost:9000/api/", None);
        assert_eq!(client.base_url(), "http://localhost:9000/api");
        assert_eq!(
            client.session_url("a b/c", "/merge"),
            "http://localhost:9000/api/uploads/a%20b%2Fc/merge"
        );
    }

    #[test]
    fn token_with_newline_is_rejected() {
        let result = HttpBackend::new(&HttpBackendConfig {
            endpoint: "http://localhost".into(),
            api_token: Some("bad\ntoken".into()),
            request_timeout_secs: None,
        });
        assert!(matches!(result, Err(Error::InvalidToken)));
    }
}
