//! HTTP implementation of the upload engine's transfer backend.
//!
//! Talks to the platform's REST upload endpoints with `reqwest`:
//!
//! - `POST {base}/uploads/init`: open a session
//! - `POST {base}/uploads/{session}/chunks/{index}`: raw chunk bytes
//! - `POST {base}/uploads/{session}/merge`: finalize

pub mod client;
pub mod types;

pub use client::{Error, HttpBackend};
pub use types::HttpBackendConfig;
