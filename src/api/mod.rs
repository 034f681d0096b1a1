//! Backend and transport seams
//!
//! The orchestrator talks to two collaborators: the REST backend that issues
//! sessions and pre-authorized URLs, and the transport that writes bytes to
//! those URLs. Both are object-safe traits returning boxed futures so callers
//! can plug in the bundled HTTP implementations or their own.

pub mod http;
pub mod types;

use bytes::Bytes;
use futures::future::BoxFuture;
use std::sync::Arc;
use thiserror::Error;

pub use http::{HttpBackend, HttpTransport};
pub use types::{CompletedPart, MultipartSession, PartUrl, RecordUpdate};

/// Result of a backend or transport call
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Callback receiving the number of body bytes handed to the network
pub type SentCallback = Arc<dyn Fn(u64) + Send + Sync>;

/// Failure reported by a backend or transport call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ApiError {
    /// HTTP status, when a response was received
    pub status: Option<u16>,
    pub message: String,
}

impl ApiError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Error for a response with a non-success status
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::new(Some(status), message)
    }

    /// Error raised before any response arrived
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(None, message)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::new(err.status().map(|s| s.as_u16()), err.to_string())
    }
}

/// REST backend issuing sessions and destination URLs
pub trait UploadBackend: Send + Sync {
    /// Open a multi-part session for `file_name`
    fn create_multipart_session<'a>(
        &'a self,
        file_name: &'a str,
        file_type: &'a str,
    ) -> BoxFuture<'a, ApiResult<MultipartSession>>;

    /// One destination URL per part, numbered from 1
    fn acquire_part_urls<'a>(
        &'a self,
        file_name: &'a str,
        session_token: &'a str,
        parts_count: u32,
    ) -> BoxFuture<'a, ApiResult<Vec<PartUrl>>>;

    /// A destination URL covering the whole file
    fn acquire_single_shot_url<'a>(
        &'a self,
        file_name: &'a str,
        file_type: &'a str,
    ) -> BoxFuture<'a, ApiResult<String>>;

    /// Complete a multi-part session; `parts` are in ascending part order
    fn finalize_multipart_session<'a>(
        &'a self,
        file_name: &'a str,
        session_token: &'a str,
        parts: &'a [CompletedPart],
    ) -> BoxFuture<'a, ApiResult<serde_json::Value>>;

    /// Point a domain record at its new file
    fn notify_record_updated<'a>(
        &'a self,
        record_id: &'a str,
        update: &'a RecordUpdate,
    ) -> BoxFuture<'a, ApiResult<serde_json::Value>>;
}

/// Writes a byte range to a pre-authorized URL
pub trait PartTransport: Send + Sync {
    /// Issue exactly one write of `body` and return the completion tag
    ///
    /// `on_sent`, when given, is called as body bytes are handed to the
    /// network. Implementations must not retry or split the write.
    fn put_bytes<'a>(
        &'a self,
        destination_url: &'a str,
        body: Bytes,
        on_sent: Option<SentCallback>,
    ) -> BoxFuture<'a, ApiResult<String>>;
}
