use crate::error::{Result, UploadError};
use crate::upload::partition::PartRange;
use crate::upload::progress::{ProgressObserver, ProgressSnapshot};
use crate::upload::source::extension_of;
use crate::upload::strategy::UploadStrategy;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Lifecycle of an upload session; transitions only move forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Created,
    UrlsAcquired,
    Uploading,
    Completed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Created => write!(f, "created"),
            SessionState::UrlsAcquired => write!(f, "urls_acquired"),
            SessionState::Uploading => write!(f, "uploading"),
            SessionState::Completed => write!(f, "completed"),
            SessionState::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartStatus {
    Pending,
    InFlight,
    Done,
    Failed,
}

/// One part of a multi-part session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartDescriptor {
    pub part_number: u32,
    pub byte_range: Range<u64>,
    pub destination_url: Option<String>,
    pub completion_tag: Option<String>,
    pub status: PartStatus,
}

impl PartDescriptor {
    pub fn len(&self) -> u64 {
        self.byte_range.end - self.byte_range.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<PartRange> for PartDescriptor {
    fn from(range: PartRange) -> Self {
        Self {
            part_number: range.part_number,
            byte_range: range.as_range(),
            destination_url: None,
            completion_tag: None,
            status: PartStatus::Pending,
        }
    }
}

/// Bookkeeping for one upload attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSession {
    pub file_identifier: String,
    pub size_bytes: u64,
    pub strategy: UploadStrategy,
    /// Issued by the backend for multi-part sessions only
    pub session_token: Option<String>,
    /// Destination of a single-shot session
    pub destination_url: Option<String>,
    /// Parts of a multi-part session, in ascending part order
    pub parts: Vec<PartDescriptor>,
    pub state: SessionState,
}

impl UploadSession {
    /// Fail with `InvalidState` unless the session is in `expected`
    pub fn expect_state(&self, expected: SessionState) -> Result<()> {
        if self.state != expected {
            return Err(UploadError::invalid_state(
                expected.to_string(),
                self.state.to_string(),
            ));
        }
        Ok(())
    }

    pub fn parts_done(&self) -> usize {
        self.parts
            .iter()
            .filter(|part| part.status == PartStatus::Done)
            .count()
    }
}

/// Identifier under which the backend stores an upload attempt
///
/// `prefix + epoch_millis + extension`, e.g. `ad-1718012345678.mp4`.
pub fn file_identifier(prefix: &str, original_name: &str, epoch_millis: i64) -> String {
    format!("{}{}{}", prefix, epoch_millis, extension_of(original_name))
}

/// Per-upload options
#[derive(Clone)]
pub struct UploadOptions {
    /// Record (ad) to point at the uploaded file once complete
    pub record_id: Option<String>,
    pub on_progress: Option<ProgressObserver>,
    /// Maximum parts in flight (default: 1, strictly sequential)
    pub concurrency: usize,
    /// Compute a SHA-256 of the source before uploading
    pub compute_checksum: bool,
    pub cancel_token: Option<CancellationToken>,
}

impl std::fmt::Debug for UploadOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadOptions")
            .field("record_id", &self.record_id)
            .field("on_progress", &self.on_progress.is_some())
            .field("concurrency", &self.concurrency)
            .field("compute_checksum", &self.compute_checksum)
            .field("cancel_token", &self.cancel_token.is_some())
            .finish()
    }
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            record_id: None,
            on_progress: None,
            concurrency: 1,
            compute_checksum: false,
            cancel_token: None,
        }
    }
}

impl UploadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_id<S: Into<String>>(mut self, record_id: S) -> Self {
        self.record_id = Some(record_id.into());
        self
    }

    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ProgressSnapshot) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn compute_checksum(mut self, compute: bool) -> Self {
        self.compute_checksum = compute;
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(UploadError::invalid_input(
                "concurrency",
                "Concurrency must be greater than 0",
            ));
        }

        if let Some(ref record_id) = self.record_id {
            if record_id.trim().is_empty() {
                return Err(UploadError::invalid_input(
                    "record_id",
                    "Record id cannot be empty",
                ));
            }
        }

        Ok(())
    }
}

/// Outcome of a completed upload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadResult {
    pub file_identifier: String,
    pub size: u64,
    pub strategy: UploadStrategy,
    pub parts: Option<usize>,
    pub duration_ms: u64,
    pub checksum_sha256: Option<String>,
    pub record_updated: bool,
}

impl UploadResult {
    pub fn new(file_identifier: String, size: u64, strategy: UploadStrategy) -> Self {
        Self {
            file_identifier,
            size,
            strategy,
            parts: None,
            duration_ms: 0,
            checksum_sha256: None,
            record_updated: false,
        }
    }

    pub fn parts(mut self, parts: usize) -> Self {
        self.parts = Some(parts);
        self
    }

    pub fn duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn checksum_sha256(mut self, checksum: Option<String>) -> Self {
        self.checksum_sha256 = checksum;
        self
    }

    pub fn record_updated(mut self, updated: bool) -> Self {
        self.record_updated = updated;
        self
    }

    /// Human-readable size, e.g. "114.4 MiB"
    pub fn size_display(&self) -> String {
        bytesize::ByteSize::b(self.size).to_string()
    }
}
