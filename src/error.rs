//! Error handling for the signage uploader
//!
//! This module defines the error taxonomy surfaced by upload sessions. Every
//! failure reaches the caller through the awaited call chain; nothing is
//! swallowed.

use thiserror::Error;

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, UploadError>;

/// Error types that can occur while running an upload session
#[derive(Error, Debug)]
pub enum UploadError {
    /// Malformed size, zero-length file or bad option
    #[error("Invalid input: {parameter} - {message}")]
    InvalidInput { parameter: String, message: String },

    /// The backend refused to create a session or hand out destination URLs
    #[error("Session create failed: {message}")]
    SessionCreateFailed { message: String },

    /// A single part's transport returned a non-success outcome
    #[error("Part {part_number} upload failed ({}): {message}", display_status(.status))]
    PartUploadFailed {
        part_number: u32,
        status: Option<u16>,
        message: String,
    },

    /// The finalize call failed after all parts were written
    #[error("Finalize failed: {message}")]
    FinalizeFailed { message: String },

    /// The domain record did not acknowledge the new file
    #[error("Record update failed for {record_id}: {message}")]
    RecordUpdateFailed { record_id: String, message: String },

    /// The caller cancelled the session
    #[error("Operation cancelled: {operation}")]
    Cancelled { operation: String },

    /// A session step was invoked out of order
    #[error("Invalid session state: expected {expected}, found {actual}")]
    InvalidState { expected: String, actual: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// I/O error while reading the source
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client construction error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

fn display_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!("status {}", code),
        None => "no response".to_string(),
    }
}

impl UploadError {
    /// Create a new invalid input error
    pub fn invalid_input(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        UploadError::InvalidInput {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create a new session create error
    pub fn session_create_failed(message: impl Into<String>) -> Self {
        UploadError::SessionCreateFailed {
            message: message.into(),
        }
    }

    /// Create a new part upload error
    pub fn part_upload_failed(
        part_number: u32,
        status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        UploadError::PartUploadFailed {
            part_number,
            status,
            message: message.into(),
        }
    }

    /// Create a new finalize error
    pub fn finalize_failed(message: impl Into<String>) -> Self {
        UploadError::FinalizeFailed {
            message: message.into(),
        }
    }

    /// Create a new record update error
    pub fn record_update_failed(record_id: impl Into<String>, message: impl Into<String>) -> Self {
        UploadError::RecordUpdateFailed {
            record_id: record_id.into(),
            message: message.into(),
        }
    }

    /// Create a new cancelled error
    pub fn cancelled(operation: impl Into<String>) -> Self {
        UploadError::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create a new invalid state error
    pub fn invalid_state(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        UploadError::InvalidState {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a new configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        UploadError::ConfigError {
            message: message.into(),
        }
    }

    /// Whether the error was caused by a caller cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, UploadError::Cancelled { .. })
    }
}
