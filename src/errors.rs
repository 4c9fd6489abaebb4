/*!
 * Error types for the archivist application.
 *
 * This module contains custom error types for the different parts of the
 * application, using the thiserror crate for ergonomic error definitions.
 */

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading and validating a chat export
#[derive(Error, Debug)]
pub enum TranscriptError {
    /// The export file does not exist
    #[error("Chat export file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The export is not well-formed JSON
    #[error("Invalid JSON in {}: {reason}", .path.display())]
    Parse {
        /// Path of the offending file
        path: PathBuf,
        /// Parser message
        reason: String,
    },

    /// The export is well-formed but a field is missing, mistyped or out of range
    #[error("Validation failed{}: {reason}", for_message(.message_id))]
    Validation {
        /// ID of the offending message, when known
        message_id: Option<i64>,
        /// What was wrong
        reason: String,
    },

    /// Reading the file failed for a reason other than absence
    #[error("Failed to read chat export: {0}")]
    Io(#[from] std::io::Error),
}

fn for_message(message_id: &Option<i64>) -> String {
    message_id
        .map(|id| format!(" for message {}", id))
        .unwrap_or_default()
}

impl TranscriptError {
    pub(crate) fn validation(message_id: Option<i64>, reason: impl Into<String>) -> Self {
        Self::Validation {
            message_id,
            reason: reason.into(),
        }
    }
}

/// Contract violations when building a context engine
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ContextError {
    /// Two records share an identity key
    #[error("Malformed message sequence: message id {0} appears more than once")]
    DuplicateMessageId(i64),
}

/// Errors from the processing state store
#[derive(Error, Debug)]
pub enum StateError {
    /// Stored state is bound to a different export than the one requested
    #[error("Processing state belongs to {} but {} was requested", .stored.display(), .requested.display())]
    Conflict {
        /// Export path recorded in the state file
        stored: PathBuf,
        /// Export path of the current run
        requested: PathBuf,
    },

    /// Reading or writing the state file failed
    #[error("State file error: {0}")]
    Io(#[from] std::io::Error),

    /// The state could not be serialized
    #[error("Failed to serialize processing state: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors that can occur when working with the extraction backend
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The request did not complete in time
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// The requested model is not present and could not be pulled
    #[error("Model '{0}' is not available")]
    ModelUnavailable(String),
}

/// Errors that terminate a scan run
#[derive(Error, Debug)]
pub enum ScanError {
    /// The transcript could not be loaded
    #[error("Transcript error: {0}")]
    Transcript(#[from] TranscriptError),

    /// The context engine rejected the transcript
    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    /// Progress could not be persisted
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// The backend failed too many times in a row
    #[error("Extraction backend unavailable after {consecutive_failures} consecutive failures")]
    BackendUnavailable {
        /// Number of back-to-back failures that triggered the abort
        consecutive_failures: u32,
    },
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from the transcript loader
    #[error("Transcript error: {0}")]
    Transcript(#[from] TranscriptError),

    /// Error from the state store
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Error from the extraction backend
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from a scan run
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

// Utility functions for error conversion
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
