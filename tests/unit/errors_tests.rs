/*!
 * Tests for error types and conversions
 */

use archivist::errors::{AppError, ContextError, ProviderError, ScanError, StateError, TranscriptError};
use std::path::PathBuf;

#[test]
fn test_transcriptError_validationWithId_shouldNameMessage() {
    let error = TranscriptError::Validation {
        message_id: Some(17),
        reason: "invalid date".to_string(),
    };

    assert_eq!(error.to_string(), "Validation failed for message 17: invalid date");
}

#[test]
fn test_transcriptError_validationWithoutId_shouldOmitMessage() {
    let error = TranscriptError::Validation {
        message_id: None,
        reason: "missing field `name`".to_string(),
    };

    assert_eq!(error.to_string(), "Validation failed: missing field `name`");
}

#[test]
fn test_transcriptError_notFound_shouldDisplayPath() {
    let error = TranscriptError::NotFound(PathBuf::from("data/dump.json"));

    assert!(error.to_string().contains("data/dump.json"));
}

#[test]
fn test_stateError_conflict_shouldDisplayBothPaths() {
    let error = StateError::Conflict {
        stored: PathBuf::from("old.json"),
        requested: PathBuf::from("new.json"),
    };
    let display = error.to_string();

    assert!(display.contains("old.json"));
    assert!(display.contains("new.json"));
}

#[test]
fn test_providerError_timeout_shouldDisplaySeconds() {
    let error = ProviderError::Timeout(120);

    assert_eq!(error.to_string(), "Request timed out after 120 seconds");
}

#[test]
fn test_providerError_apiError_shouldDisplayStatusAndMessage() {
    let error = ProviderError::ApiError {
        status_code: 503,
        message: "model loading".to_string(),
    };
    let display = format!("{}", error);

    assert!(display.contains("503"));
    assert!(display.contains("model loading"));
}

#[test]
fn test_scanError_fromContextError_shouldWrap() {
    let error: ScanError = ContextError::DuplicateMessageId(3).into();

    assert!(matches!(error, ScanError::Context(ContextError::DuplicateMessageId(3))));
    assert!(error.to_string().contains("appears more than once"));
}

#[test]
fn test_scanError_backendUnavailable_shouldDisplayCount() {
    let error = ScanError::BackendUnavailable { consecutive_failures: 5 };

    assert!(error.to_string().contains("5 consecutive failures"));
}

#[test]
fn test_appError_fromIoError_shouldConvertToFileError() {
    let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let app_error: AppError = io_error.into();

    assert!(matches!(app_error, AppError::File(_)));
}

#[test]
fn test_appError_fromAnyhow_shouldConvertToUnknown() {
    let app_error: AppError = anyhow::anyhow!("something odd").into();

    assert!(matches!(app_error, AppError::Unknown(ref message) if message == "something odd"));
}

#[test]
fn test_appError_fromStateError_shouldWrap() {
    let app_error: AppError = StateError::Io(std::io::Error::other("disk full")).into();

    assert!(app_error.to_string().starts_with("State error"));
}

#[test]
fn test_providerError_modelUnavailable_shouldNameModel() {
    let error = ProviderError::ModelUnavailable("gemma3n:latest".to_string());

    assert_eq!(error.to_string(), "Model 'gemma3n:latest' is not available");
}
