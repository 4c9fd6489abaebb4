/*!
 * # Archivist - resumable context analysis for chat exports
 *
 * A Rust library that walks an exported chat transcript message by message,
 * computing for each one the surrounding messages needed to interpret it,
 * and tracking progress durably so an interrupted scan can resume.
 *
 * ## Features
 *
 * - Load and validate chat export JSON into typed messages
 * - Context windows combining neighbors and reply-chain ancestors
 * - Crash-safe processing state with resume and export mismatch detection
 * - Optional per-message extraction through a local Ollama server
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `transcript`: Message records, the indexed transcript and its loader
 * - `context`: The context window engine
 * - `state`: Persisted processing state and the progress tracker
 * - `scan`: The resumable scan driver and per-message processors
 * - `providers`: Extraction backends:
 *   - `providers::ollama`: Ollama API client
 *   - `providers::mock`: Scripted backend for tests
 * - `app_config`: Configuration management
 * - `file_utils`: File system operations
 * - `errors`: Custom error types for the application
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod context;
pub mod errors;
pub mod file_utils;
pub mod providers;
pub mod scan;
pub mod state;
pub mod transcript;

// Re-export main types for easier usage
pub use app_config::Config;
pub use context::{ContextEngine, ContextExt, ContextWindowConfig, MessageContext};
pub use errors::{AppError, ContextError, ProviderError, ScanError, StateError, TranscriptError};
pub use scan::{ScanDriver, ScanReport};
pub use state::{ProcessingState, ProcessingStatus, ProgressTracker, ResumePoint};
pub use transcript::{Message, MessageId, Transcript, TranscriptLoader};
