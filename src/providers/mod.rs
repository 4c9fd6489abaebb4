/*!
 * Extraction backends.
 *
 * This module contains the client side of the text generation service that
 * per-message extraction talks to:
 * - Ollama: local LLM server
 * - Mock: scripted backend for tests
 */

use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Debug;

use crate::errors::ProviderError;

pub mod mock;
pub mod ollama;

pub use mock::{MockBackend, MockBehavior};
pub use ollama::{ChatMessage, OllamaBackend};

/// Common trait for text generation backends
///
/// Every call may fail with connection, timeout or malformed-response
/// errors. Callers decide whether a failure is fatal.
#[async_trait]
pub trait ExtractionBackend: Send + Sync + Debug {
    /// Free text for `prompt`
    async fn generate_text(&self, prompt: &str) -> Result<String, ProviderError>;

    /// JSON output for `prompt`, shaped by `schema` when one is given
    async fn generate_structured(&self, prompt: &str, schema: Option<&Value>) -> Result<Value, ProviderError>;

    /// Reply to a conversation
    async fn chat_completion(&self, messages: Vec<ChatMessage>) -> Result<String, ProviderError>;

    /// Whether the service answers and the model is installed.
    ///
    /// May try to install a missing model first.
    async fn is_available(&self) -> bool;

    /// Details the service reports about the model, if any
    async fn model_info(&self) -> Option<Value>;

    /// Name of the model requests are sent to
    fn model_name(&self) -> &str;
}
