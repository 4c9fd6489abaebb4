/*!
 * Mock backend implementations for testing.
 *
 * This module provides a mock backend that simulates different behaviors:
 * - `MockBackend::working()` - Always succeeds
 * - `MockBackend::intermittent(n)` - Fails every nth request
 * - `MockBackend::failing()` - Always fails with an error
 * - `MockBackend::malformed()` - Answers with text that is not JSON
 */

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::errors::ProviderError;

use super::ollama::{parse_structured, ChatMessage};
use super::ExtractionBackend;

/// Behavior mode for the mock backend
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockBehavior {
    /// Always succeeds
    Working,
    /// Fails every Nth request
    Intermittent { fail_every: usize },
    /// Always fails with an error
    Failing,
    /// Succeeds at transport level but returns invalid JSON
    Malformed,
    /// Answers after a delay, for timeout testing
    Slow { delay_ms: u64 },
}

/// Mock backend for testing extraction behavior
#[derive(Debug)]
pub struct MockBackend {
    behavior: MockBehavior,
    model: String,
    /// Request counter, shared between clones
    request_count: Arc<AtomicUsize>,
    /// Prompts seen so far, shared between clones
    prompts: Arc<std::sync::Mutex<Vec<String>>>,
}

impl MockBackend {
    /// Create a new mock backend with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            model: "mock-model".to_string(),
            request_count: Arc::new(AtomicUsize::new(0)),
            prompts: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    pub fn intermittent(fail_every: usize) -> Self {
        Self::new(MockBehavior::Intermittent { fail_every })
    }

    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    pub fn malformed() -> Self {
        Self::new(MockBehavior::Malformed)
    }

    pub fn slow(delay_ms: u64) -> Self {
        Self::new(MockBehavior::Slow { delay_ms })
    }

    /// Number of generation requests received
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Prompts received, in order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    /// Raw model answer for `prompt`, or the simulated failure
    async fn answer(&self, prompt: &str) -> Result<String, ProviderError> {
        let count = self.request_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        match self.behavior {
            MockBehavior::Working => Ok(json!({ "facts": [], "prompt_chars": prompt.chars().count() }).to_string()),
            MockBehavior::Intermittent { fail_every } => {
                if fail_every > 0 && count % fail_every == fail_every - 1 {
                    Err(ProviderError::ApiError {
                        message: format!("Simulated intermittent failure (request #{})", count + 1),
                        status_code: 503,
                    })
                } else {
                    Ok(json!({ "facts": [] }).to_string())
                }
            }
            MockBehavior::Failing => Err(ProviderError::ConnectionError(
                "Simulated backend failure".to_string(),
            )),
            MockBehavior::Malformed => Ok("Sure! Here are the facts you asked for".to_string()),
            MockBehavior::Slow { delay_ms } => {
                tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
                Ok(json!({ "facts": [] }).to_string())
            }
        }
    }
}

impl Clone for MockBackend {
    fn clone(&self) -> Self {
        Self {
            behavior: self.behavior,
            model: self.model.clone(),
            request_count: Arc::clone(&self.request_count),
            prompts: Arc::clone(&self.prompts),
        }
    }
}

#[async_trait]
impl ExtractionBackend for MockBackend {
    async fn generate_text(&self, prompt: &str) -> Result<String, ProviderError> {
        self.answer(prompt).await
    }

    async fn generate_structured(&self, prompt: &str, _schema: Option<&Value>) -> Result<Value, ProviderError> {
        let raw = self.answer(prompt).await?;
        parse_structured(&raw)
    }

    async fn chat_completion(&self, messages: Vec<ChatMessage>) -> Result<String, ProviderError> {
        let prompt = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        self.answer(&prompt).await
    }

    async fn is_available(&self) -> bool {
        !matches!(self.behavior, MockBehavior::Failing)
    }

    async fn model_info(&self) -> Option<Value> {
        self.is_available()
            .await
            .then(|| json!({ "name": self.model, "details": { "family": "mock" } }))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
