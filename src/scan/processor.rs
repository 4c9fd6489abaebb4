/*!
 * Per-message work performed during a scan.
 */

use async_trait::async_trait;
use log::{debug, error};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::context::MessageContext;
use crate::errors::ProviderError;
use crate::file_utils::FileManager;
use crate::providers::ExtractionBackend;
use crate::transcript::Message;

/// Work done for one message once its context is known
#[async_trait]
pub trait MessageProcessor: Send + Sync {
    /// Process `message`. `Ok(None)` means there was nothing to extract.
    async fn process(
        &self,
        message: &Message,
        context: &MessageContext<'_>,
    ) -> Result<Option<Value>, ProviderError>;
}

/// Computes contexts and nothing else
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProcessor;

#[async_trait]
impl MessageProcessor for NoopProcessor {
    async fn process(
        &self,
        message: &Message,
        context: &MessageContext<'_>,
    ) -> Result<Option<Value>, ProviderError> {
        debug!(
            "Message {} has {} messages of context",
            message.id,
            context.len()
        );
        Ok(None)
    }
}

/// Sends each message with its context to an extraction backend
#[derive(Debug, Clone)]
pub struct BackendProcessor {
    backend: Arc<dyn ExtractionBackend>,
    prompt_template: String,
    output_schema: Option<Value>,
    call_timeout: Duration,
    output_path: Option<PathBuf>,
}

impl BackendProcessor {
    pub fn new(backend: Arc<dyn ExtractionBackend>, prompt_template: impl Into<String>) -> Self {
        Self {
            backend,
            prompt_template: prompt_template.into(),
            output_schema: None,
            call_timeout: Duration::from_secs(120),
            output_path: None,
        }
    }

    /// Schema the structured output must follow
    pub fn with_schema(mut self, schema: Option<Value>) -> Self {
        self.output_schema = schema;
        self
    }

    /// Bound for one backend call, retries included
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Append `{message_id, result}` lines to this JSONL file
    pub fn with_output_path(mut self, output_path: Option<PathBuf>) -> Self {
        self.output_path = output_path;
        self
    }

    /// Fill the `{context}` and `{message}` placeholders
    pub fn render_prompt(&self, message: &Message, context: &MessageContext<'_>) -> String {
        let target = format!(
            "[{}] {}: {}",
            message.id,
            message.sender().unwrap_or("system"),
            message.plain_text()
        );
        self.prompt_template
            .replace("{context}", &context.render())
            .replace("{message}", &target)
    }
}

#[async_trait]
impl MessageProcessor for BackendProcessor {
    async fn process(
        &self,
        message: &Message,
        context: &MessageContext<'_>,
    ) -> Result<Option<Value>, ProviderError> {
        let prompt = self.render_prompt(message, context);
        let call = self
            .backend
            .generate_structured(&prompt, self.output_schema.as_ref());

        let result = tokio::time::timeout(self.call_timeout, call)
            .await
            .map_err(|_| ProviderError::Timeout(self.call_timeout.as_secs()))??;

        if let Some(path) = &self.output_path {
            let line = json!({ "message_id": message.id, "result": result }).to_string();
            if let Err(e) = FileManager::append_line(path, &line) {
                error!(
                    "Failed to write extraction result for message {} to {}: {}",
                    message.id,
                    path.display(),
                    e
                );
            }
        }

        Ok(Some(result))
    }
}
