use async_trait::async_trait;
use log::{debug, error, info, warn};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use url::Url;

use crate::errors::ProviderError;

use super::ExtractionBackend;

/// Model pulls download whole weights files
const PULL_TIMEOUT_SECS: u64 = 3600;

/// Ollama client for interacting with the Ollama API
#[derive(Debug)]
pub struct OllamaBackend {
    /// Base URL of the Ollama API, without trailing slash
    base_url: String,
    /// Model used for every request
    model: String,
    /// HTTP client for making requests
    client: Client,
    /// Per-request timeout in seconds
    timeout_secs: u64,
    /// Maximum number of retry attempts
    max_retries: u32,
    /// Base backoff time in milliseconds for exponential backoff
    backoff_base_ms: u64,
}

/// Generate request for the Ollama API
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Model name to use for generation
    model: String,
    /// Prompt to generate from
    prompt: String,
    /// System message to guide the model
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    /// Additional model parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerationOptions>,
    /// `"json"` or a JSON schema the output must follow
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<Value>,
    /// Whether to stream the response
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    /// How long to keep the model loaded in memory
    #[serde(skip_serializing_if = "Option::is_none")]
    keep_alive: Option<String>,
}

/// Generation options for the Ollama API
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct GenerationOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
    /// Maximum number of tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

/// Generation response from the Ollama API
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationResponse {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub created_at: String,
    /// Generated text
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
    /// Number of prompt tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_eval_count: Option<u64>,
    /// Number of generated tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eval_count: Option<u64>,
}

/// Chat message object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender (system, user, assistant, or tool)
    pub role: String,
    /// Content of the message
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Chat request for the Ollama API
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerationOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    keep_alive: Option<String>,
}

/// Chat response from the Ollama API
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub created_at: String,
    /// Response message
    pub message: ChatMessage,
    #[serde(default)]
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_eval_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eval_count: Option<u64>,
}

/// Locally installed models, as listed by `/api/tags`
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TagsResponse {
    #[serde(default)]
    pub models: Vec<Value>,
}

impl TagsResponse {
    /// Entry of the model called `name`
    pub fn find_model(&self, name: &str) -> Option<&Value> {
        self.models
            .iter()
            .find(|model| model.get("name").and_then(Value::as_str) == Some(name))
    }
}

#[derive(Debug, Serialize)]
struct PullRequest<'a> {
    name: &'a str,
    stream: bool,
}

/// One status line of a streamed model pull
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullEvent {
    /// Intermediate status such as "downloading"
    Progress(String),
    /// The model is installed
    Success,
    /// The server reported an error
    Failed(String),
    /// The line was not JSON
    Unreadable,
}

impl PullEvent {
    pub fn parse(line: &str) -> Self {
        let Ok(value) = serde_json::from_str::<Value>(line) else {
            return PullEvent::Unreadable;
        };
        if let Some(error) = value.get("error").and_then(Value::as_str) {
            return PullEvent::Failed(error.to_string());
        }
        match value.get("status").and_then(Value::as_str) {
            Some("success") => PullEvent::Success,
            Some(status) => PullEvent::Progress(status.to_string()),
            None => PullEvent::Progress(String::new()),
        }
    }
}

/// Splits a chunked byte stream into newline-delimited lines
#[derive(Debug, Default)]
pub struct NdjsonLines {
    buffer: Vec<u8>,
}

impl NdjsonLines {
    /// Feed a chunk and take every line it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(end) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=end).collect();
            let text = String::from_utf8_lossy(&line).trim().to_string();
            if !text.is_empty() {
                lines.push(text);
            }
        }
        lines
    }

    /// Whatever is left after the stream ended without a newline
    pub fn finish(self) -> Option<String> {
        let text = String::from_utf8_lossy(&self.buffer).trim().to_string();
        (!text.is_empty()).then_some(text)
    }
}

/// Builder methods for GenerationRequest
impl GenerationRequest {
    /// Create a new non-streaming generation request
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            system: None,
            options: None,
            format: None,
            stream: Some(false),
            keep_alive: None,
        }
    }

    /// Set the system prompt
    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set the temperature
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.options.get_or_insert_with(GenerationOptions::default).temperature = Some(temperature);
        self
    }

    /// Constrain the output to `schema`, or to any JSON when `None`
    pub fn structured(mut self, schema: Option<&Value>) -> Self {
        self.format = Some(
            schema
                .cloned()
                .unwrap_or_else(|| Value::String("json".to_string())),
        );
        self
    }

    /// Set the keep-alive duration
    pub fn keep_alive(mut self, keep_alive: impl Into<String>) -> Self {
        self.keep_alive = Some(keep_alive.into());
        self
    }
}

/// Builder methods for ChatRequest
impl ChatRequest {
    /// Create a new non-streaming chat request
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            options: None,
            format: None,
            stream: Some(false),
            keep_alive: None,
        }
    }

    /// Set the temperature
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.options.get_or_insert_with(GenerationOptions::default).temperature = Some(temperature);
        self
    }

    /// Set the keep-alive duration
    pub fn keep_alive(mut self, keep_alive: impl Into<String>) -> Self {
        self.keep_alive = Some(keep_alive.into());
        self
    }
}

impl OllamaBackend {
    /// Client with the default timeout (120 s), 2 retries and 1 s backoff
    pub fn new(endpoint: &str, model: impl Into<String>) -> Self {
        Self::with_config(endpoint, model, 120, 2, 1000)
    }

    /// Client with explicit timeout and retry settings
    pub fn with_config(
        endpoint: &str,
        model: impl Into<String>,
        timeout_secs: u64,
        max_retries: u32,
        backoff_base_ms: u64,
    ) -> Self {
        Self {
            base_url: normalize_endpoint(endpoint),
            model: model.into(),
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                // Ollama speaks HTTP/1.1
                .http1_only()
                .pool_idle_timeout(Duration::from_secs(90))
                .tcp_keepalive(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            timeout_secs,
            max_retries,
            backoff_base_ms,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Generate text with retry logic
    pub async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, ProviderError> {
        let body = self.post_with_retry("/api/generate", &request).await?;
        parse_generation_body(&body)
    }

    /// Chat completion with retry logic
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let body = self.post_with_retry("/api/chat", &request).await?;
        parse_chat_body(&body)
    }

    /// List locally installed models
    pub async fn tags(&self) -> Result<TagsResponse, ProviderError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let body = read_success_body(response).await?;
        parse_json(&body)
    }

    /// Pull the configured model, following the streamed status lines.
    ///
    /// Fails with `ModelUnavailable` if the server reports an error or the
    /// stream ends without success.
    pub async fn pull(&self) -> Result<(), ProviderError> {
        let url = format!("{}/api/pull", self.base_url);
        let mut response = self
            .client
            .post(&url)
            .timeout(Duration::from_secs(PULL_TIMEOUT_SECS))
            .json(&PullRequest {
                name: &self.model,
                stream: true,
            })
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status_code: status.as_u16(),
                message,
            });
        }

        let mut lines = NdjsonLines::default();
        let mut succeeded = false;
        while let Some(chunk) = response.chunk().await.map_err(|e| self.transport_error(e))? {
            for line in lines.push(&chunk) {
                succeeded |= self.follow_pull_line(&line)?;
            }
        }
        if let Some(line) = lines.finish() {
            succeeded |= self.follow_pull_line(&line)?;
        }

        if succeeded {
            Ok(())
        } else {
            error!("Pull stream for '{}' ended without success", self.model);
            Err(ProviderError::ModelUnavailable(self.model.clone()))
        }
    }

    /// `Ok(true)` on the success line, `ModelUnavailable` on an error line
    fn follow_pull_line(&self, line: &str) -> Result<bool, ProviderError> {
        match PullEvent::parse(line) {
            PullEvent::Success => {
                info!("Successfully pulled model '{}'", self.model);
                Ok(true)
            }
            PullEvent::Failed(message) => {
                error!("Error pulling model '{}': {}", self.model, message);
                Err(ProviderError::ModelUnavailable(self.model.clone()))
            }
            PullEvent::Progress(status) => {
                debug!("Pull progress for {}: {}", self.model, status);
                Ok(false)
            }
            PullEvent::Unreadable => {
                warn!("Received non-JSON line during pull: {}", line);
                Ok(false)
            }
        }
    }

    async fn post_with_retry<T: Serialize + Sync>(
        &self,
        endpoint: &str,
        body: &T,
    ) -> Result<String, ProviderError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let mut attempt = 0;

        loop {
            let result = match self.client.post(&url).json(body).send().await {
                Ok(response) => read_success_body(response).await,
                Err(e) => Err(self.transport_error(e)),
            };

            match result {
                Ok(body) => return Ok(body),
                Err(e) if is_retryable(&e) && attempt < self.max_retries => {
                    attempt += 1;
                    let backoff_ms = backoff_delay_ms(self.backoff_base_ms, attempt - 1);
                    warn!(
                        "Ollama request to {} failed: {} - retrying in {} ms (attempt {}/{})",
                        endpoint,
                        e,
                        backoff_ms,
                        attempt + 1,
                        self.max_retries + 1
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                }
                Err(e) => {
                    error!("Ollama request to {} failed: {}", endpoint, e);
                    return Err(e);
                }
            }
        }
    }

    fn transport_error(&self, e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::Timeout(self.timeout_secs)
        } else if e.is_connect() {
            ProviderError::ConnectionError(format!(
                "Could not connect to Ollama at {}: {}",
                self.base_url, e
            ))
        } else {
            ProviderError::RequestFailed(e.to_string())
        }
    }
}

#[async_trait]
impl ExtractionBackend for OllamaBackend {
    async fn generate_text(&self, prompt: &str) -> Result<String, ProviderError> {
        debug!("Sending generate request to Ollama for model {}", self.model);
        let response = self.generate(GenerationRequest::new(&self.model, prompt)).await?;
        Ok(response.response.trim().to_string())
    }

    async fn generate_structured(&self, prompt: &str, schema: Option<&Value>) -> Result<Value, ProviderError> {
        debug!("Sending structured generate request to Ollama for model {}", self.model);
        let request = GenerationRequest::new(&self.model, prompt).structured(schema);
        let response = self.generate(request).await?;
        parse_structured(&response.response)
    }

    async fn chat_completion(&self, messages: Vec<ChatMessage>) -> Result<String, ProviderError> {
        debug!("Sending chat completion request to Ollama for model {}", self.model);
        let response = self.chat(ChatRequest::new(&self.model, messages)).await?;
        Ok(response.message.content.trim().to_string())
    }

    async fn is_available(&self) -> bool {
        let tags = match self.tags().await {
            Ok(tags) => tags,
            Err(e) => {
                error!("Ollama service or model check failed: {}", e);
                return false;
            }
        };
        info!("Ollama service is reachable at {}", self.base_url);

        if tags.find_model(&self.model).is_some() {
            info!("Model '{}' is already available", self.model);
            return true;
        }

        warn!("Model '{}' not found locally. Attempting to pull...", self.model);
        match self.pull().await {
            Ok(()) => true,
            Err(e) => {
                error!("Request error during model pull for '{}': {}", self.model, e);
                false
            }
        }
    }

    async fn model_info(&self) -> Option<Value> {
        match self.tags().await {
            Ok(tags) => {
                let info = tags.find_model(&self.model).cloned();
                if info.is_none() {
                    warn!("Model '{}' not found in Ollama's list of models", self.model);
                }
                info
            }
            Err(e) => {
                error!("Failed to get model info for '{}': {}", self.model, e);
                None
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Base URL with a scheme and without trailing slash
pub fn normalize_endpoint(raw: &str) -> String {
    let raw = raw.trim().trim_end_matches('/');
    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{}", raw)
    };
    match Url::parse(&with_scheme) {
        Ok(url) => url.as_str().trim_end_matches('/').to_string(),
        Err(e) => {
            warn!("Invalid Ollama endpoint '{}': {}", raw, e);
            with_scheme
        }
    }
}

/// Wait before retry number `retry` (0-based): `base_ms * 2^retry`, saturating
pub fn backoff_delay_ms(base_ms: u64, retry: u32) -> u64 {
    base_ms.saturating_mul(1u64.checked_shl(retry).unwrap_or(u64::MAX))
}

/// Connection failures and server errors are worth another attempt
pub fn is_retryable(error: &ProviderError) -> bool {
    match error {
        ProviderError::ConnectionError(_) => true,
        ProviderError::ApiError { status_code, .. } => (500..600).contains(status_code),
        _ => false,
    }
}

/// Parse the `response` field of a structured generation
pub fn parse_structured(response: &str) -> Result<Value, ProviderError> {
    serde_json::from_str(response.trim()).map_err(|e| {
        error!("Failed to parse JSON from Ollama structured output: {}. Response: {}", e, preview(response));
        ProviderError::ParseError(format!("Invalid JSON response from model: {}", e))
    })
}

async fn read_success_body(response: reqwest::Response) -> Result<String, ProviderError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ProviderError::RequestFailed(format!("Failed to read response body: {}", e)))?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(ProviderError::ApiError {
            status_code: status.as_u16(),
            message: body,
        })
    }
}

fn parse_json<R: DeserializeOwned>(body: &str) -> Result<R, ProviderError> {
    serde_json::from_str(body).map_err(|e| {
        error!("Failed to parse Ollama API response: {}. Raw response: {}", e, preview(body));
        ProviderError::ParseError(e.to_string())
    })
}

/// A single object, or newline-delimited chunks when the server streamed anyway
fn parse_generation_body(body: &str) -> Result<GenerationResponse, ProviderError> {
    if let Ok(response) = serde_json::from_str::<GenerationResponse>(body) {
        return Ok(response);
    }

    let chunks: Vec<GenerationResponse> = body
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()
        .map_err(|e| {
            error!("Failed to parse Ollama API response: {}. Raw response: {}", e, preview(body));
            ProviderError::ParseError(e.to_string())
        })?;

    let Some(last) = chunks.last() else {
        return Err(ProviderError::ParseError("Empty response from Ollama".to_string()));
    };
    Ok(GenerationResponse {
        model: last.model.clone(),
        created_at: last.created_at.clone(),
        response: chunks.iter().map(|c| c.response.as_str()).collect(),
        done: last.done,
        prompt_eval_count: last.prompt_eval_count,
        eval_count: last.eval_count,
    })
}

fn parse_chat_body(body: &str) -> Result<ChatResponse, ProviderError> {
    if let Ok(response) = serde_json::from_str::<ChatResponse>(body) {
        return Ok(response);
    }

    let chunks: Vec<ChatResponse> = body
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()
        .map_err(|e| {
            error!("Failed to parse Ollama API chat response: {}. Raw response: {}", e, preview(body));
            ProviderError::ParseError(e.to_string())
        })?;

    let Some(last) = chunks.last() else {
        return Err(ProviderError::ParseError("Empty chat response from Ollama".to_string()));
    };
    Ok(ChatResponse {
        model: last.model.clone(),
        created_at: last.created_at.clone(),
        message: ChatMessage::assistant(
            chunks
                .iter()
                .map(|c| c.message.content.as_str())
                .collect::<String>(),
        ),
        done: last.done,
        prompt_eval_count: last.prompt_eval_count,
        eval_count: last.eval_count,
    })
}

fn preview(text: &str) -> String {
    text.chars().take(500).collect()
}
