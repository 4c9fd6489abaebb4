use anyhow::{anyhow, Context, Result};
use log::{LevelFilter, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::default::Default;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::context::ContextWindowConfig;

/// Upper bound for `extraction.max_retries`
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    /// Where processing progress is persisted
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,

    /// Export analyzed when no path is given on the command line
    #[serde(default = "default_export_path")]
    pub default_export_path: PathBuf,

    /// Directory for log files
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Context window settings
    #[serde(default)]
    pub context: ContextWindowConfig,

    /// Per-message extraction settings
    #[serde(default)]
    pub extraction: ExtractionConfig,
}

/// Extraction backend configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ExtractionConfig {
    /// Send every message to the backend during a scan
    #[serde(default)]
    pub enabled: bool,

    /// Service endpoint URL
    #[serde(default = "default_ollama_endpoint")]
    pub endpoint: String,

    /// Model name (e.g., "gemma3n:latest")
    #[serde(default = "default_ollama_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries for connection errors and server errors
    #[serde(default = "default_retry_count")]
    pub max_retries: u32,

    /// Base backoff, doubled on each retry
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Back-to-back failures after which the scan is aborted
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    /// Prompt with `{context}` and `{message}` placeholders
    #[serde(default = "default_prompt_template")]
    pub prompt_template: String,

    /// JSON schema for structured output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,

    /// JSONL file receiving one line per extracted message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_ollama_endpoint(),
            model: default_ollama_model(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_consecutive_failures: default_max_consecutive_failures(),
            prompt_template: default_prompt_template(),
            output_schema: None,
            output_path: None,
        }
    }
}

impl ExtractionConfig {
    /// Upper bound for one backend call including every retry and backoff
    pub fn call_timeout(&self) -> Duration {
        let attempts = u64::from(self.max_retries) + 1;
        // base * (2^0 + ... + 2^(n-1)) = base * (2^n - 1)
        let doublings = 1u64
            .checked_shl(self.max_retries)
            .map_or(u64::MAX, |power| power - 1);
        let backoff_ms = self.retry_backoff_ms.saturating_mul(doublings);
        Duration::from_secs(self.timeout_secs.saturating_mul(attempts))
            .saturating_add(Duration::from_millis(backoff_ms))
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

fn default_state_file() -> PathBuf {
    PathBuf::from("data/processing_state.json")
}

fn default_export_path() -> PathBuf {
    PathBuf::from("data/telegram_dump.json")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_ollama_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "gemma3n:latest".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_retry_count() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    1000 // 1 second base backoff time, doubled on each retry
}

fn default_max_consecutive_failures() -> u32 {
    5
}

fn default_prompt_template() -> String {
    "Conversation excerpt (the line starting with '>' is the message to analyze):\n\
     {context}\n\n\
     Message to analyze:\n\
     {message}\n\n\
     Answer with a JSON object."
        .to_string()
}

impl Config {
    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        if self.state_file.as_os_str().is_empty() {
            return Err(anyhow!("State file path must not be empty"));
        }

        let extraction = &self.extraction;
        if extraction.enabled {
            if extraction.model.trim().is_empty() {
                return Err(anyhow!("An extraction model is required when extraction is enabled"));
            }
            if extraction.endpoint.trim().is_empty() {
                return Err(anyhow!("An extraction endpoint is required when extraction is enabled"));
            }
        }
        if !extraction.prompt_template.contains("{context}") {
            return Err(anyhow!("Prompt template must contain the {{context}} placeholder"));
        }
        if extraction.max_retries > MAX_RETRIES_LIMIT {
            return Err(anyhow!(
                "max_retries must be at most {} (got {})",
                MAX_RETRIES_LIMIT,
                extraction.max_retries
            ));
        }
        if extraction.max_consecutive_failures == 0 {
            return Err(anyhow!("max_consecutive_failures must be at least 1"));
        }

        Ok(())
    }

    /// Load `path`, or write the default configuration there if it is missing
    pub fn load_or_create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to open config file: {}", path.display()))?;
            return serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()));
        }

        warn!("Config file not found at '{}', creating default config.", path.display());
        let config = Config::default();
        config.save(path)?;
        Ok(config)
    }

    /// Write the configuration as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).context("Failed to serialize config to JSON")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write config to file: {}", path.display()))
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            state_file: default_state_file(),
            default_export_path: default_export_path(),
            log_dir: default_log_dir(),
            log_level: LogLevel::default(),
            context: ContextWindowConfig::default(),
            extraction: ExtractionConfig::default(),
        }
    }
}
