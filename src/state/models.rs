/*!
 * Durable processing state for a transcript scan.
 *
 * The state is a single JSON document saved in full after every change, so
 * an interrupted scan loses at most the message that was in flight.
 */

use chrono::{DateTime, Utc};
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::errors::StateError;
use crate::file_utils::FileManager;
use crate::transcript::MessageId;

/// Processing status enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    /// Nothing done yet
    #[default]
    Pending,
    /// A run has started
    InProgress,
    /// Every message was processed
    Completed,
    /// A fatal error ended the run early
    Failed,
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessingStatus::Pending => write!(f, "pending"),
            ProcessingStatus::InProgress => write!(f, "in_progress"),
            ProcessingStatus::Completed => write!(f, "completed"),
            ProcessingStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for ProcessingStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ProcessingStatus::Pending),
            "in_progress" => Ok(ProcessingStatus::InProgress),
            "completed" => Ok(ProcessingStatus::Completed),
            "failed" => Ok(ProcessingStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid processing status: {}", s)),
        }
    }
}

/// Progress of the analysis of one chat export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingState {
    /// Export this state belongs to
    pub chat_export_path: PathBuf,
    /// Id of the last message recorded as processed, 0 if none
    #[serde(default)]
    pub last_processed_message_id: MessageId,
    /// Messages processed since the last reset
    #[serde(default)]
    pub total_messages_processed: u64,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: ProcessingStatus,
    /// Free-form processing metadata
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ProcessingState {
    /// Fresh state bound to `chat_export_path`
    pub fn new(chat_export_path: impl Into<PathBuf>) -> Self {
        Self {
            chat_export_path: chat_export_path.into(),
            last_processed_message_id: 0,
            total_messages_processed: 0,
            start_time: None,
            end_time: None,
            status: ProcessingStatus::Pending,
            metadata: BTreeMap::new(),
        }
    }

    /// Write the full state to `path`, replacing any previous file atomically
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StateError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        FileManager::write_atomic(path, &json).inspect_err(|e| {
            error!("Failed to save processing state to {}: {}", path.display(), e);
        })?;
        log::debug!("Processing state saved to {}", path.display());
        Ok(())
    }

    /// Load state from `path`.
    ///
    /// A missing file is `Ok(None)`. So is a malformed one, which is logged
    /// and left on disk for inspection.
    pub fn load(path: impl AsRef<Path>) -> Result<Option<Self>, StateError> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No existing state file found at {}", path.display());
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)?;
        let state: Self = match serde_json::from_str(&content) {
            Ok(state) => state,
            Err(e) => {
                error!(
                    "Failed to load or validate processing state from {}: {}",
                    path.display(),
                    e
                );
                return Ok(None);
            }
        };

        if state.last_processed_message_id < 0 {
            error!(
                "Processing state in {} has a negative last processed message id ({})",
                path.display(),
                state.last_processed_message_id
            );
            return Ok(None);
        }

        info!(
            "Processing state loaded from {}. Last processed message ID: {}",
            path.display(),
            state.last_processed_message_id
        );
        Ok(Some(state))
    }

    /// Back to `pending` with all progress cleared. The bound path is kept.
    pub fn reset(&mut self) {
        self.last_processed_message_id = 0;
        self.total_messages_processed = 0;
        self.start_time = None;
        self.end_time = None;
        self.status = ProcessingStatus::Pending;
        self.metadata.clear();
        info!("Processing state reset");
    }

    /// Whether this state belongs to `path`
    pub fn is_bound_to(&self, path: &Path) -> bool {
        if self.chat_export_path == path {
            return true;
        }
        match (self.chat_export_path.canonicalize(), path.canonicalize()) {
            (Ok(stored), Ok(requested)) => stored == requested,
            _ => false,
        }
    }
}

impl fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] last processed id {}, {} messages processed",
            self.chat_export_path.display(),
            self.status,
            self.last_processed_message_id,
            self.total_messages_processed
        )
    }
}
