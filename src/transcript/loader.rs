/*!
 * Loader for chat export JSON files.
 *
 * Turns the raw export into typed `Message` records. Entries are dispatched
 * on their `type` field; unknown types are skipped so that a newer export
 * format does not reject the whole document.
 */

use chrono::{DateTime, NaiveDateTime};
use log::{debug, error, info};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::errors::TranscriptError;

use super::model::{
    ActionType, Message, MessageId, MessageKind, MessageText, OrdinaryMessage, ServiceMessage,
};
use super::Chat;

// @const: Unix timestamps are exported as strings of digits
static UNIXTIME_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").unwrap());

#[derive(Deserialize)]
struct RawChat {
    name: String,
    #[serde(rename = "type")]
    chat_type: String,
    id: i64,
    #[serde(default)]
    messages: Vec<Value>,
}

#[derive(Deserialize)]
struct RawCommon {
    id: MessageId,
    date: String,
    date_unixtime: String,
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    from_id: Option<String>,
    #[serde(default)]
    edited: Option<String>,
    #[serde(default)]
    edited_unixtime: Option<String>,
}

#[derive(Deserialize)]
struct RawOrdinary {
    #[serde(flatten)]
    common: RawCommon,
    #[serde(default)]
    text: MessageText,
    #[serde(default)]
    reply_to_message_id: Option<MessageId>,
    #[serde(default)]
    forwarded_from: Option<String>,
    #[serde(default)]
    forwarded_from_id: Option<String>,
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    photo: Option<String>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
}

#[derive(Deserialize)]
struct RawService {
    #[serde(flatten)]
    common: RawCommon,
    action: ActionType,
    #[serde(default)]
    actor: Option<String>,
    #[serde(default)]
    actor_id: Option<String>,
    #[serde(default)]
    members: Option<Vec<Option<String>>>,
}

/// Loads and validates one chat export file
#[derive(Debug, Clone)]
pub struct TranscriptLoader {
    path: PathBuf,
}

impl TranscriptLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the file and turn it into a validated `Chat`
    pub fn load_and_validate(&self) -> Result<Chat, TranscriptError> {
        if !self.path.exists() {
            error!("Chat export file not found: {}", self.path.display());
            return Err(TranscriptError::NotFound(self.path.clone()));
        }

        info!("Loading chat export from: {}", self.path.display());
        let content = std::fs::read_to_string(&self.path)?;

        let chat = parse_chat(&content, &self.path).inspect_err(|e| {
            error!("Failed to load chat export {}: {}", self.path.display(), e);
        })?;

        info!(
            "Loaded chat '{}' with {} messages",
            chat.name,
            chat.messages.len()
        );
        Ok(chat)
    }
}

/// Parse export JSON. `source` is only used in error messages.
pub fn parse_chat(content: &str, source: &Path) -> Result<Chat, TranscriptError> {
    let root: Value = serde_json::from_str(content).map_err(|e| TranscriptError::Parse {
        path: source.to_path_buf(),
        reason: e.to_string(),
    })?;

    let raw: RawChat = serde_json::from_value(root)
        .map_err(|e| TranscriptError::validation(None, e.to_string()))?;

    let mut messages = Vec::with_capacity(raw.messages.len());
    let mut seen = HashSet::with_capacity(raw.messages.len());

    for value in raw.messages {
        let Some(message) = parse_message(value)? else {
            continue;
        };
        if !seen.insert(message.id) {
            return Err(TranscriptError::validation(
                Some(message.id),
                "duplicate message id",
            ));
        }
        messages.push(message);
    }

    Ok(Chat {
        name: raw.name,
        chat_type: raw.chat_type,
        id: raw.id,
        messages,
    })
}

/// Parse one message entry; `Ok(None)` when its type is not understood
fn parse_message(value: Value) -> Result<Option<Message>, TranscriptError> {
    let id_hint = value.get("id").and_then(Value::as_i64);
    let kind = value.get("type").and_then(Value::as_str).map(str::to_string);

    match kind.as_deref() {
        Some("message") => {
            let raw: RawOrdinary = serde_json::from_value(value)
                .map_err(|e| TranscriptError::validation(id_hint, e.to_string()))?;
            let kind = MessageKind::Ordinary(OrdinaryMessage {
                text: raw.text,
                reply_to_message_id: raw.reply_to_message_id,
                forwarded_from: raw.forwarded_from,
                forwarded_from_id: raw.forwarded_from_id,
                file: raw.file,
                mime_type: raw.mime_type,
                photo: raw.photo,
                width: raw.width,
                height: raw.height,
            });
            build_message(raw.common, kind).map(Some)
        }
        Some("service") => {
            let raw: RawService = serde_json::from_value(value)
                .map_err(|e| TranscriptError::validation(id_hint, e.to_string()))?;
            let kind = MessageKind::Service(ServiceMessage {
                action: raw.action,
                actor: raw.actor,
                actor_id: raw.actor_id,
                members: raw.members,
            });
            build_message(raw.common, kind).map(Some)
        }
        other => {
            debug!(
                "Skipping message {:?} with unsupported type {:?}",
                id_hint, other
            );
            Ok(None)
        }
    }
}

fn build_message(common: RawCommon, kind: MessageKind) -> Result<Message, TranscriptError> {
    let id = common.id;

    let date = parse_timestamp(&common.date)
        .ok_or_else(|| TranscriptError::validation(Some(id), format!("invalid date '{}'", common.date)))?;
    let date_unixtime = parse_unixtime(&common.date_unixtime).ok_or_else(|| {
        TranscriptError::validation(
            Some(id),
            format!("invalid date_unixtime '{}'", common.date_unixtime),
        )
    })?;

    let edited = match common.edited.as_deref() {
        Some(raw) => Some(parse_timestamp(raw).ok_or_else(|| {
            TranscriptError::validation(Some(id), format!("invalid edited date '{}'", raw))
        })?),
        None => None,
    };
    let edited_unixtime = match common.edited_unixtime.as_deref() {
        Some(raw) => Some(parse_unixtime(raw).ok_or_else(|| {
            TranscriptError::validation(Some(id), format!("invalid edited_unixtime '{}'", raw))
        })?),
        None => None,
    };

    Ok(Message {
        id,
        date,
        date_unixtime,
        from: common.from,
        from_id: common.from_id,
        edited,
        edited_unixtime,
        kind,
    })
}

/// ISO-8601 date-time, with or without fraction and UTC offset
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
        return Some(with_offset.naive_local());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
}

fn parse_unixtime(raw: &str) -> Option<i64> {
    if !UNIXTIME_REGEX.is_match(raw) {
        return None;
    }
    raw.parse().ok()
}
