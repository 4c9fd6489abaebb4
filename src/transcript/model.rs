/*!
 * Typed records for a chat export.
 *
 * A `Message` carries the fields shared by every entry plus a `MessageKind`
 * that separates ordinary messages from service events. Only ordinary
 * messages can reply to another message.
 */

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity key of a message within one export
pub type MessageId = i64;

/// Styling or entity kind of one span of rich text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Plain,
    Bold,
    Italic,
    Code,
    Pre,
    Url,
    TextLink,
    Mention,
    MentionName,
    Hashtag,
    Underline,
    Strikethrough,
    Spoiler,
    CustomEmoji,
    Phone,
    Email,
    Cashtag,
    BotCommand,
    Blockquote,
    Link,
}

/// A styled span inside a rich text body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextEntity {
    #[serde(rename = "type")]
    pub kind: EntityType,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

/// One element of a rich text body: either bare text or a styled span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TextPart {
    Plain(String),
    Entity(TextEntity),
}

impl TextPart {
    fn as_str(&self) -> &str {
        match self {
            TextPart::Plain(text) => text,
            TextPart::Entity(entity) => &entity.text,
        }
    }
}

/// Message body as exported: a flat string or an ordered list of spans
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageText {
    Plain(String),
    Rich(Vec<TextPart>),
}

impl Default for MessageText {
    fn default() -> Self {
        MessageText::Plain(String::new())
    }
}

impl MessageText {
    /// Concatenate every span, dropping styling
    pub fn plain_text(&self) -> String {
        match self {
            MessageText::Plain(text) => text.clone(),
            MessageText::Rich(parts) => parts.iter().map(TextPart::as_str).collect(),
        }
    }
}

/// Kind of event recorded by a service message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    InviteMembers,
    PhotoChanged,
    TitleChanged,
    LeftGroup,
    PinMessage,
    CreateGroup,
    CreateChannel,
    EditMessage,
    DeleteMessage,
    JoinGroupByLink,
    MigrateToSupergroup,
    MigrateFromGroup,
    RemoveMembers,
    DeleteGroupPhoto,
    PhoneCall,
    GroupCall,
    ScoreInGame,
    ClearHistory,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // serde already owns the snake_case spelling
        let name = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        f.write_str(&name)
    }
}

/// Fields specific to a message written by a participant
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OrdinaryMessage {
    pub text: MessageText,
    pub reply_to_message_id: Option<MessageId>,
    pub forwarded_from: Option<String>,
    pub forwarded_from_id: Option<String>,
    pub file: Option<String>,
    pub mime_type: Option<String>,
    pub photo: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Fields specific to a system event (joins, pins, title changes, ...)
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceMessage {
    pub action: ActionType,
    pub actor: Option<String>,
    pub actor_id: Option<String>,
    pub members: Option<Vec<Option<String>>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageKind {
    Ordinary(OrdinaryMessage),
    Service(ServiceMessage),
}

/// One transcript entry. Built once by the loader, never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: MessageId,
    /// Wall-clock time as exported
    pub date: NaiveDateTime,
    pub date_unixtime: i64,
    pub from: Option<String>,
    pub from_id: Option<String>,
    pub edited: Option<NaiveDateTime>,
    pub edited_unixtime: Option<i64>,
    pub kind: MessageKind,
}

impl Message {
    /// Create an ordinary message with only the required fields set
    pub fn ordinary(id: MessageId, date: NaiveDateTime, text: impl Into<String>) -> Self {
        Self {
            id,
            date,
            date_unixtime: date.and_utc().timestamp(),
            from: None,
            from_id: None,
            edited: None,
            edited_unixtime: None,
            kind: MessageKind::Ordinary(OrdinaryMessage {
                text: MessageText::Plain(text.into()),
                ..Default::default()
            }),
        }
    }

    /// Create a service message with only the required fields set
    pub fn service(id: MessageId, date: NaiveDateTime, action: ActionType) -> Self {
        Self {
            id,
            date,
            date_unixtime: date.and_utc().timestamp(),
            from: None,
            from_id: None,
            edited: None,
            edited_unixtime: None,
            kind: MessageKind::Service(ServiceMessage {
                action,
                actor: None,
                actor_id: None,
                members: None,
            }),
        }
    }

    /// Set the sender name and id
    pub fn with_sender(mut self, name: impl Into<String>, id: impl Into<String>) -> Self {
        self.from = Some(name.into());
        self.from_id = Some(id.into());
        self
    }

    /// Make this message a reply to `parent`. No effect on service messages.
    pub fn replying_to(mut self, parent: MessageId) -> Self {
        if let MessageKind::Ordinary(ordinary) = &mut self.kind {
            ordinary.reply_to_message_id = Some(parent);
        }
        self
    }

    pub fn is_service(&self) -> bool {
        matches!(self.kind, MessageKind::Service(_))
    }

    /// Parent id for ordinary replies; service messages never reply
    pub fn reply_to(&self) -> Option<MessageId> {
        match &self.kind {
            MessageKind::Ordinary(ordinary) => ordinary.reply_to_message_id,
            MessageKind::Service(_) => None,
        }
    }

    /// Who sent or performed this message, if known
    pub fn sender(&self) -> Option<&str> {
        match &self.kind {
            MessageKind::Ordinary(_) => self.from.as_deref(),
            MessageKind::Service(service) => service.actor.as_deref().or(self.from.as_deref()),
        }
    }

    /// Content rendered as plain text
    pub fn plain_text(&self) -> String {
        match &self.kind {
            MessageKind::Ordinary(ordinary) => ordinary.text.plain_text(),
            MessageKind::Service(service) => match &service.actor {
                Some(actor) => format!("{} by {}", service.action, actor),
                None => service.action.to_string(),
            },
        }
    }

    /// "message" or "service", as spelled in the export
    pub fn type_name(&self) -> &'static str {
        match self.kind {
            MessageKind::Ordinary(_) => "message",
            MessageKind::Service(_) => "service",
        }
    }
}
