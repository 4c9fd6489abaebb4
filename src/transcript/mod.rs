/*!
 * Chat transcript model and loading.
 *
 * This module provides:
 * - Typed message records (ordinary and service messages)
 * - A loader that validates an export file
 * - `Transcript`, the ordered and ID-indexed collection the rest of the
 *   crate works on
 */

pub mod loader;
pub mod model;

use std::collections::HashMap;

use crate::errors::ContextError;

pub use loader::TranscriptLoader;
pub use model::{
    ActionType, EntityType, Message, MessageId, MessageKind, MessageText, OrdinaryMessage,
    ServiceMessage, TextEntity, TextPart,
};

/// Top-level structure of a chat export
#[derive(Debug, Clone)]
pub struct Chat {
    pub name: String,
    /// e.g. "personal_chat", "private_group", "channel"
    pub chat_type: String,
    pub id: i64,
    pub messages: Vec<Message>,
}

impl Chat {
    /// Build the indexed transcript for this chat
    pub fn into_transcript(self) -> Result<Transcript, ContextError> {
        Transcript::new(self.name, self.messages)
    }
}

/// Messages in export order plus an `id -> position` index.
///
/// Export order is kept as-is even when it is not sorted by id, because
/// resuming depends on the order matching earlier runs.
#[derive(Debug, Clone)]
pub struct Transcript {
    name: String,
    messages: Vec<Message>,
    positions: HashMap<MessageId, usize>,
}

impl Transcript {
    pub fn new(name: impl Into<String>, messages: Vec<Message>) -> Result<Self, ContextError> {
        let mut positions = HashMap::with_capacity(messages.len());
        for (index, message) in messages.iter().enumerate() {
            if positions.insert(message.id, index).is_some() {
                return Err(ContextError::DuplicateMessageId(message.id));
            }
        }

        Ok(Self {
            name: name.into(),
            messages,
            positions,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.positions.get(&id).map(|&index| &self.messages[index])
    }

    /// Position of `id` in export order
    pub fn position_of(&self, id: MessageId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    /// The `id -> position` index
    pub fn positions(&self) -> &HashMap<MessageId, usize> {
        &self.positions
    }

    /// True when ids strictly increase in export order
    pub fn is_sorted(&self) -> bool {
        is_sorted_by_id(&self.messages)
    }
}

pub(crate) fn is_sorted_by_id(messages: &[Message]) -> bool {
    messages.windows(2).all(|pair| pair[0].id < pair[1].id)
}
