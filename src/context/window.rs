/*!
 * Sliding window context for message analysis.
 *
 * The context of a target message is the union of:
 * - Neighbors: up to `window_size` messages on each side in export order
 * - The target itself (optional)
 * - Reply chain: up to `reply_depth` ancestors reached through reply links
 *
 * The result is deduplicated and sorted by message id.
 */

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};

use crate::errors::ContextError;
use crate::transcript::{is_sorted_by_id, Message, MessageId, MessageKind, Transcript};

/// Configuration for context window sizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextWindowConfig {
    /// Number of messages to include before and after the target
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Maximum number of reply links to follow from the target
    #[serde(default = "default_reply_depth")]
    pub reply_depth: usize,

    /// Whether the target message is part of its own context
    #[serde(default = "default_include_target")]
    pub include_target: bool,
}

fn default_window_size() -> usize {
    5
}

fn default_reply_depth() -> usize {
    3
}

fn default_include_target() -> bool {
    true
}

impl Default for ContextWindowConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            reply_depth: default_reply_depth(),
            include_target: default_include_target(),
        }
    }
}

impl ContextWindowConfig {
    pub fn new(window_size: usize, reply_depth: usize, include_target: bool) -> Self {
        Self {
            window_size,
            reply_depth,
            include_target,
        }
    }

    /// Only the target, no neighbors and no reply chain
    pub fn target_only() -> Self {
        Self::new(0, 0, true)
    }
}

/// Messages judged relevant to one target, sorted ascending by id.
#[derive(Debug, Clone)]
pub struct MessageContext<'a> {
    target_id: MessageId,
    messages: Vec<&'a Message>,
}

impl<'a> MessageContext<'a> {
    fn empty(target_id: MessageId) -> Self {
        Self {
            target_id,
            messages: Vec::new(),
        }
    }

    pub fn target_id(&self) -> MessageId {
        self.target_id
    }

    pub fn messages(&self) -> &[&'a Message] {
        &self.messages
    }

    pub fn ids(&self) -> Vec<MessageId> {
        self.messages.iter().map(|m| m.id).collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.messages.binary_search_by_key(&id, |m| m.id).is_ok()
    }

    /// One line per message; the target line starts with `>`.
    pub fn render(&self) -> String {
        self.messages
            .iter()
            .map(|message| {
                let marker = if message.id == self.target_id { '>' } else { ' ' };
                format!(
                    "{} [{}] {}: {}",
                    marker,
                    message.id,
                    message.sender().unwrap_or("system"),
                    message.plain_text()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Computes the context of any message of one transcript.
///
/// The id index is built once at construction and never rebuilt; a changed
/// message list needs a new engine.
#[derive(Debug, Clone)]
pub struct ContextEngine<'a> {
    messages: &'a [Message],
    positions: Cow<'a, HashMap<MessageId, usize>>,
    config: ContextWindowConfig,
    sorted: bool,
}

impl<'a> ContextEngine<'a> {
    /// Index `messages` for context lookups.
    ///
    /// Unsorted input is accepted with a warning; windows then follow the
    /// actual export order.
    pub fn new(messages: &'a [Message], config: ContextWindowConfig) -> Result<Self, ContextError> {
        let mut positions = HashMap::with_capacity(messages.len());
        for (index, message) in messages.iter().enumerate() {
            if positions.insert(message.id, index).is_some() {
                return Err(ContextError::DuplicateMessageId(message.id));
            }
        }

        Ok(Self::with_index(messages, Cow::Owned(positions), is_sorted_by_id(messages), config))
    }

    /// Engine over a transcript, borrowing its id index instead of rebuilding it
    pub fn for_transcript(transcript: &'a Transcript, config: ContextWindowConfig) -> Self {
        Self::with_index(
            transcript.messages(),
            Cow::Borrowed(transcript.positions()),
            transcript.is_sorted(),
            config,
        )
    }

    fn with_index(
        messages: &'a [Message],
        positions: Cow<'a, HashMap<MessageId, usize>>,
        sorted: bool,
        config: ContextWindowConfig,
    ) -> Self {
        if !sorted {
            warn!("Messages are not sorted by ID. Context windows follow export order and may be inaccurate.");
        }

        Self {
            messages,
            positions,
            config,
            sorted,
        }
    }

    pub fn config(&self) -> &ContextWindowConfig {
        &self.config
    }

    /// Whether the indexed messages were sorted by id
    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Context for `target`, or an empty result if its id is unknown here.
    ///
    /// The record indexed under `target.id` is the one used for the window
    /// and the reply walk.
    pub fn context_for(&self, target: &Message) -> MessageContext<'a> {
        let Some(&position) = self.positions.get(&target.id) else {
            warn!("Message with ID {} not found in the indexed message list", target.id);
            return MessageContext::empty(target.id);
        };
        let indexed = &self.messages[position];

        let mut collected: BTreeMap<MessageId, &'a Message> = BTreeMap::new();

        let start = position.saturating_sub(self.config.window_size);
        let end = position
            .saturating_add(self.config.window_size)
            .saturating_add(1)
            .min(self.messages.len());
        for (index, message) in self.messages[start..end].iter().enumerate() {
            if start + index != position {
                collected.insert(message.id, message);
            }
        }

        if self.config.include_target {
            collected.insert(indexed.id, indexed);
        }

        for ancestor in self.reply_chain(indexed) {
            collected.insert(ancestor.id, ancestor);
        }

        MessageContext {
            target_id: target.id,
            messages: collected.into_values().collect(),
        }
    }

    /// Ancestors of `start`, nearest first.
    ///
    /// Every hop consumes one unit of depth, so a cyclic chain stops after
    /// `reply_depth` hops.
    fn reply_chain(&self, start: &'a Message) -> Vec<&'a Message> {
        let mut chain = Vec::new();
        let mut current = start;
        let mut remaining = self.config.reply_depth;

        while remaining > 0 {
            remaining -= 1;

            let parent_id = match &current.kind {
                MessageKind::Ordinary(ordinary) => match ordinary.reply_to_message_id {
                    Some(parent_id) => parent_id,
                    None => break,
                },
                MessageKind::Service(_) => break,
            };

            let Some(&parent_position) = self.positions.get(&parent_id) else {
                debug!(
                    "Message {} replies to {} which is not in the transcript",
                    current.id, parent_id
                );
                break;
            };

            let parent = &self.messages[parent_position];
            chain.push(parent);
            current = parent;
        }

        chain
    }

    /// Every message in export order with its context. Each call starts over.
    pub fn iterate_with_context(&self) -> ContextIter<'_, 'a> {
        ContextIter {
            engine: self,
            next_index: 0,
        }
    }
}

/// Iterator that yields each message together with its context.
pub struct ContextIter<'e, 'a> {
    engine: &'e ContextEngine<'a>,
    next_index: usize,
}

impl<'e, 'a> Iterator for ContextIter<'e, 'a> {
    type Item = (&'a Message, MessageContext<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        let message = self.engine.messages.get(self.next_index)?;
        self.next_index += 1;
        Some((message, self.engine.context_for(message)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.engine.messages.len() - self.next_index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ContextIter<'_, '_> {}

/// Extension trait for Transcript to create context engines.
pub trait ContextExt {
    fn context_engine(&self, config: ContextWindowConfig) -> Result<ContextEngine<'_>, ContextError>;
}

impl ContextExt for Transcript {
    fn context_engine(&self, config: ContextWindowConfig) -> Result<ContextEngine<'_>, ContextError> {
        Ok(ContextEngine::for_transcript(self, config))
    }
}
