//! Session message log.
//!
//! Append-only, insertion-ordered record of one chat session. Every message
//! gets a monotonic [`MessageId`] when it is appended, which lets the
//! conversation replace its placeholder by identity even if other writers
//! appended in the meantime.

pub mod export;

use crate::camera::ImageHandle;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, RwLock};

/// Stable identity of a message within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(u64);

impl MessageId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg_{}", self.0)
    }
}

/// One exchanged message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: MessageId,
    /// Message text. Blank user input and empty assistant text are
    /// recorded as `None`, never as `Some("")`.
    pub text: Option<String>,
    /// Photo captured with the message, if any.
    pub photo: Option<ImageHandle>,
    pub is_user: bool,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn has_photo(&self) -> bool {
        self.photo.is_some()
    }

    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}

/// Ordered message log for one session.
#[derive(Debug, Clone)]
pub struct MessageLog {
    messages: Vec<Message>,
    next_id: u64,
}

/// Log shared between the conversation and view-side collaborators.
///
/// Never hold the lock across an `.await`.
pub type SharedMessageLog = Arc<RwLock<MessageLog>>;

impl MessageLog {
    /// Create a log seeded with the assistant's welcome message.
    #[must_use]
    pub fn with_welcome(welcome: &str) -> Self {
        let mut log = Self::empty();
        log.append_assistant(welcome);
        log
    }

    #[must_use]
    pub fn empty() -> Self {
        Self {
            messages: Vec::new(),
            next_id: 1,
        }
    }

    pub fn into_shared(self) -> SharedMessageLog {
        Arc::new(RwLock::new(self))
    }

    fn push(&mut self, text: Option<String>, photo: Option<ImageHandle>, is_user: bool) -> MessageId {
        let id = MessageId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.messages.push(Message {
            id,
            text,
            photo,
            is_user,
            timestamp: Utc::now(),
        });
        id
    }

    /// Append a user message. Blank text is stored as `None`.
    pub fn append_user(&mut self, text: &str, photo: Option<ImageHandle>) -> MessageId {
        let text = Some(text.trim().to_owned()).filter(|t| !t.is_empty());
        self.push(text, photo, true)
    }

    /// Append an assistant message. Empty text is stored as `None`.
    pub fn append_assistant(&mut self, text: &str) -> MessageId {
        let text = Some(text.to_owned()).filter(|t| !t.is_empty());
        self.push(text, None, false)
    }

    /// Remove the message `id` and append an assistant message with `text`.
    ///
    /// If `id` is no longer in the log the replacement is still appended.
    pub fn replace(&mut self, id: MessageId, text: &str) -> MessageId {
        if let Some(pos) = self.messages.iter().position(|m| m.id == id) {
            self.messages.remove(pos);
        }
        self.append_assistant(text)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// True if any assistant message contains `needle`.
    pub fn has_assistant_text(&self, needle: &str) -> bool {
        self.messages
            .iter()
            .any(|m| !m.is_user && m.text.as_deref().is_some_and(|t| t.contains(needle)))
    }
}
