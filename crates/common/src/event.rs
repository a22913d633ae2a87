//! Conversation identity and stored-record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel thread id for messages outside any topic thread.
///
/// A message without an explicit topic maps to this root value, never to
/// "no key", so the root conversation of a chat is addressable like any
/// other thread.
pub const ROOT_THREAD_ID: i64 = 0;

/// Identity of one chat/topic thread used to partition stored messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey {
    /// Chat identifier from the transport
    pub chat_id: i64,
    /// Topic thread within the chat, [`ROOT_THREAD_ID`] when absent
    pub thread_id: i64,
}

impl ConversationKey {
    /// Key from a chat id and an optional topic thread id.
    pub fn new(chat_id: i64, thread_id: Option<i64>) -> Self {
        Self {
            chat_id,
            thread_id: thread_id.unwrap_or(ROOT_THREAD_ID),
        }
    }

    /// Key for a chat's root conversation (no topic thread).
    pub fn root(chat_id: i64) -> Self {
        Self::new(chat_id, None)
    }
}

/// One stored (timestamp, author, text) tuple. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Arrival time, UTC
    pub timestamp: DateTime<Utc>,
    /// Author display name
    pub author: String,
    /// Message text or caption
    pub text: String,
}

impl Record {
    pub fn new(timestamp: DateTime<Utc>, author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            timestamp,
            author: author.into(),
            text: text.into(),
        }
    }
}

/// One inbound text event, as extracted from the transport envelope.
///
/// The transport is responsible for filling exactly these fields, including
/// resolving "no topic thread" to the root sentinel.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub key: ConversationKey,
    /// Stable author identity, used by the durable tier and the cooldown guard
    pub author_id: i64,
    pub author_name: String,
    pub text: String,
    pub arrived_at: DateTime<Utc>,
}

impl InboundMessage {
    /// The record this event contributes to the retention store.
    pub fn to_record(&self) -> Record {
        Record::new(self.arrived_at, self.author_name.clone(), self.text.clone())
    }
}
