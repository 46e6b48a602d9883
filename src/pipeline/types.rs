//! Shared types for the moderation pipeline.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ChannelError, PipelineError};

// ── Inbound message ─────────────────────────────────────────────────

/// A chat message fetched from the messaging platform.
///
/// Channel adapters convert their native format into this struct. It is
/// read-only once it enters the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Platform-assigned chat id.
    pub chat_id: i64,
    /// Platform-assigned message id, unique within the chat.
    pub message_id: i64,
    /// Message body, if any.
    pub text: Option<String>,
    /// Media caption, if any.
    pub caption: Option<String>,
    /// Numeric id of the sender (if available).
    pub sender_id: Option<i64>,
    /// Sender username (if available).
    pub sender_username: Option<String>,
    /// Group title (if available).
    pub chat_title: Option<String>,
    /// When the message was sent.
    pub sent_at: Option<DateTime<Utc>>,
}

impl InboundMessage {
    /// Bare message with identity and content only.
    pub fn new(
        chat_id: i64,
        message_id: i64,
        text: Option<String>,
        caption: Option<String>,
    ) -> Self {
        Self {
            chat_id,
            message_id,
            text,
            caption,
            sender_id: None,
            sender_username: None,
            chat_title: None,
            sent_at: None,
        }
    }

    /// Shorthand for a text-only message.
    pub fn text(chat_id: i64, message_id: i64, text: impl Into<String>) -> Self {
        Self::new(chat_id, message_id, Some(text.into()), None)
    }

    /// Shorthand for a captioned media message.
    pub fn captioned(chat_id: i64, message_id: i64, caption: impl Into<String>) -> Self {
        Self::new(chat_id, message_id, None, Some(caption.into()))
    }

    pub fn dedup_key(&self) -> DedupKey {
        DedupKey::new(self.chat_id, self.message_id)
    }

    /// Text to rate: the message body if non-empty, else the caption.
    pub fn display_text(&self) -> Option<&str> {
        non_empty(self.text.as_deref()).or_else(|| non_empty(self.caption.as_deref()))
    }

    /// Reject a message with neither text nor caption.
    pub fn validate(&self) -> Result<&str, PipelineError> {
        self.display_text()
            .ok_or_else(|| PipelineError::MalformedInput {
                key: self.dedup_key().to_string(),
            })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

// ── Deduplication key ───────────────────────────────────────────────

/// Stable identity of a message: `"{chat_id}:{message_id}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DedupKey(String);

impl DedupKey {
    pub fn new(chat_id: i64, message_id: i64) -> Self {
        Self(format!("{chat_id}:{message_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<DedupKey> for String {
    fn from(key: DedupKey) -> Self {
        key.0
    }
}

// ── Collaborator traits ─────────────────────────────────────────────

/// Upstream message source, pure I/O.
///
/// Every returned message must pass [`InboundMessage::validate`]; a source
/// that cannot guarantee that must fail instead.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Source name (e.g. "telegram").
    fn name(&self) -> &str;

    /// Fetch the current window of recent messages.
    async fn fetch_messages(&self) -> Result<Vec<InboundMessage>, ChannelError>;

    /// Mark everything returned by the last fetch as consumed, so the next
    /// fetch starts after it. Call only once that batch is fully handled.
    async fn commit(&self) {}

    /// Whether the last fetch stopped at a page limit with more pending.
    async fn has_more(&self) -> bool {
        false
    }
}

/// Deletes a message on the platform.
#[async_trait]
pub trait MessageDeleter: Send + Sync {
    /// Returns `true` when the platform confirmed the deletion.
    async fn delete(&self, message: &InboundMessage) -> bool;
}
