//! Telegram Bot API wire types (the subset the sentry reads).

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::pipeline::types::InboundMessage;

/// Envelope returned by every Bot API method.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    #[serde(default)]
    pub description: Option<String>,
}

/// One entry of `getUpdates`.
#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    /// Unix timestamp.
    #[serde(default)]
    pub date: i64,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

impl From<TelegramMessage> for InboundMessage {
    fn from(msg: TelegramMessage) -> Self {
        InboundMessage {
            chat_id: msg.chat.id,
            message_id: msg.message_id,
            text: msg.text,
            caption: msg.caption,
            sender_id: msg.from.as_ref().map(|u| u.id),
            sender_username: msg.from.and_then(|u| u.username),
            chat_title: msg.chat.title,
            sent_at: DateTime::<Utc>::from_timestamp(msg.date, 0),
        }
    }
}
