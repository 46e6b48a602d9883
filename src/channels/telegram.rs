//! Telegram channel: reads recent group messages and deletes flagged ones.
//!
//! Uses the Bot API directly over reqwest. `getUpdates` pages through the
//! update buffer with an `offset` cursor. The cursor only moves once the
//! caller commits a fully handled batch, so a failed run sees the same page
//! again. Telegram confirms (and drops) updates below the offset we send.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use crate::channels::telegram_types::{ApiResponse, Update};
use crate::error::ChannelError;
use crate::pipeline::types::{InboundMessage, MessageDeleter, MessageSource};

const CHANNEL_NAME: &str = "telegram";

/// Default Bot API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// `getUpdates` page size (the Bot API maximum).
const UPDATES_PAGE_LIMIT: usize = 100;

/// Position in the Bot API update buffer.
#[derive(Debug, Default)]
struct UpdateCursor {
    /// Offset sent with `getUpdates`; `None` until the first commit.
    committed: Option<i64>,
    /// Offset just past the last fetched page, applied on commit.
    pending: Option<i64>,
    last_page_full: bool,
}

/// Telegram channel backed by the Bot API.
pub struct TelegramChannel {
    bot_token: String,
    api_base: String,
    client: reqwest::Client,
    cursor: Mutex<UpdateCursor>,
}

impl TelegramChannel {
    pub fn new(bot_token: String) -> Self {
        Self::with_api_base(bot_token, DEFAULT_API_BASE.to_string())
    }

    /// Point the channel at a different Bot API server.
    pub fn with_api_base(bot_token: String, api_base: String) -> Self {
        Self {
            bot_token,
            api_base: api_base.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            cursor: Mutex::new(UpdateCursor::default()),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.bot_token)
    }

    /// `getUpdates` body for the next page.
    async fn updates_request(&self) -> serde_json::Value {
        let mut body = serde_json::json!({
            "allowed_updates": ["message"],
            "limit": UPDATES_PAGE_LIMIT,
        });
        if let Some(offset) = self.cursor.lock().await.committed {
            body["offset"] = offset.into();
        }
        body
    }

    /// Remember where the fetched page ends, without committing it.
    async fn record_page(&self, updates: &[Update]) {
        let mut cursor = self.cursor.lock().await;
        let next = updates.iter().map(|u| u.update_id + 1).max();
        cursor.pending = next.or(cursor.committed);
        cursor.last_page_full = updates.len() >= UPDATES_PAGE_LIMIT;
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<T, ChannelError> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| ChannelError::RequestFailed {
                name: CHANNEL_NAME.into(),
                reason: format!("{method}: {e}"),
            })?;

        // Error responses still carry the JSON envelope, so decode before
        // looking at the status.
        let status = resp.status();
        let envelope: ApiResponse<T> =
            resp.json().await.map_err(|e| ChannelError::InvalidPayload {
                name: CHANNEL_NAME.into(),
                reason: format!("{method} returned {status}: {e}"),
            })?;

        if !envelope.ok {
            return Err(ChannelError::ApiNotOk {
                name: CHANNEL_NAME.into(),
                description: envelope
                    .description
                    .unwrap_or_else(|| format!("{method} returned {status}")),
            });
        }

        envelope.result.ok_or_else(|| ChannelError::InvalidPayload {
            name: CHANNEL_NAME.into(),
            reason: format!("{method} response has no result"),
        })
    }
}

/// Keep message updates that carry moderatable content.
fn collect_messages(updates: Vec<Update>) -> Vec<InboundMessage> {
    let mut messages = Vec::with_capacity(updates.len());
    for update in updates {
        let Some(raw) = update.message else {
            tracing::debug!(update_id = update.update_id, "Skipping non-message update");
            continue;
        };
        let message = InboundMessage::from(raw);
        if message.display_text().is_none() {
            tracing::debug!(
                key = %message.dedup_key(),
                "Skipping message without text or caption"
            );
            continue;
        }
        messages.push(message);
    }
    messages
}

#[async_trait]
impl MessageSource for TelegramChannel {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    async fn fetch_messages(&self) -> Result<Vec<InboundMessage>, ChannelError> {
        let body = self.updates_request().await;
        let updates: Vec<Update> = self.call("getUpdates", &body).await?;
        self.record_page(&updates).await;
        let fetched = updates.len();
        let messages = collect_messages(updates);
        tracing::info!(
            updates = fetched,
            messages = messages.len(),
            "Fetched Telegram updates"
        );
        Ok(messages)
    }

    async fn commit(&self) {
        let mut cursor = self.cursor.lock().await;
        if let Some(offset) = cursor.pending.take() {
            tracing::debug!(offset, "Advancing Telegram update cursor");
            cursor.committed = Some(offset);
        }
    }

    async fn has_more(&self) -> bool {
        self.cursor.lock().await.last_page_full
    }
}

#[async_trait]
impl MessageDeleter for TelegramChannel {
    async fn delete(&self, message: &InboundMessage) -> bool {
        let body = serde_json::json!({
            "chat_id": message.chat_id,
            "message_id": message.message_id,
        });
        match self.call::<bool>("deleteMessage", &body).await {
            Ok(true) => true,
            Ok(false) => {
                tracing::warn!(key = %message.dedup_key(), "deleteMessage returned false");
                false
            }
            Err(e) => {
                tracing::warn!(key = %message.dedup_key(), "Failed to delete message: {e}");
                false
            }
        }
    }
}
