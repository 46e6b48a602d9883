//! Chat Sentry: LLM-rated moderation for Telegram group chats.

pub mod channels;
pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod store;
