//! Chat channel adapters.

pub mod telegram;
pub mod telegram_types;

pub use telegram::TelegramChannel;
