//! Persistence for moderation state.

pub mod handled_log;

pub use handled_log::{FileHandledLog, HandledLog};
