//! Moderation decision pipeline.
//!
//! A fetched batch flows through:
//! 1. `dedup::filter_handled()`: drop messages handled in earlier runs
//! 2. `RatingSource::acquire_rating()`: one model call per message
//! 3. `rating::parse_rating()`: `(scam)(inappropriate):(reason)(reason)`
//! 4. `Thresholds::evaluate()`: either score at or above its threshold flags
//! 5. `MessageDeleter::delete()`: naughty list, outcomes into the ledger
//!
//! `processor::ModerationProcessor` sequences the steps.

pub mod dedup;
pub mod ledger;
pub mod processor;
pub mod rater;
pub mod rating;
pub mod types;
pub mod verdict;

pub use ledger::DeletionLedger;
pub use processor::{ModerationProcessor, ProcessorConfig, RunReport};
pub use rater::{LlmRatingSource, RatingSource};
pub use rating::{Rating, parse_rating};
pub use types::{DedupKey, InboundMessage, MessageDeleter, MessageSource};
pub use verdict::{Thresholds, Verdict, evaluate};
