//! Threshold policy turning a rating into a flag.

use serde::{Deserialize, Serialize};

use crate::pipeline::rating::Rating;
use crate::pipeline::types::DedupKey;

/// Inclusive flagging thresholds for each score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    pub scam: i32,
    pub inappropriate: i32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            scam: 6,
            inappropriate: 6,
        }
    }
}

impl Thresholds {
    pub fn evaluate(&self, rating: &Rating) -> bool {
        evaluate(rating, self.scam, self.inappropriate)
    }
}

/// Flagged iff either score reaches its threshold.
pub fn evaluate(rating: &Rating, scam_threshold: i32, inappropriate_threshold: i32) -> bool {
    rating.scam_score >= scam_threshold || rating.inappropriate_score >= inappropriate_threshold
}

/// The outcome of rating one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub key: DedupKey,
    pub rating: Rating,
    pub flagged: bool,
}
