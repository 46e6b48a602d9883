//! Deletion outcome ledger: which flagged messages were actually deleted.

use serde::Serialize;

use crate::pipeline::types::{DedupKey, InboundMessage};

/// Result of one deletion attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct DeletionOutcome {
    pub message: InboundMessage,
    pub deleted: bool,
}

/// Flagged messages split into deleted and not deleted. The two lists are
/// disjoint and together hold every flagged message.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeletionLedger {
    pub deleted: Vec<InboundMessage>,
    pub undeleted: Vec<InboundMessage>,
}

impl DeletionLedger {
    /// Merge per-entry outcomes, keeping their order.
    pub fn from_outcomes(outcomes: impl IntoIterator<Item = DeletionOutcome>) -> Self {
        let mut ledger = Self::default();
        for outcome in outcomes {
            ledger.record(outcome);
        }
        ledger
    }

    pub fn record(&mut self, outcome: DeletionOutcome) {
        if outcome.deleted {
            self.deleted.push(outcome.message);
        } else {
            self.undeleted.push(outcome.message);
        }
    }

    pub fn deleted_count(&self) -> usize {
        self.deleted.len()
    }

    /// Total flagged messages, deleted or not.
    pub fn flagged_count(&self) -> usize {
        self.deleted.len() + self.undeleted.len()
    }

    pub fn deleted_keys(&self) -> Vec<DedupKey> {
        self.deleted.iter().map(InboundMessage::dedup_key).collect()
    }

    pub fn undeleted_keys(&self) -> Vec<DedupKey> {
        self.undeleted.iter().map(InboundMessage::dedup_key).collect()
    }

    /// `deleted/flagged`, e.g. `"2/3"`.
    pub fn summary(&self) -> String {
        format!("{}/{}", self.deleted_count(), self.flagged_count())
    }
}
