//! Moderation processor: rates a batch of messages and deletes the flagged ones.
//!
//! Flow:
//! 1. Drop messages already handled in a previous run
//! 2. Rate every remaining message (rating source → parser → verdict)
//! 3. Once every rating is in, delete the naughty list
//! 4. Record each deletion outcome in the ledger
//!
//! A rating failure or malformed rating halts the run before any deletion.
//! A failed deletion is reported in the ledger, never retried or fatal.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{ModerationConfig, ScoreRange};
use crate::error::PipelineError;
use crate::pipeline::dedup::filter_handled;
use crate::pipeline::ledger::{DeletionLedger, DeletionOutcome};
use crate::pipeline::rater::RatingSource;
use crate::pipeline::rating::parse_rating;
use crate::pipeline::types::{InboundMessage, MessageDeleter};
use crate::pipeline::verdict::{Thresholds, Verdict};

/// Processor settings.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Instructions sent to the rating source with every message.
    pub instructions: String,
    pub thresholds: Thresholds,
    pub score_range: ScoreRange,
    pub rating_timeout: Duration,
    /// Rating calls in flight at once (1 = sequential).
    pub max_concurrent_ratings: usize,
    /// Deletion calls in flight at once (1 = sequential).
    pub max_concurrent_deletions: usize,
    /// Log each message's raw and parsed rating.
    pub debug: bool,
}

impl ProcessorConfig {
    pub fn new(instructions: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
            thresholds: Thresholds::default(),
            score_range: ScoreRange::default(),
            rating_timeout: Duration::from_secs(10),
            max_concurrent_ratings: 1,
            max_concurrent_deletions: 1,
            debug: false,
        }
    }

    /// Take thresholds, bounds, timeouts, and concurrency from the feature config.
    pub fn from_moderation(config: &ModerationConfig, instructions: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
            thresholds: config.thresholds,
            score_range: config.score_range,
            rating_timeout: config.rating_timeout,
            max_concurrent_ratings: config.max_concurrent_ratings,
            max_concurrent_deletions: config.max_concurrent_deletions,
            debug: config.debug,
        }
    }
}

/// Everything a run decided and did.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Messages in the batch before deduplication.
    pub fetched: usize,
    /// Messages dropped as previously handled.
    pub skipped_handled: usize,
    /// One verdict per rated message, in input order.
    pub verdicts: Vec<Verdict>,
    pub ledger: DeletionLedger,
}

impl RunReport {
    pub fn flagged_count(&self) -> usize {
        self.verdicts.iter().filter(|v| v.flagged).count()
    }
}

/// Drives deduplication, rating, verdicts, and deletion for one batch.
pub struct ModerationProcessor {
    rater: Arc<dyn RatingSource>,
    deleter: Arc<dyn MessageDeleter>,
    config: ProcessorConfig,
}

impl ModerationProcessor {
    pub fn new(
        rater: Arc<dyn RatingSource>,
        deleter: Arc<dyn MessageDeleter>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            rater,
            deleter,
            config,
        }
    }

    /// Run the full pipeline over a fetched batch.
    ///
    /// `handled` holds dedup keys from previous runs; it is only read.
    pub async fn run(
        &self,
        batch: &[InboundMessage],
        handled: &HashSet<String>,
    ) -> Result<RunReport, PipelineError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        let pending = filter_handled(batch, handled);
        let skipped_handled = batch.len() - pending.len();
        info!(
            %run_id,
            fetched = batch.len(),
            skipped = skipped_handled,
            pending = pending.len(),
            "Starting moderation run"
        );

        let verdicts = self.evaluate_batch(&pending).await?;

        let naughty_list: Vec<InboundMessage> = pending
            .into_iter()
            .zip(&verdicts)
            .filter(|(_, verdict)| verdict.flagged)
            .map(|(message, _)| message)
            .collect();
        if self.config.debug {
            debug!(
                %run_id,
                naughty = ?naughty_list.iter().map(InboundMessage::dedup_key).collect::<Vec<_>>(),
                "Naughty list"
            );
        }

        let ledger = self.dispatch_deletions(naughty_list).await;

        info!(
            %run_id,
            deleted = ledger.deleted_count(),
            flagged = ledger.flagged_count(),
            "Deleted/marked-for-deletion: {}",
            ledger.summary()
        );

        Ok(RunReport {
            run_id,
            started_at,
            fetched: batch.len(),
            skipped_handled,
            verdicts,
            ledger,
        })
    }

    /// Rate every message and return one verdict per message, in input order.
    ///
    /// Stops at the first message that fails, in input order. Later messages
    /// are not sent to the rating source; with more than one rating in
    /// flight, calls already started are dropped.
    pub async fn evaluate_batch(
        &self,
        messages: &[InboundMessage],
    ) -> Result<Vec<Verdict>, PipelineError> {
        stream::iter(messages)
            .map(|message| self.evaluate_one(message))
            .buffered(self.config.max_concurrent_ratings.max(1))
            .try_collect()
            .await
            .inspect_err(|e| warn!("Rating halted, no deletions will be made: {e}"))
    }

    /// Rate one message: display text → rating source → parser → verdict.
    async fn evaluate_one(&self, message: &InboundMessage) -> Result<Verdict, PipelineError> {
        let key = message.dedup_key();
        let text = message.validate()?;

        let raw = self
            .rater
            .acquire_rating(&self.config.instructions, text, self.config.rating_timeout)
            .await
            .map_err(|source| PipelineError::RatingFailed {
                key: key.to_string(),
                source,
            })?;
        if self.config.debug {
            debug!(key = %key, text, raw = %raw, "Rating response");
        }

        let rating = parse_rating(&raw)
            .and_then(|rating| rating.check_range(self.config.score_range).map(|()| rating))
            .map_err(|source| {
                warn!(key = %key, raw = %raw, error = %source, "Malformed rating");
                PipelineError::MalformedRating {
                    key: key.to_string(),
                    raw: raw.clone(),
                    source,
                }
            })?;

        let flagged = self.config.thresholds.evaluate(&rating);
        debug!(
            key = %key,
            scam = rating.scam_score,
            inappropriate = rating.inappropriate_score,
            flagged,
            "Message rated"
        );

        Ok(Verdict {
            key,
            rating,
            flagged,
        })
    }

    /// Delete each naughty-list message and collect the outcomes.
    ///
    /// Each attempt fills its own slot; the ledger is built from the slots
    /// afterwards, in naughty-list order.
    pub async fn dispatch_deletions(&self, naughty_list: Vec<InboundMessage>) -> DeletionLedger {
        let outcomes: Vec<DeletionOutcome> = stream::iter(naughty_list)
            .map(|message| async move {
                let deleted = self.deleter.delete(&message).await;
                if deleted {
                    info!(key = %message.dedup_key(), "Deleted message");
                } else {
                    warn!(key = %message.dedup_key(), "Message could not be deleted");
                }
                DeletionOutcome { message, deleted }
            })
            .buffered(self.config.max_concurrent_deletions.max(1))
            .collect()
            .await;

        DeletionLedger::from_outcomes(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::{LlmError, MalformedRating};

    /// Rating source keyed by message text.
    struct ScriptedRater {
        responses: HashMap<String, Result<String, ()>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedRater {
        fn new(pairs: &[(&str, &str)]) -> Self {
            Self {
                responses: pairs
                    .iter()
                    .map(|(text, raw)| (text.to_string(), Ok(raw.to_string())))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing_on(mut self, text: &str) -> Self {
            self.responses.insert(text.to_string(), Err(()));
            self
        }
    }

    #[async_trait]
    impl RatingSource for ScriptedRater {
        async fn acquire_rating(
            &self,
            _instructions: &str,
            message_text: &str,
            _timeout: Duration,
        ) -> Result<String, LlmError> {
            self.calls.lock().unwrap().push(message_text.to_string());
            match self.responses.get(message_text) {
                Some(Ok(raw)) => Ok(raw.clone()),
                _ => Err(LlmError::RequestFailed {
                    provider: "scripted".into(),
                    reason: "connection reset".into(),
                }),
            }
        }
    }

    /// Deleter that succeeds unless the message id is in `refuse`.
    struct RecordingDeleter {
        refuse: HashSet<i64>,
        attempts: Mutex<Vec<i64>>,
    }

    impl RecordingDeleter {
        fn new(refuse: &[i64]) -> Self {
            Self {
                refuse: refuse.iter().copied().collect(),
                attempts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MessageDeleter for RecordingDeleter {
        async fn delete(&self, message: &InboundMessage) -> bool {
            self.attempts.lock().unwrap().push(message.message_id);
            !self.refuse.contains(&message.message_id)
        }
    }

    fn processor(
        rater: Arc<ScriptedRater>,
        deleter: Arc<RecordingDeleter>,
        concurrency: usize,
    ) -> ModerationProcessor {
        let mut config = ProcessorConfig::new("Rate (scam)(inappropriate):(why)(why)");
        config.max_concurrent_ratings = concurrency;
        config.max_concurrent_deletions = concurrency;
        ModerationProcessor::new(rater, deleter, config)
    }

    #[tokio::test]
    async fn flags_and_deletes_in_input_order() {
        let rater = Arc::new(ScriptedRater::new(&[
            ("send usdt now", "(9)(2):(money request)(none)"),
            ("good morning", "(1)(1):(greeting)(fine)"),
            ("explicit", "(2)(8):(none)(explicit content)"),
        ]));
        let deleter = Arc::new(RecordingDeleter::new(&[]));
        let p = processor(rater.clone(), deleter.clone(), 1);

        let batch = vec![
            InboundMessage::text(1, 10, "send usdt now"),
            InboundMessage::text(1, 11, "good morning"),
            InboundMessage::captioned(1, 12, "explicit"),
        ];
        let report = p.run(&batch, &HashSet::new()).await.unwrap();

        assert_eq!(report.fetched, 3);
        assert_eq!(report.verdicts.len(), 3);
        assert_eq!(report.flagged_count(), 2);
        assert_eq!(*deleter.attempts.lock().unwrap(), vec![10, 12]);
        assert_eq!(report.ledger.summary(), "2/2");
        assert_eq!(
            *rater.calls.lock().unwrap(),
            vec!["send usdt now", "good morning", "explicit"]
        );
    }

    #[tokio::test]
    async fn handled_messages_are_not_rated() {
        let rater = Arc::new(ScriptedRater::new(&[
            ("a", "(1)(1):(x)(y)"),
            ("b", "(9)(9):(x)(y)"),
            ("c", "(1)(1):(x)(y)"),
        ]));
        let deleter = Arc::new(RecordingDeleter::new(&[]));
        let p = processor(rater.clone(), deleter.clone(), 1);

        let batch = vec![
            InboundMessage::text(1, 1, "a"),
            InboundMessage::text(1, 2, "b"),
            InboundMessage::text(1, 3, "c"),
        ];
        let handled: HashSet<String> = ["1:2".to_string()].into();
        let report = p.run(&batch, &handled).await.unwrap();

        assert_eq!(report.skipped_handled, 1);
        assert_eq!(*rater.calls.lock().unwrap(), vec!["a", "c"]);
        assert!(deleter.attempts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_deletion_is_reported_not_fatal() {
        let rater = Arc::new(ScriptedRater::new(&[
            ("scam 1", "(8)(1):(x)(y)"),
            ("scam 2", "(8)(1):(x)(y)"),
        ]));
        let deleter = Arc::new(RecordingDeleter::new(&[2]));
        let p = processor(rater, deleter, 1);

        let batch = vec![
            InboundMessage::text(4, 1, "scam 1"),
            InboundMessage::text(4, 2, "scam 2"),
        ];
        let report = p.run(&batch, &HashSet::new()).await.unwrap();

        assert_eq!(report.ledger.deleted_count(), 1);
        assert_eq!(report.ledger.undeleted[0].message_id, 2);
        assert_eq!(report.ledger.flagged_count(), report.flagged_count());
    }

    #[tokio::test]
    async fn malformed_rating_halts_before_deletion() {
        let rater = Arc::new(ScriptedRater::new(&[
            ("scam", "(9)(1):(x)(y)"),
            ("weird", "I'd rather not rate this."),
        ]));
        let deleter = Arc::new(RecordingDeleter::new(&[]));
        let p = processor(rater, deleter.clone(), 1);

        let batch = vec![
            InboundMessage::text(3, 1, "scam"),
            InboundMessage::text(3, 2, "weird"),
        ];
        let err = p.run(&batch, &HashSet::new()).await.unwrap_err();

        match err {
            PipelineError::MalformedRating { key, source, .. } => {
                assert_eq!(key, "3:2");
                assert_eq!(source, MalformedRating::TooFewGroups { found: 0 });
            }
            other => panic!("Expected MalformedRating, got {:?}", other),
        }
        assert!(deleter.attempts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn out_of_range_score_is_malformed() {
        let rater = Arc::new(ScriptedRater::new(&[("x", "(42)(1):(x)(y)")]));
        let deleter = Arc::new(RecordingDeleter::new(&[]));
        let p = processor(rater, deleter, 1);

        let err = p
            .run(&[InboundMessage::text(1, 1, "x")], &HashSet::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::MalformedRating {
                source: MalformedRating::ScoreOutOfRange { score: 42, .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn rating_transport_failure_names_message() {
        let rater = Arc::new(ScriptedRater::new(&[("ok", "(1)(1):(x)(y)")]).failing_on("boom"));
        let deleter = Arc::new(RecordingDeleter::new(&[]));
        let p = processor(rater, deleter.clone(), 1);

        let batch = vec![
            InboundMessage::text(8, 1, "ok"),
            InboundMessage::text(8, 2, "boom"),
        ];
        let err = p.run(&batch, &HashSet::new()).await.unwrap_err();
        assert!(matches!(err, PipelineError::RatingFailed { ref key, .. } if key == "8:2"));
        assert!(deleter.attempts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_message_first_stops_rating_of_the_rest() {
        let rater = Arc::new(ScriptedRater::new(&[
            ("after a", "(9)(1):(x)(y)"),
            ("after b", "(1)(1):(x)(y)"),
        ]));
        let deleter = Arc::new(RecordingDeleter::new(&[]));
        let p = processor(rater.clone(), deleter.clone(), 1);

        let batch = vec![
            InboundMessage::new(1, 1, None, None),
            InboundMessage::text(1, 2, "after a"),
            InboundMessage::text(1, 3, "after b"),
        ];
        let err = p.run(&batch, &HashSet::new()).await.unwrap_err();

        assert!(matches!(err, PipelineError::MalformedInput { ref key } if key == "1:1"));
        assert!(rater.calls.lock().unwrap().is_empty());
        assert!(deleter.attempts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rating_failure_first_stops_rating_of_the_rest() {
        let rater = Arc::new(
            ScriptedRater::new(&[("later 1", "(9)(9):(x)(y)"), ("later 2", "(9)(9):(x)(y)")])
                .failing_on("boom"),
        );
        let deleter = Arc::new(RecordingDeleter::new(&[]));
        let p = processor(rater.clone(), deleter.clone(), 1);

        let batch = vec![
            InboundMessage::text(6, 1, "boom"),
            InboundMessage::text(6, 2, "later 1"),
            InboundMessage::text(6, 3, "later 2"),
        ];
        let err = p.run(&batch, &HashSet::new()).await.unwrap_err();

        assert!(matches!(err, PipelineError::RatingFailed { ref key, .. } if key == "6:1"));
        assert_eq!(*rater.calls.lock().unwrap(), vec!["boom"]);
        assert!(deleter.attempts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn message_without_text_or_caption_is_fatal() {
        let rater = Arc::new(ScriptedRater::new(&[]));
        let deleter = Arc::new(RecordingDeleter::new(&[]));
        let p = processor(rater.clone(), deleter, 1);

        let batch = vec![InboundMessage::new(2, 5, None, None)];
        let err = p.run(&batch, &HashSet::new()).await.unwrap_err();
        assert!(matches!(err, PipelineError::MalformedInput { ref key } if key == "2:5"));
        assert!(rater.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_rating_keeps_input_order() {
        let pairs: Vec<(String, String)> = (0..12)
            .map(|i| {
                let score = if i % 2 == 0 { 9 } else { 1 };
                (format!("msg {i}"), format!("({score})(1):(x)(y)"))
            })
            .collect();
        let borrowed: Vec<(&str, &str)> = pairs
            .iter()
            .map(|(t, r)| (t.as_str(), r.as_str()))
            .collect();
        let rater = Arc::new(ScriptedRater::new(&borrowed));
        let deleter = Arc::new(RecordingDeleter::new(&[]));
        let p = processor(rater, deleter.clone(), 4);

        let batch: Vec<InboundMessage> = (0..12)
            .map(|i| InboundMessage::text(1, i, format!("msg {i}")))
            .collect();
        let report = p.run(&batch, &HashSet::new()).await.unwrap();

        let keys: Vec<String> = report.verdicts.iter().map(|v| v.key.to_string()).collect();
        let expected: Vec<String> = (0..12).map(|i| format!("1:{i}")).collect();
        assert_eq!(keys, expected);

        let deleted_ids: Vec<i64> = report.ledger.deleted.iter().map(|m| m.message_id).collect();
        assert_eq!(deleted_ids, vec![0, 2, 4, 6, 8, 10]);
    }

    #[tokio::test]
    async fn empty_batch_completes() {
        let rater = Arc::new(ScriptedRater::new(&[]));
        let deleter = Arc::new(RecordingDeleter::new(&[]));
        let p = processor(rater, deleter, 1);

        let report = p.run(&[], &HashSet::new()).await.unwrap();
        assert!(report.verdicts.is_empty());
        assert_eq!(report.ledger.summary(), "0/0");
    }

    #[test]
    fn processor_config_from_moderation() {
        let moderation = ModerationConfig {
            thresholds: Thresholds {
                scam: 7,
                inappropriate: 5,
            },
            max_concurrent_ratings: 3,
            debug: true,
            ..ModerationConfig::default()
        };
        let config = ProcessorConfig::from_moderation(&moderation, "instructions");
        assert_eq!(config.thresholds.scam, 7);
        assert_eq!(config.max_concurrent_ratings, 3);
        assert!(config.debug);
        assert_eq!(config.instructions, "instructions");
    }
}
