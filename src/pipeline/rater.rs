//! Rating acquisition: submit message text, receive the raw rating string.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::LlmError;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};

/// Max tokens for a rating call. The expected answer is two scores plus two
/// short reasons.
const RATING_MAX_TOKENS: u32 = 128;

/// Temperature for rating calls.
const RATING_TEMPERATURE: f32 = 0.0;

/// Source of raw rating responses.
///
/// The returned string is unstructured; interpreting it is the parser's job.
#[async_trait]
pub trait RatingSource: Send + Sync {
    async fn acquire_rating(
        &self,
        instructions: &str,
        message_text: &str,
        timeout: Duration,
    ) -> Result<String, LlmError>;
}

/// Rating source backed by an `LlmProvider`.
///
/// Instructions go in as the system prompt, the message text as the only
/// user turn.
pub struct LlmRatingSource {
    llm: Arc<dyn LlmProvider>,
}

impl LlmRatingSource {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl RatingSource for LlmRatingSource {
    async fn acquire_rating(
        &self,
        instructions: &str,
        message_text: &str,
        timeout: Duration,
    ) -> Result<String, LlmError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(instructions),
            ChatMessage::user(message_text),
        ])
        .with_temperature(RATING_TEMPERATURE)
        .with_max_tokens(RATING_MAX_TOKENS);

        let response = tokio::time::timeout(timeout, self.llm.complete(request))
            .await
            .map_err(|_| LlmError::Timeout {
                provider: self.llm.model_name().to_string(),
                timeout,
            })??;

        debug!(
            model = self.llm.model_name(),
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "Rating received"
        );
        Ok(response.content)
    }
}
