//! Bridges a rig `CompletionModel` to the `LlmProvider` trait.

use async_trait::async_trait;
use rig::completion::CompletionModel;
use rig::completion::message::{AssistantContent, Message};

use crate::error::LlmError;
use crate::llm::provider::{CompletionRequest, CompletionResponse, LlmProvider};

/// Used when the request does not set `max_tokens` (Anthropic requires one).
const DEFAULT_MAX_TOKENS: u64 = 1024;

/// `LlmProvider` over any rig completion model.
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
}

impl<M> RigAdapter<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
        }
    }

    fn request_error(&self, reason: impl Into<String>) -> LlmError {
        LlmError::RequestFailed {
            provider: self.model_name.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let mut turns: Vec<&str> = request.user_turns().collect();
        let Some(prompt) = turns.pop() else {
            return Err(self.request_error("request has no user turn"));
        };
        let history: Vec<Message> = turns.into_iter().map(Message::user).collect();

        let mut builder = self
            .model
            .completion_request(Message::user(prompt))
            .messages(history)
            .max_tokens(request.max_tokens.map_or(DEFAULT_MAX_TOKENS, u64::from));
        if let Some(preamble) = request.system_prompt() {
            builder = builder.preamble(preamble);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(f64::from(temperature));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| self.request_error(e.to_string()))?;

        let content: String = response
            .choice
            .iter()
            .filter_map(|c| match c {
                AssistantContent::Text(text) => Some(text.text.as_str()),
                _ => None,
            })
            .collect();
        if content.is_empty() {
            return Err(LlmError::InvalidResponse {
                provider: self.model_name.clone(),
                reason: "response has no text content".into(),
            });
        }

        Ok(CompletionResponse {
            content,
            input_tokens: u32::try_from(response.usage.input_tokens).unwrap_or(u32::MAX),
            output_tokens: u32::try_from(response.usage.output_tokens).unwrap_or(u32::MAX),
        })
    }
}
