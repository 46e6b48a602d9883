//! LLM integration for chat-sentry.
//!
//! The rating source talks to the model through the `LlmProvider` trait.
//! rig-core carries the HTTP transport; `RigAdapter` bridges rig's
//! `CompletionModel` to `LlmProvider`. The only backend is Anthropic.

pub mod provider;
mod rig_adapter;

pub use provider::*;
pub use rig_adapter::RigAdapter;

use std::sync::Arc;

use rig::client::CompletionClient;
use secrecy::ExposeSecret;

use crate::config::EnvVars;
use crate::error::{ConfigError, LlmError};

/// Default model for rating messages.
pub const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: secrecy::SecretString,
    pub model: String,
}

impl LlmConfig {
    /// Read `ANTHROPIC_API_KEY` (required) and `SENTRY_MODEL`.
    pub fn from_vars(vars: &EnvVars) -> Result<Self, ConfigError> {
        let api_key = vars.require("ANTHROPIC_API_KEY")?;
        Ok(Self {
            api_key: secrecy::SecretString::from(api_key),
            model: vars
                .get("SENTRY_MODEL")
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    if config.model.trim().is_empty() {
        return Err(LlmError::RequestFailed {
            provider: "anthropic".to_string(),
            reason: "model name is empty".to_string(),
        });
    }
    use rig::providers::anthropic;

    let client: rig::client::Client<anthropic::client::AnthropicExt> =
        anthropic::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "anthropic".to_string(),
                reason: format!("Failed to create Anthropic client: {}", e),
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!("Using Anthropic (model: {})", config.model);
    Ok(Arc::new(RigAdapter::new(model, &config.model)))
}
