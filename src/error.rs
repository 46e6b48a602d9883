//! Error types for chat-sentry.

use std::time::Duration;

/// Top-level error type for a moderation run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse env file {path} at line {line}: {message}")]
    ParseError {
        path: String,
        line: usize,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Messaging-platform errors (fetching updates).
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} request failed: {reason}")]
    RequestFailed { name: String, reason: String },

    #[error("Channel {name} API returned not ok: {description}")]
    ApiNotOk { name: String, description: String },

    #[error("Invalid payload from channel {name}: {reason}")]
    InvalidPayload { name: String, reason: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },
}

/// A rating response that does not have the `(score)(score):(reason)(reason)` shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedRating {
    #[error("expected 4 parenthesized groups, found {found}")]
    TooFewGroups { found: usize },

    #[error("{field} score is not an integer: {value:?}")]
    NonNumericScore { field: &'static str, value: String },

    #[error("{field} score {score} outside {min}..={max}")]
    ScoreOutOfRange {
        field: &'static str,
        score: i32,
        min: i32,
        max: i32,
    },
}

/// Handled-message log errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Handled log {path} IO error: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Moderation pipeline errors. Each names the message and stage that failed.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Message {key} has neither text nor caption")]
    MalformedInput { key: String },

    #[error("Rating acquisition failed for message {key}: {source}")]
    RatingFailed {
        key: String,
        #[source]
        source: LlmError,
    },

    #[error("Malformed rating for message {key}: {source} (raw: {raw:?})")]
    MalformedRating {
        key: String,
        raw: String,
        #[source]
        source: MalformedRating,
    },
}

impl PipelineError {
    /// Dedup key of the message that halted the run.
    pub fn key(&self) -> &str {
        match self {
            Self::MalformedInput { key }
            | Self::RatingFailed { key, .. }
            | Self::MalformedRating { key, .. } => key,
        }
    }

    /// Pipeline stage that failed.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::MalformedInput { .. } => "input",
            Self::RatingFailed { .. } => "rating",
            Self::MalformedRating { .. } => "parse",
        }
    }
}

/// Result type alias for chat-sentry.
pub type Result<T> = std::result::Result<T, Error>;
