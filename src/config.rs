//! Configuration types.
//!
//! Values come from an optional `KEY=VALUE` env file merged with the process
//! environment (process environment wins). Missing keys fall back to defaults;
//! keys that are present but unparseable are errors.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::pipeline::verdict::Thresholds;

/// Inclusive bounds for a rating score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreRange {
    pub min: i32,
    pub max: i32,
}

impl ScoreRange {
    pub fn contains(&self, score: i32) -> bool {
        (self.min..=self.max).contains(&score)
    }
}

impl Default for ScoreRange {
    fn default() -> Self {
        Self { min: 1, max: 10 }
    }
}

/// Moderation feature configuration.
#[derive(Debug, Clone)]
pub struct ModerationConfig {
    /// Whether the review feature runs at all.
    pub enabled: bool,
    /// Verbose logging of prompts, raw ratings, and parsed ratings.
    pub debug: bool,
    /// Scores at or above these flag a message.
    pub thresholds: Thresholds,
    /// Accepted score bounds for a parsed rating.
    pub score_range: ScoreRange,
    /// Per-call timeout for rating acquisition.
    pub rating_timeout: Duration,
    /// Append-only log of handled message keys.
    pub handled_log_path: PathBuf,
    /// File holding the moderation instructions sent to the model.
    pub instructions_path: PathBuf,
    /// Rating calls allowed in flight at once (1 = sequential).
    pub max_concurrent_ratings: usize,
    /// Deletion calls allowed in flight at once (1 = sequential).
    pub max_concurrent_deletions: usize,
    /// Repeat the run on this interval; `None` runs once and exits.
    pub poll_interval: Option<Duration>,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debug: false,
            thresholds: Thresholds::default(),
            score_range: ScoreRange::default(),
            rating_timeout: Duration::from_secs(10),
            handled_log_path: PathBuf::from("./data/deleted_messages.log"),
            instructions_path: PathBuf::from("./instructions.txt"),
            max_concurrent_ratings: 1,
            max_concurrent_deletions: 1,
            poll_interval: None,
        }
    }
}

impl ModerationConfig {
    /// Build from env-file values overlaid by the process environment.
    pub fn from_vars(vars: &EnvVars) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| vars.get(key))
    }

    /// Build from any key lookup. Defaults apply to absent keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let enabled = parse_bool(&lookup, "SENTRY_REVIEW_ENABLED")?.unwrap_or(defaults.enabled);
        let debug = parse_bool(&lookup, "SENTRY_DEBUG")?.unwrap_or(defaults.debug);

        let score_range = ScoreRange {
            min: parse_value(&lookup, "SENTRY_SCORE_MIN")?.unwrap_or(defaults.score_range.min),
            max: parse_value(&lookup, "SENTRY_SCORE_MAX")?.unwrap_or(defaults.score_range.max),
        };
        if score_range.min > score_range.max {
            return Err(ConfigError::InvalidValue {
                key: "SENTRY_SCORE_MIN".into(),
                message: format!("{} is above SENTRY_SCORE_MAX {}", score_range.min, score_range.max),
            });
        }

        let thresholds = Thresholds {
            scam: parse_value(&lookup, "SENTRY_SCAM_THRESHOLD")?
                .unwrap_or(defaults.thresholds.scam),
            inappropriate: parse_value(&lookup, "SENTRY_INAPPROPRIATE_THRESHOLD")?
                .unwrap_or(defaults.thresholds.inappropriate),
        };
        for (key, value) in [
            ("SENTRY_SCAM_THRESHOLD", thresholds.scam),
            ("SENTRY_INAPPROPRIATE_THRESHOLD", thresholds.inappropriate),
        ] {
            if !score_range.contains(value) {
                return Err(ConfigError::InvalidValue {
                    key: key.into(),
                    message: format!(
                        "{value} outside score range {}..={}",
                        score_range.min, score_range.max
                    ),
                });
            }
        }

        let rating_timeout = parse_value::<u64, _>(&lookup, "SENTRY_RATING_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.rating_timeout);

        let handled_log_path = lookup("SENTRY_HANDLED_LOG")
            .map(PathBuf::from)
            .unwrap_or(defaults.handled_log_path);
        let instructions_path = lookup("SENTRY_INSTRUCTIONS_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.instructions_path);

        let max_concurrent_ratings = parse_value(&lookup, "SENTRY_MAX_CONCURRENT_RATINGS")?
            .unwrap_or(defaults.max_concurrent_ratings)
            .max(1);
        let max_concurrent_deletions = parse_value(&lookup, "SENTRY_MAX_CONCURRENT_DELETIONS")?
            .unwrap_or(defaults.max_concurrent_deletions)
            .max(1);

        let poll_interval = parse_value::<u64, _>(&lookup, "SENTRY_POLL_INTERVAL_SECS")?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Ok(Self {
            enabled,
            debug,
            thresholds,
            score_range,
            rating_timeout,
            handled_log_path,
            instructions_path,
            max_concurrent_ratings,
            max_concurrent_deletions,
            poll_interval,
        })
    }
}

/// Env-file values overlaid by the process environment.
#[derive(Debug, Clone, Default)]
pub struct EnvVars {
    file_vars: HashMap<String, String>,
}

impl EnvVars {
    /// Read `path` if it exists. A missing file is not an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Env file not found, using process environment only");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let file_vars = parse_env_file(&contents).map_err(|(line, message)| {
            ConfigError::ParseError {
                path: path.display().to_string(),
                line,
                message,
            }
        })?;
        Ok(Self { file_vars })
    }

    pub fn from_map(file_vars: HashMap<String, String>) -> Self {
        Self { file_vars }
    }

    /// Process environment first, then the env file.
    pub fn get(&self, key: &str) -> Option<String> {
        std::env::var(key)
            .ok()
            .or_else(|| self.file_vars.get(key).cloned())
    }

    /// Like `get`, but absent or empty values are an error.
    pub fn require(&self, key: &str) -> Result<String, ConfigError> {
        self.get(key)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }
}

/// Parse `KEY=VALUE` lines. `#` starts a comment line, `export ` prefixes and
/// matching surrounding quotes are stripped. Errors carry the 1-based line.
fn parse_env_file(contents: &str) -> Result<HashMap<String, String>, (usize, String)> {
    let mut vars = HashMap::new();
    for (idx, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            return Err((idx + 1, format!("expected KEY=VALUE, got {line:?}")));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err((idx + 1, "empty key".into()));
        }
        vars.insert(key.to_string(), unquote(value.trim()).to_string());
    }
    Ok(vars)
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn parse_value<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{raw:?}: {e}"),
            }),
    }
}

fn parse_bool<F>(lookup: &F, key: &str) -> Result<Option<bool>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_lowercase()) {
        None => Ok(None),
        Some(v) if v.is_empty() => Ok(None),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            other => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{other:?} is not a boolean"),
            }),
        },
    }
}
