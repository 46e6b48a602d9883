use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};

use chat_sentry::channels::TelegramChannel;
use chat_sentry::channels::telegram::DEFAULT_API_BASE;
use chat_sentry::config::{EnvVars, ModerationConfig};
use chat_sentry::error::Error;
use chat_sentry::llm::{LlmConfig, create_provider};
use chat_sentry::pipeline::{
    LlmRatingSource, MessageSource, ModerationProcessor, ProcessorConfig, RunReport,
};
use chat_sentry::store::{FileHandledLog, HandledLog};

const DEFAULT_ENV_FILE: &str = ".conf";

/// Everything one moderation pass needs.
struct Sentry {
    source: Arc<TelegramChannel>,
    processor: ModerationProcessor,
    handled_log: FileHandledLog,
}

impl Sentry {
    /// Fetch, moderate, and record one batch.
    async fn run_once(&self) -> chat_sentry::error::Result<RunReport> {
        let batch = self.source.fetch_messages().await?;
        let handled = self.handled_log.load().await?;

        let report = self.processor.run(&batch, &handled).await?;
        self.handled_log
            .append(&report.ledger.deleted_keys())
            .await?;
        self.source.commit().await;

        match serde_json::to_string(&report.ledger) {
            Ok(ledger) => info!(run_id = %report.run_id, %ledger, "Deletion ledger"),
            Err(e) => warn!(run_id = %report.run_id, "Could not serialize deletion ledger: {e}"),
        }
        Ok(report)
    }

    /// Run until the source has no full page left behind.
    async fn run_until_drained(&self) -> chat_sentry::error::Result<()> {
        loop {
            self.run_once().await?;
            if !self.source.has_more().await {
                return Ok(());
            }
            info!("Update page was full, fetching the next one");
        }
    }
}

/// A halted batch is refetched unchanged next run, so name the message.
fn log_run_failure(err: &Error) {
    match err {
        Error::Pipeline(p) => error!(
            key = p.key(),
            stage = p.stage(),
            "Moderation run halted: {p}; batch will be retried next run"
        ),
        other => error!("Moderation run failed: {other:#}"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_file = std::env::var("SENTRY_ENV_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_ENV_FILE));
    let vars = EnvVars::load(&env_file)
        .with_context(|| format!("reading env file {}", env_file.display()))?;
    let config = ModerationConfig::from_vars(&vars)
        .context("invalid moderation configuration")?;

    let default_level = if config.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    if !config.enabled {
        info!("Review feature disabled (SENTRY_REVIEW_ENABLED=false), exiting");
        return Ok(());
    }

    let instructions = tokio::fs::read_to_string(&config.instructions_path)
        .await
        .with_context(|| {
            format!(
                "reading rating instructions from {}",
                config.instructions_path.display()
            )
        })?;

    let llm_config = LlmConfig::from_vars(&vars)?;
    eprintln!("🛡️  Chat Sentry v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", llm_config.model);
    eprintln!(
        "   Thresholds: scam>={} inappropriate>={}",
        config.thresholds.scam, config.thresholds.inappropriate
    );
    eprintln!("   Handled log: {}", config.handled_log_path.display());
    let llm = create_provider(&llm_config)?;

    let bot_token = vars.require("TELEGRAM_BOT_TOKEN")?;
    let api_base = vars
        .get("TELEGRAM_API_URL")
        .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
    let telegram = Arc::new(TelegramChannel::with_api_base(bot_token, api_base));

    let processor = ModerationProcessor::new(
        Arc::new(LlmRatingSource::new(llm)),
        telegram.clone(),
        ProcessorConfig::from_moderation(&config, instructions),
    );
    let sentry = Sentry {
        source: telegram,
        processor,
        handled_log: FileHandledLog::new(&config.handled_log_path),
    };

    let Some(period) = config.poll_interval else {
        if let Err(e) = sentry.run_until_drained().await {
            log_run_failure(&e);
            return Err(e).context("moderation run failed");
        }
        return Ok(());
    };

    info!("Polling every {}s", period.as_secs());
    let mut tick = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = tick.tick() => {
                if let Err(e) = sentry.run_until_drained().await {
                    log_run_failure(&e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                return Ok(());
            }
        }
    }
}
