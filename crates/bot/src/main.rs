//! Summaria - Telegram group-chat summarizer
//!
//! Buffers recent group/topic messages, and on /tldr hands the recent
//! transcript to an OpenAI-compatible completion API for a conversational
//! summary. Replies in character when mentioned.

mod config;
mod dispatcher;
mod llm;
mod pipeline;
mod telegram;
mod webhook;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use common::{LlmClient, MessageLog, RetentionStore, UsageGuard};

use config::BotConfig;
use dispatcher::Dispatcher;
use llm::SummariaLlm;
use pipeline::{PipelineSettings, SummaryPipeline};
use telegram::TelegramClient;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = BotConfig::parse();

    info!("Summaria starting");
    info!("  LLM: {} at {}", config.openai_model, config.openai_base_url);
    info!("  Database: {}", config.db_path);
    info!("  Retention: {} minutes", config.retention_minutes);
    info!("  Daily limit: {}", config.daily_limit);
    info!("  Cooldown: {}s", config.cooldown_secs);

    // Durable tier; the bot degrades to memory-only when it cannot open.
    let log = match MessageLog::open(&config.db_path) {
        Ok(log) => Some(Arc::new(log)),
        Err(e) => {
            warn!("Durable store unavailable, running memory-only: {}", e);
            None
        }
    };

    let mut retention = RetentionStore::new(config.retention_minutes, config.fallback_threshold);
    let mut guard = UsageGuard::new(config.cooldown_secs);
    if let Some(log) = &log {
        retention = retention.with_log(log.clone());
        guard = guard.with_log(log.clone());
        guard.restore(Utc::now()).await;
    }

    let telegram = TelegramClient::new(config.bot_token.clone());
    let me = telegram.get_me().await?;
    let bot_username = me.username.clone().unwrap_or_default();
    info!("  Bot: @{}", bot_username);

    let llm = SummariaLlm::new(LlmClient::new(
        config.openai_api_key.clone(),
        config.openai_model.clone(),
        config.openai_base_url.clone(),
        Duration::from_secs(config.llm_timeout_secs),
    ));
    let pipeline = SummaryPipeline::new(
        llm.clone(),
        PipelineSettings {
            daily_limit: config.daily_limit,
            horizon_minutes: config.retention_minutes,
            startup_grace_minutes: config.startup_grace_minutes,
            max_transcript_bytes: 24_000,
        },
        Utc::now(),
    );

    let mut dispatcher = Dispatcher::new(
        telegram.clone(),
        llm,
        pipeline,
        retention,
        guard,
        bot_username,
        config.owner_id,
    );

    if let Some(webhook_url) = &config.webhook_url {
        run_webhook(&config, webhook_url, &telegram, &mut dispatcher).await
    } else {
        run_polling(&telegram, &mut dispatcher).await
    }
}

/// Long-polling mode: the default.
async fn run_polling(
    telegram: &TelegramClient,
    dispatcher: &mut Dispatcher,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Summaria running (long polling)");

    let mut offset = 0i64;
    loop {
        match telegram.get_updates(offset, 30).await {
            Ok(updates) => {
                for update in updates {
                    offset = offset.max(update.update_id + 1);
                    dispatcher.handle_update(update).await;
                }
            }
            Err(e) => {
                error!("Polling error: {}", e);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

/// Webhook mode: Telegram pushes updates to us over HTTP.
async fn run_webhook(
    config: &BotConfig,
    webhook_url: &str,
    telegram: &TelegramClient,
    dispatcher: &mut Dispatcher,
) -> Result<(), Box<dyn std::error::Error>> {
    telegram.set_webhook(webhook_url).await?;

    let (tx, mut rx) = mpsc::channel(64);
    let host = config.http_host.clone();
    let port = config.http_port;
    tokio::spawn(async move {
        if let Err(e) = webhook::serve(&host, port, tx).await {
            error!("Webhook server exited: {}", e);
        }
    });

    info!("Summaria running (webhook at {})", webhook_url);

    while let Some(update) = rx.recv().await {
        dispatcher.handle_update(update).await;
    }

    Err("webhook update channel closed".into())
}
