mod config;
mod error;
mod llm;
mod platform;
mod relay;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::llm::OpenRouterClient;
use crate::platform::telegram::TelegramClient;
use crate::relay::{Relay, RelayOptions};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,relaybot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // A missing .env is fine; TELEGRAM_TOKEN and friends may come from the shell.
    let _ = dotenvy::dotenv();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.json"));

    info!("Loading configuration from: {}", config_path.display());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return Err(e).context("Failed to load configuration");
        }
    };

    info!("Configuration loaded successfully");
    info!("  Model: {}", config.openrouter.model);
    info!(
        "  Polling: timeout {}s, retry delay {}s, interval {}s",
        config.polling.timeout_secs, config.polling.retry_delay_secs, config.polling.interval_secs
    );

    let telegram = TelegramClient::new(&config.telegram, &config.polling)
        .context("Failed to create Telegram client")?;
    let llm = OpenRouterClient::new(config.openrouter.clone())
        .context("Failed to create OpenRouter client")?;

    let relay = Relay::new(telegram, llm, RelayOptions::from(&config));

    info!("Bot is running. Waiting for messages...");
    relay.run().await;

    Ok(())
}
