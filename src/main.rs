use anyhow::{Context, Result};
use log::{error, info};
use std::sync::Arc;

use modcast::prelude::*;

const CONFIG_PATH: &str = "config/bot.yaml";

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables and initialize logging
    dotenv::dotenv().ok();
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("Starting modcast v{}", modcast::VERSION);

    let credentials = match Credentials::from_env() {
        Ok(credentials) => credentials,
        Err(e) => {
            error!("{}", e);
            return Err(e).context("Missing or invalid credentials in environment / .env");
        }
    };

    let config = BotConfig::load_or_create(CONFIG_PATH)
        .await
        .with_context(|| format!("Failed to load {}", CONFIG_PATH))?;
    info!(
        "Loaded configuration: {} creatives, broadcasting every {}s between {} and {}",
        config.broadcast.catalog.len(),
        config.broadcast.interval_seconds,
        config.broadcast.schedule_start,
        config.broadcast.schedule_end
    );

    let connection = Arc::new(TelegramConnection::new(TelegramConfig::new(credentials.token.clone())));
    let mut bot = ChatBot::new(config, &credentials, connection)?;
    bot.start().await?;

    info!("Bot is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl+C")?;

    info!("Received Ctrl+C, shutting down...");
    bot.shutdown().await?;
    Ok(())
}
