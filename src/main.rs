mod classifier;
mod config;
mod decision;
mod error;
mod offset;
mod platform;
mod poller;
mod reply;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::classifier::LinguaClassifier;
use crate::config::Config;
use crate::decision::ReplyPolicy;
use crate::offset::FileOffsetStore;
use crate::platform::telegram::TelegramClient;
use crate::poller::Poller;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,translate_link_bot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let offset_path = config.offset_path();
    info!("Configuration loaded successfully");
    info!("  Target language: {}", config.target_language);
    info!("  Skip languages: {:?}", config.skip_languages);
    info!("  Offset file: {}", offset_path.display());
    info!("  Retry delay: {}s", config.retry_delay_secs);

    let telegram = Arc::new(TelegramClient::new(&config));
    let store = Arc::new(FileOffsetStore::new(offset_path));
    let classifier = Arc::new(LinguaClassifier::new());
    let policy = ReplyPolicy::new(
        config.target_language.clone(),
        config.skip_languages.iter().cloned(),
    );

    let mut poller = Poller::new(
        telegram.clone(),
        classifier,
        telegram,
        store.clone(),
        policy,
        config.retry_delay(),
    )
    .with_context(|| format!("Failed to read offset from {}", store.path().display()))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = shutdown_tx.send(true);
    });

    info!("Bot is starting...");
    poller
        .run(shutdown_rx)
        .await
        .context("Cannot record processed updates, refusing to continue")?;

    info!("Bot stopped at offset {:?}", poller.offset());
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("SIGTERM received, shutting down"),
                    _ = tokio::signal::ctrl_c() => info!("SIGINT received, shutting down"),
                }
            }
            Err(e) => {
                tracing::warn!("Cannot listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                info!("SIGINT received, shutting down");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Ctrl-C received, shutting down");
    }
}
