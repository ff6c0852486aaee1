//! Relaybot CLI entry point.

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use relaybot::conversation::MessageStore;
use relaybot::llm::GeminiClient;
use relaybot::messaging::{Messaging as _, TelegramAdapter, polling, webhook};
use relaybot::relay::Relay;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "relaybot")]
#[command(about = "Chat relay that answers with a completion API and remembers each sender")]
struct Cli {
    /// Path to config file (optional)
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Receive updates over HTTP (platform pushes to /bot/update)
    Webhook,
    /// Receive updates by long-polling the platform
    Poll,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = if let Some(config_path) = &cli.config {
        relaybot::config::Config::load_from_path(config_path)
            .with_context(|| format!("failed to load config from {}", config_path.display()))?
    } else {
        relaybot::config::Config::load()
            .with_context(|| "failed to load configuration from environment")?
    };

    let _log_guard = match &config.log_dir {
        Some(log_dir) => Some(relaybot::daemon::init_file_tracing(log_dir, cli.debug)),
        None => {
            relaybot::daemon::init_foreground_tracing(cli.debug);
            None
        }
    };

    tracing::info!(data_dir = %config.data_dir.display(), "configuration loaded");

    config.ensure_data_dir()?;
    let store = MessageStore::connect(&config.database_url)
        .await
        .with_context(|| "failed to open message store")?;
    tracing::info!("message store ready");

    let completion = GeminiClient::new(&config.completion)?;
    tracing::info!(model = %config.completion.model, "completion client ready");

    let telegram = Arc::new(TelegramAdapter::new(&config.telegram)?);
    if let Err(error) = telegram.health_check().await {
        tracing::warn!(%error, "telegram health check failed, continuing");
    }

    let relay = Arc::new(Relay::new(
        store.clone(),
        completion,
        telegram.clone(),
        config.context_limit,
    ));

    let shutdown = CancellationToken::new();
    let signal_task = relaybot::daemon::cancel_on_ctrl_c(shutdown.clone());

    match cli.command {
        Command::Webhook => {
            if let Some(public_url) = &config.webhook.public_url {
                let url = webhook::webhook_url(public_url);
                telegram
                    .set_webhook(&url)
                    .await
                    .with_context(|| "failed to register webhook")?;
                tracing::info!("webhook registered");
            }
            let server =
                webhook::start_webhook_server(config.webhook.bind, relay, shutdown.clone())
                    .await?;
            server.await.with_context(|| "webhook server task failed")?;
        }
        Command::Poll => {
            if let Err(error) = telegram.delete_webhook().await {
                tracing::warn!(%error, "failed to clear webhook before polling");
            }
            polling::run_polling(
                &telegram,
                relay,
                config.telegram.poll_timeout_secs,
                shutdown.clone(),
            )
            .await;
        }
    }

    shutdown.cancel();
    let _ = signal_task.await;

    tracing::info!("shutting down");
    store.close().await;

    tracing::info!("relaybot stopped");
    Ok(())
}
