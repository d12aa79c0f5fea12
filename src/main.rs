//! Filegate Bot - Main Entry Point
//!
//! A Telegram bot that archives submitted files in a private channel and
//! serves them behind a force-subscription or access-token gate.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use filegate_bot::commands::{CommandHandler, IncomingMessage};
use filegate_bot::config::{GateSettings, StoreConfig, TelegramConfig};
use filegate_bot::store::MongoStore;
use filegate_bot::sweeper::{Sweeper, SweeperMessage, SweeperRunner};
use filegate_bot::telegram::{Chat, Media, TelegramBot, Update};

/// Telegram bot gating file sharing behind membership or access tokens.
#[derive(Parser, Debug)]
#[command(name = "filegate")]
#[command(about = "Share files behind a subscription or token gate")]
#[command(version)]
struct Args {
    /// Path to the .env file for environment variables.
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level);

    // Load environment variables
    if let Err(e) = dotenvy::from_filename(&args.env_file) {
        debug!("Could not load .env file ({}): {}", args.env_file, e);
    }

    // Load configurations
    let tg_config = TelegramConfig::from_env()
        .context("Failed to load Telegram configuration from environment")?;

    let store_config =
        StoreConfig::from_env().context("Failed to load store configuration from environment")?;

    let settings =
        GateSettings::from_env().context("Failed to load gate settings from environment")?;

    info!(
        "Loaded gate settings (token ttl: {}h, lease: {}h, sweep every {}h + {}h grace)",
        settings.token_ttl_hours,
        settings.lease_duration_hours,
        settings.sweep_interval_hours,
        settings.sweep_grace_hours,
    );

    // Connect to Telegram
    let bot = TelegramBot::connect(&tg_config, settings.min_send_interval_secs)
        .await
        .context("Failed to connect to Telegram")?;

    // Sign in as a bot if the session is fresh
    if !bot.is_authorized().await.context("Failed to check authorization")? {
        bot.sign_in_bot(&tg_config.bot_token)
            .await
            .context("Bot sign-in failed")?;
    }
    bot.save_session().context("Failed to persist session")?;

    // Connect to the document store
    let store = Arc::new(
        MongoStore::connect(&store_config)
            .await
            .context("Failed to connect to MongoDB")?,
    );

    let bot = Arc::new(bot);
    let handler = Arc::new(CommandHandler::new(
        Arc::clone(&store),
        Arc::clone(&bot),
        settings.clone(),
    ));

    // Spawn the sweeper
    let (sweeper_tx, sweeper_rx) = mpsc::channel::<SweeperMessage>(32);
    let runner = SweeperRunner::new(
        Sweeper::new(
            Arc::clone(&store),
            Arc::clone(&bot),
            settings.archive_channel_id,
            settings.sweep_grace(),
        ),
        settings.sweep_interval(),
    );
    let sweeper_handle = tokio::spawn(async move {
        runner.run(sweeper_rx).await;
    });

    info!("Bot is running. Use Ctrl+C to stop.");

    // Dispatch updates until shutdown
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
            update = bot.next_update() => {
                match update {
                    Ok(update) => dispatch(&handler, update),
                    Err(e) => error!("Update stream error: {}", e),
                }
            }
        }
    }

    // Cleanup
    info!("Shutting down...");
    let _ = sweeper_tx.send(SweeperMessage::Shutdown).await;
    let _ = sweeper_handle.await;
    if let Err(e) = bot.save_session() {
        warn!("Failed to save session on shutdown: {}", e);
    }

    Ok(())
}

/// Hands one update to the command handler on its own task.
fn dispatch(handler: &Arc<CommandHandler<MongoStore, TelegramBot>>, update: Update) {
    let Update::NewMessage(message) = update else {
        return;
    };

    // Only private chats with users are served; the bot's own messages
    // and channel traffic are not commands.
    if message.outgoing() || !matches!(message.chat(), Chat::User(_)) {
        return;
    }

    let incoming = IncomingMessage {
        user_id: message.chat().id(),
        chat_id: message.chat().id(),
        message_id: message.id(),
        text: message.text().to_owned(),
        has_document: matches!(message.media(), Some(Media::Document(_))),
    };

    let handler = Arc::clone(handler);
    tokio::spawn(async move {
        if let Some(result) = handler.try_handle(&incoming).await {
            if let Err(e) = message.reply(result.message).await {
                warn!("Could not reply to user {}: {}", incoming.user_id, e);
            }
        }
    });
}

/// Initializes the logging subsystem.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
