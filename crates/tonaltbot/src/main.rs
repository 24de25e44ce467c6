use anyhow::Result;
use backon::{ExponentialBuilder, Retryable};
use dotenvy::dotenv;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::update_listeners::Polling;

use tonaltbot::cli::{Cli, Commands};
use tonaltbot::telegram::{create_bot, schema, setup_bot_commands, HandlerDeps, TelegramNotifier};
use tonaltcore::core::web_server::start_health_server;
use tonaltcore::core::{config, init_logger, log_configuration};
use tonaltcore::storage::{AccountStore, SqliteAccountStore};
use tonaltcore::workflow::{Notifier, RetryingNotifier, Workflow};
use tonaltcore::Settings;

/// Main entry point for the Telegram bot
///
/// Parses CLI arguments and dispatches to appropriate subcommand.
///
/// # Errors
/// Returns an error if initialization fails (logging, configuration, database, bot creation).
#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Log panics from dispatcher tasks instead of losing them on stderr
    std::panic::set_hook(Box::new(|panic_info| {
        log::error!("Panic caught: {:?}", panic_info);
        if let Some(location) = panic_info.location() {
            log::error!("Panic at {}:{}:{}", location.file(), location.line(), location.column());
        }
        if let Some(msg) = panic_info.payload().downcast_ref::<&str>() {
            log::error!("Panic message: {}", msg);
        }
    }));

    // Load environment variables from .env if present (before any config static is read)
    let _ = dotenv();

    // Initialize logger (console + file)
    init_logger(&config::LOG_FILE_PATH)?;

    match cli.command {
        Some(Commands::Run) => run_bot().await,
        Some(Commands::PendingWithdrawals { json }) => run_pending_withdrawals(json).await,
        None => {
            log::info!("No command specified, running bot in default mode");
            run_bot().await
        }
    }
}

/// Run the Telegram bot
async fn run_bot() -> Result<()> {
    log::info!("Starting bot...");

    let settings = Arc::new(Settings::from_env()?);
    log_configuration(&settings, &config::BOT_TOKEN);

    // Create bot instance
    let bot = create_bot()?;

    // Bot API may still be starting (local server, cold network); retry get_me
    let bot_ref = &bot;
    let me = (|| async move { bot_ref.get_me().await })
        .retry(
            ExponentialBuilder::default()
                .with_min_delay(config::retry::min_delay())
                .with_max_delay(config::retry::max_delay())
                .with_max_times(config::retry::MAX_ATTEMPTS),
        )
        .notify(|e, delay| log::warn!("Bot API not ready (retrying in {:?}): {}", delay, e))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to Bot API: {}", e))?;

    let bot_username = me.username.as_deref().unwrap_or_default();
    log::info!("Bot username: @{}, Bot ID: {}", bot_username, me.id);
    if !bot_username.eq_ignore_ascii_case(&settings.bot_username) {
        log::warn!(
            "BOT_USERNAME is @{} but the token belongs to @{}; referral links will point to @{}",
            settings.bot_username,
            bot_username,
            settings.bot_username
        );
    }

    if let Err(e) = setup_bot_commands(&bot).await {
        log::warn!("Failed to set bot commands: {}", e);
    }

    // Create database connection pool
    let store: Arc<dyn AccountStore> = Arc::new(
        SqliteAccountStore::open(&config::DATABASE_PATH)
            .map_err(|e| anyhow::anyhow!("Failed to create database pool: {}", e))?,
    );
    log::info!("Database ready at {}", config::DATABASE_PATH.as_str());

    let notifier: Arc<dyn Notifier> = Arc::new(RetryingNotifier::new(TelegramNotifier::new(bot.clone())));
    let workflow = Arc::new(Workflow::new(store, Arc::clone(&notifier), Arc::clone(&settings)));

    // Health server for the hosting platform
    let port = *config::PORT;
    tokio::spawn(async move {
        if let Err(e) = start_health_server(port).await {
            log::error!("Health server error: {}", e);
        }
    });

    // Notify admin about bot startup/restart
    if let Err(e) = notifier
        .send(settings.admin_chat_id, "🚀 TONalt bot started.", None)
        .await
    {
        log::warn!("Failed to notify admin about startup: {}", e);
    }

    let handler = schema(HandlerDeps::new(workflow));
    let listener = Polling::builder(bot.clone()).build();

    log::info!("Dispatcher started (long polling)");
    Dispatcher::builder(bot, handler)
        .enable_ctrlc_handler()
        .build()
        .dispatch_with_listener(
            listener,
            LoggingErrorHandler::with_custom_text("An error from the update listener"),
        )
        .await;

    log::info!("Dispatcher shutdown gracefully");
    Ok(())
}

/// Print pending withdrawals straight from the database
async fn run_pending_withdrawals(json: bool) -> Result<()> {
    let store = SqliteAccountStore::open(&config::DATABASE_PATH)
        .map_err(|e| anyhow::anyhow!("Failed to open database {}: {}", config::DATABASE_PATH.as_str(), e))?;
    let pending = store.pending_withdrawals().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&pending)?);
        return Ok(());
    }

    if pending.is_empty() {
        println!("No pending withdrawals.");
        return Ok(());
    }
    for request in &pending {
        println!(
            "#{}\tuser {}\t{}\t{}\tgross {}\tfee {}\tnet {}\t{}",
            request.id,
            request.user_id,
            request.name,
            request.phone,
            request.gross,
            request.fee,
            request.net,
            request.created_at.to_rfc3339()
        );
    }
    println!("{} pending", pending.len());
    Ok(())
}
