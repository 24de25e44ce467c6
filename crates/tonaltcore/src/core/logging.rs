//! Logging initialization and startup diagnostics
//!
//! This module provides:
//! - Logger initialization (console + file)
//! - A masked summary of the loaded configuration

use anyhow::Result;
use simplelog::*;
use std::fs::File;

use crate::core::config::Settings;
use crate::core::fees::FeePolicy;

/// Initialize logger for both console and file output
///
/// # Arguments
/// * `log_file_path` - Path to the log file
///
/// # Returns
/// * `Ok(())` - Logger initialized successfully
/// * `Err(anyhow::Error)` - Failed to create the file or a logger was already set
pub fn init_logger(log_file_path: &str) -> Result<()> {
    let log_file = File::create(log_file_path).map_err(|e| anyhow::anyhow!("Failed to create log file: {}", e))?;

    CombinedLogger::init(vec![
        TermLogger::new(
            LevelFilter::Info,
            Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ),
        WriteLogger::new(LevelFilter::Info, Config::default(), log_file),
    ])
    .map_err(|e| anyhow::anyhow!("Failed to initialize logger: {}", e))?;

    Ok(())
}

/// Masks all but the last four characters of a secret.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let visible: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), visible)
}

/// Logs the business configuration at application startup
pub fn log_configuration(settings: &Settings, bot_token: &str) {
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    log::info!("⚙️  TONalt configuration");
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    log::info!("BOT_TOKEN: {}", mask_secret(bot_token));
    log::info!("BOT_USERNAME: @{}", settings.bot_username);
    log::info!("ADMIN_CHAT_ID: {}", settings.admin_chat_id);
    log::info!(
        "Registration fee: {} {}, referral reward: {} {}, minimum withdrawal: {} {}",
        settings.currency,
        settings.registration_fee,
        settings.currency,
        settings.referral_reward,
        settings.currency,
        settings.min_withdraw
    );
    match settings.fee_policy {
        FeePolicy::Flat { fee } => log::info!("Withdrawal fee: flat {}", fee),
        FeePolicy::Tiered {
            tier_size,
            fee_per_tier,
        } => log::info!("Withdrawal fee: {} per started {}", fee_per_tier, tier_size),
    }

    if settings.payment_link.is_empty() {
        log::warn!("⚠️  PAYMENT_LINK is not set - users will not see where to pay");
    }
    if settings.library_link.is_empty() {
        log::warn!("⚠️  LIBRARY_LINK is not set - the library button will show an empty link");
    }
}
