//! Bot initialization
//!
//! This module contains:
//! - Command enum definition
//! - Bot instance creation

use reqwest::ClientBuilder;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

use tonaltcore::config;

/// Bot commands enum with descriptions
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "open the main menu")]
    Start(String),
    #[command(description = "list pending withdrawals (admin only)")]
    Pending,
}

/// Creates a Bot instance with custom or default API URL
///
/// The token is read from `BOT_TOKEN` or `TELOXIDE_TOKEN`.
///
/// # Returns
/// * `Ok(Bot)` - Successfully created bot instance
/// * `Err(anyhow::Error)` - Missing token or invalid `BOT_API_URL`
pub fn create_bot() -> anyhow::Result<Bot> {
    if config::BOT_TOKEN.is_empty() {
        return Err(anyhow::anyhow!("BOT_TOKEN (or TELOXIDE_TOKEN) is not set"));
    }
    let client = ClientBuilder::new().timeout(config::network::timeout()).build()?;
    let bot = Bot::with_client(config::BOT_TOKEN.as_str(), client);

    // Check if local Bot API server is configured
    let bot = if let Some(bot_api_url) = config::BOT_API_URL.as_deref() {
        log::info!("Using custom Bot API URL: {}", bot_api_url);
        let url = url::Url::parse(bot_api_url).map_err(|e| anyhow::anyhow!("Invalid BOT_API_URL: {}", e))?;
        bot.set_api_url(url)
    } else {
        bot
    };

    Ok(bot)
}

/// Sets up bot commands in Telegram UI
///
/// `/pending` is admin-only and is left out of the public list.
pub async fn setup_bot_commands(bot: &Bot) -> Result<(), teloxide::RequestError> {
    use teloxide::types::BotCommand;

    bot.set_my_commands(vec![BotCommand::new("start", "open the main menu")])
        .await?;

    Ok(())
}

/// Deep-link payload of `/start`, if any.
pub fn start_payload(args: &str) -> Option<String> {
    let trimmed = args.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_parsing() {
        assert_eq!(
            Command::parse("/start 42", "TONaltBot").unwrap(),
            Command::Start("42".to_string())
        );
        assert_eq!(Command::parse("/start", "TONaltBot").unwrap(), Command::Start(String::new()));
        assert_eq!(Command::parse("/pending", "TONaltBot").unwrap(), Command::Pending);
        assert!(Command::parse("/withdraw", "TONaltBot").is_err());

        let descriptions = Command::descriptions().to_string();
        assert!(descriptions.contains("start"));
    }

    #[test]
    fn test_start_payload() {
        assert_eq!(start_payload(" 42 "), Some("42".to_string()));
        assert_eq!(start_payload(""), None);
    }
}
