use once_cell::sync::Lazy;
use std::env;
use std::str::FromStr;

use crate::core::error::{AppError, AppResult};
use crate::core::fees::{FeePolicy, FeePolicyKind};

/// Database file path
/// Read from DATABASE_PATH environment variable
/// Default: tonalt.sqlite
pub static DATABASE_PATH: Lazy<String> =
    Lazy::new(|| env::var("DATABASE_PATH").unwrap_or_else(|_| "tonalt.sqlite".to_string()));

/// Log file path
/// Read from LOG_FILE_PATH environment variable
/// Default: app.log
pub static LOG_FILE_PATH: Lazy<String> =
    Lazy::new(|| env::var("LOG_FILE_PATH").unwrap_or_else(|_| "app.log".to_string()));

/// Bot token
/// Read from BOT_TOKEN or TELOXIDE_TOKEN environment variable
pub static BOT_TOKEN: Lazy<String> = Lazy::new(|| {
    env::var("BOT_TOKEN")
        .or_else(|_| env::var("TELOXIDE_TOKEN"))
        .unwrap_or_else(|_| String::new())
});

/// Custom Bot API server URL (local Bot API), if any
pub static BOT_API_URL: Lazy<Option<String>> = Lazy::new(|| env::var("BOT_API_URL").ok());

/// Port of the health-check HTTP server
/// Read from PORT environment variable (set by most PaaS hosts)
/// Default: 5000
pub static PORT: Lazy<u16> = Lazy::new(|| {
    env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(5000)
});

/// Outbound retry configuration
pub mod retry {
    use std::time::Duration;

    /// Maximum number of retries for a single outbound message
    pub const MAX_ATTEMPTS: usize = 3;

    /// First backoff delay (milliseconds)
    pub const MIN_DELAY_MS: u64 = 500;

    /// Upper bound for a single backoff delay (seconds)
    pub const MAX_DELAY_SECS: u64 = 10;

    pub fn min_delay() -> Duration {
        Duration::from_millis(MIN_DELAY_MS)
    }

    pub fn max_delay() -> Duration {
        Duration::from_secs(MAX_DELAY_SECS)
    }
}

/// Network configuration
pub mod network {
    use std::time::Duration;

    /// Request timeout for Bot API calls (in seconds)
    pub const REQUEST_TIMEOUT_SECS: u64 = 30;

    pub fn timeout() -> Duration {
        Duration::from_secs(REQUEST_TIMEOUT_SECS)
    }
}

/// Business settings of the bot.
///
/// Built once at startup and handed to the workflow, so tests can construct
/// their own without touching process environment.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Chat id of the single operator allowed to approve payments and withdrawals
    pub admin_chat_id: i64,
    /// Bot username without `@`, used to build referral links
    pub bot_username: String,
    /// External payment page
    pub payment_link: String,
    /// External content library
    pub library_link: String,
    pub currency: String,
    pub registration_fee: i64,
    pub min_withdraw: i64,
    pub referral_reward: i64,
    pub fee_policy: FeePolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            admin_chat_id: 0,
            bot_username: "TONaltBot".to_string(),
            payment_link: String::new(),
            library_link: String::new(),
            currency: "KES".to_string(),
            registration_fee: 300,
            min_withdraw: 200,
            referral_reward: 100,
            fee_policy: FeePolicy::default(),
        }
    }
}

impl Settings {
    /// Reads settings from the process environment.
    ///
    /// `ADMIN_CHAT_ID` and `BOT_USERNAME` are required; everything else has a default.
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads settings through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let admin_chat_id = get("ADMIN_CHAT_ID")
            .ok_or_else(|| AppError::Config("ADMIN_CHAT_ID is not set".to_string()))
            .and_then(|raw| parse_number::<i64>("ADMIN_CHAT_ID", &raw))?;

        let bot_username = get("BOT_USERNAME")
            .map(|name| name.trim_start_matches('@').to_string())
            .ok_or_else(|| AppError::Config("BOT_USERNAME is not set".to_string()))?;

        let number = |key: &str, default: i64| -> AppResult<i64> {
            match get(key) {
                Some(raw) => {
                    let value = parse_number::<i64>(key, &raw)?;
                    if value < 0 {
                        return Err(AppError::Config(format!("{key} must not be negative, got {value}")));
                    }
                    Ok(value)
                }
                None => Ok(default),
            }
        };

        let kind = match get("FEE_POLICY") {
            Some(raw) => FeePolicyKind::from_str(&raw)
                .map_err(|_| AppError::Config(format!("FEE_POLICY must be 'flat' or 'tiered', got '{raw}'")))?,
            None => defaults.fee_policy.kind(),
        };
        let fee_policy = match kind {
            FeePolicyKind::Flat => FeePolicy::Flat {
                fee: number("PLATFORM_FEE", 20)?,
            },
            FeePolicyKind::Tiered => {
                let tier_size = number("FEE_TIER_SIZE", 1000)?;
                if tier_size == 0 {
                    return Err(AppError::Config("FEE_TIER_SIZE must be positive".to_string()));
                }
                FeePolicy::Tiered {
                    tier_size,
                    fee_per_tier: number("FEE_PER_TIER", 20)?,
                }
            }
        };

        Ok(Self {
            admin_chat_id,
            bot_username,
            payment_link: get("PAYMENT_LINK")
                .or_else(|| get("PAYSTACK_PAYMENT_LINK"))
                .unwrap_or(defaults.payment_link),
            library_link: get("LIBRARY_LINK")
                .or_else(|| get("DRIVE_LINK"))
                .unwrap_or(defaults.library_link),
            currency: get("CURRENCY").unwrap_or(defaults.currency),
            registration_fee: number("REG_FEE", defaults.registration_fee)?,
            min_withdraw: number("MIN_WITHDRAW", defaults.min_withdraw)?,
            referral_reward: number("REF_REWARD", defaults.referral_reward)?,
            fee_policy,
        })
    }

    /// Deep link that starts the bot with `user_id` as referrer.
    pub fn referral_link(&self, user_id: i64) -> String {
        format!("https://t.me/{}?start={}", self.bot_username, user_id)
    }

    /// `id` may be a user id or a chat id (admin group).
    pub fn is_admin(&self, id: i64) -> bool {
        self.admin_chat_id != 0 && self.admin_chat_id == id
    }
}

fn parse_number<T: FromStr>(key: &str, raw: &str) -> AppResult<T> {
    raw.parse::<T>()
        .map_err(|_| AppError::Config(format!("{key} must be a number, got '{raw}'")))
}
