//! User- and admin-facing texts.

use indoc::{formatdoc, indoc};

use crate::core::config::Settings;
use crate::storage::{Account, WithdrawalRequest};

pub const LOCKED: &str = "🔒 You must complete registration payment first.";
pub const NOT_FOUND: &str = "❌ User not found. Use /start";
pub const ALREADY_PAID: &str = "✅ You've already paid! Other features unlocked.";
pub const OPEN_LINK_FIRST: &str = "⚠️ You must open the payment link first.";
pub const ASK_EMAIL: &str = "📧 Please send the email address you used for payment.";
pub const BAD_EMAIL: &str = "❌ That doesn't look like an email address. Please send the email you paid with.";
pub const AWAITING_APPROVAL: &str = "⏳ Awaiting admin approval.";
pub const APPROVED: &str = "✅ Payment approved. Access unlocked.";
pub const REJECTED: &str = "❌ Payment rejected. Please contact support.";
pub const PENDING_WITHDRAWAL: &str = "⏳ You already have a pending withdrawal.";
pub const NOT_AUTHORIZED: &str = "⛔ You are not authorized to do that.";
pub const USE_MENU: &str = "ℹ️ Use the menu buttons, or send /start to open the menu.";
pub const GENERIC_FAILURE: &str = "⚠️ Something went wrong. Please try again later.";

pub const BAD_WITHDRAWAL_FORMAT: &str = indoc! {"
    ❌ Format incorrect. Use:
    Name: John Doe
    Phone: 07XXXXXXXX"};

pub fn welcome(approved: bool, settings: &Settings) -> String {
    if approved {
        return "👋 Welcome back to TONalt!\n✅ Access unlocked.".to_string();
    }
    formatdoc! {"
        👋 Welcome to TONalt!
        💳 Registration fee: {currency} {fee}
        Please pay to unlock features.",
        currency = settings.currency,
        fee = settings.registration_fee,
    }
}

pub fn payment_link(settings: &Settings) -> String {
    formatdoc! {"
        Click the link below to pay {currency} {fee}:

        {link}

        After payment, click \"I've Paid\".",
        currency = settings.currency,
        fee = settings.registration_fee,
        link = settings.payment_link,
    }
}

pub fn library(settings: &Settings) -> String {
    format!("📚 Access your library:\n{}", settings.library_link)
}

pub fn referrals(account: &Account, settings: &Settings) -> String {
    formatdoc! {"
        👥 Referrals: {count}

        🔗 Your referral link:
        {link}",
        count = account.referral_count,
        link = settings.referral_link(account.user_id),
    }
}

pub fn balance(account: &Account, settings: &Settings) -> String {
    format!(
        "💰 Balance: {currency} {balance}\n📈 Total Earnings: {currency} {earnings}",
        currency = settings.currency,
        balance = account.balance,
        earnings = account.earnings,
    )
}

pub fn below_minimum(settings: &Settings) -> String {
    format!("❌ Minimum withdrawal is {} {}", settings.currency, settings.min_withdraw)
}

pub fn ask_withdrawal_details(account: &Account, settings: &Settings) -> String {
    let split = settings.fee_policy.breakdown(account.balance);
    formatdoc! {"
        💰 Your balance is {currency} {gross} (fee {currency} {fee}, you receive {currency} {net}).

        🏦 Send withdrawal details in this format:

        Name: John Doe
        Phone: 07XXXXXXXX",
        currency = settings.currency,
        gross = split.gross,
        fee = split.fee,
        net = split.net,
    }
}

pub fn withdrawal_submitted(request: &WithdrawalRequest, settings: &Settings) -> String {
    formatdoc! {"
        ✅ Withdrawal request submitted.
        Amount: {currency} {gross} | Fee: {currency} {fee} | You receive: {currency} {net}
        You'll be notified once processed.",
        currency = settings.currency,
        gross = request.gross,
        fee = request.fee,
        net = request.net,
    }
}

pub fn withdrawal_paid(request: &WithdrawalRequest, settings: &Settings) -> String {
    format!("✅ Your withdrawal of {} {} has been paid.", settings.currency, request.net)
}

pub fn withdrawal_declined(request: &WithdrawalRequest, settings: &Settings) -> String {
    format!(
        "❌ Your withdrawal request was declined. {} {} has been returned to your balance.",
        settings.currency, request.gross
    )
}

pub fn referral_rewarded(amount: i64, settings: &Settings) -> String {
    format!("🎉 You earned {} {} for a new referral!", settings.currency, amount)
}

pub fn admin_payment_claim(account: &Account, email: &str) -> String {
    formatdoc! {"
        💳 PAYMENT VERIFICATION

        User ID: {id}
        Username: {username}
        Email: {email}",
        id = account.user_id,
        username = display_username(account.username.as_deref()),
    }
}

pub fn admin_withdrawal_request(request: &WithdrawalRequest, settings: &Settings) -> String {
    formatdoc! {"
        💸 WITHDRAW REQUEST #{id}

        User: {user}
        Name: {name}
        Phone: {phone}
        Amount: {currency} {gross} | Fee: {fee} | Pay: {net}",
        id = request.id,
        user = request.user_id,
        name = request.name,
        phone = request.phone,
        currency = settings.currency,
        gross = request.gross,
        fee = request.fee,
        net = request.net,
    }
}

/// Telegram rejects longer messages.
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// Pending requests, oldest first, cut to fit one message.
pub fn admin_pending_list(requests: &[WithdrawalRequest], settings: &Settings) -> String {
    if requests.is_empty() {
        return "📭 No pending withdrawals.".to_string();
    }
    let mut text = format!("🏦 Pending withdrawals: {}\n", requests.len());
    let mut used = text.chars().count();
    for (shown, request) in requests.iter().enumerate() {
        let line = format!(
            "\n#{} user {}: {} / {} | pay {} {} (gross {}, fee {}) since {}",
            request.id,
            request.user_id,
            request.name,
            request.phone,
            settings.currency,
            request.net,
            request.gross,
            request.fee,
            request.created_at.format("%Y-%m-%d %H:%M UTC"),
        );
        let rest = requests.len() - shown;
        let footer = format!("\n\n…and {} more (see the pending-withdrawals command)", rest);
        let line_chars = line.chars().count();
        // Room for the footer must remain unless this is the last line
        let needed = if rest == 1 { line_chars } else { line_chars + footer.chars().count() };
        if used + needed > MAX_MESSAGE_CHARS {
            text.push_str(&footer);
            break;
        }
        text.push_str(&line);
        used += line_chars;
    }
    text
}

pub fn admin_delivery_failed(chat_id: i64, error: &str) -> String {
    format!("⚠️ Could not deliver a message to {}: {}", chat_id, error)
}

pub fn admin_reward_failed(referrer_id: i64, referee_id: i64, error: &str) -> String {
    format!(
        "⚠️ User {} is approved but referrer {} was not credited: {}\nApprove again to retry the reward.",
        referee_id, referrer_id, error
    )
}

pub fn admin_handler_failed(user_id: i64, error: &str) -> String {
    format!("❗ Error while handling an update from {}:\n{}", user_id, error)
}

fn display_username(username: Option<&str>) -> String {
    match username {
        Some(name) => format!("@{}", name),
        None => "no_username".to_string(),
    }
}
