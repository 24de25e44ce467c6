//! Persisted records and the outcomes of composite store operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Per-user record, keyed by Telegram user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub user_id: i64,
    /// Telegram username at creation time, if the user has one
    pub username: Option<String>,
    /// Registration payment confirmed by the admin
    pub approved: bool,
    /// User pressed "Pay" at least once; required before "I've paid"
    pub payment_link_opened: bool,
    /// Email the user says the payment was made with
    pub payment_email: Option<String>,
    /// Withdrawable credit, never negative
    pub balance: i64,
    /// Lifetime referral credit
    pub earnings: i64,
    pub referral_count: i64,
    /// Set once at creation, never changed afterwards
    pub referred_by: Option<i64>,
    pub pending_withdrawal: bool,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Fresh, unapproved account with zero balance.
    pub fn new(user_id: i64, username: Option<String>) -> Self {
        Self {
            user_id,
            username,
            approved: false,
            payment_link_opened: false,
            payment_email: None,
            balance: 0,
            earnings: 0,
            referral_count: 0,
            referred_by: None,
            pending_withdrawal: false,
            created_at: Utc::now(),
        }
    }
}

/// Input of the idempotent get-or-create.
///
/// `referred_by` is only recorded when it names another, existing account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub user_id: i64,
    pub username: Option<String>,
    pub referred_by: Option<i64>,
}

/// Partial update of the plain flags of an account. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountPatch {
    pub approved: Option<bool>,
    pub payment_link_opened: Option<bool>,
    pub payment_email: Option<String>,
    pub pending_withdrawal: Option<bool>,
}

/// Integer fields that support atomic increments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    Balance,
    Earnings,
    ReferralCount,
}

impl Counter {
    pub(crate) fn column(self) -> &'static str {
        match self {
            Counter::Balance => "balance",
            Counter::Earnings => "earnings",
            Counter::ReferralCount => "referral_count",
        }
    }

    pub(crate) fn field_mut(self, account: &mut Account) -> &mut i64 {
        match self {
            Counter::Balance => &mut account.balance,
            Counter::Earnings => &mut account.earnings,
            Counter::ReferralCount => &mut account.referral_count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum WithdrawalStatus {
    Pending,
    Paid,
    Declined,
}

/// Payout contact details supplied by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalContact {
    pub name: String,
    pub phone: String,
}

/// A user-initiated, admin-fulfilled cash-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub phone: String,
    pub gross: i64,
    pub fee: i64,
    pub net: i64,
    pub status: WithdrawalStatus,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Result of the admin approving a registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalOutcome {
    Approved(Account),
    AlreadyApproved(Account),
    NotFound,
}

/// Result of trying to reserve a user's balance for a withdrawal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// Balance zeroed, pending flag set, request recorded
    Reserved(WithdrawalRequest),
    NotFound,
    NotApproved,
    AlreadyPending,
    BelowMinimum { balance: i64 },
}
