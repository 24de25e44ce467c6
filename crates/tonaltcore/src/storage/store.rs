//! The account store seam used by the workflow.

use async_trait::async_trait;

use super::models::{
    Account, AccountPatch, ApprovalOutcome, Counter, NewAccount, ReserveOutcome, WithdrawalContact,
    WithdrawalRequest,
};
use crate::core::error::AppResult;
use crate::core::fees::FeePolicy;

/// Keyed storage of accounts and withdrawal requests.
///
/// Every method that mutates more than one field is a single atomic
/// operation: implementations must never split it into a read and a later
/// write, because events of different users are handled concurrently and two
/// referees can reward the same referrer at the same moment.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get(&self, user_id: i64) -> AppResult<Option<Account>>;

    /// Writes the whole record. An already recorded `referred_by` is kept.
    async fn put(&self, account: Account) -> AppResult<()>;

    /// Applies `patch`; returns `false` if the account does not exist.
    async fn update(&self, user_id: i64, patch: AccountPatch) -> AppResult<bool>;

    /// Adds `delta` to `counter`; returns `false` if the account does not
    /// exist or the result would be negative.
    async fn increment(&self, user_id: i64, counter: Counter, delta: i64) -> AppResult<bool>;

    /// Idempotent get-or-create. The flag is `true` when the account was created by this call.
    async fn create_if_absent(&self, new: NewAccount) -> AppResult<(Account, bool)>;

    /// Credits `amount` to the referrer's balance and earnings, bumps its
    /// referral count and records the referee, all at once. Returns `false`
    /// without side effects when the referrer is missing, is the referee, or
    /// already rewarded this referee.
    async fn reward_referrer_once(&self, referrer_id: i64, referee_id: i64, amount: i64) -> AppResult<bool>;

    async fn rewarded_referees(&self, referrer_id: i64) -> AppResult<Vec<i64>>;

    async fn approve(&self, user_id: i64) -> AppResult<ApprovalOutcome>;

    /// Checks approval, pending flag and minimum balance, then zeroes the
    /// balance, sets the pending flag and appends the withdrawal record.
    async fn reserve_withdrawal(
        &self,
        user_id: i64,
        contact: WithdrawalContact,
        min_withdraw: i64,
        policy: FeePolicy,
    ) -> AppResult<ReserveOutcome>;

    /// Marks the user's pending request paid and clears the pending flag.
    async fn complete_withdrawal(&self, user_id: i64) -> AppResult<Option<WithdrawalRequest>>;

    /// Marks the user's pending request declined, returns the gross amount to
    /// the balance and clears the pending flag.
    async fn decline_withdrawal(&self, user_id: i64) -> AppResult<Option<WithdrawalRequest>>;

    async fn pending_withdrawals(&self) -> AppResult<Vec<WithdrawalRequest>>;

    async fn withdrawals_for(&self, user_id: i64) -> AppResult<Vec<WithdrawalRequest>>;
}
