//! In-process [`AccountStore`], used by the workflow tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio::sync::Mutex;

use super::models::{
    Account, AccountPatch, ApprovalOutcome, Counter, NewAccount, ReserveOutcome, WithdrawalContact,
    WithdrawalRequest, WithdrawalStatus,
};
use super::store::AccountStore;
use crate::core::error::{AppError, AppResult};
use crate::core::fees::FeePolicy;

#[derive(Default)]
struct State {
    accounts: HashMap<i64, Account>,
    rewarded: BTreeSet<(i64, i64)>,
    withdrawals: BTreeMap<i64, WithdrawalRequest>,
    next_withdrawal_id: i64,
}

/// All operations take one lock, which makes each of them atomic.
#[derive(Default)]
pub struct MemoryAccountStore {
    state: Mutex<State>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl State {
    fn resolve(&mut self, user_id: i64, status: WithdrawalStatus) -> Option<WithdrawalRequest> {
        let request = self
            .withdrawals
            .values_mut()
            .find(|w| w.user_id == user_id && w.status == WithdrawalStatus::Pending)?;
        request.status = status;
        request.resolved_at = Some(Utc::now());
        let resolved = request.clone();

        if let Some(account) = self.accounts.get_mut(&user_id) {
            account.pending_withdrawal = false;
            if status == WithdrawalStatus::Declined {
                account.balance += resolved.gross;
            }
        }
        Some(resolved)
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn get(&self, user_id: i64) -> AppResult<Option<Account>> {
        Ok(self.state.lock().await.accounts.get(&user_id).cloned())
    }

    async fn put(&self, mut account: Account) -> AppResult<()> {
        if account.balance < 0 {
            return Err(AppError::Store(format!("negative balance for user {}", account.user_id)));
        }
        let mut state = self.state.lock().await;
        if let Some(existing) = state.accounts.get(&account.user_id) {
            account.referred_by = existing.referred_by.or(account.referred_by);
            account.created_at = existing.created_at;
        }
        state.accounts.insert(account.user_id, account);
        Ok(())
    }

    async fn update(&self, user_id: i64, patch: AccountPatch) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        let Some(account) = state.accounts.get_mut(&user_id) else {
            return Ok(false);
        };
        if let Some(approved) = patch.approved {
            account.approved = approved;
        }
        if let Some(opened) = patch.payment_link_opened {
            account.payment_link_opened = opened;
        }
        if let Some(email) = patch.payment_email {
            account.payment_email = Some(email);
        }
        if let Some(pending) = patch.pending_withdrawal {
            account.pending_withdrawal = pending;
        }
        Ok(true)
    }

    async fn increment(&self, user_id: i64, counter: Counter, delta: i64) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        let Some(account) = state.accounts.get_mut(&user_id) else {
            return Ok(false);
        };
        let field = counter.field_mut(account);
        match field.checked_add(delta) {
            Some(value) if value >= 0 => {
                *field = value;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn create_if_absent(&self, new: NewAccount) -> AppResult<(Account, bool)> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.accounts.get(&new.user_id) {
            return Ok((existing.clone(), false));
        }
        let referred_by = new
            .referred_by
            .filter(|&referrer| referrer != new.user_id && state.accounts.contains_key(&referrer));
        let mut account = Account::new(new.user_id, new.username);
        account.referred_by = referred_by;
        state.accounts.insert(account.user_id, account.clone());
        Ok((account, true))
    }

    async fn reward_referrer_once(&self, referrer_id: i64, referee_id: i64, amount: i64) -> AppResult<bool> {
        if referrer_id == referee_id {
            return Ok(false);
        }
        let mut state = self.state.lock().await;
        if state.rewarded.contains(&(referrer_id, referee_id)) {
            return Ok(false);
        }
        let Some(referrer) = state.accounts.get_mut(&referrer_id) else {
            return Ok(false);
        };
        referrer.balance += amount;
        referrer.earnings += amount;
        referrer.referral_count += 1;
        state.rewarded.insert((referrer_id, referee_id));
        Ok(true)
    }

    async fn rewarded_referees(&self, referrer_id: i64) -> AppResult<Vec<i64>> {
        let state = self.state.lock().await;
        Ok(state
            .rewarded
            .range((referrer_id, i64::MIN)..=(referrer_id, i64::MAX))
            .map(|&(_, referee)| referee)
            .collect())
    }

    async fn approve(&self, user_id: i64) -> AppResult<ApprovalOutcome> {
        let mut state = self.state.lock().await;
        let Some(account) = state.accounts.get_mut(&user_id) else {
            return Ok(ApprovalOutcome::NotFound);
        };
        if account.approved {
            return Ok(ApprovalOutcome::AlreadyApproved(account.clone()));
        }
        account.approved = true;
        Ok(ApprovalOutcome::Approved(account.clone()))
    }

    async fn reserve_withdrawal(
        &self,
        user_id: i64,
        contact: WithdrawalContact,
        min_withdraw: i64,
        policy: FeePolicy,
    ) -> AppResult<ReserveOutcome> {
        let mut state = self.state.lock().await;
        let Some(account) = state.accounts.get_mut(&user_id) else {
            return Ok(ReserveOutcome::NotFound);
        };
        if !account.approved {
            return Ok(ReserveOutcome::NotApproved);
        }
        if account.pending_withdrawal {
            return Ok(ReserveOutcome::AlreadyPending);
        }
        if account.balance < min_withdraw {
            return Ok(ReserveOutcome::BelowMinimum {
                balance: account.balance,
            });
        }

        let split = policy.breakdown(account.balance);
        account.balance = 0;
        account.pending_withdrawal = true;

        state.next_withdrawal_id += 1;
        let request = WithdrawalRequest {
            id: state.next_withdrawal_id,
            user_id,
            name: contact.name,
            phone: contact.phone,
            gross: split.gross,
            fee: split.fee,
            net: split.net,
            status: WithdrawalStatus::Pending,
            created_at: Utc::now(),
            resolved_at: None,
        };
        state.withdrawals.insert(request.id, request.clone());
        Ok(ReserveOutcome::Reserved(request))
    }

    async fn complete_withdrawal(&self, user_id: i64) -> AppResult<Option<WithdrawalRequest>> {
        Ok(self.state.lock().await.resolve(user_id, WithdrawalStatus::Paid))
    }

    async fn decline_withdrawal(&self, user_id: i64) -> AppResult<Option<WithdrawalRequest>> {
        Ok(self.state.lock().await.resolve(user_id, WithdrawalStatus::Declined))
    }

    async fn pending_withdrawals(&self) -> AppResult<Vec<WithdrawalRequest>> {
        let state = self.state.lock().await;
        Ok(state
            .withdrawals
            .values()
            .filter(|w| w.status == WithdrawalStatus::Pending)
            .cloned()
            .collect())
    }

    async fn withdrawals_for(&self, user_id: i64) -> AppResult<Vec<WithdrawalRequest>> {
        let state = self.state.lock().await;
        Ok(state
            .withdrawals
            .values()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_concurrent_referees_both_credit_referrer() {
        let store = Arc::new(MemoryAccountStore::new());
        store.put(Account::new(1, None)).await.unwrap();

        let a = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.reward_referrer_once(1, 10, 100).await }
        });
        let b = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.reward_referrer_once(1, 11, 100).await }
        });
        assert!(a.await.unwrap().unwrap());
        assert!(b.await.unwrap().unwrap());

        let referrer = store.get(1).await.unwrap().unwrap();
        assert_eq!(referrer.balance, 200);
        assert_eq!(referrer.referral_count, 2);
        assert_eq!(store.rewarded_referees(1).await.unwrap(), vec![10, 11]);
    }

    #[tokio::test]
    async fn test_create_if_absent_ignores_unknown_referrer() {
        let store = MemoryAccountStore::new();
        let (account, created) = store
            .create_if_absent(NewAccount {
                user_id: 5,
                username: Some("amy".into()),
                referred_by: Some(77),
            })
            .await
            .unwrap();
        assert!(created);
        assert_eq!(account.referred_by, None);
        assert_eq!(account.username.as_deref(), Some("amy"));
    }

    #[tokio::test]
    async fn test_put_rejects_negative_balance() {
        let store = MemoryAccountStore::new();
        let mut account = Account::new(1, None);
        account.balance = -1;
        assert!(matches!(store.put(account).await, Err(AppError::Store(_))));
    }

    #[tokio::test]
    async fn test_decline_refunds_gross() {
        let store = MemoryAccountStore::new();
        let mut account = Account::new(3, None);
        account.approved = true;
        account.balance = 900;
        store.put(account).await.unwrap();

        let contact = WithdrawalContact {
            name: "Bo".into(),
            phone: "0700".into(),
        };
        let outcome = store
            .reserve_withdrawal(3, contact, 200, FeePolicy::Flat { fee: 20 })
            .await
            .unwrap();
        assert!(matches!(outcome, ReserveOutcome::Reserved(ref r) if r.net == 880));
        // Credit that arrives while the request is pending is kept on top of the refund
        store.increment(3, Counter::Balance, 100).await.unwrap();

        let declined = store.decline_withdrawal(3).await.unwrap().unwrap();
        assert_eq!(declined.status, WithdrawalStatus::Declined);
        assert_eq!(store.get(3).await.unwrap().unwrap().balance, 1000);
        assert!(store.decline_withdrawal(3).await.unwrap().is_none());
    }
}
