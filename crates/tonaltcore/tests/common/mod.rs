//! Common test utilities
//!
//! Shared by the workflow integration tests: a notifier that records every
//! outbound call and a harness wiring it to the in-memory store.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tonaltcore::core::error::NotifyError;
use tonaltcore::storage::{
    Account, AccountPatch, AccountStore, ApprovalOutcome, Counter, MemoryAccountStore, NewAccount, ReserveOutcome,
    WithdrawalContact, WithdrawalRequest,
};
use tonaltcore::{AppError, AppResult};
use tonaltcore::workflow::{CallbackAction, Event, Keyboard, MessageRef, Notifier, UserRef, Workflow};
use tonaltcore::{FeePolicy, Settings};

pub const ADMIN: i64 = 999;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Send {
        chat_id: i64,
        text: String,
        keyboard: Option<Keyboard>,
    },
    Edit {
        message: MessageRef,
        text: String,
    },
}

impl Outbound {
    pub fn text(&self) -> &str {
        match self {
            Outbound::Send { text, .. } | Outbound::Edit { text, .. } => text,
        }
    }
}

/// Records calls; sends to chats listed in `failing` fail with `Rejected`.
#[derive(Default)]
pub struct RecordingNotifier {
    calls: Mutex<Vec<Outbound>>,
    failing: Mutex<Vec<i64>>,
}

impl RecordingNotifier {
    pub fn take(&self) -> Vec<Outbound> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }

    pub fn fail_chat(&self, chat_id: i64) {
        self.failing.lock().unwrap().push(chat_id);
    }

    pub fn heal_chat(&self, chat_id: i64) {
        self.failing.lock().unwrap().retain(|&id| id != chat_id);
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, chat_id: i64, text: &str, keyboard: Option<&Keyboard>) -> Result<(), NotifyError> {
        if self.failing.lock().unwrap().contains(&chat_id) {
            return Err(NotifyError::Rejected("chat not found".into()));
        }
        self.calls.lock().unwrap().push(Outbound::Send {
            chat_id,
            text: text.to_string(),
            keyboard: keyboard.cloned(),
        });
        Ok(())
    }

    async fn edit(&self, message: MessageRef, text: &str) -> Result<(), NotifyError> {
        self.calls.lock().unwrap().push(Outbound::Edit {
            message,
            text: text.to_string(),
        });
        Ok(())
    }
}

/// Memory store whose referral rewards fail while `failing` is set.
pub struct FailingRewards {
    inner: Arc<MemoryAccountStore>,
    failing: AtomicBool,
}

impl FailingRewards {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl AccountStore for FailingRewards {
    async fn get(&self, user_id: i64) -> AppResult<Option<Account>> {
        self.inner.get(user_id).await
    }

    async fn put(&self, account: Account) -> AppResult<()> {
        self.inner.put(account).await
    }

    async fn update(&self, user_id: i64, patch: AccountPatch) -> AppResult<bool> {
        self.inner.update(user_id, patch).await
    }

    async fn increment(&self, user_id: i64, counter: Counter, delta: i64) -> AppResult<bool> {
        self.inner.increment(user_id, counter, delta).await
    }

    async fn create_if_absent(&self, new: NewAccount) -> AppResult<(Account, bool)> {
        self.inner.create_if_absent(new).await
    }

    async fn reward_referrer_once(&self, referrer_id: i64, referee_id: i64, amount: i64) -> AppResult<bool> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Store("database is locked".into()));
        }
        self.inner.reward_referrer_once(referrer_id, referee_id, amount).await
    }

    async fn rewarded_referees(&self, referrer_id: i64) -> AppResult<Vec<i64>> {
        self.inner.rewarded_referees(referrer_id).await
    }

    async fn approve(&self, user_id: i64) -> AppResult<ApprovalOutcome> {
        self.inner.approve(user_id).await
    }

    async fn reserve_withdrawal(
        &self,
        user_id: i64,
        contact: WithdrawalContact,
        min_withdraw: i64,
        policy: FeePolicy,
    ) -> AppResult<ReserveOutcome> {
        self.inner
            .reserve_withdrawal(user_id, contact, min_withdraw, policy)
            .await
    }

    async fn complete_withdrawal(&self, user_id: i64) -> AppResult<Option<WithdrawalRequest>> {
        self.inner.complete_withdrawal(user_id).await
    }

    async fn decline_withdrawal(&self, user_id: i64) -> AppResult<Option<WithdrawalRequest>> {
        self.inner.decline_withdrawal(user_id).await
    }

    async fn pending_withdrawals(&self) -> AppResult<Vec<WithdrawalRequest>> {
        self.inner.pending_withdrawals().await
    }

    async fn withdrawals_for(&self, user_id: i64) -> AppResult<Vec<WithdrawalRequest>> {
        self.inner.withdrawals_for(user_id).await
    }
}

pub struct Harness {
    pub store: Arc<MemoryAccountStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub workflow: Workflow,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(test_settings())
    }

    pub fn with_settings(settings: Settings) -> Self {
        let store = Arc::new(MemoryAccountStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let workflow = Workflow::new(store.clone(), notifier.clone(), Arc::new(settings));
        Self {
            store,
            notifier,
            workflow,
        }
    }

    /// Harness whose workflow goes through [`FailingRewards`]; `store` is the wrapped memory store.
    pub fn with_failing_rewards() -> (Self, Arc<FailingRewards>) {
        let store = Arc::new(MemoryAccountStore::new());
        let rewards = Arc::new(FailingRewards {
            inner: store.clone(),
            failing: AtomicBool::new(false),
        });
        let notifier = Arc::new(RecordingNotifier::default());
        let workflow = Workflow::new(rewards.clone(), notifier.clone(), Arc::new(test_settings()));
        (
            Self {
                store,
                notifier,
                workflow,
            },
            rewards,
        )
    }

    pub async fn start(&self, user_id: i64, payload: Option<&str>) {
        self.workflow
            .handle(Event::Start {
                user: UserRef::new(user_id),
                payload: payload.map(str::to_string),
            })
            .await;
    }

    pub async fn press(&self, user_id: i64, action: CallbackAction) {
        self.workflow
            .handle(Event::Callback {
                user: UserRef::new(user_id),
                origin: Some(MessageRef {
                    chat_id: user_id,
                    message_id: 1,
                }),
                data: action.to_string(),
            })
            .await;
    }

    /// Button press on a message shown in `chat_id` (a group for admin reviews).
    pub async fn press_in(&self, user_id: i64, chat_id: i64, action: CallbackAction) {
        self.workflow
            .handle(Event::Callback {
                user: UserRef::new(user_id),
                origin: Some(MessageRef { chat_id, message_id: 1 }),
                data: action.to_string(),
            })
            .await;
    }

    pub async fn say(&self, user_id: i64, text: &str) {
        self.workflow
            .handle(Event::Text {
                user: UserRef::new(user_id),
                text: text.to_string(),
            })
            .await;
    }

    pub async fn account(&self, user_id: i64) -> Account {
        self.store.get(user_id).await.unwrap().unwrap()
    }

    /// Puts an approved account with `balance` straight into the store.
    pub async fn seed_approved(&self, user_id: i64, balance: i64) {
        let mut account = Account::new(user_id, None);
        account.approved = true;
        account.balance = balance;
        self.store.put(account).await.unwrap();
    }

    /// Runs a user through pay, verify, email and admin approval.
    pub async fn register(&self, user_id: i64, referrer: Option<i64>) {
        let payload = referrer.map(|id| id.to_string());
        self.start(user_id, payload.as_deref()).await;
        self.press(user_id, CallbackAction::Pay).await;
        self.press(user_id, CallbackAction::Verify).await;
        self.say(user_id, "payer@example.com").await;
        self.press(ADMIN, CallbackAction::Approve(user_id)).await;
    }
}

pub fn test_settings() -> Settings {
    Settings {
        admin_chat_id: ADMIN,
        bot_username: "TONaltBot".to_string(),
        payment_link: "https://pay.example/tonalt".to_string(),
        library_link: "https://drive.example/library".to_string(),
        fee_policy: FeePolicy::default(),
        ..Settings::default()
    }
}

/// Texts of all messages sent to `chat_id`.
pub fn texts_to(calls: &[Outbound], chat_id: i64) -> Vec<String> {
    calls
        .iter()
        .filter_map(|call| match call {
            Outbound::Send { chat_id: id, text, .. } if *id == chat_id => Some(text.clone()),
            _ => None,
        })
        .collect()
}
