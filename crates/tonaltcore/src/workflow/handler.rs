//! Conversation handler: turns inbound events into store transitions and replies.

use std::sync::Arc;

use super::actions::CallbackAction;
use super::keyboard::Keyboard;
use super::messages;
use super::notifier::{MessageRef, Notifier};
use super::state::{ConversationState, Sessions};
use crate::core::config::Settings;
use crate::core::error::AppResult;
use crate::storage::{
    Account, AccountPatch, AccountStore, ApprovalOutcome, NewAccount, ReserveOutcome, WithdrawalContact,
};

/// Telegram user as seen by the workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRef {
    pub id: i64,
    pub username: Option<String>,
}

impl UserRef {
    pub fn new(id: i64) -> Self {
        Self { id, username: None }
    }
}

/// Inbound update, already stripped of platform types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// `/start` with its optional deep-link payload
    Start { user: UserRef, payload: Option<String> },
    /// Inline button press; `origin` is the message that carried the button
    Callback {
        user: UserRef,
        origin: Option<MessageRef>,
        data: String,
    },
    /// Free-text message
    Text { user: UserRef, text: String },
    /// `/pending`
    PendingWithdrawals { user: UserRef },
}

impl Event {
    pub fn user(&self) -> &UserRef {
        match self {
            Event::Start { user, .. }
            | Event::Callback { user, .. }
            | Event::Text { user, .. }
            | Event::PendingWithdrawals { user } => user,
        }
    }
}

pub struct Workflow {
    store: Arc<dyn AccountStore>,
    notifier: Arc<dyn Notifier>,
    settings: Arc<Settings>,
    sessions: Sessions,
}

impl Workflow {
    pub fn new(store: Arc<dyn AccountStore>, notifier: Arc<dyn Notifier>, settings: Arc<Settings>) -> Self {
        Self {
            store,
            notifier,
            settings,
            sessions: Sessions::new(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn sessions(&self) -> &Sessions {
        &self.sessions
    }

    /// Handles one event and reports failures.
    ///
    /// On error the user gets a generic reply and the admin gets the error text.
    pub async fn handle(&self, event: Event) {
        let user_id = event.user().id;
        if let Err(e) = self.dispatch(event).await {
            log::error!("Failed to handle update from {}: {}", user_id, e);
            if let Err(send_err) = self.notifier.send(user_id, messages::GENERIC_FAILURE, None).await {
                log::warn!("Failed to send failure reply to {}: {}", user_id, send_err);
            }
            if user_id != self.settings.admin_chat_id {
                let report = messages::admin_handler_failed(user_id, &e.to_string());
                if let Err(send_err) = self.notifier.send(self.settings.admin_chat_id, &report, None).await {
                    log::warn!("Failed to forward error to admin: {}", send_err);
                }
            }
        }
    }

    /// Handles one event and returns the first error.
    pub async fn dispatch(&self, event: Event) -> AppResult<()> {
        match event {
            Event::Start { user, payload } => self.on_start(user, payload.as_deref()).await,
            Event::Callback { user, origin, data } => self.on_callback(&user, origin, &data).await,
            Event::Text { user, text } => self.on_text(&user, &text).await,
            Event::PendingWithdrawals { user } => self.on_pending_list(&user).await,
        }
    }

    async fn on_start(&self, user: UserRef, payload: Option<&str>) -> AppResult<()> {
        let referrer = parse_referrer(payload, user.id);
        let (account, created) = self
            .store
            .create_if_absent(NewAccount {
                user_id: user.id,
                username: user.username,
                referred_by: referrer,
            })
            .await?;

        if created {
            log::info!("New account {} (referred by {:?})", account.user_id, account.referred_by);
        } else if referrer.is_some() && account.referred_by != referrer {
            log::debug!("Ignoring referrer {:?} for existing account {}", referrer, account.user_id);
        }

        // Idempotent; also completes a reward that failed on an earlier /start
        if let Some(referrer_id) = account.referred_by {
            self.reward_referrer(referrer_id, account.user_id).await?;
        }

        self.sessions.reset(account.user_id);
        self.reply(
            account.user_id,
            &messages::welcome(account.approved, &self.settings),
            Some(&Keyboard::main_menu(account.approved, &self.settings)),
        )
        .await
    }

    async fn on_callback(&self, user: &UserRef, origin: Option<MessageRef>, data: &str) -> AppResult<()> {
        let action = match data.parse::<CallbackAction>() {
            Ok(action) => action,
            Err(e) => {
                log::warn!("Ignoring callback from {}: {}", user.id, e);
                return Ok(());
            }
        };

        if action.is_admin_action() {
            // ADMIN_CHAT_ID may be the operator's user id or a group the review messages go to
            let from_admin_chat = origin.is_some_and(|message| self.settings.is_admin(message.chat_id));
            if !self.settings.is_admin(user.id) && !from_admin_chat {
                log::warn!("User {} attempted admin action {}", user.id, action);
                return self.reply(user.id, messages::NOT_AUTHORIZED, None).await;
            }
            return self.on_admin_action(action, origin).await;
        }

        let Some(account) = self.store.get(user.id).await? else {
            return self.reply(user.id, messages::NOT_FOUND, None).await;
        };

        if action.is_locked() && !account.approved {
            return self.reply(user.id, messages::LOCKED, None).await;
        }

        match action {
            CallbackAction::Pay => self.on_pay(&account).await,
            CallbackAction::Verify => self.on_verify(&account).await,
            CallbackAction::Library => self.reply(user.id, &messages::library(&self.settings), None).await,
            CallbackAction::Referrals => {
                self.reply(user.id, &messages::referrals(&account, &self.settings), None)
                    .await
            }
            CallbackAction::Balance => {
                self.reply(user.id, &messages::balance(&account, &self.settings), None)
                    .await
            }
            CallbackAction::Withdraw => self.on_withdraw(&account).await,
            CallbackAction::Approve(_)
            | CallbackAction::Reject(_)
            | CallbackAction::MarkPaid(_)
            | CallbackAction::Decline(_) => Ok(()),
        }
    }

    async fn on_pay(&self, account: &Account) -> AppResult<()> {
        if account.approved {
            return self.reply(account.user_id, messages::ALREADY_PAID, None).await;
        }
        self.store
            .update(
                account.user_id,
                AccountPatch {
                    payment_link_opened: Some(true),
                    ..Default::default()
                },
            )
            .await?;
        self.reply(
            account.user_id,
            &messages::payment_link(&self.settings),
            Some(&Keyboard::payment_sent()),
        )
        .await
    }

    async fn on_verify(&self, account: &Account) -> AppResult<()> {
        if account.approved {
            return self.reply(account.user_id, messages::ALREADY_PAID, None).await;
        }
        if !account.payment_link_opened {
            return self.reply(account.user_id, messages::OPEN_LINK_FIRST, None).await;
        }
        self.sessions.set(account.user_id, ConversationState::AwaitingEmail);
        self.reply(account.user_id, messages::ASK_EMAIL, None).await
    }

    async fn on_withdraw(&self, account: &Account) -> AppResult<()> {
        if account.pending_withdrawal {
            return self.reply(account.user_id, messages::PENDING_WITHDRAWAL, None).await;
        }
        if account.balance < self.settings.min_withdraw {
            return self
                .reply(account.user_id, &messages::below_minimum(&self.settings), None)
                .await;
        }
        self.sessions
            .set(account.user_id, ConversationState::AwaitingWithdrawalDetails);
        self.reply(
            account.user_id,
            &messages::ask_withdrawal_details(account, &self.settings),
            None,
        )
        .await
    }

    async fn on_text(&self, user: &UserRef, text: &str) -> AppResult<()> {
        match self.sessions.get(user.id) {
            ConversationState::Idle => self.reply(user.id, messages::USE_MENU, None).await,
            ConversationState::AwaitingEmail => self.on_payment_email(user, text).await,
            ConversationState::AwaitingWithdrawalDetails => self.on_withdrawal_details(user, text).await,
        }
    }

    async fn on_payment_email(&self, user: &UserRef, text: &str) -> AppResult<()> {
        let email = text.trim();
        if !is_plausible_email(email) {
            return self.reply(user.id, messages::BAD_EMAIL, None).await;
        }

        let Some(account) = self.store.get(user.id).await? else {
            self.sessions.reset(user.id);
            return self.reply(user.id, messages::NOT_FOUND, None).await;
        };
        if account.approved {
            self.sessions.reset(user.id);
            return self.reply(user.id, messages::ALREADY_PAID, None).await;
        }

        self.store
            .update(
                user.id,
                AccountPatch {
                    payment_email: Some(email.to_string()),
                    ..Default::default()
                },
            )
            .await?;

        // Delivery failure leaves the user in AwaitingEmail so the email can be resent
        self.notifier
            .send(
                self.settings.admin_chat_id,
                &messages::admin_payment_claim(&account, email),
                Some(&Keyboard::payment_review(user.id)),
            )
            .await?;
        log::info!("Payment claim from {} forwarded to admin", user.id);

        self.sessions.reset(user.id);
        self.reply(user.id, messages::AWAITING_APPROVAL, None).await
    }

    async fn on_withdrawal_details(&self, user: &UserRef, text: &str) -> AppResult<()> {
        let Some(contact) = parse_withdrawal_details(text) else {
            return self.reply(user.id, messages::BAD_WITHDRAWAL_FORMAT, None).await;
        };

        let outcome = self
            .store
            .reserve_withdrawal(user.id, contact, self.settings.min_withdraw, self.settings.fee_policy)
            .await?;
        self.sessions.reset(user.id);

        match outcome {
            ReserveOutcome::Reserved(request) => {
                log::info!(
                    "Withdrawal #{} reserved for {}: gross {} fee {} net {}",
                    request.id,
                    user.id,
                    request.gross,
                    request.fee,
                    request.net
                );
                self.notify_best_effort(
                    self.settings.admin_chat_id,
                    &messages::admin_withdrawal_request(&request, &self.settings),
                    Some(&Keyboard::withdrawal_review(user.id)),
                )
                .await;
                self.reply(user.id, &messages::withdrawal_submitted(&request, &self.settings), None)
                    .await
            }
            ReserveOutcome::NotFound => self.reply(user.id, messages::NOT_FOUND, None).await,
            ReserveOutcome::NotApproved => self.reply(user.id, messages::LOCKED, None).await,
            ReserveOutcome::AlreadyPending => self.reply(user.id, messages::PENDING_WITHDRAWAL, None).await,
            ReserveOutcome::BelowMinimum { .. } => {
                self.reply(user.id, &messages::below_minimum(&self.settings), None)
                    .await
            }
        }
    }

    async fn on_admin_action(&self, action: CallbackAction, origin: Option<MessageRef>) -> AppResult<()> {
        match action {
            CallbackAction::Approve(target) => self.on_approve(target, origin).await,
            CallbackAction::Reject(target) => self.on_reject(target, origin).await,
            CallbackAction::MarkPaid(target) => match self.store.complete_withdrawal(target).await? {
                Some(request) => {
                    log::info!("Withdrawal #{} of {} marked paid", request.id, target);
                    self.notify_best_effort(target, &messages::withdrawal_paid(&request, &self.settings), None)
                        .await;
                    self.confirm_admin(origin, &format!("✅ Withdrawal #{} marked as paid.", request.id))
                        .await
                }
                None => {
                    self.confirm_admin(origin, &format!("ℹ️ No pending withdrawal for user {}.", target))
                        .await
                }
            },
            CallbackAction::Decline(target) => match self.store.decline_withdrawal(target).await? {
                Some(request) => {
                    log::info!("Withdrawal #{} of {} declined, {} refunded", request.id, target, request.gross);
                    self.notify_best_effort(
                        target,
                        &messages::withdrawal_declined(&request, &self.settings),
                        None,
                    )
                    .await;
                    self.confirm_admin(origin, &format!("❌ Withdrawal #{} declined, balance restored.", request.id))
                        .await
                }
                None => {
                    self.confirm_admin(origin, &format!("ℹ️ No pending withdrawal for user {}.", target))
                        .await
                }
            },
            _ => Ok(()),
        }
    }

    async fn on_approve(&self, target: i64, origin: Option<MessageRef>) -> AppResult<()> {
        match self.store.approve(target).await? {
            ApprovalOutcome::Approved(account) => {
                log::info!("Registration of {} approved", target);
                self.reward_after_approval(&account).await;
                self.notify_best_effort(
                    target,
                    messages::APPROVED,
                    Some(&Keyboard::main_menu(true, &self.settings)),
                )
                .await;
                self.confirm_admin(origin, &format!("✅ User {} approved.", target))
                    .await
            }
            ApprovalOutcome::AlreadyApproved(account) => {
                // Completes a reward that failed on the first approval
                self.reward_after_approval(&account).await;
                self.confirm_admin(origin, &format!("ℹ️ User {} was already approved.", target))
                    .await
            }
            ApprovalOutcome::NotFound => {
                self.confirm_admin(origin, &format!("❌ User {} not found.", target))
                    .await
            }
        }
    }

    async fn on_reject(&self, target: i64, origin: Option<MessageRef>) -> AppResult<()> {
        match self.store.get(target).await? {
            None => {
                self.confirm_admin(origin, &format!("❌ User {} not found.", target))
                    .await
            }
            Some(account) if account.approved => {
                self.confirm_admin(origin, &format!("ℹ️ User {} is already approved.", target))
                    .await
            }
            Some(_) => {
                log::info!("Registration of {} rejected", target);
                self.notify_best_effort(target, messages::REJECTED, None).await;
                self.confirm_admin(origin, &format!("❌ User {} rejected.", target))
                    .await
            }
        }
    }

    async fn on_pending_list(&self, user: &UserRef) -> AppResult<()> {
        if !self.settings.is_admin(user.id) {
            log::warn!("User {} requested the pending withdrawal list", user.id);
            return self.reply(user.id, messages::NOT_AUTHORIZED, None).await;
        }
        let pending = self.store.pending_withdrawals().await?;
        self.reply(user.id, &messages::admin_pending_list(&pending, &self.settings), None)
            .await
    }

    async fn reward_referrer(&self, referrer_id: i64, referee_id: i64) -> AppResult<()> {
        let amount = self.settings.referral_reward;
        if self
            .store
            .reward_referrer_once(referrer_id, referee_id, amount)
            .await?
        {
            log::info!("Referrer {} rewarded {} for {}", referrer_id, amount, referee_id);
            self.notify_best_effort(referrer_id, &messages::referral_rewarded(amount, &self.settings), None)
                .await;
        }
        Ok(())
    }

    /// The approval is already committed here, so a failed reward is reported
    /// to the admin instead of failing the event.
    async fn reward_after_approval(&self, account: &Account) {
        let Some(referrer_id) = account.referred_by else {
            return;
        };
        if let Err(e) = self.reward_referrer(referrer_id, account.user_id).await {
            log::error!(
                "Failed to reward referrer {} for approved {}: {}",
                referrer_id,
                account.user_id,
                e
            );
            let report = messages::admin_reward_failed(referrer_id, account.user_id, &e.to_string());
            if let Err(e) = self.notifier.send(self.settings.admin_chat_id, &report, None).await {
                log::error!("Failed to report reward failure to admin: {}", e);
            }
        }
    }

    async fn reply(&self, chat_id: i64, text: &str, keyboard: Option<&Keyboard>) -> AppResult<()> {
        self.notifier.send(chat_id, text, keyboard).await?;
        Ok(())
    }

    /// Sends to a third party after the transition is already committed.
    /// Failures are logged and reported to the admin instead of failing the event.
    async fn notify_best_effort(&self, chat_id: i64, text: &str, keyboard: Option<&Keyboard>) {
        let Err(e) = self.notifier.send(chat_id, text, keyboard).await else {
            return;
        };
        log::error!("Failed to deliver message to {}: {}", chat_id, e);
        if chat_id != self.settings.admin_chat_id {
            let report = messages::admin_delivery_failed(chat_id, &e.to_string());
            if let Err(e) = self.notifier.send(self.settings.admin_chat_id, &report, None).await {
                log::error!("Failed to report delivery failure to admin: {}", e);
            }
        }
    }

    /// Edits the admin message that carried the button, or sends a new one.
    async fn confirm_admin(&self, origin: Option<MessageRef>, text: &str) -> AppResult<()> {
        if let Some(message) = origin {
            match self.notifier.edit(message, text).await {
                Ok(()) => return Ok(()),
                Err(e) => log::warn!("Failed to edit admin message, sending instead: {}", e),
            }
        }
        self.reply(self.settings.admin_chat_id, text, None).await
    }
}

/// Referrer id from the `/start` payload; self-referrals are dropped.
pub fn parse_referrer(payload: Option<&str>, user_id: i64) -> Option<i64> {
    payload
        .map(str::trim)
        .and_then(|raw| raw.parse::<i64>().ok())
        .filter(|&id| id > 0 && id != user_id)
}

/// Light format check; the admin verifies the payment itself.
pub fn is_plausible_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

/// Name and phone from the first two non-empty lines, `Name:` / `Phone:` labels optional.
pub fn parse_withdrawal_details(text: &str) -> Option<WithdrawalContact> {
    let mut lines = text.lines().map(str::trim).filter(|line| !line.is_empty());
    let name = strip_label(lines.next()?, "name");
    let phone = strip_label(lines.next()?, "phone");
    if name.is_empty() || phone.is_empty() {
        return None;
    }
    Some(WithdrawalContact {
        name: name.to_string(),
        phone: phone.to_string(),
    })
}

fn strip_label<'a>(line: &'a str, label: &str) -> &'a str {
    match line.split_once(':') {
        Some((head, rest)) if head.trim().eq_ignore_ascii_case(label) => rest.trim(),
        _ => line,
    }
}
