//! Platform-neutral inline keyboards.

use super::actions::CallbackAction;
use crate::core::config::Settings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub action: CallbackAction,
}

impl Button {
    pub fn new(label: impl Into<String>, action: CallbackAction) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }
}

/// Rows of callback buttons.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn row(mut self, buttons: Vec<Button>) -> Self {
        self.rows.push(buttons);
        self
    }

    pub fn actions(&self) -> impl Iterator<Item = CallbackAction> + '_ {
        self.rows.iter().flatten().map(|button| button.action)
    }

    /// Main menu: the pay button until approved, the unlocked features after.
    pub fn main_menu(approved: bool, settings: &Settings) -> Self {
        if !approved {
            return Self::new().row(vec![Button::new(
                format!("💳 Pay Registration ({} {})", settings.currency, settings.registration_fee),
                CallbackAction::Pay,
            )]);
        }
        Self::new()
            .row(vec![Button::new("📚 Library", CallbackAction::Library)])
            .row(vec![
                Button::new("👥 Referrals", CallbackAction::Referrals),
                Button::new("💰 Balance", CallbackAction::Balance),
            ])
            .row(vec![Button::new("🏦 Withdraw", CallbackAction::Withdraw)])
    }

    pub fn payment_sent() -> Self {
        Self::new().row(vec![Button::new("✅ I've Paid", CallbackAction::Verify)])
    }

    pub fn payment_review(user_id: i64) -> Self {
        Self::new().row(vec![
            Button::new("✅ Approve", CallbackAction::Approve(user_id)),
            Button::new("❌ Reject", CallbackAction::Reject(user_id)),
        ])
    }

    pub fn withdrawal_review(user_id: i64) -> Self {
        Self::new().row(vec![
            Button::new("✅ Mark paid", CallbackAction::MarkPaid(user_id)),
            Button::new("❌ Decline", CallbackAction::Decline(user_id)),
        ])
    }
}
