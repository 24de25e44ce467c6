//! Callback data carried by inline keyboard buttons.
//!
//! User actions are bare tokens (`pay`, `withdraw`, ...). Admin actions carry
//! the target user id after an underscore (`approve_42`).

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackAction {
    Pay,
    Verify,
    Library,
    Referrals,
    Balance,
    Withdraw,
    Approve(i64),
    Reject(i64),
    MarkPaid(i64),
    Decline(i64),
}

impl CallbackAction {
    /// Actions that only the admin chat may trigger.
    pub fn is_admin_action(&self) -> bool {
        self.target().is_some()
    }

    /// User the admin action applies to.
    pub fn target(&self) -> Option<i64> {
        match *self {
            CallbackAction::Approve(id)
            | CallbackAction::Reject(id)
            | CallbackAction::MarkPaid(id)
            | CallbackAction::Decline(id) => Some(id),
            _ => None,
        }
    }

    /// Actions that require an approved registration.
    pub fn is_locked(&self) -> bool {
        matches!(
            self,
            CallbackAction::Library | CallbackAction::Referrals | CallbackAction::Balance | CallbackAction::Withdraw
        )
    }
}

impl FromStr for CallbackAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let simple = match s {
            "pay" => Some(CallbackAction::Pay),
            "verify" => Some(CallbackAction::Verify),
            "library" => Some(CallbackAction::Library),
            // "referrals" is what older keyboards still send
            "ref" | "referrals" => Some(CallbackAction::Referrals),
            "balance" => Some(CallbackAction::Balance),
            "withdraw" => Some(CallbackAction::Withdraw),
            _ => None,
        };
        if let Some(action) = simple {
            return Ok(action);
        }

        let (prefix, id) = s.split_once('_').ok_or_else(|| format!("Unknown callback: {}", s))?;
        let id: i64 = id.parse().map_err(|_| format!("Bad user id in callback: {}", s))?;
        match prefix {
            "approve" => Ok(CallbackAction::Approve(id)),
            "reject" => Ok(CallbackAction::Reject(id)),
            "paid" => Ok(CallbackAction::MarkPaid(id)),
            "decline" => Ok(CallbackAction::Decline(id)),
            _ => Err(format!("Unknown callback: {}", s)),
        }
    }
}

impl fmt::Display for CallbackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackAction::Pay => f.write_str("pay"),
            CallbackAction::Verify => f.write_str("verify"),
            CallbackAction::Library => f.write_str("library"),
            CallbackAction::Referrals => f.write_str("ref"),
            CallbackAction::Balance => f.write_str("balance"),
            CallbackAction::Withdraw => f.write_str("withdraw"),
            CallbackAction::Approve(id) => write!(f, "approve_{}", id),
            CallbackAction::Reject(id) => write!(f, "reject_{}", id),
            CallbackAction::MarkPaid(id) => write!(f, "paid_{}", id),
            CallbackAction::Decline(id) => write!(f, "decline_{}", id),
        }
    }
}
