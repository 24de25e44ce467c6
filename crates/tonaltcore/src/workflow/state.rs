//! Per-user conversation state.
//!
//! Only the "what is the next free-text message for" marker lives here. It is
//! kept in memory and is lost on restart; the persisted account flags are the
//! source of truth for everything else.

use dashmap::DashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversationState {
    #[default]
    Idle,
    /// Next text message is the email the registration was paid with
    AwaitingEmail,
    /// Next text message carries the payout name and phone
    AwaitingWithdrawalDetails,
}

/// Session map keyed by user id.
#[derive(Debug, Default)]
pub struct Sessions {
    states: DashMap<i64, ConversationState>,
}

impl Sessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user_id: i64) -> ConversationState {
        self.states.get(&user_id).map(|entry| *entry).unwrap_or_default()
    }

    pub fn set(&self, user_id: i64, state: ConversationState) {
        if state == ConversationState::Idle {
            self.states.remove(&user_id);
        } else {
            self.states.insert(user_id, state);
        }
    }

    pub fn reset(&self, user_id: i64) {
        self.set(user_id, ConversationState::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_is_not_stored() {
        let sessions = Sessions::new();
        assert_eq!(sessions.get(1), ConversationState::Idle);

        sessions.set(1, ConversationState::AwaitingEmail);
        sessions.set(2, ConversationState::AwaitingWithdrawalDetails);
        assert_eq!(sessions.get(1), ConversationState::AwaitingEmail);
        assert_eq!(sessions.states.len(), 2);

        sessions.reset(1);
        assert_eq!(sessions.get(1), ConversationState::Idle);
        assert_eq!(sessions.get(2), ConversationState::AwaitingWithdrawalDetails);
        assert_eq!(sessions.states.len(), 1);
    }
}
