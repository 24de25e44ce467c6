//! Handler types, dependencies, and update conversion helpers

use std::sync::Arc;

use teloxide::types::{CallbackQuery, User};

use tonaltcore::workflow::{MessageRef, UserRef, Workflow};

/// Error type for handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Dependencies required by handlers
#[derive(Clone)]
pub struct HandlerDeps {
    pub workflow: Arc<Workflow>,
}

impl HandlerDeps {
    /// Create new handler dependencies
    pub fn new(workflow: Arc<Workflow>) -> Self {
        Self { workflow }
    }
}

/// Telegram user as the workflow sees it; `None` for ids outside i64.
pub fn user_ref(user: &User) -> Option<UserRef> {
    let id = i64::try_from(user.id.0).ok()?;
    Some(UserRef {
        id,
        username: user.username.clone(),
    })
}

/// The message that carried the pressed button, if Telegram still has it.
pub fn callback_origin(query: &CallbackQuery) -> Option<MessageRef> {
    query.message.as_ref().map(|message| MessageRef {
        chat_id: message.chat().id.0,
        message_id: message.id().0,
    })
}
