//! Registration, referral and withdrawal conversation

pub mod actions;
pub mod handler;
pub mod keyboard;
pub mod messages;
pub mod notifier;
pub mod state;

pub use actions::CallbackAction;
pub use handler::{Event, UserRef, Workflow};
pub use keyboard::{Button, Keyboard};
pub use notifier::{MessageRef, Notifier, RetryingNotifier};
pub use state::{ConversationState, Sessions};
