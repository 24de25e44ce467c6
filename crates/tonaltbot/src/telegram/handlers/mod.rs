//! Telegram bot handler tree configuration
//!
//! Handlers only convert updates into workflow events, so the tree can be
//! reused as is by integration tests.

mod schema;
mod types;

pub use schema::schema;
pub use types::{callback_origin, user_ref, HandlerDeps, HandlerError};
