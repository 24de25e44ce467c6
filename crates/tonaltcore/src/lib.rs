//! TONalt core: registration, referral and withdrawal workflow
//!
//! This library holds everything the bot does that is not Telegram glue:
//! account persistence, the referral reward guard, fee computation and the
//! conversation state machine that ties them together.
//!
//! # Module Structure
//!
//! - `core`: configuration, errors, logging, fee policy, health server
//! - `storage`: account store trait, SQLite and in-memory implementations
//! - `workflow`: conversation handler, callback actions, keyboards, notifier seam

pub mod core;
pub mod storage;
pub mod workflow;

// Re-export commonly used types for convenience
pub use core::{config, AppError, AppResult, FeePolicy, Settings};
pub use storage::{create_pool, AccountStore, DbPool, MemoryAccountStore, SqliteAccountStore};
pub use workflow::{Event, Notifier, UserRef, Workflow};
