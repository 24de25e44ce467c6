//! Account persistence: the store trait, its SQLite and in-memory backends

pub mod db;
pub mod memory;
pub mod migrations;
pub mod models;
pub mod store;

// Re-exports for convenience
pub use db::{create_pool, get_connection, DbConnection, DbPool, SqliteAccountStore};
pub use memory::MemoryAccountStore;
pub use models::{
    Account, AccountPatch, ApprovalOutcome, Counter, NewAccount, ReserveOutcome, WithdrawalContact,
    WithdrawalRequest, WithdrawalStatus,
};
pub use store::AccountStore;
