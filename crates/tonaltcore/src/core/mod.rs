//! Core utilities, configuration, and common functionality

pub mod config;
pub mod error;
pub mod fees;
pub mod logging;
pub mod web_server;

// Re-exports for convenience
pub use config::Settings;
pub use error::{AppError, AppResult};
pub use fees::{FeeBreakdown, FeePolicy};
pub use logging::{init_logger, log_configuration};
