use thiserror::Error;

/// Centralized error types for the application
///
/// Store, notifier and configuration failures are all converted to this enum so
/// the Telegram layer can log them and reply with one generic failure message.
///
/// # Example
///
/// ```no_run
/// use tonaltcore::core::error::AppError;
///
/// fn handle_error(err: AppError) {
///     eprintln!("Error: {}", err);
/// }
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Database connection pool errors
    #[error("Database pool error: {0}")]
    DatabasePool(#[from] r2d2::Error),

    /// Schema migration errors
    #[error("Migration error: {0}")]
    Migration(String),

    /// Outbound chat message errors
    #[error("Notifier error: {0}")]
    Notify(#[from] NotifyError),

    /// Missing or malformed environment configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A blocking store task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Violated store invariant (unknown account, negative balance)
    #[error("Store error: {0}")]
    Store(String),
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;

/// Failure to deliver a message through the chat platform.
#[derive(Error, Debug, Clone)]
pub enum NotifyError {
    /// Network-level failure; worth retrying
    #[error("network error: {0}")]
    Network(String),

    /// Platform asked us to slow down
    #[error("rate limited, retry after {0}s")]
    RetryAfter(u64),

    /// Request was rejected by the platform (blocked bot, bad chat id, ...)
    #[error("rejected by platform: {0}")]
    Rejected(String),
}

impl NotifyError {
    /// Whether repeating the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, NotifyError::Network(_) | NotifyError::RetryAfter(_))
    }
}

#[cfg(feature = "telegram")]
impl From<teloxide::RequestError> for NotifyError {
    fn from(err: teloxide::RequestError) -> Self {
        use teloxide::RequestError;
        match err {
            RequestError::Network(e) => NotifyError::Network(e.to_string()),
            RequestError::Io(e) => NotifyError::Network(e.to_string()),
            RequestError::RetryAfter(secs) => NotifyError::RetryAfter(u64::from(secs.seconds())),
            other => NotifyError::Rejected(other.to_string()),
        }
    }
}
