//! Outbound message seam.

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};

use super::keyboard::Keyboard;
use crate::core::config;
use crate::core::error::NotifyError;

/// A message previously sent by the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: i64,
    pub message_id: i32,
}

/// Sends and edits chat messages.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, chat_id: i64, text: &str, keyboard: Option<&Keyboard>) -> Result<(), NotifyError>;

    /// Replaces the text of `message` and drops its keyboard.
    async fn edit(&self, message: MessageRef, text: &str) -> Result<(), NotifyError>;
}

/// Retries transient failures of the wrapped notifier with exponential backoff.
pub struct RetryingNotifier<N> {
    inner: N,
    max_attempts: usize,
}

impl<N: Notifier> RetryingNotifier<N> {
    pub fn new(inner: N) -> Self {
        Self {
            inner,
            max_attempts: config::retry::MAX_ATTEMPTS,
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(config::retry::min_delay())
            .with_max_delay(config::retry::max_delay())
            .with_max_times(self.max_attempts)
            .with_jitter()
    }
}

fn log_retry(err: &NotifyError, delay: std::time::Duration) {
    log::warn!("Telegram request failed (retrying in {:?}): {}", delay, err);
}

#[async_trait]
impl<N: Notifier> Notifier for RetryingNotifier<N> {
    async fn send(&self, chat_id: i64, text: &str, keyboard: Option<&Keyboard>) -> Result<(), NotifyError> {
        let inner = &self.inner;
        (|| async move { inner.send(chat_id, text, keyboard).await })
            .retry(self.backoff())
            .when(NotifyError::is_transient)
            .notify(log_retry)
            .await
    }

    async fn edit(&self, message: MessageRef, text: &str) -> Result<(), NotifyError> {
        let inner = &self.inner;
        (|| async move { inner.edit(message, text).await })
            .retry(self.backoff())
            .when(NotifyError::is_transient)
            .notify(log_retry)
            .await
    }
}
