//! Bot API implementation of the workflow [`Notifier`].

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, MessageId};

use tonaltcore::core::error::NotifyError;
use tonaltcore::workflow::{Keyboard, MessageRef, Notifier};

/// Sends plain-text messages; user input (emails, names) is never parsed as markup.
#[derive(Clone)]
pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

/// Converts a workflow keyboard into callback buttons.
pub fn inline_keyboard(keyboard: &Keyboard) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(keyboard.rows.iter().map(|row| {
        row.iter()
            .map(|button| InlineKeyboardButton::callback(button.label.clone(), button.action.to_string()))
            .collect::<Vec<_>>()
    }))
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, chat_id: i64, text: &str, keyboard: Option<&Keyboard>) -> Result<(), NotifyError> {
        let mut request = self.bot.send_message(ChatId(chat_id), text);
        if let Some(keyboard) = keyboard {
            request = request.reply_markup(inline_keyboard(keyboard));
        }
        request.await?;
        Ok(())
    }

    async fn edit(&self, message: MessageRef, text: &str) -> Result<(), NotifyError> {
        self.bot
            .edit_message_text(ChatId(message.chat_id), MessageId(message.message_id), text)
            .await?;
        Ok(())
    }
}
