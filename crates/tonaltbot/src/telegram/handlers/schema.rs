//! Dispatcher schema and handler chain builders

use teloxide::dispatching::{UpdateFilterExt, UpdateHandler};
use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, Message};

use super::types::{callback_origin, user_ref, HandlerDeps, HandlerError};
use crate::telegram::bot::{start_payload, Command};
use tonaltcore::workflow::Event;

/// Creates the main dispatcher schema for the Telegram bot.
///
/// The same schema is used in production and can be used in integration tests.
///
/// # Arguments
/// * `deps` - Handler dependencies (the shared workflow)
///
/// # Returns
/// The complete handler tree for the bot
pub fn schema(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    let deps_commands = deps.clone();
    let deps_messages = deps.clone();
    let deps_callback = deps;

    dptree::entry()
        // Command handler
        .branch(command_handler(deps_commands))
        // Free text (payment email, withdrawal details)
        .branch(message_handler(deps_messages))
        // Callback query handler
        .branch(callback_handler(deps_callback))
}

/// Handler for bot commands (/start, /pending)
fn command_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message()
        .filter(|msg: Message| msg.chat.is_private())
        .filter_command::<Command>()
        .endpoint(move |msg: Message, cmd: Command| {
            let deps = deps.clone();
            async move {
                let Some(user) = msg.from.as_ref().and_then(user_ref) else {
                    return Ok(());
                };
                log::info!("Command {:?} from {}", cmd, user.id);
                let event = match cmd {
                    Command::Start(args) => Event::Start {
                        user,
                        payload: start_payload(&args),
                    },
                    Command::Pending => Event::PendingWithdrawals { user },
                };
                deps.workflow.handle(event).await;
                Ok(())
            }
        })
}

/// Handler for plain text in private chats; unknown commands are ignored
fn message_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message()
        .filter(|msg: Message| {
            msg.chat.is_private() && msg.text().map(|text| !text.starts_with('/')).unwrap_or(false)
        })
        .endpoint(move |msg: Message| {
            let deps = deps.clone();
            async move {
                let (Some(user), Some(text)) = (msg.from.as_ref().and_then(user_ref), msg.text()) else {
                    return Ok(());
                };
                deps.workflow
                    .handle(Event::Text {
                        user,
                        text: text.to_string(),
                    })
                    .await;
                Ok(())
            }
        })
}

/// Handler for inline button presses
fn callback_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_callback_query().endpoint(move |bot: Bot, q: CallbackQuery| {
        let deps = deps.clone();
        async move {
            // Stop the button spinner before doing any work
            if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
                log::warn!("Failed to answer callback query: {}", e);
            }

            let (Some(user), Some(data)) = (user_ref(&q.from), q.data.clone()) else {
                return Ok(());
            };
            log::info!("Callback '{}' from {}", data, user.id);
            deps.workflow
                .handle(Event::Callback {
                    user,
                    origin: callback_origin(&q),
                    data,
                })
                .await;
            Ok(())
        }
    })
}
