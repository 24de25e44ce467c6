//! TONalt bot: Telegram glue around the `tonaltcore` workflow
//!
//! - `cli`: command line interface
//! - `telegram`: bot construction, dispatcher schema, Bot API notifier

pub mod cli;
pub mod telegram;
