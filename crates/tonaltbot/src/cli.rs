use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tonaltbot")]
#[command(author, version, about = "Telegram bot for TONalt registrations, referrals and withdrawals", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Run the bot (long polling) and the health server
    Run,

    /// Print pending withdrawal requests from the database and exit
    PendingWithdrawals {
        /// Print as JSON instead of one line per request
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
