//! Command handling module.
//!
//! Parses user commands sent to the bot via private messages and runs
//! the gated store/serve/redeem flows.

mod handler;
mod types;

pub use handler::CommandHandler;
pub use types::{BotCommand, CommandResult, IncomingMessage};
