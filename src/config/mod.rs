//! Configuration module for the filegate bot.
//!
//! Handles loading and validation of bot configuration including
//! Telegram API credentials, store connection, and gate policy.

mod settings;

pub use settings::{ConfigError, GateSettings, StoreConfig, TelegramConfig};
