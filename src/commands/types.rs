//! Command types and definitions.

use crate::transport::MessageRef;

/// Prefix of a `/start` deep-link payload that requests a file.
pub const FILE_PAYLOAD_PREFIX: &str = "get-";

/// Inbound message context extracted by the update dispatcher.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// User the message came from.
    pub user_id: i64,

    /// Private chat the message arrived in (equals `user_id` for users).
    pub chat_id: i64,

    /// Id of the message itself, used when archiving attachments.
    pub message_id: MessageRef,

    /// Message text or caption.
    pub text: String,

    /// Whether a document is attached.
    pub has_document: bool,
}

/// Available bot commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    /// Greet the user; an optional deep-link payload redeems a token or
    /// requests a file.
    Start(Option<String>),

    /// Show help information.
    Help,

    /// Issue a new access token.
    Token,

    /// Retrieve the file behind a share code.
    Get(String),

    /// Store the attached document (command given as the caption).
    Store,

    /// Show the caller's current access status.
    Status,
}

impl BotCommand {
    /// Parses a command from a message text.
    ///
    /// Returns `None` if the message is not a valid command.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let after_slash = text.strip_prefix('/')?;

        let (cmd, args) = match after_slash.split_once(char::is_whitespace) {
            Some((cmd, args)) => (cmd, Some(args.trim())),
            None => (after_slash, None),
        };

        // Commands may be addressed as "/cmd@botname".
        let cmd = cmd.split('@').next().unwrap_or(cmd).to_lowercase();
        let args = args.filter(|a| !a.is_empty());

        match cmd.as_str() {
            "start" => Some(Self::Start(args.map(ToOwned::to_owned))),
            "help" | "h" | "?" => Some(Self::Help),
            "token" | "access" => Some(Self::Token),
            "get" | "fetch" => args.map(|a| Self::Get(a.to_owned())),
            "store" | "save" | "upload" => Some(Self::Store),
            "status" | "s" => Some(Self::Status),
            _ => None,
        }
    }
}

/// Result of executing a command.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Whether the command succeeded.
    pub success: bool,

    /// Message to show to the user.
    pub message: String,
}

impl CommandResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    /// Creates an error result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}
