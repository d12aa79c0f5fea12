//! The chat-transport seam.
//!
//! The core never moves file bytes itself; it asks the transport to
//! re-send an archived message, delete one, or report a user's membership
//! status. Implementations live behind this trait so the gate logic can be
//! exercised against a stub in tests.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use thiserror::Error;

/// Message id within a chat, as Telegram numbers them.
pub type MessageRef = i32;

/// Errors surfaced by transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The referenced message or file no longer exists upstream.
    #[error("Referenced message not found")]
    NotFound,

    #[error("Flood wait required: {0} seconds")]
    FloodWait(u32),

    #[error("Transport unavailable: {0}")]
    Unavailable(String),
}

/// Membership status of a user in a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberStatus {
    Owner,
    Administrator,
    Member,
    Restricted,
    Left,
    Banned,
    /// The transport could not classify the user. Treated as not a member.
    Unknown,
}

impl MemberStatus {
    /// Whether this status satisfies the force-subscription requirement.
    #[must_use]
    pub fn is_subscribed(self) -> bool {
        matches!(self, Self::Owner | Self::Administrator | Self::Member)
    }
}

/// A refetchable reference to an archived message: `chat_id:message_id`.
///
/// Leases store this rendered as an opaque string; only the transport
/// layer interprets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHandle {
    pub chat_id: i64,
    pub message_id: MessageRef,
}

impl MessageHandle {
    #[must_use]
    pub fn new(chat_id: i64, message_id: MessageRef) -> Self {
        Self {
            chat_id,
            message_id,
        }
    }
}

impl fmt::Display for MessageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chat_id, self.message_id)
    }
}

impl FromStr for MessageHandle {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (chat, message) = s.split_once(':').ok_or(TransportError::NotFound)?;
        let chat_id = chat.parse().map_err(|_| TransportError::NotFound)?;
        let message_id = message.parse().map_err(|_| TransportError::NotFound)?;
        Ok(Self {
            chat_id,
            message_id,
        })
    }
}

/// Operations the gate core needs from the chat platform.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Re-sends the message behind `file_ref` into `chat_id`.
    ///
    /// Returns the id of the delivered message in the destination chat.
    ///
    /// # Errors
    ///
    /// `NotFound` when the referenced message is gone upstream; other
    /// variants for delivery failures.
    async fn send_file(&self, chat_id: i64, file_ref: &str) -> Result<MessageRef, TransportError>;

    /// Deletes a message from a channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion fails.
    async fn delete_message(
        &self,
        channel_id: i64,
        message_id: MessageRef,
    ) -> Result<(), TransportError>;

    /// Reports the membership status of `user_id` in `channel_id`.
    ///
    /// # Errors
    ///
    /// Returns an error when the platform cannot answer; callers decide
    /// how to degrade (the subscription oracle fails closed).
    async fn chat_member_status(
        &self,
        channel_id: i64,
        user_id: i64,
    ) -> Result<MemberStatus, TransportError>;
}
