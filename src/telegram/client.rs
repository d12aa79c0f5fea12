//! Telegram client wrapper for the file gate.

use std::path::PathBuf;

use async_trait::async_trait;
use grammers_client::{Client, Config, InitParams, InvocationError, Update};
use grammers_session::{PackedChat, PackedType, Session};
use grammers_tl_types as tl;
use thiserror::Error;
use tracing::{debug, info};

use super::RateLimiter;
use crate::config::TelegramConfig;
use crate::transport::{MemberStatus, MessageHandle, MessageRef, Transport, TransportError};

/// Errors that can occur during Telegram operations.
#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("Not authorized. Please sign in first.")]
    NotAuthorized,

    #[error("Sign in failed: {0}")]
    SignInFailed(String),

    #[error("Flood wait required: {0} seconds")]
    FloodWait(u32),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("API invocation error: {0}")]
    Invocation(String),
}

impl From<InvocationError> for TelegramError {
    fn from(err: InvocationError) -> Self {
        let err_str = err.to_string();

        if let Some(seconds) = extract_flood_wait_seconds(&err_str) {
            return Self::FloodWait(seconds);
        }

        Self::Invocation(err_str)
    }
}

/// Extracts flood wait seconds from an error message.
fn extract_flood_wait_seconds(err_msg: &str) -> Option<u32> {
    let patterns = ["FLOOD_WAIT_", "flood wait "];

    for pattern in patterns {
        if let Some(idx) = err_msg.to_lowercase().find(&pattern.to_lowercase()) {
            let start = idx + pattern.len();
            let num_str: String = err_msg[start..]
                .chars()
                .take_while(char::is_ascii_digit)
                .collect();
            if let Ok(seconds) = num_str.parse() {
                return Some(seconds);
            }
        }
    }
    None
}

/// Converts Telegram-side failures into transport errors.
fn transport_err(err: InvocationError) -> TransportError {
    let err_str = err.to_string();

    if let Some(seconds) = extract_flood_wait_seconds(&err_str) {
        return TransportError::FloodWait(seconds);
    }
    if err_str.contains("MESSAGE_ID_INVALID") || err_str.contains("MESSAGE_IDS_EMPTY") {
        return TransportError::NotFound;
    }

    TransportError::Unavailable(err_str)
}

/// Builds a packed chat from a configured chat id.
///
/// Channel ids are configured Bot-API style (`-100` prefixed); positive
/// ids are users.
fn packed_chat(chat_id: i64) -> PackedChat {
    if chat_id < 0 {
        PackedChat {
            ty: PackedType::Broadcast,
            id: -1_000_000_000_000 - chat_id,
            access_hash: None,
        }
    } else {
        PackedChat {
            ty: PackedType::User,
            id: chat_id,
            access_hash: None,
        }
    }
}

/// High-level Telegram client wrapper.
pub struct TelegramBot {
    /// The underlying grammers client.
    client: Client,

    /// Rate limiter for file deliveries.
    rate_limiter: RateLimiter,

    /// Where the session is persisted after sign-in.
    session_path: PathBuf,
}

impl TelegramBot {
    /// Connects to Telegram with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be loaded or the connection
    /// fails.
    pub async fn connect(
        config: &TelegramConfig,
        rate_limit_secs: u64,
    ) -> Result<Self, TelegramError> {
        info!("Connecting to Telegram...");

        let session = Session::load_file_or_create(&config.session_path)
            .map_err(|e| TelegramError::Session(e.to_string()))?;

        let client = Client::connect(Config {
            session,
            api_id: config.api_id,
            api_hash: config.api_hash.clone(),
            params: InitParams::default(),
        })
        .await
        .map_err(|e| TelegramError::Connection(e.to_string()))?;

        let is_authorized = client
            .is_authorized()
            .await
            .map_err(|e| TelegramError::Connection(e.to_string()))?;

        info!("Connected to Telegram. Authorized: {}", is_authorized);

        Ok(Self {
            client,
            rate_limiter: RateLimiter::from_secs(rate_limit_secs),
            session_path: config.session_path.clone(),
        })
    }

    /// Checks if the client is authorized.
    ///
    /// # Errors
    ///
    /// Returns an error if the check fails.
    pub async fn is_authorized(&self) -> Result<bool, TelegramError> {
        self.client
            .is_authorized()
            .await
            .map_err(|e| TelegramError::Connection(e.to_string()))
    }

    /// Signs in as a bot with the given token.
    ///
    /// # Errors
    ///
    /// Returns an error if sign in fails.
    pub async fn sign_in_bot(&self, token: &str) -> Result<(), TelegramError> {
        info!("Signing in bot {}...", mask_token(token));

        match self.client.bot_sign_in(token).await {
            Ok(_user) => {
                info!("Successfully signed in!");
                Ok(())
            }
            Err(e) => Err(TelegramError::SignInFailed(e.to_string())),
        }
    }

    /// Persists the session to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the session file cannot be written.
    pub fn save_session(&self) -> Result<(), TelegramError> {
        self.client
            .session()
            .save_to_file(&self.session_path)
            .map_err(|e| TelegramError::Session(e.to_string()))
    }

    /// Waits for the next update from Telegram.
    ///
    /// # Errors
    ///
    /// Returns an error if the update stream fails.
    pub async fn next_update(&self) -> Result<Update, TelegramError> {
        self.client.next_update().await.map_err(Into::into)
    }

    /// Returns a reference to the underlying client for advanced operations.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl Transport for TelegramBot {
    async fn send_file(&self, chat_id: i64, file_ref: &str) -> Result<MessageRef, TransportError> {
        let handle: MessageHandle = file_ref.parse()?;

        let waited = self.rate_limiter.wait_and_acquire().await;
        if !waited.is_zero() {
            debug!("Waited {:?} for rate limit", waited);
        }

        debug!("Forwarding {} into chat {}", handle, chat_id);

        let forwarded = self
            .client
            .forward_messages(
                packed_chat(chat_id),
                &[handle.message_id],
                packed_chat(handle.chat_id),
            )
            .await;

        match forwarded {
            Ok(mut messages) => match messages.pop().flatten() {
                Some(message) => Ok(message.id()),
                // Telegram silently drops forwards of deleted messages.
                None => Err(TransportError::NotFound),
            },
            Err(e) => {
                let err = transport_err(e);
                if let TransportError::FloodWait(seconds) = err {
                    self.rate_limiter.note_flood_wait(seconds).await;
                }
                Err(err)
            }
        }
    }

    async fn delete_message(
        &self,
        channel_id: i64,
        message_id: MessageRef,
    ) -> Result<(), TransportError> {
        debug!("Deleting message {} from channel {}", message_id, channel_id);

        self.client
            .delete_messages(packed_chat(channel_id), &[message_id])
            .await
            .map(|_| ())
            .map_err(transport_err)
    }

    async fn chat_member_status(
        &self,
        channel_id: i64,
        user_id: i64,
    ) -> Result<MemberStatus, TransportError> {
        let channel = packed_chat(channel_id);
        let request = tl::functions::channels::GetParticipant {
            channel: tl::enums::InputChannel::Channel(tl::types::InputChannel {
                channel_id: channel.id,
                access_hash: channel.access_hash.unwrap_or(0),
            }),
            participant: tl::enums::InputPeer::User(tl::types::InputPeerUser {
                user_id,
                access_hash: 0,
            }),
        };

        match self.client.invoke(&request).await {
            Ok(tl::enums::channels::ChannelParticipant::Participant(result)) => {
                Ok(classify_participant(result.participant))
            }
            Err(e) => {
                let err_str = e.to_string();
                if err_str.contains("USER_NOT_PARTICIPANT") {
                    return Ok(MemberStatus::Left);
                }
                Err(transport_err(e))
            }
        }
    }
}

/// Maps a raw channel participant to a membership status.
fn classify_participant(participant: tl::enums::ChannelParticipant) -> MemberStatus {
    use tl::enums::ChannelParticipant as Participant;

    match participant {
        Participant::Creator(_) => MemberStatus::Owner,
        Participant::Admin(_) => MemberStatus::Administrator,
        Participant::Banned(_) => MemberStatus::Banned,
        Participant::Left(_) => MemberStatus::Left,
        // Plain and self participants are ordinary members.
        _ => MemberStatus::Member,
    }
}

impl std::fmt::Debug for TelegramBot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramBot")
            .field("rate_limiter", &self.rate_limiter)
            .finish_non_exhaustive()
    }
}

/// Masks a bot token for logging (shows last 4 characters).
fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() > 4 {
        format!("***{}", chars[chars.len() - 4..].iter().collect::<String>())
    } else {
        "****".to_owned()
    }
}
