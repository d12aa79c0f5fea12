//! Command handler implementation.
//!
//! Every gated command computes one authorization decision up front and
//! acts on it; the store, serve and redeem flows then talk to the lease
//! registry and token issuer.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use super::types::{BotCommand, CommandResult, IncomingMessage, FILE_PAYLOAD_PREFIX};
use crate::access::{AuthorizationDecision, Gatekeeper};
use crate::config::GateSettings;
use crate::lease::{LeaseError, LeaseRegistry, OriginStatus};
use crate::store::{GrantStore, LeaseStore};
use crate::transport::{MessageHandle, Transport, TransportError};

/// Handles bot commands against the gate core.
pub struct CommandHandler<S, T> {
    /// Authorization for every gated action.
    gatekeeper: Gatekeeper<S, T>,

    /// File leases.
    registry: LeaseRegistry<S>,

    /// Chat platform operations.
    transport: Arc<T>,

    /// Gate policy and channel wiring.
    settings: GateSettings,
}

impl<S, T> CommandHandler<S, T>
where
    S: GrantStore + LeaseStore,
    T: Transport,
{
    /// Creates a new command handler.
    #[must_use]
    pub fn new(store: Arc<S>, transport: Arc<T>, settings: GateSettings) -> Self {
        let gatekeeper = Gatekeeper::new(
            Arc::clone(&store),
            Arc::clone(&transport),
            settings.force_sub_channel_id,
            settings.owner_ids.clone(),
        );
        let registry = LeaseRegistry::new(store, settings.lease_duration());

        Self {
            gatekeeper,
            registry,
            transport,
            settings,
        }
    }

    /// Tries to parse and execute a command from a message.
    ///
    /// Returns `None` if the message is not a command.
    pub async fn try_handle(&self, msg: &IncomingMessage) -> Option<CommandResult> {
        let command = BotCommand::parse(&msg.text)?;

        debug!("Handling {:?} from user {}", command, msg.user_id);
        let result = self.execute(command, msg, Utc::now()).await;
        debug!(
            "Command result for user {}: success={}",
            msg.user_id, result.success
        );

        Some(result)
    }

    /// Executes a parsed command.
    async fn execute(
        &self,
        command: BotCommand,
        msg: &IncomingMessage,
        now: DateTime<Utc>,
    ) -> CommandResult {
        match command {
            BotCommand::Start(None) => self.handle_start(msg.user_id, now).await,
            BotCommand::Start(Some(payload)) => match payload.strip_prefix(FILE_PAYLOAD_PREFIX) {
                Some(code) => self.handle_get(msg, code, now).await,
                None => self.handle_redeem(msg.user_id, &payload, now).await,
            },
            BotCommand::Get(code) => self.handle_get(msg, &code, now).await,
            BotCommand::Store => self.handle_store(msg, now).await,
            BotCommand::Token => self.handle_token(msg.user_id, now).await,
            BotCommand::Status => self.handle_status(msg.user_id, now).await,
            BotCommand::Help => Self::handle_help(),
        }
    }

    /// Gates a user action; `Some` carries the rejection to reply with.
    async fn gate(&self, user_id: i64, now: DateTime<Utc>) -> Option<CommandResult> {
        match self.gatekeeper.authorize(user_id, now).await {
            Ok(decision) if decision.is_allowed() => None,
            Ok(_) => Some(self.join_prompt()),
            Err(e) => {
                error!("Authorization check failed for user {}: {}", user_id, e);
                Some(self.store_failure())
            }
        }
    }

    async fn handle_start(&self, user_id: i64, now: DateTime<Utc>) -> CommandResult {
        match self.gate(user_id, now).await {
            None => CommandResult::success(
                "Welcome to the file gate!\n\
                 Send a document with /store as its caption to share it.\n\
                 Use /get <code> or a share link to retrieve files.",
            ),
            Some(denied) => denied,
        }
    }

    async fn handle_store(&self, msg: &IncomingMessage, now: DateTime<Utc>) -> CommandResult {
        if !msg.has_document {
            return CommandResult::error(
                "Attach a document and put /store in its caption to share it.",
            );
        }

        if let Some(denied) = self.gate(msg.user_id, now).await {
            return denied;
        }

        // Archive the submitted message; the archived copy is what gets
        // re-sent to requesters from now on.
        let submitted = MessageHandle::new(msg.chat_id, msg.message_id);
        let origin = match self
            .transport
            .send_file(self.settings.archive_channel_id, &submitted.to_string())
            .await
        {
            Ok(origin) => origin,
            Err(e) => {
                warn!("Could not archive submission from {}: {}", msg.user_id, e);
                return CommandResult::error("Could not archive your file. Please try again later.");
            }
        };

        let archived = MessageHandle::new(self.settings.archive_channel_id, origin);
        match self
            .registry
            .store_file(msg.user_id, archived.to_string(), origin, now)
            .await
        {
            Ok(lease) => CommandResult::success(format!(
                "✓ File stored!\n\
                 Share link: {}\n\
                 Links stay active for {} hours and renew on every download.",
                self.share_url(&lease.share_link),
                self.settings.lease_duration_hours,
            )),
            Err(e) => {
                error!("Could not lease archived file: {}", e);
                self.store_failure()
            }
        }
    }

    async fn handle_get(
        &self,
        msg: &IncomingMessage,
        code: &str,
        now: DateTime<Utc>,
    ) -> CommandResult {
        if let Some(denied) = self.gate(msg.user_id, now).await {
            return denied;
        }

        let lease = match self.registry.resolve(code).await {
            Ok(lease) => lease,
            Err(LeaseError::NotFound) => {
                return CommandResult::error("No such link, or the file is no longer available.");
            }
            Err(e) => {
                error!("Could not resolve share link {}: {}", code, e);
                return self.store_failure();
            }
        };

        let Some(file_ref) = lease.file_ref.as_deref() else {
            return CommandResult::error("No such link, or the file is no longer available.");
        };

        match self.transport.send_file(msg.chat_id, file_ref).await {
            Ok(_) => {
                // Delivery worked, so the archived original still resolves.
                match self.registry.touch(code, OriginStatus::Available, now).await {
                    Ok(_) => {}
                    Err(e) => warn!("Could not renew lease {}: {}", code, e),
                }
                CommandResult::success("✓ Here is your file.")
            }
            Err(TransportError::NotFound) => {
                info!("Archived copy behind {} is gone", code);
                let _ = self.registry.touch(code, OriginStatus::Gone, now).await;
                CommandResult::error("That file is no longer available.")
            }
            Err(TransportError::FloodWait(seconds)) => CommandResult::error(format!(
                "Telegram is throttling the bot. Please retry in {seconds} seconds."
            )),
            Err(e) => {
                warn!("Could not deliver {} to user {}: {}", code, msg.user_id, e);
                match self.registry.touch(code, OriginStatus::Unavailable, now).await {
                    Err(LeaseError::OriginUnavailable) | Ok(_) => {}
                    Err(e) => warn!("Lease {} left untouched: {}", code, e),
                }
                CommandResult::error("The file is temporarily unavailable. Please try again.")
            }
        }
    }

    async fn handle_token(&self, user_id: i64, now: DateTime<Utc>) -> CommandResult {
        match self
            .gatekeeper
            .issuer()
            .issue(user_id, self.settings.token_ttl(), now)
            .await
        {
            Ok(grant) => CommandResult::success(format!(
                "Your access token is valid for {} hours.\n\
                 Redeem it by opening:\n{}",
                self.settings.token_ttl_hours,
                self.token_url(&grant.token),
            )),
            Err(e) => {
                error!("Could not issue token for user {}: {}", user_id, e);
                self.store_failure()
            }
        }
    }

    async fn handle_redeem(
        &self,
        user_id: i64,
        token: &str,
        now: DateTime<Utc>,
    ) -> CommandResult {
        match self.gatekeeper.issuer().validate(user_id, token, now).await {
            Ok(true) => {
                info!("User {} redeemed an access token", user_id);
                match self.gatekeeper.issuer().active_grant(user_id, now).await {
                    Ok(Some(grant)) => CommandResult::success(format!(
                        "✓ Access granted until {}.",
                        grant.expires_at.format("%Y-%m-%d %H:%M UTC")
                    )),
                    _ => CommandResult::success("✓ Access granted."),
                }
            }
            Ok(false) => CommandResult::error(
                "Invalid or expired token. Get a fresh one with /token.",
            ),
            Err(e) => {
                error!("Could not validate token for user {}: {}", user_id, e);
                self.store_failure()
            }
        }
    }

    async fn handle_status(&self, user_id: i64, now: DateTime<Utc>) -> CommandResult {
        match self.gatekeeper.authorize(user_id, now).await {
            Ok(AuthorizationDecision::Exempt) => {
                CommandResult::success("✓ Full access: you are a channel member or owner.")
            }
            Ok(AuthorizationDecision::TokenGranted(expires_at)) => {
                CommandResult::success(format!(
                    "✓ Token access until {}.",
                    expires_at.format("%Y-%m-%d %H:%M UTC")
                ))
            }
            Ok(AuthorizationDecision::Denied) => self.join_prompt(),
            Err(e) => {
                error!("Could not check status for user {}: {}", user_id, e);
                self.store_failure()
            }
        }
    }

    fn handle_help() -> CommandResult {
        CommandResult::success(
            "Commands:\n\
             /store — share the attached document (use as the caption)\n\
             /get <code> — retrieve a shared file\n\
             /token — get a 24-hour access token\n\
             /status — show your current access\n\
             /help — this message",
        )
    }

    fn join_prompt(&self) -> CommandResult {
        CommandResult::error(format!(
            "⚠️ Please join our channel to use this bot: {}\n\
             Or get a temporary access token with /token.",
            self.settings.force_sub_link
        ))
    }

    fn store_failure(&self) -> CommandResult {
        CommandResult::error("Something went wrong. Please try again later.")
    }

    fn share_url(&self, code: &str) -> String {
        format!(
            "https://t.me/{}?start={FILE_PAYLOAD_PREFIX}{code}",
            self.settings.bot_username
        )
    }

    fn token_url(&self, token: &str) -> String {
        format!("https://t.me/{}?start={token}", self.settings.bot_username)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::TokenIssuer;
    use crate::store::MemoryStore;
    use crate::transport::testing::StubTransport;
    use crate::transport::MemberStatus;
    use chrono::Duration;
    use std::collections::HashSet;

    const ARCHIVE: i64 = -1_001_000_000_001;

    fn settings() -> GateSettings {
        GateSettings {
            bot_username: "filegate_bot".to_owned(),
            archive_channel_id: ARCHIVE,
            force_sub_channel_id: -1_001_000_000_002,
            force_sub_link: "https://t.me/some_channel".to_owned(),
            owner_ids: HashSet::from([99]),
            token_ttl_hours: 24,
            lease_duration_hours: 2,
            sweep_interval_hours: 1,
            sweep_grace_hours: 1,
            min_send_interval_secs: 1,
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        transport: Arc<StubTransport>,
        handler: CommandHandler<MemoryStore, StubTransport>,
    }

    fn fixture(transport: StubTransport) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(transport);
        let handler = CommandHandler::new(Arc::clone(&store), Arc::clone(&transport), settings());
        Fixture {
            store,
            transport,
            handler,
        }
    }

    fn message(user_id: i64, text: &str) -> IncomingMessage {
        IncomingMessage {
            user_id,
            chat_id: user_id,
            message_id: 5,
            text: text.to_owned(),
            has_document: false,
        }
    }

    fn document(user_id: i64, text: &str) -> IncomingMessage {
        IncomingMessage {
            has_document: true,
            ..message(user_id, text)
        }
    }

    #[tokio::test]
    async fn test_non_command_is_ignored() {
        let fx = fixture(StubTransport::new());
        assert!(fx.handler.try_handle(&message(1, "hello there")).await.is_none());
    }

    #[tokio::test]
    async fn test_stranger_is_prompted_to_join() {
        let fx = fixture(StubTransport::new());

        let result = fx.handler.try_handle(&message(1, "/get abc")).await.unwrap();
        assert!(!result.success);
        assert!(result.message.contains("https://t.me/some_channel"));
        assert!(result.message.contains("/token"));
    }

    #[tokio::test]
    async fn test_member_stores_a_document() {
        let fx = fixture(StubTransport::new().with_status(1, MemberStatus::Member));

        let result = fx
            .handler
            .try_handle(&document(1, "/store"))
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.message.contains("?start=get-"));

        // The submission was forwarded into the archive channel.
        let sent = fx.transport.sent.lock().unwrap().clone();
        assert_eq!(sent, vec![(ARCHIVE, "1:5".to_owned())]);
    }

    #[tokio::test]
    async fn test_store_requires_a_document() {
        let fx = fixture(StubTransport::new().with_status(1, MemberStatus::Member));

        let result = fx.handler.try_handle(&message(1, "/store")).await.unwrap();
        assert!(!result.success);
        assert!(fx.transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_owner_bypasses_oracle() {
        let fx = fixture(StubTransport {
            oracle_down: true,
            ..StubTransport::new()
        });

        let result = fx
            .handler
            .try_handle(&document(99, "/store"))
            .await
            .unwrap();
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_member_gets_a_file_and_renews_the_lease() {
        let fx = fixture(StubTransport::new().with_status(2, MemberStatus::Member));

        // A lease that lapsed an hour ago.
        let registry = LeaseRegistry::new(Arc::clone(&fx.store), Duration::hours(2));
        let lease = registry
            .store_file(
                1,
                format!("{ARCHIVE}:77"),
                77,
                Utc::now() - Duration::hours(3),
            )
            .await
            .unwrap();

        let text = format!("/get {}", lease.share_link);
        let result = fx.handler.try_handle(&message(2, &text)).await.unwrap();
        assert!(result.success);

        // Delivered from the archive, and renewed past now.
        let sent = fx.transport.sent.lock().unwrap().clone();
        assert_eq!(sent, vec![(2, format!("{ARCHIVE}:77"))]);
        let renewed = registry.resolve(&lease.share_link).await.unwrap();
        assert!(renewed.expires_at > Utc::now());
    }

    #[tokio::test]
    async fn test_deep_link_serves_like_get() {
        let fx = fixture(StubTransport::new().with_status(2, MemberStatus::Member));

        let registry = LeaseRegistry::new(Arc::clone(&fx.store), Duration::hours(2));
        let lease = registry
            .store_file(1, format!("{ARCHIVE}:77"), 77, Utc::now())
            .await
            .unwrap();

        let text = format!("/start get-{}", lease.share_link);
        let result = fx.handler.try_handle(&message(2, &text)).await.unwrap();
        assert!(result.success);
        assert_eq!(fx.transport.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_code_reports_not_found() {
        let fx = fixture(StubTransport::new().with_status(2, MemberStatus::Member));

        let result = fx
            .handler
            .try_handle(&message(2, "/get doesnotexist"))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.message.contains("No such link"));
    }

    #[tokio::test]
    async fn test_gone_archive_tombstones_the_lease() {
        let fx = fixture(StubTransport {
            file_gone: true,
            ..StubTransport::new().with_status(2, MemberStatus::Member)
        });

        let registry = LeaseRegistry::new(Arc::clone(&fx.store), Duration::hours(2));
        let lease = registry
            .store_file(1, format!("{ARCHIVE}:77"), 77, Utc::now())
            .await
            .unwrap();

        let text = format!("/get {}", lease.share_link);
        let result = fx.handler.try_handle(&message(2, &text)).await.unwrap();
        assert!(!result.success);

        // Later resolves report the lease gone.
        assert!(matches!(
            registry.resolve(&lease.share_link).await,
            Err(LeaseError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_transient_failure_keeps_the_lease() {
        let fx = fixture(StubTransport {
            send_broken: true,
            ..StubTransport::new().with_status(2, MemberStatus::Member)
        });

        let registry = LeaseRegistry::new(Arc::clone(&fx.store), Duration::hours(2));
        let lease = registry
            .store_file(1, format!("{ARCHIVE}:77"), 77, Utc::now())
            .await
            .unwrap();

        let text = format!("/get {}", lease.share_link);
        let result = fx.handler.try_handle(&message(2, &text)).await.unwrap();
        assert!(!result.success);
        assert!(result.message.contains("temporarily unavailable"));

        // The lease survives untouched for a retry.
        assert!(registry.resolve(&lease.share_link).await.is_ok());
    }

    #[tokio::test]
    async fn test_token_issue_and_redeem_flow() {
        let fx = fixture(StubTransport::new());

        let result = fx.handler.try_handle(&message(3, "/token")).await.unwrap();
        assert!(result.success);
        assert!(result.message.contains("https://t.me/filegate_bot?start="));

        // Redeem a token issued for this user, then pass the gate.
        let issuer = TokenIssuer::new(Arc::clone(&fx.store));
        let grant = issuer
            .issue(4, Duration::hours(24), Utc::now())
            .await
            .unwrap();

        let text = format!("/start {}", grant.token);
        let result = fx.handler.try_handle(&message(4, &text)).await.unwrap();
        assert!(result.success);
        assert!(result.message.contains("Access granted"));

        let status = fx.handler.try_handle(&message(4, "/status")).await.unwrap();
        assert!(status.success);
        assert!(status.message.contains("Token access"));
    }

    #[tokio::test]
    async fn test_bogus_token_is_rejected() {
        let fx = fixture(StubTransport::new());

        let result = fx
            .handler
            .try_handle(&message(3, "/start notatoken"))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.message.contains("Invalid or expired"));
    }

    #[tokio::test]
    async fn test_status_for_member() {
        let fx = fixture(StubTransport::new().with_status(1, MemberStatus::Member));

        let result = fx.handler.try_handle(&message(1, "/status")).await.unwrap();
        assert!(result.success);
        assert!(result.message.contains("Full access"));
    }
}
