//! Force-subscription check against the configured channel.

use std::sync::Arc;

use tracing::warn;

use crate::transport::Transport;

/// Read-only membership oracle.
///
/// One transport call per invocation, no retries. Every failure degrades
/// to "not exempt" so an unreachable membership service can never grant
/// access or hang a request.
pub struct SubscriptionOracle<T> {
    transport: Arc<T>,
    channel_id: i64,
}

impl<T: Transport> SubscriptionOracle<T> {
    /// Creates an oracle for the given channel.
    #[must_use]
    pub fn new(transport: Arc<T>, channel_id: i64) -> Self {
        Self {
            transport,
            channel_id,
        }
    }

    /// Whether `user_id` is exempt from token gating by channel membership.
    pub async fn is_exempt(&self, user_id: i64) -> bool {
        match self
            .transport
            .chat_member_status(self.channel_id, user_id)
            .await
        {
            Ok(status) => status.is_subscribed(),
            Err(e) => {
                warn!("Membership check failed for user {}: {}", user_id, e);
                false
            }
        }
    }
}
