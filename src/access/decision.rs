//! Per-request authorization.
//!
//! Every gated action computes exactly one [`AuthorizationDecision`] and
//! threads it through the rest of the request, instead of re-checking
//! subscription or token state at each step.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::store::{GrantStore, StoreError};
use crate::transport::Transport;

use super::{SubscriptionOracle, TokenIssuer};

/// The outcome of gating a user action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationDecision {
    /// Owner or channel member; no token needed.
    Exempt,

    /// Covered by a live access grant until the given time.
    TokenGranted(DateTime<Utc>),

    /// Neither exempt nor holding a live grant.
    Denied,
}

impl AuthorizationDecision {
    /// Whether the action may proceed.
    #[must_use]
    pub fn is_allowed(self) -> bool {
        !matches!(self, Self::Denied)
    }
}

/// Computes authorization decisions: owners first, then the membership
/// oracle, then the grant store.
pub struct Gatekeeper<S, T> {
    oracle: SubscriptionOracle<T>,
    issuer: TokenIssuer<S>,
    owner_ids: HashSet<i64>,
}

impl<S: GrantStore, T: Transport> Gatekeeper<S, T> {
    /// Creates a gatekeeper.
    #[must_use]
    pub fn new(store: Arc<S>, transport: Arc<T>, channel_id: i64, owner_ids: HashSet<i64>) -> Self {
        Self {
            oracle: SubscriptionOracle::new(transport, channel_id),
            issuer: TokenIssuer::new(store),
            owner_ids,
        }
    }

    /// Gates a user action at `now`.
    ///
    /// # Errors
    ///
    /// Returns an error only when the grant store is unavailable; oracle
    /// failures degrade to the token path.
    pub async fn authorize(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<AuthorizationDecision, StoreError> {
        if self.owner_ids.contains(&user_id) {
            return Ok(AuthorizationDecision::Exempt);
        }

        if self.oracle.is_exempt(user_id).await {
            return Ok(AuthorizationDecision::Exempt);
        }

        match self.issuer.active_grant(user_id, now).await? {
            Some(grant) => Ok(AuthorizationDecision::TokenGranted(grant.expires_at)),
            None => Ok(AuthorizationDecision::Denied),
        }
    }

    /// The token issuer backing this gatekeeper.
    #[must_use]
    pub fn issuer(&self) -> &TokenIssuer<S> {
        &self.issuer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::transport::testing::StubTransport;
    use crate::transport::MemberStatus;
    use chrono::Duration;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn gatekeeper(transport: StubTransport, owners: &[i64]) -> Gatekeeper<MemoryStore, StubTransport> {
        Gatekeeper::new(
            Arc::new(MemoryStore::new()),
            Arc::new(transport),
            -1002,
            owners.iter().copied().collect(),
        )
    }

    #[tokio::test]
    async fn test_owner_is_exempt_without_oracle() {
        let transport = StubTransport {
            oracle_down: true,
            ..StubTransport::new()
        };
        let keeper = gatekeeper(transport, &[7]);

        assert_eq!(
            keeper.authorize(7, t0()).await.unwrap(),
            AuthorizationDecision::Exempt
        );
    }

    #[tokio::test]
    async fn test_member_is_exempt() {
        let keeper = gatekeeper(StubTransport::new().with_status(42, MemberStatus::Member), &[]);

        assert_eq!(
            keeper.authorize(42, t0()).await.unwrap(),
            AuthorizationDecision::Exempt
        );
    }

    #[tokio::test]
    async fn test_token_holder_is_granted() {
        let keeper = gatekeeper(StubTransport::new(), &[]);
        let grant = keeper
            .issuer()
            .issue(42, Duration::hours(24), t0())
            .await
            .unwrap();

        assert_eq!(
            keeper.authorize(42, t0() + Duration::hours(1)).await.unwrap(),
            AuthorizationDecision::TokenGranted(grant.expires_at)
        );
    }

    #[tokio::test]
    async fn test_stranger_is_denied() {
        let keeper = gatekeeper(StubTransport::new(), &[]);

        let decision = keeper.authorize(42, t0()).await.unwrap();
        assert_eq!(decision, AuthorizationDecision::Denied);
        assert!(!decision.is_allowed());
    }

    #[tokio::test]
    async fn test_expired_token_is_denied() {
        let keeper = gatekeeper(StubTransport::new(), &[]);
        keeper
            .issuer()
            .issue(42, Duration::hours(24), t0())
            .await
            .unwrap();

        let decision = keeper
            .authorize(42, t0() + Duration::hours(25))
            .await
            .unwrap();
        assert_eq!(decision, AuthorizationDecision::Denied);
    }
}
