//! Time-bounded access grants and the token issuer/validator.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::{distr::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::store::{GrantStore, StoreError};

/// Number of alphanumeric characters in a generated token.
const TOKEN_LEN: usize = 32;

/// A per-user entitlement to bypass the subscription requirement.
///
/// A grant is active while `now < expires_at`; there is at most one
/// active grant per `(user_id, token)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrant {
    /// Telegram user the grant belongs to.
    pub user_id: i64,

    /// Opaque credential presented for redemption.
    pub token: String,

    /// Absolute expiry.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
}

impl AccessGrant {
    /// Whether the grant is still live at `now`.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Issues and validates access tokens against the grant store.
pub struct TokenIssuer<S> {
    store: Arc<S>,
}

impl<S> Clone for TokenIssuer<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: GrantStore> TokenIssuer<S> {
    /// Creates a new issuer over the given store.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Issues a fresh token for `user_id`, valid for `ttl` from `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the grant cannot be persisted.
    pub async fn issue(
        &self,
        user_id: i64,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<AccessGrant, StoreError> {
        let grant = AccessGrant {
            user_id,
            token: generate_token(),
            expires_at: now + ttl,
        };
        self.store.insert_grant(&grant).await?;

        debug!(
            "Issued token for user {} (expires {})",
            user_id, grant.expires_at
        );
        Ok(grant)
    }

    /// Checks whether `(user_id, token)` names a live grant.
    ///
    /// An expired grant found here is deleted on the spot, so a token
    /// that has lapsed once stays invalid forever.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn validate(
        &self,
        user_id: i64,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        match self.store.find_grant(user_id, token).await? {
            Some(grant) if grant.is_active(now) => Ok(true),
            Some(_) => {
                self.store.delete_grant(user_id, token).await?;
                debug!("Removed expired grant for user {}", user_id);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    /// Finds any live grant for `user_id`, purging its expired ones.
    ///
    /// Gated actions after redemption don't carry a token, so they are
    /// checked against the user's grants as a whole.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn active_grant(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<AccessGrant>, StoreError> {
        let purged = self.store.purge_expired_grants(user_id, now).await?;
        if purged > 0 {
            debug!("Purged {} expired grants for user {}", purged, user_id);
        }
        self.store.find_active_grant(user_id, now).await
    }
}

/// Generates a credential unique enough to avoid collision within any
/// realistic TTL window.
fn generate_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn issuer() -> TokenIssuer<MemoryStore> {
        TokenIssuer::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_token_shape() {
        let token = generate_token();
        assert_eq!(token.len(), TOKEN_LEN);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(token, generate_token());
    }

    #[tokio::test]
    async fn test_issue_then_validate() {
        let issuer = issuer();
        let grant = issuer.issue(42, Duration::hours(24), t0()).await.unwrap();

        assert!(issuer.validate(42, &grant.token, t0()).await.unwrap());
        assert!(issuer
            .validate(42, &grant.token, t0() + Duration::hours(1))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_expired_grant_never_resurrects() {
        let issuer = issuer();
        let grant = issuer.issue(42, Duration::hours(24), t0()).await.unwrap();

        // Past the 24h TTL the token is rejected and the grant removed.
        let later = t0() + Duration::hours(25);
        assert!(!issuer.validate(42, &grant.token, later).await.unwrap());
        assert!(issuer.active_grant(42, later).await.unwrap().is_none());

        // Even asking again at an earlier timestamp finds nothing.
        assert!(!issuer.validate(42, &grant.token, t0()).await.unwrap());
    }

    #[tokio::test]
    async fn test_validate_rejects_wrong_user() {
        let issuer = issuer();
        let grant = issuer.issue(42, Duration::hours(24), t0()).await.unwrap();

        assert!(!issuer.validate(43, &grant.token, t0()).await.unwrap());
    }

    #[tokio::test]
    async fn test_active_grant_after_redemption() {
        let issuer = issuer();
        issuer.issue(42, Duration::hours(24), t0()).await.unwrap();

        let active = issuer
            .active_grant(42, t0() + Duration::hours(23))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(active.expires_at, t0() + Duration::hours(24));
    }
}
