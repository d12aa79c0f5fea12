//! The file lease registry.
//!
//! A lease records where an archived file lives (`file_ref`, the handle
//! the transport re-sends from), who submitted it, and how long it stays
//! directly servable. Serving a file past its expiry renews the lease as
//! long as the archived original still exists; once the origin is gone,
//! the lease is tombstoned — `file_ref` cleared, the row kept for audit.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::{distr::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::store::{LeaseStore, StoreError};
use crate::transport::MessageRef;

/// Number of alphanumeric characters in a share-link code.
const LINK_LEN: usize = 16;

/// A time-bounded record of an archived, shareable file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLease {
    /// Code a requester presents to retrieve the file.
    pub share_link: String,

    /// User who submitted the file.
    pub owner_id: i64,

    /// Refetchable reference to the archived copy; `None` once reclaimed.
    pub file_ref: Option<String>,

    /// Archive-channel message the file was stored under, kept for audit
    /// even after the lease is tombstoned.
    pub origin_ref: MessageRef,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,

    /// After this instant the lease needs renewal before the sweeper
    /// reclaims it.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
}

/// What the caller learned about the archived original while serving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginStatus {
    /// The archived copy was delivered.
    Available,

    /// Delivery failed transiently; the archive may still be intact.
    Unavailable,

    /// The archived copy no longer exists.
    Gone,
}

/// Lease registry errors.
#[derive(Debug, thiserror::Error)]
pub enum LeaseError {
    /// No live lease behind this link (absent or tombstoned).
    #[error("No such share link")]
    NotFound,

    /// The archived original could not be re-fetched; retryable.
    #[error("Archived file temporarily unavailable")]
    OriginUnavailable,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Creates, resolves and renews file leases.
pub struct LeaseRegistry<S> {
    store: Arc<S>,
    lease_duration: Duration,
}

impl<S: LeaseStore> LeaseRegistry<S> {
    /// Creates a registry issuing leases of the given duration.
    #[must_use]
    pub fn new(store: Arc<S>, lease_duration: Duration) -> Self {
        Self {
            store,
            lease_duration,
        }
    }

    /// Leases a freshly archived file and returns the new lease.
    ///
    /// The caller has already confirmed the owner's authorization and
    /// archived the file; this only records it.
    ///
    /// # Errors
    ///
    /// Returns an error if the lease cannot be persisted.
    pub async fn store_file(
        &self,
        owner_id: i64,
        file_ref: String,
        origin_ref: MessageRef,
        now: DateTime<Utc>,
    ) -> Result<FileLease, LeaseError> {
        let lease = FileLease {
            share_link: generate_link_code(),
            owner_id,
            file_ref: Some(file_ref),
            origin_ref,
            created_at: now,
            expires_at: now + self.lease_duration,
        };
        self.store.insert_lease(&lease).await?;

        info!(
            "Stored file for user {} as {} (expires {})",
            owner_id, lease.share_link, lease.expires_at
        );
        Ok(lease)
    }

    /// Looks up a live lease by its share link.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown links and for tombstoned leases alike.
    pub async fn resolve(&self, share_link: &str) -> Result<FileLease, LeaseError> {
        match self.store.find_lease(share_link).await? {
            Some(lease) if lease.file_ref.is_some() => Ok(lease),
            _ => Err(LeaseError::NotFound),
        }
    }

    /// Records the outcome of a serve attempt and re-arms expiry.
    ///
    /// On [`OriginStatus::Available`] the lease is renewed to
    /// `now + lease_duration` — a lapsed lease is treated as "needs
    /// refresh", not "gone". [`OriginStatus::Gone`] tombstones the lease
    /// so later resolves report it missing. [`OriginStatus::Unavailable`]
    /// changes nothing and surfaces a retryable error.
    ///
    /// # Errors
    ///
    /// `NotFound` when no live lease matches (including the just-now
    /// tombstoned case), `OriginUnavailable` on transient origin failure.
    pub async fn touch(
        &self,
        share_link: &str,
        origin: OriginStatus,
        now: DateTime<Utc>,
    ) -> Result<FileLease, LeaseError> {
        match origin {
            OriginStatus::Available => {
                let renewed = self
                    .store
                    .renew_lease(share_link, now + self.lease_duration)
                    .await?;
                match renewed {
                    Some(lease) => {
                        debug!("Renewed lease {} until {}", share_link, lease.expires_at);
                        Ok(lease)
                    }
                    None => Err(LeaseError::NotFound),
                }
            }
            OriginStatus::Unavailable => Err(LeaseError::OriginUnavailable),
            OriginStatus::Gone => {
                if self.store.tombstone_lease(share_link, None).await? {
                    info!("Tombstoned lease {}: origin is gone", share_link);
                }
                Err(LeaseError::NotFound)
            }
        }
    }
}

/// Generates a share-link code.
fn generate_link_code() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(LINK_LEN)
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

    fn registry() -> LeaseRegistry<MemoryStore> {
        LeaseRegistry::new(Arc::new(MemoryStore::new()), Duration::hours(2))
    }

    #[tokio::test]
    async fn test_store_then_resolve() {
        let registry = registry();
        let lease = registry
            .store_file(7, "-1001:10".to_owned(), 10, t0())
            .await
            .unwrap();

        assert_eq!(lease.expires_at, t0() + Duration::hours(2));

        let resolved = registry.resolve(&lease.share_link).await.unwrap();
        assert_eq!(resolved, lease);
    }

    #[tokio::test]
    async fn test_resolve_unknown_link() {
        let registry = registry();
        assert!(matches!(
            registry.resolve("nope").await,
            Err(LeaseError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_touch_renews_lapsed_lease() {
        let registry = registry();
        let lease = registry
            .store_file(7, "-1001:10".to_owned(), 10, t0())
            .await
            .unwrap();

        // Served an hour past expiry: renewed from the serve time.
        let t1 = t0() + Duration::hours(3);
        let renewed = registry
            .touch(&lease.share_link, OriginStatus::Available, t1)
            .await
            .unwrap();

        assert_eq!(renewed.expires_at, t1 + Duration::hours(2));
        assert!(renewed.expires_at > t1);
    }

    #[tokio::test]
    async fn test_touch_rearms_live_lease() {
        let registry = registry();
        let lease = registry
            .store_file(7, "-1001:10".to_owned(), 10, t0())
            .await
            .unwrap();

        let t1 = t0() + Duration::minutes(30);
        let renewed = registry
            .touch(&lease.share_link, OriginStatus::Available, t1)
            .await
            .unwrap();

        assert_eq!(renewed.expires_at, t1 + Duration::hours(2));
    }

    #[tokio::test]
    async fn test_touch_gone_tombstones() {
        let registry = registry();
        let lease = registry
            .store_file(7, "-1001:10".to_owned(), 10, t0())
            .await
            .unwrap();

        let result = registry
            .touch(&lease.share_link, OriginStatus::Gone, t0())
            .await;
        assert!(matches!(result, Err(LeaseError::NotFound)));

        // The row survives for audit, but resolve reports it missing.
        assert!(matches!(
            registry.resolve(&lease.share_link).await,
            Err(LeaseError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_touch_unavailable_preserves_state() {
        let registry = registry();
        let lease = registry
            .store_file(7, "-1001:10".to_owned(), 10, t0())
            .await
            .unwrap();

        let result = registry
            .touch(&lease.share_link, OriginStatus::Unavailable, t0())
            .await;
        assert!(matches!(result, Err(LeaseError::OriginUnavailable)));

        // Neither renewed nor tombstoned.
        let resolved = registry.resolve(&lease.share_link).await.unwrap();
        assert_eq!(resolved.expires_at, lease.expires_at);
    }

    #[test]
    fn test_link_code_shape() {
        let code = generate_link_code();
        assert_eq!(code.len(), LINK_LEN);
        assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
