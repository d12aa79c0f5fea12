//! Persistence for grants and leases.
//!
//! The gate logic is storage-agnostic: it talks to the [`GrantStore`] and
//! [`LeaseStore`] traits. The MongoDB backend is the production store; the
//! in-memory backend mirrors its semantics for tests.
//!
//! Both traits expose *conditional* mutations (renew, tombstone) so that
//! concurrent writers converge without locks: every update is a single
//! find-and-update keyed by the entity's unique key, with the predicate
//! re-stated in the filter.

mod memory;
mod mongo;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::access::AccessGrant;
use crate::lease::FileLease;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// Store errors.
///
/// Store failures are fatal to the triggering request and propagate up;
/// they are never retried at this layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence for per-user access grants.
#[async_trait]
pub trait GrantStore: Send + Sync {
    /// Persists a new grant.
    async fn insert_grant(&self, grant: &AccessGrant) -> Result<(), StoreError>;

    /// Looks up a grant by its `(user_id, token)` key.
    async fn find_grant(
        &self,
        user_id: i64,
        token: &str,
    ) -> Result<Option<AccessGrant>, StoreError>;

    /// Deletes a grant. Returns whether a grant existed.
    async fn delete_grant(&self, user_id: i64, token: &str) -> Result<bool, StoreError>;

    /// Finds any grant of `user_id` that is still live at `now`.
    async fn find_active_grant(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<AccessGrant>, StoreError>;

    /// Deletes all grants of `user_id` that have expired by `now`.
    ///
    /// Returns the number of grants removed.
    async fn purge_expired_grants(&self, user_id: i64, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// Persistence for file leases.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Persists a new lease.
    async fn insert_lease(&self, lease: &FileLease) -> Result<(), StoreError>;

    /// Looks up a lease by share link, tombstoned or not.
    async fn find_lease(&self, share_link: &str) -> Result<Option<FileLease>, StoreError>;

    /// Extends the expiry of a live (non-tombstoned) lease.
    ///
    /// Returns the updated lease, or `None` when no live lease matches the
    /// link — the caller cannot distinguish "absent" from "tombstoned",
    /// and must not need to.
    async fn renew_lease(
        &self,
        share_link: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<FileLease>, StoreError>;

    /// Clears the lease's `file_ref`, keeping the row for audit.
    ///
    /// With `expired_before` set, the write only applies while
    /// `expires_at` is still below the cutoff — a concurrent renewal makes
    /// this a no-op. Returns whether a row was changed.
    async fn tombstone_lease(
        &self,
        share_link: &str,
        expired_before: Option<DateTime<Utc>>,
    ) -> Result<bool, StoreError>;

    /// Live leases whose expiry lies before `cutoff`.
    async fn leases_expired_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<FileLease>, StoreError>;
}
