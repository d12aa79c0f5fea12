//! In-memory implementation of the store traits.
//!
//! Primarily for tests. Same semantics as the MongoDB backend, with all
//! data lost on drop. Thread-safe via `RwLock`.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::access::AccessGrant;
use crate::lease::FileLease;

use super::{GrantStore, LeaseStore, StoreError};

/// In-memory store implementation.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Grants indexed by `(user_id, token)`.
    grants: HashMap<(i64, String), AccessGrant>,

    /// Leases indexed by share link.
    leases: HashMap<String, FileLease>,
}

impl MemoryStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[allow(clippy::unwrap_used)]
#[async_trait]
impl GrantStore for MemoryStore {
    async fn insert_grant(&self, grant: &AccessGrant) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        inner
            .grants
            .insert((grant.user_id, grant.token.clone()), grant.clone());
        Ok(())
    }

    async fn find_grant(
        &self,
        user_id: i64,
        token: &str,
    ) -> Result<Option<AccessGrant>, StoreError> {
        let inner = self.inner.read().unwrap();
        Ok(inner.grants.get(&(user_id, token.to_owned())).cloned())
    }

    async fn delete_grant(&self, user_id: i64, token: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().unwrap();
        Ok(inner.grants.remove(&(user_id, token.to_owned())).is_some())
    }

    async fn find_active_grant(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<AccessGrant>, StoreError> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .grants
            .values()
            .find(|g| g.user_id == user_id && now < g.expires_at)
            .cloned())
    }

    async fn purge_expired_grants(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().unwrap();
        let before = inner.grants.len();
        inner
            .grants
            .retain(|(uid, _), g| *uid != user_id || now < g.expires_at);
        Ok((before - inner.grants.len()) as u64)
    }
}

#[allow(clippy::unwrap_used)]
#[async_trait]
impl LeaseStore for MemoryStore {
    async fn insert_lease(&self, lease: &FileLease) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        inner.leases.insert(lease.share_link.clone(), lease.clone());
        Ok(())
    }

    async fn find_lease(&self, share_link: &str) -> Result<Option<FileLease>, StoreError> {
        let inner = self.inner.read().unwrap();
        Ok(inner.leases.get(share_link).cloned())
    }

    async fn renew_lease(
        &self,
        share_link: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<FileLease>, StoreError> {
        let mut inner = self.inner.write().unwrap();
        match inner.leases.get_mut(share_link) {
            Some(lease) if lease.file_ref.is_some() => {
                lease.expires_at = expires_at;
                Ok(Some(lease.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn tombstone_lease(
        &self,
        share_link: &str,
        expired_before: Option<DateTime<Utc>>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().unwrap();
        match inner.leases.get_mut(share_link) {
            Some(lease) if lease.file_ref.is_some() => {
                if let Some(cutoff) = expired_before
                    && lease.expires_at >= cutoff
                {
                    return Ok(false);
                }
                lease.file_ref = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn leases_expired_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<FileLease>, StoreError> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .leases
            .values()
            .filter(|l| l.file_ref.is_some() && l.expires_at < cutoff)
            .cloned()
            .collect())
    }
}
