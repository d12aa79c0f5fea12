//! MongoDB implementation of the store traits.
//!
//! Grants live in the `grants` collection, leases in `leases`. Expiry
//! timestamps persist as millisecond integers so the sweeper's range scan
//! and the conditional updates share the same comparable representation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::{IndexOptions, ReturnDocument};
use mongodb::{Client, Collection, IndexModel};
use tracing::info;

use crate::access::AccessGrant;
use crate::config::StoreConfig;
use crate::lease::FileLease;

use super::{GrantStore, LeaseStore, StoreError};

/// MongoDB-backed store.
pub struct MongoStore {
    grants: Collection<AccessGrant>,
    leases: Collection<FileLease>,
}

impl MongoStore {
    /// Connects to MongoDB and prepares collection indexes.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or index creation fails.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        info!("Connecting to MongoDB...");

        let client = Client::with_uri_str(&config.uri).await.map_err(store_err)?;
        let db = client.database(&config.database);

        let store = Self {
            grants: db.collection("grants"),
            leases: db.collection("leases"),
        };
        store.ensure_indexes().await?;

        info!("Connected to MongoDB (database: {})", config.database);
        Ok(store)
    }

    async fn ensure_indexes(&self) -> Result<(), StoreError> {
        let unique = |keys: Document| {
            IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().unique(true).build())
                .build()
        };

        self.grants
            .create_index(unique(doc! { "user_id": 1, "token": 1 }))
            .await
            .map_err(store_err)?;

        self.leases
            .create_index(unique(doc! { "share_link": 1 }))
            .await
            .map_err(store_err)?;

        // Range scans by the sweeper.
        self.leases
            .create_index(IndexModel::builder().keys(doc! { "expires_at": 1 }).build())
            .await
            .map_err(store_err)?;

        Ok(())
    }
}

#[async_trait]
impl GrantStore for MongoStore {
    async fn insert_grant(&self, grant: &AccessGrant) -> Result<(), StoreError> {
        self.grants.insert_one(grant).await.map_err(store_err)?;
        Ok(())
    }

    async fn find_grant(
        &self,
        user_id: i64,
        token: &str,
    ) -> Result<Option<AccessGrant>, StoreError> {
        self.grants
            .find_one(doc! { "user_id": user_id, "token": token })
            .await
            .map_err(store_err)
    }

    async fn delete_grant(&self, user_id: i64, token: &str) -> Result<bool, StoreError> {
        let result = self
            .grants
            .delete_one(doc! { "user_id": user_id, "token": token })
            .await
            .map_err(store_err)?;
        Ok(result.deleted_count > 0)
    }

    async fn find_active_grant(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<AccessGrant>, StoreError> {
        self.grants
            .find_one(doc! {
                "user_id": user_id,
                "expires_at": { "$gt": now.timestamp_millis() },
            })
            .await
            .map_err(store_err)
    }

    async fn purge_expired_grants(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = self
            .grants
            .delete_many(doc! {
                "user_id": user_id,
                "expires_at": { "$lte": now.timestamp_millis() },
            })
            .await
            .map_err(store_err)?;
        Ok(result.deleted_count)
    }
}

#[async_trait]
impl LeaseStore for MongoStore {
    async fn insert_lease(&self, lease: &FileLease) -> Result<(), StoreError> {
        self.leases.insert_one(lease).await.map_err(store_err)?;
        Ok(())
    }

    async fn find_lease(&self, share_link: &str) -> Result<Option<FileLease>, StoreError> {
        self.leases
            .find_one(doc! { "share_link": share_link })
            .await
            .map_err(store_err)
    }

    async fn renew_lease(
        &self,
        share_link: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<FileLease>, StoreError> {
        self.leases
            .find_one_and_update(
                doc! { "share_link": share_link, "file_ref": { "$ne": Bson::Null } },
                doc! { "$set": { "expires_at": expires_at.timestamp_millis() } },
            )
            .return_document(ReturnDocument::After)
            .await
            .map_err(store_err)
    }

    async fn tombstone_lease(
        &self,
        share_link: &str,
        expired_before: Option<DateTime<Utc>>,
    ) -> Result<bool, StoreError> {
        let mut filter = doc! { "share_link": share_link, "file_ref": { "$ne": Bson::Null } };
        if let Some(cutoff) = expired_before {
            filter.insert("expires_at", doc! { "$lt": cutoff.timestamp_millis() });
        }

        let result = self
            .leases
            .update_one(filter, doc! { "$set": { "file_ref": Bson::Null } })
            .await
            .map_err(store_err)?;
        Ok(result.modified_count > 0)
    }

    async fn leases_expired_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<FileLease>, StoreError> {
        let mut cursor = self
            .leases
            .find(doc! {
                "expires_at": { "$lt": cutoff.timestamp_millis() },
                "file_ref": { "$ne": Bson::Null },
            })
            .await
            .map_err(store_err)?;

        let mut expired = Vec::new();
        while let Some(lease) = cursor.try_next().await.map_err(store_err)? {
            expired.push(lease);
        }
        Ok(expired)
    }
}

fn store_err(err: mongodb::error::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}
