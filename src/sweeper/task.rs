//! The sweep pass itself.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::store::{LeaseStore, StoreError};
use crate::transport::Transport;

/// Reclaims leases that lapsed longer than the grace period ago.
///
/// The sweeper holds no timer state: each pass is a function of `now`
/// and the store's contents, so running it twice back to back reclaims
/// nothing the second time.
pub struct Sweeper<S, T> {
    store: Arc<S>,
    transport: Arc<T>,

    /// Channel holding the archived copies.
    archive_channel_id: i64,

    /// How long past expiry a lease stays renewable before reclaim.
    grace: Duration,
}

impl<S: LeaseStore, T: Transport> Sweeper<S, T> {
    /// Creates a sweeper.
    #[must_use]
    pub fn new(store: Arc<S>, transport: Arc<T>, archive_channel_id: i64, grace: Duration) -> Self {
        Self {
            store,
            transport,
            archive_channel_id,
            grace,
        }
    }

    /// Runs one sweep pass at `now` and returns the number of leases
    /// reclaimed.
    ///
    /// Per-lease failures (archive deletion, tombstone write) are logged
    /// and skipped; they never abort the rest of the batch. The tombstone
    /// write re-states the expiry predicate, so a lease renewed between
    /// scan and write is left alone.
    ///
    /// # Errors
    ///
    /// Returns an error only when the initial scan fails.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let cutoff = now - self.grace;
        let expired = self.store.leases_expired_before(cutoff).await?;

        if expired.is_empty() {
            debug!("Sweep found no reclaimable leases");
            return Ok(0);
        }

        debug!("Sweep found {} reclaimable leases", expired.len());

        let mut reclaimed = 0;
        for lease in expired {
            // Best-effort release; the tombstone below re-checks expiry.
            if let Err(e) = self
                .transport
                .delete_message(self.archive_channel_id, lease.origin_ref)
                .await
            {
                warn!(
                    "Could not release archived copy for {}: {}",
                    lease.share_link, e
                );
            }

            match self
                .store
                .tombstone_lease(&lease.share_link, Some(cutoff))
                .await
            {
                Ok(true) => {
                    debug!("Reclaimed lease {}", lease.share_link);
                    reclaimed += 1;
                }
                Ok(false) => {
                    debug!("Lease {} renewed mid-sweep, skipping", lease.share_link);
                }
                Err(e) => {
                    warn!("Could not tombstone lease {}: {}", lease.share_link, e);
                }
            }
        }

        Ok(reclaimed)
    }
}
