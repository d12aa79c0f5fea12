//! Rate limiter for outgoing file deliveries.
//!
//! Enforces a minimum interval between sends and pushes the window out
//! further when Telegram answers with a flood wait.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;

/// Rate limiter that spaces out operations.
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum duration between allowed operations.
    min_interval: Duration,

    /// Earliest instant the next operation may run.
    next_allowed: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Creates a new rate limiter with the specified minimum interval.
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_allowed: Mutex::new(None),
        }
    }

    /// Creates a rate limiter from seconds.
    #[must_use]
    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    /// Waits until an operation is allowed, then claims the next slot.
    ///
    /// Returns the duration waited (zero if no wait was needed).
    pub async fn wait_and_acquire(&self) -> Duration {
        let mut next = self.next_allowed.lock().await;

        let now = Instant::now();
        let wait_duration = match *next {
            Some(at) if at > now => at - now,
            _ => Duration::ZERO,
        };

        if !wait_duration.is_zero() {
            debug!("Rate limiter: waiting {:?} before next send", wait_duration);
            tokio::time::sleep(wait_duration).await;
        }

        *next = Some(Instant::now() + self.min_interval);
        wait_duration
    }

    /// Checks if an operation is currently allowed without blocking.
    pub async fn is_allowed(&self) -> bool {
        let next = self.next_allowed.lock().await;
        match *next {
            Some(at) => at <= Instant::now(),
            None => true,
        }
    }

    /// Records a flood wait reported by Telegram, delaying subsequent
    /// operations without blocking the caller.
    pub async fn note_flood_wait(&self, wait_seconds: u32) {
        let mut next = self.next_allowed.lock().await;
        let until = Instant::now() + Duration::from_secs(u64::from(wait_seconds));
        if next.is_none_or(|at| at < until) {
            *next = Some(until);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_operation_is_free() {
        let limiter = RateLimiter::from_secs(1);
        assert!(limiter.is_allowed().await);

        let waited = limiter.wait_and_acquire().await;
        assert_eq!(waited, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_subsequent_operation_is_spaced() {
        let limiter = RateLimiter::new(Duration::from_millis(100));

        limiter.wait_and_acquire().await;
        assert!(!limiter.is_allowed().await);
    }

    #[tokio::test]
    async fn test_flood_wait_pushes_window_out() {
        let limiter = RateLimiter::new(Duration::from_millis(1));

        limiter.note_flood_wait(60).await;
        assert!(!limiter.is_allowed().await);
    }

    #[tokio::test]
    async fn test_flood_wait_never_shortens_window() {
        let limiter = RateLimiter::new(Duration::from_secs(120));

        limiter.wait_and_acquire().await;
        limiter.note_flood_wait(1).await;

        // Still held by the longer of the two deadlines.
        assert!(!limiter.is_allowed().await);
    }
}
