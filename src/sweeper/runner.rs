//! Sweeper runner.
//!
//! Drives [`Sweeper::sweep`] on a fixed interval. The runner owns only
//! the timer; all state lives in the store, so a missed or extra tick is
//! harmless.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, error, info};

use crate::store::LeaseStore;
use crate::sweeper::Sweeper;
use crate::transport::Transport;

/// Messages that can be sent to the sweeper runner.
#[derive(Debug, Clone)]
pub enum SweeperMessage {
    /// Trigger an immediate sweep.
    TriggerSweep,
    /// Stop the runner.
    Shutdown,
}

/// Periodic sweep loop.
pub struct SweeperRunner<S, T> {
    sweeper: Sweeper<S, T>,
    sweep_interval: Duration,
}

impl<S: LeaseStore, T: Transport> SweeperRunner<S, T> {
    /// Creates a runner sweeping at the given interval.
    #[must_use]
    pub fn new(sweeper: Sweeper<S, T>, sweep_interval: Duration) -> Self {
        Self {
            sweeper,
            sweep_interval,
        }
    }

    /// Runs the sweep loop until shutdown.
    pub async fn run(&self, mut rx: mpsc::Receiver<SweeperMessage>) {
        info!(
            "Sweeper started (interval: {}s)",
            self.sweep_interval.as_secs()
        );

        let mut timer = interval(self.sweep_interval);
        // The first tick fires immediately; that initial sweep catches
        // leases that lapsed while the process was down.

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    self.tick().await;
                }
                msg = rx.recv() => {
                    match msg {
                        Some(SweeperMessage::TriggerSweep) => {
                            debug!("Received trigger sweep message");
                            self.tick().await;
                        }
                        Some(SweeperMessage::Shutdown) | None => {
                            info!("Sweeper shutting down");
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Single sweep pass.
    async fn tick(&self) {
        match self.sweeper.sweep(Utc::now()).await {
            Ok(0) => {}
            Ok(count) => info!("Sweep reclaimed {} leases", count),
            Err(e) => error!("Sweep failed: {}", e),
        }
    }
}
