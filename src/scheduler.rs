//! Periodic retry and cleanup sweeps.
//!
//! Both schedulers are thin interval loops; the actual work runs on the
//! per-direction workers, so a sweep can never interleave with an insert for
//! the same target chain.

use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::relayer::Relayer;

/// Re-relays pending transfers whose last attempt has gone stale.
pub struct RetryScheduler {
    relayer: Arc<Relayer>,
    interval: Duration,
    threshold: ChronoDuration,
}

impl RetryScheduler {
    pub fn new(relayer: Arc<Relayer>) -> Self {
        let cfg = &relayer.config().relayer;
        let interval = Duration::from_secs(cfg.retry_interval_secs);
        let threshold = ChronoDuration::seconds(cfg.retry_threshold_secs as i64);
        Self {
            relayer,
            interval,
            threshold,
        }
    }

    pub async fn run(self, mut shutdown: mpsc::Receiver<()>) {
        info!(
            interval_secs = self.interval.as_secs(),
            threshold_secs = self.threshold.num_seconds(),
            "Retry scheduler started"
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await; // first tick fires immediately

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    for source in self.relayer.source_chains() {
                        match self.relayer.retry_sweep(&source, self.threshold).await {
                            Ok(0) => {}
                            Ok(count) => {
                                info!(source = %source, count, "Retry sweep relayed stale transfers");
                            }
                            Err(e) => {
                                warn!(source = %source, error = %e, "Retry sweep failed");
                            }
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Retry scheduler received shutdown signal");
                    break;
                }
            }
        }
    }
}

/// Expires pending transfers that have outlived the cleanup threshold.
pub struct CleanupScheduler {
    relayer: Arc<Relayer>,
    interval: Duration,
    threshold: ChronoDuration,
}

impl CleanupScheduler {
    pub fn new(relayer: Arc<Relayer>) -> Self {
        let cfg = &relayer.config().relayer;
        let interval = Duration::from_secs(cfg.cleanup_interval_secs);
        let threshold = ChronoDuration::seconds(cfg.cleanup_threshold_secs as i64);
        Self {
            relayer,
            interval,
            threshold,
        }
    }

    pub async fn run(self, mut shutdown: mpsc::Receiver<()>) {
        info!(
            interval_secs = self.interval.as_secs(),
            threshold_secs = self.threshold.num_seconds(),
            "Cleanup scheduler started"
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    for source in self.relayer.source_chains() {
                        match self.relayer.cleanup_sweep(&source, self.threshold).await {
                            Ok(0) => {}
                            Ok(count) => {
                                info!(source = %source, count, "Cleanup sweep expired transfers");
                            }
                            Err(e) => {
                                warn!(source = %source, error = %e, "Cleanup sweep failed");
                            }
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Cleanup scheduler received shutdown signal");
                    break;
                }
            }
        }
    }
}
