use eyre::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::checkpoint::CheckpointStore;
use crate::relayer::Relayer;
use crate::types::BridgeEvent;

pub mod evm;

pub use evm::EvmWatcher;

/// Manages one watcher per configured chain
pub struct WatcherManager {
    watchers: Vec<EvmWatcher>,
}

impl WatcherManager {
    /// Create a watcher for every configured chain, sharing the checkpoint
    /// store and the event channel.
    pub fn new(
        relayer: &Relayer,
        checkpoints: Arc<dyn CheckpointStore>,
        events_tx: mpsc::UnboundedSender<(String, BridgeEvent)>,
    ) -> Result<Self> {
        let config = relayer.config();
        let poll_interval = Duration::from_millis(config.relayer.poll_interval_ms);
        let error_backoff = Duration::from_millis(config.relayer.error_backoff_ms);

        let mut watchers = Vec::new();
        for chain in &config.chains {
            let client = relayer
                .client(&chain.name)
                .ok_or_else(|| eyre::eyre!("no client for chain '{}'", chain.name))?;
            watchers.push(EvmWatcher::new(
                &chain.name,
                client,
                checkpoints.clone(),
                chain.finality_blocks,
                poll_interval,
                error_backoff,
                events_tx.clone(),
            ));
        }

        info!(watchers = watchers.len(), "Watcher manager created");
        Ok(Self { watchers })
    }

    /// Run all watchers concurrently
    /// Returns when any watcher fails or shutdown signal received
    pub async fn run(self, mut shutdown: mpsc::Receiver<()>) -> Result<()> {
        let mut join_set = tokio::task::JoinSet::new();

        for watcher in self.watchers {
            join_set.spawn(async move { watcher.run().await });
        }

        tokio::select! {
            _ = shutdown.recv() => {
                info!("Shutdown signal received, stopping watchers");
                join_set.abort_all();
                Ok(())
            }
            maybe_done = join_set.join_next() => {
                match maybe_done {
                    Some(Ok(Ok(()))) => {
                        error!("A watcher exited unexpectedly without error");
                        Err(eyre::eyre!("watcher exited unexpectedly"))
                    }
                    Some(Ok(Err(e))) => {
                        error!("A watcher stopped with error: {:?}", e);
                        Err(e)
                    }
                    Some(Err(e)) => {
                        error!("A watcher task panicked: {:?}", e);
                        Err(eyre::eyre!("watcher task panicked: {}", e))
                    }
                    None => {
                        error!("All watcher tasks exited unexpectedly");
                        Err(eyre::eyre!("all watcher tasks exited unexpectedly"))
                    }
                }
            }
        }
    }
}
