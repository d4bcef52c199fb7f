use eyre::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::checkpoint::CheckpointStore;
use crate::client::BridgeClient;
use crate::metrics;
use crate::types::BridgeEvent;

/// Polls one chain's bridge contract for events past the finality margin and
/// forwards them to the event processor.
pub struct EvmWatcher {
    chain_name: String,
    client: Arc<dyn BridgeClient>,
    checkpoints: Arc<dyn CheckpointStore>,
    finality_blocks: u64,
    poll_interval: Duration,
    error_backoff: Duration,
    events_tx: mpsc::UnboundedSender<(String, BridgeEvent)>,
}

impl EvmWatcher {
    pub fn new(
        chain_name: &str,
        client: Arc<dyn BridgeClient>,
        checkpoints: Arc<dyn CheckpointStore>,
        finality_blocks: u64,
        poll_interval: Duration,
        error_backoff: Duration,
        events_tx: mpsc::UnboundedSender<(String, BridgeEvent)>,
    ) -> Self {
        Self {
            chain_name: chain_name.to_string(),
            client,
            checkpoints,
            finality_blocks,
            poll_interval,
            error_backoff,
            events_tx,
        }
    }

    pub fn chain_name(&self) -> &str {
        &self.chain_name
    }

    /// Run the poll loop. RPC errors are logged and absorbed with a backoff
    /// sleep; the loop only returns when the event channel closes.
    pub async fn run(self) -> Result<()> {
        info!(
            chain = %self.chain_name,
            finality_blocks = self.finality_blocks,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Watcher started"
        );

        loop {
            match self.poll_once().await {
                Ok(forwarded) => {
                    if !forwarded {
                        // Channel closed means the processor is gone.
                        return Err(eyre::eyre!(
                            "event channel closed for chain '{}'",
                            self.chain_name
                        ));
                    }
                    metrics::record_successful_poll(&self.chain_name);
                    tokio::time::sleep(self.poll_interval).await;
                }
                Err(e) => {
                    error!(
                        chain = %self.chain_name,
                        error = %e,
                        "Watcher poll failed; backing off"
                    );
                    metrics::record_error(&self.chain_name, "poll");
                    tokio::time::sleep(self.error_backoff).await;
                }
            }
        }
    }

    /// One poll: fetch events from checkpoint+1 through height-finality,
    /// forward them in order, then advance the checkpoint. Returns false if
    /// the event channel has closed.
    async fn poll_once(&self) -> Result<bool> {
        let last_block = self.checkpoints.last_block(&self.chain_name).await?;
        let height = self.client.block_number().await?;

        let confirmed = height.saturating_sub(self.finality_blocks);
        if confirmed <= last_block {
            return Ok(true);
        }

        let from_block = last_block + 1;
        debug!(
            chain = %self.chain_name,
            from_block,
            to_block = confirmed,
            "Scanning block range"
        );

        let events = self.client.bridge_events(from_block, confirmed).await?;
        for event in events {
            info!(
                chain = %self.chain_name,
                event = event.name(),
                block = event.block_number(),
                "Bridge event detected"
            );
            if self
                .events_tx
                .send((self.chain_name.clone(), event))
                .is_err()
            {
                return Ok(false);
            }
        }

        metrics::record_block_processed(&self.chain_name, confirmed);

        // Checkpoint write failure is not fatal; the worst case is a
        // re-scan of the same range, which the replay guard absorbs.
        if let Err(e) = self.checkpoints.save(&self.chain_name, confirmed).await {
            error!(
                chain = %self.chain_name,
                block = confirmed,
                error = %e,
                "Failed to persist checkpoint"
            );
            metrics::record_error(&self.chain_name, "checkpoint");
        }

        Ok(true)
    }
}
