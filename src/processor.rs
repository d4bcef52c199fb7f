//! Turns decoded bridge events into relayer actions.
//!
//! Source-side events (Locked, Burned) become pending transfers and kick off
//! the rebuild-publish-relay sequence. Destination-side events (Released,
//! Unlocked) only confirm completion in the status map.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::hash::compute_transfer_id;
use crate::metrics;
use crate::relayer::Relayer;
use crate::types::{BridgeEvent, TransferKind, TransferRecord, TransferStatus};

pub struct EventProcessor {
    relayer: Arc<Relayer>,
}

impl EventProcessor {
    pub fn new(relayer: Arc<Relayer>) -> Self {
        Self { relayer }
    }

    /// Drain watcher events until the channel closes or shutdown is signaled.
    pub async fn run(
        &self,
        mut events: mpsc::UnboundedReceiver<(String, BridgeEvent)>,
        mut shutdown: mpsc::Receiver<()>,
    ) {
        info!("Event processor started");
        loop {
            tokio::select! {
                maybe_event = events.recv() => {
                    match maybe_event {
                        Some((chain, event)) => self.process(&chain, event).await,
                        None => {
                            info!("Event channel closed; event processor stopping");
                            break;
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Event processor received shutdown signal");
                    break;
                }
            }
        }
    }

    /// Handle one event from `chain`. Failures are logged and absorbed; a
    /// transfer whose first relay fails stays pending for the retry sweep,
    /// so the watcher loop must never be torn down over one bad attempt.
    pub async fn process(&self, chain: &str, event: BridgeEvent) {
        metrics::record_event_detected(chain, event.name());
        debug!(
            chain = %chain,
            event = event.name(),
            block = event.block_number(),
            "Processing bridge event"
        );

        match event {
            BridgeEvent::Locked {
                user,
                amount,
                nonce,
                ..
            } => {
                self.submit(chain, user, amount, nonce, TransferKind::Lock).await;
            }
            BridgeEvent::Burned {
                user,
                amount,
                nonce,
                ..
            } => {
                self.submit(chain, user, amount, nonce, TransferKind::Burn).await;
            }
            BridgeEvent::Released { transfer_id, .. }
            | BridgeEvent::Unlocked { transfer_id, .. } => {
                // Destination-side confirmation. Normally the relayer already
                // marked the transfer completed when its own transaction was
                // mined; this also covers roots consumed by someone else.
                match self.relayer.get_transfer_status(&transfer_id).await {
                    Some(TransferStatus::Completed) => {}
                    _ => {
                        info!(
                            chain = %chain,
                            transfer_id = %transfer_id,
                            "Destination event confirms transfer completion"
                        );
                        self.relayer.mark_completed(transfer_id).await;
                    }
                }
            }
        }
    }

    async fn submit(
        &self,
        source: &str,
        user: alloy::primitives::Address,
        amount: alloy::primitives::U256,
        nonce: u64,
        kind: TransferKind,
    ) {
        let Some(target) = self
            .relayer
            .config()
            .paired_chain(source)
            .map(|c| c.name.clone())
        else {
            warn!(chain = %source, "Event from chain with no configured pair; dropping");
            return;
        };

        let record = TransferRecord {
            transfer_id: compute_transfer_id(&user, &amount, nonce),
            user,
            amount,
            source_chain: source.to_string(),
            target_chain: target,
            nonce,
            kind,
            created_at: Utc::now(),
            last_attempt: None,
        };

        if let Err(e) = self.relayer.submit_transfer(record).await {
            // Already logged with classification by the worker; the transfer
            // is still pending and the retry sweep will pick it up.
            debug!(chain = %source, error = %e, "Initial relay attempt did not complete");
        }
    }
}
