//! Relayer context: shared state ownership and job serialization
//!
//! All mutable shared state lives here, owned per direction (source chain ->
//! paired target chain): the pending transfer store, the current Merkle tree
//! and the status map. Each direction has exactly one worker task draining a
//! job queue, so insert-rebuild-relay sequences, retry sweeps and cleanup
//! sweeps are never interleaved for the same target chain and a proof is
//! never built against a tree that no longer matches the map.

use alloy::primitives::{Address, U256};
use chrono::{Duration as ChronoDuration, Utc};
use eyre::Result;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::aggregator::MerkleAggregator;
use crate::client::{BridgeClient, EvmBridgeClient};
use crate::config::{Config, ExpiredPolicy};
use crate::hash::compute_transfer_id;
use crate::merkle::MerkleTree;
use crate::metrics;
use crate::pending::PendingTransferStore;
use crate::relay::{classify_error, ProofRelay};
use crate::types::{TransferId, TransferKind, TransferRecord, TransferStatus};

/// Errors surfaced synchronously to callers of the queue/status API.
#[derive(Debug, Error)]
pub enum RelayerError {
    #[error("unknown chain '{0}'")]
    UnknownChain(String),
    #[error("'{source_chain}' -> '{target}' is not a configured bridge route")]
    InvalidRoute { source_chain: String, target: String },
    #[error("failed to publish Merkle root: {0}")]
    Publish(String),
    #[error("relay failed: {0}")]
    Relay(String),
    #[error("relayer is shutting down")]
    Shutdown,
}

/// Caller-supplied transfer data for the synchronous enqueue path.
#[derive(Debug, Clone)]
pub struct TransferInput {
    pub user: Address,
    pub amount: U256,
    pub nonce: u64,
    pub kind: TransferKind,
}

/// Result of a synchronous enqueue.
#[derive(Debug, Clone)]
pub struct QueueReceipt {
    pub transfer_id: TransferId,
    pub status: TransferStatus,
}

/// Per-direction status snapshot for the HTTP API.
#[derive(Debug, Clone, Serialize)]
pub struct DirectionStatus {
    pub source: String,
    pub target: String,
    pub pending: usize,
    pub root: String,
}

/// Pending map and tree for one direction, mutated as one unit.
#[derive(Default)]
struct DirectionState {
    pending: PendingTransferStore,
    tree: MerkleTree,
}

enum Job {
    Insert {
        record: TransferRecord,
        done: oneshot::Sender<Result<TransferStatus, RelayerError>>,
    },
    Retry {
        threshold: ChronoDuration,
        done: oneshot::Sender<usize>,
    },
    Cleanup {
        threshold: ChronoDuration,
        done: oneshot::Sender<usize>,
    },
}

struct Direction {
    target: String,
    jobs: mpsc::UnboundedSender<Job>,
    state: Arc<Mutex<DirectionState>>,
}

pub struct Relayer {
    config: Config,
    clients: HashMap<String, Arc<dyn BridgeClient>>,
    /// Keyed by source chain name.
    directions: HashMap<String, Direction>,
    statuses: Arc<Mutex<HashMap<TransferId, TransferStatus>>>,
    #[allow(dead_code)]
    workers: Vec<JoinHandle<()>>,
}

impl Relayer {
    /// Build a relayer with alloy-backed clients from the configuration.
    pub fn new(config: Config) -> Result<Self> {
        let mut clients: HashMap<String, Arc<dyn BridgeClient>> = HashMap::new();
        for chain in &config.chains {
            let client = EvmBridgeClient::new(
                &chain.name,
                &chain.rpc_url,
                &chain.bridge_address,
                &config.private_key,
            )?;
            info!(
                chain = %chain.name,
                chain_id = chain.chain_id,
                bridge = %chain.bridge_address,
                relayer_address = %client.signer_address(),
                "Bridge client initialized"
            );
            clients.insert(chain.name.clone(), Arc::new(client));
        }
        Self::with_clients(config, clients)
    }

    /// Build a relayer over caller-supplied clients. This is the seam the
    /// integration tests use to substitute mock chains.
    pub fn with_clients(
        config: Config,
        clients: HashMap<String, Arc<dyn BridgeClient>>,
    ) -> Result<Self> {
        config.validate()?;
        for chain in &config.chains {
            if !clients.contains_key(&chain.name) {
                return Err(eyre::eyre!("No client supplied for chain '{}'", chain.name));
            }
        }

        let statuses: Arc<Mutex<HashMap<TransferId, TransferStatus>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let mut directions = HashMap::new();
        let mut workers = Vec::new();
        for chain in &config.chains {
            let target = config
                .paired_chain(&chain.name)
                .ok_or_else(|| eyre::eyre!("no paired chain for '{}'", chain.name))?
                .name
                .clone();
            let state = Arc::new(Mutex::new(DirectionState::default()));
            let (tx, rx) = mpsc::unbounded_channel();

            let ctx = WorkerCtx {
                source: chain.name.clone(),
                target: target.clone(),
                client: clients[&target].clone(),
                state: state.clone(),
                statuses: statuses.clone(),
                policy: config.relayer.expired_policy.clone(),
            };
            workers.push(tokio::spawn(ctx.run(rx)));

            directions.insert(
                chain.name.clone(),
                Direction {
                    target,
                    jobs: tx,
                    state,
                },
            );
        }

        Ok(Self {
            config,
            clients,
            directions,
            statuses,
            workers,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The client bound to a chain, if configured.
    pub fn client(&self, chain: &str) -> Option<Arc<dyn BridgeClient>> {
        self.clients.get(chain).cloned()
    }

    pub fn source_chains(&self) -> Vec<String> {
        self.directions.keys().cloned().collect()
    }

    /// Synchronous enqueue: insert, publish the new root, attempt the first
    /// relay, and surface any failure to the caller. The transfer stays
    /// pending (and retryable) when the first attempt fails; its id can be
    /// recomputed from (user, amount, nonce) to poll `get_transfer_status`.
    pub async fn queue_transfer(
        &self,
        source: &str,
        target: &str,
        input: TransferInput,
    ) -> Result<QueueReceipt, RelayerError> {
        if self.config.chain(source).is_none() {
            return Err(RelayerError::UnknownChain(source.to_string()));
        }
        if self.config.chain(target).is_none() {
            return Err(RelayerError::UnknownChain(target.to_string()));
        }
        let direction = self
            .directions
            .get(source)
            .ok_or_else(|| RelayerError::UnknownChain(source.to_string()))?;
        if direction.target != target {
            return Err(RelayerError::InvalidRoute {
                source_chain: source.to_string(),
                target: target.to_string(),
            });
        }

        let transfer_id = compute_transfer_id(&input.user, &input.amount, input.nonce);
        let record = TransferRecord {
            transfer_id,
            user: input.user,
            amount: input.amount,
            source_chain: source.to_string(),
            target_chain: target.to_string(),
            nonce: input.nonce,
            kind: input.kind,
            created_at: Utc::now(),
            last_attempt: None,
        };

        let status = self.submit_transfer(record).await?;
        Ok(QueueReceipt {
            transfer_id,
            status,
        })
    }

    /// Insert a transfer and run the rebuild-publish-relay sequence on the
    /// direction's worker. Used by both the queue API and the event path.
    pub async fn submit_transfer(
        &self,
        record: TransferRecord,
    ) -> Result<TransferStatus, RelayerError> {
        let direction = self
            .directions
            .get(&record.source_chain)
            .ok_or_else(|| RelayerError::UnknownChain(record.source_chain.clone()))?;

        let (done, rx) = oneshot::channel();
        direction
            .jobs
            .send(Job::Insert { record, done })
            .map_err(|_| RelayerError::Shutdown)?;
        rx.await.map_err(|_| RelayerError::Shutdown)?
    }

    pub async fn get_transfer_status(&self, id: &TransferId) -> Option<TransferStatus> {
        self.statuses.lock().await.get(id).cloned()
    }

    /// Record a destination-side completion observed on chain.
    pub async fn mark_completed(&self, id: TransferId) {
        self.statuses.lock().await.insert(id, TransferStatus::Completed);
    }

    /// Re-relay every pending transfer of `source` whose last attempt is
    /// older than `threshold`. Returns the number successfully relayed.
    pub async fn retry_sweep(
        &self,
        source: &str,
        threshold: ChronoDuration,
    ) -> Result<usize, RelayerError> {
        let direction = self
            .directions
            .get(source)
            .ok_or_else(|| RelayerError::UnknownChain(source.to_string()))?;

        let (done, rx) = oneshot::channel();
        direction
            .jobs
            .send(Job::Retry { threshold, done })
            .map_err(|_| RelayerError::Shutdown)?;
        rx.await.map_err(|_| RelayerError::Shutdown)
    }

    /// Drop (or archive) every pending transfer of `source` older than
    /// `threshold` and rebuild the tree if any were removed. Returns the
    /// number removed.
    pub async fn cleanup_sweep(
        &self,
        source: &str,
        threshold: ChronoDuration,
    ) -> Result<usize, RelayerError> {
        let direction = self
            .directions
            .get(source)
            .ok_or_else(|| RelayerError::UnknownChain(source.to_string()))?;

        let (done, rx) = oneshot::channel();
        direction
            .jobs
            .send(Job::Cleanup { threshold, done })
            .map_err(|_| RelayerError::Shutdown)?;
        rx.await.map_err(|_| RelayerError::Shutdown)
    }

    pub async fn pending_count(&self, source: &str) -> usize {
        match self.directions.get(source) {
            Some(direction) => direction.state.lock().await.pending.len(),
            None => 0,
        }
    }

    /// Snapshot of all directions for the status endpoint.
    pub async fn status_snapshot(&self) -> Vec<DirectionStatus> {
        let mut out = Vec::with_capacity(self.directions.len());
        for (source, direction) in &self.directions {
            let state = direction.state.lock().await;
            out.push(DirectionStatus {
                source: source.clone(),
                target: direction.target.clone(),
                pending: state.pending.len(),
                root: state.tree.root_hex(),
            });
        }
        out.sort_by(|a, b| a.source.cmp(&b.source));
        out
    }
}

/// Everything one direction's worker needs; the worker is the sole mutator
/// of its direction's state.
struct WorkerCtx {
    source: String,
    target: String,
    client: Arc<dyn BridgeClient>,
    state: Arc<Mutex<DirectionState>>,
    statuses: Arc<Mutex<HashMap<TransferId, TransferStatus>>>,
    policy: ExpiredPolicy,
}

impl WorkerCtx {
    async fn run(self, mut jobs: mpsc::UnboundedReceiver<Job>) {
        while let Some(job) = jobs.recv().await {
            match job {
                Job::Insert { record, done } => {
                    let result = self.handle_insert(record).await;
                    let _ = done.send(result);
                }
                Job::Retry { threshold, done } => {
                    let _ = done.send(self.handle_retry(threshold).await);
                }
                Job::Cleanup { threshold, done } => {
                    let _ = done.send(self.handle_cleanup(threshold).await);
                }
            }
        }
    }

    async fn set_status(&self, id: TransferId, status: TransferStatus) {
        self.statuses.lock().await.insert(id, status);
    }

    async fn handle_insert(
        &self,
        record: TransferRecord,
    ) -> Result<TransferStatus, RelayerError> {
        let id = record.transfer_id;

        // Replay guard: a re-delivered event for a completed transfer must
        // not re-enter the pending set.
        if let Some(TransferStatus::Completed) = self.statuses.lock().await.get(&id) {
            tracing::debug!(
                transfer_id = %id,
                "Skipping already-completed transfer (replayed event)"
            );
            return Ok(TransferStatus::Completed);
        }

        let mut state = self.state.lock().await;
        if state.pending.insert(record.clone()) {
            info!(
                source = %self.source,
                target = %self.target,
                transfer_id = %id,
                user = %record.user,
                amount = %record.amount,
                nonce = record.nonce,
                kind = %record.kind,
                "New pending transfer"
            );
            self.set_status(id, TransferStatus::Pending).await;
        }
        metrics::set_pending_transfers(&self.source, state.pending.len());

        state.tree = MerkleAggregator::build_tree(&state.pending);
        if let Err(e) = MerkleAggregator::publish(&*self.client, &state.tree).await {
            warn!(
                target = %self.target,
                error = %e,
                "Root publish failed; transfer left pending for the retry sweep"
            );
            metrics::record_error(&self.target, "publish");
            return Err(RelayerError::Publish(e.to_string()));
        }

        state.pending.mark_attempt(&id, Utc::now());
        match ProofRelay::relay(&*self.client, &state.tree, &record).await {
            Ok(tx_hash) => {
                self.finish_relayed(&mut state, id, &tx_hash).await;
                Ok(TransferStatus::Completed)
            }
            Err(e) => {
                let class = classify_error(&e.to_string());
                warn!(
                    target = %self.target,
                    transfer_id = %id,
                    error = %e,
                    class = class.as_str(),
                    "Relay failed; transfer left pending for the retry sweep"
                );
                metrics::record_relay_submitted(&self.target, false);
                metrics::record_error(&self.target, class.as_str());
                self.set_status(id, TransferStatus::Failed(e.to_string())).await;
                Err(RelayerError::Relay(e.to_string()))
            }
        }
    }

    async fn handle_retry(&self, threshold: ChronoDuration) -> usize {
        let now = Utc::now();
        let mut state = self.state.lock().await;

        let stale = state.pending.stale_ids(now, threshold);
        if stale.is_empty() {
            return 0;
        }
        info!(
            source = %self.source,
            count = stale.len(),
            "Retry sweep re-relaying stale transfers"
        );

        // Rebuild first so every proof in this sweep matches the root the
        // target chain holds.
        state.tree = MerkleAggregator::build_tree(&state.pending);
        if let Err(e) = MerkleAggregator::publish(&*self.client, &state.tree).await {
            warn!(
                target = %self.target,
                error = %e,
                "Root publish failed; aborting retry sweep until next interval"
            );
            metrics::record_error(&self.target, "publish");
            return 0;
        }

        let mut relayed = 0;
        for id in stale {
            let Some(record) = state.pending.get(&id).cloned() else {
                continue;
            };
            state.pending.mark_attempt(&id, now);
            match ProofRelay::relay(&*self.client, &state.tree, &record).await {
                Ok(tx_hash) => {
                    self.finish_relayed(&mut state, id, &tx_hash).await;
                    relayed += 1;
                }
                Err(e) => {
                    let class = classify_error(&e.to_string());
                    warn!(
                        target = %self.target,
                        transfer_id = %id,
                        error = %e,
                        class = class.as_str(),
                        "Retry relay failed"
                    );
                    metrics::record_relay_submitted(&self.target, false);
                    metrics::record_error(&self.target, class.as_str());
                    self.set_status(id, TransferStatus::Failed(e.to_string())).await;
                }
            }
        }

        metrics::set_pending_transfers(&self.source, state.pending.len());
        relayed
    }

    async fn handle_cleanup(&self, threshold: ChronoDuration) -> usize {
        let now = Utc::now();
        let mut state = self.state.lock().await;

        let expired = state.pending.drain_expired(now, threshold);
        if expired.is_empty() {
            return 0;
        }

        warn!(
            source = %self.source,
            count = expired.len(),
            "Cleanup sweep dropping expired pending transfers"
        );
        metrics::record_transfers_expired(&self.source, expired.len());

        if let ExpiredPolicy::Archive(path) = &self.policy {
            if let Err(e) = archive_records(path, &expired).await {
                error!(
                    path = %path.display(),
                    error = %e,
                    "Failed to archive expired transfers; records are lost"
                );
            }
        }

        for record in &expired {
            self.set_status(
                record.transfer_id,
                TransferStatus::Failed("expired before relay".to_string()),
            )
            .await;
        }

        state.tree = MerkleAggregator::build_tree(&state.pending);
        if let Err(e) = MerkleAggregator::publish(&*self.client, &state.tree).await {
            warn!(
                target = %self.target,
                error = %e,
                "Root publish after cleanup failed; next rebuild will retry"
            );
            metrics::record_error(&self.target, "publish");
        }

        metrics::set_pending_transfers(&self.source, state.pending.len());
        expired.len()
    }

    /// Shared success path: remove from pending, mark completed, rebuild the
    /// tree so the published root no longer covers the relayed transfer.
    async fn finish_relayed(
        &self,
        state: &mut DirectionState,
        id: TransferId,
        tx_hash: &str,
    ) {
        state.pending.remove(&id);
        self.set_status(id, TransferStatus::Completed).await;
        metrics::record_relay_submitted(&self.target, true);
        metrics::set_pending_transfers(&self.source, state.pending.len());
        info!(
            source = %self.source,
            target = %self.target,
            transfer_id = %id,
            tx_hash = %tx_hash,
            "Transfer relayed"
        );

        state.tree = MerkleAggregator::build_tree(&state.pending);
        if let Err(e) = MerkleAggregator::publish(&*self.client, &state.tree).await {
            warn!(
                target = %self.target,
                error = %e,
                "Root publish after successful relay failed; next rebuild will retry"
            );
            metrics::record_error(&self.target, "publish");
        }
    }
}

async fn archive_records(path: &std::path::Path, records: &[TransferRecord]) -> Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    for record in records {
        let line = serde_json::to_string(record)?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
    }
    file.flush().await?;
    Ok(())
}
