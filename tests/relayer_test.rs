//! End-to-end relayer flow over in-memory mock chains.

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use eyre::{eyre, Result};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use merkle_bridge_relayer::checkpoint::CheckpointStore;
use merkle_bridge_relayer::client::BridgeClient;
use merkle_bridge_relayer::config::{ChainConfig, Config, ExpiredPolicy, RelayerConfig};
use merkle_bridge_relayer::hash::{compute_leaf, compute_transfer_id};
use merkle_bridge_relayer::merkle::{verify_proof, MerkleProof};
use merkle_bridge_relayer::processor::EventProcessor;
use merkle_bridge_relayer::relayer::{Relayer, RelayerError, TransferInput};
use merkle_bridge_relayer::types::{BridgeEvent, TransferId, TransferKind, TransferStatus};
use merkle_bridge_relayer::watchers::EvmWatcher;

const EMPTY_ROOT: [u8; 32] = [0u8; 32];

#[derive(Default)]
struct MockInner {
    height: u64,
    events: Vec<BridgeEvent>,
    published_roots: Vec<[u8; 32]>,
    released: HashSet<TransferId>,
    unlocked: HashSet<TransferId>,
    submissions: u64,
    fail_next_submission: bool,
    fail_all_submissions: bool,
    fail_next_publish: bool,
    fetched_ranges: Vec<(u64, u64)>,
}

/// In-memory chain double. Submissions are verified against the most
/// recently published root, the way the bridge contract would.
struct MockChain {
    name: String,
    inner: Mutex<MockInner>,
}

impl MockChain {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            inner: Mutex::new(MockInner::default()),
        })
    }

    fn set_height(&self, height: u64) {
        self.inner.lock().unwrap().height = height;
    }

    fn push_event(&self, event: BridgeEvent) {
        self.inner.lock().unwrap().events.push(event);
    }

    fn fail_next_submission(&self) {
        self.inner.lock().unwrap().fail_next_submission = true;
    }

    fn fail_all_submissions(&self, on: bool) {
        self.inner.lock().unwrap().fail_all_submissions = on;
    }

    fn last_root(&self) -> Option<[u8; 32]> {
        self.inner.lock().unwrap().published_roots.last().copied()
    }

    fn roots_published(&self) -> usize {
        self.inner.lock().unwrap().published_roots.len()
    }

    fn released_ids(&self) -> HashSet<TransferId> {
        self.inner.lock().unwrap().released.clone()
    }

    fn unlocked_ids(&self) -> HashSet<TransferId> {
        self.inner.lock().unwrap().unlocked.clone()
    }

    fn submissions(&self) -> u64 {
        self.inner.lock().unwrap().submissions
    }

    fn fetched_ranges(&self) -> Vec<(u64, u64)> {
        self.inner.lock().unwrap().fetched_ranges.clone()
    }

    fn check_submission(
        &self,
        inner: &mut MockInner,
        user: Address,
        amount: U256,
        proof: &[[u8; 32]],
        transfer_id: TransferId,
    ) -> Result<()> {
        inner.submissions += 1;
        if inner.fail_next_submission {
            inner.fail_next_submission = false;
            return Err(eyre!("connection refused"));
        }
        if inner.fail_all_submissions {
            return Err(eyre!("connection refused"));
        }

        let root = inner
            .published_roots
            .last()
            .ok_or_else(|| eyre!("execution reverted: no root set"))?;
        let leaf = compute_leaf(&user, &amount, &transfer_id);
        let merkle_proof = MerkleProof {
            siblings: proof.to_vec(),
        };
        if !verify_proof(&leaf, &merkle_proof, root) {
            return Err(eyre!("execution reverted: invalid proof"));
        }
        if inner.released.contains(&transfer_id) || inner.unlocked.contains(&transfer_id) {
            return Err(eyre!("execution reverted: transfer already processed"));
        }
        Ok(())
    }
}

#[async_trait]
impl BridgeClient for MockChain {
    fn chain_name(&self) -> &str {
        &self.name
    }

    async fn block_number(&self) -> Result<u64> {
        Ok(self.inner.lock().unwrap().height)
    }

    async fn bridge_events(&self, from: u64, to: u64) -> Result<Vec<BridgeEvent>> {
        let mut inner = self.inner.lock().unwrap();
        inner.fetched_ranges.push((from, to));
        Ok(inner
            .events
            .iter()
            .filter(|e| e.block_number() >= from && e.block_number() <= to)
            .cloned()
            .collect())
    }

    async fn update_merkle_root(&self, root: [u8; 32]) -> Result<String> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_next_publish {
            inner.fail_next_publish = false;
            return Err(eyre!("connection refused"));
        }
        inner.published_roots.push(root);
        Ok(format!("0xroot{:04x}", inner.published_roots.len()))
    }

    async fn release(
        &self,
        user: Address,
        amount: U256,
        proof: &[[u8; 32]],
        transfer_id: TransferId,
    ) -> Result<String> {
        let mut inner = self.inner.lock().unwrap();
        self.check_submission(&mut inner, user, amount, proof, transfer_id)?;
        inner.released.insert(transfer_id);
        Ok(format!("0xrelease{:04x}", inner.submissions))
    }

    async fn unlock(
        &self,
        user: Address,
        amount: U256,
        proof: &[[u8; 32]],
        transfer_id: TransferId,
    ) -> Result<String> {
        let mut inner = self.inner.lock().unwrap();
        self.check_submission(&mut inner, user, amount, proof, transfer_id)?;
        inner.unlocked.insert(transfer_id);
        Ok(format!("0xunlock{:04x}", inner.submissions))
    }
}

/// Checkpoint store backed by a plain map, for watcher tests.
#[derive(Default)]
struct MemoryCheckpointStore {
    blocks: Mutex<HashMap<String, u64>>,
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn init(&self, chains: &[String]) -> Result<()> {
        let mut blocks = self.blocks.lock().unwrap();
        for chain in chains {
            blocks.entry(chain.clone()).or_insert(0);
        }
        Ok(())
    }

    async fn load(&self) -> Result<HashMap<String, u64>> {
        Ok(self.blocks.lock().unwrap().clone())
    }

    async fn last_block(&self, chain: &str) -> Result<u64> {
        Ok(*self.blocks.lock().unwrap().get(chain).unwrap_or(&0))
    }

    async fn save(&self, chain: &str, block: u64) -> Result<()> {
        let mut blocks = self.blocks.lock().unwrap();
        let entry = blocks.entry(chain.to_string()).or_insert(0);
        if block > *entry {
            *entry = block;
        }
        Ok(())
    }
}

fn test_config(expired_policy: ExpiredPolicy) -> Config {
    Config {
        chains: vec![
            ChainConfig {
                name: "alpha".to_string(),
                chain_id: 31337,
                rpc_url: "http://localhost:8545".to_string(),
                bridge_address: format!("0x{}", "11".repeat(20)),
                finality_blocks: 2,
            },
            ChainConfig {
                name: "beta".to_string(),
                chain_id: 31338,
                rpc_url: "http://localhost:8546".to_string(),
                bridge_address: format!("0x{}", "22".repeat(20)),
                finality_blocks: 2,
            },
        ],
        relayer: RelayerConfig {
            poll_interval_ms: 10,
            error_backoff_ms: 10,
            retry_interval_secs: 1,
            retry_threshold_secs: 0,
            cleanup_interval_secs: 3600,
            cleanup_threshold_secs: 86400,
            expired_policy,
        },
        private_key: format!("0x{}", "ab".repeat(32)),
        checkpoint_path: PathBuf::from("/tmp/unused-checkpoints.json"),
        api_port: 0,
    }
}

struct Harness {
    relayer: Arc<Relayer>,
    alpha: Arc<MockChain>,
    beta: Arc<MockChain>,
}

fn harness(expired_policy: ExpiredPolicy) -> Harness {
    let alpha = MockChain::new("alpha");
    let beta = MockChain::new("beta");
    let mut clients: HashMap<String, Arc<dyn BridgeClient>> = HashMap::new();
    clients.insert("alpha".to_string(), alpha.clone());
    clients.insert("beta".to_string(), beta.clone());

    let relayer = Relayer::with_clients(test_config(expired_policy), clients)
        .expect("relayer construction");
    Harness {
        relayer: Arc::new(relayer),
        alpha,
        beta,
    }
}

fn user(byte: u8) -> Address {
    Address::from([byte; 20])
}

fn input(byte: u8, amount: u64, nonce: u64, kind: TransferKind) -> TransferInput {
    TransferInput {
        user: user(byte),
        amount: U256::from(amount),
        nonce,
        kind,
    }
}

#[tokio::test]
async fn lock_transfer_is_relayed_as_release() {
    let h = harness(ExpiredPolicy::Drop);

    let receipt = h
        .relayer
        .queue_transfer("alpha", "beta", input(0x01, 1_000, 1, TransferKind::Lock))
        .await
        .expect("queue");

    assert_eq!(receipt.status, TransferStatus::Completed);
    assert!(h.beta.released_ids().contains(&receipt.transfer_id));
    assert!(h.beta.unlocked_ids().is_empty());
    assert_eq!(h.relayer.pending_count("alpha").await, 0);
    assert_eq!(
        h.relayer.get_transfer_status(&receipt.transfer_id).await,
        Some(TransferStatus::Completed)
    );
    // Root republished after the relay, excluding the cleared transfer.
    assert_eq!(h.beta.last_root(), Some(EMPTY_ROOT));
    assert!(h.alpha.roots_published() == 0);
}

#[tokio::test]
async fn burn_transfer_is_relayed_as_unlock() {
    let h = harness(ExpiredPolicy::Drop);

    let receipt = h
        .relayer
        .queue_transfer("alpha", "beta", input(0x02, 500, 7, TransferKind::Burn))
        .await
        .expect("queue");

    assert_eq!(receipt.status, TransferStatus::Completed);
    assert!(h.beta.unlocked_ids().contains(&receipt.transfer_id));
    assert!(h.beta.released_ids().is_empty());
}

#[tokio::test]
async fn failed_relay_stays_pending_until_retry_sweep() {
    let h = harness(ExpiredPolicy::Drop);
    h.beta.fail_next_submission();

    let err = h
        .relayer
        .queue_transfer("alpha", "beta", input(0x03, 42, 1, TransferKind::Lock))
        .await
        .expect_err("first attempt must fail");
    assert!(matches!(err, RelayerError::Relay(_)));

    let id = compute_transfer_id(&user(0x03), &U256::from(42u64), 1);
    assert_eq!(h.relayer.pending_count("alpha").await, 1);
    assert!(matches!(
        h.relayer.get_transfer_status(&id).await,
        Some(TransferStatus::Failed(_))
    ));

    // Threshold 0: everything pending is stale.
    let relayed = h
        .relayer
        .retry_sweep("alpha", ChronoDuration::zero())
        .await
        .expect("sweep");
    assert_eq!(relayed, 1);
    assert_eq!(h.relayer.pending_count("alpha").await, 0);
    assert_eq!(
        h.relayer.get_transfer_status(&id).await,
        Some(TransferStatus::Completed)
    );
    assert!(h.beta.released_ids().contains(&id));
}

#[tokio::test]
async fn cleanup_expires_stuck_transfer_and_rebuilds_root() {
    let h = harness(ExpiredPolicy::Drop);
    h.beta.fail_all_submissions(true);

    let err = h
        .relayer
        .queue_transfer("alpha", "beta", input(0x04, 9, 3, TransferKind::Lock))
        .await
        .expect_err("relay must fail");
    assert!(matches!(err, RelayerError::Relay(_)));
    assert_eq!(h.relayer.pending_count("alpha").await, 1);
    let root_with_transfer = h.beta.last_root().expect("root published");
    assert_ne!(root_with_transfer, EMPTY_ROOT);

    let removed = h
        .relayer
        .cleanup_sweep("alpha", ChronoDuration::zero())
        .await
        .expect("cleanup");
    assert_eq!(removed, 1);
    assert_eq!(h.relayer.pending_count("alpha").await, 0);

    let id = compute_transfer_id(&user(0x04), &U256::from(9u64), 3);
    assert_eq!(
        h.relayer.get_transfer_status(&id).await,
        Some(TransferStatus::Failed("expired before relay".to_string()))
    );
    // The republished root no longer covers the expired transfer.
    assert_eq!(h.beta.last_root(), Some(EMPTY_ROOT));
}

#[tokio::test]
async fn cleanup_archives_expired_records_when_configured() {
    let archive_path = std::env::temp_dir().join(format!(
        "relayer-archive-test-{}.jsonl",
        std::process::id()
    ));
    let _ = std::fs::remove_file(&archive_path);

    let h = harness(ExpiredPolicy::Archive(archive_path.clone()));
    h.beta.fail_all_submissions(true);

    let _ = h
        .relayer
        .queue_transfer("alpha", "beta", input(0x05, 77, 1, TransferKind::Burn))
        .await;
    let removed = h
        .relayer
        .cleanup_sweep("alpha", ChronoDuration::zero())
        .await
        .expect("cleanup");
    assert_eq!(removed, 1);

    let contents = std::fs::read_to_string(&archive_path).expect("archive file written");
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 1);
    let record: serde_json::Value = serde_json::from_str(lines[0]).expect("valid json line");
    assert_eq!(
        record["transfer_id"],
        serde_json::json!(compute_transfer_id(&user(0x05), &U256::from(77u64), 1).to_hex())
    );

    let _ = std::fs::remove_file(&archive_path);
}

#[tokio::test]
async fn replayed_event_for_completed_transfer_is_skipped() {
    let h = harness(ExpiredPolicy::Drop);
    let processor = EventProcessor::new(h.relayer.clone());

    let event = BridgeEvent::Locked {
        user: user(0x06),
        amount: U256::from(123u64),
        nonce: 5,
        block_number: 10,
    };

    processor.process("alpha", event.clone()).await;
    let id = compute_transfer_id(&user(0x06), &U256::from(123u64), 5);
    assert_eq!(
        h.relayer.get_transfer_status(&id).await,
        Some(TransferStatus::Completed)
    );
    let submissions_after_first = h.beta.submissions();

    // Same event delivered again, as after a checkpoint-lagging restart.
    processor.process("alpha", event).await;
    assert_eq!(h.beta.submissions(), submissions_after_first);
    assert_eq!(h.relayer.pending_count("alpha").await, 0);
    assert_eq!(
        h.relayer.get_transfer_status(&id).await,
        Some(TransferStatus::Completed)
    );
}

#[tokio::test]
async fn destination_event_marks_transfer_completed() {
    let h = harness(ExpiredPolicy::Drop);
    let processor = EventProcessor::new(h.relayer.clone());

    let id = compute_transfer_id(&user(0x07), &U256::from(1u64), 9);
    processor
        .process(
            "beta",
            BridgeEvent::Released {
                user: user(0x07),
                amount: U256::from(1u64),
                transfer_id: id,
                block_number: 20,
            },
        )
        .await;

    assert_eq!(
        h.relayer.get_transfer_status(&id).await,
        Some(TransferStatus::Completed)
    );
}

#[tokio::test]
async fn queue_rejects_unknown_chain_and_bad_route() {
    let h = harness(ExpiredPolicy::Drop);

    let err = h
        .relayer
        .queue_transfer("gamma", "beta", input(0x08, 1, 1, TransferKind::Lock))
        .await
        .expect_err("unknown source");
    assert!(matches!(err, RelayerError::UnknownChain(_)));

    let err = h
        .relayer
        .queue_transfer("alpha", "alpha", input(0x08, 1, 1, TransferKind::Lock))
        .await
        .expect_err("self route");
    assert!(matches!(err, RelayerError::InvalidRoute { .. }));
}

#[tokio::test]
async fn pending_transfers_share_one_root_and_all_relay() {
    let h = harness(ExpiredPolicy::Drop);
    h.beta.fail_all_submissions(true);

    // Accumulate three stuck transfers, then let the sweep relay them all
    // against a single rebuilt root.
    for nonce in 1..=3u64 {
        let _ = h
            .relayer
            .queue_transfer("alpha", "beta", input(0x09, 100 + nonce, nonce, TransferKind::Lock))
            .await;
    }
    assert_eq!(h.relayer.pending_count("alpha").await, 3);

    h.beta.fail_all_submissions(false);
    let roots_before = h.beta.roots_published();
    let relayed = h
        .relayer
        .retry_sweep("alpha", ChronoDuration::zero())
        .await
        .expect("sweep");
    assert_eq!(relayed, 3);
    assert_eq!(h.relayer.pending_count("alpha").await, 0);
    assert_eq!(h.beta.released_ids().len(), 3);
    // One rebuild before the sweep; per-relay republishes are not required
    // mid-sweep.
    assert!(h.beta.roots_published() > roots_before);
}

#[tokio::test]
async fn watcher_forwards_finalized_events_and_advances_checkpoint() {
    let h = harness(ExpiredPolicy::Drop);
    let checkpoints: Arc<MemoryCheckpointStore> = Arc::new(MemoryCheckpointStore::default());
    checkpoints
        .init(&["alpha".to_string(), "beta".to_string()])
        .await
        .expect("init");

    h.alpha.push_event(BridgeEvent::Locked {
        user: user(0x0a),
        amount: U256::from(555u64),
        nonce: 11,
        block_number: 5,
    });
    h.alpha.set_height(10);

    let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
    let watcher = EvmWatcher::new(
        "alpha",
        h.alpha.clone(),
        checkpoints.clone(),
        2, // finality margin
        Duration::from_millis(10),
        Duration::from_millis(10),
        events_tx,
    );
    let watcher_task = tokio::spawn(watcher.run());

    let processor = EventProcessor::new(h.relayer.clone());
    let (_shutdown_tx, shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);
    let processor_task = tokio::spawn(async move { processor.run(events_rx, shutdown_rx).await });

    tokio::time::sleep(Duration::from_millis(200)).await;

    let id = compute_transfer_id(&user(0x0a), &U256::from(555u64), 11);
    assert_eq!(
        h.relayer.get_transfer_status(&id).await,
        Some(TransferStatus::Completed)
    );
    assert!(h.beta.released_ids().contains(&id));

    // Checkpoint stops at height - finality and never re-covers a block.
    assert_eq!(checkpoints.last_block("alpha").await.unwrap(), 8);
    let ranges = h.alpha.fetched_ranges();
    assert!(!ranges.is_empty());
    for window in ranges.windows(2) {
        assert!(window[1].0 > window[0].1, "ranges must not overlap");
    }

    watcher_task.abort();
    processor_task.abort();
}
