//! Merkle aggregation over the pending transfer set
//!
//! A tree is derived entirely from the current snapshot of one source chain's
//! pending transfers and committed on the paired target chain. Every rebuild
//! fully replaces the previous tree; the published root is authoritative only
//! for the instant it was committed.

use eyre::Result;
use tracing::{debug, warn};

use crate::client::BridgeClient;
use crate::hash::compute_leaf;
use crate::merkle::MerkleTree;
use crate::metrics;
use crate::pending::PendingTransferStore;

/// Soft bound on the pending set. Past this, the O(n) full rebuild per
/// mutation starts to dominate and operators should drain the backlog.
pub const MAX_PENDING_SOFT_CAP: usize = 10_000;

pub struct MerkleAggregator;

impl MerkleAggregator {
    /// Build a tree from a snapshot of the pending set.
    pub fn build_tree(pending: &PendingTransferStore) -> MerkleTree {
        if pending.len() > MAX_PENDING_SOFT_CAP {
            warn!(
                pending = pending.len(),
                soft_cap = MAX_PENDING_SOFT_CAP,
                "Pending set exceeds soft cap; full rebuilds are O(n) per mutation"
            );
        }

        let leaves: Vec<[u8; 32]> = pending
            .iter()
            .map(|r| compute_leaf(&r.user, &r.amount, &r.transfer_id))
            .collect();

        MerkleTree::from_leaves(leaves)
    }

    /// Commit a tree's root on the target chain.
    pub async fn publish(target: &dyn BridgeClient, tree: &MerkleTree) -> Result<String> {
        let root = tree.root();
        debug!(
            chain = target.chain_name(),
            root = %tree.root_hex(),
            leaves = tree.leaf_count(),
            "Publishing Merkle root"
        );

        match target.update_merkle_root(root).await {
            Ok(tx_hash) => {
                metrics::record_root_published(target.chain_name(), true);
                tracing::info!(
                    chain = target.chain_name(),
                    root = %tree.root_hex(),
                    tx_hash = %tx_hash,
                    "Merkle root committed"
                );
                Ok(tx_hash)
            }
            Err(e) => {
                metrics::record_root_published(target.chain_name(), false);
                Err(e)
            }
        }
    }
}
