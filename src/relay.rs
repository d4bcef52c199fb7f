//! Proof-based relay execution
//!
//! Derives a Merkle proof for one transfer from the in-memory tree, verifies
//! it locally against the locally held root, then submits the destination
//! contract call. The local verification guards against relaying with a
//! proof built from a tree that no longer matches the pending set. Delivery
//! is at-least-once; the destination contract alone rejects duplicates.

use eyre::{eyre, Result};
use tracing::debug;

use crate::client::BridgeClient;
use crate::hash::{bytes32_to_hex, compute_leaf};
use crate::merkle::MerkleTree;
use crate::types::{TransferKind, TransferRecord};

pub struct ProofRelay;

impl ProofRelay {
    /// Relay one transfer to the target chain using the current tree.
    /// Returns the submission transaction hash.
    pub async fn relay(
        target: &dyn BridgeClient,
        tree: &MerkleTree,
        record: &TransferRecord,
    ) -> Result<String> {
        let leaf = compute_leaf(&record.user, &record.amount, &record.transfer_id);

        let proof = tree.proof(&leaf).ok_or_else(|| {
            eyre!(
                "Transfer {} has no leaf in the current tree (stale rebuild?)",
                record.transfer_id
            )
        })?;

        if !tree.verify(&leaf, &proof) {
            return Err(eyre!(
                "Local proof verification failed for transfer {} against root {}",
                record.transfer_id,
                bytes32_to_hex(&tree.root())
            ));
        }

        debug!(
            chain = target.chain_name(),
            transfer_id = %record.transfer_id,
            kind = %record.kind,
            proof_len = proof.siblings.len(),
            "Submitting relay"
        );

        match record.kind {
            TransferKind::Lock => {
                target
                    .release(record.user, record.amount, &proof.siblings, record.transfer_id)
                    .await
            }
            TransferKind::Burn => {
                target
                    .unlock(record.user, record.amount, &proof.siblings, record.transfer_id)
                    .await
            }
        }
    }
}

/// Classifies submission errors for logging and metrics. Retries are governed
/// by the fixed-interval sweep regardless of class; classification makes
/// deterministic failures visible instead of silently looping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Temporary failure (RPC timeout, network issues)
    Transient,
    /// Transaction underpriced
    Underpriced,
    /// Nonce conflict (already processed or pending)
    Nonce,
    /// Deterministic failure (revert, invalid proof, duplicate transfer)
    Permanent,
    /// Unclassified
    Unknown,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Transient => "transient",
            ErrorClass::Underpriced => "underpriced",
            ErrorClass::Nonce => "nonce",
            ErrorClass::Permanent => "permanent",
            ErrorClass::Unknown => "unknown",
        }
    }
}

/// Classify an error string for retry observability
pub fn classify_error(error: &str) -> ErrorClass {
    let error_lower = error.to_lowercase();

    if error_lower.contains("timeout")
        || error_lower.contains("connection")
        || error_lower.contains("network")
        || error_lower.contains("rate limit")
        || error_lower.contains("too many requests")
        || error_lower.contains("503")
        || error_lower.contains("502")
        || error_lower.contains("temporarily unavailable")
    {
        return ErrorClass::Transient;
    }

    if error_lower.contains("underpriced")
        || error_lower.contains("replacement transaction")
        || error_lower.contains("gas price too low")
    {
        return ErrorClass::Underpriced;
    }

    if error_lower.contains("nonce too low")
        || error_lower.contains("nonce too high")
        || error_lower.contains("already known")
    {
        return ErrorClass::Nonce;
    }

    if error_lower.contains("reverted")
        || error_lower.contains("execution reverted")
        || error_lower.contains("invalid proof")
        || error_lower.contains("already processed")
        || error_lower.contains("insufficient funds")
        || error_lower.contains("out of gas")
    {
        return ErrorClass::Permanent;
    }

    ErrorClass::Unknown
}
