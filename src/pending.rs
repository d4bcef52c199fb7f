//! In-memory ledger of transfers awaiting relay
//!
//! One store per source chain. Only membership matters: the Merkle tree is
//! rebuilt from a full snapshot, so no ordering is kept here. Entries are
//! created by the event processor and removed on successful relay or by the
//! cleanup sweep.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use crate::types::{TransferId, TransferRecord};

#[derive(Debug, Default)]
pub struct PendingTransferStore {
    transfers: HashMap<TransferId, TransferRecord>,
}

impl PendingTransferStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a transfer. Returns false if the id was already present
    /// (replayed event), leaving the existing record untouched.
    pub fn insert(&mut self, record: TransferRecord) -> bool {
        match self.transfers.entry(record.transfer_id) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(record);
                true
            }
        }
    }

    pub fn remove(&mut self, id: &TransferId) -> Option<TransferRecord> {
        self.transfers.remove(id)
    }

    pub fn get(&self, id: &TransferId) -> Option<&TransferRecord> {
        self.transfers.get(id)
    }

    pub fn contains(&self, id: &TransferId) -> bool {
        self.transfers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.transfers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TransferRecord> {
        self.transfers.values()
    }

    /// Record a relay attempt for the retry sweep's age accounting.
    pub fn mark_attempt(&mut self, id: &TransferId, at: DateTime<Utc>) {
        if let Some(record) = self.transfers.get_mut(id) {
            record.last_attempt = Some(at);
        }
    }

    /// Ids whose last attempt (or creation) is older than `threshold`.
    pub fn stale_ids(&self, now: DateTime<Utc>, threshold: Duration) -> Vec<TransferId> {
        self.transfers
            .values()
            .filter(|r| r.retry_age(now) >= threshold)
            .map(|r| r.transfer_id)
            .collect()
    }

    /// Remove and return every transfer created more than `threshold` ago.
    pub fn drain_expired(&mut self, now: DateTime<Utc>, threshold: Duration) -> Vec<TransferRecord> {
        let expired: Vec<TransferId> = self
            .transfers
            .values()
            .filter(|r| r.age(now) >= threshold)
            .map(|r| r.transfer_id)
            .collect();

        expired
            .iter()
            .filter_map(|id| self.transfers.remove(id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransferKind;
    use alloy::primitives::{Address, U256};

    fn record(id_byte: u8, age_secs: i64) -> TransferRecord {
        TransferRecord {
            transfer_id: TransferId([id_byte; 32]),
            user: Address::ZERO,
            amount: U256::from(1000u64),
            source_chain: "amoy".into(),
            target_chain: "sepolia".into(),
            nonce: id_byte as u64,
            kind: TransferKind::Lock,
            created_at: Utc::now() - Duration::seconds(age_secs),
            last_attempt: None,
        }
    }

    #[test]
    fn test_insert_is_idempotent_per_id() {
        let mut store = PendingTransferStore::new();
        assert!(store.insert(record(1, 0)));
        assert!(!store.insert(record(1, 0)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remove_returns_record() {
        let mut store = PendingTransferStore::new();
        store.insert(record(1, 0));
        let removed = store.remove(&TransferId([1u8; 32]));
        assert_eq!(removed.unwrap().nonce, 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_stale_ids_respects_threshold_and_attempts() {
        let mut store = PendingTransferStore::new();
        store.insert(record(1, 600));
        store.insert(record(2, 10));

        let now = Utc::now();
        let stale = store.stale_ids(now, Duration::seconds(300));
        assert_eq!(stale, vec![TransferId([1u8; 32])]);

        // A fresh attempt resets the retry age.
        store.mark_attempt(&TransferId([1u8; 32]), now);
        assert!(store.stale_ids(now, Duration::seconds(300)).is_empty());
    }

    #[test]
    fn test_drain_expired_removes_only_old_entries() {
        let mut store = PendingTransferStore::new();
        store.insert(record(1, 90_000));
        store.insert(record(2, 100));

        let drained = store.drain_expired(Utc::now(), Duration::seconds(86_400));
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].transfer_id, TransferId([1u8; 32]));
        assert_eq!(store.len(), 1);
        assert!(store.contains(&TransferId([2u8; 32])));
    }
}
