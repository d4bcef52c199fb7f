//! Common types for cross-chain transfers
//!
//! Chain events are represented as a tagged enum over the fixed event kinds
//! rather than free-form decoded log fields, so downstream code never touches
//! untyped payloads.

use alloy::primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 32-byte transfer identifier: `keccak256(user, amount, nonce)`.
///
/// Two transfers with identical (user, amount, nonce) tuples collide and are
/// indistinguishable. The destination contract rejects duplicate ids, which
/// is the only double-relay protection in the system.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferId(pub [u8; 32]);

impl TransferId {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex string with 0x prefix.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parse from a 0x-prefixed (or bare) 64-char hex string.
    pub fn from_hex(s: &str) -> Option<Self> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(raw).ok()?;
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(arr))
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransferId({})", self.to_hex())
    }
}

// Serialized as a 0x-prefixed hex string so ids are readable in archives and
// API responses.
impl Serialize for TransferId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for TransferId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s)
            .ok_or_else(|| serde::de::Error::custom("expected 0x-prefixed 32-byte hex string"))
    }
}

/// Which source-side event created a transfer, and therefore which
/// destination method completes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferKind {
    /// Token locked on the source chain; destination mints via `release`.
    Lock,
    /// Wrapped token burned on the source chain; destination frees the
    /// original via `unlock`.
    Burn,
}

impl TransferKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferKind::Lock => "lock",
            TransferKind::Burn => "burn",
        }
    }
}

impl fmt::Display for TransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A pending cross-chain transfer awaiting relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRecord {
    pub transfer_id: TransferId,
    pub user: Address,
    pub amount: U256,
    pub source_chain: String,
    pub target_chain: String,
    pub nonce: u64,
    pub kind: TransferKind,
    pub created_at: DateTime<Utc>,
    /// When the relay was last attempted. The retry sweep keys off this so a
    /// transfer is submitted at most once per threshold window.
    pub last_attempt: Option<DateTime<Utc>>,
}

impl TransferRecord {
    /// Age used by the retry sweep: time since the last attempt, falling back
    /// to time since creation when no attempt has been made yet.
    pub fn retry_age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.last_attempt.unwrap_or(self.created_at)
    }

    /// Age used by the cleanup sweep: always time since creation.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.created_at
    }
}

/// Observable transfer state, exposed through `get_transfer_status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferStatus {
    Pending,
    Completed,
    Failed(String),
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::Completed => "completed",
            TransferStatus::Failed(_) => "error",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Decoded bridge contract event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    /// Source-side escrow of an original token.
    Locked {
        user: Address,
        amount: U256,
        nonce: u64,
        block_number: u64,
    },
    /// Source-side destruction of a wrapped token.
    Burned {
        user: Address,
        amount: U256,
        nonce: u64,
        block_number: u64,
    },
    /// Destination-side release observed; informational.
    Released {
        user: Address,
        amount: U256,
        transfer_id: TransferId,
        block_number: u64,
    },
    /// Destination-side unlock observed; informational.
    Unlocked {
        user: Address,
        amount: U256,
        transfer_id: TransferId,
        block_number: u64,
    },
}

impl BridgeEvent {
    pub fn name(&self) -> &'static str {
        match self {
            BridgeEvent::Locked { .. } => "Locked",
            BridgeEvent::Burned { .. } => "Burned",
            BridgeEvent::Released { .. } => "Released",
            BridgeEvent::Unlocked { .. } => "Unlocked",
        }
    }

    pub fn block_number(&self) -> u64 {
        match self {
            BridgeEvent::Locked { block_number, .. }
            | BridgeEvent::Burned { block_number, .. }
            | BridgeEvent::Released { block_number, .. }
            | BridgeEvent::Unlocked { block_number, .. } => *block_number,
        }
    }
}
