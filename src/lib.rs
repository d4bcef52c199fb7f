pub mod aggregator;
pub mod api;
pub mod checkpoint;
pub mod client;
pub mod config;
pub mod contracts;
pub mod hash;
pub mod merkle;
pub mod metrics;
pub mod pending;
pub mod processor;
pub mod relay;
pub mod relayer;
pub mod scheduler;
pub mod types;
pub mod watchers;

pub use checkpoint::{CheckpointStore, FileCheckpointStore};
pub use client::{BridgeClient, EvmBridgeClient};
pub use config::{ChainConfig, Config, ExpiredPolicy, RelayerConfig};
pub use processor::EventProcessor;
pub use relayer::{QueueReceipt, Relayer, RelayerError, TransferInput};
pub use scheduler::{CleanupScheduler, RetryScheduler};
pub use types::{BridgeEvent, TransferId, TransferKind, TransferRecord, TransferStatus};
pub use watchers::WatcherManager;
