//! Durable last-processed-block checkpoints
//!
//! One record per chain. Watchers resume from the stored value after a
//! restart, which may re-deliver events from the saved block range if the
//! process died between event handling and the save; the consuming layer is
//! idempotent-safe against that.

use async_trait::async_trait;
use eyre::{Result, WrapErr};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::warn;

/// Keyed store of `chain name -> last fully processed block`.
///
/// Implementations must be monotonic: a `save` with a lower block than the
/// stored one is ignored.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Ensure backing storage exists, seeding zeroed defaults for `chains`.
    async fn init(&self, chains: &[String]) -> Result<()>;

    /// The full checkpoint map.
    async fn load(&self) -> Result<HashMap<String, u64>>;

    /// Last processed block for one chain (0 when never saved).
    async fn last_block(&self, chain: &str) -> Result<u64>;

    /// Persist an update for one chain.
    async fn save(&self, chain: &str, block: u64) -> Result<()>;
}

/// JSON-file-backed checkpoint store. Writes go to a sibling temp file which
/// is then renamed over the target, so a crash mid-write leaves the previous
/// checkpoint intact.
pub struct FileCheckpointStore {
    path: PathBuf,
    // Guards read-modify-write cycles on the file.
    lock: Mutex<()>,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_map(&self) -> Result<HashMap<String, u64>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .wrap_err_with(|| format!("Corrupt checkpoint file at {}", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e).wrap_err_with(|| {
                format!("Failed to read checkpoint file at {}", self.path.display())
            }),
        }
    }

    async fn write_map(&self, map: &HashMap<String, u64>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .wrap_err("Failed to create checkpoint directory")?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        let bytes = serde_json::to_vec_pretty(map).wrap_err("Failed to encode checkpoints")?;
        tokio::fs::write(&tmp, &bytes)
            .await
            .wrap_err_with(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .wrap_err_with(|| format!("Failed to rename {} into place", tmp.display()))?;
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn init(&self, chains: &[String]) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut map = self.read_map().await?;
        let mut changed = false;
        for chain in chains {
            if !map.contains_key(chain) {
                map.insert(chain.clone(), 0);
                changed = true;
            }
        }
        if changed || !self.path.exists() {
            self.write_map(&map).await?;
        }
        Ok(())
    }

    async fn load(&self) -> Result<HashMap<String, u64>> {
        let _guard = self.lock.lock().await;
        self.read_map().await
    }

    async fn last_block(&self, chain: &str) -> Result<u64> {
        let _guard = self.lock.lock().await;
        Ok(self.read_map().await?.get(chain).copied().unwrap_or(0))
    }

    async fn save(&self, chain: &str, block: u64) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut map = self.read_map().await?;
        let current = map.get(chain).copied().unwrap_or(0);
        if block < current {
            warn!(
                chain,
                block, current, "Ignoring checkpoint regression (monotonic invariant)"
            );
            return Ok(());
        }
        map.insert(chain.to_string(), block);
        self.write_map(&map).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "mbr-checkpoint-{}-{}.json",
            name,
            std::process::id()
        ))
    }

    #[tokio::test]
    async fn test_init_seeds_zeroed_defaults() {
        let path = temp_path("init");
        let _ = tokio::fs::remove_file(&path).await;
        let store = FileCheckpointStore::new(&path);

        store
            .init(&["amoy".to_string(), "sepolia".to_string()])
            .await
            .unwrap();

        let map = store.load().await.unwrap();
        assert_eq!(map.get("amoy"), Some(&0));
        assert_eq!(map.get("sepolia"), Some(&0));

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn test_save_persists_across_instances() {
        let path = temp_path("persist");
        let _ = tokio::fs::remove_file(&path).await;

        {
            let store = FileCheckpointStore::new(&path);
            store.save("amoy", 1234).await.unwrap();
        }

        // Simulated restart: a fresh instance over the same file.
        let store = FileCheckpointStore::new(&path);
        assert_eq!(store.last_block("amoy").await.unwrap(), 1234);
        assert_eq!(store.last_block("sepolia").await.unwrap(), 0);

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn test_save_is_monotonic() {
        let path = temp_path("monotonic");
        let _ = tokio::fs::remove_file(&path).await;
        let store = FileCheckpointStore::new(&path);

        store.save("amoy", 100).await.unwrap();
        store.save("amoy", 50).await.unwrap();
        assert_eq!(store.last_block("amoy").await.unwrap(), 100);

        store.save("amoy", 100).await.unwrap();
        store.save("amoy", 101).await.unwrap();
        assert_eq!(store.last_block("amoy").await.unwrap(), 101);

        let _ = tokio::fs::remove_file(&path).await;
    }
}
