use eyre::{eyre, Result, WrapErr};
use serde::Deserialize;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

/// Main configuration for the relayer
#[derive(Clone, Deserialize)]
pub struct Config {
    /// The two bridged chains. Each chain's paired target is the other one.
    pub chains: Vec<ChainConfig>,
    pub relayer: RelayerConfig,
    /// Relayer signing key, shared across both chains.
    pub private_key: String,
    /// Path of the JSON checkpoint file.
    pub checkpoint_path: PathBuf,
    /// Port for the health/metrics/status endpoints.
    pub api_port: u16,
}

/// Custom Debug that redacts the signing key to prevent accidental log leakage.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("chains", &self.chains)
            .field("relayer", &self.relayer)
            .field("private_key", &"<redacted>")
            .field("checkpoint_path", &self.checkpoint_path)
            .field("api_port", &self.api_port)
            .finish()
    }
}

/// Configuration for one chain of the bridge pair
#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// Human-readable name (e.g. "amoy", "sepolia")
    pub name: String,
    /// Native EVM chain ID
    pub chain_id: u64,
    /// JSON-RPC HTTP endpoint
    pub rpc_url: String,
    /// Bridge contract address
    pub bridge_address: String,
    /// Blocks subtracted from the head before processing
    #[serde(default = "default_finality_blocks")]
    pub finality_blocks: u64,
}

/// What to do with pending transfers dropped by the cleanup sweep.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum ExpiredPolicy {
    /// Silently drop (the documented default).
    Drop,
    /// Append the dropped records as JSON lines to the archive file.
    Archive(PathBuf),
}

/// Relayer tunables
#[derive(Debug, Clone, Deserialize)]
pub struct RelayerConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Longer sleep after an RPC failure before the watcher retries.
    #[serde(default = "default_error_backoff")]
    pub error_backoff_ms: u64,
    #[serde(default = "default_retry_interval")]
    pub retry_interval_secs: u64,
    #[serde(default = "default_retry_threshold")]
    pub retry_threshold_secs: u64,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
    #[serde(default = "default_cleanup_threshold")]
    pub cleanup_threshold_secs: u64,
    #[serde(default = "default_expired_policy")]
    pub expired_policy: ExpiredPolicy,
}

impl Default for RelayerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            error_backoff_ms: default_error_backoff(),
            retry_interval_secs: default_retry_interval(),
            retry_threshold_secs: default_retry_threshold(),
            cleanup_interval_secs: default_cleanup_interval(),
            cleanup_threshold_secs: default_cleanup_threshold(),
            expired_policy: default_expired_policy(),
        }
    }
}

/// Default functions
fn default_finality_blocks() -> u64 {
    1
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_error_backoff() -> u64 {
    10_000
}

fn default_retry_interval() -> u64 {
    300
}

fn default_retry_threshold() -> u64 {
    300
}

fn default_cleanup_interval() -> u64 {
    3600
}

fn default_cleanup_threshold() -> u64 {
    86_400
}

fn default_expired_policy() -> ExpiredPolicy {
    ExpiredPolicy::Drop
}

fn default_api_port() -> u16 {
    9090
}

impl Config {
    /// Load configuration from environment variables
    /// Loads .env file if present, then reads from environment
    pub fn load() -> Result<Self> {
        Self::load_from_file(".env").or_else(|_| Self::load_from_env())
    }

    /// Load from a specific .env file path
    pub fn load_from_file(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            dotenvy::from_filename(path)
                .wrap_err_with(|| format!("Failed to load .env file from {}", path))?;
        }
        Self::load_from_env()
    }

    /// Load configuration from environment variables
    fn load_from_env() -> Result<Self> {
        let mut chains = Vec::with_capacity(2);
        for i in 1..=2 {
            chains.push(load_chain_from_env(i)?);
        }

        let relayer = RelayerConfig {
            poll_interval_ms: env_parse("POLL_INTERVAL_MS", default_poll_interval()),
            error_backoff_ms: env_parse("ERROR_BACKOFF_MS", default_error_backoff()),
            retry_interval_secs: env_parse("RETRY_INTERVAL_SECS", default_retry_interval()),
            retry_threshold_secs: env_parse("RETRY_THRESHOLD_SECS", default_retry_threshold()),
            cleanup_interval_secs: env_parse("CLEANUP_INTERVAL_SECS", default_cleanup_interval()),
            cleanup_threshold_secs: env_parse(
                "CLEANUP_THRESHOLD_SECS",
                default_cleanup_threshold(),
            ),
            expired_policy: load_expired_policy_from_env()?,
        };

        let config = Config {
            chains,
            relayer,
            private_key: env::var("PRIVATE_KEY")
                .map_err(|_| eyre!("PRIVATE_KEY environment variable is required"))?,
            checkpoint_path: env::var("CHECKPOINT_PATH")
                .unwrap_or_else(|_| "checkpoints.json".to_string())
                .into(),
            api_port: env_parse("API_PORT", default_api_port()),
        };

        config.validate()?;
        Ok(config)
    }

    /// The configured chain with this name, if any.
    pub fn chain(&self, name: &str) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.name == name)
    }

    /// The other chain of the pair.
    pub fn paired_chain(&self, name: &str) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.name != name)
    }

    pub fn chain_names(&self) -> Vec<String> {
        self.chains.iter().map(|c| c.name.clone()).collect()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.chains.len() != 2 {
            return Err(eyre!(
                "Exactly two chains must be configured, got {}",
                self.chains.len()
            ));
        }

        if self.chains[0].name == self.chains[1].name {
            return Err(eyre!(
                "Chain names must be distinct, both are '{}'",
                self.chains[0].name
            ));
        }

        if self.chains[0].chain_id == self.chains[1].chain_id {
            return Err(eyre!(
                "Chain IDs must be distinct, both are {}. Two watchers on the \
                 same chain race on checkpoint writes.",
                self.chains[0].chain_id
            ));
        }

        for chain in &self.chains {
            if chain.name.is_empty() {
                return Err(eyre!("Chain name cannot be empty"));
            }
            if chain.rpc_url.is_empty() {
                return Err(eyre!("rpc_url cannot be empty for chain '{}'", chain.name));
            }
            if chain.bridge_address.len() != 42 || !chain.bridge_address.starts_with("0x") {
                return Err(eyre!(
                    "bridge_address for chain '{}' must be a valid hex address \
                     (42 chars with 0x prefix)",
                    chain.name
                ));
            }
        }

        if self.private_key.len() != 66 || !self.private_key.starts_with("0x") {
            return Err(eyre!("private_key must be 66 chars (0x + 64 hex chars)"));
        }

        if self.relayer.poll_interval_ms == 0 {
            return Err(eyre!("poll_interval_ms must be non-zero"));
        }

        if self.relayer.cleanup_threshold_secs < self.relayer.retry_threshold_secs {
            return Err(eyre!(
                "cleanup_threshold_secs must not be shorter than retry_threshold_secs, \
                 otherwise transfers expire before their first retry"
            ));
        }

        Ok(())
    }
}

fn load_chain_from_env(index: usize) -> Result<ChainConfig> {
    let prefix = format!("CHAIN_{}", index);

    Ok(ChainConfig {
        name: env::var(format!("{}_NAME", prefix))
            .map_err(|_| eyre!("{}_NAME environment variable is required", prefix))?,
        chain_id: env::var(format!("{}_CHAIN_ID", prefix))
            .map_err(|_| eyre!("{}_CHAIN_ID environment variable is required", prefix))?
            .parse()
            .wrap_err_with(|| format!("{}_CHAIN_ID must be a valid u64", prefix))?,
        rpc_url: env::var(format!("{}_RPC_URL", prefix))
            .map_err(|_| eyre!("{}_RPC_URL environment variable is required", prefix))?,
        bridge_address: env::var(format!("{}_BRIDGE_ADDRESS", prefix))
            .map_err(|_| eyre!("{}_BRIDGE_ADDRESS environment variable is required", prefix))?,
        finality_blocks: env_parse(&format!("{}_FINALITY_BLOCKS", prefix), default_finality_blocks()),
    })
}

fn load_expired_policy_from_env() -> Result<ExpiredPolicy> {
    match env::var("EXPIRED_TRANSFER_POLICY").as_deref() {
        Err(_) | Ok("drop") => Ok(ExpiredPolicy::Drop),
        Ok("archive") => {
            let path = env::var("EXPIRED_ARCHIVE_PATH").map_err(|_| {
                eyre!("EXPIRED_ARCHIVE_PATH is required when EXPIRED_TRANSFER_POLICY=archive")
            })?;
            Ok(ExpiredPolicy::Archive(path.into()))
        }
        Ok(other) => Err(eyre!(
            "EXPIRED_TRANSFER_POLICY must be 'drop' or 'archive', got '{}'",
            other
        )),
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
