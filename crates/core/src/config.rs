//! Configuration types shared across crates.

use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Alternative-transport (block exchange) announcement configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BitswapConfig {
    /// Peer id of the block-exchange endpoint. When set, the block
    /// exchange is announced as an available retrieval protocol.
    #[serde(default)]
    pub peer_id: Option<String>,
    /// Publicly reachable multiaddrs of the block-exchange endpoint.
    /// When non-empty, an extended-provider record is announced.
    #[serde(default)]
    pub public_addrs: Vec<String>,
    /// Path to the block-exchange signing key, required to sign the
    /// extended-provider record.
    #[serde(default)]
    pub priv_key_file: Option<PathBuf>,
}

impl BitswapConfig {
    /// Whether block-exchange announcements are enabled at all.
    pub fn enabled(&self) -> bool {
        self.peer_id.is_some()
    }

    /// Whether the block exchange is publicly reachable and should be
    /// announced as an extended provider.
    pub fn publicly_reachable(&self) -> bool {
        self.enabled() && !self.public_addrs.is_empty()
    }
}

/// Piece doctor configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DoctorConfig {
    /// Minimum interval in seconds between re-checks of the same piece.
    #[serde(default = "default_min_piece_check_period_secs")]
    pub min_piece_check_period_secs: u64,
    /// Maximum number of pieces inspected per doctor batch.
    #[serde(default = "default_pieces_to_tracker_batch_size")]
    pub pieces_to_tracker_batch_size: usize,
}

fn default_min_piece_check_period_secs() -> u64 {
    30
}

fn default_pieces_to_tracker_batch_size() -> usize {
    1024
}

impl Default for DoctorConfig {
    fn default() -> Self {
        Self {
            min_piece_check_period_secs: default_min_piece_check_period_secs(),
            pieces_to_tracker_batch_size: default_pieces_to_tracker_batch_size(),
        }
    }
}

impl DoctorConfig {
    /// Get the minimum check period as a Duration.
    pub fn min_piece_check_period(&self) -> Duration {
        Duration::from_secs(self.min_piece_check_period_secs)
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base directory for the key-value store and the shard registration
    /// marker.
    pub root_dir: PathBuf,
    /// Whether announcements to the network indexer are enabled. When
    /// false, every announce operation fails without side effects.
    #[serde(default = "default_announce_enabled")]
    pub announce_enabled: bool,
    /// Block-exchange announcement configuration.
    #[serde(default)]
    pub bitswap: BitswapConfig,
    /// Piece doctor configuration.
    #[serde(default)]
    pub doctor: DoctorConfig,
    /// Maximum number of concurrent index builds.
    #[serde(default = "default_add_index_throttle")]
    pub add_index_throttle: usize,
}

fn default_announce_enabled() -> bool {
    true
}

fn default_add_index_throttle() -> usize {
    4
}

impl AppConfig {
    /// Load configuration from a TOML file merged with `WHARF_`-prefixed
    /// environment variables (e.g. `WHARF_DOCTOR__MIN_PIECE_CHECK_PERIOD_SECS`).
    pub fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
        let config: AppConfig = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("WHARF_").split("__"))
            .extract()
            .map_err(|e| crate::Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration invariants.
    pub fn validate(&self) -> crate::Result<()> {
        if self.root_dir.as_os_str().is_empty() {
            return Err(crate::Error::Config("root_dir must not be empty".to_string()));
        }
        if self.doctor.min_piece_check_period_secs == 0 {
            return Err(crate::Error::Config(
                "doctor.min_piece_check_period_secs must be at least 1".to_string(),
            ));
        }
        if self.add_index_throttle == 0 {
            return Err(crate::Error::Config(
                "add_index_throttle must be at least 1".to_string(),
            ));
        }
        if self.bitswap.priv_key_file.is_some() && !self.bitswap.enabled() {
            return Err(crate::Error::Config(
                "bitswap.priv_key_file requires bitswap.peer_id".to_string(),
            ));
        }
        Ok(())
    }

    /// Create a test configuration rooted at the given directory.
    ///
    /// **For testing only.**
    pub fn for_testing(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            announce_enabled: true,
            bitswap: BitswapConfig::default(),
            doctor: DoctorConfig::default(),
            add_index_throttle: default_add_index_throttle(),
        }
    }
}
