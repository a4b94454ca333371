//! Host configuration and its TOML persistence.
//!
//! ```toml
//! [host]
//! log_level = "info"
//! module_label = "demo"
//!
//! [channel]
//! call_timeout_ms = 5000
//! queue_depth = 64
//!
//! [surfaces]
//! seed_file = "devices.json"
//! feed_capacity = 256
//! ```
//!
//! Every field has a `#[serde(default = ..)]`, so a missing file, a missing
//! section or a missing key all fall back to the values below.

use std::path::{Path, PathBuf};
use std::time::Duration;

use modlink_core::ClientDevicesListItem;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration and seed-file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The surface seed file is not a JSON array of devices.
    #[error("invalid surface seed file {path}: {source}")]
    Seed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level host configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HostConfig {
    #[serde(default)]
    pub host: HostSection,
    #[serde(default)]
    pub channel: ChannelSection,
    #[serde(default)]
    pub surfaces: SurfacesSection,
}

/// General host behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostSection {
    /// `tracing` level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Label handed to the module in its `init` call.
    #[serde(default = "default_module_label")]
    pub module_label: String,
}

/// Module channel settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelSection {
    /// How long the host waits for a reply to a call.  `0` waits forever.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    /// Frames buffered per direction before senders wait.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

/// Surface relay settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SurfacesSection {
    /// Optional JSON file holding the initial device list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_file: Option<PathBuf>,
    /// Updates buffered per subscriber before it is reported as lagging.
    #[serde(default = "default_feed_capacity")]
    pub feed_capacity: usize,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_module_label() -> String {
    "demo".to_string()
}
fn default_call_timeout_ms() -> u64 {
    5000
}
fn default_queue_depth() -> usize {
    64
}
fn default_feed_capacity() -> usize {
    256
}

impl Default for HostSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            module_label: default_module_label(),
        }
    }
}

impl Default for ChannelSection {
    fn default() -> Self {
        Self {
            call_timeout_ms: default_call_timeout_ms(),
            queue_depth: default_queue_depth(),
        }
    }
}

impl Default for SurfacesSection {
    fn default() -> Self {
        Self {
            seed_file: None,
            feed_capacity: default_feed_capacity(),
        }
    }
}

impl HostConfig {
    /// The call timeout, or `None` when configured as `0`.
    pub fn call_timeout(&self) -> Option<Duration> {
        match self.channel.call_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

// ── Persistence ───────────────────────────────────────────────────────────────

/// Loads a [`HostConfig`] from `path`, returning the defaults if the file does
/// not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<HostConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HostConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes `config` to `path` as pretty TOML, creating parent directories.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(path: &Path, config: &HostConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads the device list from a JSON seed file.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read and
/// [`ConfigError::Seed`] if it is not a JSON array of devices.
pub fn load_seed_devices(path: &Path) -> Result<Vec<ClientDevicesListItem>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ConfigError::Seed {
        path: path.to_path_buf(),
        source,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
