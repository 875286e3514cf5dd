//! gpuq configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main gpuq configuration
///
/// All paths and timing knobs live here and are passed explicitly into the
/// bootstrap and coordinator entry points; there is no global state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path of the serialized queue
    #[serde(rename = "queue-file")]
    pub queue_file: PathBuf,

    /// Path of the advisory lock file guarding the queue
    #[serde(rename = "lock-file")]
    pub lock_file: PathBuf,

    /// Scheduler poll interval in milliseconds
    #[serde(rename = "poll-interval-ms")]
    pub poll_interval_ms: u64,

    /// Pin the device count instead of auto-detecting via nvidia-smi
    pub devices: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        // Use XDG local data directory (~/.local/share/gpuq on Linux)
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gpuq");

        Self {
            queue_file: data_dir.join("queue.json"),
            lock_file: data_dir.join("queue.json.lock"),
            poll_interval_ms: 2000,
            devices: None,
        }
    }
}

impl Config {
    /// Scheduler poll interval as a [`Duration`]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .gpuq.yml
        let local_config = PathBuf::from(".gpuq.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/gpuq/gpuq.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("gpuq").join("gpuq.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}
