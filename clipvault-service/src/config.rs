//! Configuration management for the clipboard service.
//!
//! Loads configuration from TOML files and provides runtime defaults.

use crate::fingerprint::{FingerprintRules, DEFAULT_HEAD_BYTES, DEFAULT_MIN_PNG_BYTES};
use crate::history::HistoryLimits;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub clipboard: ClipboardConfig,

    #[serde(default)]
    pub shortcuts: ShortcutConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Clipboard sampling interval
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// PNGs smaller than this are ignored while sampling
    #[serde(default = "default_fingerprint_min_png_bytes")]
    pub fingerprint_min_png_bytes: usize,

    /// Leading PNG bytes included in an image fingerprint
    #[serde(default = "default_fingerprint_head_bytes")]
    pub fingerprint_head_bytes: usize,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            fingerprint_min_png_bytes: default_fingerprint_min_png_bytes(),
            fingerprint_head_bytes: default_fingerprint_head_bytes(),
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    pub fn fingerprint_rules(&self) -> FingerprintRules {
        FingerprintRules {
            min_png_bytes: self.fingerprint_min_png_bytes,
            head_bytes: self.fingerprint_head_bytes,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Most recent records considered by a history query
    #[serde(default = "default_query_limit")]
    pub query_limit: usize,

    /// Recent images scanned for a duplicate on insert
    #[serde(default = "default_image_dedup_window")]
    pub image_dedup_window: usize,

    /// Smallest PNG accepted on insert. Independent of the sampling floor.
    #[serde(default = "default_min_image_bytes")]
    pub min_image_bytes: usize,

    /// Leading bytes compared when deduplicating images
    #[serde(default = "default_image_signature_head_bytes")]
    pub image_signature_head_bytes: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        let limits = HistoryLimits::default();
        Self {
            query_limit: limits.query_limit,
            image_dedup_window: limits.image_dedup_window,
            min_image_bytes: limits.min_image_bytes,
            image_signature_head_bytes: limits.image_signature_head_bytes,
        }
    }
}

impl HistoryConfig {
    pub fn limits(&self) -> HistoryLimits {
        HistoryLimits {
            query_limit: self.query_limit,
            image_dedup_window: self.image_dedup_window,
            min_image_bytes: self.min_image_bytes,
            image_signature_head_bytes: self.image_signature_head_bytes,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path to the Unix socket
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipboardBackend {
    /// The OS clipboard
    #[default]
    System,
    /// An in-process clipboard (headless runs)
    Memory,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClipboardConfig {
    #[serde(default)]
    pub backend: ClipboardBackend,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortcutConfig {
    /// Accelerators bound to other actions; the popup cannot take them
    #[serde(default = "default_reserved_shortcuts")]
    pub reserved: Vec<String>,
}

impl Default for ShortcutConfig {
    fn default() -> Self {
        Self {
            reserved: default_reserved_shortcuts(),
        }
    }
}

// Default value functions for serde
fn default_log_level() -> String {
    "info".to_string()
}

fn default_interval_ms() -> u64 {
    450
}

fn default_fingerprint_min_png_bytes() -> usize {
    DEFAULT_MIN_PNG_BYTES
}

fn default_fingerprint_head_bytes() -> usize {
    DEFAULT_HEAD_BYTES
}

fn default_query_limit() -> usize {
    HistoryLimits::default().query_limit
}

fn default_image_dedup_window() -> usize {
    HistoryLimits::default().image_dedup_window
}

fn default_min_image_bytes() -> usize {
    HistoryLimits::default().min_image_bytes
}

fn default_image_signature_head_bytes() -> usize {
    HistoryLimits::default().image_signature_head_bytes
}

fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("clipvault")
        .join("clipvault.sqlite")
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/tmp/clipvault.sock")
}

fn default_reserved_shortcuts() -> Vec<String> {
    vec![
        "CommandOrControl+C".to_string(),
        "CommandOrControl+V".to_string(),
        "CommandOrControl+X".to_string(),
        "CommandOrControl+Q".to_string(),
    ]
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Self {
        Self::load_from_path(Self::default_config_path())
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: PathBuf) -> Self {
        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!("Failed to parse config file: {}, using defaults", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("No config file found at {:?}, using defaults", path);
                Self::default()
            }
        }
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("clipvault")
            .join("config.toml")
    }

    /// Save configuration to the default path
    pub fn save(&self) -> std::io::Result<()> {
        self.save_to_path(Self::default_config_path())
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, path: PathBuf) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;

        std::fs::write(&path, contents)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }
}
