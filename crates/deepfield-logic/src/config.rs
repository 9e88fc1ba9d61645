//! Configuration surface for the spatial core and persistence service.
//!
//! One JSON document configures everything. Every field has a default,
//! so an empty object `{}` is a valid configuration.
//!
//! ```
//! use deepfield_logic::config::{CoreConfig, validate_config};
//!
//! let config = CoreConfig::from_json_str(r#"{ "bubble": { "inner_radius": 2000.0 } }"#).unwrap();
//! assert_eq!(config.bubble.inner_radius, 2000.0);
//! assert_eq!(config.rebase_threshold(), 1000.0);
//! assert!(validate_config(&config).is_empty());
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::bubble::BubbleConfig;
use crate::error::{require_positive, ConfigError};

/// Fraction of the inner bubble radius the observer may drift before a
/// rebase, when no explicit threshold is configured.
pub const REBASE_THRESHOLD_FRACTION: f64 = 0.5;

/// Default number of prior bundles kept per save slot.
pub const DEFAULT_BACKUP_BOUND: usize = 5;

/// Floating-origin tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RebaseSettings {
    /// Drift distance that triggers a rebase. `None` derives it from the
    /// bubble inner radius.
    pub threshold: Option<f64>,
    /// Edge length of a sector cube in meters.
    pub sector_size: f64,
}

impl Default for RebaseSettings {
    fn default() -> Self {
        Self {
            threshold: None,
            sector_size: 50_000.0,
        }
    }
}

/// Save service tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceSettings {
    /// Directory holding slot and backup files.
    pub save_dir: PathBuf,
    /// Auto-save period; `None` leaves auto-save off at startup.
    pub auto_save_interval_secs: Option<u64>,
    /// Prior bundles kept per slot.
    pub backup_bound: usize,
    pub compression_enabled: bool,
    /// zstd level, 1..=22.
    pub compression_level: i32,
    /// AES-256 key as 64 hex characters.
    pub encryption_key: Option<String>,
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            save_dir: PathBuf::from("saves"),
            auto_save_interval_secs: Some(300),
            backup_bound: DEFAULT_BACKUP_BOUND,
            compression_enabled: true,
            compression_level: 3,
            encryption_key: None,
        }
    }
}

impl PersistenceSettings {
    /// Decode the configured encryption key.
    pub fn encryption_key_bytes(&self) -> Result<Option<[u8; 32]>, ConfigError> {
        let Some(text) = &self.encryption_key else {
            return Ok(None);
        };
        let bytes = hex::decode(text.trim())
            .map_err(|e| ConfigError::InvalidEncryptionKey(e.to_string()))?;
        let key: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
            ConfigError::InvalidEncryptionKey(format!("expected 32 bytes, got {}", b.len()))
        })?;
        Ok(Some(key))
    }
}

/// Complete configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub bubble: BubbleConfig,
    pub rebase: RebaseSettings,
    pub persistence: PersistenceSettings,
}

impl CoreConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Effective rebase threshold.
    pub fn rebase_threshold(&self) -> f64 {
        self.rebase
            .threshold
            .unwrap_or(self.bubble.inner_radius * REBASE_THRESHOLD_FRACTION)
    }
}

/// Validate a configuration, returning all errors found.
pub fn validate_config(config: &CoreConfig) -> Vec<ConfigError> {
    let mut errors = config.bubble.issues();

    let threshold = config.rebase_threshold();
    if require_positive("threshold", threshold).is_err() {
        errors.push(ConfigError::InvalidRebase {
            field: "threshold",
            value: threshold,
        });
    }
    if require_positive("sector_size", config.rebase.sector_size).is_err() {
        errors.push(ConfigError::InvalidRebase {
            field: "sector_size",
            value: config.rebase.sector_size,
        });
    }

    let persistence = &config.persistence;
    if persistence.save_dir.as_os_str().is_empty() {
        errors.push(ConfigError::EmptySaveDir);
    }
    if persistence.backup_bound == 0 {
        errors.push(ConfigError::ZeroBackupBound);
    }
    if persistence.auto_save_interval_secs == Some(0) {
        errors.push(ConfigError::ZeroAutoSaveInterval);
    }
    if !(1..=22).contains(&persistence.compression_level) {
        errors.push(ConfigError::CompressionLevel(persistence.compression_level));
    }
    if let Err(e) = persistence.encryption_key_bytes() {
        errors.push(e);
    }

    errors
}
