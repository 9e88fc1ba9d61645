//! Configuration and registration errors.

use thiserror::Error;

/// Invalid registration parameters or configuration values.
///
/// These are always rejected synchronously and never fatal: callers
/// either fix the input or keep running with the previous value.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A body dimension was zero, negative, or not finite.
    #[error("{field} must be positive and finite, got {value}")]
    NonPositive { field: &'static str, value: f64 },

    /// Inner bubble radius is not strictly below the outer radius.
    #[error("bubble inner radius {inner} must be below outer radius {outer}")]
    InvertedBubble { inner: f64, outer: f64 },

    /// Minimum scale factor outside (0, 1].
    #[error("minimum scale factor {0} must be in (0, 1]")]
    MinScaleOutOfRange(f64),

    /// Falloff exponent below 1 would break influence monotonicity.
    #[error("falloff exponent {0} must be at least 1")]
    FalloffBelowOne(f64),

    /// Rebase threshold or sector size not usable.
    #[error("rebase {field} must be positive and finite, got {value}")]
    InvalidRebase { field: &'static str, value: f64 },

    /// Backup chain bound of zero.
    #[error("backup bound must be at least 1")]
    ZeroBackupBound,

    /// Auto-save interval of zero seconds.
    #[error("auto-save interval must be at least one second")]
    ZeroAutoSaveInterval,

    /// zstd level outside the supported range.
    #[error("compression level {0} must be within 1..=22")]
    CompressionLevel(i32),

    /// Encryption key is not 32 bytes of hex.
    #[error("encryption key must be 64 hex characters: {0}")]
    InvalidEncryptionKey(String),

    /// Save directory left empty.
    #[error("save directory must not be empty")]
    EmptySaveDir,

    /// Configuration document could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e.to_string())
    }
}

/// Check that `value` is strictly positive and finite.
pub(crate) fn require_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { field, value })
    }
}
