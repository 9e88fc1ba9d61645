use thiserror::Error;

use super::backup::BackupMetadata;

/// Errors returned by a save request.
///
/// `Clone` so a single failed write can be reported to every coalesced
/// waiter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SaveError {
    #[error("invalid slot id {0:?}")]
    InvalidSlot(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("compression error: {0}")]
    Compression(String),

    #[error("encryption error: {0}")]
    Encryption(String),

    #[error("payload of {0} bytes exceeds the frame limit")]
    PayloadTooLarge(usize),

    #[error("slot {0:?} has a write in flight")]
    SlotBusy(String),

    #[error("persistence worker stopped before completing the request")]
    WorkerStopped,
}

impl SaveError {
    /// Whether a failed write is attempted once more.
    ///
    /// I/O and serialization failures, including the compression and
    /// encryption stages, are retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Serialization(_) | Self::Compression(_) | Self::Encryption(_)
        )
    }
}

impl From<std::io::Error> for SaveError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Errors returned when reading a slot or backup.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("no save found for slot {slot:?}")]
    NotFound { slot: String },

    /// The file failed integrity validation. Carries the slot's backups so
    /// the caller can offer a restore.
    #[error("checksum mismatch in slot {slot:?} ({} backups available)", .backups.len())]
    ChecksumMismatch {
        slot: String,
        backups: Vec<BackupMetadata>,
    },

    #[error("schema version {found} is not supported (current is {current})")]
    UnsupportedVersion { found: u16, current: u16 },

    #[error("corrupt save: {0}")]
    Corrupt(String),

    #[error("save is encrypted but no key is configured")]
    MissingKey,

    #[error("decryption failed (wrong key or tampered data)")]
    Decryption,

    #[error("migration from schema {from} failed: {reason}")]
    Migration { from: u16, reason: String },

    #[error("invalid slot id {0:?}")]
    InvalidSlot(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("persistence worker stopped before completing the request")]
    WorkerStopped,
}
