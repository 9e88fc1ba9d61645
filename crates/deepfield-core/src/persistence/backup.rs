//! Slot file naming, atomic writes and backup rotation.
//!
//! A slot `p1` in directory `saves/` owns:
//!
//! | File | Contents |
//! |------|----------|
//! | `saves/p1.save` | Current bundle |
//! | `saves/p1.backup.0` | Previous bundle (newest backup) |
//! | `saves/p1.backup.{n}` | Older bundles, up to the backup bound |

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use super::format;

pub const SAVE_EXTENSION: &str = "save";
const BACKUP_INFIX: &str = ".backup.";
const MAX_SLOT_LEN: usize = 64;

/// Slot ids are `[A-Za-z0-9_-]{1,64}` so they are safe as file names.
pub fn is_valid_slot(slot: &str) -> bool {
    !slot.is_empty()
        && slot.len() <= MAX_SLOT_LEN
        && slot
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// File locations for one slot.
#[derive(Debug, Clone)]
pub struct SlotPaths {
    dir: PathBuf,
    slot: String,
}

impl SlotPaths {
    pub fn new(dir: impl Into<PathBuf>, slot: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            slot: slot.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn slot(&self) -> &str {
        &self.slot
    }

    pub fn active(&self) -> PathBuf {
        self.dir.join(format!("{}.{}", self.slot, SAVE_EXTENSION))
    }

    pub fn backup(&self, index: usize) -> PathBuf {
        self.dir
            .join(format!("{}{}{}", self.slot, BACKUP_INFIX, index))
    }

    /// Indices of every backup file present, ascending.
    pub fn backup_indices(&self) -> io::Result<Vec<usize>> {
        let prefix = format!("{}{}", self.slot, BACKUP_INFIX);
        let mut indices = Vec::new();
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(indices),
            Err(e) => return Err(e),
        };
        for entry in entries {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(index) = name.strip_prefix(&prefix).and_then(|s| s.parse().ok()) {
                indices.push(index);
            }
        }
        indices.sort_unstable();
        Ok(indices)
    }
}

/// Write `bytes` to a temp file in `dir` and fsync it.
pub fn stage(dir: &Path, bytes: &[u8]) -> io::Result<NamedTempFile> {
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    Ok(temp)
}

/// Atomically move a staged file over `path`.
pub fn commit(staged: NamedTempFile, path: &Path) -> io::Result<()> {
    staged.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Shift the backup chain and copy the active file to `backup.0`.
///
/// Keeps at most `bound` backups; the oldest is evicted. Does nothing if
/// the slot has no active file yet, or if `backup.0` already holds a copy
/// of it. The copy is staged before any backup is renamed, so a failure to
/// read the active file leaves the chain untouched.
pub fn rotate(paths: &SlotPaths, bound: usize) -> io::Result<()> {
    let active = paths.active();
    if !active.exists() || bound == 0 {
        return Ok(());
    }

    let current = fs::read(&active)?;
    // Already copied by a rotation whose commit never happened.
    if fs::read(paths.backup(0)).is_ok_and(|newest| newest == current) {
        return Ok(());
    }
    let staged = stage(paths.dir(), &current)?;

    for index in paths.backup_indices()? {
        if index + 1 >= bound {
            fs::remove_file(paths.backup(index))?;
        }
    }
    for index in (0..bound - 1).rev() {
        let from = paths.backup(index);
        if from.exists() {
            fs::rename(&from, paths.backup(index + 1))?;
        }
    }

    commit(staged, &paths.backup(0))
}

/// Summary of one backup file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupMetadata {
    /// 0 is the newest backup.
    pub index: usize,
    pub timestamp: Option<DateTime<Utc>>,
    pub schema_version: Option<u16>,
    pub size_bytes: u64,
    /// Whether the file passes checksum validation.
    pub intact: bool,
}

/// Describe one file in the chain.
pub fn describe(index: usize, path: &Path) -> io::Result<BackupMetadata> {
    let bytes = fs::read(path)?;
    let (header, intact) = match format::verify(&bytes) {
        Ok(frame) => (Some(frame.header), true),
        Err(_) => (format::parse_header(&bytes).ok(), false),
    };
    Ok(BackupMetadata {
        index,
        timestamp: header.and_then(|h| DateTime::from_timestamp_millis(h.timestamp_ms)),
        schema_version: header.map(|h| h.schema_version),
        size_bytes: bytes.len() as u64,
        intact,
    })
}

/// Every backup of a slot, newest first. Unreadable files are skipped.
pub fn list(paths: &SlotPaths) -> Vec<BackupMetadata> {
    let indices = match paths.backup_indices() {
        Ok(indices) => indices,
        Err(e) => {
            log::warn!("Could not list backups of slot {}: {}", paths.slot(), e);
            return Vec::new();
        }
    };
    indices
        .into_iter()
        .filter_map(|index| match describe(index, &paths.backup(index)) {
            Ok(meta) => Some(meta),
            Err(e) => {
                log::warn!("Skipping backup {} of slot {}: {}", index, paths.slot(), e);
                None
            }
        })
        .collect()
}

/// Slot ids with an active file in `dir`, sorted.
pub fn list_slots(dir: &Path) -> io::Result<Vec<String>> {
    let mut slots = Vec::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(slots),
        Err(e) => return Err(e),
    };
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(SAVE_EXTENSION) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            if is_valid_slot(stem) {
                slots.push(stem.to_string());
            }
        }
    }
    slots.sort();
    Ok(slots)
}

/// Remove the active file and every backup of a slot.
pub fn remove_slot(paths: &SlotPaths) -> io::Result<bool> {
    let mut removed = false;
    match fs::remove_file(paths.active()) {
        Ok(()) => removed = true,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    for index in paths.backup_indices()? {
        fs::remove_file(paths.backup(index))?;
        removed = true;
    }
    Ok(removed)
}
