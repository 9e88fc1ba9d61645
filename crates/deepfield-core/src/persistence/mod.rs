//! Versioned save/load service with backup rotation.
//!
//! Saves run on a tokio runtime and never block the caller: `save_all`
//! clones the records, queues them for the slot and returns a future for
//! the receipt. Each slot has at most one write in flight. Requests that
//! arrive while a write is running are coalesced into a single pending
//! snapshot (latest wins), and every coalesced caller receives the
//! receipt of the write that carried the latest data.
//!
//! Pipeline for one write:
//!
//! ```text
//! bincode ─► zstd? ─► AES-256-GCM? ─► frame + BLAKE3 ─► temp file + fsync
//!        ─► rotate backups ─► rename temp over {slot}.save
//! ```
//!
//! Loading verifies the checksum over the raw bytes before anything else,
//! then reverses the transforms and runs the migration chain.

pub mod backup;
pub mod error;
pub mod format;
pub mod migration;
pub mod records;
pub mod transform;

use std::collections::HashMap;
use std::fs;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock, RwLockWriteGuard};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use deepfield_logic::config::PersistenceSettings;
use deepfield_logic::ConfigError;

pub use backup::BackupMetadata;
pub use error::{LoadError, SaveError};
pub use migration::{MigrationRegistry, BASE_SCHEMA_VERSION};
pub use records::{
    BundleBody, OpaquePayload, PlayerPersistentRecord, SaveBundle, WorldPersistentRecord,
};

use backup::SlotPaths;
use format::FrameError;
use transform::PayloadCodec;

/// Attempts per write; I/O and serialization failures are retried once.
const MAX_WRITE_ATTEMPTS: u32 = 2;

/// Shortest auto-save period accepted.
const MIN_AUTO_SAVE_INTERVAL: Duration = Duration::from_secs(1);

/// Runtime settings for [`PersistenceService`].
#[derive(Clone)]
pub struct PersistenceConfig {
    pub save_dir: PathBuf,
    /// Prior bundles kept per slot.
    pub backup_bound: usize,
    /// zstd level, or `None` to store uncompressed.
    pub compression_level: Option<i32>,
    pub encryption_key: Option<[u8; 32]>,
    /// Period used by [`PersistenceService::start_configured_auto_save`].
    pub auto_save_interval: Option<Duration>,
}

impl std::fmt::Debug for PersistenceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceConfig")
            .field("save_dir", &self.save_dir)
            .field("backup_bound", &self.backup_bound)
            .field("compression_level", &self.compression_level)
            .field("encryption_key", &self.encryption_key.map(|_| "<redacted>"))
            .field("auto_save_interval", &self.auto_save_interval)
            .finish()
    }
}

impl PersistenceConfig {
    /// Defaults with the given save directory and auto-save off.
    pub fn in_dir(save_dir: impl Into<PathBuf>) -> Self {
        let defaults = PersistenceSettings::default();
        Self {
            save_dir: save_dir.into(),
            backup_bound: defaults.backup_bound,
            compression_level: defaults
                .compression_enabled
                .then_some(defaults.compression_level),
            encryption_key: None,
            auto_save_interval: None,
        }
    }

    pub fn from_settings(settings: &PersistenceSettings) -> Result<Self, ConfigError> {
        if settings.save_dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptySaveDir);
        }
        if settings.backup_bound == 0 {
            return Err(ConfigError::ZeroBackupBound);
        }
        if settings.auto_save_interval_secs == Some(0) {
            return Err(ConfigError::ZeroAutoSaveInterval);
        }
        if settings.compression_enabled && !(1..=22).contains(&settings.compression_level) {
            return Err(ConfigError::CompressionLevel(settings.compression_level));
        }
        Ok(Self {
            save_dir: settings.save_dir.clone(),
            backup_bound: settings.backup_bound,
            compression_level: settings
                .compression_enabled
                .then_some(settings.compression_level),
            encryption_key: settings.encryption_key_bytes()?,
            auto_save_interval: settings.auto_save_interval_secs.map(Duration::from_secs),
        })
    }
}

/// Result of a completed write.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveReceipt {
    pub slot: String,
    pub schema_version: u16,
    pub timestamp: DateTime<Utc>,
    pub bytes_written: u64,
    pub checksum: [u8; 32],
    /// Number of requests this write satisfied.
    pub coalesced: usize,
    /// Attempts taken, including the retry.
    pub attempts: u32,
}

/// Completion notice delivered to the simulation thread.
#[derive(Debug, Clone, PartialEq)]
pub enum PersistenceEvent {
    Saved(SaveReceipt),
    SaveFailed { slot: String, error: SaveError },
}

/// Receiving end of the completion channel.
pub struct PersistenceEvents {
    rx: mpsc::UnboundedReceiver<PersistenceEvent>,
}

impl PersistenceEvents {
    /// Every event delivered so far, without waiting.
    pub fn drain(&mut self) -> Vec<PersistenceEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Wait for the next event.
    pub async fn next(&mut self) -> Option<PersistenceEvent> {
        self.rx.recv().await
    }
}

/// Copy of the records taken when a save is requested.
#[derive(Debug)]
struct Snapshot {
    player: PlayerPersistentRecord,
    world: WorldPersistentRecord,
}

type Waiter = oneshot::Sender<Result<SaveReceipt, SaveError>>;

struct Pending {
    snapshot: Arc<Snapshot>,
    waiters: Vec<Waiter>,
}

/// Queue state for a slot with a worker running.
#[derive(Default)]
struct SlotQueue {
    pending: Option<Pending>,
}

struct Shared {
    config: PersistenceConfig,
    codec: PayloadCodec,
    migrations: RwLock<MigrationRegistry>,
    /// Slots present here have a worker running.
    slots: Mutex<HashMap<String, SlotQueue>>,
    latest: Mutex<Option<Arc<Snapshot>>>,
    events: mpsc::UnboundedSender<PersistenceEvent>,
    /// Commits that fail with an injected I/O error before succeeding.
    #[cfg(test)]
    commit_faults: std::sync::atomic::AtomicU32,
}

impl Shared {
    fn paths(&self, slot: &str) -> SlotPaths {
        SlotPaths::new(&self.config.save_dir, slot)
    }

    /// Queue a snapshot for `slot`, starting a worker if none is running.
    fn enqueue(
        self: &Arc<Self>,
        runtime: &Handle,
        slot: &str,
        snapshot: Arc<Snapshot>,
    ) -> Result<oneshot::Receiver<Result<SaveReceipt, SaveError>>, SaveError> {
        if !backup::is_valid_slot(slot) {
            return Err(SaveError::InvalidSlot(slot.to_string()));
        }
        let (tx, rx) = oneshot::channel();

        let mut slots = self.slots.lock();
        match slots.get_mut(slot) {
            Some(queue) => match &mut queue.pending {
                Some(pending) => {
                    log::debug!("Coalescing save request for slot {}", slot);
                    pending.snapshot = snapshot;
                    pending.waiters.push(tx);
                }
                None => {
                    queue.pending = Some(Pending {
                        snapshot,
                        waiters: vec![tx],
                    });
                }
            },
            None => {
                slots.insert(
                    slot.to_string(),
                    SlotQueue {
                        pending: Some(Pending {
                            snapshot,
                            waiters: vec![tx],
                        }),
                    },
                );
                runtime.spawn(run_slot_worker(Arc::clone(self), slot.to_string()));
            }
        }
        Ok(rx)
    }

    /// Serialize, transform, frame and durably write one bundle.
    ///
    /// `rotated` is set once the backup chain has shifted for this save;
    /// a retried write skips the rotation.
    fn write_bundle(
        &self,
        slot: &str,
        snapshot: &Snapshot,
        rotated: &mut bool,
    ) -> Result<SaveReceipt, SaveError> {
        let schema_version = self.migrations.read().current_version();
        let body = BundleBody {
            player: snapshot.player.clone(),
            world: snapshot.world.clone(),
        };
        let plain =
            bincode::serialize(&body).map_err(|e| SaveError::Serialization(e.to_string()))?;
        let payload = self.codec.encode(&plain)?;

        let timestamp = Utc::now();
        let framed = format::frame(schema_version, timestamp.timestamp_millis(), &payload);
        let (bytes, checksum) = framed.map_err(|e| match e {
            FrameError::TooLarge(n) => SaveError::PayloadTooLarge(n),
            other => SaveError::Serialization(format!("{:?}", other)),
        })?;

        let paths = self.paths(slot);
        fs::create_dir_all(paths.dir())?;
        let staged = backup::stage(paths.dir(), &bytes)?;
        if !*rotated {
            backup::rotate(&paths, self.config.backup_bound)?;
            *rotated = true;
        }
        #[cfg(test)]
        self.take_commit_fault()?;
        backup::commit(staged, &paths.active())?;

        Ok(SaveReceipt {
            slot: slot.to_string(),
            schema_version,
            timestamp,
            bytes_written: bytes.len() as u64,
            checksum,
            coalesced: 0,
            attempts: 0,
        })
    }

    /// Read, verify, decode and migrate one file of a slot.
    fn read_file(&self, slot: &str, path: &Path) -> Result<SaveBundle, LoadError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(LoadError::NotFound {
                    slot: slot.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let frame = match format::verify(&bytes) {
            Ok(frame) => frame,
            Err(FrameError::Checksum) => {
                log::warn!("Checksum mismatch reading {}", path.display());
                return Err(LoadError::ChecksumMismatch {
                    slot: slot.to_string(),
                    backups: backup::list(&self.paths(slot)),
                });
            }
            Err(FrameError::Corrupt(reason)) => return Err(LoadError::Corrupt(reason)),
            Err(FrameError::TooLarge(n)) => {
                return Err(LoadError::Corrupt(format!("payload of {} bytes", n)))
            }
        };

        let migrations = self.migrations.read();
        let stored = frame.header.schema_version;
        let current = migrations.current_version();
        if stored == 0 || stored > current {
            return Err(LoadError::UnsupportedVersion {
                found: stored,
                current,
            });
        }

        let plain = self.codec.decode(frame.payload)?;
        let mut body: BundleBody =
            bincode::deserialize(&plain).map_err(|e| LoadError::Corrupt(e.to_string()))?;
        migrations.migrate(stored, &mut body)?;

        Ok(SaveBundle {
            schema_version: stored,
            timestamp_ms: frame.header.timestamp_ms,
            checksum: frame.checksum,
            player: body.player,
            world: body.world,
        })
    }

    #[cfg(test)]
    fn take_commit_fault(&self) -> Result<(), SaveError> {
        use std::sync::atomic::Ordering;
        match self
            .commit_faults
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        {
            Ok(_) => Err(SaveError::Io("injected commit failure".into())),
            Err(_) => Ok(()),
        }
    }

    fn emit(&self, event: PersistenceEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }
}

/// Drain the pending snapshot of a slot until none is left.
async fn run_slot_worker(shared: Arc<Shared>, slot: String) {
    loop {
        let pending = {
            let mut slots = shared.slots.lock();
            let next = slots.get_mut(&slot).and_then(|queue| queue.pending.take());
            match next {
                Some(pending) => pending,
                None => {
                    slots.remove(&slot);
                    return;
                }
            }
        };

        let coalesced = pending.waiters.len();
        let result = write_with_retry(&shared, &slot, pending.snapshot)
            .await
            .map(|receipt| SaveReceipt {
                coalesced,
                ..receipt
            });

        match &result {
            Ok(receipt) => {
                log::info!(
                    "Saved slot {} (schema {}, {} bytes, {} request(s))",
                    slot,
                    receipt.schema_version,
                    receipt.bytes_written,
                    coalesced
                );
                shared.emit(PersistenceEvent::Saved(receipt.clone()));
            }
            Err(e) => {
                log::warn!("Save of slot {} failed: {}", slot, e);
                shared.emit(PersistenceEvent::SaveFailed {
                    slot: slot.clone(),
                    error: e.clone(),
                });
            }
        }

        for waiter in pending.waiters {
            let _ = waiter.send(result.clone());
        }
    }
}

async fn write_with_retry(
    shared: &Arc<Shared>,
    slot: &str,
    snapshot: Arc<Snapshot>,
) -> Result<SaveReceipt, SaveError> {
    let mut attempts = 0;
    let mut rotated = false;
    loop {
        attempts += 1;
        let task_shared = Arc::clone(shared);
        let task_slot = slot.to_string();
        let task_snapshot = Arc::clone(&snapshot);
        let mut task_rotated = rotated;
        let joined = tokio::task::spawn_blocking(move || {
            let result = task_shared.write_bundle(&task_slot, &task_snapshot, &mut task_rotated);
            (result, task_rotated)
        })
        .await;
        let result = match joined {
            Ok((result, now_rotated)) => {
                rotated = now_rotated;
                result
            }
            Err(e) => Err(SaveError::Io(format!("write task failed: {}", e))),
        };

        match result {
            Ok(receipt) => return Ok(SaveReceipt { attempts, ..receipt }),
            Err(e) if e.is_retryable() && attempts < MAX_WRITE_ATTEMPTS => {
                log::warn!("Write of slot {} failed ({}), retrying", slot, e);
            }
            Err(e) => return Err(e),
        }
    }
}

/// Versioned save/load/backup service for player and world records.
pub struct PersistenceService {
    shared: Arc<Shared>,
    runtime: Handle,
    events: Option<PersistenceEvents>,
    auto_save: Option<JoinHandle<()>>,
}

impl PersistenceService {
    /// Create a service that runs its work on `runtime`.
    pub fn new(config: PersistenceConfig, migrations: MigrationRegistry, runtime: Handle) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let codec = PayloadCodec::new(config.compression_level, config.encryption_key);
        log::info!(
            "Persistence service at {} (schema {}, {} backups, {}compressed, {}encrypted)",
            config.save_dir.display(),
            migrations.current_version(),
            config.backup_bound,
            if config.compression_level.is_some() { "" } else { "un" },
            if codec.is_encrypting() { "" } else { "un" },
        );
        Self {
            shared: Arc::new(Shared {
                config,
                codec,
                migrations: RwLock::new(migrations),
                slots: Mutex::new(HashMap::new()),
                latest: Mutex::new(None),
                events: tx,
                #[cfg(test)]
                commit_faults: std::sync::atomic::AtomicU32::new(0),
            }),
            runtime,
            events: Some(PersistenceEvents { rx }),
            auto_save: None,
        }
    }

    /// Build from the configuration document's persistence section.
    pub fn from_settings(
        settings: &PersistenceSettings,
        migrations: MigrationRegistry,
        runtime: Handle,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(
            PersistenceConfig::from_settings(settings)?,
            migrations,
            runtime,
        ))
    }

    pub fn config(&self) -> &PersistenceConfig {
        &self.shared.config
    }

    /// Schema version new saves are written with.
    pub fn current_version(&self) -> u16 {
        self.shared.migrations.read().current_version()
    }

    /// Register migration steps. Applies to loads started afterwards.
    pub fn migrations_mut(&self) -> RwLockWriteGuard<'_, MigrationRegistry> {
        self.shared.migrations.write()
    }

    /// Take the completion channel. Returns `None` after the first call.
    pub fn events(&mut self) -> Option<PersistenceEvents> {
        self.events.take()
    }

    /// Save both records to `slot`.
    ///
    /// The records are cloned before this returns; the caller may keep
    /// mutating its copies. The returned future only waits for the result.
    pub fn save_all(
        &self,
        slot: &str,
        player: &PlayerPersistentRecord,
        world: &WorldPersistentRecord,
    ) -> impl Future<Output = Result<SaveReceipt, SaveError>> + Send + 'static {
        let snapshot = Arc::new(Snapshot {
            player: player.clone(),
            world: world.clone(),
        });
        let queued = self.shared.enqueue(&self.runtime, slot, snapshot);
        async move {
            match queued {
                Ok(rx) => rx.await.unwrap_or(Err(SaveError::WorkerStopped)),
                Err(e) => Err(e),
            }
        }
    }

    /// Load and migrate both records from `slot`.
    pub fn load_all(
        &self,
        slot: &str,
    ) -> impl Future<Output = Result<(PlayerPersistentRecord, WorldPersistentRecord), LoadError>>
           + Send
           + 'static {
        let shared = Arc::clone(&self.shared);
        let runtime = self.runtime.clone();
        let slot = slot.to_string();
        async move {
            if !backup::is_valid_slot(&slot) {
                return Err(LoadError::InvalidSlot(slot));
            }
            let bundle = runtime
                .spawn_blocking(move || {
                    let path = shared.paths(&slot).active();
                    shared.read_file(&slot, &path)
                })
                .await
                .map_err(|_| LoadError::WorkerStopped)??;
            Ok((bundle.player, bundle.world))
        }
    }

    /// Read the active bundle of `slot` with its metadata. Blocks.
    pub fn read_bundle(&self, slot: &str) -> Result<SaveBundle, LoadError> {
        if !backup::is_valid_slot(slot) {
            return Err(LoadError::InvalidSlot(slot.to_string()));
        }
        self.shared
            .read_file(slot, &self.shared.paths(slot).active())
    }

    /// Load the backup at `index` (0 is newest). Blocks.
    pub fn restore_from_backup(
        &self,
        slot: &str,
        index: usize,
    ) -> Result<(PlayerPersistentRecord, WorldPersistentRecord), LoadError> {
        if !backup::is_valid_slot(slot) {
            return Err(LoadError::InvalidSlot(slot.to_string()));
        }
        let path = self.shared.paths(slot).backup(index);
        let bundle = self.shared.read_file(slot, &path)?;
        log::info!("Restored slot {} from backup {}", slot, index);
        Ok((bundle.player, bundle.world))
    }

    /// Backups of `slot`, newest first.
    pub fn list_backups(&self, slot: &str) -> Vec<BackupMetadata> {
        if !backup::is_valid_slot(slot) {
            log::warn!("Listing backups of invalid slot {:?}", slot);
            return Vec::new();
        }
        backup::list(&self.shared.paths(slot))
    }

    /// Slots with an active save, sorted.
    pub fn list_slots(&self) -> Result<Vec<String>, LoadError> {
        Ok(backup::list_slots(&self.shared.config.save_dir)?)
    }

    /// Delete a slot and its backups. Fails while a write is in flight.
    pub fn delete_slot(&self, slot: &str) -> Result<bool, SaveError> {
        if !backup::is_valid_slot(slot) {
            return Err(SaveError::InvalidSlot(slot.to_string()));
        }
        // Held across the removal so no worker starts meanwhile.
        let slots = self.shared.slots.lock();
        if slots.contains_key(slot) {
            return Err(SaveError::SlotBusy(slot.to_string()));
        }
        let removed = backup::remove_slot(&self.shared.paths(slot))?;
        if removed {
            log::info!("Deleted slot {}", slot);
        }
        Ok(removed)
    }

    /// Record the state the auto-save timer should write next.
    pub fn publish_snapshot(&self, player: &PlayerPersistentRecord, world: &WorldPersistentRecord) {
        *self.shared.latest.lock() = Some(Arc::new(Snapshot {
            player: player.clone(),
            world: world.clone(),
        }));
    }

    /// Periodically save the latest published snapshot to `slot`.
    ///
    /// Replaces any running timer. Ticks that find no snapshot are skipped.
    pub fn enable_auto_save(&mut self, slot: &str, interval: Duration) -> Result<(), SaveError> {
        if !backup::is_valid_slot(slot) {
            return Err(SaveError::InvalidSlot(slot.to_string()));
        }
        let interval = if interval < MIN_AUTO_SAVE_INTERVAL {
            log::warn!(
                "Auto-save interval {:?} too short, using {:?}",
                interval,
                MIN_AUTO_SAVE_INTERVAL
            );
            MIN_AUTO_SAVE_INTERVAL
        } else {
            interval
        };

        self.disable_auto_save();

        let shared = Arc::clone(&self.shared);
        let runtime = self.runtime.clone();
        let slot = slot.to_string();
        log::info!("Auto-save enabled for slot {} every {:?}", slot, interval);

        self.auto_save = Some(self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let latest = shared.latest.lock().clone();
                let Some(snapshot) = latest else {
                    log::debug!("Auto-save tick with no snapshot published");
                    continue;
                };
                // Results arrive through the event channel.
                if let Err(e) = shared.enqueue(&runtime, &slot, snapshot) {
                    log::warn!("Auto-save of slot {} not queued: {}", slot, e);
                }
            }
        }));
        Ok(())
    }

    /// Start auto-save with the configured interval, if one is set.
    pub fn start_configured_auto_save(&mut self, slot: &str) -> Result<bool, SaveError> {
        match self.shared.config.auto_save_interval {
            Some(interval) => self.enable_auto_save(slot, interval).map(|_| true),
            None => Ok(false),
        }
    }

    /// Stop the timer. A write already in flight still completes.
    pub fn disable_auto_save(&mut self) {
        if let Some(timer) = self.auto_save.take() {
            timer.abort();
            log::info!("Auto-save disabled");
        }
    }

    pub fn auto_save_enabled(&self) -> bool {
        self.auto_save.is_some()
    }
}

impl Drop for PersistenceService {
    fn drop(&mut self) {
        if let Some(timer) = self.auto_save.take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use tempfile::tempdir;

    fn records(tag: &str) -> (PlayerPersistentRecord, WorldPersistentRecord) {
        (
            PlayerPersistentRecord::new(
                BASE_SCHEMA_VERSION,
                "pilot",
                OpaquePayload::encode(&tag).unwrap(),
            ),
            WorldPersistentRecord::new(BASE_SCHEMA_VERSION, "sol", OpaquePayload::default()),
        )
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = tempdir().unwrap();
        let service = PersistenceService::new(
            PersistenceConfig::in_dir(dir.path()),
            MigrationRegistry::new(),
            Handle::current(),
        );
        let (p, w) = records("first");
        let receipt = service.save_all("p1", &p, &w).await.unwrap();
        assert_eq!(receipt.coalesced, 1);
        assert_eq!(receipt.attempts, 1);
        assert_eq!(receipt.schema_version, BASE_SCHEMA_VERSION);

        let (lp, lw) = service.load_all("p1").await.unwrap();
        assert_eq!(lp, p);
        assert_eq!(lw, w);
    }

    #[tokio::test]
    async fn invalid_slot_rejected_without_io() {
        let dir = tempdir().unwrap();
        let service = PersistenceService::new(
            PersistenceConfig::in_dir(dir.path()),
            MigrationRegistry::new(),
            Handle::current(),
        );
        let (p, w) = records("x");
        assert_eq!(
            service.save_all("../evil", &p, &w).await,
            Err(SaveError::InvalidSlot("../evil".into()))
        );
        assert!(matches!(
            service.load_all("a/b").await,
            Err(LoadError::InvalidSlot(_))
        ));
        assert!(service.list_slots().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_slot_is_not_found() {
        let dir = tempdir().unwrap();
        let service = PersistenceService::new(
            PersistenceConfig::in_dir(dir.path()),
            MigrationRegistry::new(),
            Handle::current(),
        );
        assert!(matches!(
            service.load_all("ghost").await,
            Err(LoadError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn events_report_completed_saves() {
        let dir = tempdir().unwrap();
        let mut service = PersistenceService::new(
            PersistenceConfig::in_dir(dir.path()),
            MigrationRegistry::new(),
            Handle::current(),
        );
        let mut events = service.events().unwrap();
        assert!(service.events().is_none());

        let (p, w) = records("x");
        let receipt = service.save_all("p1", &p, &w).await.unwrap();
        assert_eq!(events.drain(), vec![PersistenceEvent::Saved(receipt)]);
    }

    #[tokio::test]
    async fn failed_commit_is_retried_once() {
        let dir = tempdir().unwrap();
        let service = PersistenceService::new(
            PersistenceConfig::in_dir(dir.path()),
            MigrationRegistry::new(),
            Handle::current(),
        );
        let (p1, w1) = records("first");
        let (p2, w2) = records("second");
        service.save_all("p1", &p1, &w1).await.unwrap();

        service.shared.commit_faults.store(1, Ordering::SeqCst);
        let receipt = service.save_all("p1", &p2, &w2).await.unwrap();
        assert_eq!(receipt.attempts, 2);

        // The retry did not rotate a second time.
        assert_eq!(service.list_backups("p1").len(), 1);
        assert_eq!(service.restore_from_backup("p1", 0).unwrap(), (p1, w1));
        assert_eq!(service.load_all("p1").await.unwrap(), (p2, w2));
    }

    #[tokio::test]
    async fn exhausted_retries_keep_prior_states() {
        let dir = tempdir().unwrap();
        let mut service = PersistenceService::new(
            PersistenceConfig::in_dir(dir.path()),
            MigrationRegistry::new(),
            Handle::current(),
        );
        let mut events = service.events().unwrap();
        let (pa, wa) = records("a");
        let (pb, wb) = records("b");
        let (pc, wc) = records("c");
        let (pd, wd) = records("d");
        service.save_all("p1", &pa, &wa).await.unwrap();
        service.save_all("p1", &pb, &wb).await.unwrap();
        events.drain();

        service.shared.commit_faults.store(MAX_WRITE_ATTEMPTS, Ordering::SeqCst);
        let failed = service.save_all("p1", &pc, &wc).await;
        assert!(matches!(failed, Err(SaveError::Io(_))));
        assert!(matches!(
            events.drain().as_slice(),
            [PersistenceEvent::SaveFailed { .. }]
        ));
        assert_eq!(service.load_all("p1").await.unwrap(), (pb.clone(), wb.clone()));

        service.save_all("p1", &pd, &wd).await.unwrap();
        assert_eq!(service.list_backups("p1").len(), 2);
        assert_eq!(service.restore_from_backup("p1", 0).unwrap(), (pb, wb));
        assert_eq!(service.restore_from_backup("p1", 1).unwrap(), (pa, wa));
    }

    #[test]
    fn config_from_settings() {
        let settings = PersistenceSettings {
            compression_enabled: false,
            auto_save_interval_secs: Some(60),
            encryption_key: Some("11".repeat(32)),
            ..Default::default()
        };
        let config = PersistenceConfig::from_settings(&settings).unwrap();
        assert_eq!(config.compression_level, None);
        assert_eq!(config.auto_save_interval, Some(Duration::from_secs(60)));
        assert_eq!(config.encryption_key, Some([0x11; 32]));
        assert!(!format!("{:?}", config).contains("17"));

        let bad = PersistenceSettings {
            backup_bound: 0,
            ..Default::default()
        };
        assert_eq!(
            PersistenceConfig::from_settings(&bad).unwrap_err(),
            ConfigError::ZeroBackupBound
        );
    }
}
