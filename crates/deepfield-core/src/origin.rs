//! Floating origin and sector grid.
//!
//! Tracked positions are stored in *local* coordinates relative to a
//! floating origin. The origin's absolute universe position is kept as an
//! `f64` offset, so `world = origin_offset + local`. When the observer
//! drifts further than the rebase threshold from the local origin, every
//! tracked position is translated so the observer sits at the origin
//! again. Velocities are never touched: a rebase is a change of
//! coordinates, not a physical event.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use glam::DVec3;
use hecs::{Entity, World};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

use deepfield_logic::config::CoreConfig;
use deepfield_logic::sector::{self, SectorId};
use deepfield_logic::ConfigError;

/// Buffered events per subscriber before it starts lagging.
const REBASE_CHANNEL_CAPACITY: usize = 64;

/// Handle to a position tracked by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackedHandle(Entity);

impl TrackedHandle {
    /// Opaque bit pattern, stable for the lifetime of the registration.
    pub fn to_bits(self) -> u64 {
        self.0.to_bits().get()
    }
}

/// Errors raised by rebase bookkeeping. None of these are fatal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RebaseError {
    /// The handle was unregistered, usually by a concurrent gameplay removal.
    #[error("tracked handle {0:?} is no longer registered")]
    StaleHandle(TrackedHandle),

    /// A consumer tried to apply an event it has already applied.
    #[error("rebase event {sequence} already applied (last applied {last_applied})")]
    AlreadyApplied { sequence: u64, last_applied: u64 },
}

/// Translation emitted whenever the origin moves.
///
/// Consumers holding positions outside the coordinator subtract
/// `translation` from them, ideally through a [`RebaseCursor`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RebaseEvent {
    /// Strictly increasing per coordinator, starting at 1.
    pub sequence: u64,
    /// Offset subtracted from every local position.
    pub translation: DVec3,
    /// Absolute position of the new local origin.
    pub origin_offset: DVec3,
}

impl RebaseEvent {
    /// Express a local position in the post-rebase frame.
    pub fn apply_to(&self, local: DVec3) -> DVec3 {
        local - self.translation
    }
}

/// Applies rebase events to caller-owned positions exactly once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebaseCursor {
    last_applied: u64,
}

impl RebaseCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start after an already-known sequence number.
    pub fn starting_after(sequence: u64) -> Self {
        Self {
            last_applied: sequence,
        }
    }

    pub fn last_applied(&self) -> u64 {
        self.last_applied
    }

    /// Translate `positions` by `event`, rejecting replays.
    pub fn apply(
        &mut self,
        event: &RebaseEvent,
        positions: &mut [DVec3],
    ) -> Result<(), RebaseError> {
        if event.sequence <= self.last_applied {
            return Err(RebaseError::AlreadyApplied {
                sequence: event.sequence,
                last_applied: self.last_applied,
            });
        }
        for p in positions.iter_mut() {
            *p = event.apply_to(*p);
        }
        self.last_applied = event.sequence;
        Ok(())
    }
}

/// Receiving end of the rebase broadcast.
pub struct RebaseSubscription {
    rx: broadcast::Receiver<RebaseEvent>,
}

impl RebaseSubscription {
    /// Next buffered event, if any.
    ///
    /// A subscriber that fell behind skips the lost events with a warning;
    /// its cached positions are no longer trustworthy after that.
    pub fn try_next(&mut self) -> Option<RebaseEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    log::warn!("Rebase subscriber lagged, {} events dropped", missed);
                }
                Err(_) => return None,
            }
        }
    }

    /// All buffered events in order.
    pub fn drain(&mut self) -> Vec<RebaseEvent> {
        std::iter::from_fn(|| self.try_next()).collect()
    }
}

/// Observer bookkeeping, owned by the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObserverState {
    /// Absolute universe position.
    pub world_position: DVec3,
    /// Position relative to the floating origin.
    pub local_position: DVec3,
    /// Absolute position of the floating origin.
    pub origin_offset: DVec3,
    pub current_sector: SectorId,
    pub last_rebase_at: Option<DateTime<Utc>>,
    /// Sequence number of the most recent rebase (0 before the first).
    pub rebase_sequence: u64,
}

impl Default for ObserverState {
    fn default() -> Self {
        Self {
            world_position: DVec3::ZERO,
            local_position: DVec3::ZERO,
            origin_offset: DVec3::ZERO,
            current_sector: SectorId::ORIGIN,
            last_rebase_at: None,
            rebase_sequence: 0,
        }
    }
}

/// Grid cell grouping tracked positions.
#[derive(Debug, Clone, PartialEq)]
pub struct Sector {
    pub id: SectorId,
    /// Absolute position of the cell's minimum corner.
    pub origin_offset: DVec3,
    pub bodies: HashSet<TrackedHandle>,
}

impl Sector {
    fn new(id: SectorId, sector_size: f64) -> Self {
        Self {
            id,
            origin_offset: sector::sector_origin(id, sector_size),
            bodies: HashSet::new(),
        }
    }

    /// Position of an absolute point relative to this cell's corner.
    pub fn relative_position(&self, world_position: DVec3) -> DVec3 {
        world_position - self.origin_offset
    }
}

/// Read access to rebased local positions.
pub trait PositionSource {
    fn local_position(&self, handle: TrackedHandle) -> Option<DVec3>;
}

/// Rebase tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RebaseConfig {
    /// Observer drift that triggers a rebase.
    pub threshold: f64,
    /// Sector cube edge length.
    pub sector_size: f64,
}

impl Default for RebaseConfig {
    fn default() -> Self {
        Self::from_core(&CoreConfig::default())
    }
}

impl RebaseConfig {
    pub fn from_core(config: &CoreConfig) -> Self {
        Self {
            threshold: config.rebase_threshold(),
            sector_size: config.rebase.sector_size,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [("threshold", self.threshold), ("sector_size", self.sector_size)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::InvalidRebase { field, value });
            }
        }
        Ok(())
    }
}

/// Serializable view of one tracked position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedSnapshot {
    pub id: u64,
    pub local_position: DVec3,
    pub velocity: DVec3,
    pub sector: SectorId,
}

/// Serializable view of the coordinator, suitable for a transport layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OriginSnapshot {
    pub observer: ObserverState,
    pub tracked: Vec<TrackedSnapshot>,
    /// Occupied and retained sectors with their body counts.
    pub sectors: Vec<(SectorId, usize)>,
}

/// Stable external id of a tracked entity.
struct ExternalId(u64);

/// Per-entity tracked state.
struct Tracked {
    local: DVec3,
    velocity: DVec3,
    sector: SectorId,
}

/// Maintains the floating origin and assigns tracked positions to sectors.
pub struct OriginRebaseCoordinator {
    world: World,
    config: RebaseConfig,
    observer: ObserverState,
    sectors: HashMap<SectorId, Sector>,
    events: broadcast::Sender<RebaseEvent>,
}

impl OriginRebaseCoordinator {
    /// Create a coordinator. An invalid config falls back to defaults.
    pub fn new(config: RebaseConfig) -> Self {
        let config = match config.validate() {
            Ok(()) => config,
            Err(e) => {
                log::warn!("Rejected rebase config ({}), using defaults", e);
                RebaseConfig::default()
            }
        };
        let (events, _) = broadcast::channel(REBASE_CHANNEL_CAPACITY);

        let mut coordinator = Self {
            world: World::new(),
            config,
            observer: ObserverState::default(),
            sectors: HashMap::new(),
            events,
        };
        coordinator.ensure_sector(SectorId::ORIGIN);
        coordinator
    }

    pub fn config(&self) -> RebaseConfig {
        self.config
    }

    pub fn observer(&self) -> &ObserverState {
        &self.observer
    }

    /// Receive every future rebase event.
    pub fn subscribe(&self) -> RebaseSubscription {
        RebaseSubscription {
            rx: self.events.subscribe(),
        }
    }

    /// Start tracking a position at the local origin.
    pub fn register_tracked_position(&mut self, id: u64) -> TrackedHandle {
        self.register_tracked_position_at(id, DVec3::ZERO, DVec3::ZERO)
    }

    /// Start tracking a position with an initial local position and velocity.
    pub fn register_tracked_position_at(
        &mut self,
        id: u64,
        local: DVec3,
        velocity: DVec3,
    ) -> TrackedHandle {
        let sector = self.sector_for(self.local_to_world(local));
        let entity = self.world.spawn((
            ExternalId(id),
            Tracked {
                local,
                velocity,
                sector,
            },
        ));
        let handle = TrackedHandle(entity);
        self.ensure_sector(sector).bodies.insert(handle);
        handle
    }

    /// Stop tracking a position. Returns false for a stale handle.
    pub fn unregister_tracked_position(&mut self, handle: TrackedHandle) -> bool {
        let sector = match self.world.get::<&Tracked>(handle.0) {
            Ok(tracked) => tracked.sector,
            Err(_) => {
                log::warn!("Unregister of stale tracked handle {:?}", handle);
                return false;
            }
        };
        let _ = self.world.despawn(handle.0);
        if let Some(s) = self.sectors.get_mut(&sector) {
            s.bodies.remove(&handle);
        }
        true
    }

    pub fn is_tracked(&self, handle: TrackedHandle) -> bool {
        self.world.contains(handle.0)
    }

    pub fn tracked_count(&self) -> usize {
        self.world.len() as usize
    }

    /// Overwrite the local position and velocity of a tracked entity.
    ///
    /// A stale handle is a logged no-op: unregistration can race with
    /// in-flight updates during gameplay removal.
    pub fn update_position(
        &mut self,
        handle: TrackedHandle,
        local: DVec3,
        velocity: DVec3,
    ) -> Result<(), RebaseError> {
        let new_sector = self.sector_for(self.local_to_world(local));

        let old_sector = {
            let mut tracked = match self.world.get::<&mut Tracked>(handle.0) {
                Ok(t) => t,
                Err(_) => {
                    log::warn!("Position update for stale tracked handle {:?} ignored", handle);
                    return Err(RebaseError::StaleHandle(handle));
                }
            };
            tracked.local = local;
            tracked.velocity = velocity;
            std::mem::replace(&mut tracked.sector, new_sector)
        };

        if old_sector != new_sector {
            if let Some(s) = self.sectors.get_mut(&old_sector) {
                s.bodies.remove(&handle);
            }
            self.ensure_sector(new_sector).bodies.insert(handle);
        }
        Ok(())
    }

    pub fn velocity(&self, handle: TrackedHandle) -> Option<DVec3> {
        self.world
            .get::<&Tracked>(handle.0)
            .ok()
            .map(|t| t.velocity)
    }

    pub fn sector_of(&self, handle: TrackedHandle) -> Option<SectorId> {
        self.world.get::<&Tracked>(handle.0).ok().map(|t| t.sector)
    }

    pub fn external_id(&self, handle: TrackedHandle) -> Option<u64> {
        self.world.get::<&ExternalId>(handle.0).ok().map(|id| id.0)
    }

    /// Advance the observer and rebase if it drifted past the threshold.
    pub fn tick(&mut self, observer_local: DVec3) -> Option<RebaseEvent> {
        if !observer_local.is_finite() {
            log::warn!("Ignoring non-finite observer position {:?}", observer_local);
            return None;
        }

        self.move_observer(observer_local);

        let event = if observer_local.length() > self.config.threshold {
            Some(self.rebase_by(observer_local))
        } else {
            None
        };

        self.evict_sectors();
        event
    }

    /// Translate every tracked position by `-translation`.
    ///
    /// Used by [`tick`](Self::tick) and for explicit corrections such as
    /// undoing a previous rebase.
    pub fn rebase_by(&mut self, translation: DVec3) -> RebaseEvent {
        for (_, tracked) in self.world.query_mut::<&mut Tracked>() {
            tracked.local -= translation;
        }

        self.observer.origin_offset += translation;
        self.observer.local_position -= translation;
        self.observer.rebase_sequence += 1;
        self.observer.last_rebase_at = Some(Utc::now());

        let event = RebaseEvent {
            sequence: self.observer.rebase_sequence,
            translation,
            origin_offset: self.observer.origin_offset,
        };

        log::info!(
            "Rebase #{} by {:.1} m, origin now {:?} (sector {})",
            event.sequence,
            translation.length(),
            event.origin_offset,
            self.observer.current_sector
        );

        // No subscribers is not an error.
        let _ = self.events.send(event);
        event
    }

    /// Continue from a saved observer state.
    ///
    /// Tracked positions are translated into the restored frame, which
    /// emits a rebase event when the origin moves.
    pub fn restore_observer(&mut self, state: &ObserverState) -> Option<RebaseEvent> {
        let delta = state.origin_offset - self.observer.origin_offset;
        let event = if delta != DVec3::ZERO {
            Some(self.rebase_by(delta))
        } else {
            None
        };
        self.move_observer(state.local_position);
        self.evict_sectors();
        event
    }

    /// Sector containing an absolute world position.
    pub fn sector_for(&self, world_position: DVec3) -> SectorId {
        sector::sector_for(world_position, self.config.sector_size)
    }

    pub fn local_to_world(&self, local: DVec3) -> DVec3 {
        self.observer.origin_offset + local
    }

    pub fn world_to_local(&self, world: DVec3) -> DVec3 {
        world - self.observer.origin_offset
    }

    pub fn sector(&self, id: SectorId) -> Option<&Sector> {
        self.sectors.get(&id)
    }

    pub fn sectors(&self) -> impl Iterator<Item = &Sector> {
        self.sectors.values()
    }

    pub fn sector_count(&self) -> usize {
        self.sectors.len()
    }

    pub fn snapshot(&self) -> OriginSnapshot {
        let mut tracked: Vec<TrackedSnapshot> = self
            .world
            .query::<(&ExternalId, &Tracked)>()
            .iter()
            .map(|(_, (id, t))| TrackedSnapshot {
                id: id.0,
                local_position: t.local,
                velocity: t.velocity,
                sector: t.sector,
            })
            .collect();
        tracked.sort_by_key(|t| t.id);

        let mut sectors: Vec<(SectorId, usize)> = self
            .sectors
            .values()
            .map(|s| (s.id, s.bodies.len()))
            .collect();
        sectors.sort();

        OriginSnapshot {
            observer: self.observer.clone(),
            tracked,
            sectors,
        }
    }

    fn move_observer(&mut self, local: DVec3) {
        self.observer.local_position = local;
        self.observer.world_position = self.local_to_world(local);
        self.observer.current_sector = self.sector_for(self.observer.world_position);
        self.ensure_sector(self.observer.current_sector);
    }

    fn ensure_sector(&mut self, id: SectorId) -> &mut Sector {
        let size = self.config.sector_size;
        self.sectors
            .entry(id)
            .or_insert_with(|| Sector::new(id, size))
    }

    /// Drop sectors that are empty and not next to the observer.
    fn evict_sectors(&mut self) {
        let observer_sector = self.observer.current_sector;
        let before = self.sectors.len();
        self.sectors
            .retain(|id, s| !s.bodies.is_empty() || id.is_within_one(&observer_sector));
        let evicted = before - self.sectors.len();
        if evicted > 0 {
            log::debug!("Evicted {} empty sectors", evicted);
        }
    }
}

impl Default for OriginRebaseCoordinator {
    fn default() -> Self {
        Self::new(RebaseConfig::default())
    }
}

impl PositionSource for OriginRebaseCoordinator {
    fn local_position(&self, handle: TrackedHandle) -> Option<DVec3> {
        self.world.get::<&Tracked>(handle.0).ok().map(|t| t.local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinator(threshold: f64, sector_size: f64) -> OriginRebaseCoordinator {
        OriginRebaseCoordinator::new(RebaseConfig {
            threshold,
            sector_size,
        })
    }

    fn assert_close(a: DVec3, b: DVec3) {
        assert!((a - b).length() < 1e-9, "{:?} != {:?}", a, b);
    }

    #[test]
    fn no_rebase_inside_threshold() {
        let mut c = coordinator(100.0, 1000.0);
        let h = c.register_tracked_position_at(1, DVec3::new(10.0, 0.0, 0.0), DVec3::X);
        assert!(c.tick(DVec3::new(99.0, 0.0, 0.0)).is_none());
        assert_eq!(c.local_position(h), Some(DVec3::new(10.0, 0.0, 0.0)));
        assert_eq!(c.observer().rebase_sequence, 0);
    }

    #[test]
    fn rebase_translates_positions_but_not_velocities() {
        let mut c = coordinator(100.0, 1000.0);
        let h = c.register_tracked_position_at(
            1,
            DVec3::new(150.0, 5.0, 0.0),
            DVec3::new(3.0, 2.0, 1.0),
        );

        let event = c.tick(DVec3::new(120.0, 0.0, 0.0)).expect("rebase");
        assert_eq!(event.sequence, 1);
        assert_eq!(event.translation, DVec3::new(120.0, 0.0, 0.0));
        assert_close(c.local_position(h).unwrap(), DVec3::new(30.0, 5.0, 0.0));
        assert_eq!(c.velocity(h), Some(DVec3::new(3.0, 2.0, 1.0)));

        let obs = c.observer();
        assert_close(obs.local_position, DVec3::ZERO);
        assert_close(obs.world_position, DVec3::new(120.0, 0.0, 0.0));
        assert_close(obs.origin_offset, DVec3::new(120.0, 0.0, 0.0));
        assert!(obs.last_rebase_at.is_some());
    }

    #[test]
    fn equal_and_opposite_rebase_restores_positions() {
        let mut c = coordinator(100.0, 1000.0);
        let start = DVec3::new(12_345.678, -9.75, 0.001);
        let h = c.register_tracked_position_at(7, start, DVec3::ZERO);

        let event = c.tick(DVec3::new(5_000.0, 250.0, -40.0)).unwrap();
        let back = c.rebase_by(-event.translation);
        assert_eq!(back.sequence, event.sequence + 1);
        assert_close(c.local_position(h).unwrap(), start);
        assert_close(c.observer().origin_offset, DVec3::ZERO);
    }

    #[test]
    fn absolute_positions_survive_rebase() {
        let mut c = coordinator(10.0, 100.0);
        let h = c.register_tracked_position_at(1, DVec3::new(250.0, 0.0, 0.0), DVec3::ZERO);
        let world_before = c.local_to_world(c.local_position(h).unwrap());
        c.tick(DVec3::new(60.0, 0.0, 0.0)).unwrap();
        let world_after = c.local_to_world(c.local_position(h).unwrap());
        assert_close(world_before, world_after);
        // Sector membership is absolute, so it does not change.
        assert_eq!(c.sector_of(h), Some(SectorId::new(2, 0, 0)));
    }

    #[test]
    fn cursor_rejects_replayed_events() {
        let mut c = coordinator(1.0, 100.0);
        let event = c.tick(DVec3::new(5.0, 0.0, 0.0)).unwrap();

        let mut cached = [DVec3::new(6.0, 1.0, 0.0)];
        let mut cursor = RebaseCursor::new();
        cursor.apply(&event, &mut cached).unwrap();
        assert_close(cached[0], DVec3::new(1.0, 1.0, 0.0));

        let err = cursor.apply(&event, &mut cached).unwrap_err();
        assert_eq!(
            err,
            RebaseError::AlreadyApplied {
                sequence: 1,
                last_applied: 1
            }
        );
        assert_close(cached[0], DVec3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn subscribers_receive_events_in_order() {
        let mut c = coordinator(1.0, 100.0);
        let mut sub = c.subscribe();
        c.tick(DVec3::new(2.0, 0.0, 0.0));
        c.tick(DVec3::new(0.0, 3.0, 0.0));
        let events = sub.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].sequence, 1);
        assert_eq!(events[1].sequence, 2);
        assert!(sub.try_next().is_none());
    }

    #[test]
    fn stale_handle_update_is_noop() {
        let mut c = coordinator(100.0, 1000.0);
        let h = c.register_tracked_position(3);
        assert!(c.unregister_tracked_position(h));
        assert_eq!(
            c.update_position(h, DVec3::ONE, DVec3::ZERO),
            Err(RebaseError::StaleHandle(h))
        );
        assert!(!c.unregister_tracked_position(h));
        assert_eq!(c.tracked_count(), 0);
    }

    #[test]
    fn update_moves_between_sectors() {
        let mut c = coordinator(1e9, 100.0);
        let h = c.register_tracked_position(1);
        assert!(c.sector(SectorId::ORIGIN).unwrap().bodies.contains(&h));

        c.update_position(h, DVec3::new(450.0, 0.0, 0.0), DVec3::ZERO)
            .unwrap();
        let far = SectorId::new(4, 0, 0);
        assert!(c.sector(far).unwrap().bodies.contains(&h));
        assert!(!c.sector(SectorId::ORIGIN).unwrap().bodies.contains(&h));
    }

    #[test]
    fn empty_distant_sectors_are_evicted() {
        let mut c = coordinator(1e9, 100.0);
        let h = c.register_tracked_position_at(1, DVec3::new(1000.0, 0.0, 0.0), DVec3::ZERO);
        let far = SectorId::new(10, 0, 0);
        assert!(c.sector(far).is_some());

        // Occupied sectors survive even far from the observer.
        c.tick(DVec3::ZERO);
        assert!(c.sector(far).is_some());

        c.unregister_tracked_position(h);
        c.tick(DVec3::ZERO);
        assert!(c.sector(far).is_none());
        // Observer's own sector is retained.
        assert!(c.sector(SectorId::ORIGIN).is_some());
    }

    #[test]
    fn empty_adjacent_sectors_are_kept() {
        let mut c = coordinator(1e9, 100.0);
        let h = c.register_tracked_position_at(1, DVec3::new(150.0, 0.0, 0.0), DVec3::ZERO);
        c.unregister_tracked_position(h);
        c.tick(DVec3::new(50.0, 0.0, 0.0));
        assert!(c.sector(SectorId::new(1, 0, 0)).is_some());
    }

    #[test]
    fn non_finite_observer_is_ignored() {
        let mut c = coordinator(1.0, 100.0);
        assert!(c.tick(DVec3::new(f64::NAN, 0.0, 0.0)).is_none());
        assert_eq!(c.observer().local_position, DVec3::ZERO);
    }

    #[test]
    fn invalid_config_falls_back_to_defaults() {
        let c = coordinator(-5.0, 100.0);
        assert_eq!(c.config(), RebaseConfig::default());
    }

    #[test]
    fn restore_observer_moves_into_saved_frame() {
        let mut c = coordinator(100.0, 1000.0);
        let h = c.register_tracked_position_at(1, DVec3::new(5_000.0, 0.0, 0.0), DVec3::ZERO);

        let saved = ObserverState {
            origin_offset: DVec3::new(4_000.0, 0.0, 0.0),
            local_position: DVec3::new(10.0, 0.0, 0.0),
            ..Default::default()
        };
        let event = c.restore_observer(&saved).unwrap();
        assert_eq!(event.translation, DVec3::new(4_000.0, 0.0, 0.0));
        assert_close(c.local_position(h).unwrap(), DVec3::new(1_000.0, 0.0, 0.0));
        assert_close(c.observer().world_position, DVec3::new(4_010.0, 0.0, 0.0));
    }

    #[test]
    fn snapshot_is_sorted_and_serializable() {
        let mut c = coordinator(100.0, 1000.0);
        c.register_tracked_position_at(9, DVec3::new(1.0, 0.0, 0.0), DVec3::ZERO);
        c.register_tracked_position_at(2, DVec3::new(2_500.0, 0.0, 0.0), DVec3::ZERO);
        let snap = c.snapshot();
        assert_eq!(snap.tracked.iter().map(|t| t.id).collect::<Vec<_>>(), vec![2, 9]);
        let json = serde_json::to_string(&snap).unwrap();
        let back: OriginSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snap);
    }
}
