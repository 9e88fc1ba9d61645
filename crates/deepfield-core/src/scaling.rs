//! Per-body influence and apparent scale.
//!
//! The engine owns one [`SpatialBodyDescriptor`] per registered body and
//! recomputes its derived values on every tick from the body's rebased
//! local position. The math itself lives in [`deepfield_logic::bubble`].

use std::collections::HashSet;
use std::sync::Arc;

use glam::DVec3;
use hecs::{Entity, World};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use deepfield_logic::bubble::{self, BodyMetrics, BubbleConfig, BubbleStats, ScaleSample};
use deepfield_logic::ConfigError;

use crate::origin::{PositionSource, TrackedHandle};

/// Handle to a registered body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyHandle(Entity);

/// Registered body and its most recent derived values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialBodyDescriptor {
    /// Stable external id.
    pub id: u64,
    #[serde(skip)]
    pub tracked: Option<TrackedHandle>,
    pub true_physical_radius: f64,
    pub apparent_reference_radius: f64,
    pub reference_distance: f64,
    pub current_scale_factor: f64,
    pub current_influence: f64,
}

impl SpatialBodyDescriptor {
    pub fn new(
        id: u64,
        tracked: TrackedHandle,
        true_physical_radius: f64,
        apparent_reference_radius: f64,
        reference_distance: f64,
    ) -> Self {
        Self {
            id,
            tracked: Some(tracked),
            true_physical_radius,
            apparent_reference_radius,
            reference_distance,
            current_scale_factor: ScaleSample::UNTICKED.scale_factor,
            current_influence: ScaleSample::UNTICKED.influence,
        }
    }

    pub fn metrics(&self) -> Result<BodyMetrics, ConfigError> {
        BodyMetrics::new(
            self.true_physical_radius,
            self.apparent_reference_radius,
            self.reference_distance,
        )
    }

    pub fn sample(&self) -> ScaleSample {
        ScaleSample {
            scale_factor: self.current_scale_factor,
            influence: self.current_influence,
        }
    }
}

/// Bubble config shared across threads.
///
/// Writers may swap it at any time; the engine reads it once at the start
/// of each tick, so a tick never observes two different configs.
#[derive(Debug, Clone, Default)]
pub struct SharedBubbleConfig(Arc<RwLock<BubbleConfig>>);

impl SharedBubbleConfig {
    pub fn new(config: BubbleConfig) -> Self {
        Self(Arc::new(RwLock::new(config)))
    }

    pub fn get(&self) -> BubbleConfig {
        *self.0.read()
    }

    /// Replace the config if it validates; otherwise keep the current one.
    pub fn set(&self, config: BubbleConfig) -> Result<(), ConfigError> {
        if let Err(e) = config.validate() {
            log::warn!("Rejected bubble config ({}), keeping current", e);
            return Err(e);
        }
        *self.0.write() = config;
        Ok(())
    }
}

/// Computes influence and apparent scale for registered bodies.
pub struct SpatialScalingEngine {
    world: World,
    shared: SharedBubbleConfig,
    /// Copy taken at the start of the most recent tick.
    active: BubbleConfig,
    stale_warned: HashSet<BodyHandle>,
    last_stats: BubbleStats,
}

impl SpatialScalingEngine {
    /// Create an engine. An invalid config falls back to defaults.
    pub fn new(config: BubbleConfig) -> Self {
        let config = match config.validate() {
            Ok(()) => config,
            Err(e) => {
                log::warn!("Rejected bubble config ({}), using defaults", e);
                BubbleConfig::default()
            }
        };
        Self {
            world: World::new(),
            shared: SharedBubbleConfig::new(config),
            active: config,
            stale_warned: HashSet::new(),
            last_stats: BubbleStats::default(),
        }
    }

    /// Register a body. Fails if any size parameter is non-positive.
    pub fn register_body(
        &mut self,
        descriptor: SpatialBodyDescriptor,
    ) -> Result<BodyHandle, ConfigError> {
        let metrics = descriptor.metrics()?;
        let descriptor = SpatialBodyDescriptor {
            current_scale_factor: ScaleSample::UNTICKED.scale_factor,
            current_influence: ScaleSample::UNTICKED.influence,
            ..descriptor
        };
        let entity = self.world.spawn((descriptor, metrics));
        Ok(BodyHandle(entity))
    }

    /// Returns false for a handle that was already removed.
    pub fn unregister_body(&mut self, handle: BodyHandle) -> bool {
        self.stale_warned.remove(&handle);
        self.world.despawn(handle.0).is_ok()
    }

    /// Queue a new bubble config for the next tick.
    pub fn set_bubble_config(&self, config: BubbleConfig) -> Result<(), ConfigError> {
        self.shared.set(config)
    }

    /// Config used by the most recent tick.
    pub fn bubble_config(&self) -> BubbleConfig {
        self.active
    }

    pub fn shared_config(&self) -> SharedBubbleConfig {
        self.shared.clone()
    }

    pub fn body_count(&self) -> usize {
        self.world.len() as usize
    }

    pub fn last_stats(&self) -> BubbleStats {
        self.last_stats
    }

    /// Recompute every body's derived values against the observer.
    ///
    /// `observer_local` must be in the same frame as `positions`, i.e.
    /// taken after the origin coordinator's tick for this step.
    pub fn tick(&mut self, observer_local: DVec3, positions: &impl PositionSource) -> BubbleStats {
        self.active = self.shared.get();
        let config = self.active;
        let mut stats = BubbleStats::default();

        for (entity, (descriptor, metrics)) in self
            .world
            .query_mut::<(&mut SpatialBodyDescriptor, &BodyMetrics)>()
        {
            let handle = BodyHandle(entity);
            let position = descriptor
                .tracked
                .and_then(|tracked| positions.local_position(tracked));

            let Some(position) = position else {
                if self.stale_warned.insert(handle) {
                    log::warn!(
                        "Body {} has no tracked position, keeping last scale values",
                        descriptor.id
                    );
                }
                continue;
            };

            let distance = position.distance(observer_local);
            let sample = bubble::evaluate(metrics, distance, &config);
            descriptor.current_scale_factor = sample.scale_factor;
            descriptor.current_influence = sample.influence;
            stats.record(bubble::classify(distance, &config));
        }

        log::debug!(
            "Scaling tick: {} core, {} falloff, {} outside",
            stats.core_count,
            stats.falloff_count,
            stats.outside_count
        );
        self.last_stats = stats;
        stats
    }

    /// Derived values from the most recent tick.
    pub fn query_scale(&self, handle: BodyHandle) -> Option<ScaleSample> {
        self.world
            .get::<&SpatialBodyDescriptor>(handle.0)
            .ok()
            .map(|d| d.sample())
    }

    pub fn descriptor(&self, handle: BodyHandle) -> Option<SpatialBodyDescriptor> {
        self.world
            .get::<&SpatialBodyDescriptor>(handle.0)
            .ok()
            .map(|d| (*d).clone())
    }

    /// Snapshot of every descriptor, ordered by id.
    pub fn descriptors(&self) -> Vec<SpatialBodyDescriptor> {
        let mut all: Vec<SpatialBodyDescriptor> = self
            .world
            .query::<&SpatialBodyDescriptor>()
            .iter()
            .map(|(_, d)| d.clone())
            .collect();
        all.sort_by_key(|d| d.id);
        all
    }
}

impl Default for SpatialScalingEngine {
    fn default() -> Self {
        Self::new(BubbleConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::origin::{OriginRebaseCoordinator, RebaseConfig};

    fn setup() -> (OriginRebaseCoordinator, SpatialScalingEngine) {
        let origin = OriginRebaseCoordinator::new(RebaseConfig {
            threshold: 1e12,
            sector_size: 50_000.0,
        });
        (origin, SpatialScalingEngine::default())
    }

    #[test]
    fn register_rejects_non_positive_sizes() {
        let (mut origin, mut scaling) = setup();
        let t = origin.register_tracked_position(1);
        let bad = SpatialBodyDescriptor::new(1, t, 0.0, 1000.0, 10_000.0);
        assert!(matches!(
            scaling.register_body(bad),
            Err(ConfigError::NonPositive {
                field: "true_physical_radius",
                ..
            })
        ));
        let bad = SpatialBodyDescriptor::new(1, t, 1.0, 1000.0, -1.0);
        assert!(scaling.register_body(bad).is_err());
        assert_eq!(scaling.body_count(), 0);
    }

    #[test]
    fn unticked_body_reports_defaults() {
        let (mut origin, mut scaling) = setup();
        let t = origin.register_tracked_position(1);
        let h = scaling
            .register_body(SpatialBodyDescriptor::new(1, t, 6371.0, 1000.0, 10_000.0))
            .unwrap();
        assert_eq!(scaling.query_scale(h), Some(ScaleSample::UNTICKED));
    }

    #[test]
    fn earth_inside_bubble() {
        let (mut origin, mut scaling) = setup();
        let t = origin.register_tracked_position_at(1, DVec3::new(0.0, 0.0, 5_000.0), DVec3::ZERO);
        let h = scaling
            .register_body(SpatialBodyDescriptor::new(1, t, 6371.0, 1000.0, 10_000.0))
            .unwrap();

        let stats = scaling.tick(DVec3::ZERO, &origin);
        let sample = scaling.query_scale(h).unwrap();
        assert_eq!(sample.influence, 1.0);
        assert_eq!(sample.scale_factor, 1.0);
        assert_eq!(stats.core_count, 1);
    }

    #[test]
    fn config_swap_takes_effect_next_tick() {
        let (mut origin, mut scaling) = setup();
        let t = origin.register_tracked_position_at(1, DVec3::new(50_000.0, 0.0, 0.0), DVec3::ZERO);
        let h = scaling
            .register_body(SpatialBodyDescriptor::new(1, t, 10.0, 1.0, 1.0))
            .unwrap();

        scaling.tick(DVec3::ZERO, &origin);
        assert!(scaling.query_scale(h).unwrap().influence < 1.0);

        let handle = scaling.shared_config();
        handle
            .set(BubbleConfig {
                inner_radius: 100_000.0,
                outer_radius: 200_000.0,
                ..Default::default()
            })
            .unwrap();
        // Not applied until the next tick.
        assert_eq!(scaling.bubble_config(), BubbleConfig::default());

        scaling.tick(DVec3::ZERO, &origin);
        assert_eq!(scaling.query_scale(h).unwrap().influence, 1.0);
        assert_eq!(scaling.bubble_config().inner_radius, 100_000.0);
    }

    #[test]
    fn invalid_config_is_rejected_and_kept() {
        let scaling = SpatialScalingEngine::default();
        let bad = BubbleConfig {
            inner_radius: 10.0,
            outer_radius: 5.0,
            ..Default::default()
        };
        assert!(scaling.set_bubble_config(bad).is_err());
        assert_eq!(scaling.shared_config().get(), BubbleConfig::default());
    }

    #[test]
    fn stale_tracked_handle_keeps_last_values() {
        let (mut origin, mut scaling) = setup();
        let t =
            origin.register_tracked_position_at(1, DVec3::new(127_420.0, 0.0, 0.0), DVec3::ZERO);
        let h = scaling
            .register_body(SpatialBodyDescriptor::new(1, t, 6371.0, 1000.0, 10_000.0))
            .unwrap();
        scaling.tick(DVec3::ZERO, &origin);
        let before = scaling.query_scale(h).unwrap();
        assert!((before.scale_factor - 0.5).abs() < 1e-9);

        origin.unregister_tracked_position(t);
        let stats = scaling.tick(DVec3::ZERO, &origin);
        assert_eq!(scaling.query_scale(h), Some(before));
        assert_eq!(stats.total(), 0);
    }

    #[test]
    fn unregister_removes_body() {
        let (mut origin, mut scaling) = setup();
        let t = origin.register_tracked_position(1);
        let h = scaling
            .register_body(SpatialBodyDescriptor::new(1, t, 1.0, 1.0, 1.0))
            .unwrap();
        assert!(scaling.unregister_body(h));
        assert!(!scaling.unregister_body(h));
        assert!(scaling.query_scale(h).is_none());
    }

    #[test]
    fn descriptors_sorted_by_id() {
        let (mut origin, mut scaling) = setup();
        for id in [30, 10, 20] {
            let t = origin.register_tracked_position(id);
            scaling
                .register_body(SpatialBodyDescriptor::new(id, t, 1.0, 1.0, 1.0))
                .unwrap();
        }
        let ids: Vec<u64> = scaling.descriptors().iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![10, 20, 30]);
    }
}
