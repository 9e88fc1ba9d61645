//! Simulation engine - runs the spatial pipeline in a fixed order

use glam::DVec3;
use serde::{Deserialize, Serialize};

use deepfield_logic::bubble::{BubbleConfig, BubbleStats};
use deepfield_logic::config::{validate_config, CoreConfig};
use deepfield_logic::ConfigError;

use crate::origin::{
    OriginRebaseCoordinator, OriginSnapshot, RebaseConfig, RebaseEvent, TrackedHandle,
};
use crate::persistence::{PersistenceEvent, PersistenceEvents};
use crate::scaling::{BodyHandle, SpatialBodyDescriptor, SpatialScalingEngine};

/// Outcome of one simulation step
#[derive(Debug, Clone)]
pub struct StepReport {
    /// Step counter, starting at 1
    pub tick: u64,
    /// Rebase performed this step, if any
    pub rebase: Option<RebaseEvent>,
    /// Observer position after any rebase
    pub observer_local: DVec3,
    /// Band distribution of bodies this step
    pub stats: BubbleStats,
    /// Save results that completed since the last step
    pub persistence: Vec<PersistenceEvent>,
}

/// Serializable state of the spatial pipeline for a transport layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialSnapshot {
    pub tick: u64,
    pub origin: OriginSnapshot,
    pub bodies: Vec<SpatialBodyDescriptor>,
    pub bubble: BubbleConfig,
}

/// Composes origin rebasing and bubble scaling
pub struct SimulationEngine {
    /// Floating origin and sector grid
    pub origin: OriginRebaseCoordinator,
    /// Per-body influence and scale
    pub scaling: SpatialScalingEngine,
    tick: u64,
    persistence: Option<PersistenceEvents>,
}

impl SimulationEngine {
    /// Create an engine from configuration.
    ///
    /// Invalid sections are logged and replaced by their defaults.
    pub fn new(config: &CoreConfig) -> Self {
        for error in validate_config(config) {
            log::warn!("Config problem: {}", error);
        }
        Self {
            origin: OriginRebaseCoordinator::new(RebaseConfig::from_core(config)),
            scaling: SpatialScalingEngine::new(config.bubble),
            tick: 0,
            persistence: None,
        }
    }

    /// Number of completed steps
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Route save results from a persistence service into step reports
    pub fn attach_persistence(&mut self, events: PersistenceEvents) {
        self.persistence = Some(events);
    }

    /// Register a tracked position and a scaled body for it
    pub fn spawn_body(
        &mut self,
        id: u64,
        local: DVec3,
        velocity: DVec3,
        true_physical_radius: f64,
        apparent_reference_radius: f64,
        reference_distance: f64,
    ) -> Result<(TrackedHandle, BodyHandle), ConfigError> {
        let tracked = self.origin.register_tracked_position_at(id, local, velocity);
        let descriptor = SpatialBodyDescriptor::new(
            id,
            tracked,
            true_physical_radius,
            apparent_reference_radius,
            reference_distance,
        );
        match self.scaling.register_body(descriptor) {
            Ok(body) => Ok((tracked, body)),
            Err(e) => {
                self.origin.unregister_tracked_position(tracked);
                Err(e)
            }
        }
    }

    /// Remove a body and its tracked position
    pub fn despawn_body(&mut self, tracked: TrackedHandle, body: BodyHandle) {
        self.scaling.unregister_body(body);
        self.origin.unregister_tracked_position(tracked);
    }

    /// Run one step: rebase, then scale against the rebased observer.
    pub fn step(&mut self, observer_local: DVec3) -> StepReport {
        self.tick += 1;

        let rebase = self.origin.tick(observer_local);
        let observer_local = self.origin.observer().local_position;
        let stats = self.scaling.tick(observer_local, &self.origin);

        let persistence = self
            .persistence
            .as_mut()
            .map(|events| events.drain())
            .unwrap_or_default();

        StepReport {
            tick: self.tick,
            rebase,
            observer_local,
            stats,
            persistence,
        }
    }

    pub fn spatial_snapshot(&self) -> SpatialSnapshot {
        SpatialSnapshot {
            tick: self.tick,
            origin: self.origin.snapshot(),
            bodies: self.scaling.descriptors(),
            bubble: self.scaling.bubble_config(),
        }
    }
}

impl Default for SimulationEngine {
    fn default() -> Self {
        Self::new(&CoreConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_engine() -> SimulationEngine {
        let mut config = CoreConfig::default();
        config.bubble.inner_radius = 1_000.0;
        config.bubble.outer_radius = 100_000.0;
        SimulationEngine::new(&config)
    }

    #[test]
    fn scaling_sees_rebased_positions() {
        let mut engine = small_engine();
        // threshold = 500
        let (_, body) = engine
            .spawn_body(1, DVec3::new(800.0, 0.0, 0.0), DVec3::ZERO, 10.0, 1.0, 1.0)
            .unwrap();

        let report = engine.step(DVec3::new(600.0, 0.0, 0.0));
        assert!(report.rebase.is_some());
        assert_eq!(report.observer_local, DVec3::ZERO);
        // Body is 200 m from the observer in both frames.
        assert_eq!(engine.scaling.query_scale(body).unwrap().influence, 1.0);
        assert_eq!(report.stats.core_count, 1);
    }

    #[test]
    fn failed_spawn_leaves_no_tracked_position() {
        let mut engine = small_engine();
        assert!(engine
            .spawn_body(1, DVec3::ZERO, DVec3::ZERO, -1.0, 1.0, 1.0)
            .is_err());
        assert_eq!(engine.origin.tracked_count(), 0);
    }

    #[test]
    fn tick_counter_advances() {
        let mut engine = small_engine();
        engine.step(DVec3::ZERO);
        let report = engine.step(DVec3::ZERO);
        assert_eq!(report.tick, 2);
        assert_eq!(engine.tick_count(), 2);
        assert!(report.persistence.is_empty());
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let mut engine = small_engine();
        engine
            .spawn_body(4, DVec3::new(10.0, 0.0, 0.0), DVec3::Y, 1.0, 1.0, 1.0)
            .unwrap();
        engine.step(DVec3::ZERO);
        let snap = engine.spatial_snapshot();
        let json = serde_json::to_string(&snap).unwrap();
        let back: SpatialSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.bodies.len(), 1);
        assert_eq!(back.tick, 1);
        assert_eq!(back.origin, snap.origin);
    }
}
