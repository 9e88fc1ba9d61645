//! Deepfield Core - floating-origin spatial core and save service
//!
//! Lets a single observer travel across interstellar distances without
//! losing floating-point precision, and stores player and world state
//! durably across sessions.
//!
//! # Architecture
//!
//! Each simulation step runs a fixed pipeline on one thread:
//! - **Origin** ([`origin::OriginRebaseCoordinator`]): keeps tracked positions
//!   near the local origin, rebasing them when the observer drifts too far
//! - **Scaling** ([`scaling::SpatialScalingEngine`]): derives influence and
//!   apparent scale for every registered body from its distance to the observer
//!
//! Persistence ([`persistence::PersistenceService`]) runs beside the
//! pipeline on a tokio runtime and never blocks a step.
//!
//! # Example
//!
//! ```rust,no_run
//! use deepfield_core::prelude::*;
//! use glam::DVec3;
//!
//! let mut engine = SimulationEngine::new(&CoreConfig::default());
//! let (_, earth) = engine
//!     .spawn_body(1, DVec3::new(0.0, 0.0, 5_000.0), DVec3::ZERO, 6371.0, 1000.0, 10_000.0)
//!     .unwrap();
//!
//! let mut observer = DVec3::ZERO;
//! loop {
//!     observer += DVec3::new(0.0, 0.0, 250.0);
//!     let report = engine.step(observer);
//!     observer = report.observer_local;
//!     let _sample = engine.scaling.query_scale(earth);
//! }
//! ```

pub mod engine;
pub mod origin;
pub mod persistence;
pub mod scaling;

pub use deepfield_logic::ConfigError;

/// Commonly used types for convenient importing
pub mod prelude {
    pub use crate::engine::{SimulationEngine, SpatialSnapshot, StepReport};
    pub use crate::origin::{
        ObserverState, OriginRebaseCoordinator, RebaseCursor, RebaseEvent, TrackedHandle,
    };
    pub use crate::persistence::{
        LoadError, PersistenceConfig, PersistenceService, PlayerPersistentRecord, SaveError,
        SaveReceipt, WorldPersistentRecord,
    };
    pub use crate::scaling::{BodyHandle, SpatialBodyDescriptor, SpatialScalingEngine};
    pub use deepfield_logic::bubble::{BubbleConfig, ScaleSample};
    pub use deepfield_logic::config::CoreConfig;
    pub use deepfield_logic::sector::SectorId;
    pub use deepfield_logic::ConfigError;
}
