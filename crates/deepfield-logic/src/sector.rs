//! Integer sector grid over absolute universe coordinates.
//!
//! The universe is cut into axis-aligned cubes of `sector_size` meters.
//! A sector is addressed by the integer coordinates of its minimum corner
//! divided by the sector size, so sector `(0, 0, 0)` spans
//! `[0, size)` on every axis and sector `(-1, 0, 0)` spans `[-size, 0)`
//! on x.
//!
//! ```text
//!        y
//!        │  (-1, 1) │ (0, 1) │ (1, 1)
//!        │ ─────────┼────────┼───────
//!        │  (-1, 0) │ (0, 0) │ (1, 0)
//!        └──────────────────────────── x
//! ```
//!
//! Adjacency uses Chebyshev distance: the 26 sectors sharing a face,
//! edge, or corner with a sector are adjacent to it.

use glam::DVec3;
use serde::{Deserialize, Serialize};

/// Integer grid coordinates of a sector.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SectorId {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl SectorId {
    pub const ORIGIN: Self = Self { x: 0, y: 0, z: 0 };

    pub fn new(x: i64, y: i64, z: i64) -> Self {
        Self { x, y, z }
    }

    /// Largest per-axis distance between two sectors.
    pub fn chebyshev_distance(&self, other: &SectorId) -> u64 {
        let dx = self.x.abs_diff(other.x);
        let dy = self.y.abs_diff(other.y);
        let dz = self.z.abs_diff(other.z);
        dx.max(dy).max(dz)
    }

    /// True for the sector itself and its 26 neighbors.
    pub fn is_within_one(&self, other: &SectorId) -> bool {
        self.chebyshev_distance(other) <= 1
    }

    /// The 26 neighbors of this sector (excluding itself).
    pub fn neighbors(&self) -> impl Iterator<Item = SectorId> + '_ {
        (-1i64..=1).flat_map(move |dx| {
            (-1i64..=1).flat_map(move |dy| {
                (-1i64..=1).filter_map(move |dz| {
                    if dx == 0 && dy == 0 && dz == 0 {
                        None
                    } else {
                        Some(SectorId::new(self.x + dx, self.y + dy, self.z + dz))
                    }
                })
            })
        })
    }
}

impl std::fmt::Display for SectorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}, {}]", self.x, self.y, self.z)
    }
}

/// Sector containing an absolute world position.
///
/// Non-finite coordinates collapse to the origin sector.
pub fn sector_for(world_position: DVec3, sector_size: f64) -> SectorId {
    let axis = |v: f64| -> i64 {
        let cell = (v / sector_size).floor();
        if cell.is_finite() {
            cell as i64
        } else {
            0
        }
    };
    SectorId::new(
        axis(world_position.x),
        axis(world_position.y),
        axis(world_position.z),
    )
}

/// Absolute world position of a sector's minimum corner.
pub fn sector_origin(id: SectorId, sector_size: f64) -> DVec3 {
    DVec3::new(
        id.x as f64 * sector_size,
        id.y as f64 * sector_size,
        id.z as f64 * sector_size,
    )
}

/// Absolute world position of a sector's center.
pub fn sector_center(id: SectorId, sector_size: f64) -> DVec3 {
    sector_origin(id, sector_size) + DVec3::splat(sector_size * 0.5)
}
