//! Bubble-of-influence falloff and apparent-scale computation.
//!
//! Every registered body gets two derived values each tick, both driven
//! only by its distance to the observer:
//!
//! | Value | Range | Meaning |
//! |-------|-------|---------|
//! | `influence` | `0.0..=1.0` | How strongly the body participates in LOD / culling decisions |
//! | `scale_factor` | `min_scale_factor..=1.0` | Apparent size relative to its reference size |
//!
//! Influence is `1.0` inside the inner radius, `0.0` beyond the outer
//! radius, and falls off as `1 - t^falloff_exponent` in between, where
//! `t` is the normalized position inside the falloff shell. Downstream
//! LOD relies on influence never increasing with distance, which holds
//! for any exponent `>= 1`.
//!
//! # Usage
//!
//! ```
//! use deepfield_logic::bubble::{BodyMetrics, BubbleConfig, evaluate};
//!
//! let config = BubbleConfig::default();
//! let earth = BodyMetrics::new(6371.0, 1000.0, 10_000.0).unwrap();
//! let sample = evaluate(&earth, 5_000.0, &config);
//! assert_eq!(sample.influence, 1.0);
//! assert_eq!(sample.scale_factor, 1.0);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{require_positive, ConfigError};

/// Floor applied to distances before dividing, so a body sitting on the
/// observer does not produce an infinite apparent size.
pub const DISTANCE_EPSILON: f64 = 1e-6;

/// Tunable shape of the bubble of influence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BubbleConfig {
    /// Full influence at or inside this distance (meters).
    pub inner_radius: f64,
    /// Zero influence at or beyond this distance (meters).
    pub outer_radius: f64,
    /// Lower clamp on the apparent scale factor, in `(0, 1]`.
    pub min_scale_factor: f64,
    /// Falloff curve exponent; `1.0` is linear.
    pub falloff_exponent: f64,
}

impl Default for BubbleConfig {
    fn default() -> Self {
        Self {
            inner_radius: 10_000.0,
            outer_radius: 1_000_000.0,
            min_scale_factor: 0.01,
            falloff_exponent: 2.0,
        }
    }
}

impl BubbleConfig {
    /// Return every problem with this config.
    pub fn issues(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if let Err(e) = require_positive("inner_radius", self.inner_radius) {
            errors.push(e);
        }
        if let Err(e) = require_positive("outer_radius", self.outer_radius) {
            errors.push(e);
        }
        if self.inner_radius.is_finite()
            && self.outer_radius.is_finite()
            && self.inner_radius >= self.outer_radius
        {
            errors.push(ConfigError::InvertedBubble {
                inner: self.inner_radius,
                outer: self.outer_radius,
            });
        }
        if !(self.min_scale_factor > 0.0 && self.min_scale_factor <= 1.0) {
            errors.push(ConfigError::MinScaleOutOfRange(self.min_scale_factor));
        }
        if !(self.falloff_exponent.is_finite() && self.falloff_exponent >= 1.0) {
            errors.push(ConfigError::FalloffBelowOne(self.falloff_exponent));
        }

        errors
    }

    /// Validate, returning the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.issues().into_iter().next() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Thickness of the falloff shell.
    pub fn shell_width(&self) -> f64 {
        self.outer_radius - self.inner_radius
    }
}

/// Static size parameters of a body, validated on construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BodyMetrics {
    /// Physical radius of the body.
    pub true_radius: f64,
    /// Apparent radius that maps to a scale factor of `1.0`.
    pub apparent_reference_radius: f64,
    /// Distance at which the apparent size was authored.
    pub reference_distance: f64,
}

impl BodyMetrics {
    pub fn new(
        true_radius: f64,
        apparent_reference_radius: f64,
        reference_distance: f64,
    ) -> Result<Self, ConfigError> {
        let metrics = Self {
            true_radius,
            apparent_reference_radius,
            reference_distance,
        };
        metrics.validate()?;
        Ok(metrics)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("true_physical_radius", self.true_radius)?;
        require_positive("apparent_reference_radius", self.apparent_reference_radius)?;
        require_positive("reference_distance", self.reference_distance)
    }
}

/// Derived per-tick values for one body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleSample {
    pub scale_factor: f64,
    pub influence: f64,
}

impl ScaleSample {
    /// Value reported before a body has been ticked.
    pub const UNTICKED: Self = Self {
        scale_factor: 1.0,
        influence: 0.0,
    };
}

/// Coarse position of a distance relative to the bubble shells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InfluenceBand {
    /// Inside the inner radius, full influence.
    Core,
    /// Between inner and outer radius, partial influence.
    Falloff,
    /// Beyond the outer radius, no influence.
    Outside,
}

/// NaN distances are treated as infinitely far; negatives as zero.
fn sanitize_distance(distance: f64) -> f64 {
    if distance.is_nan() {
        f64::INFINITY
    } else {
        distance.max(0.0)
    }
}

/// Influence of a body at `distance` from the observer.
pub fn influence(distance: f64, config: &BubbleConfig) -> f64 {
    let distance = sanitize_distance(distance);
    if distance <= config.inner_radius {
        return 1.0;
    }
    if distance >= config.outer_radius {
        return 0.0;
    }
    let t = (distance - config.inner_radius) / config.shell_width();
    (1.0 - t.powf(config.falloff_exponent)).clamp(0.0, 1.0)
}

/// Apparent size of a body projected back to its reference distance.
pub fn apparent_size(metrics: &BodyMetrics, distance: f64) -> f64 {
    let distance = sanitize_distance(distance).max(DISTANCE_EPSILON);
    (metrics.true_radius / distance) * metrics.reference_distance
}

/// Clamped apparent-scale factor of a body at `distance`.
pub fn scale_factor(metrics: &BodyMetrics, distance: f64, config: &BubbleConfig) -> f64 {
    let ratio = apparent_size(metrics, distance) / metrics.apparent_reference_radius;
    if ratio.is_nan() {
        return config.min_scale_factor;
    }
    ratio.clamp(config.min_scale_factor, 1.0)
}

/// Compute both derived values for a body.
pub fn evaluate(metrics: &BodyMetrics, distance: f64, config: &BubbleConfig) -> ScaleSample {
    ScaleSample {
        scale_factor: scale_factor(metrics, distance, config),
        influence: influence(distance, config),
    }
}

/// Classify a distance into a bubble band.
pub fn classify(distance: f64, config: &BubbleConfig) -> InfluenceBand {
    let distance = sanitize_distance(distance);
    if distance <= config.inner_radius {
        InfluenceBand::Core
    } else if distance >= config.outer_radius {
        InfluenceBand::Outside
    } else {
        InfluenceBand::Falloff
    }
}

/// Band distribution for a batch of bodies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BubbleStats {
    pub core_count: usize,
    pub falloff_count: usize,
    pub outside_count: usize,
}

impl BubbleStats {
    pub fn record(&mut self, band: InfluenceBand) {
        match band {
            InfluenceBand::Core => self.core_count += 1,
            InfluenceBand::Falloff => self.falloff_count += 1,
            InfluenceBand::Outside => self.outside_count += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.core_count + self.falloff_count + self.outside_count
    }
}

/// Classify a batch of distances.
pub fn classify_batch(distances: &[f64], config: &BubbleConfig) -> BubbleStats {
    let mut stats = BubbleStats::default();
    for &d in distances {
        stats.record(classify(d, config));
    }
    stats
}
