//! Decay and calibration curves used by the fusion engine.
//!
//! - Temporal decay: exponential half-life with a hard horizon
//! - Spatial decay: Gaussian (stagnant water) or exponential (flowing water)
//! - Depth calibration: logistic curve from water depth to risk

use serde::{Deserialize, Serialize};

/// Weight multiplier for an observation of the given age.
///
/// `0.5^(age / half_life)` before the horizon, exactly zero at or after it.
/// Ages below zero (timestamps slightly ahead of the local clock) count as
/// fresh.
pub fn temporal_decay(age_s: f64, half_life_s: f64, horizon_s: f64) -> f64 {
    let age = age_s.max(0.0);
    if age >= horizon_s || half_life_s <= 0.0 {
        return 0.0;
    }
    0.5f64.powf(age / half_life_s)
}

/// Shape of the spatial falloff around a point observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpatialDecayKind {
    /// `exp(-(d/σ)²)` with σ = radius / 3
    Gaussian,
    /// `exp(-λd)` with λ = 3 / radius
    Exponential,
}

/// Water regime reported with an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowRegime {
    Stagnant,
    Flowing,
}

impl FlowRegime {
    pub fn decay_kind(self) -> SpatialDecayKind {
        match self {
            FlowRegime::Stagnant => SpatialDecayKind::Gaussian,
            FlowRegime::Flowing => SpatialDecayKind::Exponential,
        }
    }
}

/// Contribution multiplier at `distance_m` from the observation.
///
/// 1 at the source, non-increasing, strictly positive up to and including
/// `radius_m`, zero beyond it.
pub fn spatial_decay(kind: SpatialDecayKind, distance_m: f64, radius_m: f64) -> f64 {
    let d = distance_m.max(0.0);
    if radius_m <= 0.0 {
        return if d == 0.0 { 1.0 } else { 0.0 };
    }
    if d > radius_m {
        return 0.0;
    }
    match kind {
        SpatialDecayKind::Gaussian => {
            let sigma = radius_m / 3.0;
            (-(d / sigma).powi(2)).exp()
        }
        SpatialDecayKind::Exponential => {
            let lambda = 3.0 / radius_m;
            (-lambda * d).exp()
        }
    }
}

/// Logistic calibration from water depth (meters) to risk.
///
/// The midpoint sits at the depth where ordinary vehicles lose traction, and
/// the steepness puts risk at or above 0.95 within 0.3 m above that.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthCalibration {
    /// Depth at which risk = 0.5 (x0), meters
    pub midpoint_m: f64,
    /// Logistic slope (k), per meter
    pub steepness: f64,
}

impl Default for DepthCalibration {
    fn default() -> Self {
        Self {
            midpoint_m: 0.3,
            steepness: 10.0,
        }
    }
}

impl DepthCalibration {
    /// `1 / (1 + exp(-k (depth - x0)))`
    pub fn risk(&self, depth_m: f64) -> f64 {
        1.0 / (1.0 + (-self.steepness * (depth_m - self.midpoint_m)).exp())
    }
}
