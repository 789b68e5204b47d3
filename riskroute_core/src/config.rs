//! Typed configuration for every RiskRoute component.
//!
//! All sections have working defaults; a JSON file may override any subset of
//! fields. `validate()` must pass before the runtime is built.

use crate::decay::{DepthCalibration, SpatialDecayKind};
use crate::observation::SourceKind;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Root configuration object, passed explicitly at construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskRouteConfig {
    pub fusion: FusionConfig,
    pub spatial: SpatialConfig,
    pub routing: RoutingConfig,
    pub cache: CacheConfig,
    pub runtime: RuntimeConfig,
}

impl RiskRouteConfig {
    /// Loads a JSON file; absent fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: RiskRouteConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.fusion.validate()?;
        self.spatial.validate()?;
        self.routing.validate()?;
        self.cache.validate()?;
        self.runtime.validate()
    }
}

// ============================================================================
// FUSION
// ============================================================================

/// Relative trust in each source kind. Must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceWeights {
    pub official: f64,
    pub crowdsourced: f64,
    /// Valid even when no producer ever emits historical observations
    pub historical: f64,
}

impl Default for SourceWeights {
    fn default() -> Self {
        Self {
            official: 0.5,
            crowdsourced: 0.3,
            historical: 0.2,
        }
    }
}

impl SourceWeights {
    pub fn weight(&self, kind: SourceKind) -> f64 {
        match kind {
            SourceKind::Official => self.official,
            SourceKind::Crowdsourced => self.crowdsourced,
            SourceKind::Historical => self.historical,
        }
    }
}

/// Half-life and hard horizon for one source kind, seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KindDecay {
    pub half_life_s: f64,
    pub horizon_s: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalDecayConfig {
    pub official: KindDecay,
    pub crowdsourced: KindDecay,
    pub historical: KindDecay,
}

impl Default for TemporalDecayConfig {
    fn default() -> Self {
        const HOUR: f64 = 3600.0;
        const DAY: f64 = 24.0 * HOUR;
        Self {
            official: KindDecay { half_life_s: 3.0 * HOUR, horizon_s: DAY },
            crowdsourced: KindDecay { half_life_s: 0.5 * HOUR, horizon_s: 4.0 * HOUR },
            historical: KindDecay { half_life_s: 30.0 * DAY, horizon_s: 365.0 * DAY },
        }
    }
}

impl TemporalDecayConfig {
    pub fn for_kind(&self, kind: SourceKind) -> KindDecay {
        match kind {
            SourceKind::Official => self.official,
            SourceKind::Crowdsourced => self.crowdsourced,
            SourceKind::Historical => self.historical,
        }
    }
}

/// Configuration for the Hazard Fusion Engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub source_weights: SourceWeights,
    pub temporal_decay: TemporalDecayConfig,

    /// Falloff used when an observation does not report a flow regime
    pub spatial_decay: SpatialDecayKind,

    /// Radius of influence for point observations without their own radius
    pub default_radius_m: f64,

    pub depth: DepthCalibration,

    /// Boost per additional independent source kind
    pub corroboration_step: f64,

    /// Upper bound of the corroboration boost (at most 0.2)
    pub corroboration_cap: f64,

    /// Observations stamped further than this into the future are rejected
    pub max_future_skew_s: f64,

    /// Observation history / dedup ring capacity
    pub history_capacity: usize,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            source_weights: SourceWeights::default(),
            temporal_decay: TemporalDecayConfig::default(),
            spatial_decay: SpatialDecayKind::Gaussian,
            default_radius_m: 150.0,
            depth: DepthCalibration::default(),
            corroboration_step: 0.1,
            corroboration_cap: 0.2,
            max_future_skew_s: 300.0,
            history_capacity: 10_000,
        }
    }
}

impl FusionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let w = &self.source_weights;
        for (name, value) in [("official", w.official), ("crowdsourced", w.crowdsourced), ("historical", w.historical)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::invalid(format!("source weight {name}={value} outside [0, 1]")));
            }
        }
        let sum = w.official + w.crowdsourced + w.historical;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(ConfigError::invalid(format!("source weights sum to {sum}, expected 1.0")));
        }

        for kind in SourceKind::ALL {
            let d = self.temporal_decay.for_kind(kind);
            if !(d.half_life_s > 0.0 && d.horizon_s > 0.0 && d.horizon_s.is_finite()) {
                return Err(ConfigError::invalid(format!("temporal decay for {kind:?} must be positive and finite")));
            }
        }

        if !(self.default_radius_m > 0.0 && self.default_radius_m.is_finite()) {
            return Err(ConfigError::invalid("default_radius_m must be positive"));
        }

        let cal = &self.depth;
        if !(cal.steepness > 0.0 && cal.midpoint_m > 0.0) {
            return Err(ConfigError::invalid("depth calibration needs positive midpoint and steepness"));
        }
        if cal.risk(cal.midpoint_m + 0.3) < 0.95 {
            return Err(ConfigError::invalid(format!(
                "depth calibration too shallow: risk({:.2} m) = {:.3} < 0.95",
                cal.midpoint_m + 0.3,
                cal.risk(cal.midpoint_m + 0.3)
            )));
        }

        if !(0.0..=0.2).contains(&self.corroboration_cap) || self.corroboration_step < 0.0 {
            return Err(ConfigError::invalid("corroboration boost must stay within [0, 0.2]"));
        }
        if self.max_future_skew_s < 0.0 {
            return Err(ConfigError::invalid("max_future_skew_s must be non-negative"));
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::invalid("history_capacity must be positive"));
        }
        Ok(())
    }
}

// ============================================================================
// SPATIAL
// ============================================================================

/// Configuration for the Spatial Index grid sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatialConfig {
    pub target_edges_per_cell_min: f64,
    pub target_edges_per_cell_max: f64,
    /// Coarsest H3 resolution considered
    pub min_resolution: u8,
    /// Finest H3 resolution considered
    pub max_resolution: u8,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self {
            target_edges_per_cell_min: 2.0,
            target_edges_per_cell_max: 8.0,
            min_resolution: 4,
            max_resolution: 13,
        }
    }
}

impl SpatialConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.target_edges_per_cell_min > 0.0 && self.target_edges_per_cell_min <= self.target_edges_per_cell_max) {
            return Err(ConfigError::invalid("edges-per-cell band must satisfy 0 < min <= max"));
        }
        if self.min_resolution > self.max_resolution || self.max_resolution > 15 {
            return Err(ConfigError::invalid("H3 resolution range must satisfy min <= max <= 15"));
        }
        Ok(())
    }
}

// ============================================================================
// ROUTING
// ============================================================================

/// Meters of detour accepted per unit of risk, per profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilePenalties {
    pub safest: f64,
    pub balanced: f64,
    pub fastest: f64,
}

impl Default for ProfilePenalties {
    fn default() -> Self {
        Self {
            safest: 5000.0,
            balanced: 1000.0,
            fastest: 0.0,
        }
    }
}

/// Thresholds for route warnings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisoryConfig {
    pub critical_max_risk: f64,
    pub warning_max_risk: f64,
    pub warning_avg_risk: f64,
    pub caution_max_risk: f64,
    pub caution_avg_risk: f64,
    pub info_max_risk: f64,
}

impl Default for AdvisoryConfig {
    fn default() -> Self {
        Self {
            critical_max_risk: 0.8,
            warning_max_risk: 0.6,
            warning_avg_risk: 0.4,
            caution_max_risk: 0.3,
            caution_avg_risk: 0.15,
            info_max_risk: 0.05,
        }
    }
}

/// Configuration for the Risk-Aware Router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Edges at or above this risk are never routed through
    pub impassability_threshold: f64,
    pub penalties: ProfilePenalties,

    /// Maximum snapping distance from a coordinate to a node
    pub snap_max_distance_m: f64,

    /// A* expansion budget per request
    pub max_expanded_nodes: usize,

    /// Optional wall-clock budget per request
    pub search_timeout_ms: Option<u64>,

    /// Free-flow speed used for time estimates
    pub base_speed_kmh: f64,

    /// Fraction of speed lost on an edge with risk 1.0
    pub hazard_speed_reduction: f64,

    pub advisory: AdvisoryConfig,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            impassability_threshold: 0.9,
            penalties: ProfilePenalties::default(),
            snap_max_distance_m: 500.0,
            max_expanded_nodes: 200_000,
            search_timeout_ms: Some(2_000),
            base_speed_kmh: 40.0,
            hazard_speed_reduction: 0.6,
            advisory: AdvisoryConfig::default(),
        }
    }
}

impl RoutingConfig {
    pub fn search_timeout(&self) -> Option<Duration> {
        self.search_timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.impassability_threshold > 0.0 && self.impassability_threshold <= 1.0) {
            return Err(ConfigError::invalid("impassability_threshold must be in (0, 1]"));
        }
        let p = &self.penalties;
        for value in [p.safest, p.balanced, p.fastest] {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(ConfigError::invalid("profile penalties must be finite and non-negative"));
            }
        }
        if !(p.safest >= p.balanced && p.balanced >= p.fastest) {
            return Err(ConfigError::invalid("profile penalties must satisfy safest >= balanced >= fastest"));
        }
        if !(self.snap_max_distance_m > 0.0) {
            return Err(ConfigError::invalid("snap_max_distance_m must be positive"));
        }
        if self.max_expanded_nodes == 0 {
            return Err(ConfigError::invalid("max_expanded_nodes must be positive"));
        }
        if !(self.base_speed_kmh > 0.0) || !(0.0..1.0).contains(&self.hazard_speed_reduction) {
            return Err(ConfigError::invalid("speed model needs base_speed_kmh > 0 and reduction in [0, 1)"));
        }
        Ok(())
    }
}

// ============================================================================
// CACHE & RUNTIME
// ============================================================================

/// Node-lookup cache sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub node_cache_capacity: usize,
    pub node_cache_ttl_s: u64,
    /// Coordinate bucket size for cache keys
    pub node_cache_bucket_m: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            node_cache_capacity: 4096,
            node_cache_ttl_s: 300,
            node_cache_bucket_m: 10.0,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.node_cache_ttl_s)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node_cache_capacity == 0 || !(self.node_cache_bucket_m > 0.0) {
            return Err(ConfigError::invalid("node cache needs positive capacity and bucket size"));
        }
        Ok(())
    }
}

/// Fusion task scheduling and channel sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub tick_interval_ms: u64,
    /// Maximum envelopes drained per tick
    pub max_batch: usize,
    pub channel_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 5_000,
            max_batch: 1024,
            channel_capacity: 4096,
        }
    }
}

impl RuntimeConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 || self.max_batch == 0 || self.channel_capacity == 0 {
            return Err(ConfigError::invalid("tick interval, batch size and channel capacity must be positive"));
        }
        Ok(())
    }
}

/// Errors from loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConfigError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}
