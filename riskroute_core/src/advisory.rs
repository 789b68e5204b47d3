//! Route metrics and severity-classified warnings.

use crate::config::{AdvisoryConfig, RoutingConfig};
use crate::graph::EdgeSnapshot;
use crate::router::RiskProfile;
use serde::{Deserialize, Serialize};

/// Warning severity, least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningLevel {
    Info,
    Caution,
    Warning,
    Critical,
}

/// One warning attached to a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteWarning {
    pub level: WarningLevel,
    pub message: String,
    /// Recommended actions, most important first
    pub actions: Vec<String>,
}

impl RouteWarning {
    fn new(level: WarningLevel, message: String, actions: &[&str]) -> Self {
        Self {
            level,
            message,
            actions: actions.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// Aggregate metrics of a path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteMetrics {
    pub distance_m: f64,
    /// Length-weighted mean of edge risk
    pub average_risk: f64,
    pub max_risk: f64,
    pub estimated_time_min: f64,
}

/// Computes distance, risk and travel time for the edges of a path.
///
/// Each edge is driven at `base_speed_kmh × (1 − hazard_speed_reduction × risk)`.
pub fn compute_metrics(edges: &[EdgeSnapshot], config: &RoutingConfig) -> RouteMetrics {
    let mut metrics = RouteMetrics::default();
    let mut risk_length = 0.0;
    let mut time_min = 0.0;

    for edge in edges {
        metrics.distance_m += edge.length_m;
        risk_length += edge.risk_score * edge.length_m;
        metrics.max_risk = metrics.max_risk.max(edge.risk_score);

        let speed_kmh = config.base_speed_kmh * (1.0 - config.hazard_speed_reduction * edge.risk_score);
        let meters_per_min = speed_kmh.max(1.0) * 1000.0 / 60.0;
        time_min += edge.length_m / meters_per_min;
    }

    if metrics.distance_m > 0.0 {
        metrics.average_risk = risk_length / metrics.distance_m;
    }
    metrics.estimated_time_min = time_min;
    metrics
}

/// Classifies a route into warnings, most severe first. A route without
/// meaningful risk gets none.
pub fn classify(metrics: &RouteMetrics, profile: RiskProfile, config: &AdvisoryConfig) -> Vec<RouteWarning> {
    let max_pct = metrics.max_risk * 100.0;
    let avg_pct = metrics.average_risk * 100.0;
    let mut warnings = Vec::new();

    if metrics.max_risk >= config.critical_max_risk {
        warnings.push(RouteWarning::new(
            WarningLevel::Critical,
            format!("Route crosses a segment at critical flood risk ({max_pct:.0}%)"),
            &[
                "Do not attempt this route",
                "Wait for conditions to improve or pick another destination",
                "Contact emergency services if already stranded",
            ],
        ));
    } else if metrics.max_risk >= config.warning_max_risk || metrics.average_risk >= config.warning_avg_risk {
        warnings.push(RouteWarning::new(
            WarningLevel::Warning,
            format!("High flood risk along the route (max {max_pct:.0}%, average {avg_pct:.0}%)"),
            &["Avoid travel if possible", "Never drive into moving water"],
        ));
    } else if metrics.max_risk >= config.caution_max_risk || metrics.average_risk >= config.caution_avg_risk {
        warnings.push(RouteWarning::new(
            WarningLevel::Caution,
            format!("Moderate flood risk on parts of the route (max {max_pct:.0}%)"),
            &["Drive slowly through standing water", "Check for updates before leaving"],
        ));
    } else if metrics.max_risk > config.info_max_risk {
        warnings.push(RouteWarning::new(
            WarningLevel::Info,
            format!("Minor hazards reported along the route (max {max_pct:.0}%)"),
            &["Monitor hazard updates"],
        ));
    }

    if profile == RiskProfile::Fastest && metrics.max_risk >= config.caution_max_risk {
        warnings.push(RouteWarning::new(
            WarningLevel::Info,
            "The fastest profile does not avoid flooded roads".to_string(),
            &["Request the safest profile for a lower-risk alternative"],
        ));
    }

    warnings.sort_by(|a, b| b.level.cmp(&a.level));
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeRef, NodeId};
    use approx::assert_relative_eq;

    fn edge(length_m: f64, risk_score: f64) -> EdgeSnapshot {
        EdgeSnapshot {
            edge_ref: EdgeRef::new(NodeId(0), NodeId(1), 0),
            length_m,
            risk_score,
            last_fused_at: None,
        }
    }

    fn metrics(max_risk: f64, average_risk: f64) -> RouteMetrics {
        RouteMetrics {
            distance_m: 1000.0,
            average_risk,
            max_risk,
            estimated_time_min: 1.5,
        }
    }

    #[test]
    fn test_metrics_are_length_weighted() {
        let config = RoutingConfig::default();
        let m = compute_metrics(&[edge(900.0, 0.0), edge(100.0, 0.5)], &config);
        assert_relative_eq!(m.distance_m, 1000.0);
        assert_relative_eq!(m.average_risk, 0.05, epsilon = 1e-12);
        assert_relative_eq!(m.max_risk, 0.5);
    }

    #[test]
    fn test_travel_time_slows_with_risk() {
        let config = RoutingConfig::default();
        let clear = compute_metrics(&[edge(1000.0, 0.0)], &config);
        // 1 km at 40 km/h
        assert_relative_eq!(clear.estimated_time_min, 1.5, epsilon = 1e-9);
        let flooded = compute_metrics(&[edge(1000.0, 0.5)], &config);
        assert_relative_eq!(flooded.estimated_time_min, 1.5 / 0.7, epsilon = 1e-9);
    }

    #[test]
    fn test_empty_path_has_zero_metrics() {
        let m = compute_metrics(&[], &RoutingConfig::default());
        assert_eq!(m, RouteMetrics::default());
    }

    #[test]
    fn test_no_risk_no_warnings() {
        let warnings = classify(&metrics(0.0, 0.0), RiskProfile::Balanced, &AdvisoryConfig::default());
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_critical_says_do_not_attempt() {
        let warnings = classify(&metrics(0.85, 0.2), RiskProfile::Balanced, &AdvisoryConfig::default());
        assert_eq!(warnings[0].level, WarningLevel::Critical);
        assert_eq!(warnings[0].actions[0], "Do not attempt this route");
    }

    #[test]
    fn test_levels_follow_thresholds() {
        let config = AdvisoryConfig::default();
        let level = |max, avg| classify(&metrics(max, avg), RiskProfile::Safest, &config)[0].level;
        assert_eq!(level(0.65, 0.1), WarningLevel::Warning);
        assert_eq!(level(0.2, 0.45), WarningLevel::Warning);
        assert_eq!(level(0.35, 0.05), WarningLevel::Caution);
        assert_eq!(level(0.1, 0.02), WarningLevel::Info);
    }

    #[test]
    fn test_fastest_profile_adds_hint_after_main_warning() {
        let warnings = classify(&metrics(0.7, 0.3), RiskProfile::Fastest, &AdvisoryConfig::default());
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0].level, WarningLevel::Warning);
        assert_eq!(warnings[1].level, WarningLevel::Info);
        assert!(warnings.windows(2).all(|w| w[0].level >= w[1].level));
    }
}
