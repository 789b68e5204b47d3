//! The Risk-Aware Router.
//!
//! Snaps coordinates to graph nodes through a shared lookup cache, runs A*
//! with `edge_cost = length_m + risk × risk_penalty_m`, and turns the path
//! into metrics plus severity-classified warnings.
//!
//! Risk and distance only become comparable through the per-profile penalty
//! (meters of detour accepted per unit of risk). Edges at or above the
//! impassability threshold are never traversed, whatever the profile.

use crate::advisory::{classify, compute_metrics, RouteWarning, WarningLevel};
use crate::astar::{astar, SearchLimits};
use crate::config::{CacheConfig, ProfilePenalties, RoutingConfig};
use crate::geodesy::Coordinate;
use crate::graph::{EdgeRef, EdgeSnapshot, NodeId, RoadGraph};
use crate::node_cache::{CacheStats, NodeLookupCache};
use crate::spatial::{SpatialError, SpatialIndex};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// REQUEST / RESULT TYPES
// ============================================================================

/// Risk tolerance of a request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskProfile {
    Safest,
    Balanced,
    Fastest,
    /// Caller-supplied meters per unit of risk
    Custom { risk_penalty_m: f64 },
}

impl RiskProfile {
    /// Meters of detour accepted per unit of risk.
    pub fn risk_penalty_m(&self, penalties: &ProfilePenalties) -> f64 {
        match *self {
            RiskProfile::Safest => penalties.safest,
            RiskProfile::Balanced => penalties.balanced,
            RiskProfile::Fastest => penalties.fastest,
            RiskProfile::Custom { risk_penalty_m } => risk_penalty_m,
        }
    }
}

impl fmt::Display for RiskProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskProfile::Safest => f.write_str("safest"),
            RiskProfile::Balanced => f.write_str("balanced"),
            RiskProfile::Fastest => f.write_str("fastest"),
            RiskProfile::Custom { risk_penalty_m } => write!(f, "custom({risk_penalty_m})"),
        }
    }
}

impl FromStr for RiskProfile {
    type Err = RoutingError;

    /// Accepts `safest`, `balanced`, `fastest` or a bare penalty in meters.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "safest" => Ok(RiskProfile::Safest),
            "balanced" => Ok(RiskProfile::Balanced),
            "fastest" => Ok(RiskProfile::Fastest),
            other => other
                .parse::<f64>()
                .map(|risk_penalty_m| RiskProfile::Custom { risk_penalty_m })
                .map_err(|_| RoutingError::InvalidRequest(format!("unknown profile '{s}'"))),
        }
    }
}

/// A point-to-point routing request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRequest {
    pub start: Coordinate,
    pub end: Coordinate,
    pub profile: RiskProfile,
    /// Tightens the impassability threshold for this request only
    pub max_risk: Option<f64>,
}

impl RouteRequest {
    pub fn new(start: Coordinate, end: Coordinate, profile: RiskProfile) -> Self {
        Self {
            start,
            end,
            profile,
            max_risk: None,
        }
    }

    pub fn with_max_risk(mut self, max_risk: f64) -> Self {
        self.max_risk = Some(max_risk);
        self
    }
}

/// A computed route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteResult {
    pub profile: RiskProfile,
    pub nodes: Vec<NodeId>,
    pub edges: Vec<EdgeRef>,
    pub distance_m: f64,
    /// Length-weighted mean risk
    pub average_risk: f64,
    pub max_risk: f64,
    pub estimated_time_min: f64,
    /// Search cost: distance plus risk penalties
    pub cost: f64,
    pub expanded_nodes: usize,
    /// Most severe first
    pub warnings: Vec<RouteWarning>,
}

impl RouteResult {
    pub fn highest_warning(&self) -> Option<WarningLevel> {
        self.warnings.first().map(|w| w.level)
    }
}

/// A candidate destination for ranked routing (e.g. an evacuation center).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    pub label: String,
    pub position: Coordinate,
}

impl Destination {
    pub fn new(label: impl Into<String>, position: Coordinate) -> Self {
        Self {
            label: label.into(),
            position,
        }
    }
}

/// One entry of a ranked multi-destination answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedRoute {
    /// Index of the candidate in the request
    pub index: usize,
    pub destination: Destination,
    pub route: RouteResult,
}

// ============================================================================
// ROUTER
// ============================================================================

/// Serves routing requests concurrently against the shared graph.
#[derive(Debug)]
pub struct Router {
    config: RoutingConfig,
    graph: Arc<RoadGraph>,
    spatial: Arc<SpatialIndex>,
    cache: NodeLookupCache,
}

impl Router {
    pub fn new(config: RoutingConfig, cache: &CacheConfig, graph: Arc<RoadGraph>, spatial: Arc<SpatialIndex>) -> Self {
        Self {
            config,
            graph,
            spatial,
            cache: NodeLookupCache::new(cache),
        }
    }

    /// Resolves a coordinate to the nearest node within `max_distance_m`.
    ///
    /// Cached resolutions younger than the TTL skip the spatial index.
    pub fn resolve(&self, point: &Coordinate, max_distance_m: f64, now: Duration) -> Result<NodeId, RoutingError> {
        let key = self.cache.key(point, max_distance_m);
        if let Some(node) = self.cache.get(&key, now) {
            return Ok(node);
        }
        let node = self.spatial.nearest_node(point, max_distance_m)?;
        self.cache.insert(key, node, now);
        Ok(node)
    }

    /// Routes between two coordinates.
    pub fn route(&self, request: &RouteRequest, now: Duration) -> Result<RouteResult, RoutingError> {
        let start = self.resolve(&request.start, self.config.snap_max_distance_m, now)?;
        let goal = self.resolve(&request.end, self.config.snap_max_distance_m, now)?;
        self.route_nodes(start, goal, request.profile, request.max_risk)
    }

    /// Routes between two known nodes.
    pub fn route_nodes(
        &self,
        start: NodeId,
        goal: NodeId,
        profile: RiskProfile,
        max_risk: Option<f64>,
    ) -> Result<RouteResult, RoutingError> {
        let penalty = self.validated_penalty(profile)?;
        let threshold = self.effective_threshold(max_risk)?;

        let limits = SearchLimits {
            max_expanded: self.config.max_expanded_nodes,
            timeout: self.config.search_timeout(),
        };
        let edge_cost = |edge: &EdgeSnapshot| -> Option<f64> {
            (edge.risk_score < threshold).then(|| edge.length_m + edge.risk_score * penalty)
        };

        let path = match astar(&self.graph, start, goal, edge_cost, &limits) {
            Ok(path) => path,
            Err(error) => {
                tracing::warn!(%start, %goal, %profile, error = %error, "no route");
                return Err(error);
            }
        };

        let metrics = compute_metrics(&path.edges, &self.config);
        let warnings = classify(&metrics, profile, &self.config.advisory);

        let result = RouteResult {
            profile,
            nodes: path.nodes,
            edges: path.edges.iter().map(|e| e.edge_ref).collect(),
            distance_m: metrics.distance_m,
            average_risk: metrics.average_risk,
            max_risk: metrics.max_risk,
            estimated_time_min: metrics.estimated_time_min,
            cost: path.cost,
            expanded_nodes: path.expanded,
            warnings,
        };

        if result.highest_warning() == Some(WarningLevel::Critical) {
            tracing::info!(%start, %goal, %profile, max_risk = result.max_risk, "critical route returned");
        }
        Ok(result)
    }

    /// Routes from `origin` to each candidate and returns the best `top_k`
    /// by search cost (ties by candidate order).
    ///
    /// Candidates without coverage or without a path are skipped; if none
    /// succeeds the call fails with `NoPathFound`. `max_risk` tightens the
    /// impassability threshold for every candidate, as in [`Router::route`].
    pub fn route_ranked(
        &self,
        origin: &Coordinate,
        candidates: &[Destination],
        profile: RiskProfile,
        top_k: usize,
        max_risk: Option<f64>,
        now: Duration,
    ) -> Result<Vec<RankedRoute>, RoutingError> {
        if top_k == 0 {
            return Err(RoutingError::InvalidRequest("top_k must be positive".into()));
        }
        self.validated_penalty(profile)?;
        self.effective_threshold(max_risk)?;
        let start = self.resolve(origin, self.config.snap_max_distance_m, now)?;

        let mut ranked = Vec::new();
        let mut expanded = 0;
        for (index, destination) in candidates.iter().enumerate() {
            let attempt = self
                .resolve(&destination.position, self.config.snap_max_distance_m, now)
                .and_then(|goal| self.route_nodes(start, goal, profile, max_risk));
            match attempt {
                Ok(route) => ranked.push(RankedRoute {
                    index,
                    destination: destination.clone(),
                    route,
                }),
                Err(error) => {
                    if let RoutingError::NoPathFound { expanded: e } | RoutingError::SearchBudgetExceeded { expanded: e } =
                        error
                    {
                        expanded += e;
                    }
                    tracing::debug!(candidate = %destination.label, error = %error, "candidate skipped");
                }
            }
        }

        if ranked.is_empty() {
            return Err(RoutingError::NoPathFound { expanded });
        }

        ranked.sort_by(|a, b| a.route.cost.total_cmp(&b.route.cost).then(a.index.cmp(&b.index)));
        ranked.truncate(top_k);
        Ok(ranked)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    // ========== Private Helper Methods ==========

    fn validated_penalty(&self, profile: RiskProfile) -> Result<f64, RoutingError> {
        let penalty = profile.risk_penalty_m(&self.config.penalties);
        if !penalty.is_finite() || penalty < 0.0 {
            return Err(RoutingError::InvalidRequest(format!(
                "risk penalty must be finite and non-negative, got {penalty}"
            )));
        }
        Ok(penalty)
    }

    /// A request override can only tighten the configured threshold.
    fn effective_threshold(&self, max_risk: Option<f64>) -> Result<f64, RoutingError> {
        match max_risk {
            None => Ok(self.config.impassability_threshold),
            Some(limit) if limit > 0.0 && limit <= 1.0 => Ok(limit.min(self.config.impassability_threshold)),
            Some(limit) => Err(RoutingError::InvalidRequest(format!("max_risk {limit} outside (0, 1]"))),
        }
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Errors returned by the router. Every failure is one of these; the
/// router never panics on bad input.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RoutingError {
    /// No node within the snapping distance. Not retryable.
    #[error("No road coverage within {max_distance_m}m of ({lat}, {lon})")]
    NoCoverage { lat: f64, lon: f64, max_distance_m: f64 },

    /// Every path is blocked or the endpoints are disconnected.
    #[error("No path found after expanding {expanded} nodes")]
    NoPathFound { expanded: usize },

    /// The expansion or time budget ran out; a larger budget may succeed.
    #[error("Search budget exceeded after expanding {expanded} nodes")]
    SearchBudgetExceeded { expanded: usize },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl From<SpatialError> for RoutingError {
    fn from(error: SpatialError) -> Self {
        match error {
            SpatialError::NoCoverage { lat, lon, max_distance_m } => RoutingError::NoCoverage { lat, lon, max_distance_m },
            other => RoutingError::InvalidRequest(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpatialConfig;
    use crate::geodesy::offset_m;
    use crate::graph::RoadGraphBuilder;
    use approx::assert_relative_eq;
    use std::time::Instant;

    fn origin() -> Coordinate {
        Coordinate::new(14.6, 121.0)
    }

    fn router_for(graph: RoadGraph, config: RoutingConfig) -> (Router, Arc<RoadGraph>) {
        let graph = Arc::new(graph);
        let spatial = Arc::new(SpatialIndex::build(&graph, &SpatialConfig::default()).unwrap());
        (
            Router::new(config, &CacheConfig::default(), Arc::clone(&graph), spatial),
            graph,
        )
    }

    /// A - B - C - D, 100 m apart, two-way.
    fn line() -> RoadGraph {
        let mut b = RoadGraphBuilder::new();
        for i in 0..4u64 {
            b.add_node(NodeId(i), offset_m(&origin(), i as f64 * 100.0, 0.0));
        }
        for i in 0..3u64 {
            b.add_road(NodeId(i), NodeId(i + 1), Some(100.0));
        }
        b.build().unwrap()
    }

    /// S(0) to T(1): direct via 2 (1000 m), medium via 4 (1200 m), detour
    /// via 3 (1600 m).
    fn three_routes() -> RoadGraph {
        let o = origin();
        let mut b = RoadGraphBuilder::new();
        b.add_node(NodeId(0), o);
        b.add_node(NodeId(1), offset_m(&o, 1000.0, 0.0));
        b.add_node(NodeId(2), offset_m(&o, 500.0, 0.0));
        b.add_node(NodeId(3), offset_m(&o, 500.0, 600.0));
        b.add_node(NodeId(4), offset_m(&o, 500.0, -300.0));
        b.add_road(NodeId(0), NodeId(2), Some(500.0));
        b.add_road(NodeId(2), NodeId(1), Some(500.0));
        b.add_road(NodeId(0), NodeId(3), Some(800.0));
        b.add_road(NodeId(3), NodeId(1), Some(800.0));
        b.add_road(NodeId(0), NodeId(4), Some(600.0));
        b.add_road(NodeId(4), NodeId(1), Some(600.0));
        b.build().unwrap()
    }

    fn set_risk(graph: &RoadGraph, a: u64, b: u64, risk: f64) {
        graph.update_risk(EdgeRef::new(NodeId(a), NodeId(b), 0), risk).unwrap();
    }

    fn request(graph: &RoadGraph, from: u64, to: u64, profile: RiskProfile) -> RouteRequest {
        RouteRequest::new(
            graph.node(NodeId(from)).unwrap().position,
            graph.node(NodeId(to)).unwrap().position,
            profile,
        )
    }

    #[test]
    fn test_clear_line_route() {
        let (router, graph) = router_for(line(), RoutingConfig::default());
        let result = router
            .route(&request(&graph, 0, 3, RiskProfile::Balanced), Duration::ZERO)
            .unwrap();
        assert_eq!(result.nodes, vec![NodeId(0), NodeId(1), NodeId(2), NodeId(3)]);
        assert_relative_eq!(result.distance_m, 300.0);
        assert_eq!(result.average_risk, 0.0);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_impassable_edge_without_detour_is_no_path() {
        let (router, graph) = router_for(line(), RoutingConfig::default());
        set_risk(&graph, 1, 2, 0.95);
        let result = router.route(&request(&graph, 0, 3, RiskProfile::Safest), Duration::ZERO);
        assert!(matches!(result, Err(RoutingError::NoPathFound { .. })));
    }

    #[test]
    fn test_impassable_applies_to_fastest_too() {
        let (router, graph) = router_for(line(), RoutingConfig::default());
        set_risk(&graph, 1, 2, 0.9);
        assert!(matches!(
            router.route_nodes(NodeId(0), NodeId(3), RiskProfile::Fastest, None),
            Err(RoutingError::NoPathFound { .. })
        ));
        // Just below the threshold is traversable
        set_risk(&graph, 1, 2, 0.89);
        let result = router
            .route_nodes(NodeId(0), NodeId(3), RiskProfile::Fastest, None)
            .unwrap();
        assert_eq!(result.highest_warning(), Some(WarningLevel::Critical));
    }

    #[test]
    fn test_profiles_order_average_risk() {
        let (router, graph) = router_for(three_routes(), RoutingConfig::default());
        for (a, b) in [(0, 2), (2, 1)] {
            set_risk(&graph, a, b, 0.5);
        }
        for (a, b) in [(0, 4), (4, 1)] {
            set_risk(&graph, a, b, 0.15);
        }

        let route = |p| router.route_nodes(NodeId(0), NodeId(1), p, None).unwrap();
        let safest = route(RiskProfile::Safest);
        let balanced = route(RiskProfile::Balanced);
        let fastest = route(RiskProfile::Fastest);

        assert_eq!(safest.nodes, vec![NodeId(0), NodeId(3), NodeId(1)]);
        assert_eq!(balanced.nodes, vec![NodeId(0), NodeId(4), NodeId(1)]);
        assert_eq!(fastest.nodes, vec![NodeId(0), NodeId(2), NodeId(1)]);
        assert!(safest.average_risk <= balanced.average_risk);
        assert!(balanced.average_risk <= fastest.average_risk);
        assert!(safest.distance_m >= balanced.distance_m);
    }

    #[test]
    fn test_max_risk_override_only_tightens() {
        let (router, graph) = router_for(three_routes(), RoutingConfig::default());
        set_risk(&graph, 0, 2, 0.5);
        set_risk(&graph, 0, 4, 0.3);

        let strict = router
            .route_nodes(NodeId(0), NodeId(1), RiskProfile::Fastest, Some(0.4))
            .unwrap();
        assert!(strict.max_risk < 0.4);
        assert_eq!(strict.nodes, vec![NodeId(0), NodeId(4), NodeId(1)]);

        // A looser override does not reopen edges above the configured threshold
        set_risk(&graph, 0, 4, 0.95);
        set_risk(&graph, 0, 3, 0.95);
        set_risk(&graph, 0, 2, 0.95);
        assert!(matches!(
            router.route_nodes(NodeId(0), NodeId(1), RiskProfile::Fastest, Some(1.0)),
            Err(RoutingError::NoPathFound { .. })
        ));
    }

    #[test]
    fn test_invalid_requests() {
        let (router, _) = router_for(line(), RoutingConfig::default());
        let bad_penalty = RiskProfile::Custom { risk_penalty_m: -1.0 };
        assert!(matches!(
            router.route_nodes(NodeId(0), NodeId(3), bad_penalty, None),
            Err(RoutingError::InvalidRequest(_))
        ));
        assert!(matches!(
            router.route_nodes(NodeId(0), NodeId(3), RiskProfile::Safest, Some(1.5)),
            Err(RoutingError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_no_coverage_far_from_roads() {
        let (router, _) = router_for(line(), RoutingConfig::default());
        let far = offset_m(&origin(), 0.0, 10_000.0);
        let result = router.route(&RouteRequest::new(origin(), far, RiskProfile::Balanced), Duration::ZERO);
        assert!(matches!(result, Err(RoutingError::NoCoverage { .. })));
    }

    #[test]
    fn test_resolve_twice_hits_cache() {
        let (router, _) = router_for(line(), RoutingConfig::default());
        let p = offset_m(&origin(), 102.0, 3.0);
        let first = router.resolve(&p, 500.0, Duration::from_secs(10)).unwrap();
        let second = router.resolve(&p, 500.0, Duration::from_secs(20)).unwrap();
        assert_eq!(first, NodeId(1));
        assert_eq!(first, second);
        let stats = router.cache_stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);

        // After the TTL the spatial index is consulted again
        router.resolve(&p, 500.0, Duration::from_secs(10 + 300)).unwrap();
        assert_eq!(router.cache_stats().misses, 2);
    }

    #[test]
    fn test_route_ranked_skips_unreachable() {
        let (router, graph) = router_for(three_routes(), RoutingConfig::default());
        set_risk(&graph, 2, 1, 0.95);
        let candidates = vec![
            Destination::new("far-away", offset_m(&origin(), 50_000.0, 0.0)),
            Destination::new("T", graph.node(NodeId(1)).unwrap().position),
            Destination::new("mid", graph.node(NodeId(2)).unwrap().position),
            Destination::new("north", graph.node(NodeId(3)).unwrap().position),
        ];
        let ranked = router
            .route_ranked(&origin(), &candidates, RiskProfile::Balanced, 2, None, Duration::ZERO)
            .unwrap();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].destination.label, "mid");
        assert_eq!(ranked[1].destination.label, "north");
        assert!(ranked[0].route.cost <= ranked[1].route.cost);
    }

    #[test]
    fn test_route_ranked_all_fail() {
        let (router, _) = router_for(line(), RoutingConfig::default());
        let candidates = vec![Destination::new("nowhere", offset_m(&origin(), 0.0, 20_000.0))];
        assert!(matches!(
            router.route_ranked(&origin(), &candidates, RiskProfile::Safest, 3, None, Duration::ZERO),
            Err(RoutingError::NoPathFound { .. })
        ));
    }

    #[test]
    fn test_route_ranked_honours_max_risk() {
        let (router, graph) = router_for(three_routes(), RoutingConfig::default());
        set_risk(&graph, 0, 2, 0.5);
        let direct = EdgeRef::new(NodeId(0), NodeId(2), 0);
        let candidates = vec![
            Destination::new("mid", graph.node(NodeId(2)).unwrap().position),
            Destination::new("south", graph.node(NodeId(4)).unwrap().position),
        ];

        let loose = router
            .route_ranked(&origin(), &candidates, RiskProfile::Balanced, 2, None, Duration::ZERO)
            .unwrap();
        let mid = loose.iter().find(|r| r.destination.label == "mid").unwrap();
        assert!(mid.route.edges.contains(&direct));

        let strict = router
            .route_ranked(&origin(), &candidates, RiskProfile::Balanced, 2, Some(0.4), Duration::ZERO)
            .unwrap();
        assert_eq!(strict.len(), 2);
        let mid = strict.iter().find(|r| r.destination.label == "mid").unwrap();
        assert!(!mid.route.edges.contains(&direct));
        assert!(strict.iter().all(|r| r.route.max_risk < 0.4));

        assert!(matches!(
            router.route_ranked(&origin(), &candidates, RiskProfile::Balanced, 2, Some(1.5), Duration::ZERO),
            Err(RoutingError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_profile_from_str() {
        assert_eq!("Safest".parse::<RiskProfile>().unwrap(), RiskProfile::Safest);
        assert_eq!(
            "2500".parse::<RiskProfile>().unwrap(),
            RiskProfile::Custom { risk_penalty_m: 2500.0 }
        );
        assert!("reckless".parse::<RiskProfile>().is_err());
    }

    #[test]
    fn test_cache_hit_much_faster_than_fallback() {
        let n = 60u64;
        let mut b = RoadGraphBuilder::new();
        for r in 0..n {
            for c in 0..n {
                b.add_node(NodeId(r * n + c), offset_m(&origin(), c as f64 * 80.0, r as f64 * 80.0));
            }
        }
        for r in 0..n {
            for c in 0..n {
                let id = r * n + c;
                if c + 1 < n {
                    b.add_road(NodeId(id), NodeId(id + 1), None);
                }
                if r + 1 < n {
                    b.add_road(NodeId(id), NodeId(id + n), None);
                }
            }
        }
        let (router, _) = router_for(b.build().unwrap(), RoutingConfig::default());
        let points: Vec<Coordinate> = (0..200)
            .map(|i| offset_m(&origin(), (i * 23 % 4700) as f64 + 7.0, (i * 37 % 4700) as f64 + 11.0))
            .collect();

        let time = |f: &dyn Fn()| {
            (0..5)
                .map(|_| {
                    let t = Instant::now();
                    f();
                    t.elapsed()
                })
                .min()
                .unwrap()
        };

        let cold = time(&|| {
            for p in &points {
                std::hint::black_box(router.spatial.nearest_node(p, 500.0).unwrap());
            }
        });
        for p in &points {
            router.resolve(p, 500.0, Duration::ZERO).unwrap();
        }
        let warm = time(&|| {
            for p in &points {
                std::hint::black_box(router.resolve(p, 500.0, Duration::ZERO).unwrap());
            }
        });

        assert!(
            warm * 10 <= cold,
            "cache hit path not fast enough: warm {warm:?} vs cold {cold:?}"
        );
    }
}
