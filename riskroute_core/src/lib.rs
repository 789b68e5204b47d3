//! RiskRoute Core - Hazard Fusion and Risk-Aware Routing
//!
//! This library keeps a live road graph annotated with flood risk and routes
//! over it:
//! 1. **Graph Store**: immutable topology with atomically updated per-edge risk
//! 2. **Spatial Index**: density-adaptive H3 grid for radius and nearest-node queries
//! 3. **Hazard Fusion Engine**: deduplicated, decayed, weighted-average fusion of
//!    official, crowdsourced and historical observations
//! 4. **Risk-Aware Router**: A* over `length + risk × penalty` with impassable
//!    edges, cached node snapping and severity-classified warnings

pub mod advisory;
pub mod astar;
pub mod bounded;
pub mod config;
pub mod decay;
pub mod fusion;
pub mod geodesy;
pub mod graph;
pub mod node_cache;
pub mod observation;
pub mod router;
pub mod runtime;
pub mod spatial;

// Re-export key types for convenience
pub use advisory::{RouteMetrics, RouteWarning, WarningLevel};
pub use config::{ConfigError, RiskRouteConfig};
pub use fusion::{FusionEngine, FusionStats, IngestOutcome, TickReport};
pub use geodesy::Coordinate;
pub use graph::{EdgeRef, EdgeSnapshot, GraphError, NodeId, RoadGraph, RoadGraphBuilder};
pub use observation::{HazardLocation, HazardMeasure, HazardObservation, RawObservation, SourceKind, ValidationError};
pub use router::{Destination, RankedRoute, RiskProfile, RouteRequest, RouteResult, Router, RoutingError};
pub use runtime::{FusionHandle, RiskRouteRuntime, RuntimeError};
pub use spatial::{SpatialError, SpatialIndex};
