//! Runtime facade wiring the Graph Store, Spatial Index, Fusion Engine and
//! Router together behind the query interface.
//!
//! The runtime owns the [`RouteContext`]; the engines below it only ever see
//! time as an argument. Fusion runs as one spawned task that wakes every
//! `tick_interval`, drains at most `max_batch` envelopes and publishes a tick.

use crate::config::{ConfigError, RiskRouteConfig};
use crate::fusion::{FusionEngine, FusionStats, IngestOutcome, TickReport};
use crate::geodesy::Coordinate;
use crate::graph::{EdgeRef, GraphError, NodeId, RoadGraph};
use crate::node_cache::CacheStats;
use crate::router::{Destination, RankedRoute, RiskProfile, RouteRequest, RouteResult, Router, RoutingError};
use crate::spatial::{SpatialError, SpatialIndex, SpatialStats};
use riskroute_env::{ObservationEnvelope, ObservationSource, RouteContext};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Errors raised while assembling the runtime.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Spatial index: {0}")]
    Spatial(#[from] SpatialError),
}

/// Handle to the spawned fusion task.
#[derive(Debug, Clone)]
pub struct FusionHandle {
    stop: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
}

impl FusionHandle {
    /// Asks the task to exit after its current sleep.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Ticks completed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }
}

/// The assembled hazard-aware routing core.
pub struct RiskRouteRuntime<Ctx: RouteContext> {
    ctx: Arc<Ctx>,
    config: RiskRouteConfig,
    graph: Arc<RoadGraph>,
    spatial: Arc<SpatialIndex>,
    router: Arc<Router>,
    engine: Arc<Mutex<FusionEngine>>,
}

impl<Ctx: RouteContext> RiskRouteRuntime<Ctx> {
    /// Validates `config`, indexes `graph` and builds every component.
    pub fn new(ctx: Arc<Ctx>, graph: RoadGraph, config: RiskRouteConfig) -> Result<Self, RuntimeError> {
        config.validate()?;

        let graph = Arc::new(graph);
        let spatial = Arc::new(SpatialIndex::build(&graph, &config.spatial)?);
        let router = Arc::new(Router::new(
            config.routing.clone(),
            &config.cache,
            Arc::clone(&graph),
            Arc::clone(&spatial),
        ));
        let engine = FusionEngine::new(config.fusion.clone(), Arc::clone(&graph), Arc::clone(&spatial));

        let stats = spatial.stats();
        tracing::info!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            h3_resolution = stats.resolution,
            cells = stats.total_cells,
            "riskroute runtime ready"
        );

        Ok(Self {
            ctx,
            config,
            graph,
            spatial,
            router,
            engine: Arc::new(Mutex::new(engine)),
        })
    }

    // ========================================================================
    // FUSION
    // ========================================================================

    /// Spawns the periodic fusion task over `source`.
    ///
    /// The task exits when the source reports closed (every producer gone and
    /// the channel drained) or when [`FusionHandle::stop`] is called.
    pub fn start_fusion<S: ObservationSource>(&self, mut source: S) -> FusionHandle {
        let handle = FusionHandle {
            stop: Arc::new(AtomicBool::new(false)),
            finished: Arc::new(AtomicBool::new(false)),
            ticks: Arc::new(AtomicU64::new(0)),
        };

        let ctx = Arc::clone(&self.ctx);
        let engine = Arc::clone(&self.engine);
        let interval = self.config.runtime.tick_interval();
        let max_batch = self.config.runtime.max_batch;
        let task = handle.clone();

        self.ctx.spawn("fusion", async move {
            tracing::info!(interval_ms = interval.as_millis() as u64, max_batch, "fusion task started");
            loop {
                ctx.sleep(interval).await;
                if task.stop.load(Ordering::Acquire) {
                    break;
                }

                let batch = source.drain_batch(max_batch);
                let now = ctx.unix_time_secs();
                {
                    let mut engine = lock(&engine);
                    engine.ingest_envelopes(&batch.envelopes, now);
                    engine.tick(now);
                }
                task.ticks.fetch_add(1, Ordering::AcqRel);

                if batch.closed {
                    break;
                }
            }
            task.finished.store(true, Ordering::Release);
            tracing::info!(ticks = task.ticks.load(Ordering::Acquire), "fusion task stopped");
        });

        handle
    }

    /// Ingests envelopes immediately, without waiting for a tick.
    pub fn ingest(&self, envelopes: &[ObservationEnvelope]) -> Vec<IngestOutcome> {
        let now = self.ctx.unix_time_secs();
        lock(&self.engine).ingest_envelopes(envelopes, now)
    }

    /// Runs one fusion tick at the context's current time.
    pub fn tick_now(&self) -> TickReport {
        let now = self.ctx.unix_time_secs();
        lock(&self.engine).tick(now)
    }

    pub fn fusion_stats(&self) -> FusionStats {
        lock(&self.engine).stats()
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub fn route(&self, request: &RouteRequest) -> Result<RouteResult, RoutingError> {
        self.router.route(request, self.ctx.now())
    }

    pub fn route_ranked(
        &self,
        origin: &Coordinate,
        candidates: &[Destination],
        profile: RiskProfile,
        top_k: usize,
        max_risk: Option<f64>,
    ) -> Result<Vec<RankedRoute>, RoutingError> {
        self.router
            .route_ranked(origin, candidates, profile, top_k, max_risk, self.ctx.now())
    }

    /// Current fused risk of one edge.
    pub fn fused_risk(&self, edge: EdgeRef) -> Result<f64, GraphError> {
        self.graph.risk(edge)
    }

    /// Nearest node within the configured snapping distance.
    pub fn nearest_node(&self, point: &Coordinate) -> Result<NodeId, SpatialError> {
        self.spatial
            .nearest_node(point, self.config.routing.snap_max_distance_m)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.router.cache_stats()
    }

    pub fn spatial_stats(&self) -> SpatialStats {
        self.spatial.stats()
    }

    pub fn graph(&self) -> &Arc<RoadGraph> {
        &self.graph
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn config(&self) -> &RiskRouteConfig {
        &self.config
    }

    pub fn context(&self) -> &Arc<Ctx> {
        &self.ctx
    }
}

fn lock(engine: &Mutex<FusionEngine>) -> MutexGuard<'_, FusionEngine> {
    engine.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geodesy::offset_m;
    use crate::graph::RoadGraphBuilder;
    use riskroute_env::{observation_channel, TokioContext};
    use std::time::Duration;

    fn line() -> RoadGraph {
        let origin = Coordinate::new(14.6, 121.0);
        let mut b = RoadGraphBuilder::new();
        for i in 0..4u64 {
            b.add_node(NodeId(i), offset_m(&origin, i as f64 * 100.0, 0.0));
        }
        for i in 0..3u64 {
            b.add_road(NodeId(i), NodeId(i + 1), Some(100.0));
        }
        b.build().unwrap()
    }

    fn fast_config() -> RiskRouteConfig {
        let mut config = RiskRouteConfig::default();
        config.runtime.tick_interval_ms = 10;
        config
    }

    fn flood_payload(ctx: &TokioContext) -> Vec<u8> {
        format!(
            r#"{{"source":"official","edge":{{"from":1,"to":2}},"depth_m":0.6,"confidence":1,"observed_at":{}}}"#,
            ctx.unix_time_secs()
        )
        .into_bytes()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = RiskRouteConfig::default();
        config.fusion.source_weights.official = 0.9;
        assert!(matches!(
            RiskRouteRuntime::new(TokioContext::shared(), line(), config),
            Err(RuntimeError::Config(_))
        ));
    }

    #[test]
    fn test_manual_ingest_and_tick() {
        let ctx = TokioContext::shared();
        let runtime = RiskRouteRuntime::new(Arc::clone(&ctx), line(), RiskRouteConfig::default()).unwrap();
        let outcomes = runtime.ingest(&[ObservationEnvelope::new(flood_payload(&ctx), 0, "gauges")]);
        assert!(matches!(outcomes[0], IngestOutcome::Accepted { .. }));

        let report = runtime.tick_now();
        assert_eq!(report.edges_updated, 1);
        let edge = EdgeRef::new(NodeId(1), NodeId(2), 0);
        assert!(runtime.fused_risk(edge).unwrap() >= 0.95);

        // The flooded edge is impassable; the line has no detour
        let request = RouteRequest::new(
            Coordinate::new(14.6, 121.0),
            offset_m(&Coordinate::new(14.6, 121.0), 300.0, 0.0),
            RiskProfile::Balanced,
        );
        assert!(matches!(runtime.route(&request), Err(RoutingError::NoPathFound { .. })));
    }

    #[tokio::test]
    async fn test_fusion_task_publishes_and_stops_when_closed() {
        let ctx = TokioContext::shared();
        let runtime = RiskRouteRuntime::new(Arc::clone(&ctx), line(), fast_config()).unwrap();
        let (tx, rx) = observation_channel(16);
        let handle = runtime.start_fusion(rx);

        tx.send(ObservationEnvelope::new(flood_payload(&ctx), 0, "gauges"))
            .await
            .unwrap();
        tx.send(ObservationEnvelope::new(b"garbage".to_vec(), 0, "social"))
            .await
            .unwrap();
        drop(tx);

        for _ in 0..200 {
            if handle.is_finished() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(handle.is_finished());
        assert!(handle.ticks() >= 1);
        assert!(runtime.fused_risk(EdgeRef::new(NodeId(1), NodeId(2), 0)).unwrap() >= 0.95);

        let stats = runtime.fusion_stats();
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.rejected, 1);
    }

    #[tokio::test]
    async fn test_fusion_task_stop() {
        let runtime = RiskRouteRuntime::new(TokioContext::shared(), line(), fast_config()).unwrap();
        let (_tx, rx) = observation_channel(4);
        let handle = runtime.start_fusion(rx);
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.stop();
        for _ in 0..100 {
            if handle.is_finished() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(handle.is_finished());
    }
}
