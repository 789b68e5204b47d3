//! Scenario runner - drives the routing core through flood scenarios.
//!
//! Every scenario runs on a [`SimContext`], so a run is a pure function of
//! its seed: the oracle generates observations, the harness pushes them
//! through the bounded channel, advances virtual time one tick at a time
//! and queries the router between ticks.

use crate::city::GridCity;
use crate::context::SimContext;
use crate::oracle::{to_envelope, FloodZone, HazardOracle};
use crate::scenarios::ScenarioId;

use riskroute_core::observation::RawTimestamp;
use riskroute_core::{
    Destination, EdgeRef, GraphError, RawObservation, RiskProfile, RiskRouteConfig, RiskRouteRuntime,
    RouteRequest, RouteResult, RoutingError, RuntimeError, SourceKind, TickReport, WarningLevel,
};
use riskroute_env::{
    observation_channel, EnvError, ObservationEnvelope, ObservationReceiver, ObservationSender, ObservationSource,
    RouteContext,
};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const HOUR: u64 = 3600;

/// Errors that abort a scenario before its checks run.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("City graph: {0}")]
    Graph(#[from] GraphError),

    #[error("Runtime: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("Routing: {0}")]
    Routing(#[from] RoutingError),

    #[error("Encoding: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Total fusion ticks executed
    pub total_ticks: u64,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,

    /// One frame per fusion tick
    pub timeline: Vec<TickFrame>,

    /// Routes computed during the run
    pub routes: Vec<RouteRecord>,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioMetrics {
    /// Envelopes offered to the channel
    pub observations_sent: u64,

    /// Envelopes refused because the channel was full
    pub channel_full: u64,

    pub accepted: u64,
    pub duplicates: u64,
    pub rejected: u64,
    pub expired_on_arrival: u64,
    pub unmatched: u64,

    /// Observations pushed out of the full history
    pub displaced: u64,

    /// Largest number of edges at risk after any tick
    pub peak_risky_edges: usize,

    /// Largest fused edge risk after any tick
    pub peak_max_risk: f64,

    pub routes_computed: u64,

    /// Route queries that found every path blocked
    pub routes_blocked: u64,

    pub cache_hit_rate: f64,
}

/// Snapshot of one fusion tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickFrame {
    pub tick: u64,
    pub time_secs: f64,
    pub accepted: usize,
    pub duplicates: usize,
    pub rejected: usize,
    pub evicted: usize,
    pub edges_updated: usize,
    pub live_observations: usize,
    pub max_risk: f64,
}

/// Summary of one computed route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRecord {
    pub label: String,
    pub profile: String,
    pub distance_m: f64,
    pub average_risk: f64,
    pub max_risk: f64,
    pub estimated_time_min: f64,
    pub warning: Option<WarningLevel>,
}

impl RouteRecord {
    fn new(label: &str, route: &RouteResult) -> Self {
        Self {
            label: label.to_string(),
            profile: route.profile.to_string(),
            distance_m: route.distance_m,
            average_risk: route.average_risk,
            max_risk: route.max_risk,
            estimated_time_min: route.estimated_time_min,
            warning: route.highest_warning(),
        }
    }
}

/// Runs flood scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Core configuration handed to every runtime
    config: RiskRouteConfig,
}

impl ScenarioRunner {
    /// Creates a new scenario runner with one-minute fusion ticks.
    pub fn new(seed: u64) -> Self {
        let mut config = RiskRouteConfig::default();
        config.runtime.tick_interval_ms = 60_000;
        Self { seed, config }
    }

    pub fn config(&self) -> &RiskRouteConfig {
        &self.config
    }

    /// Replaces the core configuration.
    pub fn with_config(mut self, config: RiskRouteConfig) -> Self {
        self.config = config;
        self
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let outcome = match scenario {
            ScenarioId::ClearRoads => self.run_clear_roads(),
            ScenarioId::FlashFlood => self.run_flash_flood(),
            ScenarioId::DuplicateStorm => self.run_duplicate_storm(),
            ScenarioId::BridgeOut => self.run_bridge_out(),
            ScenarioId::Evacuation => self.run_evacuation(),
            ScenarioId::Deluge => self.run_deluge(),
        };

        match outcome {
            Ok(result) => {
                if result.passed {
                    info!("✓ {} passed after {} ticks", scenario.name(), result.total_ticks);
                } else {
                    warn!("✗ {} failed: {}", scenario.name(), result.failure_reason.as_deref().unwrap_or("-"));
                }
                result
            }
            Err(error) => {
                warn!("✗ {} aborted: {}", scenario.name(), error);
                ScenarioResult {
                    scenario: scenario.name().to_string(),
                    seed: self.seed,
                    passed: false,
                    total_ticks: 0,
                    final_time_secs: 0.0,
                    failure_reason: Some(error.to_string()),
                    metrics: ScenarioMetrics::default(),
                    timeline: Vec::new(),
                    routes: Vec::new(),
                }
            }
        }
    }

    /// RR-001: ClearRoads - no hazards at all.
    ///
    /// **Assertion**: every profile returns the shortest path with zero risk
    /// and no warnings.
    fn run_clear_roads(&self) -> Result<ScenarioResult, SimError> {
        let city = GridCity::new(10, 10, 200.0);
        let mut h = Harness::new(self.seed, &city, &self.config)?;
        let mut checks = Checks::default();

        h.run_ticks(3);

        let from = city.position(0, 0);
        let to = city.position(9, 9);
        let shortest = 18.0 * city.spacing_m;
        for profile in [RiskProfile::Safest, RiskProfile::Balanced, RiskProfile::Fastest] {
            let route = h.route("corner-to-corner", &RouteRequest::new(from, to, profile))?;
            checks.expect((route.distance_m - shortest).abs() < 1e-6, || {
                format!("{profile}: distance {:.1}m, expected {shortest:.1}m", route.distance_m)
            });
            checks.expect(route.max_risk == 0.0 && route.average_risk == 0.0, || {
                format!("{profile}: risk {:.3} on a dry city", route.max_risk)
            });
            checks.expect(route.warnings.is_empty(), || format!("{profile}: unexpected warnings"));
        }

        Ok(h.finish(ScenarioId::ClearRoads, self.seed, checks))
    }

    /// RR-002: FlashFlood - a flood builds up in the city centre and recedes.
    ///
    /// **Assertion**: the centre becomes risky, the safest route carries no
    /// more risk than the fastest, and once every observation has aged out
    /// the city is back to zero risk.
    fn run_flash_flood(&self) -> Result<ScenarioResult, SimError> {
        let city = GridCity::new(15, 15, 150.0);
        let mut h = Harness::new(self.seed, &city, &self.config)?;
        let mut checks = Checks::default();

        h.oracle.add_zone(FloodZone::new(city.position(7, 7), 450.0, 0.9));

        // Rising water: gauges every tick, a burst of crowd reports
        let mut gauges_sent = 0;
        for _ in 0..10 {
            let now = h.now();
            let gauges = h.oracle.gauge_readings(now);
            gauges_sent += gauges.len();
            h.publish(&gauges, "gauges")?;
            let crowd = h.oracle.crowd_reports(30, now);
            h.publish(&crowd, "social")?;
            h.step();
        }

        let flooded = h.metrics.peak_max_risk;
        checks.expect(flooded >= 0.5, || format!("peak risk {flooded:.2} too low for a 0.9m flood"));

        let west = city.position(7, 0);
        let east = city.position(7, 14);
        let safest = h.route("west-east", &RouteRequest::new(west, east, RiskProfile::Safest))?;
        let fastest = h.route("west-east", &RouteRequest::new(west, east, RiskProfile::Fastest))?;
        let threshold = self.config.routing.impassability_threshold;

        checks.expect(safest.average_risk <= fastest.average_risk + 1e-9, || {
            format!(
                "safest avg risk {:.3} above fastest {:.3}",
                safest.average_risk, fastest.average_risk
            )
        });
        checks.expect(fastest.distance_m <= safest.distance_m + 1e-6, || {
            "fastest route longer than safest".to_string()
        });
        checks.expect(safest.max_risk < threshold && fastest.max_risk < threshold, || {
            "route crosses an impassable edge".to_string()
        });

        // Water recedes; crowd reports age out first
        h.oracle.clear_zones();
        h.idle(Duration::from_secs(4 * HOUR + 600));
        let live = h.runtime.fusion_stats().live_observations;
        checks.expect(live == gauges_sent, || {
            format!("{live} live observations after crowd horizon, expected {gauges_sent} gauges")
        });

        // Then the gauges
        h.idle(Duration::from_secs(24 * HOUR));
        let stats = h.runtime.fusion_stats();
        checks.expect(stats.risky_edges == 0 && stats.live_observations == 0, || {
            format!(
                "{} risky edges and {} live observations after recession",
                stats.risky_edges, stats.live_observations
            )
        });

        let dry = h.route("west-east-dry", &RouteRequest::new(west, east, RiskProfile::Safest))?;
        checks.expect((dry.distance_m - 14.0 * city.spacing_m).abs() < 1e-6, || {
            format!("dry route {:.1}m is not the straight street", dry.distance_m)
        });
        checks.expect(dry.warnings.is_empty(), || "warnings on a dry route".to_string());

        Ok(h.finish(ScenarioId::FlashFlood, self.seed, checks))
    }

    /// RR-003: DuplicateStorm - at-least-once delivery gone wild.
    ///
    /// **Assertion**: 500 copies of one report fuse exactly like a single
    /// copy, and every malformed payload is rejected without affecting the
    /// rest of its batch.
    fn run_duplicate_storm(&self) -> Result<ScenarioResult, SimError> {
        let city = GridCity::new(8, 8, 150.0);
        let mut h = Harness::new(self.seed, &city, &self.config)?;
        let mut reference = Harness::new(self.seed, &city, &self.config)?;
        let mut checks = Checks::default();

        let spot = city.midpoint((3, 3), (3, 4));
        // No content key: identical copies must collapse onto the derived one
        let report = RawObservation {
            source: Some(SourceKind::Crowdsourced.as_str().to_string()),
            lat: Some(spot.lat),
            lon: Some(spot.lon),
            severity: Some(0.7),
            confidence: Some(0.8),
            observed_at: Some(RawTimestamp::Seconds(h.now())),
            ..Default::default()
        };

        reference.publish(std::slice::from_ref(&report), "social")?;
        let payload = serde_json::to_vec(&report)?;
        for _ in 0..5 {
            let now = h.now();
            let mut delivery = vec![payload.clone(); 100];
            delivery.extend(h.oracle.malformed_payloads(10, now));
            // Redelivery does not preserve order
            h.ctx.with_rng(|rng| delivery.shuffle(rng));
            h.publish_bytes(delivery, "social");
            h.step();
            reference.step();
        }

        checks.expect(h.metrics.accepted == 1, || format!("{} copies accepted", h.metrics.accepted));
        checks.expect(h.metrics.duplicates == 499, || format!("{} duplicates counted", h.metrics.duplicates));
        checks.expect(h.metrics.rejected == 50, || format!("{} malformed rejected", h.metrics.rejected));

        let edge = city.edge((3, 3), (3, 4));
        let stormy = h.runtime.fused_risk(edge)?;
        let single = reference.runtime.fused_risk(edge)?;
        checks.expect(stormy > 0.0, || "report did not reach its edge".to_string());
        checks.expect((stormy - single).abs() < 1e-12, || {
            format!("risk {stormy:.6} differs from single-report risk {single:.6}")
        });
        checks.expect(h.runtime.graph().edges_at_risk() == reference.runtime.graph().edges_at_risk(), || {
            "duplicates spread risk to extra edges".to_string()
        });

        Ok(h.finish(ScenarioId::DuplicateStorm, self.seed, checks))
    }

    /// RR-004: BridgeOut - river crossings close one after another.
    ///
    /// **Assertion**: routes switch to the remaining bridge, and with every
    /// bridge impassable the router reports that no path exists.
    fn run_bridge_out(&self) -> Result<ScenarioResult, SimError> {
        let city = GridCity::new(6, 8, 200.0).with_river(3, &[1, 4]);
        let mut h = Harness::new(self.seed, &city, &self.config)?;
        let mut checks = Checks::default();

        let request = RouteRequest::new(city.position(2, 0), city.position(2, 7), RiskProfile::Balanced);
        let north = [city.edge((1, 3), (1, 4)), city.edge((1, 4), (1, 3))];
        let south = [city.edge((4, 3), (4, 4)), city.edge((4, 4), (4, 3))];

        h.run_ticks(1);
        let open = h.route("both-bridges", &request)?;
        checks.expect(open.edges.contains(&north[0]), || "route skipped the nearer bridge".to_string());
        checks.expect((open.distance_m - 9.0 * city.spacing_m).abs() < 1e-6, || {
            format!("open route {:.1}m", open.distance_m)
        });

        h.close_roads(&north)?;
        h.step();
        let detour = h.route("south-bridge", &request)?;
        checks.expect(!detour.edges.contains(&north[0]) && detour.edges.contains(&south[0]), || {
            "route did not move to the south bridge".to_string()
        });
        checks.expect((detour.distance_m - 11.0 * city.spacing_m).abs() < 1e-6, || {
            format!("detour {:.1}m", detour.distance_m)
        });

        h.close_roads(&south)?;
        h.step();
        match h.route("no-bridges", &request) {
            Err(RoutingError::NoPathFound { .. }) => {}
            Ok(route) => checks.fail(format!("route over a closed bridge: {:.1}m", route.distance_m)),
            Err(error) => checks.fail(format!("unexpected error: {error}")),
        }

        Ok(h.finish(ScenarioId::BridgeOut, self.seed, checks))
    }

    /// RR-005: Evacuation - rank shelters while the centre is under water.
    ///
    /// **Assertion**: the top three shelters come back ordered by cost, and
    /// none of their routes crosses an impassable edge.
    fn run_evacuation(&self) -> Result<ScenarioResult, SimError> {
        let city = GridCity::new(15, 15, 150.0);
        let mut h = Harness::new(self.seed, &city, &self.config)?;
        let mut checks = Checks::default();

        h.oracle.add_zone(FloodZone::new(city.position(7, 7), 400.0, 1.0));
        for _ in 0..5 {
            let now = h.now();
            let gauges = h.oracle.gauge_readings(now);
            h.publish(&gauges, "gauges")?;
            let crowd = h.oracle.crowd_reports(40, now);
            h.publish(&crowd, "social")?;
            h.step();
        }

        let shelters = vec![
            Destination::new("east-school", city.position(7, 11)),
            Destination::new("sw-gym", city.position(0, 0)),
            Destination::new("north-church", city.position(14, 3)),
            Destination::new("east-edge", city.position(7, 14)),
            Destination::new("ne-hall", city.position(12, 12)),
        ];
        let origin = city.position(7, 3);
        let ranked = h
            .runtime
            .route_ranked(&origin, &shelters, RiskProfile::Safest, 3, None)?;
        h.metrics.routes_computed += shelters.len() as u64;

        checks.expect(ranked.len() == 3, || format!("{} shelters ranked", ranked.len()));
        checks.expect(ranked.windows(2).all(|w| w[0].route.cost <= w[1].route.cost), || {
            "shelters not ordered by cost".to_string()
        });
        let threshold = self.config.routing.impassability_threshold;
        for entry in &ranked {
            checks.expect(entry.route.max_risk < threshold, || {
                format!("{} route crosses an impassable edge", entry.destination.label)
            });
            debug!(
                "  #{} {} cost={:.0} risk={:.2}",
                entry.index, entry.destination.label, entry.route.cost, entry.route.max_risk
            );
            h.routes.push(RouteRecord::new(&entry.destination.label, &entry.route));
        }

        Ok(h.finish(ScenarioId::Evacuation, self.seed, checks))
    }

    /// RR-006: Deluge - more reports than the pipeline can hold.
    ///
    /// **Assertion**: back-pressure refuses envelopes at the channel, the
    /// history never grows past its capacity, and fusion keeps producing risk.
    fn run_deluge(&self) -> Result<ScenarioResult, SimError> {
        let mut config = self.config.clone();
        config.runtime.channel_capacity = 512;
        config.runtime.max_batch = 256;
        config.fusion.history_capacity = 2000;

        let city = GridCity::new(12, 12, 150.0);
        let mut h = Harness::new(self.seed, &city, &config)?;
        let mut checks = Checks::default();

        h.oracle.add_zone(FloodZone::new(city.position(6, 6), 500.0, 0.7));
        for _ in 0..10 {
            let now = h.now();
            let crowd = h.oracle.crowd_reports(2000, now);
            h.publish(&crowd, "social")?;
            h.step();
        }

        let stats = h.runtime.fusion_stats();
        checks.expect(h.metrics.channel_full > 0, || "channel never pushed back".to_string());
        checks.expect(stats.live_observations <= config.fusion.history_capacity, || {
            format!("history holds {} observations", stats.live_observations)
        });
        checks.expect(stats.displaced > 0, || "history never displaced an observation".to_string());
        checks.expect(stats.risky_edges > 0, || "no risk published under load".to_string());

        Ok(h.finish(ScenarioId::Deluge, self.seed, checks))
    }
}

// ============================================================================
// HARNESS
// ============================================================================

/// Failed assertions collected during a scenario.
#[derive(Debug, Default)]
struct Checks {
    failures: Vec<String>,
}

impl Checks {
    fn expect(&mut self, ok: bool, message: impl FnOnce() -> String) {
        if !ok {
            self.failures.push(message());
        }
    }

    fn fail(&mut self, message: String) {
        self.failures.push(message);
    }
}

/// One runtime on a virtual clock, fed through a bounded channel.
struct Harness {
    ctx: Arc<SimContext>,
    runtime: RiskRouteRuntime<SimContext>,
    oracle: HazardOracle,
    sender: ObservationSender,
    receiver: ObservationReceiver,
    metrics: ScenarioMetrics,
    timeline: Vec<TickFrame>,
    routes: Vec<RouteRecord>,
}

impl Harness {
    fn new(seed: u64, city: &GridCity, config: &RiskRouteConfig) -> Result<Self, SimError> {
        let ctx = SimContext::shared(seed);
        let oracle = HazardOracle::new(ctx.derive_seed(1));
        let (sender, receiver) = observation_channel(config.runtime.channel_capacity);
        let runtime = RiskRouteRuntime::new(Arc::clone(&ctx), city.build()?, config.clone())?;

        Ok(Self {
            ctx,
            runtime,
            oracle,
            sender,
            receiver,
            metrics: ScenarioMetrics::default(),
            timeline: Vec::new(),
            routes: Vec::new(),
        })
    }

    fn now(&self) -> f64 {
        self.ctx.unix_time_secs()
    }

    fn publish(&mut self, observations: &[RawObservation], channel: &str) -> Result<(), SimError> {
        let received_at_ms = (self.now() * 1000.0) as u64;
        for raw in observations {
            let envelope = to_envelope(raw, channel, received_at_ms)?;
            self.offer(envelope);
        }
        Ok(())
    }

    fn publish_bytes(&mut self, payloads: Vec<Vec<u8>>, channel: &str) {
        let received_at_ms = (self.now() * 1000.0) as u64;
        for payload in payloads {
            self.offer(ObservationEnvelope::new(payload, received_at_ms, channel));
        }
    }

    fn offer(&mut self, envelope: ObservationEnvelope) {
        self.metrics.observations_sent += 1;
        match self.sender.try_send(envelope) {
            Ok(()) => {}
            Err(EnvError::ChannelFull(_)) => self.metrics.channel_full += 1,
            Err(error) => warn!("envelope dropped: {}", error),
        }
    }

    /// Official reports that take the given edges out of service.
    fn close_roads(&mut self, edges: &[EdgeRef]) -> Result<(), SimError> {
        let now = self.now();
        let reports: Vec<_> = edges
            .iter()
            .map(|&edge| self.oracle.edge_report(SourceKind::Official, edge, 1.0, now))
            .collect();
        self.publish(&reports, "closures")
    }

    /// Advances one tick, drains one batch and fuses.
    fn step(&mut self) -> TickReport {
        let runtime_config = &self.runtime.config().runtime;
        let (interval, max_batch) = (runtime_config.tick_interval(), runtime_config.max_batch);
        self.ctx.advance_time(interval);

        let batch = self.receiver.drain_batch(max_batch);
        self.runtime.ingest(&batch.envelopes);
        let report = self.runtime.tick_now();
        self.record(&report);
        report
    }

    fn run_ticks(&mut self, ticks: u64) {
        for _ in 0..ticks {
            self.step();
        }
    }

    /// Lets `duration` pass without new observations, then ticks once.
    fn idle(&mut self, duration: Duration) -> TickReport {
        self.ctx.advance_time(duration);
        self.step()
    }

    fn route(&mut self, label: &str, request: &RouteRequest) -> Result<RouteResult, RoutingError> {
        self.metrics.routes_computed += 1;
        match self.runtime.route(request) {
            Ok(route) => {
                debug!(
                    "  {} [{}] {:.0}m avg={:.3} max={:.3}",
                    label, route.profile, route.distance_m, route.average_risk, route.max_risk
                );
                self.routes.push(RouteRecord::new(label, &route));
                Ok(route)
            }
            Err(error) => {
                if matches!(error, RoutingError::NoPathFound { .. }) {
                    self.metrics.routes_blocked += 1;
                }
                Err(error)
            }
        }
    }

    fn record(&mut self, report: &TickReport) {
        let m = &mut self.metrics;
        m.accepted += report.accepted as u64;
        m.duplicates += report.duplicates as u64;
        m.rejected += report.rejected as u64;
        m.expired_on_arrival += report.expired_on_arrival as u64;
        m.unmatched += report.unmatched as u64;
        m.displaced += report.displaced as u64;
        m.peak_risky_edges = m.peak_risky_edges.max(report.edges_updated);
        m.peak_max_risk = m.peak_max_risk.max(report.max_risk);

        let tick = self.timeline.len() as u64;
        self.timeline.push(TickFrame {
            tick,
            time_secs: self.ctx.now().as_secs_f64(),
            accepted: report.accepted,
            duplicates: report.duplicates,
            rejected: report.rejected,
            evicted: report.evicted,
            edges_updated: report.edges_updated,
            live_observations: report.live_observations,
            max_risk: report.max_risk,
        });

        if tick % 10 == 0 {
            debug!(
                "  t={:.0}s | live={} | risky edges={} | max risk={:.2}",
                self.ctx.now().as_secs_f64(),
                report.live_observations,
                report.edges_updated,
                report.max_risk
            );
        }
    }

    fn finish(mut self, scenario: ScenarioId, seed: u64, checks: Checks) -> ScenarioResult {
        self.metrics.cache_hit_rate = self.runtime.cache_stats().hit_rate();
        let passed = checks.failures.is_empty();

        ScenarioResult {
            scenario: scenario.name().to_string(),
            seed,
            passed,
            total_ticks: self.timeline.len() as u64,
            final_time_secs: self.ctx.now().as_secs_f64(),
            failure_reason: if passed { None } else { Some(checks.failures.join("; ")) },
            metrics: self.metrics,
            timeline: self.timeline,
            routes: self.routes,
        }
    }
}
