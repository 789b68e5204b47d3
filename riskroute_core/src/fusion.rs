//! The Hazard Fusion Engine - turns an observation stream into per-edge risk.
//!
//! Pipeline per tick:
//! 1. Ingest: decode, validate, dedup by content hash, compute footprint
//! 2. Expire: evict observations past their source kind's horizon
//! 3. Fuse: decayed weighted average per edge, capped corroboration boost
//! 4. Publish: `bulk_update` every live edge and zero edges that went quiet
//!
//! The engine is a plain state machine. Time comes in as an argument so that
//! the same code runs under the Tokio runtime and the simulator's virtual
//! clock.

use crate::bounded::BoundedMap;
use crate::config::FusionConfig;
use crate::decay::{spatial_decay, temporal_decay};
use crate::graph::{EdgeRef, RoadGraph};
use crate::observation::{decode_envelope, HazardLocation, HazardObservation, SourceKind, ValidationError};
use crate::spatial::SpatialIndex;
use riskroute_env::ObservationEnvelope;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

// ============================================================================
// FUSION STATE (per edge, per tick)
// ============================================================================

/// Running sums for one source kind on one edge.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct KindAccumulator {
    /// Σ severity × weight
    pub weighted_sum: f64,
    /// Σ weight
    pub weight_total: f64,
}

/// Ephemeral evidence for one edge, rebuilt from scratch every tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FusionState {
    pub per_kind: [KindAccumulator; 3],
}

impl FusionState {
    /// Adds one decayed contribution. Decay only scales the weight, so a
    /// stale or distant report counts for less but never drags the average
    /// below its own severity.
    ///
    /// # Arguments
    /// * `severity` - Calibrated severity in [0, 1]
    /// * `confidence` - Producer confidence in [0, 1]
    /// * `decay` - Temporal × spatial decay in [0, 1]
    /// * `kind_weight` - Trust weight of the source kind
    pub fn add(&mut self, kind: SourceKind, severity: f64, confidence: f64, decay: f64, kind_weight: f64) {
        let weight = confidence * decay * kind_weight;
        if !(weight > 0.0) || !weight.is_finite() {
            return;
        }
        let acc = &mut self.per_kind[kind.index()];
        acc.weighted_sum += severity * weight;
        acc.weight_total += weight;
    }

    /// Number of source kinds with non-zero evidence.
    pub fn independent_sources(&self) -> usize {
        self.per_kind.iter().filter(|a| a.weight_total > 0.0).count()
    }

    /// Weighted average over every contribution, boosted for corroboration
    /// and clamped to [0, 1]. Zero when nothing contributes.
    pub fn risk(&self, corroboration_step: f64, corroboration_cap: f64) -> f64 {
        let weight_total: f64 = self.per_kind.iter().map(|a| a.weight_total).sum();
        if !(weight_total > 0.0) {
            return 0.0;
        }
        let weighted_sum: f64 = self.per_kind.iter().map(|a| a.weighted_sum).sum();
        let base = weighted_sum / weight_total;

        let extra_sources = self.independent_sources().saturating_sub(1) as f64;
        let boost = (corroboration_step * extra_sources).min(corroboration_cap).max(0.0);

        let risk = base * (1.0 + boost);
        if risk.is_finite() {
            risk.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

// ============================================================================
// REPORTS & STATS
// ============================================================================

/// Result of ingesting one observation.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// Stored; `edges` is the size of its footprint
    Accepted { edges: usize },
    /// Content key already in the history
    Duplicate,
    /// Already past its horizon on arrival
    Expired,
    /// Valid, but no edge lies within its radius
    Unmatched,
    /// Dropped during validation
    Rejected(ValidationError),
}

/// Summary of one fusion tick (ingest counts since the previous tick).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    /// Unix seconds the tick ran at
    pub at: f64,
    pub accepted: usize,
    pub duplicates: usize,
    pub rejected: usize,
    pub expired_on_arrival: usize,
    pub unmatched: usize,
    /// Observations aged past their horizon this tick
    pub evicted: usize,
    /// Observations pushed out of the full history since the last tick
    pub displaced: usize,
    /// Edges written with a non-zero risk
    pub edges_updated: usize,
    /// Previously risky edges written back to zero
    pub edges_cleared: usize,
    pub live_observations: usize,
    pub max_risk: f64,
}

/// Per-channel ingest counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelCounters {
    pub accepted: u64,
    pub duplicates: u64,
    pub rejected: u64,
}

/// Cumulative engine statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FusionStats {
    pub ticks: u64,
    pub accepted: u64,
    pub duplicates: u64,
    pub rejected: u64,
    pub expired_on_arrival: u64,
    pub unmatched: u64,
    pub evicted: u64,
    pub displaced: u64,
    pub live_observations: usize,
    pub history_capacity: usize,
    pub risky_edges: usize,
    pub per_channel: BTreeMap<String, ChannelCounters>,
}

// ============================================================================
// FUSION ENGINE
// ============================================================================

/// A stored observation with everything the tick needs precomputed.
#[derive(Debug, Clone)]
struct StoredObservation {
    observation: HazardObservation,
    /// Calibrated severity in [0, 1]
    severity: f64,
    /// Affected edges with their spatial decay factor
    footprint: Vec<(EdgeRef, f64)>,
}

/// Fuses observations into the shared Graph Store.
///
/// Single writer: exactly one engine should publish into a given graph.
#[derive(Debug)]
pub struct FusionEngine {
    config: FusionConfig,
    graph: Arc<RoadGraph>,
    spatial: Arc<SpatialIndex>,

    /// Observation history and dedup index, keyed by content hash
    history: BoundedMap<u64, StoredObservation>,

    /// Edges published with non-zero risk on the previous tick
    active_edges: HashSet<EdgeRef>,

    /// Counts accumulated since the previous tick
    pending: TickReport,

    stats: FusionStats,
}

impl FusionEngine {
    pub fn new(config: FusionConfig, graph: Arc<RoadGraph>, spatial: Arc<SpatialIndex>) -> Self {
        let history = BoundedMap::new(config.history_capacity);
        let stats = FusionStats {
            history_capacity: history.capacity(),
            ..Default::default()
        };
        Self {
            config,
            graph,
            spatial,
            history,
            active_edges: HashSet::new(),
            pending: TickReport::default(),
            stats,
        }
    }

    // ========================================================================
    // INGESTION
    // ========================================================================

    /// Decodes and ingests a batch of envelopes. Malformed payloads are
    /// logged and counted; they never abort the batch.
    pub fn ingest_envelopes(&mut self, envelopes: &[ObservationEnvelope], now: f64) -> Vec<IngestOutcome> {
        envelopes
            .iter()
            .map(|envelope| {
                let outcome = match decode_envelope(envelope, now, self.config.max_future_skew_s) {
                    Ok(observation) => self.ingest(observation, now),
                    Err(error) => self.reject(error),
                };
                self.count_channel(&envelope.channel, &outcome);
                outcome
            })
            .collect()
    }

    /// Ingests an already validated observation.
    pub fn ingest(&mut self, observation: HazardObservation, now: f64) -> IngestOutcome {
        let key = observation.content_hash();
        if self.history.contains_key(&key) {
            self.pending.duplicates += 1;
            self.stats.duplicates += 1;
            tracing::trace!(content_key = %observation.content_key, "duplicate observation dropped");
            return IngestOutcome::Duplicate;
        }

        if self.temporal_weight(&observation, now) <= 0.0 {
            self.pending.expired_on_arrival += 1;
            self.stats.expired_on_arrival += 1;
            return IngestOutcome::Expired;
        }

        let footprint = match self.footprint(&observation) {
            Ok(footprint) => footprint,
            Err(error) => return self.reject(error),
        };
        if footprint.is_empty() {
            self.pending.unmatched += 1;
            self.stats.unmatched += 1;
            tracing::debug!(content_key = %observation.content_key, "observation matched no edges");
            return IngestOutcome::Unmatched;
        }

        let edges = footprint.len();
        let severity = observation.measure.severity(&self.config.depth);
        let stored = StoredObservation {
            observation,
            severity,
            footprint,
        };

        if let Some((_, displaced)) = self.history.insert(key, stored) {
            self.pending.displaced += 1;
            self.stats.displaced += 1;
            tracing::debug!(content_key = %displaced.observation.content_key, "history full, oldest observation displaced");
        }

        self.pending.accepted += 1;
        self.stats.accepted += 1;
        IngestOutcome::Accepted { edges }
    }

    // ========================================================================
    // TICK
    // ========================================================================

    /// Expires old observations, fuses every live edge and publishes the
    /// result into the Graph Store.
    ///
    /// # Arguments
    /// * `now` - Current unix time in seconds
    pub fn tick(&mut self, now: f64) -> TickReport {
        let mut report = std::mem::take(&mut self.pending);
        report.at = now;

        // 1. Expire
        let expired = {
            let decay = self.config.temporal_decay;
            self.history.remove_where(|_, stored| {
                let horizon = decay.for_kind(stored.observation.source_kind).horizon_s;
                now - stored.observation.observed_at >= horizon
            })
        };
        report.evicted = expired.len();

        // 2. Fuse
        let states = self.fuse(now);
        let mut updates: HashMap<EdgeRef, f64> = states
            .iter()
            .map(|(&edge, state)| {
                (edge, state.risk(self.config.corroboration_step, self.config.corroboration_cap))
            })
            .collect();

        // 3. Edges that were risky last tick but have no evidence now go to zero
        let mut cleared = 0;
        for &edge in &self.active_edges {
            updates.entry(edge).or_insert_with(|| {
                cleared += 1;
                0.0
            });
        }

        // 4. Publish
        self.graph.bulk_update(&updates, now);
        self.active_edges = updates
            .iter()
            .filter(|(_, risk)| **risk > 0.0)
            .map(|(&edge, _)| edge)
            .collect();

        report.edges_updated = self.active_edges.len();
        report.edges_cleared = cleared;
        report.live_observations = self.history.len();
        report.max_risk = updates.values().copied().fold(0.0, f64::max);

        self.stats.ticks += 1;
        self.stats.evicted += report.evicted as u64;
        self.stats.live_observations = report.live_observations;
        self.stats.risky_edges = self.active_edges.len();

        tracing::debug!(
            accepted = report.accepted,
            duplicates = report.duplicates,
            rejected = report.rejected,
            evicted = report.evicted,
            edges_updated = report.edges_updated,
            edges_cleared = report.edges_cleared,
            max_risk = report.max_risk,
            "fusion tick"
        );

        report
    }

    /// Builds the evidence for every edge touched by a live observation.
    pub fn fuse(&self, now: f64) -> HashMap<EdgeRef, FusionState> {
        let mut states: HashMap<EdgeRef, FusionState> = HashMap::new();
        for (_, stored) in self.history.iter() {
            let obs = &stored.observation;
            let temporal = self.temporal_weight(obs, now);
            if temporal <= 0.0 {
                continue;
            }
            let kind_weight = self.config.source_weights.weight(obs.source_kind);
            for &(edge, spatial) in &stored.footprint {
                states.entry(edge).or_default().add(
                    obs.source_kind,
                    stored.severity,
                    obs.confidence,
                    temporal * spatial,
                    kind_weight,
                );
            }
        }
        states
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn stats(&self) -> FusionStats {
        self.stats.clone()
    }

    pub fn live_observations(&self) -> usize {
        self.history.len()
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub fn graph(&self) -> &Arc<RoadGraph> {
        &self.graph
    }

    // ========== Private Helper Methods ==========

    fn temporal_weight(&self, observation: &HazardObservation, now: f64) -> f64 {
        let decay = self.config.temporal_decay.for_kind(observation.source_kind);
        temporal_decay(now - observation.observed_at, decay.half_life_s, decay.horizon_s)
    }

    /// Edges the observation reaches, with their spatial decay factor.
    fn footprint(&self, observation: &HazardObservation) -> Result<Vec<(EdgeRef, f64)>, ValidationError> {
        match observation.location {
            HazardLocation::Edge(edge) => {
                if self.graph.contains_edge(edge) {
                    Ok(vec![(edge, 1.0)])
                } else {
                    Err(ValidationError::UnknownEdge(edge))
                }
            }
            HazardLocation::Point(point) => {
                let radius = observation.radius_m.unwrap_or(self.config.default_radius_m);
                let kind = observation
                    .flow
                    .map(|flow| flow.decay_kind())
                    .unwrap_or(self.config.spatial_decay);
                Ok(self
                    .spatial
                    .query_radius(&point, radius)
                    .into_iter()
                    .map(|(edge, distance)| (edge, spatial_decay(kind, distance, radius)))
                    .filter(|&(_, factor)| factor > 0.0)
                    .collect())
            }
        }
    }

    fn reject(&mut self, error: ValidationError) -> IngestOutcome {
        self.pending.rejected += 1;
        self.stats.rejected += 1;
        tracing::warn!(error = %error, "dropping malformed observation");
        IngestOutcome::Rejected(error)
    }

    fn count_channel(&mut self, channel: &str, outcome: &IngestOutcome) {
        let counters = self.stats.per_channel.entry(channel.to_string()).or_default();
        match outcome {
            IngestOutcome::Accepted { .. } => counters.accepted += 1,
            IngestOutcome::Duplicate => counters.duplicates += 1,
            IngestOutcome::Rejected(_) => counters.rejected += 1,
            IngestOutcome::Expired | IngestOutcome::Unmatched => {}
        }
    }
}
