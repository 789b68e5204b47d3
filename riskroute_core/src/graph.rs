//! The Graph Store - static road topology with live per-edge risk.
//!
//! Topology (nodes, edges, lengths) is fixed when [`RoadGraphBuilder::build`]
//! returns. The only mutable state is each edge's `risk_score` and
//! `last_fused_at`, stored as f64 bit patterns in atomics so that readers
//! (routing requests) never observe a torn write while the fusion engine
//! publishes a new tick.

use crate::geodesy::{haversine_m, BoundingBox, Coordinate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque node identifier supplied by the graph construction step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Identifies one directed edge; `key` distinguishes parallel lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeRef {
    pub from: NodeId,
    pub to: NodeId,
    pub key: u32,
}

impl EdgeRef {
    pub fn new(from: NodeId, to: NodeId, key: u32) -> Self {
        Self { from, to, key }
    }
}

impl fmt::Display for EdgeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}#{}", self.from, self.to, self.key)
    }
}

/// A road-network node. Immutable after load.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub position: Coordinate,
}

/// Point-in-time copy of an edge's state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeSnapshot {
    pub edge_ref: EdgeRef,
    pub length_m: f64,
    pub risk_score: f64,
    /// Unix seconds of the last fusion write, `None` if never fused
    pub last_fused_at: Option<f64>,
}

/// Internal edge storage.
#[derive(Debug)]
struct EdgeSlot {
    edge_ref: EdgeRef,
    length_m: f64,
    risk_bits: AtomicU64,
    fused_at_bits: AtomicU64,
}

impl EdgeSlot {
    fn snapshot(&self) -> EdgeSnapshot {
        let fused_at = f64::from_bits(self.fused_at_bits.load(Ordering::Acquire));
        EdgeSnapshot {
            edge_ref: self.edge_ref,
            length_m: self.length_m,
            risk_score: f64::from_bits(self.risk_bits.load(Ordering::Acquire)),
            last_fused_at: if fused_at.is_nan() { None } else { Some(fused_at) },
        }
    }

    fn store_risk(&self, risk: f64) {
        self.risk_bits.store(risk.to_bits(), Ordering::Release);
    }
}

// ============================================================================
// BUILDER
// ============================================================================

/// Collects topology from the external graph construction step.
#[derive(Debug, Default)]
pub struct RoadGraphBuilder {
    nodes: Vec<Node>,
    edges: Vec<(EdgeRef, Option<f64>)>,
}

impl RoadGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: NodeId, position: Coordinate) -> &mut Self {
        self.nodes.push(Node { id, position });
        self
    }

    /// Adds a directed edge. A `None` length is filled in with the
    /// great-circle distance between the endpoints.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId, key: u32, length_m: Option<f64>) -> &mut Self {
        self.edges.push((EdgeRef::new(from, to, key), length_m));
        self
    }

    /// Adds the edge in both directions with the same key and length.
    pub fn add_road(&mut self, a: NodeId, b: NodeId, length_m: Option<f64>) -> &mut Self {
        self.add_edge(a, b, 0, length_m);
        self.add_edge(b, a, 0, length_m)
    }

    /// Validates the topology and freezes it.
    pub fn build(self) -> Result<RoadGraph, GraphError> {
        let mut node_index = HashMap::with_capacity(self.nodes.len());
        for (idx, node) in self.nodes.iter().enumerate() {
            if !node.position.is_valid() {
                return Err(GraphError::InvalidTopology(format!(
                    "node {} has invalid coordinates ({}, {})",
                    node.id, node.position.lat, node.position.lon
                )));
            }
            if node_index.insert(node.id, idx).is_some() {
                return Err(GraphError::InvalidTopology(format!("duplicate node {}", node.id)));
            }
        }

        let mut edges = Vec::with_capacity(self.edges.len());
        let mut edge_index = HashMap::with_capacity(self.edges.len());
        let mut outgoing = vec![Vec::new(); self.nodes.len()];
        let mut heuristic_scale: f64 = 1.0;

        for (edge_ref, length) in self.edges {
            let from_idx = *node_index
                .get(&edge_ref.from)
                .ok_or(GraphError::NodeNotFound(edge_ref.from))?;
            let to_idx = *node_index
                .get(&edge_ref.to)
                .ok_or(GraphError::NodeNotFound(edge_ref.to))?;

            let straight = haversine_m(&self.nodes[from_idx].position, &self.nodes[to_idx].position);
            let length_m = length.unwrap_or(straight);
            if !length_m.is_finite() || length_m <= 0.0 {
                return Err(GraphError::InvalidTopology(format!(
                    "edge {} has invalid length {}",
                    edge_ref, length_m
                )));
            }

            // Keep the haversine heuristic a lower bound even when supplied
            // lengths undercut the straight line.
            if straight > 1e-6 {
                heuristic_scale = heuristic_scale.min(length_m / straight);
            }

            let slot_idx = edges.len();
            if edge_index.insert(edge_ref, slot_idx).is_some() {
                return Err(GraphError::InvalidTopology(format!("duplicate edge {}", edge_ref)));
            }
            edges.push(EdgeSlot {
                edge_ref,
                length_m,
                risk_bits: AtomicU64::new(0.0f64.to_bits()),
                fused_at_bits: AtomicU64::new(f64::NAN.to_bits()),
            });
            outgoing[from_idx].push(slot_idx);
        }

        // Parallel edges come out in key order
        for list in outgoing.iter_mut() {
            list.sort_by_key(|&i| edges[i].edge_ref);
        }

        let bbox = BoundingBox::from_points(self.nodes.iter().map(|n| &n.position));

        Ok(RoadGraph {
            nodes: self.nodes,
            node_index,
            edges,
            edge_index,
            outgoing,
            bbox,
            heuristic_scale,
        })
    }
}

// ============================================================================
// GRAPH STORE
// ============================================================================

/// Immutable topology plus atomically updated per-edge risk.
///
/// Shared as `Arc<RoadGraph>` between the fusion engine (single writer) and
/// any number of concurrent routing requests.
#[derive(Debug)]
pub struct RoadGraph {
    nodes: Vec<Node>,
    node_index: HashMap<NodeId, usize>,
    edges: Vec<EdgeSlot>,
    edge_index: HashMap<EdgeRef, usize>,
    outgoing: Vec<Vec<usize>>,
    bbox: Option<BoundingBox>,
    heuristic_scale: f64,
}

impl RoadGraph {
    /// Point read of one edge.
    pub fn get_edge(&self, edge: EdgeRef) -> Result<EdgeSnapshot, GraphError> {
        self.slot(edge).map(EdgeSlot::snapshot)
    }

    /// Current fused risk of an edge.
    pub fn risk(&self, edge: EdgeRef) -> Result<f64, GraphError> {
        self.get_edge(edge).map(|e| e.risk_score)
    }

    /// Atomically replaces one edge's risk.
    ///
    /// Rejects values outside [0, 1] (including NaN) without touching the edge.
    pub fn update_risk(&self, edge: EdgeRef, risk: f64) -> Result<(), GraphError> {
        let slot = self.slot(edge)?;
        if !(0.0..=1.0).contains(&risk) {
            return Err(GraphError::RiskOutOfRange { edge, risk });
        }
        slot.store_risk(risk);
        Ok(())
    }

    /// Applies many risk writes, stamping each with `fused_at`.
    ///
    /// Every edge is updated atomically on its own; the batch as a whole is
    /// not, so a concurrent reader may see a mix of old and new values.
    /// Invalid entries are skipped and logged. Returns the number applied.
    pub fn bulk_update(&self, updates: &HashMap<EdgeRef, f64>, fused_at: f64) -> usize {
        let mut applied = 0;
        for (&edge, &risk) in updates {
            match self.update_risk(edge, risk) {
                Ok(()) => {
                    if let Ok(slot) = self.slot(edge) {
                        slot.fused_at_bits.store(fused_at.to_bits(), Ordering::Release);
                    }
                    applied += 1;
                }
                Err(e) => tracing::warn!(%edge, error = %e, "rejected risk update"),
            }
        }
        applied
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, GraphError> {
        self.node_index
            .get(&id)
            .map(|&i| &self.nodes[i])
            .ok_or(GraphError::NodeNotFound(id))
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.node_index.contains_key(&id)
    }

    pub fn contains_edge(&self, edge: EdgeRef) -> bool {
        self.edge_index.contains_key(&edge)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// All edge refs in insertion order.
    pub fn edge_refs(&self) -> impl Iterator<Item = EdgeRef> + '_ {
        self.edges.iter().map(|e| e.edge_ref)
    }

    /// Snapshots of every edge leaving `node` (empty for unknown nodes).
    pub fn outgoing(&self, node: NodeId) -> impl Iterator<Item = EdgeSnapshot> + '_ {
        self.node_index
            .get(&node)
            .map(|&i| self.outgoing[i].as_slice())
            .unwrap_or(&[])
            .iter()
            .map(move |&slot| self.edges[slot].snapshot())
    }

    /// Endpoint coordinates of an edge.
    pub fn edge_endpoints(&self, edge: EdgeRef) -> Result<(Coordinate, Coordinate), GraphError> {
        Ok((self.node(edge.from)?.position, self.node(edge.to)?.position))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        self.bbox
    }

    /// Factor in (0, 1] applied to the haversine heuristic so it never
    /// exceeds any edge's length-to-straight-line ratio.
    pub fn heuristic_scale(&self) -> f64 {
        self.heuristic_scale
    }

    /// Number of edges whose risk is strictly positive.
    pub fn edges_at_risk(&self) -> usize {
        self.edges
            .iter()
            .filter(|e| f64::from_bits(e.risk_bits.load(Ordering::Acquire)) > 0.0)
            .count()
    }

    fn slot(&self, edge: EdgeRef) -> Result<&EdgeSlot, GraphError> {
        self.edge_index
            .get(&edge)
            .map(|&i| &self.edges[i])
            .ok_or(GraphError::EdgeNotFound(edge))
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Errors from Graph Store operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    #[error("Edge not found: {0}")]
    EdgeNotFound(EdgeRef),

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Risk {risk} for edge {edge} is outside [0, 1]")]
    RiskOutOfRange { edge: EdgeRef, risk: f64 },

    #[error("Invalid topology: {0}")]
    InvalidTopology(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geodesy::offset_m;
    use approx::assert_relative_eq;
    use std::sync::Arc;

    fn line_graph() -> RoadGraph {
        let origin = Coordinate::new(14.6, 121.0);
        let mut builder = RoadGraphBuilder::new();
        for i in 0..4u64 {
            builder.add_node(NodeId(i), offset_m(&origin, i as f64 * 100.0, 0.0));
        }
        for i in 0..3u64 {
            builder.add_edge(NodeId(i), NodeId(i + 1), 0, Some(100.0));
        }
        builder.build().unwrap()
    }

    fn e(from: u64, to: u64) -> EdgeRef {
        EdgeRef::new(NodeId(from), NodeId(to), 0)
    }

    #[test]
    fn test_get_edge_defaults() {
        let graph = line_graph();
        let edge = graph.get_edge(e(0, 1)).unwrap();
        assert_eq!(edge.length_m, 100.0);
        assert_eq!(edge.risk_score, 0.0);
        assert!(edge.last_fused_at.is_none());
    }

    #[test]
    fn test_get_edge_not_found() {
        let graph = line_graph();
        assert_eq!(graph.get_edge(e(1, 0)), Err(GraphError::EdgeNotFound(e(1, 0))));
    }

    #[test]
    fn test_update_risk_rejects_out_of_range() {
        let graph = line_graph();
        assert!(matches!(
            graph.update_risk(e(0, 1), 1.5),
            Err(GraphError::RiskOutOfRange { .. })
        ));
        assert!(graph.update_risk(e(0, 1), f64::NAN).is_err());
        assert!(graph.update_risk(e(0, 1), -0.1).is_err());

        // Edge untouched after rejection
        assert_eq!(graph.risk(e(0, 1)).unwrap(), 0.0);

        graph.update_risk(e(0, 1), 0.7).unwrap();
        assert_relative_eq!(graph.risk(e(0, 1)).unwrap(), 0.7);
    }

    #[test]
    fn test_bulk_update_counts_applied() {
        let graph = line_graph();
        let mut updates = HashMap::new();
        updates.insert(e(0, 1), 0.2);
        updates.insert(e(1, 2), 0.4);
        updates.insert(e(2, 3), 2.0); // rejected
        updates.insert(e(3, 2), 0.1); // unknown edge

        assert_eq!(graph.bulk_update(&updates, 1_700_000_000.0), 2);
        assert_eq!(graph.get_edge(e(1, 2)).unwrap().last_fused_at, Some(1_700_000_000.0));
        assert!(graph.get_edge(e(2, 3)).unwrap().last_fused_at.is_none());
        assert_eq!(graph.edges_at_risk(), 2);
    }

    #[test]
    fn test_build_rejects_dangling_edge() {
        let mut builder = RoadGraphBuilder::new();
        builder.add_node(NodeId(1), Coordinate::new(0.0, 0.0));
        builder.add_edge(NodeId(1), NodeId(2), 0, Some(10.0));
        assert_eq!(builder.build().unwrap_err(), GraphError::NodeNotFound(NodeId(2)));
    }

    #[test]
    fn test_parallel_edges_and_computed_length() {
        let origin = Coordinate::new(14.6, 121.0);
        let mut builder = RoadGraphBuilder::new();
        builder.add_node(NodeId(1), origin);
        builder.add_node(NodeId(2), offset_m(&origin, 250.0, 0.0));
        builder.add_edge(NodeId(1), NodeId(2), 1, Some(400.0));
        builder.add_edge(NodeId(1), NodeId(2), 0, None);
        let graph = builder.build().unwrap();

        let out: Vec<EdgeSnapshot> = graph.outgoing(NodeId(1)).collect();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].edge_ref.key, 0);
        assert_relative_eq!(out[0].length_m, 250.0, epsilon = 0.5);
        assert_eq!(out[1].length_m, 400.0);
    }

    #[test]
    fn test_heuristic_scale_tracks_short_lengths() {
        let origin = Coordinate::new(14.6, 121.0);
        let mut builder = RoadGraphBuilder::new();
        builder.add_node(NodeId(1), origin);
        builder.add_node(NodeId(2), offset_m(&origin, 200.0, 0.0));
        builder.add_edge(NodeId(1), NodeId(2), 0, Some(100.0));
        let graph = builder.build().unwrap();
        assert_relative_eq!(graph.heuristic_scale(), 0.5, epsilon = 1e-3);
    }

    #[test]
    fn test_concurrent_readers_never_see_out_of_range() {
        let graph = Arc::new(line_graph());
        let writer = {
            let graph = Arc::clone(&graph);
            std::thread::spawn(move || {
                for i in 0..10_000 {
                    let risk = if i % 2 == 0 { 0.0 } else { 1.0 };
                    graph.update_risk(e(0, 1), risk).unwrap();
                }
            })
        };
        for _ in 0..10_000 {
            let r = graph.risk(e(0, 1)).unwrap();
            assert!(r == 0.0 || r == 1.0);
        }
        writer.join().unwrap();
    }
}
