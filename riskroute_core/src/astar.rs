//! A* search over the directed road multigraph.
//!
//! The edge cost is supplied by the caller and may exclude edges outright.
//! The heuristic is the great-circle distance to the goal scaled by the
//! graph's `heuristic_scale`; every admissible cost function is at least the
//! edge length, so the heuristic never overestimates.

use crate::geodesy::haversine_m;
use crate::graph::{EdgeSnapshot, NodeId, RoadGraph};
use crate::router::RoutingError;
use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::time::{Duration, Instant};

/// Deadline checks happen once per this many expansions.
const DEADLINE_CHECK_INTERVAL: usize = 256;

/// Effort bounds for one search.
#[derive(Debug, Clone, Copy)]
pub struct SearchLimits {
    pub max_expanded: usize,
    pub timeout: Option<Duration>,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            max_expanded: 200_000,
            timeout: None,
        }
    }
}

/// A path found by [`astar`].
#[derive(Debug, Clone, PartialEq)]
pub struct SearchPath {
    /// Nodes from start to goal inclusive
    pub nodes: Vec<NodeId>,
    /// Edges traversed, as read during the search
    pub edges: Vec<EdgeSnapshot>,
    /// Total cost under the search's cost function
    pub cost: f64,
    pub expanded: usize,
}

/// Open-set entry. Ordered so the max-heap pops the lowest f, then the
/// lowest node id.
#[derive(Debug, Clone, Copy)]
struct QueueEntry {
    f: f64,
    g: f64,
    node: NodeId,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| other.node.cmp(&self.node))
    }
}

/// Runs A* from `start` to `goal`.
///
/// # Arguments
/// * `edge_cost` - Cost of traversing an edge, `None` to exclude it. Must be
///   at least the edge length for the result to be optimal.
/// * `limits` - Expansion and wall-clock budget
///
/// # Returns
/// The cheapest path, `NoPathFound` when the reachable graph is exhausted,
/// or `SearchBudgetExceeded` when a limit cut the search short.
pub fn astar<F>(
    graph: &RoadGraph,
    start: NodeId,
    goal: NodeId,
    edge_cost: F,
    limits: &SearchLimits,
) -> Result<SearchPath, RoutingError>
where
    F: Fn(&EdgeSnapshot) -> Option<f64>,
{
    let goal_pos = graph
        .node(goal)
        .map_err(|e| RoutingError::InvalidRequest(e.to_string()))?
        .position;
    graph
        .node(start)
        .map_err(|e| RoutingError::InvalidRequest(e.to_string()))?;

    if start == goal {
        return Ok(SearchPath {
            nodes: vec![start],
            edges: Vec::new(),
            cost: 0.0,
            expanded: 0,
        });
    }

    let scale = graph.heuristic_scale();
    let heuristic = |node: NodeId| -> f64 {
        graph
            .node(node)
            .map(|n| haversine_m(&n.position, &goal_pos) * scale)
            .unwrap_or(0.0)
    };

    let started = Instant::now();
    let mut open = BinaryHeap::new();
    let mut best_g: HashMap<NodeId, f64> = HashMap::new();
    let mut came_from: HashMap<NodeId, EdgeSnapshot> = HashMap::new();
    let mut closed: HashSet<NodeId> = HashSet::new();
    let mut expanded = 0usize;

    best_g.insert(start, 0.0);
    open.push(QueueEntry {
        f: heuristic(start),
        g: 0.0,
        node: start,
    });

    while let Some(QueueEntry { g, node, .. }) = open.pop() {
        if closed.contains(&node) {
            continue;
        }
        if node == goal {
            return Ok(reconstruct(start, goal, g, expanded, &came_from));
        }

        if expanded >= limits.max_expanded {
            return Err(RoutingError::SearchBudgetExceeded { expanded });
        }
        if let Some(timeout) = limits.timeout {
            if expanded % DEADLINE_CHECK_INTERVAL == 0 && started.elapsed() > timeout {
                return Err(RoutingError::SearchBudgetExceeded { expanded });
            }
        }

        closed.insert(node);
        expanded += 1;

        for edge in graph.outgoing(node) {
            let next = edge.edge_ref.to;
            if closed.contains(&next) {
                continue;
            }
            let Some(cost) = edge_cost(&edge) else {
                continue;
            };
            if !cost.is_finite() || cost < 0.0 {
                continue;
            }

            let tentative = g + cost;
            let improved = match best_g.entry(next) {
                Entry::Vacant(slot) => {
                    slot.insert(tentative);
                    true
                }
                Entry::Occupied(mut slot) if tentative < *slot.get() => {
                    slot.insert(tentative);
                    true
                }
                Entry::Occupied(_) => false,
            };
            if improved {
                came_from.insert(next, edge);
                open.push(QueueEntry {
                    f: tentative + heuristic(next),
                    g: tentative,
                    node: next,
                });
            }
        }
    }

    Err(RoutingError::NoPathFound { expanded })
}

fn reconstruct(
    start: NodeId,
    goal: NodeId,
    cost: f64,
    expanded: usize,
    came_from: &HashMap<NodeId, EdgeSnapshot>,
) -> SearchPath {
    let mut edges = Vec::new();
    let mut current = goal;
    while current != start {
        match came_from.get(&current) {
            Some(edge) => {
                edges.push(*edge);
                current = edge.edge_ref.from;
            }
            None => break,
        }
    }
    edges.reverse();

    let mut nodes = Vec::with_capacity(edges.len() + 1);
    nodes.push(start);
    nodes.extend(edges.iter().map(|e| e.edge_ref.to));

    SearchPath {
        nodes,
        edges,
        cost,
        expanded,
    }
}
