//! The Spatial Index - uniform H3 grid over the road network.
//!
//! Every edge is registered in each H3 cell its segment passes through, every
//! node in the cell that contains it. The resolution is chosen per graph so
//! the expected number of edges per cell lands in a configured band, which
//! keeps radius queries cheap on both dense downtown grids and sparse rural
//! networks.
//!
//! Queries expand a grid disk around the query cell that is wide enough to
//! contain the whole search radius, then filter candidates by exact
//! great-circle distance. A query therefore never misses an edge inside the
//! radius and never returns one outside it.

use crate::config::SpatialConfig;
use crate::geodesy::{haversine_m, point_segment_distance_m, Coordinate};
use crate::graph::{EdgeRef, NodeId, RoadGraph};
use h3o::{CellIndex, LatLng, Resolution};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Contents of one H3 cell.
#[derive(Debug, Default, Clone)]
struct CellBucket {
    edges: Vec<EdgeRef>,
    nodes: Vec<NodeId>,
}

/// Grid index mapping H3 cells to the edges and nodes they contain.
#[derive(Debug)]
pub struct SpatialIndex {
    /// Primary index: H3 cell -> contents
    cells: HashMap<CellIndex, CellBucket>,

    /// Segment geometry for exact distance filtering
    edge_geometry: HashMap<EdgeRef, (Coordinate, Coordinate)>,

    /// Node positions for nearest-node queries
    node_positions: HashMap<NodeId, Coordinate>,

    /// Chosen H3 resolution
    resolution: Resolution,

    /// Average edge length of a cell at `resolution`, in meters
    cell_edge_m: f64,
}

impl SpatialIndex {
    /// Builds the index for `graph`.
    pub fn build(graph: &RoadGraph, config: &SpatialConfig) -> Result<Self, SpatialError> {
        let bbox = graph.bounding_box().ok_or(SpatialError::EmptyGraph)?;
        let resolution = select_resolution(bbox.area_m2(), graph.edge_count(), config)?;
        let cell_edge_m = resolution.edge_length_m();

        let mut index = SpatialIndex {
            cells: HashMap::new(),
            edge_geometry: HashMap::with_capacity(graph.edge_count()),
            node_positions: HashMap::with_capacity(graph.node_count()),
            resolution,
            cell_edge_m,
        };

        for node in graph.nodes() {
            let cell = index.cell_of(&node.position)?;
            index.cells.entry(cell).or_default().nodes.push(node.id);
            index.node_positions.insert(node.id, node.position);
        }

        for edge in graph.edge_refs() {
            let (a, b) = graph
                .edge_endpoints(edge)
                .map_err(|e| SpatialError::InvalidCoordinates(e.to_string()))?;
            for cell in index.cells_along(&a, &b)? {
                index.cells.entry(cell).or_default().edges.push(edge);
            }
            index.edge_geometry.insert(edge, (a, b));
        }

        tracing::debug!(
            resolution = u8::from(resolution),
            cells = index.cells.len(),
            edges = graph.edge_count(),
            "spatial index built"
        );

        Ok(index)
    }

    /// Edges within `radius_m` of `point`, closest first, with their distance.
    ///
    /// Invalid points or radii yield an empty result.
    pub fn query_radius(&self, point: &Coordinate, radius_m: f64) -> Vec<(EdgeRef, f64)> {
        if !point.is_valid() || !radius_m.is_finite() || radius_m < 0.0 {
            return Vec::new();
        }

        let mut seen = HashSet::new();
        let mut hits = Vec::new();
        for bucket in self.buckets_within(point, radius_m) {
            for &edge in &bucket.edges {
                if !seen.insert(edge) {
                    continue;
                }
                if let Some((a, b)) = self.edge_geometry.get(&edge) {
                    let d = point_segment_distance_m(point, a, b);
                    if d <= radius_m {
                        hits.push((edge, d));
                    }
                }
            }
        }

        hits.sort_by(|x, y| x.1.total_cmp(&y.1).then(x.0.cmp(&y.0)));
        hits
    }

    /// The closest node no farther than `max_distance_m` from `point`.
    ///
    /// Returns `NoCoverage` rather than an arbitrarily distant node. Ties are
    /// broken by node id.
    pub fn nearest_node(&self, point: &Coordinate, max_distance_m: f64) -> Result<NodeId, SpatialError> {
        if !point.is_valid() {
            return Err(SpatialError::InvalidCoordinates(format!("({}, {})", point.lat, point.lon)));
        }
        let no_coverage = SpatialError::NoCoverage {
            lat: point.lat,
            lon: point.lon,
            max_distance_m,
        };
        if !max_distance_m.is_finite() || max_distance_m < 0.0 {
            return Err(no_coverage);
        }

        let mut best: Option<(f64, NodeId)> = None;
        for bucket in self.buckets_within(point, max_distance_m) {
            for &node in &bucket.nodes {
                let Some(pos) = self.node_positions.get(&node) else {
                    continue;
                };
                let d = haversine_m(point, pos);
                if d > max_distance_m {
                    continue;
                }
                let better = match best {
                    None => true,
                    Some((bd, bn)) => d < bd || (d == bd && node < bn),
                };
                if better {
                    best = Some((d, node));
                }
            }
        }

        best.map(|(_, node)| node).ok_or(no_coverage)
    }

    /// Statistics about the grid.
    pub fn stats(&self) -> SpatialStats {
        let total_cells = self.cells.len();
        let edge_entries: usize = self.cells.values().map(|b| b.edges.len()).sum();
        SpatialStats {
            resolution: u8::from(self.resolution),
            cell_edge_m: self.cell_edge_m,
            total_cells,
            edge_entries,
            avg_edges_per_cell: if total_cells > 0 {
                edge_entries as f64 / total_cells as f64
            } else {
                0.0
            },
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    // ========== Private Helper Methods ==========

    fn cell_of(&self, point: &Coordinate) -> Result<CellIndex, SpatialError> {
        let latlng = LatLng::new(point.lat, point.lon)
            .map_err(|e| SpatialError::InvalidCoordinates(format!("{:?}", e)))?;
        Ok(latlng.to_cell(self.resolution))
    }

    /// Cells touched by segment a-b, sampled at a quarter of the cell edge.
    fn cells_along(&self, a: &Coordinate, b: &Coordinate) -> Result<HashSet<CellIndex>, SpatialError> {
        let length = haversine_m(a, b);
        let step = (self.cell_edge_m / 4.0).max(1.0);
        let samples = (length / step).ceil().max(1.0) as usize;

        let mut cells = HashSet::new();
        for i in 0..=samples {
            let t = i as f64 / samples as f64;
            let p = Coordinate::new(a.lat + (b.lat - a.lat) * t, a.lon + (b.lon - a.lon) * t);
            cells.insert(self.cell_of(&p)?);
        }
        Ok(cells)
    }

    /// Buckets whose cells may hold anything within `radius_m` of `point`.
    fn buckets_within<'a>(&'a self, point: &Coordinate, radius_m: f64) -> Vec<&'a CellBucket> {
        let Ok(center) = self.cell_of(point) else {
            return Vec::new();
        };

        // H3 cells vary in size across the globe, so rings are counted in
        // half cell edges, plus two rings for the query and sample offsets.
        let k = (2.0 * radius_m / self.cell_edge_m).ceil() as u64 + 2;
        let disk_cells = 3 * k * (k + 1) + 1;

        if disk_cells >= self.cells.len() as u64 || k > u32::MAX as u64 {
            return self.cells.values().collect();
        }

        center
            .grid_disk_safe(k as u32)
            .filter_map(|cell| self.cells.get(&cell))
            .collect()
    }
}

/// Picks the resolution whose expected edges-per-cell is closest to the
/// centre of the configured band (in log space).
fn select_resolution(area_m2: f64, edge_count: usize, config: &SpatialConfig) -> Result<Resolution, SpatialError> {
    let target = (config.target_edges_per_cell_min * config.target_edges_per_cell_max).sqrt();
    let edges = edge_count.max(1) as f64;

    let mut best: Option<(f64, Resolution)> = None;
    for raw in config.min_resolution..=config.max_resolution {
        let resolution = Resolution::try_from(raw)
            .map_err(|e| SpatialError::InvalidResolution(format!("{:?}", e)))?;
        let cells = (area_m2 / resolution.area_m2()).max(1.0);
        let expected = edges / cells;
        let score = (expected.ln() - target.ln()).abs();
        // Finer resolution wins ties
        if best.map_or(true, |(s, _)| score <= s) {
            best = Some((score, resolution));
        }
    }

    best.map(|(_, r)| r)
        .ok_or_else(|| SpatialError::InvalidResolution("empty resolution range".to_string()))
}

/// Statistics about the spatial index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpatialStats {
    pub resolution: u8,
    pub cell_edge_m: f64,
    pub total_cells: usize,
    pub edge_entries: usize,
    pub avg_edges_per_cell: f64,
}

/// Errors from spatial queries and index construction.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SpatialError {
    /// No node within the allowed snapping distance. Not retryable.
    #[error("No road coverage within {max_distance_m}m of ({lat}, {lon})")]
    NoCoverage { lat: f64, lon: f64, max_distance_m: f64 },

    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),

    #[error("Invalid H3 resolution: {0}")]
    InvalidResolution(String),

    #[error("Cannot index an empty graph")]
    EmptyGraph,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geodesy::offset_m;
    use crate::graph::RoadGraphBuilder;

    /// n x n grid of two-way roads with `spacing` meters between nodes.
    fn grid(n: u64, spacing: f64) -> RoadGraph {
        let origin = Coordinate::new(14.6, 121.0);
        let mut builder = RoadGraphBuilder::new();
        for r in 0..n {
            for c in 0..n {
                builder.add_node(NodeId(r * n + c), offset_m(&origin, c as f64 * spacing, r as f64 * spacing));
            }
        }
        for r in 0..n {
            for c in 0..n {
                let id = r * n + c;
                if c + 1 < n {
                    builder.add_road(NodeId(id), NodeId(id + 1), None);
                }
                if r + 1 < n {
                    builder.add_road(NodeId(id), NodeId(id + n), None);
                }
            }
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_resolution_adapts_to_density() {
        let config = SpatialConfig::default();
        let dense = SpatialIndex::build(&grid(10, 50.0), &config).unwrap();
        let sparse = SpatialIndex::build(&grid(10, 2000.0), &config).unwrap();
        assert!(u8::from(dense.resolution()) > u8::from(sparse.resolution()));
    }

    #[test]
    fn test_query_radius_matches_brute_force() {
        let graph = grid(12, 120.0);
        let index = SpatialIndex::build(&graph, &SpatialConfig::default()).unwrap();
        let origin = Coordinate::new(14.6, 121.0);

        for (east, north, radius) in [(300.0, 410.0, 90.0), (0.0, 0.0, 250.0), (700.0, 55.0, 15.0)] {
            let p = offset_m(&origin, east, north);
            let mut expected: Vec<EdgeRef> = graph
                .edge_refs()
                .filter(|&e| {
                    let (a, b) = graph.edge_endpoints(e).unwrap();
                    point_segment_distance_m(&p, &a, &b) <= radius
                })
                .collect();
            expected.sort();

            let mut got: Vec<EdgeRef> = index.query_radius(&p, radius).into_iter().map(|(e, _)| e).collect();
            got.sort();
            assert_eq!(got, expected, "radius query at ({east}, {north}) r={radius}");
        }
    }

    #[test]
    fn test_query_radius_sorted_by_distance() {
        let graph = grid(5, 100.0);
        let index = SpatialIndex::build(&graph, &SpatialConfig::default()).unwrap();
        let p = offset_m(&Coordinate::new(14.6, 121.0), 150.0, 120.0);
        let hits = index.query_radius(&p, 200.0);
        assert!(!hits.is_empty());
        assert!(hits.windows(2).all(|w| w[0].1 <= w[1].1));
    }

    #[test]
    fn test_nearest_node_within_limit() {
        let graph = grid(5, 100.0);
        let index = SpatialIndex::build(&graph, &SpatialConfig::default()).unwrap();
        let p = offset_m(&Coordinate::new(14.6, 121.0), 210.0, 95.0);
        // Closest grid point is (2, 1) -> id 1 * 5 + 2
        assert_eq!(index.nearest_node(&p, 50.0).unwrap(), NodeId(7));
    }

    #[test]
    fn test_nearest_node_no_coverage() {
        let graph = grid(3, 100.0);
        let index = SpatialIndex::build(&graph, &SpatialConfig::default()).unwrap();
        let far = offset_m(&Coordinate::new(14.6, 121.0), 5_000.0, 5_000.0);
        assert!(matches!(
            index.nearest_node(&far, 500.0),
            Err(SpatialError::NoCoverage { .. })
        ));
    }

    #[test]
    fn test_invalid_point_is_rejected() {
        let graph = grid(3, 100.0);
        let index = SpatialIndex::build(&graph, &SpatialConfig::default()).unwrap();
        let bad = Coordinate::new(f64::NAN, 0.0);
        assert!(index.query_radius(&bad, 100.0).is_empty());
        assert!(matches!(
            index.nearest_node(&bad, 100.0),
            Err(SpatialError::InvalidCoordinates(_))
        ));
    }
}
