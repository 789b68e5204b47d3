//! Synthetic grid cities for scenarios.
//!
//! Nodes are laid out on a regular east/north grid around an origin and
//! numbered row-major, so `node(row, col) == NodeId(row * cols + col)`.

use riskroute_core::geodesy::offset_m;
use riskroute_core::{Coordinate, EdgeRef, GraphError, NodeId, RoadGraph, RoadGraphBuilder};
use std::collections::HashSet;

/// A rectangular street grid with optional missing blocks.
#[derive(Debug, Clone)]
pub struct GridCity {
    /// South-west corner
    pub origin: Coordinate,
    pub rows: u64,
    pub cols: u64,
    /// Distance between neighbouring intersections
    pub spacing_m: f64,
    /// Undirected roads left out of the grid, stored with the smaller id first
    removed: HashSet<(NodeId, NodeId)>,
}

impl GridCity {
    /// Creates a grid centred on Manila-ish coordinates.
    pub fn new(rows: u64, cols: u64, spacing_m: f64) -> Self {
        Self {
            origin: Coordinate::new(14.60, 121.00),
            rows,
            cols,
            spacing_m,
            removed: HashSet::new(),
        }
    }

    pub fn node(&self, row: u64, col: u64) -> NodeId {
        NodeId(row * self.cols + col)
    }

    pub fn position(&self, row: u64, col: u64) -> Coordinate {
        offset_m(&self.origin, col as f64 * self.spacing_m, row as f64 * self.spacing_m)
    }

    /// Directed edge between two neighbouring intersections.
    pub fn edge(&self, from: (u64, u64), to: (u64, u64)) -> EdgeRef {
        EdgeRef::new(self.node(from.0, from.1), self.node(to.0, to.1), 0)
    }

    /// Centre of the road between two neighbouring intersections.
    pub fn midpoint(&self, a: (u64, u64), b: (u64, u64)) -> Coordinate {
        let pa = self.position(a.0, a.1);
        let pb = self.position(b.0, b.1);
        Coordinate::new((pa.lat + pb.lat) / 2.0, (pa.lon + pb.lon) / 2.0)
    }

    /// Leaves the road between two neighbouring intersections out of the grid.
    pub fn without_road(mut self, a: (u64, u64), b: (u64, u64)) -> Self {
        let (x, y) = (self.node(a.0, a.1), self.node(b.0, b.1));
        self.removed.insert((x.min(y), x.max(y)));
        self
    }

    /// Cuts every east-west road between column `col` and `col + 1`, except
    /// at the given rows. The remaining crossings act as bridges.
    pub fn with_river(mut self, col: u64, bridge_rows: &[u64]) -> Self {
        for row in 0..self.rows {
            if !bridge_rows.contains(&row) {
                self = self.without_road((row, col), (row, col + 1));
            }
        }
        self
    }

    /// Builds the road graph with two-way streets between grid neighbours.
    pub fn build(&self) -> Result<RoadGraph, GraphError> {
        let mut builder = RoadGraphBuilder::new();
        for row in 0..self.rows {
            for col in 0..self.cols {
                builder.add_node(self.node(row, col), self.position(row, col));
            }
        }

        for row in 0..self.rows {
            for col in 0..self.cols {
                let here = self.node(row, col);
                if col + 1 < self.cols {
                    self.add_street(&mut builder, here, self.node(row, col + 1));
                }
                if row + 1 < self.rows {
                    self.add_street(&mut builder, here, self.node(row + 1, col));
                }
            }
        }

        builder.build()
    }

    fn add_street(&self, builder: &mut RoadGraphBuilder, a: NodeId, b: NodeId) {
        if !self.removed.contains(&(a.min(b), a.max(b))) {
            builder.add_road(a, b, Some(self.spacing_m));
        }
    }
}
