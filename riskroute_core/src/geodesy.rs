//! WGS84 helpers shared by the graph, the spatial index and the router.
//!
//! Distances are great-circle (haversine) on a spherical earth. Segment
//! distances project into a local tangent plane around the query point, which
//! is accurate for road segments (tens to hundreds of meters).

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

/// Mean earth radius in meters (IUGG).
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Meters per degree of latitude (spherical approximation).
pub const METERS_PER_DEGREE: f64 = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;

/// A WGS84 coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// True when both components are finite and inside the WGS84 ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }

    /// Great-circle distance to `other` in meters.
    pub fn distance_m(&self, other: &Coordinate) -> f64 {
        haversine_m(self, other)
    }
}

/// Haversine distance between two coordinates in meters.
pub fn haversine_m(a: &Coordinate, b: &Coordinate) -> f64 {
    let phi_a = a.lat.to_radians();
    let phi_b = b.lat.to_radians();
    let d_phi = (b.lat - a.lat).to_radians();
    let d_lambda = (b.lon - a.lon).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi_a.cos() * phi_b.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Distance in meters from `point` to the closest point of segment `a`-`b`.
///
/// The closest point is found in a tangent plane centred on `point`, then the
/// distance to it is measured with haversine.
pub fn point_segment_distance_m(point: &Coordinate, a: &Coordinate, b: &Coordinate) -> f64 {
    let pa = to_local(point, a);
    let pb = to_local(point, b);
    let ab = pb - pa;
    let len_sq = ab.norm_squared();

    let t = if len_sq < 1e-12 {
        0.0
    } else {
        (-pa.dot(&ab) / len_sq).clamp(0.0, 1.0)
    };

    let closest = from_local(point, &(pa + ab * t));
    haversine_m(point, &closest)
}

/// Equirectangular projection of `target` into meters east/north of `origin`.
fn to_local(origin: &Coordinate, target: &Coordinate) -> Vector2<f64> {
    let cos_lat = origin.lat.to_radians().cos();
    Vector2::new(
        (target.lon - origin.lon) * METERS_PER_DEGREE * cos_lat,
        (target.lat - origin.lat) * METERS_PER_DEGREE,
    )
}

fn from_local(origin: &Coordinate, local: &Vector2<f64>) -> Coordinate {
    let cos_lat = origin.lat.to_radians().cos().max(1e-9);
    Coordinate::new(
        origin.lat + local.y / METERS_PER_DEGREE,
        origin.lon + local.x / (METERS_PER_DEGREE * cos_lat),
    )
}

/// Offset `origin` by meters east/north. Used to lay out synthetic networks.
pub fn offset_m(origin: &Coordinate, east_m: f64, north_m: f64) -> Coordinate {
    from_local(origin, &Vector2::new(east_m, north_m))
}

/// Axis-aligned lat/lon bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    /// Smallest box containing every coordinate, or `None` for an empty input.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Coordinate>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bbox = BoundingBox {
            min_lat: first.lat,
            max_lat: first.lat,
            min_lon: first.lon,
            max_lon: first.lon,
        };
        for p in iter {
            bbox.min_lat = bbox.min_lat.min(p.lat);
            bbox.max_lat = bbox.max_lat.max(p.lat);
            bbox.min_lon = bbox.min_lon.min(p.lon);
            bbox.max_lon = bbox.max_lon.max(p.lon);
        }
        Some(bbox)
    }

    /// Approximate surface area in square meters.
    pub fn area_m2(&self) -> f64 {
        let mid_lat = (self.min_lat + self.max_lat) / 2.0;
        let height = (self.max_lat - self.min_lat) * METERS_PER_DEGREE;
        let width = (self.max_lon - self.min_lon) * METERS_PER_DEGREE * mid_lat.to_radians().cos();
        height.abs() * width.abs()
    }

    pub fn center(&self) -> Coordinate {
        Coordinate::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_haversine_one_degree_latitude() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(1.0, 0.0);
        assert_relative_eq!(haversine_m(&a, &b), METERS_PER_DEGREE, epsilon = 1.0);
    }

    #[test]
    fn test_offset_round_trips_through_haversine() {
        let origin = Coordinate::new(14.5995, 120.9842); // Manila
        let east = offset_m(&origin, 100.0, 0.0);
        assert_relative_eq!(haversine_m(&origin, &east), 100.0, epsilon = 0.1);
    }

    #[test]
    fn test_point_segment_distance_perpendicular() {
        let origin = Coordinate::new(14.5995, 120.9842);
        let a = offset_m(&origin, -100.0, 0.0);
        let b = offset_m(&origin, 100.0, 0.0);
        let p = offset_m(&origin, 0.0, 30.0);
        assert_relative_eq!(point_segment_distance_m(&p, &a, &b), 30.0, epsilon = 0.1);
    }

    #[test]
    fn test_point_segment_distance_clamps_to_endpoint() {
        let origin = Coordinate::new(14.5995, 120.9842);
        let a = origin;
        let b = offset_m(&origin, 100.0, 0.0);
        let p = offset_m(&origin, -40.0, 0.0);
        assert_relative_eq!(point_segment_distance_m(&p, &a, &b), 40.0, epsilon = 0.1);
    }

    #[test]
    fn test_coordinate_validity() {
        assert!(Coordinate::new(45.0, 90.0).is_valid());
        assert!(!Coordinate::new(91.0, 0.0).is_valid());
        assert!(!Coordinate::new(f64::NAN, 0.0).is_valid());
    }
}
