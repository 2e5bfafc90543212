//! Coordinate math and bounding-extent utilities.
//!
//! This module provides the geographic primitives the partitioner is built
//! on: a (lat, lon) pair, an axis-aligned bounding box with its planar
//! diagonal, great-circle distance, and centroid computation.
//!
//! The diagonal is measured in degrees as the Euclidean norm of the lat/lon
//! spans. That is a deliberately cheap planar proxy for "how large is this
//! area" - it matches the size limit the OSM API applies to changesets well
//! enough near the equator and degrades towards the poles. Haversine distance
//! (kilometers) is only used by the k-means refinement step, never for the
//! size test.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometers, used for haversine distance.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A geographic coordinate pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coord {
    pub lat: f64,
    pub lon: f64,
}

impl Coord {
    /// Create a new coordinate.
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Check whether the coordinate carries real data.
    ///
    /// (0, 0) is the sentinel for "no coordinate available" throughout the
    /// pipeline, so a coordinate is valid only if both components are
    /// non-zero.
    pub fn is_valid(&self) -> bool {
        self.lat != 0.0 && self.lon != 0.0
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6},{:.6}", self.lat, self.lon)
    }
}

/// Axis-aligned geographic bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    /// Compute the smallest bounding box containing all coordinates.
    ///
    /// An empty slice yields the degenerate all-zero box rather than an
    /// error; callers treat that the same as a zero-diagonal box.
    pub fn from_coords(coords: &[Coord]) -> Self {
        let mut iter = coords.iter();
        let first = match iter.next() {
            Some(c) => c,
            None => return Self::default(),
        };

        let mut bbox = Self {
            min_lat: first.lat,
            max_lat: first.lat,
            min_lon: first.lon,
            max_lon: first.lon,
        };
        for c in iter {
            bbox.min_lat = bbox.min_lat.min(c.lat);
            bbox.max_lat = bbox.max_lat.max(c.lat);
            bbox.min_lon = bbox.min_lon.min(c.lon);
            bbox.max_lon = bbox.max_lon.max(c.lon);
        }
        bbox
    }

    /// Latitude span in degrees.
    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// Longitude span in degrees.
    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    /// Planar diagonal of the box in degrees.
    ///
    /// Zero for a single point or coincident points. This is the single
    /// scalar the size constraint is tested against.
    pub fn diagonal(&self) -> f64 {
        (self.height().powi(2) + self.width().powi(2)).sqrt()
    }

    /// Area of the box in square degrees.
    pub fn area(&self) -> f64 {
        self.height() * self.width()
    }
}

/// Great-circle distance between two coordinates in kilometers.
pub fn haversine_distance(a: Coord, b: Coord) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Arithmetic mean of a set of coordinates.
///
/// This is a cluster-representative heuristic, not a geodesically correct
/// center of mass. An empty slice yields the zero coordinate.
pub fn centroid(coords: &[Coord]) -> Coord {
    if coords.is_empty() {
        return Coord::default();
    }

    let n = coords.len() as f64;
    let lat_sum: f64 = coords.iter().map(|c| c.lat).sum();
    let lon_sum: f64 = coords.iter().map(|c| c.lon).sum();

    Coord::new(lat_sum / n, lon_sum / n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coord_validity() {
        assert!(Coord::new(45.5, 25.5).is_valid());
        assert!(!Coord::new(0.0, 0.0).is_valid());
        assert!(!Coord::new(45.5, 0.0).is_valid());
        assert!(!Coord::new(0.0, 25.5).is_valid());
    }

    #[test]
    fn test_coord_display() {
        let c = Coord::new(45.5, 25.25);
        assert_eq!(c.to_string(), "45.500000,25.250000");
    }

    #[test]
    fn test_bbox_single_coord() {
        let bbox = BoundingBox::from_coords(&[Coord::new(45.5, 25.5)]);

        assert_eq!(bbox.min_lat, 45.5);
        assert_eq!(bbox.max_lat, 45.5);
        assert_eq!(bbox.min_lon, 25.5);
        assert_eq!(bbox.max_lon, 25.5);
        assert_eq!(bbox.diagonal(), 0.0);
    }

    #[test]
    fn test_bbox_multiple_coords() {
        let bbox = BoundingBox::from_coords(&[
            Coord::new(45.0, 25.0),
            Coord::new(46.0, 26.0),
            Coord::new(44.5, 24.5),
        ]);

        assert_eq!(bbox.min_lat, 44.5);
        assert_eq!(bbox.max_lat, 46.0);
        assert_eq!(bbox.min_lon, 24.5);
        assert_eq!(bbox.max_lon, 26.0);
    }

    #[test]
    fn test_bbox_empty() {
        let bbox = BoundingBox::from_coords(&[]);
        assert_eq!(bbox, BoundingBox::default());
        assert_eq!(bbox.diagonal(), 0.0);
    }

    #[test]
    fn test_bbox_diagonal() {
        // A 1x1 degree box has a sqrt(2) diagonal
        let bbox = BoundingBox {
            min_lat: 45.0,
            max_lat: 46.0,
            min_lon: 25.0,
            max_lon: 26.0,
        };
        assert!((bbox.diagonal() - std::f64::consts::SQRT_2).abs() < 1e-12);
        assert_eq!(bbox.area(), 1.0);
    }

    #[test]
    fn test_haversine_same_point() {
        let c = Coord::new(45.0, 25.0);
        assert_eq!(haversine_distance(c, c), 0.0);
    }

    #[test]
    fn test_haversine_one_degree_latitude() {
        // One degree of latitude is roughly 111 km anywhere on the globe
        let dist = haversine_distance(Coord::new(45.0, 25.0), Coord::new(46.0, 25.0));
        assert!(dist > 110.0 && dist < 112.0, "got {dist}");
    }

    #[test]
    fn test_haversine_symmetry() {
        let a = Coord::new(44.43, 26.10);
        let b = Coord::new(46.77, 23.62);
        assert!((haversine_distance(a, b) - haversine_distance(b, a)).abs() < 1e-9);
    }

    #[test]
    fn test_centroid_single() {
        let c = centroid(&[Coord::new(45.0, 25.0)]);
        assert_eq!(c, Coord::new(45.0, 25.0));
    }

    #[test]
    fn test_centroid_two_points() {
        let c = centroid(&[Coord::new(44.0, 24.0), Coord::new(46.0, 26.0)]);
        assert_eq!(c, Coord::new(45.0, 25.0));
    }

    #[test]
    fn test_centroid_empty() {
        assert_eq!(centroid(&[]), Coord::default());
    }
}
