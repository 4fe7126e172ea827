//! # Geographic Utilities
//!
//! Distance kernel and coordinate conversions shared by every join stage.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two points in meters |
//! | [`to_radians`] | Bulk degree → radian conversion in `[lat, lng]` order |
//! | [`meters_to_radians`] | Surface distance → central angle |
//! | [`radians_to_meters`] | Central angle → surface distance |
//! | [`destination_point`] | Point reached from an origin along a bearing |
//! | [`compute_center`] | Arithmetic-mean centroid of a point set |
//!
//! ## Example
//!
//! ```rust
//! use accident_geo::{GeoPoint, geo_utils};
//!
//! let city_hall = GeoPoint::new(37.5663, 126.9779);
//! let gangnam = GeoPoint::new(37.4979, 127.0276);
//!
//! let dist = geo_utils::haversine_distance(&city_hall, &gangnam);
//! assert!((dist - 8_800.0).abs() < 300.0);
//! ```
//!
//! ## Earth Model
//!
//! All distances use a sphere of radius [`EARTH_RADIUS_M`] (6,371,000 m). Index
//! queries are expressed as central angles on the unit sphere, so the same
//! constant converts between meters and radians everywhere in the crate.

use crate::GeoPoint;
use geo::{Centroid, MultiPoint, Point};

/// Earth radius used by every distance and angle conversion.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

// =============================================================================
// Distance Functions
// =============================================================================

/// Great-circle distance between two points using the haversine formula.
///
/// Returns meters along the surface of a sphere with radius [`EARTH_RADIUS_M`].
/// Identical points give exactly `0.0`; antipodal points give `π·R`.
///
/// # Example
///
/// ```rust
/// use accident_geo::{GeoPoint, geo_utils};
///
/// let a = GeoPoint::new(37.50, 127.00);
/// let b = GeoPoint::new(37.50, 127.0001);
///
/// let d = geo_utils::haversine_distance(&a, &b);
/// assert!(d > 8.0 && d < 9.5);
/// ```
#[inline]
pub fn haversine_distance(p1: &GeoPoint, p2: &GeoPoint) -> f64 {
    let lat1 = p1.latitude.to_radians();
    let lat2 = p2.latitude.to_radians();
    let dlat = lat2 - lat1;
    let dlng = (p2.longitude - p1.longitude).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    // Rounding can push `a` just past 1.0 for antipodal points
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Convert a surface distance in meters to a central angle in radians.
#[inline]
pub fn meters_to_radians(meters: f64) -> f64 {
    meters / EARTH_RADIUS_M
}

/// Convert a central angle in radians to a surface distance in meters.
#[inline]
pub fn radians_to_meters(radians: f64) -> f64 {
    radians * EARTH_RADIUS_M
}

// =============================================================================
// Coordinate Conversion
// =============================================================================

/// Convert points to `[lat, lng]` radian pairs for index construction.
///
/// The output has the same length and order as the input.
pub fn to_radians(points: &[GeoPoint]) -> Vec<[f64; 2]> {
    points.iter().map(GeoPoint::to_radians).collect()
}

/// Point reached by travelling `distance_m` from `origin` along `bearing_deg`
/// (clockwise from north) on the crate's sphere.
///
/// # Example
///
/// ```rust
/// use accident_geo::{GeoPoint, geo_utils};
///
/// let origin = GeoPoint::new(37.5, 127.0);
/// let east = geo_utils::destination_point(&origin, 90.0, 25.0);
/// let d = geo_utils::haversine_distance(&origin, &east);
/// assert!((d - 25.0).abs() < 1e-6);
/// ```
pub fn destination_point(origin: &GeoPoint, bearing_deg: f64, distance_m: f64) -> GeoPoint {
    let delta = meters_to_radians(distance_m);
    let theta = bearing_deg.to_radians();
    let lat1 = origin.latitude.to_radians();
    let lng1 = origin.longitude.to_radians();

    let lat2 = (lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * theta.cos()).asin();
    let lng2 = lng1
        + (theta.sin() * delta.sin() * lat1.cos()).atan2(delta.cos() - lat1.sin() * lat2.sin());

    GeoPoint::new(lat2.to_degrees(), lng2.to_degrees())
}

// =============================================================================
// Centroid
// =============================================================================

/// Arithmetic-mean centroid (mean latitude, mean longitude) of a point set.
///
/// Returns `None` for empty input. Suitable for the city-scale clusters
/// this crate produces; it is not a spherical centroid.
///
/// # Example
///
/// ```rust
/// use accident_geo::{GeoPoint, geo_utils};
///
/// let pts = vec![GeoPoint::new(37.0, 127.0), GeoPoint::new(37.0, 127.001)];
/// let c = geo_utils::compute_center(&pts).unwrap();
/// assert!((c.longitude - 127.0005).abs() < 1e-12);
/// ```
pub fn compute_center(points: &[GeoPoint]) -> Option<GeoPoint> {
    let multi: MultiPoint<f64> = points
        .iter()
        .map(|p| Point::new(p.longitude, p.latitude))
        .collect();
    multi.centroid().map(|c| GeoPoint::new(c.y(), c.x()))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Distance, Haversine};

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    #[test]
    fn test_haversine_distance_same_point() {
        let p = GeoPoint::new(37.5665, 126.9780);
        assert_eq!(haversine_distance(&p, &p), 0.0);
    }

    #[test]
    fn test_haversine_symmetry() {
        let pairs = [
            (GeoPoint::new(37.50, 127.00), GeoPoint::new(37.60, 127.10)),
            (GeoPoint::new(-33.86, 151.21), GeoPoint::new(51.50, -0.12)),
            (GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 0.000001)),
        ];
        for (a, b) in pairs {
            assert!(approx_eq(haversine_distance(&a, &b), haversine_distance(&b, &a), 1e-9));
        }
    }

    #[test]
    fn test_haversine_antipodal() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(0.0, 180.0);
        let d = haversine_distance(&a, &b);
        assert!(d.is_finite());
        assert!(approx_eq(d, std::f64::consts::PI * EARTH_RADIUS_M, 1.0));
    }

    #[test]
    fn test_haversine_converges_to_zero() {
        let a = GeoPoint::new(37.5, 127.0);
        let mut prev = f64::INFINITY;
        for exp in 1..10 {
            let b = GeoPoint::new(37.5, 127.0 + 10f64.powi(-exp));
            let d = haversine_distance(&a, &b);
            assert!(d < prev);
            prev = d;
        }
        assert!(prev < 1e-3);
    }

    #[test]
    fn test_haversine_matches_geo_crate() {
        // geo uses the mean radius 6371008.8 m, so allow that relative difference
        let a = GeoPoint::new(37.5665, 126.9780);
        let b = GeoPoint::new(35.1796, 129.0756);
        let ours = haversine_distance(&a, &b);
        let theirs = Haversine::distance(
            Point::new(a.longitude, a.latitude),
            Point::new(b.longitude, b.latitude),
        );
        assert!(((ours - theirs) / theirs).abs() < 1e-5);
    }

    #[test]
    fn test_meters_radians_round_trip() {
        let r = meters_to_radians(300.0);
        assert!(approx_eq(r, 300.0 / 6_371_000.0, 1e-15));
        assert!(approx_eq(radians_to_meters(r), 300.0, 1e-9));
    }

    #[test]
    fn test_to_radians_order() {
        let pts = vec![GeoPoint::new(90.0, 180.0)];
        let rad = to_radians(&pts);
        assert!(approx_eq(rad[0][0], std::f64::consts::FRAC_PI_2, 1e-12));
        assert!(approx_eq(rad[0][1], std::f64::consts::PI, 1e-12));
    }

    #[test]
    fn test_destination_point_distance() {
        let origin = GeoPoint::new(37.5, 127.0);
        for bearing in [0.0, 45.0, 90.0, 180.0, 270.0] {
            let p = destination_point(&origin, bearing, 300.0);
            assert!(approx_eq(haversine_distance(&origin, &p), 300.0, 1e-6));
        }
    }

    #[test]
    fn test_compute_center() {
        let pts = vec![GeoPoint::new(37.0, 127.0), GeoPoint::new(37.0, 127.001)];
        let c = compute_center(&pts).unwrap();
        assert!(approx_eq(c.latitude, 37.0, 1e-12));
        assert!(approx_eq(c.longitude, 127.0005, 1e-12));
    }

    #[test]
    fn test_compute_center_empty() {
        assert!(compute_center(&[]).is_none());
    }
}
