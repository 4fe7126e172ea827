//! Static spatial index over facility coordinates.
//!
//! Facilities are stored in an R-tree keyed by `[lat, lng]` in radians. Plain
//! Euclidean distance on those coordinates approximates the central angle
//! between two points; the approximation overstates east-west separation by
//! `1 / cos(lat)`, which callers absorb with a buffer and then verify with
//! the exact haversine distance.

use crate::geo_utils::{haversine_distance, meters_to_radians, EARTH_RADIUS_M};
use crate::GeoPoint;
use rstar::{PointDistance, RTree, RTreeObject, AABB};

/// Slack applied to the latitude correction so rounding never drops an entry.
const LATITUDE_SLACK: f64 = 1.01;

/// Cosine floor for the latitude correction (about 84°).
const MIN_COS_LAT: f64 = 0.1;

// =============================================================================
// R-tree Indexed Point
// =============================================================================

/// A facility location with its index in the source slice.
#[derive(Debug, Clone, Copy)]
struct IndexedPoint {
    idx: usize,
    rad: [f64; 2],
    point: GeoPoint,
}

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.rad)
    }
}

impl PointDistance for IndexedPoint {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dlat = self.rad[0] - point[0];
        let dlng = self.rad[1] - point[1];
        dlat * dlat + dlng * dlng
    }
}

// =============================================================================
// Facility Index
// =============================================================================

/// Queryable index over one point set.
///
/// Built once per join stage and dropped afterwards. Entries with missing or
/// invalid coordinates are skipped; query results always refer to positions
/// in the slice the index was built from.
///
/// # Example
///
/// ```rust
/// use accident_geo::{FacilityIndex, GeoPoint};
///
/// let index = FacilityIndex::from_points(&[
///     GeoPoint::new(37.50, 127.00),
///     GeoPoint::new(37.60, 127.10),
/// ]);
///
/// let (idx, meters) = index.nearest(&GeoPoint::new(37.501, 127.0)).unwrap();
/// assert_eq!(idx, 0);
/// assert!((meters - 111.2).abs() < 1.0);
/// ```
#[derive(Debug)]
pub struct FacilityIndex {
    tree: RTree<IndexedPoint>,
}

impl FacilityIndex {
    /// Build an index from optional points, skipping missing entries.
    pub fn build(points: &[Option<GeoPoint>]) -> Self {
        let entries: Vec<IndexedPoint> = points
            .iter()
            .enumerate()
            .filter_map(|(idx, p)| {
                let point = p.filter(GeoPoint::is_valid)?;
                Some(IndexedPoint { idx, rad: point.to_radians(), point })
            })
            .collect();

        Self { tree: RTree::bulk_load(entries) }
    }

    /// Build an index from known points.
    pub fn from_points(points: &[GeoPoint]) -> Self {
        let entries: Vec<IndexedPoint> = points
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_valid())
            .map(|(idx, p)| IndexedPoint { idx, rad: p.to_radians(), point: *p })
            .collect();

        Self { tree: RTree::bulk_load(entries) }
    }

    /// Number of indexed entries.
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Indices of all entries within `radius_rad` of `query_rad`, measured as
    /// Euclidean distance on radian coordinates.
    pub fn within_radius(&self, query_rad: [f64; 2], radius_rad: f64) -> Vec<usize> {
        self.tree
            .locate_within_distance(query_rad, radius_rad * radius_rad)
            .map(|e| e.idx)
            .collect()
    }

    /// Same as [`within_radius`](Self::within_radius) but also returns the
    /// stored location in degrees, ready for exact verification.
    pub fn candidates(&self, query_rad: [f64; 2], radius_rad: f64) -> Vec<(usize, GeoPoint)> {
        self.tree
            .locate_within_distance(query_rad, radius_rad * radius_rad)
            .map(|e| (e.idx, e.point))
            .collect()
    }

    /// The `k` nearest entries by approximate angular distance, closest first.
    ///
    /// Distances are in radians on the unit sphere (multiply by the Earth
    /// radius for meters).
    pub fn k_nearest(&self, query_rad: [f64; 2], k: usize) -> Vec<(usize, f64)> {
        self.tree
            .nearest_neighbor_iter_with_distance_2(&query_rad)
            .take(k)
            .map(|(e, d2)| (e.idx, d2.sqrt()))
            .collect()
    }

    /// Exact great-circle nearest entry and its haversine distance in meters.
    ///
    /// Walks entries in approximate order and stops once the latitude-corrected
    /// approximate distance of the next entry exceeds the best exact distance.
    pub fn nearest(&self, query: &GeoPoint) -> Option<(usize, f64)> {
        if !query.is_valid() {
            return None;
        }

        let query_rad = query.to_radians();
        let mut best: Option<(usize, f64)> = None;

        for (entry, d2) in self.tree.nearest_neighbor_iter_with_distance_2(&query_rad) {
            let approx = d2.sqrt();
            if let Some((_, best_m)) = best {
                let lower_bound = approx * lng_scale(query.latitude.to_radians().abs() + approx)
                    / LATITUDE_SLACK;
                if lower_bound > meters_to_radians(best_m) {
                    break;
                }
            }

            let dist = haversine_distance(query, &entry.point);
            if best.map_or(true, |(_, b)| dist < b) {
                best = Some((entry.idx, dist));
            }
        }

        best
    }
}

/// Candidate search radius in radians that is guaranteed to contain every
/// point within `radius_m` (great-circle) of a query at `latitude_deg`.
///
/// The radius is the larger of the caller's buffered radius and the
/// latitude-corrected bound `radius / cos(|lat| + radius)`.
pub fn search_radius(latitude_deg: f64, radius_m: f64, buffer_m: f64) -> f64 {
    let radius_rad = radius_m / EARTH_RADIUS_M;
    let buffered = (radius_m + buffer_m) / EARTH_RADIUS_M;
    let corrected = radius_rad / lng_scale(latitude_deg.to_radians().abs() + radius_rad)
        * LATITUDE_SLACK;
    buffered.max(corrected)
}

#[inline]
fn lng_scale(abs_lat_rad: f64) -> f64 {
    abs_lat_rad.min(std::f64::consts::FRAC_PI_2).cos().max(MIN_COS_LAT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_utils::destination_point;

    fn seoul_grid() -> Vec<GeoPoint> {
        (0..10)
            .flat_map(|i| (0..10).map(move |j| GeoPoint::new(37.5 + i as f64 * 0.001, 127.0 + j as f64 * 0.001)))
            .collect()
    }

    #[test]
    fn test_build_skips_missing() {
        let pts = vec![
            Some(GeoPoint::new(37.5, 127.0)),
            None,
            Some(GeoPoint::new(f64::NAN, 127.0)),
            Some(GeoPoint::new(37.6, 127.1)),
        ];
        let index = FacilityIndex::build(&pts);
        assert_eq!(index.len(), 2);

        let hits = index.within_radius(GeoPoint::new(37.6, 127.1).to_radians(), 1e-6);
        assert_eq!(hits, vec![3]);
    }

    #[test]
    fn test_empty_index_queries() {
        let index = FacilityIndex::build(&[]);
        assert!(index.is_empty());
        let q = GeoPoint::new(37.5, 127.0);
        assert!(index.within_radius(q.to_radians(), 1.0).is_empty());
        assert!(index.k_nearest(q.to_radians(), 3).is_empty());
        assert!(index.nearest(&q).is_none());
    }

    #[test]
    fn test_k_nearest_ordering() {
        let index = FacilityIndex::from_points(&seoul_grid());
        let q = GeoPoint::new(37.5, 127.0);
        let hits = index.k_nearest(q.to_radians(), 3);
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].0, 0);
        assert!(hits[0].1 <= hits[1].1 && hits[1].1 <= hits[2].1);
    }

    #[test]
    fn test_nearest_is_exact() {
        // Due east at 100 m looks farther in radian space than due north at
        // 110 m, but is closer on the ground.
        let q = GeoPoint::new(37.5, 127.0);
        let north = destination_point(&q, 0.0, 110.0);
        let east = destination_point(&q, 90.0, 100.0);
        let index = FacilityIndex::from_points(&[north, east]);

        let approx_first = index.k_nearest(q.to_radians(), 1)[0].0;
        assert_eq!(approx_first, 0);

        let (idx, dist) = index.nearest(&q).unwrap();
        assert_eq!(idx, 1);
        assert!((dist - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_nearest_matches_brute_force() {
        let pts = seoul_grid();
        let index = FacilityIndex::from_points(&pts);
        for q in [GeoPoint::new(37.5034, 127.0071), GeoPoint::new(37.49, 126.99)] {
            let brute = pts
                .iter()
                .map(|p| haversine_distance(&q, p))
                .fold(f64::INFINITY, f64::min);
            let (_, d) = index.nearest(&q).unwrap();
            assert!((d - brute).abs() < 1e-9);
        }
    }

    #[test]
    fn test_search_radius_contains_east_neighbor() {
        let q = GeoPoint::new(37.5, 127.0);
        let east = destination_point(&q, 90.0, 10.0);
        let index = FacilityIndex::from_points(&[east]);

        // Without the latitude floor a zero buffer would miss this point
        let r = search_radius(q.latitude, 10.0, 0.0);
        assert_eq!(index.within_radius(q.to_radians(), r), vec![0]);
        assert!(index.within_radius(q.to_radians(), 10.0 / EARTH_RADIUS_M).is_empty());
    }
}
