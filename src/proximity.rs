//! Two-phase proximity join between accidents and facility sets.
//!
//! ## Algorithm
//! 1. Build a [`FacilityIndex`] over the facilities with known coordinates
//! 2. For each accident, collect candidates within `radius + buffer` (and at
//!    least the latitude-corrected radius, see [`search_radius`])
//! 3. Accept the accident as near if any candidate's haversine distance is
//!    within the radius
//!
//! The index distance is a flat approximation of the great-circle angle, so
//! step 3 is mandatory: it removes the false positives that the buffer lets
//! in and the latitude floor guarantees there are no false negatives.

use crate::error::{ensure_positive, Result};
use crate::geo_utils::haversine_distance;
use crate::spatial_index::{search_radius, FacilityIndex};
use crate::{AccidentRecord, EnrichError, FacilityCategory, FacilitySet, GeoPoint};
use log::{debug, warn};

/// Distances within this many meters past the radius still count as near.
pub const MATCH_TOLERANCE_M: f64 = 1e-6;

/// Radius and candidate buffer for one facility category.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProximityRule {
    /// Exact great-circle radius in meters
    pub radius_m: f64,
    /// Extra candidate-search margin in meters
    pub buffer_m: f64,
}

impl ProximityRule {
    pub fn new(radius_m: f64, buffer_m: f64) -> Self {
        Self { radius_m, buffer_m }
    }

    /// Check that the radius is positive and the buffer non-negative.
    pub fn validate(&self) -> Result<()> {
        ensure_positive("radius_m", self.radius_m)?;
        if !(self.buffer_m.is_finite() && self.buffer_m >= 0.0) {
            return Err(EnrichError::invalid("buffer_m", self.buffer_m, "must be finite and >= 0"));
        }
        Ok(())
    }
}

/// Per-category proximity rules.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ProximityRules {
    /// Default: 10 m radius, 10 m buffer
    pub crosswalk: ProximityRule,
    /// Default: 10 m radius, 10 m buffer
    pub traffic_light: ProximityRule,
    /// Default: 300 m radius, 100 m buffer
    pub child_zone: ProximityRule,
    /// Default: 300 m radius, 100 m buffer
    pub elderly_zone: ProximityRule,
    /// Default: 300 m radius, 100 m buffer
    pub disabled_zone: ProximityRule,
}

impl Default for ProximityRules {
    fn default() -> Self {
        Self {
            crosswalk: ProximityRule::new(10.0, 10.0),
            traffic_light: ProximityRule::new(10.0, 10.0),
            child_zone: ProximityRule::new(300.0, 100.0),
            elderly_zone: ProximityRule::new(300.0, 100.0),
            disabled_zone: ProximityRule::new(300.0, 100.0),
        }
    }
}

impl ProximityRules {
    /// Rule for a category.
    pub fn rule(&self, category: FacilityCategory) -> ProximityRule {
        match category {
            FacilityCategory::Crosswalk => self.crosswalk,
            FacilityCategory::TrafficLight => self.traffic_light,
            FacilityCategory::ChildZone => self.child_zone,
            FacilityCategory::ElderlyZone => self.elderly_zone,
            FacilityCategory::DisabledZone => self.disabled_zone,
        }
    }

    pub fn validate(&self) -> Result<()> {
        FacilityCategory::ALL
            .iter()
            .try_for_each(|c| self.rule(*c).validate())
    }
}

/// Proximity flag per facility category for one accident.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProximityFlags {
    pub near_crosswalk: bool,
    pub near_traffic_light: bool,
    pub near_child_zone: bool,
    pub near_elderly_zone: bool,
    pub near_disabled_zone: bool,
}

impl ProximityFlags {
    pub fn get(&self, category: FacilityCategory) -> bool {
        match category {
            FacilityCategory::Crosswalk => self.near_crosswalk,
            FacilityCategory::TrafficLight => self.near_traffic_light,
            FacilityCategory::ChildZone => self.near_child_zone,
            FacilityCategory::ElderlyZone => self.near_elderly_zone,
            FacilityCategory::DisabledZone => self.near_disabled_zone,
        }
    }

    /// Raise the flag for a category. Flags are never cleared, so several
    /// sets of the same category combine with OR.
    pub fn mark(&mut self, category: FacilityCategory, near: bool) {
        let slot = match category {
            FacilityCategory::Crosswalk => &mut self.near_crosswalk,
            FacilityCategory::TrafficLight => &mut self.near_traffic_light,
            FacilityCategory::ChildZone => &mut self.near_child_zone,
            FacilityCategory::ElderlyZone => &mut self.near_elderly_zone,
            FacilityCategory::DisabledZone => &mut self.near_disabled_zone,
        };
        *slot |= near;
    }
}

// =============================================================================
// Join
// =============================================================================

/// Flag each accident that has at least one facility within `radius_m`.
///
/// Returns one flag per accident, in input order. Accidents without a
/// location get `false`; an empty facility set gives all `false`.
///
/// # Example
///
/// ```rust
/// use accident_geo::{AccidentRecord, FacilityCategory, FacilitySet, GeoPoint, mark_proximity};
///
/// let accidents = vec![AccidentRecord::new("1", GeoPoint::new(37.50, 127.00), 2023)];
/// let empty = FacilitySet::empty(FacilityCategory::TrafficLight);
/// assert_eq!(mark_proximity(&accidents, &empty, 10.0, 10.0), vec![false]);
/// ```
pub fn mark_proximity(
    accidents: &[AccidentRecord],
    facilities: &FacilitySet,
    radius_m: f64,
    buffer_m: f64,
) -> Vec<bool> {
    let queries: Vec<Option<GeoPoint>> = accidents.iter().map(AccidentRecord::point).collect();
    let flags = mark_points(&queries, &facilities.points, radius_m, buffer_m);

    debug!(
        "[proximity] {}: {} of {} accidents within {}m of {} facilities",
        facilities.category,
        flags.iter().filter(|f| **f).count(),
        flags.len(),
        radius_m,
        facilities.len()
    );

    flags
}

/// Point-level form of [`mark_proximity`].
pub fn mark_points(
    queries: &[Option<GeoPoint>],
    facilities: &[Option<GeoPoint>],
    radius_m: f64,
    buffer_m: f64,
) -> Vec<bool> {
    let index = FacilityIndex::build(facilities);
    if index.is_empty() {
        return vec![false; queries.len()];
    }

    if buffer_m < radius_m / 3.0 {
        warn!(
            "[proximity] buffer {}m is below a third of radius {}m; relying on latitude correction",
            buffer_m, radius_m
        );
    }

    queries
        .iter()
        .map(|q| match q.filter(GeoPoint::is_valid) {
            Some(point) => is_near(&index, &point, radius_m, buffer_m),
            None => false,
        })
        .collect()
}

fn is_near(index: &FacilityIndex, point: &GeoPoint, radius_m: f64, buffer_m: f64) -> bool {
    let r = search_radius(point.latitude, radius_m, buffer_m);
    let candidates = index.candidates(point.to_radians(), r);
    if candidates.is_empty() {
        return false;
    }

    candidates
        .iter()
        .any(|(_, facility)| haversine_distance(point, facility) <= radius_m + MATCH_TOLERANCE_M)
}

/// Apply every facility set with its category's rule.
///
/// Sets that share a category are combined with OR.
pub fn mark_categories(
    accidents: &[AccidentRecord],
    facility_sets: &[FacilitySet],
    rules: &ProximityRules,
) -> Vec<ProximityFlags> {
    let mut flags = vec![ProximityFlags::default(); accidents.len()];

    for set in facility_sets {
        let rule = rules.rule(set.category);
        let near = mark_proximity(accidents, set, rule.radius_m, rule.buffer_m);
        for (f, n) in flags.iter_mut().zip(near) {
            f.mark(set.category, n);
        }
    }

    flags
}

/// Parallel version of [`mark_categories`].
///
/// Each facility set is joined on its own rayon task and produces a private
/// flag vector; the vectors are merged afterwards.
#[cfg(feature = "parallel")]
pub fn mark_categories_parallel(
    accidents: &[AccidentRecord],
    facility_sets: &[FacilitySet],
    rules: &ProximityRules,
) -> Vec<ProximityFlags> {
    use rayon::prelude::*;

    let per_set: Vec<(FacilityCategory, Vec<bool>)> = facility_sets
        .par_iter()
        .map(|set| {
            let rule = rules.rule(set.category);
            (set.category, mark_proximity(accidents, set, rule.radius_m, rule.buffer_m))
        })
        .collect();

    let mut flags = vec![ProximityFlags::default(); accidents.len()];
    for (category, near) in per_set {
        for (f, n) in flags.iter_mut().zip(near) {
            f.mark(category, n);
        }
    }

    flags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_utils::destination_point;

    fn accident(id: &str, lat: f64, lng: f64) -> AccidentRecord {
        AccidentRecord::new(id, GeoPoint::new(lat, lng), 2022)
    }

    #[test]
    fn test_scenario_three_accidents() {
        let accidents = vec![
            accident("1", 37.50, 127.00),
            accident("2", 37.50, 127.0001),
            accident("3", 37.60, 127.10),
        ];
        let crosswalks = FacilitySet::new(FacilityCategory::Crosswalk, vec![GeoPoint::new(37.50, 127.00005)]);

        let flags = mark_proximity(&accidents, &crosswalks, 10.0, 10.0);
        assert_eq!(flags, vec![true, true, false]);
    }

    #[test]
    fn test_facility_at_exact_radius() {
        let origin = GeoPoint::new(37.55, 126.98);
        let accidents = vec![AccidentRecord::new("a", origin, 2021)];
        for bearing in [0.0, 45.0, 90.0, 135.0, 270.0] {
            let facility = destination_point(&origin, bearing, 300.0);
            let set = FacilitySet::new(FacilityCategory::ChildZone, vec![facility]);
            assert_eq!(mark_proximity(&accidents, &set, 300.0, 100.0), vec![true], "bearing {}", bearing);
        }
    }

    #[test]
    fn test_zero_buffer_still_finds_east_neighbor() {
        let origin = GeoPoint::new(37.5, 127.0);
        let facility = destination_point(&origin, 90.0, 9.5);
        let set = FacilitySet::new(FacilityCategory::TrafficLight, vec![facility]);
        let accidents = vec![AccidentRecord::new("a", origin, 2021)];
        assert_eq!(mark_proximity(&accidents, &set, 10.0, 0.0), vec![true]);
    }

    #[test]
    fn test_buffer_does_not_leak_false_positives() {
        let origin = GeoPoint::new(37.5, 127.0);
        let facility = destination_point(&origin, 0.0, 15.0);
        let set = FacilitySet::new(FacilityCategory::Crosswalk, vec![facility]);
        let accidents = vec![AccidentRecord::new("a", origin, 2021)];
        // 15 m is inside radius + buffer but outside the radius
        assert_eq!(mark_proximity(&accidents, &set, 10.0, 10.0), vec![false]);
    }

    #[test]
    fn test_missing_coordinates() {
        let mut no_location = accident("x", 0.0, 0.0);
        no_location.location = None;
        let accidents = vec![no_location, accident("y", 37.5, 127.0)];
        let set = FacilitySet {
            category: FacilityCategory::Crosswalk,
            points: vec![None, Some(GeoPoint::new(37.5, 127.0))],
        };
        assert_eq!(mark_proximity(&accidents, &set, 10.0, 10.0), vec![false, true]);
    }

    #[test]
    fn test_mark_categories_combines_sets() {
        let accidents = vec![accident("1", 37.50, 127.00), accident("2", 37.60, 127.10)];
        let sets = vec![
            FacilitySet::new(FacilityCategory::Crosswalk, vec![GeoPoint::new(37.50, 127.00005)]),
            FacilitySet::new(FacilityCategory::ChildZone, vec![GeoPoint::new(37.601, 127.10)]),
            FacilitySet::new(FacilityCategory::ChildZone, vec![]),
        ];
        let flags = mark_categories(&accidents, &sets, &ProximityRules::default());

        assert!(flags[0].near_crosswalk);
        assert!(!flags[0].near_child_zone);
        assert!(!flags[1].near_crosswalk);
        assert!(flags[1].near_child_zone);
        assert!(!flags[1].near_elderly_zone);
    }

    #[test]
    fn test_rule_validation() {
        assert!(ProximityRule::new(10.0, 10.0).validate().is_ok());
        assert!(ProximityRule::new(0.0, 10.0).validate().is_err());
        assert!(ProximityRule::new(10.0, -1.0).validate().is_err());
        assert!(ProximityRules::default().validate().is_ok());
    }
}
