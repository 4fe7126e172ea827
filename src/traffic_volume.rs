//! Nearest traffic-volume counter lookup with a per-year fallback.
//!
//! Each accident takes the value of its great-circle nearest counter, provided
//! the counter is within the distance cap. When the counter has no value for
//! the accident's year, the mean of its values for the other years is used.

use crate::error::{ensure_positive, Result};
use crate::spatial_index::FacilityIndex;
use crate::{AccidentRecord, GeoPoint};
use log::debug;
use std::collections::BTreeMap;

/// Cell values that mean "no measurement".
const MISSING_MARKERS: [&str; 2] = ["-", "unknown"];

/// A traffic-volume counter with one optional reading per year.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrafficCounter {
    pub location: Option<GeoPoint>,
    pub volumes: BTreeMap<u16, Option<f64>>,
}

impl TrafficCounter {
    pub fn new(location: GeoPoint) -> Self {
        Self {
            location: Some(location),
            volumes: BTreeMap::new(),
        }
    }

    /// Add a reading for a year.
    pub fn with_volume(mut self, year: u16, volume: Option<f64>) -> Self {
        self.volumes.insert(year, volume);
        self
    }

    /// Value for `year`, or the mean of the present values of every other
    /// year when that year is missing.
    ///
    /// # Example
    ///
    /// ```rust
    /// use accident_geo::{GeoPoint, TrafficCounter};
    ///
    /// let counter = TrafficCounter::new(GeoPoint::new(37.5, 127.0))
    ///     .with_volume(2021, Some(10.0))
    ///     .with_volume(2022, None)
    ///     .with_volume(2023, Some(20.0));
    ///
    /// assert_eq!(counter.resolve_year_value(2022), Some(15.0));
    /// assert_eq!(counter.resolve_year_value(2023), Some(20.0));
    /// ```
    pub fn resolve_year_value(&self, year: u16) -> Option<f64> {
        if let Some(Some(v)) = self.volumes.get(&year) {
            return Some(*v);
        }

        let others: Vec<f64> = self
            .volumes
            .iter()
            .filter(|(y, _)| **y != year)
            .filter_map(|(_, v)| *v)
            .collect();

        if others.is_empty() {
            None
        } else {
            Some(others.iter().sum::<f64>() / others.len() as f64)
        }
    }
}

/// Normalize a raw counter cell.
///
/// Thousands separators and surrounding whitespace are removed. Empty cells,
/// the placeholders `-` and `unknown`, and anything else that is not a finite
/// number become `None`.
///
/// # Example
///
/// ```rust
/// use accident_geo::parse_volume;
///
/// assert_eq!(parse_volume("12,345"), Some(12345.0));
/// assert_eq!(parse_volume(" 87.5 "), Some(87.5));
/// assert_eq!(parse_volume("unknown"), None);
/// assert_eq!(parse_volume(""), None);
/// ```
pub fn parse_volume(raw: &str) -> Option<f64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() || MISSING_MARKERS.iter().any(|m| cleaned.eq_ignore_ascii_case(m)) {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Configuration for the nearest-counter lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct VolumeConfig {
    /// Counters farther than this are ignored (default: 2.0 km)
    pub max_distance_km: f64,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self { max_distance_km: 2.0 }
    }
}

impl VolumeConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_positive("max_distance_km", self.max_distance_km)
    }
}

/// Attach the nearest counter's volume to each accident.
///
/// Returns one value per accident, in input order. `None` when the accident
/// has no location, no counter has a location, the nearest counter is beyond
/// `max_distance_km`, or the counter has no value for any year.
pub fn attach_nearest_value(
    accidents: &[AccidentRecord],
    counters: &[TrafficCounter],
    max_distance_km: f64,
) -> Vec<Option<f64>> {
    let locations: Vec<Option<GeoPoint>> = counters.iter().map(|c| c.location).collect();
    let index = FacilityIndex::build(&locations);
    let max_m = max_distance_km * 1000.0;

    let values: Vec<Option<f64>> = accidents
        .iter()
        .map(|accident| {
            let point = accident.point()?;
            let (idx, dist) = index.nearest(&point)?;
            if dist > max_m {
                return None;
            }
            counters[idx].resolve_year_value(accident.year)
        })
        .collect();

    debug!(
        "[traffic_volume] attached {} of {} volumes from {} counters (cap {}km)",
        values.iter().filter(|v| v.is_some()).count(),
        values.len(),
        index.len(),
        max_distance_km
    );

    values
}
