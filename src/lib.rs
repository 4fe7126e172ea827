//! # Accident Geo
//!
//! Spatial enrichment of traffic accident tables.
//!
//! This library provides:
//! - Facility proximity flags using an R-tree candidate search with exact
//!   haversine verification
//! - Nearest traffic-volume counter lookup with a per-year fallback
//! - DBSCAN hotspot detection per driver-age cohort
//! - Grid-count hotspots and road feature joins
//!
//! ## Features
//!
//! - **`parallel`** - Run independent join stages in parallel with rayon
//! - **`serde`** - Serde derives on records and configuration
//! - **`csv`** - CSV readers and writers for the input and output tables
//! - **`cli`** - The `accident-geo` command line tool
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use accident_geo::{AccidentRecord, FacilityCategory, FacilitySet, GeoPoint, mark_proximity};
//!
//! let accidents = vec![
//!     AccidentRecord::new("a-1", GeoPoint::new(37.50, 127.00), 2022),
//!     AccidentRecord::new("a-2", GeoPoint::new(37.60, 127.10), 2022),
//! ];
//! let crosswalks = FacilitySet::new(
//!     FacilityCategory::Crosswalk,
//!     vec![GeoPoint::new(37.50, 127.00005)],
//! );
//!
//! let flags = mark_proximity(&accidents, &crosswalks, 10.0, 10.0);
//! assert_eq!(flags, vec![true, false]);
//! ```

use std::fmt;

// Unified error handling
pub mod error;
pub use error::{EnrichError, Result};

// Geographic utilities (distance kernel, conversions, centroid)
pub mod geo_utils;

// Static R-tree over facility coordinates
pub mod spatial_index;
pub use spatial_index::FacilityIndex;

// Two-phase proximity join
pub mod proximity;
pub use proximity::{mark_categories, mark_proximity, ProximityFlags, ProximityRule, ProximityRules};
#[cfg(feature = "parallel")]
pub use proximity::mark_categories_parallel;

// Nearest counter with temporal fallback
pub mod traffic_volume;
pub use traffic_volume::{attach_nearest_value, parse_volume, TrafficCounter, VolumeConfig};

// Density-based hotspots
pub mod hotspot;
pub use hotspot::{
    assign_cohort_hotspots, cluster_and_mark, Cohort, CohortConfig, CohortHotspots,
    HotspotConfig, HotspotLabel,
};

// Grid-count hotspots
pub mod grid_hotspot;
pub use grid_hotspot::{mark_grid_hotspots, GridHotspotConfig};

// Road attributes joined by road name
pub mod road_features;
pub use road_features::{RoadFeatures, RoadSegment, RoadTable, VelocityPeriod};

// End-to-end enrichment
pub mod pipeline;
pub use pipeline::{enrich, split_by_year, EnrichedAccident, EnrichmentConfig, EnrichmentInputs};

// CSV input/output
#[cfg(feature = "csv")]
pub mod io;

// ============================================================================
// Core Types
// ============================================================================

/// A WGS84 coordinate with latitude and longitude in decimal degrees.
///
/// # Example
/// ```
/// use accident_geo::GeoPoint;
/// let point = GeoPoint::new(37.5665, 126.9780); // Seoul City Hall
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Create a new point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Build a point from optional coordinates, as read from a table cell.
    ///
    /// Returns `None` when either coordinate is absent or the result is not
    /// a valid WGS84 position.
    pub fn from_optional(latitude: Option<f64>, longitude: Option<f64>) -> Option<Self> {
        let point = Self::new(latitude?, longitude?);
        point.is_valid().then_some(point)
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }

    /// `[lat, lng]` in radians, the layout used by [`FacilityIndex`].
    #[inline]
    pub fn to_radians(&self) -> [f64; 2] {
        [self.latitude.to_radians(), self.longitude.to_radians()]
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

/// Bounding box of a point set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from points.
    pub fn from_points(points: &[GeoPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lng = f64::MAX;
        let mut max_lng = f64::MIN;

        for p in points {
            min_lat = min_lat.min(p.latitude);
            max_lat = max_lat.max(p.latitude);
            min_lng = min_lng.min(p.longitude);
            max_lng = max_lng.max(p.longitude);
        }

        Some(Self { min_lat, max_lat, min_lng, max_lng })
    }
}

/// One row of the accident table.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AccidentRecord {
    /// Unique accident number
    pub id: String,
    /// Accident location, `None` when the source row had no usable coordinates
    pub location: Option<GeoPoint>,
    /// Accident year (2021..=2023 in the reference data)
    pub year: u16,
    /// Time-of-day code (hour bucket)
    pub time_code: Option<u8>,
    /// Road name, may be blank
    pub road_name: Option<String>,
    /// Age of the primary driver
    pub driver_age: Option<u32>,
}

impl AccidentRecord {
    /// Create a record with a known location and no optional attributes.
    pub fn new(id: impl Into<String>, location: GeoPoint, year: u16) -> Self {
        Self {
            id: id.into(),
            location: Some(location),
            year,
            time_code: None,
            road_name: None,
            driver_age: None,
        }
    }

    /// Set the primary driver age.
    pub fn with_driver_age(mut self, age: u32) -> Self {
        self.driver_age = Some(age);
        self
    }

    /// Set the road name and time-of-day code.
    pub fn with_road(mut self, road_name: impl Into<String>, time_code: u8) -> Self {
        self.road_name = Some(road_name.into());
        self.time_code = Some(time_code);
        self
    }

    /// Location if present and valid.
    #[inline]
    pub fn point(&self) -> Option<GeoPoint> {
        self.location.filter(GeoPoint::is_valid)
    }
}

/// Facility categories that receive a proximity flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FacilityCategory {
    Crosswalk,
    TrafficLight,
    ChildZone,
    ElderlyZone,
    DisabledZone,
}

impl FacilityCategory {
    /// Every category, in output column order.
    pub const ALL: [FacilityCategory; 5] = [
        FacilityCategory::Crosswalk,
        FacilityCategory::TrafficLight,
        FacilityCategory::ChildZone,
        FacilityCategory::ElderlyZone,
        FacilityCategory::DisabledZone,
    ];

    /// Name of the derived flag column.
    pub fn column_name(self) -> &'static str {
        match self {
            FacilityCategory::Crosswalk => "near_crosswalk",
            FacilityCategory::TrafficLight => "near_traffic_light",
            FacilityCategory::ChildZone => "near_child_zone",
            FacilityCategory::ElderlyZone => "near_elderly_zone",
            FacilityCategory::DisabledZone => "near_disabled_zone",
        }
    }

    /// Parse a protection zone label (English or the Korean source labels).
    pub fn from_zone_label(label: &str) -> Option<Self> {
        match label.trim() {
            "child" | "어린이" => Some(FacilityCategory::ChildZone),
            "elderly" | "노인" => Some(FacilityCategory::ElderlyZone),
            "disabled" | "장애인" => Some(FacilityCategory::DisabledZone),
            _ => None,
        }
    }
}

impl fmt::Display for FacilityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

/// A named collection of facility locations of one category.
///
/// Entries with missing coordinates are kept so that indices line up with
/// the source table; they are skipped when the index is built.
#[derive(Debug, Clone, PartialEq)]
pub struct FacilitySet {
    pub category: FacilityCategory,
    pub points: Vec<Option<GeoPoint>>,
}

impl FacilitySet {
    /// Create a set from known locations.
    pub fn new(category: FacilityCategory, points: Vec<GeoPoint>) -> Self {
        Self {
            category,
            points: points.into_iter().map(Some).collect(),
        }
    }

    /// Create an empty set.
    pub fn empty(category: FacilityCategory) -> Self {
        Self { category, points: Vec::new() }
    }

    /// Number of entries, including those with missing coordinates.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the set has no entries.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
