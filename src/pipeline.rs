//! End-to-end enrichment of an accident table.
//!
//! Runs every join stage over the same accident slice and zips the results
//! into [`EnrichedAccident`] rows. Stages share nothing mutable: each one
//! builds its own index, produces one output vector and drops the index.

use crate::error::Result;
use crate::grid_hotspot::{mark_grid_hotspots, GridHotspotConfig};
use crate::hotspot::{assign_cohort_hotspots, CohortHotspots, HotspotConfig};
use crate::proximity::{ProximityFlags, ProximityRules};
use crate::road_features::{RoadFeatures, RoadTable};
use crate::traffic_volume::{attach_nearest_value, TrafficCounter, VolumeConfig};
use crate::{AccidentRecord, FacilitySet};
use log::info;
use std::collections::BTreeMap;
use std::time::Instant;

/// Configuration for a full enrichment run.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EnrichmentConfig {
    pub proximity: ProximityRules,
    pub volume: VolumeConfig,
    pub hotspot: HotspotConfig,
    pub grid: GridHotspotConfig,
}

impl EnrichmentConfig {
    /// Check every radius, eps, cell size and sample count.
    pub fn validate(&self) -> Result<()> {
        self.proximity.validate()?;
        self.volume.validate()?;
        self.hotspot.validate()?;
        self.grid.validate()
    }
}

/// Reference tables the accidents are joined against.
#[derive(Debug, Clone, Default)]
pub struct EnrichmentInputs {
    /// One or more sets per facility category
    pub facilities: Vec<FacilitySet>,
    pub counters: Vec<TrafficCounter>,
    /// Road speed table; road features stay empty without it
    pub roads: Option<RoadTable>,
}

/// An accident with every derived column.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EnrichedAccident {
    pub record: AccidentRecord,
    pub flags: ProximityFlags,
    pub traffic_volume: Option<f64>,
    pub hotspots: CohortHotspots,
    pub in_grid_hotspot: bool,
    pub road: Option<RoadFeatures>,
}

/// Enrich accidents with proximity flags, traffic volume, road features,
/// grid hotspots and cohort hotspots.
///
/// The output has one row per accident in input order. Fails on invalid
/// configuration or duplicate accident ids.
///
/// # Example
///
/// ```rust
/// use accident_geo::*;
///
/// let accidents = vec![AccidentRecord::new("a-1", GeoPoint::new(37.50, 127.00), 2022)];
/// let inputs = EnrichmentInputs {
///     facilities: vec![FacilitySet::new(FacilityCategory::Crosswalk, vec![GeoPoint::new(37.50, 127.00005)])],
///     ..Default::default()
/// };
///
/// let rows = enrich(accidents, &inputs, &EnrichmentConfig::default()).unwrap();
/// assert!(rows[0].flags.near_crosswalk);
/// assert_eq!(rows[0].traffic_volume, None);
/// ```
pub fn enrich(
    accidents: Vec<AccidentRecord>,
    inputs: &EnrichmentInputs,
    config: &EnrichmentConfig,
) -> Result<Vec<EnrichedAccident>> {
    config.validate()?;

    info!(
        "[Enrich] {} accidents, {} facility sets, {} counters",
        accidents.len(),
        inputs.facilities.len(),
        inputs.counters.len()
    );
    let start = Instant::now();

    let stage = Instant::now();
    let flags = proximity_stage(&accidents, &inputs.facilities, &config.proximity);
    info!("[Enrich] proximity flags in {}ms", stage.elapsed().as_millis());

    let stage = Instant::now();
    let volumes = attach_nearest_value(&accidents, &inputs.counters, config.volume.max_distance_km);
    info!("[Enrich] traffic volume in {}ms", stage.elapsed().as_millis());

    let roads = match &inputs.roads {
        Some(table) => table.attach(&accidents),
        None => vec![None; accidents.len()],
    };

    let stage = Instant::now();
    let grid = mark_grid_hotspots(&accidents, &config.grid);
    let hotspots = assign_cohort_hotspots(&accidents, &config.hotspot)?;
    info!("[Enrich] hotspots in {}ms", stage.elapsed().as_millis());

    let rows: Vec<EnrichedAccident> = accidents
        .into_iter()
        .zip(flags)
        .zip(volumes)
        .zip(hotspots)
        .zip(grid)
        .zip(roads)
        .map(|(((((record, flags), traffic_volume), hotspots), in_grid_hotspot), road)| EnrichedAccident {
            record,
            flags,
            traffic_volume,
            hotspots,
            in_grid_hotspot,
            road,
        })
        .collect();

    info!("[Enrich] {} rows in {}ms", rows.len(), start.elapsed().as_millis());
    Ok(rows)
}

#[cfg(not(feature = "parallel"))]
fn proximity_stage(
    accidents: &[AccidentRecord],
    facilities: &[FacilitySet],
    rules: &ProximityRules,
) -> Vec<ProximityFlags> {
    crate::proximity::mark_categories(accidents, facilities, rules)
}

#[cfg(feature = "parallel")]
fn proximity_stage(
    accidents: &[AccidentRecord],
    facilities: &[FacilitySet],
    rules: &ProximityRules,
) -> Vec<ProximityFlags> {
    crate::proximity::mark_categories_parallel(accidents, facilities, rules)
}

/// Group enriched rows by accident year, ascending.
pub fn split_by_year(rows: Vec<EnrichedAccident>) -> BTreeMap<u16, Vec<EnrichedAccident>> {
    let mut by_year: BTreeMap<u16, Vec<EnrichedAccident>> = BTreeMap::new();
    for row in rows {
        by_year.entry(row.record.year).or_default().push(row);
    }
    by_year
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_utils::destination_point;
    use crate::road_features::RoadSegment;
    use crate::{EnrichError, FacilityCategory, GeoPoint};

    fn scenario() -> (Vec<AccidentRecord>, EnrichmentInputs) {
        let accidents = vec![
            AccidentRecord::new("1", GeoPoint::new(37.50, 127.00), 2021).with_road("세종대로", 8),
            AccidentRecord::new("2", GeoPoint::new(37.50, 127.0001), 2022).with_driver_age(70),
            AccidentRecord::new("3", GeoPoint::new(37.60, 127.10), 2023),
        ];
        let counter = TrafficCounter::new(GeoPoint::new(37.5005, 127.0))
            .with_volume(2021, Some(10.0))
            .with_volume(2022, None)
            .with_volume(2023, Some(20.0));
        let inputs = EnrichmentInputs {
            facilities: vec![
                FacilitySet::new(FacilityCategory::Crosswalk, vec![GeoPoint::new(37.50, 127.00005)]),
                FacilitySet::empty(FacilityCategory::TrafficLight),
                FacilitySet::new(
                    FacilityCategory::ElderlyZone,
                    vec![destination_point(&GeoPoint::new(37.60, 127.10), 180.0, 250.0)],
                ),
            ],
            counters: vec![counter],
            roads: Some(RoadTable::from_segments(vec![RoadSegment {
                road_name: "세종 대로".to_string(),
                lanes: Some(8),
                morning: Some(22.0),
                ..Default::default()
            }])),
        };
        (accidents, inputs)
    }

    #[test]
    fn test_enrich_scenario() {
        let (accidents, inputs) = scenario();
        let rows = enrich(accidents, &inputs, &EnrichmentConfig::default()).unwrap();

        assert_eq!(rows.len(), 3);
        assert!(rows[0].flags.near_crosswalk);
        assert!(rows[1].flags.near_crosswalk);
        assert!(!rows[2].flags.near_crosswalk);
        assert!(!rows[0].flags.near_traffic_light);
        assert!(rows[2].flags.near_elderly_zone);

        assert_eq!(rows[0].traffic_volume, Some(10.0));
        assert_eq!(rows[1].traffic_volume, Some(15.0));
        // Third accident is about 14 km from the only counter
        assert_eq!(rows[2].traffic_volume, None);

        assert_eq!(rows[0].road.unwrap().velocity, Some(22.0));
        assert!(rows[1].road.is_none());

        assert!(rows[1].hotspots.elderly.is_some());
        assert!(rows[0].hotspots.elderly.is_none());
        assert!(rows.iter().all(|r| r.hotspots.all.is_some_and(|l| !l.is_hotspot)));
        assert!(rows.iter().all(|r| !r.in_grid_hotspot));
    }

    #[test]
    fn test_enrich_rejects_bad_config() {
        let (accidents, inputs) = scenario();
        let mut config = EnrichmentConfig::default();
        config.hotspot.all.min_samples = 0;
        assert!(matches!(
            enrich(accidents, &inputs, &config),
            Err(EnrichError::InvalidConfig { field: "min_samples", .. })
        ));
    }

    #[test]
    fn test_split_by_year() {
        let (accidents, inputs) = scenario();
        let rows = enrich(accidents, &inputs, &EnrichmentConfig::default()).unwrap();
        let by_year = split_by_year(rows);
        let years: Vec<u16> = by_year.keys().copied().collect();
        assert_eq!(years, vec![2021, 2022, 2023]);
        assert_eq!(by_year[&2022][0].record.id, "2");
    }
}
