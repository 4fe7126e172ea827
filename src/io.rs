//! CSV readers for the input tables and the writer for enriched output.
//!
//! Readers are lenient about cell contents: blank or unparseable values become
//! `None` rather than errors, so one bad cell never drops a row. Structural
//! problems (unreadable CSV, unknown zone categories) are errors.

use crate::error::{EnrichError, Result};
use crate::hotspot::HotspotLabel;
use crate::pipeline::EnrichedAccident;
use crate::road_features::RoadSegment;
use crate::traffic_volume::{parse_volume, TrafficCounter};
use crate::{AccidentRecord, FacilityCategory, FacilitySet, GeoPoint};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Read, Write};

fn reader<R: Read>(input: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(input)
}

fn parse_num<T: std::str::FromStr>(cell: Option<&str>) -> Option<T> {
    cell.map(str::trim).filter(|s| !s.is_empty())?.parse().ok()
}

/// Leading digits of an age cell, so "65", "65세" and "65세 이상" all read as 65.
fn parse_age(cell: Option<&str>) -> Option<u32> {
    let digits: String = cell?.trim().chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

fn point(lat: Option<&str>, lng: Option<&str>) -> Option<GeoPoint> {
    GeoPoint::from_optional(parse_num(lat), parse_num(lng))
}

// =============================================================================
// Readers
// =============================================================================

#[derive(Deserialize)]
struct RawAccident {
    #[serde(rename = "acdnt_no")]
    id: String,
    lat: Option<String>,
    lng: Option<String>,
    #[serde(rename = "acdnt_year")]
    year: String,
    #[serde(rename = "occrrnc_time_code", default)]
    time_code: Option<String>,
    #[serde(rename = "route_nm", default)]
    road_name: Option<String>,
    #[serde(rename = "acdnt_age_1_code", default)]
    driver_age: Option<String>,
}

/// Read the accident table.
///
/// Rows with an unparseable year are skipped with a warning.
pub fn read_accidents<R: Read>(input: R) -> Result<Vec<AccidentRecord>> {
    let mut rdr = reader(input);
    let mut accidents = Vec::new();
    let mut skipped = 0usize;

    for (row, result) in rdr.deserialize().enumerate() {
        let raw: RawAccident = result?;
        let Some(year) = parse_num::<u16>(Some(raw.year.as_str())) else {
            warn!("[io] accident row {} has no valid year '{}', skipped", row + 1, raw.year);
            skipped += 1;
            continue;
        };

        accidents.push(AccidentRecord {
            id: raw.id,
            location: point(raw.lat.as_deref(), raw.lng.as_deref()),
            year,
            time_code: parse_num(raw.time_code.as_deref()),
            road_name: raw.road_name.filter(|s| !s.trim().is_empty()),
            driver_age: parse_age(raw.driver_age.as_deref()),
        });
    }

    debug!("[io] read {} accidents ({} skipped)", accidents.len(), skipped);
    Ok(accidents)
}

#[derive(Deserialize)]
struct RawLocation {
    lat: Option<String>,
    lng: Option<String>,
}

/// Read a facility table with `lat, lng` columns.
pub fn read_facilities<R: Read>(input: R, category: FacilityCategory) -> Result<FacilitySet> {
    let mut rdr = reader(input);
    let mut points = Vec::new();

    for result in rdr.deserialize() {
        let raw: RawLocation = result?;
        points.push(point(raw.lat.as_deref(), raw.lng.as_deref()));
    }

    debug!("[io] read {} {} facilities", points.len(), category);
    Ok(FacilitySet { category, points })
}

#[derive(Deserialize)]
struct RawZone {
    category: String,
    lat: Option<String>,
    lng: Option<String>,
}

/// Read the protection zone table (`category, lat, lng`) into one set per
/// zone category.
pub fn read_protection_zones<R: Read>(input: R) -> Result<Vec<FacilitySet>> {
    let mut rdr = reader(input);
    let mut by_category: BTreeMap<FacilityCategory, Vec<Option<GeoPoint>>> = [
        FacilityCategory::ChildZone,
        FacilityCategory::ElderlyZone,
        FacilityCategory::DisabledZone,
    ]
    .into_iter()
    .map(|c| (c, Vec::new()))
    .collect();

    for (row, result) in rdr.deserialize().enumerate() {
        let raw: RawZone = result?;
        let category = FacilityCategory::from_zone_label(&raw.category).ok_or_else(|| {
            EnrichError::UnknownZoneCategory {
                label: raw.category.clone(),
                row: row + 1,
            }
        })?;
        by_category
            .entry(category)
            .or_default()
            .push(point(raw.lat.as_deref(), raw.lng.as_deref()));
    }

    Ok(by_category
        .into_iter()
        .map(|(category, points)| FacilitySet { category, points })
        .collect())
}

/// Read the traffic counter table.
///
/// Every column whose header is a year holds that year's volume as raw text;
/// values go through [`parse_volume`].
pub fn read_counters<R: Read>(input: R) -> Result<Vec<TrafficCounter>> {
    let mut rdr = reader(input);
    let headers = rdr.headers()?.clone();

    let lat_idx = headers.iter().position(|h| h == "lat");
    let lng_idx = headers.iter().position(|h| h == "lng");
    let year_columns: Vec<(usize, u16)> = headers
        .iter()
        .enumerate()
        .filter_map(|(i, h)| h.parse::<u16>().ok().map(|year| (i, year)))
        .collect();

    let mut counters = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let location = point(
            lat_idx.and_then(|i| record.get(i)),
            lng_idx.and_then(|i| record.get(i)),
        );
        let volumes = year_columns
            .iter()
            .map(|&(i, year)| (year, record.get(i).and_then(parse_volume)))
            .collect();
        counters.push(TrafficCounter { location, volumes });
    }

    debug!("[io] read {} counters over {} years", counters.len(), year_columns.len());
    Ok(counters)
}

#[derive(Deserialize)]
struct RawRoad {
    road_name: Option<String>,
    lanes: Option<String>,
    length: Option<String>,
    morning: Option<String>,
    midday: Option<String>,
    afternoon: Option<String>,
    all_day: Option<String>,
}

/// Read the road speed table.
pub fn read_road_segments<R: Read>(input: R) -> Result<Vec<RoadSegment>> {
    let mut rdr = reader(input);
    let mut segments = Vec::new();

    for result in rdr.deserialize() {
        let raw: RawRoad = result?;
        let speed = |cell: &Option<String>| cell.as_deref().and_then(parse_volume);

        segments.push(RoadSegment {
            road_name: raw.road_name.clone().unwrap_or_default(),
            lanes: parse_num(raw.lanes.as_deref()),
            length_m: speed(&raw.length),
            morning: speed(&raw.morning),
            midday: speed(&raw.midday),
            afternoon: speed(&raw.afternoon),
            all_day: speed(&raw.all_day),
        });
    }

    Ok(segments)
}

// =============================================================================
// Writer
// =============================================================================

/// Output header, in the field order of [`EnrichedRow`].
const ENRICHED_COLUMNS: [&str; 29] = [
    "acdnt_no",
    "lat",
    "lng",
    "acdnt_year",
    "occrrnc_time_code",
    "route_nm",
    "acdnt_age_1_code",
    "near_crosswalk",
    "near_traffic_light",
    "near_child_zone",
    "near_elderly_zone",
    "near_disabled_zone",
    "traffic_volume",
    "lanes",
    "lengths",
    "velocity",
    "in_hotspot",
    "elderly_cluster",
    "elderly_hotspot",
    "elderly_center_lat",
    "elderly_center_lng",
    "non_elderly_cluster",
    "non_elderly_hotspot",
    "non_elderly_center_lat",
    "non_elderly_center_lng",
    "all_cluster",
    "all_hotspot",
    "all_center_lat",
    "all_center_lng",
];

#[derive(Serialize)]
struct EnrichedRow<'a> {
    acdnt_no: &'a str,
    lat: Option<f64>,
    lng: Option<f64>,
    acdnt_year: u16,
    occrrnc_time_code: Option<u8>,
    route_nm: Option<&'a str>,
    acdnt_age_1_code: Option<u32>,
    near_crosswalk: u8,
    near_traffic_light: u8,
    near_child_zone: u8,
    near_elderly_zone: u8,
    near_disabled_zone: u8,
    traffic_volume: Option<f64>,
    lanes: Option<u32>,
    lengths: Option<f64>,
    velocity: Option<f64>,
    in_hotspot: u8,
    elderly_cluster: Option<i64>,
    elderly_hotspot: Option<u8>,
    elderly_center_lat: Option<f64>,
    elderly_center_lng: Option<f64>,
    non_elderly_cluster: Option<i64>,
    non_elderly_hotspot: Option<u8>,
    non_elderly_center_lat: Option<f64>,
    non_elderly_center_lng: Option<f64>,
    all_cluster: Option<i64>,
    all_hotspot: Option<u8>,
    all_center_lat: Option<f64>,
    all_center_lng: Option<f64>,
}

/// Cluster code, hotspot flag and center of a cohort label; all empty when
/// the accident is outside the cohort.
type LabelColumns = (Option<i64>, Option<u8>, Option<f64>, Option<f64>);

fn label_columns(label: Option<HotspotLabel>) -> LabelColumns {
    match label {
        Some(l) => (
            Some(l.cluster_code()),
            Some(l.is_hotspot as u8),
            l.center.map(|c| c.latitude),
            l.center.map(|c| c.longitude),
        ),
        None => (None, None, None, None),
    }
}

impl<'a> From<&'a EnrichedAccident> for EnrichedRow<'a> {
    fn from(row: &'a EnrichedAccident) -> Self {
        let record = &row.record;
        let location = record.point();
        let road = row.road.unwrap_or_default();
        let (elderly_cluster, elderly_hotspot, elderly_center_lat, elderly_center_lng) =
            label_columns(row.hotspots.elderly);
        let (non_elderly_cluster, non_elderly_hotspot, non_elderly_center_lat, non_elderly_center_lng) =
            label_columns(row.hotspots.non_elderly);
        let (all_cluster, all_hotspot, all_center_lat, all_center_lng) = label_columns(row.hotspots.all);

        Self {
            acdnt_no: &record.id,
            lat: location.map(|p| p.latitude),
            lng: location.map(|p| p.longitude),
            acdnt_year: record.year,
            occrrnc_time_code: record.time_code,
            route_nm: record.road_name.as_deref(),
            acdnt_age_1_code: record.driver_age,
            near_crosswalk: row.flags.near_crosswalk as u8,
            near_traffic_light: row.flags.near_traffic_light as u8,
            near_child_zone: row.flags.near_child_zone as u8,
            near_elderly_zone: row.flags.near_elderly_zone as u8,
            near_disabled_zone: row.flags.near_disabled_zone as u8,
            traffic_volume: row.traffic_volume,
            lanes: road.lanes,
            lengths: road.length_m,
            velocity: road.velocity,
            in_hotspot: row.in_grid_hotspot as u8,
            elderly_cluster,
            elderly_hotspot,
            elderly_center_lat,
            elderly_center_lng,
            non_elderly_cluster,
            non_elderly_hotspot,
            non_elderly_center_lat,
            non_elderly_center_lng,
            all_cluster,
            all_hotspot,
            all_center_lat,
            all_center_lng,
        }
    }
}

/// Write enriched rows with a header line.
///
/// The header is written even when there are no rows. Flags are written as
/// 0/1, noise clusters as -1 and absent values as empty cells.
pub fn write_enriched<W: Write>(output: W, rows: &[EnrichedAccident]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(output);
    writer.write_record(ENRICHED_COLUMNS)?;
    for row in rows {
        writer.serialize(EnrichedRow::from(row))?;
    }
    writer.flush()?;
    Ok(())
}
