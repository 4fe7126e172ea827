//! Integration tests for the end-to-end enrichment run

use accident_geo::geo_utils::destination_point;
use accident_geo::{
    enrich, split_by_year, AccidentRecord, EnrichError, EnrichmentConfig, EnrichmentInputs,
    FacilityCategory, FacilitySet, GeoPoint, RoadSegment, RoadTable, TrafficCounter,
};

fn sample_inputs() -> EnrichmentInputs {
    EnrichmentInputs {
        facilities: vec![
            FacilitySet::new(FacilityCategory::Crosswalk, vec![GeoPoint::new(37.50, 127.00005)]),
            FacilitySet::new(FacilityCategory::TrafficLight, vec![]),
            FacilitySet::new(FacilityCategory::ChildZone, vec![GeoPoint::new(37.502, 127.0)]),
        ],
        counters: vec![TrafficCounter::new(GeoPoint::new(37.501, 127.0))
            .with_volume(2021, Some(10.0))
            .with_volume(2022, None)
            .with_volume(2023, Some(20.0))],
        roads: Some(RoadTable::from_segments(vec![RoadSegment {
            road_name: "테헤란로".to_string(),
            lanes: Some(10),
            length_m: Some(4_000.0),
            midday: Some(19.0),
            all_day: Some(24.0),
            ..Default::default()
        }])),
    }
}

#[test]
fn test_three_accident_scenario() {
    let accidents = vec![
        AccidentRecord::new("1", GeoPoint::new(37.50, 127.00), 2022).with_road("테헤란 로", 12),
        AccidentRecord::new("2", GeoPoint::new(37.50, 127.0001), 2023).with_road("테헤란로", 3),
        AccidentRecord::new("3", GeoPoint::new(37.60, 127.10), 2021),
    ];

    let rows = enrich(accidents, &sample_inputs(), &EnrichmentConfig::default()).unwrap();

    let crosswalk: Vec<bool> = rows.iter().map(|r| r.flags.near_crosswalk).collect();
    assert_eq!(crosswalk, vec![true, true, false]);
    assert!(rows.iter().all(|r| !r.flags.near_traffic_light));
    assert!(rows[0].flags.near_child_zone);
    assert!(!rows[2].flags.near_child_zone);

    assert_eq!(rows[0].traffic_volume, Some(15.0));
    assert_eq!(rows[1].traffic_volume, Some(20.0));
    assert_eq!(rows[2].traffic_volume, None);

    assert_eq!(rows[0].road.unwrap().velocity, Some(19.0));
    assert_eq!(rows[1].road.unwrap().velocity, Some(24.0));
    assert!(rows[2].road.is_none());
}

#[test]
fn test_cohort_hotspots_in_output() {
    let center = GeoPoint::new(37.5663, 126.9779);
    let accidents: Vec<AccidentRecord> = (0..6)
        .map(|i| {
            let p = destination_point(&center, i as f64 * 60.0, 10.0);
            AccidentRecord::new(format!("acc-{}", i), p, 2021 + (i % 3) as u16).with_driver_age(75)
        })
        .collect();

    let rows = enrich(accidents, &EnrichmentInputs::default(), &EnrichmentConfig::default()).unwrap();
    for row in &rows {
        let elderly = row.hotspots.elderly.unwrap();
        assert_eq!(elderly.cluster_id, Some(0));
        assert!(row.hotspots.non_elderly.is_none());
        assert!(row.in_grid_hotspot);
    }

    let by_year = split_by_year(rows);
    assert_eq!(by_year.len(), 3);
    assert!(by_year.values().all(|rows| rows.len() == 2));
}

#[test]
fn test_duplicate_ids_fail() {
    let p = GeoPoint::new(37.5, 127.0);
    let accidents = vec![AccidentRecord::new("same", p, 2021), AccidentRecord::new("same", p, 2022)];
    let result = enrich(accidents, &EnrichmentInputs::default(), &EnrichmentConfig::default());
    assert!(matches!(result, Err(EnrichError::DuplicateAccidentId { .. })));
}

#[cfg(feature = "serde")]
#[test]
fn test_config_from_partial_json() {
    let json = r#"{ "volume": { "max_distance_km": 0.5 }, "hotspot": { "age_cut": 70 } }"#;
    let config: EnrichmentConfig = serde_json::from_str(json).unwrap();
    assert_eq!(config.volume.max_distance_km, 0.5);
    assert_eq!(config.hotspot.age_cut, 70);
    assert_eq!(config.hotspot.elderly.min_samples, 5);
    assert_eq!(config.proximity.crosswalk.radius_m, 10.0);
}

#[cfg(feature = "csv")]
#[test]
fn test_csv_tables_end_to_end() {
    use accident_geo::io::{read_accidents, read_counters, read_facilities, read_protection_zones, write_enriched};

    let accidents = "\
acdnt_no,lat,lng,acdnt_year,occrrnc_time_code,route_nm,acdnt_age_1_code
1,37.50,127.00,2022,8,,70
2,37.50,127.0001,2023,14,,
3,,,2021,,,30
";
    let crosswalks = "lat,lng\n37.50,127.00005\n,\n";
    let zones = "category,lat,lng\n노인,37.5015,127.0\n";
    let counters = "lat,lng,2021,2022,2023\n37.501,127.0,\"1,000\",unknown,\"2,000\"\n";

    let mut facilities = vec![read_facilities(crosswalks.as_bytes(), FacilityCategory::Crosswalk).unwrap()];
    facilities.extend(read_protection_zones(zones.as_bytes()).unwrap());
    let inputs = EnrichmentInputs {
        facilities,
        counters: read_counters(counters.as_bytes()).unwrap(),
        roads: None,
    };

    let rows = enrich(read_accidents(accidents.as_bytes()).unwrap(), &inputs, &EnrichmentConfig::default()).unwrap();
    assert!(rows[0].flags.near_crosswalk && rows[0].flags.near_elderly_zone);
    assert_eq!(rows[0].traffic_volume, Some(1_500.0));
    assert_eq!(rows[1].traffic_volume, Some(2_000.0));
    assert!(!rows[2].flags.near_crosswalk);
    assert_eq!(rows[2].traffic_volume, None);

    let mut out = Vec::new();
    write_enriched(&mut out, &rows).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert_eq!(text.lines().count(), 4);
    assert!(text.lines().next().unwrap().starts_with("acdnt_no,lat,lng,acdnt_year"));
}
