//! Basic example of enriching a handful of accidents.
//!
//! Run with: cargo run --example basic_enrichment

use accident_geo::{
    attach_nearest_value, cluster_and_mark, mark_proximity, AccidentRecord, FacilityCategory,
    FacilitySet, GeoPoint, TrafficCounter,
};

fn main() {
    // Accidents around Seoul City Hall, one near Gangnam
    let accidents = vec![
        AccidentRecord::new("2022-0001", GeoPoint::new(37.5663, 126.9779), 2022),
        AccidentRecord::new("2022-0002", GeoPoint::new(37.5664, 126.9780), 2022),
        AccidentRecord::new("2023-0001", GeoPoint::new(37.5662, 126.9781), 2023),
        AccidentRecord::new("2023-0002", GeoPoint::new(37.4979, 127.0276), 2023),
    ];

    let crosswalks = FacilitySet::new(
        FacilityCategory::Crosswalk,
        vec![GeoPoint::new(37.56635, 126.97795)],
    );

    println!("Accident Enrichment Example\n");

    // Proximity flags
    let near = mark_proximity(&accidents, &crosswalks, 10.0, 10.0);
    println!("1. Crosswalk within 10m:");
    for (accident, flag) in accidents.iter().zip(&near) {
        println!("   {}: {}", accident.id, flag);
    }

    // Traffic volume with a missing 2023 reading
    let counter = TrafficCounter::new(GeoPoint::new(37.5670, 126.9785))
        .with_volume(2021, Some(52_000.0))
        .with_volume(2022, Some(54_000.0))
        .with_volume(2023, None);

    let volumes = attach_nearest_value(&accidents, &[counter], 2.0);
    println!("\n2. Nearest counter volume (2km cap):");
    for (accident, volume) in accidents.iter().zip(&volumes) {
        match volume {
            Some(v) => println!("   {} ({}): {:.0}", accident.id, accident.year, v),
            None => println!("   {} ({}): none", accident.id, accident.year),
        }
    }

    // Hotspots
    let points: Vec<Option<GeoPoint>> = accidents.iter().map(|a| a.location).collect();
    let labels = cluster_and_mark(&points, 50.0, 3);
    println!("\n3. DBSCAN hotspots (eps=50m, min_samples=3):");
    for (accident, label) in accidents.iter().zip(&labels) {
        match label.center {
            Some(center) => println!("   {}: cluster {} at {}", accident.id, label.cluster_code(), center),
            None => println!("   {}: noise", accident.id),
        }
    }
}
