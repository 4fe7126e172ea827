//! Example of a full enrichment run over a synthetic accident table.
//!
//! Run with: cargo run --example parallel_enrichment --features parallel

use accident_geo::geo_utils::destination_point;
use accident_geo::{
    enrich, split_by_year, AccidentRecord, EnrichmentConfig, EnrichmentInputs, FacilityCategory,
    FacilitySet, GeoPoint, TrafficCounter,
};
use std::time::Instant;

fn main() {
    println!("Parallel Enrichment Example\n");

    let city_hall = GeoPoint::new(37.5663, 126.9779);

    // Spiral of accidents with a dense core near City Hall
    let accidents: Vec<AccidentRecord> = (0..5_000)
        .map(|i| {
            let distance = (i as f64).sqrt() * 40.0;
            let bearing = i as f64 * 137.5;
            let location = destination_point(&city_hall, bearing, distance);
            let age = 20 + (i * 7) % 70;
            AccidentRecord::new(format!("acc-{}", i), location, 2021 + (i % 3) as u16)
                .with_driver_age(age as u32)
        })
        .collect();

    let grid = |step: f64| -> Vec<GeoPoint> {
        (0..40)
            .flat_map(|r| {
                (0..40).map(move |c| {
                    let north = destination_point(&city_hall, 0.0, (r as f64 - 20.0) * step);
                    destination_point(&north, 90.0, (c as f64 - 20.0) * step)
                })
            })
            .collect()
    };

    let inputs = EnrichmentInputs {
        facilities: vec![
            FacilitySet::new(FacilityCategory::Crosswalk, grid(75.0)),
            FacilitySet::new(FacilityCategory::TrafficLight, grid(120.0)),
            FacilitySet::new(FacilityCategory::ChildZone, grid(900.0)),
            FacilitySet::new(FacilityCategory::ElderlyZone, grid(1_500.0)),
            FacilitySet::empty(FacilityCategory::DisabledZone),
        ],
        counters: grid(1_000.0)
            .into_iter()
            .enumerate()
            .map(|(i, p)| {
                TrafficCounter::new(p)
                    .with_volume(2021, Some(10_000.0 + i as f64))
                    .with_volume(2022, None)
                    .with_volume(2023, Some(12_000.0 + i as f64))
            })
            .collect(),
        roads: None,
    };

    println!("Enriching {} accidents\n", accidents.len());

    let start = Instant::now();
    let rows = match enrich(accidents, &inputs, &EnrichmentConfig::default()) {
        Ok(rows) => rows,
        Err(e) => {
            eprintln!("Enrichment failed: {}", e);
            return;
        }
    };
    println!("Enrichment completed in {:?}\n", start.elapsed());

    let near_crosswalk = rows.iter().filter(|r| r.flags.near_crosswalk).count();
    let with_volume = rows.iter().filter(|r| r.traffic_volume.is_some()).count();
    let elderly_hotspots = rows
        .iter()
        .filter(|r| r.hotspots.elderly.is_some_and(|l| l.is_hotspot))
        .count();
    let grid_hotspots = rows.iter().filter(|r| r.in_grid_hotspot).count();

    println!("Stats:");
    println!("  Near a crosswalk: {}", near_crosswalk);
    println!("  With traffic volume: {}", with_volume);
    println!("  In an elderly DBSCAN hotspot: {}", elderly_hotspots);
    println!("  In a grid hotspot: {}", grid_hotspots);

    println!("\nRows per year:");
    for (year, year_rows) in split_by_year(rows) {
        println!("  {}: {}", year, year_rows.len());
    }
}
