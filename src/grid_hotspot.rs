//! Grid-count hotspots.
//!
//! Lays a square grid over the accidents of the elderly cohort, counts cohort
//! accidents per cell and flags every accident (of any age) that falls into a
//! cell with at least `min_accidents` cohort accidents.
//!
//! The grid uses a local equirectangular projection at the cohort's mean
//! latitude and is anchored at the cohort's south-west corner, which is
//! accurate to well under a cell at city scale.

use crate::error::{ensure_positive, EnrichError, Result};
use crate::{AccidentRecord, Bounds, GeoPoint};
use log::debug;
use std::collections::HashMap;

/// Meters per degree of latitude on the projection.
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Configuration for grid hotspots.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct GridHotspotConfig {
    /// Drivers at or above this age form the counted cohort (default: 65)
    pub age_cut: u32,
    /// Grid cell edge in meters (default: 100m)
    pub cell_size_m: f64,
    /// Cohort accidents a cell needs to be a hotspot (default: 5)
    pub min_accidents: usize,
}

impl Default for GridHotspotConfig {
    fn default() -> Self {
        Self {
            age_cut: 65,
            cell_size_m: 100.0,
            min_accidents: 5,
        }
    }
}

impl GridHotspotConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_positive("cell_size_m", self.cell_size_m)?;
        if self.min_accidents == 0 {
            return Err(EnrichError::invalid("min_accidents", 0, "must be at least 1"));
        }
        Ok(())
    }
}

/// Grid coordinate (row, col)
type CellCoord = (i64, i64);

struct HotspotGrid {
    cell_size_m: f64,
    origin_lat: f64,
    origin_lng: f64,
    lng_meters_per_deg: f64,
}

impl HotspotGrid {
    /// Grid anchored at the south-west corner of the points.
    fn anchored(points: &[GeoPoint], cell_size_m: f64) -> Option<Self> {
        let bounds = Bounds::from_points(points)?;
        let mean_lat = points.iter().map(|p| p.latitude).sum::<f64>() / points.len() as f64;

        Some(Self {
            cell_size_m,
            origin_lat: bounds.min_lat,
            origin_lng: bounds.min_lng,
            lng_meters_per_deg: METERS_PER_DEGREE * mean_lat.to_radians().cos(),
        })
    }

    fn cell_of(&self, point: &GeoPoint) -> CellCoord {
        let north = (point.latitude - self.origin_lat) * METERS_PER_DEGREE;
        let east = (point.longitude - self.origin_lng) * self.lng_meters_per_deg;

        let row = (north / self.cell_size_m).floor() as i64;
        let col = (east / self.cell_size_m).floor() as i64;

        (row, col)
    }
}

/// Flag each accident that lies in a grid cell with at least
/// `min_accidents` accidents of the elderly cohort.
///
/// Returns one flag per accident, in input order. Accidents without a location
/// are never flagged; an empty cohort flags nothing.
pub fn mark_grid_hotspots(accidents: &[AccidentRecord], config: &GridHotspotConfig) -> Vec<bool> {
    let cohort: Vec<GeoPoint> = accidents
        .iter()
        .filter(|a| a.driver_age.is_some_and(|age| age >= config.age_cut))
        .filter_map(AccidentRecord::point)
        .collect();

    let Some(grid) = HotspotGrid::anchored(&cohort, config.cell_size_m) else {
        return vec![false; accidents.len()];
    };

    let mut counts: HashMap<CellCoord, usize> = HashMap::new();
    for p in &cohort {
        *counts.entry(grid.cell_of(p)).or_default() += 1;
    }

    let hot_cells = counts.values().filter(|c| **c >= config.min_accidents).count();
    debug!(
        "[grid_hotspot] {} cohort accidents in {} cells, {} hotspot cells",
        cohort.len(),
        counts.len(),
        hot_cells
    );

    accidents
        .iter()
        .map(|a| match a.point() {
            Some(p) => counts
                .get(&grid.cell_of(&p))
                .is_some_and(|c| *c >= config.min_accidents),
            None => false,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_utils::destination_point;

    fn elderly(id: usize, p: GeoPoint) -> AccidentRecord {
        AccidentRecord::new(format!("e{id}"), p, 2023).with_driver_age(72)
    }

    #[test]
    fn test_hot_cell_flags_all_ages() {
        let origin = GeoPoint::new(37.5, 127.0);
        let mut accidents: Vec<AccidentRecord> = (0..5)
            .map(|i| elderly(i, destination_point(&origin, 45.0, 5.0 + i as f64 * 2.0)))
            .collect();
        // Young driver in the same cell, elderly driver far away
        accidents.push(AccidentRecord::new("y", destination_point(&origin, 45.0, 20.0), 2023).with_driver_age(30));
        accidents.push(elderly(99, destination_point(&origin, 45.0, 3_000.0)));

        let flags = mark_grid_hotspots(&accidents, &GridHotspotConfig::default());
        assert_eq!(flags, vec![true, true, true, true, true, true, false]);
    }

    #[test]
    fn test_below_threshold() {
        let origin = GeoPoint::new(37.5, 127.0);
        let accidents: Vec<AccidentRecord> = (0..4)
            .map(|i| elderly(i, destination_point(&origin, 45.0, 5.0 + i as f64)))
            .collect();
        let flags = mark_grid_hotspots(&accidents, &GridHotspotConfig::default());
        assert!(flags.iter().all(|f| !f));
    }

    #[test]
    fn test_empty_cohort() {
        let accidents = vec![
            AccidentRecord::new("a", GeoPoint::new(37.5, 127.0), 2021).with_driver_age(40),
            AccidentRecord::new("b", GeoPoint::new(37.5, 127.0), 2021),
        ];
        assert_eq!(mark_grid_hotspots(&accidents, &GridHotspotConfig::default()), vec![false, false]);
    }

    #[test]
    fn test_cell_anchor() {
        let pts = vec![GeoPoint::new(37.5, 127.0), GeoPoint::new(37.51, 127.01)];
        let grid = HotspotGrid::anchored(&pts, 100.0).unwrap();
        assert_eq!(grid.cell_of(&pts[0]), (0, 0));
        let (row, col) = grid.cell_of(&pts[1]);
        assert_eq!(row, 11);
        assert!(col > 0);
    }

    #[test]
    fn test_config_validation() {
        assert!(GridHotspotConfig::default().validate().is_ok());
        let bad = GridHotspotConfig { cell_size_m: 0.0, ..Default::default() };
        assert!(bad.validate().is_err());
    }
}
