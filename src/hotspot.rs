//! Density-based hotspot detection.
//!
//! Accidents are clustered with DBSCAN over great-circle distance, separately
//! for each driver-age cohort. Cluster members are hotspot accidents and carry
//! the centroid of their cluster; everything else is noise.
//!
//! ## Algorithm
//! 1. Find the eps-neighbourhood of every point (index candidates, then exact
//!    haversine check). A point counts as its own neighbour.
//! 2. Points with at least `min_samples` neighbours are core points.
//! 3. Walk points in input order; each unlabeled core point starts a new
//!    cluster that grows through the neighbourhoods of its core members.
//!    Border points join the first cluster that reaches them.

use crate::error::{ensure_positive, EnrichError, Result};
use crate::geo_utils::{compute_center, haversine_distance};
use crate::proximity::MATCH_TOLERANCE_M;
use crate::spatial_index::{search_radius, FacilityIndex};
use crate::{AccidentRecord, GeoPoint};
use log::{debug, info};
use std::collections::HashMap;

/// Cluster id written for noise points.
pub const NOISE_CLUSTER_ID: i64 = -1;

/// Hotspot result for one point.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HotspotLabel {
    /// Cluster id, `None` for noise
    pub cluster_id: Option<usize>,
    pub is_hotspot: bool,
    /// Mean latitude and longitude of the cluster's members
    pub center: Option<GeoPoint>,
}

impl HotspotLabel {
    pub fn noise() -> Self {
        Self::default()
    }

    /// Cluster id as written to tables, with noise as [`NOISE_CLUSTER_ID`].
    pub fn cluster_code(&self) -> i64 {
        self.cluster_id.map_or(NOISE_CLUSTER_ID, |id| id as i64)
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// DBSCAN parameters for one cohort.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CohortConfig {
    /// Neighbourhood radius in meters
    pub eps_m: f64,
    /// Minimum neighbourhood size (including the point) of a core point
    pub min_samples: usize,
}

impl CohortConfig {
    pub fn new(eps_m: f64, min_samples: usize) -> Self {
        Self { eps_m, min_samples }
    }

    pub fn validate(&self) -> Result<()> {
        ensure_positive("eps_m", self.eps_m)?;
        if self.min_samples == 0 {
            return Err(EnrichError::invalid("min_samples", 0, "must be at least 1"));
        }
        Ok(())
    }
}

/// Driver-age cohorts that are clustered separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Cohort {
    /// Driver age at or above the cut
    Elderly,
    /// Driver age below the cut
    NonElderly,
    /// Every accident, including unknown ages
    All,
}

impl Cohort {
    pub const ALL: [Cohort; 3] = [Cohort::Elderly, Cohort::NonElderly, Cohort::All];

    /// Check whether a driver age belongs to the cohort.
    pub fn contains(self, driver_age: Option<u32>, age_cut: u32) -> bool {
        match (self, driver_age) {
            (Cohort::All, _) => true,
            (Cohort::Elderly, Some(age)) => age >= age_cut,
            (Cohort::NonElderly, Some(age)) => age < age_cut,
            (_, None) => false,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Cohort::Elderly => "elderly",
            Cohort::NonElderly => "non_elderly",
            Cohort::All => "all",
        }
    }
}

/// Hotspot configuration for all cohorts.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct HotspotConfig {
    /// Age at which a driver counts as elderly (default: 65)
    pub age_cut: u32,
    /// Default: 100 m, 5 samples
    pub elderly: CohortConfig,
    /// Default: 100 m, 7 samples
    pub non_elderly: CohortConfig,
    /// Default: 50 m, 5 samples
    pub all: CohortConfig,
}

impl Default for HotspotConfig {
    fn default() -> Self {
        Self {
            age_cut: 65,
            elderly: CohortConfig::new(100.0, 5),
            non_elderly: CohortConfig::new(100.0, 7),
            all: CohortConfig::new(50.0, 5),
        }
    }
}

impl HotspotConfig {
    pub fn cohort(&self, cohort: Cohort) -> CohortConfig {
        match cohort {
            Cohort::Elderly => self.elderly,
            Cohort::NonElderly => self.non_elderly,
            Cohort::All => self.all,
        }
    }

    pub fn validate(&self) -> Result<()> {
        Cohort::ALL.iter().try_for_each(|c| self.cohort(*c).validate())
    }
}

/// Labels of one accident in each cohort; `None` when it is not a member.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CohortHotspots {
    pub elderly: Option<HotspotLabel>,
    pub non_elderly: Option<HotspotLabel>,
    pub all: Option<HotspotLabel>,
}

impl CohortHotspots {
    pub fn get(&self, cohort: Cohort) -> Option<HotspotLabel> {
        match cohort {
            Cohort::Elderly => self.elderly,
            Cohort::NonElderly => self.non_elderly,
            Cohort::All => self.all,
        }
    }

    fn set(&mut self, cohort: Cohort, label: Option<HotspotLabel>) {
        match cohort {
            Cohort::Elderly => self.elderly = label,
            Cohort::NonElderly => self.non_elderly = label,
            Cohort::All => self.all = label,
        }
    }
}

// =============================================================================
// DBSCAN
// =============================================================================

/// Cluster points with DBSCAN and label each one.
///
/// Returns one label per input point. Missing points are noise, as is every
/// point when fewer than `min_samples` points are present.
///
/// # Example
///
/// ```rust
/// use accident_geo::{cluster_and_mark, GeoPoint};
///
/// let mut points: Vec<Option<GeoPoint>> = (0..5)
///     .map(|i| Some(GeoPoint::new(37.5, 127.0 + i as f64 * 0.0001)))
///     .collect();
/// points.push(Some(GeoPoint::new(37.6, 127.2)));
///
/// let labels = cluster_and_mark(&points, 100.0, 5);
/// assert!(labels[..5].iter().all(|l| l.cluster_id == Some(0)));
/// assert!(!labels[5].is_hotspot);
/// ```
pub fn cluster_and_mark(points: &[Option<GeoPoint>], eps_m: f64, min_samples: usize) -> Vec<HotspotLabel> {
    let n = points.len();
    let present = points.iter().filter(|p| p.is_some_and(|p| p.is_valid())).count();
    if present == 0 || present < min_samples {
        return vec![HotspotLabel::noise(); n];
    }

    let index = FacilityIndex::build(points);
    let neighbourhoods = find_neighbourhoods(&index, points, eps_m);
    // Missing points have empty neighbourhoods and are never core
    let is_core: Vec<bool> = neighbourhoods
        .iter()
        .map(|nb| !nb.is_empty() && nb.len() >= min_samples)
        .collect();

    let mut assignment: Vec<Option<usize>> = vec![None; n];
    let mut n_clusters = 0usize;

    for start in 0..n {
        if !is_core[start] || assignment[start].is_some() {
            continue;
        }

        let cluster = n_clusters;
        n_clusters += 1;
        assignment[start] = Some(cluster);
        let mut stack = vec![start];

        while let Some(current) = stack.pop() {
            for &neighbour in &neighbourhoods[current] {
                if assignment[neighbour].is_some() {
                    continue;
                }
                assignment[neighbour] = Some(cluster);
                if is_core[neighbour] {
                    stack.push(neighbour);
                }
            }
        }
    }

    let centers = cluster_centers(points, &assignment, n_clusters);

    debug!(
        "[hotspot] {} points, eps {}m, min_samples {}: {} clusters, {} noise",
        n,
        eps_m,
        min_samples,
        n_clusters,
        assignment.iter().filter(|a| a.is_none()).count()
    );

    assignment
        .into_iter()
        .map(|cluster| match cluster {
            Some(id) => HotspotLabel {
                cluster_id: Some(id),
                is_hotspot: true,
                center: centers[id],
            },
            None => HotspotLabel::noise(),
        })
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn find_neighbourhoods(index: &FacilityIndex, points: &[Option<GeoPoint>], eps_m: f64) -> Vec<Vec<usize>> {
    points.iter().map(|p| neighbourhood(index, *p, eps_m)).collect()
}

#[cfg(feature = "parallel")]
fn find_neighbourhoods(index: &FacilityIndex, points: &[Option<GeoPoint>], eps_m: f64) -> Vec<Vec<usize>> {
    use rayon::prelude::*;
    points.par_iter().map(|p| neighbourhood(index, *p, eps_m)).collect()
}

/// Indices within `eps_m` of a point, including the point itself.
fn neighbourhood(index: &FacilityIndex, point: Option<GeoPoint>, eps_m: f64) -> Vec<usize> {
    let Some(point) = point.filter(GeoPoint::is_valid) else {
        return Vec::new();
    };

    let r = search_radius(point.latitude, eps_m, 0.0);
    let mut hits: Vec<usize> = index
        .candidates(point.to_radians(), r)
        .into_iter()
        .filter(|(_, other)| haversine_distance(&point, other) <= eps_m + MATCH_TOLERANCE_M)
        .map(|(idx, _)| idx)
        .collect();
    // Deterministic expansion order regardless of tree layout
    hits.sort_unstable();
    hits
}

fn cluster_centers(
    points: &[Option<GeoPoint>],
    assignment: &[Option<usize>],
    n_clusters: usize,
) -> Vec<Option<GeoPoint>> {
    let mut members: Vec<Vec<GeoPoint>> = vec![Vec::new(); n_clusters];
    for (point, cluster) in points.iter().zip(assignment) {
        if let (Some(p), Some(c)) = (point, cluster) {
            members[*c].push(*p);
        }
    }
    members.iter().map(|m| compute_center(m)).collect()
}

// =============================================================================
// Cohorts
// =============================================================================

/// Cluster every cohort with its configuration and merge the labels back by
/// accident id.
///
/// Fails with [`EnrichError::DuplicateAccidentId`] when two accidents share an
/// id, since their labels could not be told apart.
pub fn assign_cohort_hotspots(accidents: &[AccidentRecord], config: &HotspotConfig) -> Result<Vec<CohortHotspots>> {
    let mut row_by_id: HashMap<&str, usize> = HashMap::with_capacity(accidents.len());
    for (row, accident) in accidents.iter().enumerate() {
        if let Some(first) = row_by_id.insert(accident.id.as_str(), row) {
            return Err(EnrichError::DuplicateAccidentId {
                id: accident.id.clone(),
                first,
                second: row,
            });
        }
    }

    let mut merged = vec![CohortHotspots::default(); accidents.len()];

    for cohort in Cohort::ALL {
        let params = config.cohort(cohort);
        let members: Vec<&AccidentRecord> = accidents
            .iter()
            .filter(|a| cohort.contains(a.driver_age, config.age_cut))
            .collect();
        let points: Vec<Option<GeoPoint>> = members.iter().map(|a| a.point()).collect();
        let labels = cluster_and_mark(&points, params.eps_m, params.min_samples);

        let hotspots = labels.iter().filter(|l| l.is_hotspot).count();
        info!(
            "[hotspot] cohort {}: {} accidents, {} in hotspots",
            cohort.name(),
            members.len(),
            hotspots
        );

        for (accident, label) in members.iter().zip(labels) {
            if let Some(&row) = row_by_id.get(accident.id.as_str()) {
                merged[row].set(cohort, Some(label));
            }
        }
    }

    Ok(merged)
}
