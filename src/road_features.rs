//! Road attributes joined to accidents by road name.
//!
//! Road segments carry lane count, length and average speeds for four
//! periods of the day. An accident picks the speed of the period its
//! time-of-day code falls into.

use crate::AccidentRecord;
use log::debug;
use std::collections::HashMap;

/// Period of the day with its own average speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum VelocityPeriod {
    /// 07..=09
    Morning,
    /// 12..=13
    Midday,
    /// 17..=19
    Afternoon,
    AllDay,
}

impl VelocityPeriod {
    /// Period for a time-of-day code; a missing code uses the all-day speed.
    pub fn from_time_code(code: Option<u8>) -> Self {
        match code {
            Some(7..=9) => VelocityPeriod::Morning,
            Some(12..=13) => VelocityPeriod::Midday,
            Some(17..=19) => VelocityPeriod::Afternoon,
            _ => VelocityPeriod::AllDay,
        }
    }
}

/// One road from the road speed table.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RoadSegment {
    pub road_name: String,
    pub lanes: Option<u32>,
    /// Road length in meters
    pub length_m: Option<f64>,
    /// Average speeds in km/h
    pub morning: Option<f64>,
    pub midday: Option<f64>,
    pub afternoon: Option<f64>,
    pub all_day: Option<f64>,
}

impl RoadSegment {
    pub fn velocity(&self, period: VelocityPeriod) -> Option<f64> {
        match period {
            VelocityPeriod::Morning => self.morning,
            VelocityPeriod::Midday => self.midday,
            VelocityPeriod::Afternoon => self.afternoon,
            VelocityPeriod::AllDay => self.all_day,
        }
    }
}

/// Road attributes attached to an accident.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RoadFeatures {
    pub lanes: Option<u32>,
    pub length_m: Option<f64>,
    /// Average speed for the accident's time of day
    pub velocity: Option<f64>,
}

/// Remove all whitespace from a road name. Blank names give `None`.
///
/// ```rust
/// use accident_geo::road_features::normalize_road_name;
///
/// assert_eq!(normalize_road_name(" 세종 대로 "), Some("세종대로".to_string()));
/// assert_eq!(normalize_road_name("   "), None);
/// ```
pub fn normalize_road_name(name: &str) -> Option<String> {
    let normalized: String = name.chars().filter(|c| !c.is_whitespace()).collect();
    (!normalized.is_empty()).then_some(normalized)
}

/// Road segments keyed by normalized name.
#[derive(Debug, Clone, Default)]
pub struct RoadTable {
    by_name: HashMap<String, RoadSegment>,
}

impl RoadTable {
    /// Build the table. Segments with blank names are dropped and the first
    /// segment wins when names repeat.
    pub fn from_segments(segments: impl IntoIterator<Item = RoadSegment>) -> Self {
        let mut by_name = HashMap::new();
        let mut duplicates = 0usize;

        for segment in segments {
            let Some(key) = normalize_road_name(&segment.road_name) else {
                continue;
            };
            if by_name.contains_key(&key) {
                duplicates += 1;
                continue;
            }
            by_name.insert(key, segment);
        }

        if duplicates > 0 {
            debug!("[road_features] ignored {} duplicate road names", duplicates);
        }

        Self { by_name }
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn get(&self, road_name: &str) -> Option<&RoadSegment> {
        self.by_name.get(&normalize_road_name(road_name)?)
    }

    /// Features for one accident, `None` when its road is unnamed or unknown.
    pub fn features(&self, accident: &AccidentRecord) -> Option<RoadFeatures> {
        let segment = self.get(accident.road_name.as_deref()?)?;
        let period = VelocityPeriod::from_time_code(accident.time_code);

        Some(RoadFeatures {
            lanes: segment.lanes,
            length_m: segment.length_m,
            velocity: segment.velocity(period),
        })
    }

    /// Features for every accident, in input order.
    pub fn attach(&self, accidents: &[AccidentRecord]) -> Vec<Option<RoadFeatures>> {
        let features: Vec<Option<RoadFeatures>> = accidents.iter().map(|a| self.features(a)).collect();
        debug!(
            "[road_features] matched {} of {} accidents to {} roads",
            features.iter().filter(|f| f.is_some()).count(),
            features.len(),
            self.len()
        );
        features
    }
}
