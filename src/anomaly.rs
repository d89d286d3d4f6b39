//! Maneuver and orbit anomaly detection.

use std::collections::HashMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use log::{debug, info};

use crate::config::EngineConfig;
use crate::elements::OrbitalElementSet;
use crate::propagator::TrackedObjectState;
use crate::scheduler::Snapshot;

// ---------- Velocity discontinuities ----------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManeuverEvent {
    pub catalog_number: u32,
    pub delta_v_km_s: f64,
    pub previous_velocity_km_s: f64,
    pub new_velocity_km_s: f64,
    pub timestamp: DateTime<Utc>,
}

/// Flags a maneuver when an object's inertial speed changes by more than the
/// threshold between two observations. Only the latest speed per object is kept.
#[derive(Debug, Clone)]
pub struct ManeuverDetector {
    threshold_km_s: f64,
    last_velocity: HashMap<u32, f64>,
}

impl Default for ManeuverDetector {
    fn default() -> Self {
        ManeuverDetector::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for ManeuverDetector {
    fn from(config: &EngineConfig) -> Self {
        ManeuverDetector::new(config.maneuver_threshold_km_s)
    }
}

impl ManeuverDetector {
    pub fn new(threshold_km_s: f64) -> Self {
        ManeuverDetector { threshold_km_s, last_velocity: HashMap::new() }
    }

    pub fn threshold_km_s(&self) -> f64 {
        self.threshold_km_s
    }

    /// The first observation of an object only sets its baseline.
    pub fn observe(&mut self, state: &TrackedObjectState) -> Option<ManeuverEvent> {
        let previous = self.last_velocity.insert(state.catalog_number, state.velocity_km_s)?;
        let delta_v = (state.velocity_km_s - previous).abs();

        if delta_v > self.threshold_km_s {
            debug!("[maneuver] {}: dv {delta_v:.4} km/s", state.catalog_number);
            Some(ManeuverEvent {
                catalog_number: state.catalog_number,
                delta_v_km_s: delta_v,
                previous_velocity_km_s: previous,
                new_velocity_km_s: state.velocity_km_s,
                timestamp: state.timestamp,
            })
        } else {
            None
        }
    }

    pub fn observe_snapshot(&mut self, snapshot: &Snapshot) -> Vec<ManeuverEvent> {
        snapshot.states.iter().filter_map(|s| self.observe(s)).collect()
    }

    /// Drop the baseline of an object no longer tracked.
    pub fn forget(&mut self, catalog_number: u32) -> bool {
        self.last_velocity.remove(&catalog_number).is_some()
    }

    pub fn len(&self) -> usize {
        self.last_velocity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_velocity.is_empty()
    }
}

// ---------- Element history ----------

pub const MIN_HISTORY: usize = 5;
const ZERO_STD: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryStatus {
    InsufficientData,
    Nominal,
    AnomaliesDetected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    Maneuver,       // mean motion up
    DragIncrease,   // mean motion down
    OrbitChange,    // eccentricity
    DragAnomaly,    // |B*|
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementParameter {
    MeanMotion,
    Eccentricity,
    Bstar,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementAnomaly {
    pub epoch: DateTime<Utc>,
    pub kind: AnomalyKind,
    pub parameter: ElementParameter,
    pub z_score: f64,
    pub delta: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryStats {
    pub mean_motion_mean: f64,
    pub mean_motion_std: f64,
    pub eccentricity_mean: f64,
    pub eccentricity_std: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryAnalysis {
    pub status: HistoryStatus,
    pub sets_analyzed: usize,
    pub anomalies: Vec<ElementAnomaly>,
    pub stats: Option<HistoryStats>,
}

fn mean_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Indices (into `diffs`) whose z-score against the other diffs exceeds
/// `z_threshold`, with that score.
fn outliers(diffs: &[f64], z_threshold: f64) -> Vec<(usize, f64)> {
    let (mean, std) = mean_std(diffs);
    let std = if std > 0.0 { std } else { ZERO_STD };
    diffs.iter().enumerate()
        .map(|(i, d)| (i, (d - mean).abs() / std))
        .filter(|(_, z)| *z > z_threshold)
        .collect()
}

/// Look for sudden jumps between successive element sets of one object.
/// Works on the differences of mean motion, eccentricity and |B*| between
/// consecutive epochs; anything further than `z_threshold` standard
/// deviations from the mean difference is reported, newest first.
pub fn analyze_history(history: &[OrbitalElementSet], z_threshold: f64) -> HistoryAnalysis {
    if history.len() < MIN_HISTORY {
        return HistoryAnalysis { status: HistoryStatus::InsufficientData, sets_analyzed: history.len(), anomalies: Vec::new(), stats: None };
    }

    let mut sets: Vec<&OrbitalElementSet> = history.iter().collect();
    sets.sort_by_key(|s| s.epoch);

    let series = |f: fn(&OrbitalElementSet) -> f64| -> Vec<f64> { sets.iter().map(|s| f(s)).collect() };
    let mean_motion = series(|s| s.mean_motion_rev_day);
    let eccentricity = series(|s| s.eccentricity);
    let bstar = series(|s| s.drag_term.abs());

    let diffs = |v: &[f64]| -> Vec<f64> { v.windows(2).map(|w| w[1] - w[0]).collect() };
    let mut anomalies = Vec::new();

    let checks: [(ElementParameter, &[f64]); 3] = [
        (ElementParameter::MeanMotion, &mean_motion),
        (ElementParameter::Eccentricity, &eccentricity),
        (ElementParameter::Bstar, &bstar),
    ];
    for (parameter, values) in checks {
        let d = diffs(values);
        for (i, z_score) in outliers(&d, z_threshold) {
            let kind = match parameter {
                ElementParameter::MeanMotion if d[i] > 0.0 => AnomalyKind::Maneuver,
                ElementParameter::MeanMotion => AnomalyKind::DragIncrease,
                ElementParameter::Eccentricity => AnomalyKind::OrbitChange,
                ElementParameter::Bstar => AnomalyKind::DragAnomaly,
            };
            anomalies.push(ElementAnomaly { epoch: sets[i + 1].epoch, kind, parameter, z_score, delta: d[i] });
        }
    }

    anomalies.sort_by(|a, b| b.epoch.cmp(&a.epoch));

    let (mm_mean, mm_std) = mean_std(&mean_motion);
    let (ecc_mean, ecc_std) = mean_std(&eccentricity);
    let status = if anomalies.is_empty() { HistoryStatus::Nominal } else { HistoryStatus::AnomaliesDetected };

    if !anomalies.is_empty() {
        info!("[history] {}: {} anomalies over {} element sets", sets[0].catalog_number, anomalies.len(), sets.len());
    }

    HistoryAnalysis {
        status,
        sets_analyzed: sets.len(),
        anomalies,
        stats: Some(HistoryStats { mean_motion_mean: mm_mean, mean_motion_std: mm_std, eccentricity_mean: ecc_mean, eccentricity_std: ecc_std }),
    }
}
