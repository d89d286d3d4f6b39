//! Close-approach screening between tracked objects.
//!
//! Screening is stateless: every call is a pure function of its snapshot(s),
//! so shards of the catalog can be screened concurrently.

use std::collections::HashMap;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use log::debug;

use crate::catalog::ObjectKind;
use crate::config::EngineConfig;
use crate::error::{invalid_param, Result};
use crate::frames::{distance, norm, Geodetic};
use crate::propagator::TrackedObjectState;
use crate::scheduler::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_distance(distance_km: f64) -> RiskLevel {
        if distance_km < 1.0 {
            RiskLevel::Critical
        } else if distance_km < 5.0 {
            RiskLevel::High
        } else if distance_km < 25.0 {
            RiskLevel::Moderate
        } else {
            RiskLevel::Low
        }
    }
}

/// One side of a conjunction, as it was at the time of closest approach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectAtTca {
    pub catalog_number: u32,
    pub name: String,
    pub kind: ObjectKind,
    pub geodetic: Geodetic,
    pub eci_position_km: [f64; 3],
    pub eci_velocity_km_s: [f64; 3],
}

impl From<&TrackedObjectState> for ObjectAtTca {
    fn from(s: &TrackedObjectState) -> Self {
        ObjectAtTca {
            catalog_number: s.catalog_number,
            name: s.display_name(),
            kind: s.kind,
            geodetic: s.geodetic,
            eci_position_km: s.eci_position_km,
            eci_velocity_km_s: s.eci_velocity_km_s,
        }
    }
}

/// A flagged pair. `primary` always has the lower catalog number, so a pair
/// appears once regardless of the order the objects were screened in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConjunctionEvent {
    pub primary: ObjectAtTca,
    pub secondary: ObjectAtTca,
    pub tca: DateTime<Utc>,
    pub distance_km: f64,
    pub risk: RiskLevel,
    pub threshold_km: f64,
    pub refined: bool,
    pub probability: Option<PocResult>,
}

impl ConjunctionEvent {
    pub fn between(a: &TrackedObjectState, b: &TrackedObjectState, threshold_km: f64) -> Self {
        let (p, s) = if a.catalog_number <= b.catalog_number { (a, b) } else { (b, a) };
        let distance_km = distance(p.eci_position_km, s.eci_position_km);
        ConjunctionEvent {
            primary: p.into(),
            secondary: s.into(),
            tca: p.timestamp,
            distance_km,
            risk: RiskLevel::from_distance(distance_km),
            threshold_km,
            refined: false,
            probability: None,
        }
    }

    pub fn pair_key(&self) -> (u32, u32) {
        (self.primary.catalog_number, self.secondary.catalog_number)
    }

    pub fn relative_speed_km_s(&self) -> f64 {
        let (v1, v2) = (self.primary.eci_velocity_km_s, self.secondary.eci_velocity_km_s);
        norm([v1[0] - v2[0], v1[1] - v2[1], v1[2] - v2[2]])
    }

    pub fn with_probability(mut self, poc: PocResult) -> Self {
        self.probability = Some(poc);
        self
    }
}

// ---------- Screening ----------

/// Uniform grid over inertial positions with cells as wide as the threshold,
/// so any pair closer than the threshold lies in the same or adjacent cells.
struct SpatialGrid {
    edge: f64,
    cells: HashMap<(i64, i64, i64), Vec<usize>>,
}

impl SpatialGrid {
    fn build(states: &[TrackedObjectState], edge: f64) -> Self {
        let mut cells: HashMap<(i64, i64, i64), Vec<usize>> = HashMap::new();
        for (i, s) in states.iter().enumerate() {
            cells.entry(Self::cell(s.eci_position_km, edge)).or_default().push(i);
        }
        SpatialGrid { edge, cells }
    }

    fn cell(p: [f64; 3], edge: f64) -> (i64, i64, i64) {
        ((p[0] / edge).floor() as i64, (p[1] / edge).floor() as i64, (p[2] / edge).floor() as i64)
    }

    fn neighbors(&self, p: [f64; 3]) -> impl Iterator<Item = usize> + '_ {
        let (cx, cy, cz) = Self::cell(p, self.edge);
        (-1i64..=1).flat_map(move |dx| (-1i64..=1).flat_map(move |dy| (-1i64..=1).map(move |dz| {
            (cx.saturating_add(dx), cy.saturating_add(dy), cz.saturating_add(dz))
        })))
        .filter_map(move |key| self.cells.get(&key))
        .flat_map(|v| v.iter().copied())
    }
}

/// All unordered pairs in `states` closer than `threshold_km`, closest first.
pub fn screen(states: &[TrackedObjectState], threshold_km: f64) -> Vec<ConjunctionEvent> {
    if !(threshold_km > 0.0) || !threshold_km.is_finite() {
        return Vec::new();
    }

    let grid = SpatialGrid::build(states, threshold_km);
    let mut events = Vec::new();

    for (i, a) in states.iter().enumerate() {
        for j in grid.neighbors(a.eci_position_km) {
            if j <= i { continue; }
            let b = &states[j];
            if a.catalog_number == b.catalog_number { continue; }

            if distance(a.eci_position_km, b.eci_position_km) < threshold_km {
                events.push(ConjunctionEvent::between(a, b, threshold_km));
            }
        }
    }

    sort_events(&mut events);
    debug!("[screen] {} objects, {} pairs under {threshold_km} km", states.len(), events.len());
    events
}

/// Screen a sequence of future snapshots and keep, per pair, the closest
/// sampled approach.
pub fn screen_projected(snapshots: &[Snapshot], threshold_km: f64) -> Vec<ConjunctionEvent> {
    let mut closest: HashMap<(u32, u32), ConjunctionEvent> = HashMap::new();

    for snapshot in snapshots {
        for event in screen(&snapshot.states, threshold_km) {
            match closest.get(&event.pair_key()) {
                Some(prev) if prev.distance_km <= event.distance_km => {}
                _ => { closest.insert(event.pair_key(), event); }
            }
        }
    }

    let mut events: Vec<ConjunctionEvent> = closest.into_values().collect();
    sort_events(&mut events);
    events
}

pub(crate) fn sort_events(events: &mut [ConjunctionEvent]) {
    events.sort_by(|a, b| {
        a.distance_km.total_cmp(&b.distance_km).then_with(|| a.pair_key().cmp(&b.pair_key()))
    });
}

// ---------- Time of closest approach ----------

const TCA_TOLERANCE_S: f64 = 0.1;

/// Golden-section search for the time of closest approach within
/// ±`window_s` of the event's current TCA. `pair_at` returns both objects'
/// states at a given instant (`None` if either cannot be propagated). The
/// distance is assumed unimodal within the window; if the search ends on a
/// worse point than the original, the original is kept.
pub fn refine_tca<F>(event: &ConjunctionEvent, window_s: f64, pair_at: F) -> ConjunctionEvent
where
    F: Fn(DateTime<Utc>) -> Option<(TrackedObjectState, TrackedObjectState)>,
{
    let t0 = event.tca;
    let at = |x: f64| t0 + Duration::microseconds((x * 1.0e6).round() as i64);
    let dist = |x: f64| {
        pair_at(at(x)).map(|(a, b)| distance(a.eci_position_km, b.eci_position_km)).unwrap_or(f64::INFINITY)
    };

    let gr = (5f64.sqrt() + 1.0) / 2.0;
    let (mut a, mut b) = (-window_s, window_s);
    let mut c = b - (b - a) / gr;
    let mut d = a + (b - a) / gr;
    let (mut fc, mut fd) = (dist(c), dist(d));

    while b - a > TCA_TOLERANCE_S {
        if fc < fd {
            b = d;
            d = c;
            fd = fc;
            c = b - (b - a) / gr;
            fc = dist(c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + (b - a) / gr;
            fd = dist(d);
        }
    }

    let tca = at((a + b) / 2.0);
    match pair_at(tca) {
        Some((p, s)) => {
            let mut refined = ConjunctionEvent::between(&p, &s, event.threshold_km);
            if refined.distance_km <= event.distance_km {
                refined.refined = true;
                refined.probability = event.probability.clone();
                refined
            } else {
                event.clone()
            }
        }
        None => event.clone(),
    }
}

// ---------- Collision probability ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PocRisk {
    Green,   // negligible
    Yellow,  // watch
    Red,     // actionable
}

impl PocRisk {
    pub fn from_probability(poc: f64) -> PocRisk {
        if poc > 1e-4 {
            PocRisk::Red
        } else if poc > 1e-6 {
            PocRisk::Yellow
        } else {
            PocRisk::Green
        }
    }
}

/// Monte Carlo parameters. Position uncertainty is a diagonal 1-sigma
/// covariance per object in the inertial axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PocParams {
    pub samples: usize,
    pub combined_radius_km: f64,
    pub primary_sigma_km: [f64; 3],
    pub secondary_sigma_km: [f64; 3],
    pub seed: u64,
}

impl Default for PocParams {
    fn default() -> Self {
        PocParams::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for PocParams {
    fn from(config: &EngineConfig) -> Self {
        let sigma = config.position_sigma_km;
        PocParams {
            samples: config.monte_carlo_samples,
            combined_radius_km: config.combined_radius_km,
            primary_sigma_km: [sigma; 3],
            secondary_sigma_km: [sigma; 3],
            seed: config.monte_carlo_seed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PocResult {
    pub probability: f64,
    pub hits: usize,
    pub samples: usize,
    pub nominal_miss_km: f64,
    pub relative_speed_km_s: f64,
    pub combined_radius_km: f64,
    pub risk: PocRisk,
}

/// Fraction of perturbed trials in which the two objects come within the
/// combined hard-body radius. Meant to be run on demand for flagged pairs,
/// not across the whole catalog.
pub fn estimate_collision_probability(event: &ConjunctionEvent, params: &PocParams) -> Result<PocResult> {
    if params.samples == 0 {
        return Err(invalid_param!("Monte Carlo sample count must be > 0"));
    }
    if !(params.combined_radius_km > 0.0) || !params.combined_radius_km.is_finite() {
        return Err(invalid_param!("combined radius must be positive, got {}", params.combined_radius_km));
    }

    let axes = |sigma: [f64; 3]| -> Result<[Normal<f64>; 3]> {
        let n = |s: f64| Normal::new(0.0, s).map_err(|e| invalid_param!("position sigma {s}: {e}"));
        Ok([n(sigma[0])?, n(sigma[1])?, n(sigma[2])?])
    };
    let d1 = axes(params.primary_sigma_km)?;
    let d2 = axes(params.secondary_sigma_km)?;

    let r1 = event.primary.eci_position_km;
    let r2 = event.secondary.eci_position_km;
    let mut rng = StdRng::seed_from_u64(params.seed);

    let mut hits = 0usize;
    for _ in 0..params.samples {
        let mut sep = [0.0; 3];
        for k in 0..3 {
            sep[k] = (r1[k] + d1[k].sample(&mut rng)) - (r2[k] + d2[k].sample(&mut rng));
        }
        if norm(sep) < params.combined_radius_km {
            hits += 1;
        }
    }

    let probability = hits as f64 / params.samples as f64;
    debug!("[poc] {}-{}: {hits}/{} hits", event.primary.catalog_number, event.secondary.catalog_number, params.samples);

    Ok(PocResult {
        probability,
        hits,
        samples: params.samples,
        nominal_miss_km: distance(r1, r2),
        relative_speed_km_s: event.relative_speed_km_s(),
        combined_radius_km: params.combined_radius_km,
        risk: PocRisk::from_probability(probability),
    })
}
