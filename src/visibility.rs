//! Ground-station access (AOS/LOS) intervals.
//!
//! Access is computed from sampled trajectories, so resolution is bounded by
//! the sampling step: a pass shorter than the step can fall entirely between
//! two samples and is then not reported.

use std::collections::HashMap;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use log::debug;

use crate::config::EngineConfig;
use crate::frames::{look_angles, Geodetic, LookAngles};
use crate::propagator::TrackedObjectState;

const REFINE_ITERATIONS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundStation {
    pub id: String,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_km: f64,
    pub min_elevation_deg: f64,
}

impl GroundStation {
    pub fn new(id: &str, latitude_deg: f64, longitude_deg: f64, altitude_km: f64, min_elevation_deg: f64) -> Self {
        GroundStation { id: id.to_string(), latitude_deg, longitude_deg, altitude_km, min_elevation_deg }
    }

    pub fn geodetic(&self) -> Geodetic {
        Geodetic::new(self.latitude_deg, self.longitude_deg, self.altitude_km)
    }

    pub fn look_angles(&self, target: &Geodetic) -> LookAngles {
        look_angles(&self.geodetic(), target)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySample {
    pub timestamp: DateTime<Utc>,
    pub geodetic: Geodetic,
}

/// Closed time window [start, end].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl AccessWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        AccessWindow { start, end }
    }

    /// Window of `hours` from `start`, saturating at the last representable instant.
    pub fn from_hours(start: DateTime<Utc>, hours: f64) -> Self {
        let end = Duration::try_milliseconds((hours * 3_600_000.0) as i64)
            .and_then(|d| start.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        AccessWindow { start, end }
    }

    pub fn from_config(start: DateTime<Utc>, config: &EngineConfig) -> Self {
        Self::from_hours(start, config.pass_window_hours)
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t <= self.end
    }
}

/// One pass of an object over a station. `truncated` is set when the pass
/// was already in progress at the first sample or still in progress at the
/// last one; the missing end is then clipped to that sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessInterval {
    pub catalog_number: u32,
    pub station_id: String,
    pub aos: DateTime<Utc>,
    pub los: DateTime<Utc>,
    pub duration_s: f64,
    pub max_elevation_deg: f64,
    pub max_elevation_time: DateTime<Utc>,
    pub aos_azimuth_deg: f64,
    pub los_azimuth_deg: f64,
    pub truncated: bool,
}

// ---------- Pass scanning ----------

struct PassScan {
    interval: AccessInterval,
    aos_bracket: Option<(DateTime<Utc>, DateTime<Utc>)>,  // (below, above)
    los_bracket: Option<(DateTime<Utc>, DateTime<Utc>)>,  // (below, above)
}

/// Crossing time by linear interpolation of elevation between two samples
/// on opposite sides of the mask.
fn interpolate_crossing(t1: DateTime<Utc>, e1: f64, t2: DateTime<Utc>, e2: f64, mask: f64) -> DateTime<Utc> {
    let frac = ((mask - e1) / (e2 - e1)).clamp(0.0, 1.0);
    let span_us = (t2 - t1).num_microseconds().unwrap_or(0) as f64;
    t1 + Duration::microseconds((frac * span_us).round() as i64)
}

fn scan_passes(
    catalog_number: u32,
    trajectory: &[TrajectorySample],
    station: &GroundStation,
    window: &AccessWindow,
) -> Vec<PassScan> {
    let mut samples: Vec<(DateTime<Utc>, LookAngles)> = trajectory.iter()
        .filter(|s| window.contains(s.timestamp) && s.geodetic.is_finite())
        .map(|s| (s.timestamp, station.look_angles(&s.geodetic)))
        .collect();
    samples.sort_by_key(|(t, _)| *t);

    let mask = station.min_elevation_deg;
    let mut passes = Vec::new();
    let mut open: Option<PassScan> = None;
    let mut prev: Option<(DateTime<Utc>, LookAngles)> = None;

    for &(t, la) in &samples {
        let above = la.elevation_deg >= mask;

        match open.as_mut() {
            None if above => {
                let (aos, aos_bracket) = match prev {
                    Some((pt, pla)) => (interpolate_crossing(pt, pla.elevation_deg, t, la.elevation_deg, mask), Some((pt, t))),
                    None => (t, None),
                };
                open = Some(PassScan {
                    interval: AccessInterval {
                        catalog_number,
                        station_id: station.id.clone(),
                        aos,
                        los: t,
                        duration_s: 0.0,
                        max_elevation_deg: la.elevation_deg,
                        max_elevation_time: t,
                        aos_azimuth_deg: la.azimuth_deg,
                        los_azimuth_deg: la.azimuth_deg,
                        truncated: prev.is_none(),
                    },
                    aos_bracket,
                    los_bracket: None,
                });
            }
            None => {}
            Some(pass) if above => {
                let iv = &mut pass.interval;
                if la.elevation_deg > iv.max_elevation_deg {
                    iv.max_elevation_deg = la.elevation_deg;
                    iv.max_elevation_time = t;
                }
                iv.los = t;
                iv.los_azimuth_deg = la.azimuth_deg;
            }
            Some(pass) => {
                if let Some((pt, pla)) = prev {
                    pass.interval.los = interpolate_crossing(pt, pla.elevation_deg, t, la.elevation_deg, mask);
                    pass.los_bracket = Some((t, pt));
                }
                passes.extend(open.take());
            }
        }
        prev = Some((t, la));
    }

    if let Some(mut pass) = open.take() {
        pass.interval.truncated = true;  // los stays at the last sample
        passes.push(pass);
    }

    for pass in &mut passes {
        let iv = &mut pass.interval;
        iv.duration_s = (iv.los - iv.aos).num_milliseconds() as f64 / 1000.0;
    }
    passes
}

/// Access intervals of one object over `station` within `window`, from a
/// sampled trajectory. Intervals are chronological and never overlap.
pub fn compute_access(
    catalog_number: u32,
    trajectory: &[TrajectorySample],
    station: &GroundStation,
    window: &AccessWindow,
) -> Vec<AccessInterval> {
    scan_passes(catalog_number, trajectory, station, window).into_iter().map(|p| p.interval).collect()
}

/// Sample `position_at` every `step` over `window`, then refine each crossing
/// by bisection. Passes shorter than `step` may be missed entirely.
pub fn predict_passes<F>(
    catalog_number: u32,
    position_at: F,
    station: &GroundStation,
    window: &AccessWindow,
    step: Duration,
) -> Vec<AccessInterval>
where
    F: Fn(DateTime<Utc>) -> Option<Geodetic>,
{
    if step <= Duration::zero() || window.end < window.start {
        return Vec::new();
    }
    let step = step.min(window.duration());

    let mut trajectory = Vec::new();
    let mut t = window.start;
    loop {
        if let Some(geodetic) = position_at(t) {
            trajectory.push(TrajectorySample { timestamp: t, geodetic });
        }
        if t >= window.end { break; }
        t = t.checked_add_signed(step).map_or(window.end, |next| next.min(window.end));
    }

    let elevation_at = |t: DateTime<Utc>| position_at(t).map(|g| station.look_angles(&g).elevation_deg);
    let mask = station.min_elevation_deg;

    let passes: Vec<AccessInterval> = scan_passes(catalog_number, &trajectory, station, window).into_iter()
        .map(|pass| {
            let mut iv = pass.interval;
            if let Some((below, above)) = pass.aos_bracket {
                iv.aos = refine_crossing(&elevation_at, mask, below, above);
            }
            if let Some((below, above)) = pass.los_bracket {
                iv.los = refine_crossing(&elevation_at, mask, below, above);
            }
            iv.duration_s = (iv.los - iv.aos).num_milliseconds() as f64 / 1000.0;
            iv
        })
        .collect();

    debug!("[passes] {catalog_number} over {}: {} passes from {} samples", station.id, passes.len(), trajectory.len());
    passes
}

/// Bisection between a sample below the mask and one above it.
fn refine_crossing<F>(elevation_at: &F, mask: f64, mut below: DateTime<Utc>, mut above: DateTime<Utc>) -> DateTime<Utc>
where
    F: Fn(DateTime<Utc>) -> Option<f64>,
{
    for _ in 0..REFINE_ITERATIONS {
        let mid = below + (above - below) / 2;
        match elevation_at(mid) {
            Some(el) if el >= mask => above = mid,
            Some(_) => below = mid,
            None => return mid,
        }
    }
    below + (above - below) / 2
}

// ---------- Current visibility ----------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisibleObject {
    pub catalog_number: u32,
    pub name: String,
    pub look: LookAngles,
}

/// Objects of a snapshot currently above the station mask, highest first.
pub fn visible_now(states: &[TrackedObjectState], station: &GroundStation) -> Vec<VisibleObject> {
    let mut visible: Vec<VisibleObject> = states.iter()
        .filter_map(|s| {
            let look = station.look_angles(&s.geodetic);
            (look.elevation_deg >= station.min_elevation_deg)
                .then(|| VisibleObject { catalog_number: s.catalog_number, name: s.display_name(), look })
        })
        .collect();
    visible.sort_by(|a, b| b.look.elevation_deg.total_cmp(&a.look.elevation_deg));
    visible
}

// ---------- Cache ----------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccessKey {
    pub station_id: String,
    pub catalog_number: u32,
    pub window_s: i64,
}

impl AccessKey {
    pub fn new(station: &GroundStation, catalog_number: u32, window: &AccessWindow) -> Self {
        AccessKey { station_id: station.id.clone(), catalog_number, window_s: window.duration().num_seconds() }
    }
}

/// Computed intervals keyed by station, object and window length, each entry
/// expiring `ttl` after it was stored.
pub struct AccessCache {
    ttl: Duration,
    entries: HashMap<AccessKey, (DateTime<Utc>, Vec<AccessInterval>)>,
}

impl AccessCache {
    pub fn new(ttl: Duration) -> Self {
        AccessCache { ttl, entries: HashMap::new() }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(Duration::seconds(config.access_cache_ttl_s))
    }

    pub fn get(&self, key: &AccessKey, now: DateTime<Utc>) -> Option<&[AccessInterval]> {
        match self.entries.get(key) {
            Some((stored, intervals)) if now - *stored < self.ttl => Some(intervals.as_slice()),
            _ => None,
        }
    }

    pub fn insert(&mut self, key: AccessKey, now: DateTime<Utc>, intervals: Vec<AccessInterval>) {
        self.entries.insert(key, (now, intervals));
    }

    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, (stored, _)| now - *stored < ttl);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
