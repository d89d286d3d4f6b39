use std::ffi::{CStr, CString, c_char};
use serde::Serialize;
use chrono::{DateTime, Duration, Utc};
use log::{info, debug, error};

use crate::catalog::CatalogEntry;
use crate::elements::{parse, OrbitalElementSet};
use crate::orbit::{derive_orbit, estimate_lifetime, DerivedOrbit, LifetimeEstimate};
use crate::propagator::{propagate_state, AltitudeBounds, PropagationModel, Sgp4Model};
use crate::visibility::{predict_passes, AccessWindow, GroundStation};
use crate::config::EngineConfig;
use crate::init_logger;

// ---------- Output model ----------
#[derive(Serialize)]
struct Pass {
    aos_epoch: i64,            // UTC seconds since epoch
    los_epoch: i64,
    max_elevation_epoch: i64,
    duration_s: f64,
    max_elevation_deg: f64,
    aos_azimuth_deg: f64,
    los_azimuth_deg: f64,
    truncated: bool,
}

#[derive(Serialize)]
struct OrbitSummary {
    catalog_number: u32,
    international_designator: String,
    epoch_unix: i64,
    inclination_deg: f64,
    eccentricity: f64,
    mean_motion_rev_day: f64,
    orbit: DerivedOrbit,
    lifetime: LifetimeEstimate,
}

// ---------- C ABI ----------
#[no_mangle]
pub extern "C" fn free_json(ptr: *mut c_char) {
    if ptr.is_null() { return; }
    unsafe { let _ = CString::from_raw(ptr); }
}

fn to_c_json(json: String) -> *mut c_char {
    CString::new(json).unwrap_or_default().into_raw()
}

fn read_c_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() { return None; }
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}

fn parse_c_tle(tag: &str, tle1: *const c_char, tle2: *const c_char) -> Option<OrbitalElementSet> {
    let (Some(line1), Some(line2)) = (read_c_str(tle1), read_c_str(tle2)) else {
        error!("[{tag}] null TLE line");
        return None;
    };
    debug!("[{tag}] tle1: {line1}");
    debug!("[{tag}] tle2: {line2}");

    match parse(&line1, &line2) {
        Ok(set) => Some(set),
        Err(e) => {
            error!("[{tag}] Failed to parse TLE: {e}");
            None
        }
    }
}

/// JSON array of passes of one object over a ground station between two
/// UNIX times. `step_s <= 0` selects the default 30 s sampling step and a NaN
/// mask the default 10°. Passes shorter than the step can be missed.
#[no_mangle]
pub extern "C" fn predict_passes_v1(
    tle1: *const c_char,
    tle2: *const c_char,
    lat: f64, lon: f64, alt_m: f64,
    min_elevation_deg: f64,
    start_epoch: i64, end_epoch: i64,
    step_s: i64,
) -> *mut c_char {
    init_logger();
    info!("[predict_passes_v1] Starting prediction");
    debug!("[predict_passes_v1] lat: {lat}, lon: {lon}, alt_m: {alt_m}, mask: {min_elevation_deg}");

    let Some(set) = parse_c_tle("predict_passes_v1", tle1, tle2) else {
        return to_c_json("[]".to_string());
    };
    let context = match Sgp4Model.prepare(&set) {
        Ok(c) => c,
        Err(e) => {
            error!("[predict_passes_v1] {e}");
            return to_c_json("[]".to_string());
        }
    };

    let (Some(start), Some(end)) = (DateTime::<Utc>::from_timestamp(start_epoch, 0), DateTime::<Utc>::from_timestamp(end_epoch, 0)) else {
        error!("[predict_passes_v1] time window out of range: {start_epoch}..{end_epoch}");
        return to_c_json("[]".to_string());
    };
    info!("[predict_passes_v1] Time window: {start} to {end}");

    let defaults = EngineConfig::default();
    let mask = if min_elevation_deg.is_finite() { min_elevation_deg } else { defaults.elevation_mask_deg };
    let station = GroundStation::new("observer", lat, lon, alt_m / 1000.0, mask);
    // oversized steps are clamped to the window by predict_passes
    let step = if step_s > 0 { Duration::try_seconds(step_s).unwrap_or(Duration::MAX) } else { defaults.pass_step() };
    let entry = CatalogEntry::from(set);
    let bounds = AltitudeBounds::default();

    let position_at = |t: DateTime<Utc>| {
        propagate_state(&Sgp4Model, &context, &entry, t, &bounds).map(|s| s.geodetic)
    };
    let passes: Vec<Pass> = predict_passes(entry.catalog_number(), position_at, &station, &AccessWindow::new(start, end), step)
        .into_iter()
        .map(|p| Pass {
            aos_epoch: p.aos.timestamp(),
            los_epoch: p.los.timestamp(),
            max_elevation_epoch: p.max_elevation_time.timestamp(),
            duration_s: p.duration_s,
            max_elevation_deg: p.max_elevation_deg,
            aos_azimuth_deg: p.aos_azimuth_deg,
            los_azimuth_deg: p.los_azimuth_deg,
            truncated: p.truncated,
        })
        .collect();

    info!("[predict_passes_v1] Found {} passes", passes.len());
    to_c_json(serde_json::to_string(&passes).unwrap_or_else(|_| "[]".to_string()))
}

/// JSON object describing an element set and the orbit derived from it.
#[no_mangle]
pub extern "C" fn describe_orbit_v1(tle1: *const c_char, tle2: *const c_char) -> *mut c_char {
    init_logger();

    let Some(set) = parse_c_tle("describe_orbit_v1", tle1, tle2) else {
        return to_c_json("{}".to_string());
    };

    let summary = OrbitSummary {
        catalog_number: set.catalog_number,
        international_designator: set.international_designator.clone(),
        epoch_unix: set.epoch.timestamp(),
        inclination_deg: set.inclination_deg,
        eccentricity: set.eccentricity,
        mean_motion_rev_day: set.mean_motion_rev_day,
        orbit: derive_orbit(&set),
        lifetime: estimate_lifetime(&set),
    };
    to_c_json(serde_json::to_string(&summary).unwrap_or_else(|_| "{}".to_string()))
}
