use std::f64::consts::PI;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::elements::OrbitalElementSet;
use crate::{EARTH_RADIUS_KM, MU_EARTH_KM3_S2, SECONDS_PER_DAY};

pub const LEO_PERIGEE_LIMIT_KM: f64 = 2_000.0;
pub const MEO_PERIGEE_LIMIT_KM: f64 = 35_000.0;
pub const HEO_MIN_ECCENTRICITY: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrbitClass {
    LEO,
    MEO,
    GEO,
    HEO,
}

impl OrbitClass {
    /// Total over (perigee, eccentricity). The HEO test has to come before
    /// the general LEO threshold.
    pub fn classify(perigee_alt_km: f64, eccentricity: f64) -> OrbitClass {
        if perigee_alt_km < LEO_PERIGEE_LIMIT_KM && eccentricity > HEO_MIN_ECCENTRICITY {
            OrbitClass::HEO
        } else if perigee_alt_km < LEO_PERIGEE_LIMIT_KM {
            OrbitClass::LEO
        } else if perigee_alt_km < MEO_PERIGEE_LIMIT_KM {
            OrbitClass::MEO
        } else {
            OrbitClass::GEO
        }
    }
}

/// Keplerian quantities derived from an element set. Recomputed on demand.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivedOrbit {
    pub semi_major_axis_km: f64,
    pub period_min: f64,
    pub apogee_alt_km: f64,
    pub perigee_alt_km: f64,
    pub circular_speed_km_s: f64,
    pub orbit_class: OrbitClass,
}

pub fn derive_orbit(set: &OrbitalElementSet) -> DerivedOrbit {
    let period_s = set.period_minutes() * 60.0;

    // Kepler's third law: a³ = μ (T/2π)²
    let a = (MU_EARTH_KM3_S2 * (period_s / (2.0 * PI)).powi(2)).cbrt();

    // altitudes are clamped at the reference surface; a sub-surface perigee only
    // shows up for objects that have already decayed
    let apogee_alt_km = (a * (1.0 + set.eccentricity) - EARTH_RADIUS_KM).max(0.0);
    let perigee_alt_km = (a * (1.0 - set.eccentricity) - EARTH_RADIUS_KM).max(0.0);

    DerivedOrbit {
        semi_major_axis_km: a,
        period_min: period_s / 60.0,
        apogee_alt_km,
        perigee_alt_km,
        circular_speed_km_s: (MU_EARTH_KM3_S2 / a).sqrt(),
        orbit_class: OrbitClass::classify(perigee_alt_km, set.eccentricity),
    }
}

// ---------- Orbital lifetime ----------

const DECAY_ALT_KM: f64 = 120.0;  // perigee at which reentry is considered uncontrolled

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ReentryRisk {
    None,
    Negligible,
    Low,
    Moderate,
    High,
    Imminent,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LifetimeEstimate {
    pub risk: ReentryRisk,
    pub days: Option<f64>,
    pub perigee_alt_km: f64,
    pub decay_rate_km_day: Option<f64>,
}

impl LifetimeEstimate {
    pub fn reentry_date(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let days = self.days?;
        let secs = days * SECONDS_PER_DAY;
        if !secs.is_finite() || secs > i64::MAX as f64 / 1000.0 { return None; }
        Some(from + Duration::milliseconds((secs * 1000.0) as i64))
    }
}

/// Rough decay estimate from B* and perigee height using a stepped scale
/// height atmosphere. This is not an atmospheric model; it only ranks objects.
pub fn estimate_lifetime(set: &OrbitalElementSet) -> LifetimeEstimate {
    let orbit = derive_orbit(set);
    let perigee = orbit.perigee_alt_km;
    let bstar = set.drag_term.abs();

    if perigee >= 600.0 {
        let days = if perigee < 800.0 { Some((perigee - DECAY_ALT_KM) * 365.0 / 100.0) } else { None };
        return LifetimeEstimate { risk: ReentryRisk::Negligible, days, perigee_alt_km: perigee, decay_rate_km_day: None };
    }
    if bstar <= 1e-10 {
        return LifetimeEstimate { risk: ReentryRisk::None, days: None, perigee_alt_km: perigee, decay_rate_km_day: None };
    }

    let scale_height = if perigee < 200.0 { 30.0 } else if perigee < 400.0 { 50.0 } else { 60.0 };
    let rho_factor = (-(perigee - DECAY_ALT_KM) / scale_height).exp();
    let decay_rate = bstar * 1e5 * rho_factor * orbit.semi_major_axis_km;

    if decay_rate <= 0.001 {
        return LifetimeEstimate { risk: ReentryRisk::Negligible, days: None, perigee_alt_km: perigee, decay_rate_km_day: Some(decay_rate) };
    }

    let days = (perigee - DECAY_ALT_KM).max(0.0) / decay_rate;
    let risk = if days < 7.0 {
        ReentryRisk::Imminent
    } else if days < 30.0 {
        ReentryRisk::High
    } else if days < 180.0 {
        ReentryRisk::Moderate
    } else if days < 365.0 * 5.0 {
        ReentryRisk::Low
    } else {
        ReentryRisk::Negligible
    };

    LifetimeEstimate { risk, days: Some(days), perigee_alt_km: perigee, decay_rate_km_day: Some(decay_rate) }
}
