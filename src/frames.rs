//! Earth frames: sidereal time, TEME → ECEF rotation, geodetic conversions
//! and topocentric look angles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{EARTH_FLATTENING, EARTH_RADIUS_KM};

/// Geodetic position on the reference ellipsoid (degrees, km).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geodetic {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_km: f64,
}

impl Geodetic {
    pub fn new(latitude_deg: f64, longitude_deg: f64, altitude_km: f64) -> Self {
        Geodetic { latitude_deg, longitude_deg, altitude_km }
    }

    pub fn is_finite(&self) -> bool {
        self.latitude_deg.is_finite() && self.longitude_deg.is_finite() && self.altitude_km.is_finite()
    }
}

/// Azimuth (clockwise from north), elevation above the horizon and slant range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LookAngles {
    pub azimuth_deg: f64,
    pub elevation_deg: f64,
    pub range_km: f64,
}

// ---------- Time ----------

pub fn julian_date(t: DateTime<Utc>) -> f64 {
    let secs = t.timestamp() as f64 + t.timestamp_subsec_nanos() as f64 * 1.0e-9;
    secs / 86_400.0 + 2_440_587.5
}

/// Greenwich mean sidereal time in degrees [0,360)
pub fn gmst_deg(t: DateTime<Utc>) -> f64 {
    let d = julian_date(t) - 2_451_545.0;
    let c = d / 36_525.0;
    let gmst = 280.460_618_37 + 360.985_647_366_29*d + 0.000_387_933*c*c - c*c*c/38_710_000.0;
    unwind_deg(gmst)
}

// ---------- Frame rotations ----------

/// TEME (≈ECI) → ECEF, rotation about z by GMST. Polar motion is ignored.
pub fn teme_to_ecef(r: [f64; 3], t: DateTime<Utc>) -> [f64; 3] {
    let theta = gmst_deg(t).to_radians();
    let (ct, st) = (theta.cos(), theta.sin());
    [
         ct * r[0] + st * r[1],
        -st * r[0] + ct * r[1],
         r[2],
    ]
}

/// Closed-form (Bowring) ECEF → geodetic.
pub fn ecef_to_geodetic(r: [f64; 3]) -> Geodetic {
    let a = EARTH_RADIUS_KM;
    let f = EARTH_FLATTENING;
    let b = a * (1.0 - f);
    let e2 = f * (2.0 - f);
    let ep2 = (a*a - b*b) / (b*b);

    let [x, y, z] = r;
    let p = (x*x + y*y).sqrt();
    let lon = y.atan2(x);

    if p < 1.0e-9 {
        // on the polar axis the general form divides by cos(lat) = 0
        let lat = if z >= 0.0 { 90.0 } else { -90.0 };
        return Geodetic::new(lat, lon.to_degrees(), z.abs() - b);
    }

    let theta = (z * a).atan2(p * b);
    let (st, ct) = theta.sin_cos();
    let lat = (z + ep2 * b * st*st*st).atan2(p - e2 * a * ct*ct*ct);

    let sin_lat = lat.sin();
    let n = a / (1.0 - e2 * sin_lat * sin_lat).sqrt();
    let alt = p / lat.cos() - n;

    Geodetic::new(lat.to_degrees(), lon.to_degrees(), alt)
}

pub fn geodetic_to_ecef(g: &Geodetic) -> [f64; 3] {
    let a = EARTH_RADIUS_KM;
    let f = EARTH_FLATTENING;
    let e2 = f * (2.0 - f);

    let lat = g.latitude_deg.to_radians();
    let lon = g.longitude_deg.to_radians();

    let sin_lat = lat.sin();
    let cos_lat = lat.cos();

    let n = a / (1.0 - e2 * sin_lat * sin_lat).sqrt();

    let x = (n + g.altitude_km) * cos_lat * lon.cos();
    let y = (n + g.altitude_km) * cos_lat * lon.sin();
    let z = (n * (1.0 - e2) + g.altitude_km) * sin_lat;

    [x, y, z]
}

/// Look angles from `observer` to `target`, both geodetic. Uses the
/// South-East-Zenith topocentric frame.
pub fn look_angles(observer: &Geodetic, target: &Geodetic) -> LookAngles {
    let o = geodetic_to_ecef(observer);
    let s = geodetic_to_ecef(target);
    let rho = [s[0] - o[0], s[1] - o[1], s[2] - o[2]];

    let lat = observer.latitude_deg.to_radians();
    let lon = observer.longitude_deg.to_radians();
    let (sin_lat, cos_lat) = lat.sin_cos();
    let (sin_lon, cos_lon) = lon.sin_cos();

    let rho_s =  sin_lat * cos_lon * rho[0] + sin_lat * sin_lon * rho[1] - cos_lat * rho[2];
    let rho_e = -sin_lon * rho[0] + cos_lon * rho[1];
    let rho_z =  cos_lat * cos_lon * rho[0] + cos_lat * sin_lon * rho[1] + sin_lat * rho[2];

    let range_km = norm(rho);
    let elevation_deg = if range_km > 0.0 { (rho_z / range_km).clamp(-1.0, 1.0).asin().to_degrees() } else { 90.0 };
    let azimuth_deg = unwind_deg(rho_e.atan2(-rho_s).to_degrees());

    LookAngles { azimuth_deg, elevation_deg, range_km }
}

// ---------- Utility math ----------

pub fn unwind_deg(mut x: f64) -> f64 {
    x %= 360.0;
    if x < 0.0 { x += 360.0; }
    x
}

pub fn norm(v: [f64; 3]) -> f64 {
    (v[0]*v[0] + v[1]*v[1] + v[2]*v[2]).sqrt()
}

pub fn distance(a: [f64; 3], b: [f64; 3]) -> f64 {
    norm([a[0] - b[0], a[1] - b[1], a[2] - b[2]])
}
