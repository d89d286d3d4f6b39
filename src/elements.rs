//! Two-line element set decoding.
//!
//! Fields are extracted strictly by column offset, never by splitting on
//! whitespace. Column numbers in comments are 1-based as in the published
//! format; slices are 0-based.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{malformed, Result};

pub const TLE_LINE_LEN: usize = 69;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Classification {
    Unclassified,
    Classified,
    Secret,
}

/// A decoded element set. Immutable once parsed; a newer set for the same
/// catalog number supersedes it rather than mutating it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrbitalElementSet {
    pub catalog_number: u32,
    pub classification: Classification,
    pub international_designator: String,
    pub epoch: DateTime<Utc>,
    pub mean_motion_dot: f64,        // rev/day², as printed (already halved)
    pub mean_motion_ddot: f64,       // rev/day³, as printed (already divided by 6)
    pub drag_term: f64,              // B*, 1/earth radii
    pub ephemeris_type: u8,
    pub element_set_number: u32,
    pub inclination_deg: f64,
    pub raan_deg: f64,
    pub eccentricity: f64,
    pub arg_perigee_deg: f64,
    pub mean_anomaly_deg: f64,
    pub mean_motion_rev_day: f64,
    pub revolution_number: u32,

    pub line1: String,
    pub line2: String,
}

impl OrbitalElementSet {
    /// true if `self` is a newer set for the same object than `other`
    pub fn supersedes(&self, other: &OrbitalElementSet) -> bool {
        self.catalog_number == other.catalog_number && self.epoch > other.epoch
    }

    pub fn period_minutes(&self) -> f64 {
        1440.0 / self.mean_motion_rev_day
    }
}

/// Decode a line pair. Fails with `MalformedElementSet` if either line has the
/// wrong length, a bad checksum, mismatched line/catalog numbers or a required
/// numeric field that does not parse.
pub fn parse(line1: &str, line2: &str) -> Result<OrbitalElementSet> {
    let l1 = check_line(line1, b'1')?;
    let l2 = check_line(line2, b'2')?;

    let catalog_number = parse_catalog_number(&l1[2..7])?;
    let catalog_number_2 = parse_catalog_number(&l2[2..7])?;
    if catalog_number != catalog_number_2 {
        return Err(malformed!("catalog number mismatch: line 1 has {catalog_number}, line 2 has {catalog_number_2}"));
    }

    let classification = match l1.as_bytes()[7] {
        b'U' | b' ' => Classification::Unclassified,
        b'C' => Classification::Classified,
        b'S' => Classification::Secret,
        c => return Err(malformed!("unknown classification '{}'", c as char)),
    };
    let international_designator = l1[9..17].trim().to_string();

    let yy: u32 = parse_field(&l1[18..20], "epoch year")?;
    let day: f64 = parse_field(&l1[20..32], "epoch day")?;
    let epoch = epoch_from_tle(yy, day)?;

    let mean_motion_dot: f64 = parse_field(&l1[33..43], "mean motion derivative")?;
    let mean_motion_ddot = parse_implied_decimal(&l1[44..52], "mean motion second derivative")?;
    let drag_term = parse_implied_decimal(&l1[53..61], "drag term")?;
    let ephemeris_type = match l1.as_bytes()[62] {
        b' ' => 0,
        c if c.is_ascii_digit() => c - b'0',
        c => return Err(malformed!("invalid ephemeris type '{}'", c as char)),
    };
    let element_set_number = parse_optional_int(&l1[64..68], "element set number")?;

    let inclination_deg: f64 = parse_field(&l2[8..16], "inclination")?;
    let raan_deg: f64 = parse_field(&l2[17..25], "right ascension")?;
    let eccentricity = parse_eccentricity(&l2[26..33])?;
    let arg_perigee_deg: f64 = parse_field(&l2[34..42], "argument of perigee")?;
    let mean_anomaly_deg: f64 = parse_field(&l2[43..51], "mean anomaly")?;
    let mean_motion_rev_day: f64 = parse_field(&l2[52..63], "mean motion")?;
    let revolution_number = parse_optional_int(&l2[63..68], "revolution number")?;

    if !(0.0..=180.0).contains(&inclination_deg) {
        return Err(malformed!("inclination out of range: {inclination_deg}"));
    }
    for (name, v) in [("right ascension", raan_deg), ("argument of perigee", arg_perigee_deg), ("mean anomaly", mean_anomaly_deg)] {
        if !(0.0..=360.0).contains(&v) {
            return Err(malformed!("{name} out of range: {v}"));
        }
    }
    if !(mean_motion_rev_day > 0.0) || !mean_motion_rev_day.is_finite() {
        return Err(malformed!("mean motion must be positive, got {mean_motion_rev_day}"));
    }

    Ok(OrbitalElementSet {
        catalog_number,
        classification,
        international_designator,
        epoch,
        mean_motion_dot,
        mean_motion_ddot,
        drag_term,
        ephemeris_type,
        element_set_number,
        inclination_deg,
        raan_deg,
        eccentricity,
        arg_perigee_deg,
        mean_anomaly_deg,
        mean_motion_rev_day,
        revolution_number,
        line1: l1.to_string(),
        line2: l2.to_string(),
    })
}

// ---------- Epoch ----------

/// Two-digit epoch year rollover: 57..=99 are 1900s, 00..=56 are 2000s.
pub fn epoch_year(yy: u32) -> i32 {
    if yy >= 57 { 1900 + yy as i32 } else { 2000 + yy as i32 }
}

/// Epoch from two-digit year and fractional day-of-year (day 1.0 is Jan 1 00:00 UTC)
pub fn epoch_from_tle(yy: u32, day_of_year: f64) -> Result<DateTime<Utc>> {
    if yy > 99 {
        return Err(malformed!("epoch year {yy} is not two digits"));
    }
    let year = epoch_year(yy);
    let jan1 = NaiveDate::from_ymd_opt(year, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| malformed!("invalid epoch year {year}"))?;

    let days_in_year = if NaiveDate::from_ymd_opt(year, 12, 31).map(|d| d.ordinal()) == Some(366) { 366.0 } else { 365.0 };
    if !(1.0..days_in_year + 1.0).contains(&day_of_year) {
        return Err(malformed!("epoch day {day_of_year} outside year {year}"));
    }

    let micros = ((day_of_year - 1.0) * 86_400_000_000.0).round() as i64;
    Ok((jan1 + Duration::microseconds(micros)).and_utc())
}

// ---------- Field decoding ----------

fn check_line(line: &str, number: u8) -> Result<&str> {
    let line = line.trim_end_matches(&['\r', '\n'][..]);
    if !line.is_ascii() {
        return Err(malformed!("line {} contains non-ASCII characters", number as char));
    }
    if line.len() != TLE_LINE_LEN {
        return Err(malformed!("line {} has length {}, expected {TLE_LINE_LEN}", number as char, line.len()));
    }
    let bytes = line.as_bytes();
    if bytes[0] != number || bytes[1] != b' ' {
        return Err(malformed!("line {} does not start with \"{} \"", number as char, number as char));
    }

    let expected = checksum(line);
    let actual = bytes[68];
    if !actual.is_ascii_digit() || actual - b'0' != expected {
        return Err(malformed!("line {} checksum is '{}', computed {expected}", number as char, actual as char));
    }
    Ok(line)
}

/// Modulo-10 sum over columns 1-68: digits count their value, '-' counts 1.
pub fn checksum(line: &str) -> u8 {
    let sum: u32 = line.bytes().take(68).map(|c| match c {
        b'0'..=b'9' => (c - b'0') as u32,
        b'-' => 1,
        _ => 0,
    }).sum();
    (sum % 10) as u8
}

fn parse_field<T: std::str::FromStr>(s: &str, name: &str) -> Result<T> {
    let t = s.trim();
    if t.is_empty() {
        return Err(malformed!("{name} is blank"));
    }
    t.parse::<T>().map_err(|_| malformed!("{name} is not numeric: '{t}'"))
}

fn parse_optional_int(s: &str, name: &str) -> Result<u32> {
    if s.trim().is_empty() { Ok(0) } else { parse_field(s, name) }
}

/// Catalog numbers are five digits, or Alpha-5 (leading letter A-Z without I/O
/// standing for 10..=33 ten-thousands).
fn parse_catalog_number(s: &str) -> Result<u32> {
    let first = s.as_bytes()[0];
    if first.is_ascii_uppercase() {
        let high = match first {
            b'A'..=b'H' => first - b'A' + 10,
            b'J'..=b'N' => first - b'J' + 18,
            b'P'..=b'Z' => first - b'P' + 23,
            _ => return Err(malformed!("invalid Alpha-5 catalog prefix '{}'", first as char)),
        };
        let low: u32 = parse_field(&s[1..], "catalog number")?;
        return Ok(high as u32 * 10_000 + low);
    }
    parse_field(s, "catalog number")
}

/// Eccentricity is printed without its leading "0." (e.g. "0000884").
fn parse_eccentricity(s: &str) -> Result<f64> {
    let t = s.trim();
    if t.is_empty() || !t.bytes().all(|c| c.is_ascii_digit()) {
        return Err(malformed!("eccentricity is not numeric: '{s}'"));
    }
    format!("0.{t}").parse::<f64>().map_err(|_| malformed!("eccentricity is not numeric: '{s}'"))
}

/// Decode the compact exponent notation used by the drag and second
/// derivative fields: optional sign, mantissa digits with an implied leading
/// decimal point, then a signed power-of-ten exponent ("-11606-4" = -0.11606e-4).
pub fn parse_implied_decimal(s: &str, name: &str) -> Result<f64> {
    let t = s.trim();
    if t.is_empty() {
        return Ok(0.0);
    }

    let (sign, rest) = match t.as_bytes()[0] {
        b'-' => (-1.0, &t[1..]),
        b'+' => (1.0, &t[1..]),
        _ => (1.0, t),
    };

    let (mantissa, exponent) = match rest.rfind(&['-', '+'][..]) {
        Some(pos) if pos > 0 => (&rest[..pos], &rest[pos..]),
        _ => (rest, "0"),
    };
    let mantissa = mantissa.trim();
    if mantissa.is_empty() || !mantissa.bytes().all(|c| c.is_ascii_digit()) {
        return Err(malformed!("{name} mantissa is not numeric: '{s}'"));
    }

    let m: f64 = format!("0.{mantissa}").parse().map_err(|_| malformed!("{name} mantissa is not numeric: '{s}'"))?;
    let e: i32 = exponent.parse().map_err(|_| malformed!("{name} exponent is not numeric: '{s}'"))?;
    Ok(sign * m * 10f64.powi(e))
}
