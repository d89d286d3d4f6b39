use chrono::{Datelike, Duration, Timelike, Utc, TimeZone};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use perigeecore::catalog::{ingest, parse_catalog_text};
use perigeecore::elements::{checksum, epoch_year, parse_implied_decimal};
use perigeecore::orbit::{estimate_lifetime, ReentryRisk};
use perigeecore::{derive_orbit, parse, CatalogEntry, Classification, Constellation, EngineError, ObjectKind, OrbitClass};

const ISS_1: &str = "1 25544U 98067A   25278.49802050  .00011384  00000+0  20935-3 0  9990";
const ISS_2: &str = "2 25544  51.6327 120.3420 0000884 206.2421 153.8523 15.49697304532279";
const GEO_1: &str = "1 28884U 05041A   24001.50000000 -.00000100  00000+0  00000+0 0  9992";
const GEO_2: &str = "2 28884   0.0500 100.0000 0002000  90.0000 270.0000  1.00270000 67898";
const MOLNIYA_1: &str = "1 40296U 14069A   24001.50000000  .00000150  00000+0  10000-3 0  9992";
const MOLNIYA_2: &str = "2 40296  63.4000 250.0000 7000000 270.0000  20.0000  2.00600000 67899";

/// Replace columns `[start, start + field.len())` and fix up the checksum.
fn patch(line: &str, start: usize, field: &str) -> String {
    let mut s = String::with_capacity(69);
    s.push_str(&line[..start]);
    s.push_str(field);
    s.push_str(&line[start + field.len()..68]);
    let c = checksum(&s);
    s.push(char::from(b'0' + c));
    s
}

#[test]
fn parses_iss_by_column() {
    let set = parse(ISS_1, ISS_2).expect("ISS element set should parse");

    assert_eq!(set.catalog_number, 25544);
    assert_eq!(set.classification, Classification::Unclassified);
    assert_eq!(set.international_designator, "98067A");
    assert_eq!((set.epoch.year(), set.epoch.month(), set.epoch.day()), (2025, 10, 5));
    assert_eq!((set.epoch.hour(), set.epoch.minute()), (11, 57));
    assert!((set.mean_motion_dot - 0.00011384).abs() < 1e-15);
    assert!((set.drag_term - 2.0935e-4).abs() < 1e-15);
    assert_eq!(set.ephemeris_type, 0);
    assert_eq!(set.element_set_number, 999);

    assert!((set.inclination_deg - 51.6327).abs() < 1e-12);
    assert!((set.raan_deg - 120.3420).abs() < 1e-12);
    assert!((set.eccentricity - 0.0000884).abs() < 1e-15);
    assert!((set.arg_perigee_deg - 206.2421).abs() < 1e-12);
    assert!((set.mean_anomaly_deg - 153.8523).abs() < 1e-12);
    assert!((set.mean_motion_rev_day - 15.49697304).abs() < 1e-12);
    assert_eq!(set.revolution_number, 53227);
}

#[test]
fn eccentricity_has_implied_leading_decimal() {
    let line2 = patch(ISS_2, 26, "1234567");
    let set = parse(ISS_1, &line2).expect("patched line should parse");
    assert_eq!(set.eccentricity, 0.1234567);
}

#[test]
fn epoch_year_rolls_over_at_57() {
    assert_eq!(epoch_year(98), 1998);
    assert_eq!(epoch_year(24), 2024);
    assert_eq!(epoch_year(57), 1957);
    assert_eq!(epoch_year(56), 2056);
    assert_eq!(epoch_year(0), 2000);
}

#[test]
fn implied_decimal_fields() {
    assert!((parse_implied_decimal(" 20935-3", "drag").unwrap() - 2.0935e-4).abs() < 1e-18);
    assert!((parse_implied_decimal("-11606-4", "drag").unwrap() + 1.1606e-5).abs() < 1e-18);
    assert_eq!(parse_implied_decimal(" 00000+0", "drag").unwrap(), 0.0);
    assert_eq!(parse_implied_decimal("        ", "drag").unwrap(), 0.0);
    assert!(parse_implied_decimal(" 2x935-3", "drag").is_err());
}

#[test]
fn alpha5_catalog_numbers() {
    let line1 = patch(ISS_1, 2, "A0001");
    let line2 = patch(ISS_2, 2, "A0001");
    let set = parse(&line1, &line2).expect("Alpha-5 lines should parse");
    assert_eq!(set.catalog_number, 100_001);
}

#[test]
fn rejects_malformed_lines() {
    let bad_checksum = format!("{}1", &ISS_1[..68]);
    assert!(matches!(parse(&bad_checksum, ISS_2), Err(EngineError::MalformedElementSet(_))));

    assert!(matches!(parse(&ISS_1[..60], ISS_2), Err(EngineError::MalformedElementSet(_))));
    assert!(matches!(parse(ISS_2, ISS_1), Err(EngineError::MalformedElementSet(_))));

    let other_object = patch(ISS_2, 2, "25545");
    assert!(matches!(parse(ISS_1, &other_object), Err(EngineError::MalformedElementSet(_))));

    let garbage_inclination = patch(ISS_2, 8, " 51.6X27");
    assert!(matches!(parse(ISS_1, &garbage_inclination), Err(EngineError::MalformedElementSet(_))));

    let zero_mean_motion = patch(ISS_2, 52, " 0.00000000");
    assert!(matches!(parse(ISS_1, &zero_mean_motion), Err(EngineError::MalformedElementSet(_))));
}

#[test]
fn accepts_trailing_line_endings() {
    let line1 = format!("{ISS_1}\r\n");
    assert!(parse(&line1, ISS_2).is_ok());
}

#[test]
fn derived_orbit_for_reference_objects() {
    let iss = derive_orbit(&parse(ISS_1, ISS_2).unwrap());
    assert!((iss.period_min - 92.92).abs() < 0.01, "period {}", iss.period_min);
    assert!((iss.semi_major_axis_km - 6795.75).abs() < 1.0, "a {}", iss.semi_major_axis_km);
    assert!((iss.circular_speed_km_s - 7.659).abs() < 0.005);
    assert!((iss.perigee_alt_km - 417.0).abs() < 2.0);
    assert_eq!(iss.orbit_class, OrbitClass::LEO);

    let geo = derive_orbit(&parse(GEO_1, GEO_2).unwrap());
    assert!((geo.semi_major_axis_km - 42165.0).abs() < 5.0);
    assert_eq!(geo.orbit_class, OrbitClass::GEO);

    let molniya = derive_orbit(&parse(MOLNIYA_1, MOLNIYA_2).unwrap());
    assert!(molniya.perigee_alt_km < 2000.0);
    assert!(molniya.apogee_alt_km > 38_000.0);
    assert_eq!(molniya.orbit_class, OrbitClass::HEO);

    for o in [iss, geo, molniya] {
        assert!(o.apogee_alt_km >= o.perigee_alt_km);
        assert!(o.perigee_alt_km >= 0.0);
        assert!(o.period_min > 0.0);
    }
}

#[test]
fn orbit_class_boundaries() {
    assert_eq!(OrbitClass::classify(500.0, 0.7), OrbitClass::HEO);
    assert_eq!(OrbitClass::classify(500.0, 0.25), OrbitClass::LEO);
    assert_eq!(OrbitClass::classify(1999.9, 0.1), OrbitClass::LEO);
    assert_eq!(OrbitClass::classify(2000.0, 0.7), OrbitClass::MEO);
    assert_eq!(OrbitClass::classify(20_200.0, 0.0), OrbitClass::MEO);
    assert_eq!(OrbitClass::classify(35_000.0, 0.0), OrbitClass::GEO);
}

#[test]
fn lifetime_estimates() {
    let geo = estimate_lifetime(&parse(GEO_1, GEO_2).unwrap());
    assert_eq!(geo.risk, ReentryRisk::Negligible);
    assert_eq!(geo.days, None);
    assert_eq!(geo.reentry_date(Utc::now()), None);

    let mut no_drag = parse(ISS_1, ISS_2).unwrap();
    no_drag.drag_term = 0.0;
    assert_eq!(estimate_lifetime(&no_drag).risk, ReentryRisk::None);

    let iss = estimate_lifetime(&parse(ISS_1, ISS_2).unwrap());
    let days = iss.days.expect("a draggy low orbit gets a lifetime");
    assert!(days > 0.0);
    let from = Utc.with_ymd_and_hms(2025, 10, 5, 0, 0, 0).unwrap();
    assert!(iss.reentry_date(from).unwrap() > from);
}

#[test]
fn supersedes_only_newer_epochs_of_same_object() {
    let old = parse(ISS_1, ISS_2).unwrap();
    let mut newer = old.clone();
    newer.epoch = old.epoch + Duration::hours(6);

    assert!(newer.supersedes(&old));
    assert!(!old.supersedes(&newer));
    assert!(!old.supersedes(&old));

    let geo = parse(GEO_1, GEO_2).unwrap();
    assert!(!newer.supersedes(&geo));
}

// ---------- Catalog ----------

#[test]
fn object_kind_classification() {
    assert_eq!(ObjectKind::classify(Some("COSMOS 2251 DEB"), None), ObjectKind::Debris);
    assert_eq!(ObjectKind::classify(Some("CZ-4C R/B"), None), ObjectKind::RocketBody);
    assert_eq!(ObjectKind::classify(Some("ISS (ZARYA)"), None), ObjectKind::Payload);
    assert_eq!(ObjectKind::classify(None, None), ObjectKind::Unknown);
    assert_eq!(ObjectKind::classify(Some("FOO DEB"), Some("PAYLOAD")), ObjectKind::Payload);
    assert_eq!(ObjectKind::classify(Some("X"), Some("rocket body")), ObjectKind::RocketBody);

    assert_eq!(Constellation::classify("STARLINK-1007"), Constellation::Starlink);
    assert_eq!(Constellation::classify("ONEWEB-0012"), Constellation::OneWeb);
    assert_eq!(Constellation::classify("IRIDIUM 106"), Constellation::Iridium);
    assert_eq!(Constellation::classify("ISS (ZARYA)"), Constellation::Other);
}

#[test]
fn ingest_reports_failures_per_object() {
    let bad = format!("{}1", &ISS_1[..68]);
    let report = ingest([
        (25544, ISS_1, ISS_2),
        (28884, GEO_1, GEO_2),
        (99999, MOLNIYA_1, MOLNIYA_2),   // declared number disagrees with the lines
        (25544, bad.as_str(), ISS_2),
    ]);

    let accepted: Vec<u32> = report.entries.iter().map(CatalogEntry::catalog_number).collect();
    assert_eq!(accepted, vec![25544, 28884]);
    assert_eq!(report.failures.len(), 2);
    assert!(report.failures.iter().all(|f| matches!(f.error, EngineError::MalformedElementSet(_))));
}

#[test]
fn catalog_text_keeps_newest_epoch() {
    let older_1 = patch(ISS_1, 20, "277.49802050");
    let text = format!(
        "ISS (ZARYA)\n{older_1}\n{ISS_2}\n0 ISS (ZARYA)\n{ISS_1}\n{ISS_2}\n{GEO_1}\n{GEO_2}\nBROKEN DEB\n{}\n{ISS_2}\n",
        &ISS_1[..68].to_string().replace("25544", "25545"),
    );

    let report = parse_catalog_text(&text);
    assert_eq!(report.entries.len(), 2);
    assert_eq!(report.failures.len(), 1);

    let iss = report.entries.iter().find(|e| e.catalog_number() == 25544).unwrap();
    assert_eq!(iss.name.as_deref(), Some("ISS (ZARYA)"));
    assert_eq!(iss.kind, ObjectKind::Payload);
    assert_eq!(iss.set.epoch.day(), 5);

    let geo = report.entries.iter().find(|e| e.catalog_number() == 28884).unwrap();
    assert_eq!(geo.name, None);
    assert_eq!(geo.kind, ObjectKind::Unknown);
}

#[test]
fn derived_orbit_holds_over_random_elements() {
    let base = parse(ISS_1, ISS_2).unwrap();
    let mut rng = StdRng::seed_from_u64(11);

    for _ in 0..2000 {
        let mut set = base.clone();
        set.eccentricity = rng.gen_range(0.0..1.0);
        set.mean_motion_rev_day = rng.gen_range(0.05..17.0);

        let o = derive_orbit(&set);
        assert!(o.apogee_alt_km >= o.perigee_alt_km, "{set:?} -> {o:?}");
        assert!(o.perigee_alt_km >= 0.0, "{set:?} -> {o:?}");
        assert!(o.period_min > 0.0);
        assert!((o.period_min - set.period_minutes()).abs() < 1e-9);
    }
}

#[test]
fn declared_type_reclassifies_entry() {
    let report = parse_catalog_text(&format!("STARLINK-1007\n{ISS_1}\n{ISS_2}\n"));
    let entry = report.entries[0].clone();
    assert_eq!(entry.kind, ObjectKind::Payload);
    assert_eq!(entry.constellation(), Constellation::Starlink);

    let body = entry.clone().with_declared_type("ROCKET BODY");
    assert_eq!(body.kind, ObjectKind::RocketBody);
    assert_eq!(body.constellation(), Constellation::Starlink);

    // unrecognised declarations keep the name heuristic
    assert_eq!(entry.clone().with_declared_type("TBD-CLASS").kind, ObjectKind::Payload);
    assert_eq!(entry.with_kind(ObjectKind::Debris).kind, ObjectKind::Debris);

    let unnamed = CatalogEntry::from(parse(ISS_1, ISS_2).unwrap());
    assert_eq!(unnamed.constellation(), Constellation::Other);
    assert!((unnamed.set.period_minutes() - 92.92).abs() < 0.01);
}
