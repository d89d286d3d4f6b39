use chrono::{DateTime, Duration, TimeZone, Utc};

use perigeecore::anomaly::{analyze_history, AnomalyKind, ElementParameter, HistoryStatus};
use perigeecore::frames::Geodetic;
use perigeecore::scheduler::Snapshot;
use perigeecore::{parse, EngineConfig, ManeuverDetector, ObjectKind, OrbitalElementSet, TrackedObjectState};

const ISS_1: &str = "1 25544U 98067A   25278.49802050  .00011384  00000+0  20935-3 0  9990";
const ISS_2: &str = "2 25544  51.6327 120.3420 0000884 206.2421 153.8523 15.49697304532279";

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 5, 12, 0, 0).unwrap()
}

fn state(catalog_number: u32, velocity_km_s: f64, seconds: i64) -> TrackedObjectState {
    TrackedObjectState {
        catalog_number,
        name: None,
        kind: ObjectKind::Payload,
        timestamp: t0() + Duration::seconds(seconds),
        geodetic: Geodetic::new(10.0, 20.0, 420.0),
        velocity_km_s,
        eci_position_km: [6798.0, 0.0, 0.0],
        eci_velocity_km_s: [0.0, velocity_km_s, 0.0],
    }
}

#[test]
fn first_observation_sets_baseline_only() {
    let mut detector = ManeuverDetector::new(0.05);
    assert!(detector.observe(&state(1, 7.5, 0)).is_none());
    assert_eq!(detector.len(), 1);
}

#[test]
fn delta_v_above_threshold_is_a_maneuver() {
    let mut detector = ManeuverDetector::new(0.05);
    detector.observe(&state(1, 7.500, 0));

    let event = detector.observe(&state(1, 7.560, 1)).expect("0.06 km/s exceeds the threshold");
    assert_eq!(event.catalog_number, 1);
    assert!((event.delta_v_km_s - 0.060).abs() < 1e-9);
    assert_eq!(event.previous_velocity_km_s, 7.500);
    assert_eq!(event.new_velocity_km_s, 7.560);
    assert_eq!(event.timestamp, t0() + Duration::seconds(1));
}

#[test]
fn delta_v_below_threshold_is_ignored() {
    let mut detector = ManeuverDetector::new(0.05);
    detector.observe(&state(1, 7.500, 0));
    assert!(detector.observe(&state(1, 7.530, 1)).is_none());
}

#[test]
fn baseline_is_overwritten_every_observation() {
    let mut detector = ManeuverDetector::default();
    detector.observe(&state(1, 7.500, 0));
    assert!(detector.observe(&state(1, 7.530, 1)).is_none());
    // 7.530 -> 7.560 is another 0.03, not 0.06 from the first baseline
    assert!(detector.observe(&state(1, 7.560, 2)).is_none());

    let event = detector.observe(&state(1, 7.400, 3)).expect("a decrease counts too");
    assert!((event.delta_v_km_s - 0.160).abs() < 1e-9);
}

#[test]
fn objects_are_tracked_independently() {
    let mut detector = ManeuverDetector::from(&EngineConfig::default());
    let first = Snapshot { generation: 1, timestamp: t0(), states: vec![state(1, 7.5, 0), state(2, 3.07, 0)], dropped: 0 };
    let second = Snapshot { generation: 1, timestamp: t0(), states: vec![state(1, 7.5, 1), state(2, 3.20, 1)], dropped: 0 };

    assert!(detector.observe_snapshot(&first).is_empty());
    let events = detector.observe_snapshot(&second);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].catalog_number, 2);

    assert!(detector.forget(2));
    assert!(!detector.forget(2));
    assert!(detector.observe(&state(2, 9.0, 2)).is_none());
}

// ---------- Element history ----------

/// Twice-daily element sets; `tweak(i, set)` edits set `i`.
fn history(n: usize, tweak: impl Fn(usize, &mut OrbitalElementSet)) -> Vec<OrbitalElementSet> {
    let base = parse(ISS_1, ISS_2).unwrap();
    (0..n)
        .map(|i| {
            let mut set = base.clone();
            set.epoch = base.epoch + Duration::hours(12 * i as i64);
            tweak(i, &mut set);
            set
        })
        .collect()
}

#[test]
fn short_history_is_insufficient() {
    let analysis = analyze_history(&history(4, |_, _| {}), 3.0);
    assert_eq!(analysis.status, HistoryStatus::InsufficientData);
    assert!(analysis.anomalies.is_empty());
    assert!(analysis.stats.is_none());
}

#[test]
fn steady_history_is_nominal() {
    let analysis = analyze_history(&history(20, |_, _| {}), 3.0);
    assert_eq!(analysis.status, HistoryStatus::Nominal);
    assert_eq!(analysis.sets_analyzed, 20);
    let stats = analysis.stats.unwrap();
    assert!((stats.mean_motion_mean - 15.49697304).abs() < 1e-9);
    assert!(stats.mean_motion_std < 1e-12);
}

#[test]
fn mean_motion_step_is_classified_by_sign() {
    let raised = history(20, |i, s| if i >= 5 { s.mean_motion_rev_day += 0.01 });
    let analysis = analyze_history(&raised, 3.0);
    assert_eq!(analysis.status, HistoryStatus::AnomaliesDetected);
    assert_eq!(analysis.anomalies.len(), 1);
    let a = &analysis.anomalies[0];
    assert_eq!(a.kind, AnomalyKind::Maneuver);
    assert_eq!(a.parameter, ElementParameter::MeanMotion);
    assert_eq!(a.epoch, raised[5].epoch);
    assert!(a.z_score > 3.0);

    let lowered = history(20, |i, s| if i >= 5 { s.mean_motion_rev_day -= 0.01 });
    let analysis = analyze_history(&lowered, 3.0);
    assert_eq!(analysis.anomalies[0].kind, AnomalyKind::DragIncrease);
}

#[test]
fn anomalies_are_newest_first() {
    let sets = history(20, |i, s| {
        if i >= 5 { s.eccentricity += 0.001; }
        if i >= 14 { s.drag_term *= 4.0; }
    });
    // input order must not matter
    let mut shuffled = sets.clone();
    shuffled.reverse();

    let analysis = analyze_history(&shuffled, 3.0);
    let kinds: Vec<AnomalyKind> = analysis.anomalies.iter().map(|a| a.kind).collect();
    assert_eq!(kinds, vec![AnomalyKind::DragAnomaly, AnomalyKind::OrbitChange]);
    assert_eq!(analysis.anomalies[0].epoch, sets[14].epoch);
    assert_eq!(analysis.anomalies[1].epoch, sets[5].epoch);
}
