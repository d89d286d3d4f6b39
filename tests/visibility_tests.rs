use chrono::{DateTime, Duration, TimeZone, Utc};

use perigeecore::frames::Geodetic;
use perigeecore::visibility::{predict_passes, visible_now, AccessCache, AccessKey, TrajectorySample};
use perigeecore::{compute_access, AccessWindow, EngineConfig, GroundStation, ObjectKind, TrackedObjectState};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 21, 0, 0, 0).unwrap()
}

fn equator_station() -> GroundStation {
    GroundStation::new("EQ-1", 0.0, 0.0, 0.0, 10.0)
}

/// Ground track along the equator at 500 km, one sample per `step_s`.
fn sweep(from_lon: f64, to_lon: f64, deg_per_sample: f64, step_s: i64, offset_s: i64) -> Vec<TrajectorySample> {
    let n = ((to_lon - from_lon) / deg_per_sample).round() as i64;
    (0..=n)
        .map(|i| TrajectorySample {
            timestamp: t0() + Duration::seconds(offset_s + i * step_s),
            geodetic: Geodetic::new(0.0, from_lon + i as f64 * deg_per_sample, 500.0),
        })
        .collect()
}

fn day() -> AccessWindow {
    AccessWindow::from_hours(t0(), 24.0)
}

#[test]
fn below_mask_yields_nothing() {
    let track = sweep(60.0, 120.0, 1.0, 10, 0);
    assert!(compute_access(1, &track, &equator_station(), &day()).is_empty());
}

#[test]
fn single_crossing_yields_one_interval() {
    let station = equator_station();
    let track = sweep(-30.0, 30.0, 1.0, 10, 60);
    let intervals = compute_access(1, &track, &station, &day());
    assert_eq!(intervals.len(), 1);

    let pass = &intervals[0];
    assert!(!pass.truncated);
    assert_eq!(pass.station_id, "EQ-1");
    assert!(pass.aos < pass.max_elevation_time && pass.max_elevation_time < pass.los);
    assert!((pass.max_elevation_deg - 90.0).abs() < 1e-6);
    assert_eq!(pass.max_elevation_time, t0() + Duration::seconds(60 + 300));
    assert!((pass.duration_s - (pass.los - pass.aos).num_milliseconds() as f64 / 1000.0).abs() < 1e-9);

    // max elevation dominates every sample inside the interval
    for s in track.iter().filter(|s| s.timestamp >= pass.aos && s.timestamp <= pass.los) {
        assert!(station.look_angles(&s.geodetic).elevation_deg <= pass.max_elevation_deg);
    }

    // rising in the west, setting in the east
    assert!((pass.aos_azimuth_deg - 270.0).abs() < 1.0);
    assert!((pass.los_azimuth_deg - 90.0).abs() < 1.0);
}

#[test]
fn crossings_are_interpolated_between_samples() {
    let station = equator_station();
    let track = sweep(-30.0, 30.0, 1.0, 10, 0);
    let pass = &compute_access(1, &track, &station, &day())[0];

    // interpolated AOS falls strictly between the last sample below and the first above
    let first_above = track.iter().find(|s| station.look_angles(&s.geodetic).elevation_deg >= 10.0).unwrap();
    assert!(pass.aos <= first_above.timestamp);
    assert!(pass.aos > first_above.timestamp - Duration::seconds(10));
}

#[test]
fn passes_are_ordered_and_disjoint() {
    let mut track = sweep(-30.0, 30.0, 1.0, 10, 3000);
    track.extend(sweep(-30.0, 30.0, 1.0, 10, 0));        // out of order on purpose
    track.extend(sweep(-30.0, 30.0, 1.0, 10, 6000));

    let intervals = compute_access(7, &track, &equator_station(), &day());
    assert_eq!(intervals.len(), 3);
    for w in intervals.windows(2) {
        assert!(w[0].los < w[1].aos);
    }
    assert!(intervals.iter().all(|p| p.catalog_number == 7));
}

#[test]
fn passes_cut_by_window_are_truncated() {
    let station = equator_station();
    let track = sweep(-30.0, 30.0, 1.0, 10, 0);

    // window opens at the zenith sample
    let late = AccessWindow::new(t0() + Duration::seconds(300), t0() + Duration::hours(1));
    let intervals = compute_access(1, &track, &station, &late);
    assert_eq!(intervals.len(), 1);
    assert!(intervals[0].truncated);
    assert_eq!(intervals[0].aos, t0() + Duration::seconds(300));

    // window closes at the zenith sample
    let early = AccessWindow::new(t0(), t0() + Duration::seconds(300));
    let intervals = compute_access(1, &track, &station, &early);
    assert_eq!(intervals.len(), 1);
    assert!(intervals[0].truncated);
    assert_eq!(intervals[0].los, t0() + Duration::seconds(300));
}

#[test]
fn predicted_crossings_sit_on_the_mask() {
    let station = equator_station();
    // 0.1 deg/s along the equator, overhead at t0 + 300 s
    let position_at = |t: DateTime<Utc>| {
        let dt = (t - t0()).num_milliseconds() as f64 / 1000.0;
        Some(Geodetic::new(0.0, -30.0 + 0.1 * dt, 500.0))
    };
    let window = AccessWindow::new(t0(), t0() + Duration::seconds(600));
    let passes = predict_passes(1, position_at, &station, &window, Duration::seconds(30));
    assert_eq!(passes.len(), 1);

    let pass = &passes[0];
    for t in [pass.aos, pass.los] {
        let el = station.look_angles(&position_at(t).unwrap()).elevation_deg;
        assert!((el - 10.0).abs() < 0.1, "elevation {el} at crossing");
    }
    let midpoint = pass.aos + (pass.los - pass.aos) / 2;
    assert!((midpoint - (t0() + Duration::seconds(300))).num_milliseconds().abs() < 100);
}

#[test]
fn passes_shorter_than_step_can_be_missed() {
    let station = equator_station();
    // overhead only between t0 + 100 s and t0 + 105 s
    let position_at = |t: DateTime<Utc>| {
        let dt = (t - t0()).num_seconds();
        let lon = if (100..=105).contains(&dt) { 0.0 } else { 90.0 };
        Some(Geodetic::new(0.0, lon, 500.0))
    };
    let window = AccessWindow::new(t0(), t0() + Duration::seconds(600));

    assert!(predict_passes(1, position_at, &station, &window, Duration::seconds(60)).is_empty());
    assert_eq!(predict_passes(1, position_at, &station, &window, Duration::seconds(1)).len(), 1);
    assert!(predict_passes(1, position_at, &station, &window, Duration::zero()).is_empty());
}

#[test]
fn visible_now_sorts_by_elevation() {
    let station = equator_station();
    let at = |catalog_number: u32, lon: f64| TrackedObjectState {
        catalog_number,
        name: None,
        kind: ObjectKind::Unknown,
        timestamp: t0(),
        geodetic: Geodetic::new(0.0, lon, 500.0),
        velocity_km_s: 7.6,
        eci_position_km: [0.0; 3],
        eci_velocity_km_s: [0.0; 3],
    };
    let states = vec![at(1, 8.0), at(2, 0.5), at(3, 70.0), at(4, -3.0)];

    let visible = visible_now(&states, &station);
    let order: Vec<u32> = visible.iter().map(|v| v.catalog_number).collect();
    assert_eq!(order, vec![2, 4, 1]);
    assert_eq!(visible[0].name, "NORAD 2");
    assert!(visible.windows(2).all(|w| w[0].look.elevation_deg >= w[1].look.elevation_deg));
}

#[test]
fn access_cache_expires_entries() {
    let station = equator_station();
    let window = day();
    let mut cache = AccessCache::from_config(&EngineConfig::default());
    let key = AccessKey::new(&station, 25544, &window);
    assert_eq!(key.window_s, 86_400);

    let intervals = compute_access(25544, &sweep(-30.0, 30.0, 1.0, 10, 0), &station, &window);
    cache.insert(key.clone(), t0(), intervals.clone());

    assert_eq!(cache.get(&key, t0() + Duration::seconds(599)).map(|i| i.to_vec()), Some(intervals));
    assert!(cache.get(&key, t0() + Duration::seconds(600)).is_none());
    assert!(cache.get(&AccessKey { catalog_number: 1, ..key.clone() }, t0()).is_none());

    assert_eq!(cache.purge_expired(t0() + Duration::seconds(601)), 1);
    assert!(cache.is_empty());
}

#[test]
fn predict_passes_survives_huge_steps_and_the_end_of_time() {
    let station = equator_station();
    let overhead = |_t: DateTime<Utc>| Some(Geodetic::new(0.0, 0.0, 500.0));

    // a step longer than the window samples both ends only
    let window = AccessWindow::new(t0(), t0() + Duration::hours(1));
    let passes = predict_passes(1, overhead, &station, &window, Duration::MAX);
    assert_eq!(passes.len(), 1);
    assert!(passes[0].truncated);
    assert_eq!((passes[0].aos, passes[0].los), (window.start, window.end));

    let last = DateTime::<Utc>::MAX_UTC;
    let tail = AccessWindow::new(last - Duration::seconds(100), last);
    let passes = predict_passes(1, overhead, &station, &tail, Duration::seconds(60));
    assert_eq!(passes.len(), 1);
    assert_eq!(passes[0].los, last);

    let open_ended = AccessWindow::from_hours(last - Duration::hours(1), 48.0);
    assert_eq!(open_ended.end, last);
}
