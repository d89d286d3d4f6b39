//! Orbital state and proximity analysis engine.
//!
//! Parses two-line element sets, propagates tracked objects on a caller-driven
//! cadence and derives maneuver, conjunction and ground-station access events
//! from the resulting snapshots.

use std::sync::Once;

pub mod error;
pub mod config;
pub mod frames;
pub mod elements;
pub mod orbit;
pub mod catalog;
pub mod propagator;
pub mod scheduler;
pub mod anomaly;
pub mod conjunction;
pub mod visibility;
pub mod ffi;

pub use error::{EngineError, Result};
pub use config::EngineConfig;
pub use elements::{parse, Classification, OrbitalElementSet};
pub use orbit::{derive_orbit, DerivedOrbit, OrbitClass};
pub use catalog::{CatalogEntry, Constellation, ObjectKind};
pub use propagator::{InertialState, PropagationModel, Sgp4Model, TrackedObjectState};
pub use scheduler::{Scheduler, SchedulerWorker, Snapshot, TrackedSetHandle};
pub use anomaly::{ManeuverDetector, ManeuverEvent};
pub use conjunction::{screen, ConjunctionEvent, PocResult, RiskLevel};
pub use visibility::{compute_access, AccessInterval, AccessWindow, GroundStation};

// ---------- Constants ----------

#[cfg(not(feature = "wgs72"))]
pub const EARTH_RADIUS_KM: f64 = 6378.137;                 // WGS-84 equatorial
#[cfg(not(feature = "wgs72"))]
pub const EARTH_FLATTENING: f64 = 1.0 / 298.257_223_563;   // WGS-84

#[cfg(feature = "wgs72")]
pub const EARTH_RADIUS_KM: f64 = 6378.135;                 // WGS-72 equatorial
#[cfg(feature = "wgs72")]
pub const EARTH_FLATTENING: f64 = 1.0 / 298.26;            // WGS-72

pub const MU_EARTH_KM3_S2: f64 = 398_600.4418;
pub const SECONDS_PER_DAY: f64 = 86_400.0;

// ---------- Logging ----------

static INIT_LOGGER: Once = Once::new();

#[cfg(target_os = "android")]
pub fn init_logger() {
    use android_logger::Config;
    use log::LevelFilter;
    INIT_LOGGER.call_once(|| {
        android_logger::init_once(
            Config::default()
                .with_max_level(LevelFilter::Debug)
                .with_tag("perigeecore")
        );
    });
}

#[cfg(not(target_os = "android"))]
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        let _ = env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Info)
            .parse_default_env()
            .try_init();
    });
}
