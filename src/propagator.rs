//! Element set + instant → validated tracked-object state.
//!
//! The perturbation model itself is supplied: [`Sgp4Model`] wraps the `sgp4`
//! crate, tests can plug in anything that implements [`PropagationModel`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use log::debug;

// SGP4 v2.3
use sgp4::{Constants, Elements, MinutesSinceEpoch};

use crate::catalog::{CatalogEntry, ObjectKind};
use crate::config::EngineConfig;
use crate::elements::OrbitalElementSet;
use crate::error::{EngineError, Result};
use crate::frames::{ecef_to_geodetic, norm, teme_to_ecef, Geodetic};

/// Inertial (TEME) position and velocity as returned by a propagation model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InertialState {
    pub position_km: [f64; 3],
    pub velocity_km_s: [f64; 3],
}

impl InertialState {
    pub fn is_finite(&self) -> bool {
        self.position_km.iter().chain(self.velocity_km_s.iter()).all(|v| v.is_finite())
    }
}

pub trait PropagationModel {
    /// per-object state the model keeps between calls (e.g. initialized SGP4 constants)
    type Context;

    /// Fails if the model rejects the element set (invalid orbit).
    fn prepare(&self, set: &OrbitalElementSet) -> Result<Self::Context>;

    fn propagate(&self, context: &Self::Context, t: DateTime<Utc>) -> Result<InertialState>;
}

// ---------- SGP4 ----------

#[derive(Debug, Clone, Copy, Default)]
pub struct Sgp4Model;

pub struct Sgp4Context {
    elements: Elements,
    constants: Constants,
}

impl PropagationModel for Sgp4Model {
    type Context = Sgp4Context;

    fn prepare(&self, set: &OrbitalElementSet) -> Result<Sgp4Context> {
        let elements = Elements::from_tle(None, set.line1.as_bytes(), set.line2.as_bytes())
            .map_err(|e| EngineError::InvalidOrbit(format!("{}: {}", set.catalog_number, e)))?;
        let constants = Constants::from_elements(&elements)
            .map_err(|e| EngineError::InvalidOrbit(format!("{}: {}", set.catalog_number, e)))?;
        Ok(Sgp4Context { elements, constants })
    }

    fn propagate(&self, ctx: &Sgp4Context, t: DateTime<Utc>) -> Result<InertialState> {
        let minutes: MinutesSinceEpoch = ctx.elements
            .datetime_to_minutes_since_epoch(&t.naive_utc())
            .map_err(|e| EngineError::Propagation(format!("{e:?}")))?;
        let pred = ctx.constants.propagate(minutes)
            .map_err(|e| EngineError::Propagation(format!("{e:?}")))?;

        Ok(InertialState { position_km: pred.position, velocity_km_s: pred.velocity })
    }
}

// ---------- Tracked state ----------

/// One object's state at one tick. A new tick produces a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedObjectState {
    pub catalog_number: u32,
    pub name: Option<String>,
    pub kind: ObjectKind,
    pub timestamp: DateTime<Utc>,
    pub geodetic: Geodetic,
    pub velocity_km_s: f64,          // inertial speed
    pub eci_position_km: [f64; 3],
    pub eci_velocity_km_s: [f64; 3],
}

impl TrackedObjectState {
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| format!("NORAD {}", self.catalog_number))
    }
}

/// Altitude window outside of which a propagated state is treated as degenerate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AltitudeBounds {
    pub min_km: f64,
    pub max_km: f64,
}

impl Default for AltitudeBounds {
    fn default() -> Self {
        AltitudeBounds { min_km: 0.0, max_km: 100_000.0 }
    }
}

impl From<&EngineConfig> for AltitudeBounds {
    fn from(config: &EngineConfig) -> Self {
        AltitudeBounds { min_km: config.min_altitude_km, max_km: config.max_altitude_km }
    }
}

impl AltitudeBounds {
    pub fn contains(&self, altitude_km: f64) -> bool {
        (self.min_km..=self.max_km).contains(&altitude_km)
    }
}

/// Convert a raw inertial state into a tracked state, or `None` if the result
/// is degenerate (non-finite vectors or coordinates, altitude out of bounds).
pub fn to_tracked_state(
    entry: &CatalogEntry,
    inertial: &InertialState,
    t: DateTime<Utc>,
    bounds: &AltitudeBounds,
) -> Option<TrackedObjectState> {
    if !inertial.is_finite() {
        debug!("[propagate] {}: non-finite state vector", entry.catalog_number());
        return None;
    }

    let geodetic = ecef_to_geodetic(teme_to_ecef(inertial.position_km, t));
    if !geodetic.is_finite() || !bounds.contains(geodetic.altitude_km) {
        debug!("[propagate] {}: rejected geodetic {:?}", entry.catalog_number(), geodetic);
        return None;
    }

    Some(TrackedObjectState {
        catalog_number: entry.catalog_number(),
        name: entry.name.clone(),
        kind: entry.kind,
        timestamp: t,
        geodetic,
        velocity_km_s: norm(inertial.velocity_km_s),
        eci_position_km: inertial.position_km,
        eci_velocity_km_s: inertial.velocity_km_s,
    })
}

/// Propagate a single entry with an already prepared model context.
pub fn propagate_state<M: PropagationModel>(
    model: &M,
    context: &M::Context,
    entry: &CatalogEntry,
    t: DateTime<Utc>,
    bounds: &AltitudeBounds,
) -> Option<TrackedObjectState> {
    match model.propagate(context, t) {
        Ok(inertial) => to_tracked_state(entry, &inertial, t, bounds),
        Err(e) => {
            debug!("[propagate] {}: {e}", entry.catalog_number());
            None
        }
    }
}
