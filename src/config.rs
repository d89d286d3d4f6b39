use std::path::Path;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use log::info;

use crate::error::{EngineError, Result};

/// Tunable parameters surfaced to callers. Every field has a default so a
/// partial JSON document (or `{}`) is a valid configuration.
///
/// The altitude bound and the maneuver threshold are operational constants
/// without a derivation behind them; they are kept here as defaults so they
/// can be reviewed and overridden.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub cadence_ms: u64,

    pub min_altitude_km: f64,
    pub max_altitude_km: f64,

    pub maneuver_threshold_km_s: f64,
    pub history_z_threshold: f64,

    pub conjunction_threshold_km: f64,
    pub tca_window_s: f64,
    pub monte_carlo_samples: usize,
    pub position_sigma_km: f64,
    pub combined_radius_km: f64,
    pub monte_carlo_seed: u64,

    pub elevation_mask_deg: f64,
    pub pass_step_s: f64,
    pub pass_window_hours: f64,
    pub access_cache_ttl_s: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            cadence_ms: 1000,
            min_altitude_km: 0.0,
            max_altitude_km: 100_000.0,
            maneuver_threshold_km_s: 0.05,
            history_z_threshold: 3.0,
            conjunction_threshold_km: 50.0,
            tca_window_s: 900.0,
            monte_carlo_samples: 1000,
            position_sigma_km: 1.0,
            combined_radius_km: 0.05, // 50m combined hard-body radius
            monte_carlo_seed: 42,
            elevation_mask_deg: 10.0,
            pass_step_s: 30.0,
            pass_window_hours: 24.0,
            access_cache_ttl_s: 600,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json(&json)?;
        info!("[config] loaded {}", path.display());
        Ok(config)
    }

    pub fn cadence(&self) -> Duration {
        Duration::from_millis(self.cadence_ms)
    }

    pub fn pass_step(&self) -> chrono::Duration {
        chrono::Duration::try_milliseconds((self.pass_step_s * 1000.0).round() as i64).unwrap_or(chrono::Duration::MAX)
    }

    pub fn validate(&self) -> Result<()> {
        fn positive(name: &str, v: f64) -> Result<()> {
            if v.is_finite() && v > 0.0 { Ok(()) } else {
                Err(EngineError::Config(format!("{name} must be a positive number, got {v}")))
            }
        }

        if self.cadence_ms == 0 {
            return Err(EngineError::Config("cadence_ms must be > 0".into()));
        }
        if !self.min_altitude_km.is_finite() || self.min_altitude_km < 0.0 {
            return Err(EngineError::Config(format!("min_altitude_km must be >= 0, got {}", self.min_altitude_km)));
        }
        positive("max_altitude_km", self.max_altitude_km)?;
        if self.max_altitude_km <= self.min_altitude_km {
            return Err(EngineError::Config("max_altitude_km must exceed min_altitude_km".into()));
        }
        positive("maneuver_threshold_km_s", self.maneuver_threshold_km_s)?;
        positive("history_z_threshold", self.history_z_threshold)?;
        positive("conjunction_threshold_km", self.conjunction_threshold_km)?;
        positive("tca_window_s", self.tca_window_s)?;
        positive("position_sigma_km", self.position_sigma_km)?;
        positive("combined_radius_km", self.combined_radius_km)?;
        positive("pass_step_s", self.pass_step_s)?;
        positive("pass_window_hours", self.pass_window_hours)?;
        if self.monte_carlo_samples == 0 {
            return Err(EngineError::Config("monte_carlo_samples must be > 0".into()));
        }
        if !(-90.0..=90.0).contains(&self.elevation_mask_deg) {
            return Err(EngineError::Config(format!("elevation_mask_deg out of range: {}", self.elevation_mask_deg)));
        }
        if self.access_cache_ttl_s < 0 {
            return Err(EngineError::Config("access_cache_ttl_s must be >= 0".into()));
        }
        Ok(())
    }
}
