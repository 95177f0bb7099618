//! Host configuration.
//!
//! Loaded from a TOML file whose path comes from `--config` or the
//! `COMMUTE_RISK_CONFIG` environment variable. Every field has a default,
//! so an empty file (or no file at all) is a valid configuration.

use std::path::{Path, PathBuf};

use commute_risk_hazard::{DEFAULT_GRID_SIZE_KM, DEFAULT_ROUTE_PROXIMITY_KM};
use commute_risk_notify::SchedulerConfig;
use commute_risk_polyline::{DEFAULT_SAMPLE_INTERVAL_KM, DEFAULT_TOLERANCE_KM};
use commute_risk_risk::RiskWeights;
use serde::{Deserialize, Serialize};

use crate::HostError;

/// Environment variable consulted when no `--config` path is given.
pub const CONFIG_ENV_VAR: &str = "COMMUTE_RISK_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Minutes before the optimal departure that a reminder fires.
    pub alert_advance_minutes: i64,
    /// Minimum change in reminder time that triggers a reschedule.
    pub reschedule_tolerance_minutes: i64,
    /// Hazard cluster cell size.
    pub cluster_grid_km: f64,
    /// Distance from a route within which hazards count against it.
    pub route_proximity_km: f64,
    /// Spacing of the waypoints sampled along each route.
    pub sample_interval_km: f64,
    /// Douglas-Peucker tolerance applied to decoded route geometry.
    pub simplify_tolerance_km: f64,
    /// Sub-score weights.
    pub weights: RiskWeights,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            alert_advance_minutes: 30,
            reschedule_tolerance_minutes: 1,
            cluster_grid_km: DEFAULT_GRID_SIZE_KM,
            route_proximity_km: DEFAULT_ROUTE_PROXIMITY_KM,
            sample_interval_km: DEFAULT_SAMPLE_INTERVAL_KM,
            simplify_tolerance_km: DEFAULT_TOLERANCE_KM,
            weights: RiskWeights::default(),
        }
    }
}

impl HostConfig {
    /// Parses and validates a TOML configuration.
    ///
    /// # Errors
    ///
    /// * [`HostError::Toml`] if the text is not valid TOML for this shape
    /// * [`HostError::InvalidConfig`] if a value is out of range
    pub fn from_toml_str(text: &str) -> Result<Self, HostError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the configuration from `path`, or from the path named by
    /// [`CONFIG_ENV_VAR`], falling back to defaults when neither is set.
    ///
    /// # Errors
    ///
    /// * [`HostError::Io`] if the file cannot be read
    /// * see [`HostConfig::from_toml_str`]
    pub fn load(path: Option<&Path>) -> Result<Self, HostError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from));

        let Some(path) = path else {
            log::info!("No configuration file given, using defaults");
            return Ok(Self::default());
        };

        log::info!("Loading configuration from {}", path.display());
        let text = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&text)
    }

    /// # Errors
    ///
    /// Returns [`HostError::InvalidConfig`] naming the first bad value.
    pub fn validate(&self) -> Result<(), HostError> {
        let invalid = |message: String| Err(HostError::InvalidConfig(message));

        if self.alert_advance_minutes < 0 {
            return invalid(format!(
                "alert_advance_minutes must be non-negative, got {}",
                self.alert_advance_minutes
            ));
        }
        if self.reschedule_tolerance_minutes < 0 {
            return invalid(format!(
                "reschedule_tolerance_minutes must be non-negative, got {}",
                self.reschedule_tolerance_minutes
            ));
        }
        for (name, value) in [
            ("cluster_grid_km", self.cluster_grid_km),
            ("sample_interval_km", self.sample_interval_km),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return invalid(format!("{name} must be positive, got {value}"));
            }
        }
        for (name, value) in [
            ("route_proximity_km", self.route_proximity_km),
            ("simplify_tolerance_km", self.simplify_tolerance_km),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return invalid(format!("{name} must be non-negative, got {value}"));
            }
        }
        self.weights.validate()?;
        Ok(())
    }

    #[must_use]
    pub const fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            alert_advance_minutes: self.alert_advance_minutes,
            reschedule_tolerance_minutes: self.reschedule_tolerance_minutes,
        }
    }
}
