//! # Config
//!
//! Define and implement config options for module

use anyhow::Result;
use config::{ConfigError, Environment};
use dotenv::dotenv;
use serde::{Deserialize, Serialize};

use crate::router::hazard::TssMode;
use crate::router::router_utils::geodesy::{Sphere, EARTH_RADIUS_NM};
use crate::router::vessel::SafetyThresholds;
use crate::router::RouterError;

/// struct holding configuration options
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// path to log configuration YAML file
    pub log_config: String,

    /// path to the voyage request JSON planned by the binary
    pub scenario_file: String,

    /// settings handed to the routing engine
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Structured settings consumed by the routing engine.
///
/// The engine never reads the environment itself; callers build this
/// object (usually through [`Config::try_from_env`]) and pass it in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Earth radius used by all distance calculations, nautical miles
    pub earth_radius_nm: f64,
    /// Minimum standoff from any coastline outside pilotage zones
    pub min_offing_nm: f64,
    /// Draft used when the vessel profile does not carry one
    pub default_draft_m: f64,
    /// Required under-keel clearance on top of draft and squat
    pub ukc_margin_m: f64,
    /// Include squat in the under-keel clearance check
    pub apply_squat: bool,
    /// Traffic separation scheme enforcement
    pub tss_mode: TssMode,
    /// Allowed deviation from a corridor's mandated direction, degrees
    pub tss_tolerance_deg: f64,
    /// Cost hours added per violating leg in prefer mode
    pub tss_penalty: f64,
    /// Critical significant wave height, metres
    pub max_wave_height_m: f64,
    /// Critical wind speed, knots
    pub max_wind_speed_kts: f64,
    /// Weather past this many hours after the field's first time is stale
    pub forecast_horizon_hours: f64,
    /// ETA drift at the next waypoint that triggers a replan, hours
    pub replan_drift_hours: f64,
    /// Interval between scheduled stale checks, hours
    pub replan_interval_hours: f64,
    /// Largest course change a local detour may use, degrees
    pub max_deviation_deg: f64,
    /// Relative cost window within which the safer route wins
    pub tie_break_epsilon: f64,
    /// Distance between lattice stations along the track
    pub lattice_leg_nm: f64,
    /// Lateral distance between neighbouring lattice lanes
    pub lattice_lane_spacing_nm: f64,
    /// Number of lanes on each side of the direct track
    pub lattice_lanes: usize,
    /// Largest lane change between consecutive stations
    pub lattice_max_lane_shift: usize,
    /// Fractions of the vessel's max speed offered to the search
    pub speed_fractions: Vec<f64>,
    /// Threads used to screen lattice edges
    pub search_workers: usize,
    /// Confidence width as a fraction of elapsed hours
    pub eta_base_uncertainty: f64,
    /// Extra confidence width as a fraction of hours sailed on stale weather
    pub eta_stale_uncertainty: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            earth_radius_nm: EARTH_RADIUS_NM,
            min_offing_nm: 3.0,
            default_draft_m: 10.5,
            ukc_margin_m: 0.6,
            apply_squat: true,
            tss_mode: TssMode::Enforce,
            tss_tolerance_deg: 90.0,
            tss_penalty: 0.5,
            max_wave_height_m: 4.0,
            max_wind_speed_kts: 35.0,
            forecast_horizon_hours: 72.0,
            replan_drift_hours: 2.0,
            replan_interval_hours: 6.0,
            max_deviation_deg: 45.0,
            tie_break_epsilon: 0.01,
            lattice_leg_nm: 20.0,
            lattice_lane_spacing_nm: 8.0,
            lattice_lanes: 10,
            lattice_max_lane_shift: 2,
            speed_fractions: vec![0.6, 0.8, 1.0],
            search_workers: 4,
            eta_base_uncertainty: 0.05,
            eta_stale_uncertainty: 0.25,
        }
    }
}

impl EngineConfig {
    /// Reject settings the engine cannot work with.
    pub fn validate(&self) -> Result<(), RouterError> {
        let positive = [
            ("earth_radius_nm", self.earth_radius_nm),
            ("max_wave_height_m", self.max_wave_height_m),
            ("max_wind_speed_kts", self.max_wind_speed_kts),
            ("forecast_horizon_hours", self.forecast_horizon_hours),
            ("replan_drift_hours", self.replan_drift_hours),
            ("replan_interval_hours", self.replan_interval_hours),
            ("max_deviation_deg", self.max_deviation_deg),
            ("lattice_leg_nm", self.lattice_leg_nm),
            ("lattice_lane_spacing_nm", self.lattice_lane_spacing_nm),
        ];

        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(RouterError::InvalidConfiguration {
                    reason: format!("{name} must be positive, got {value}"),
                });
            }
        }

        let non_negative = [
            ("min_offing_nm", self.min_offing_nm),
            ("ukc_margin_m", self.ukc_margin_m),
            ("tss_penalty", self.tss_penalty),
            ("tie_break_epsilon", self.tie_break_epsilon),
            ("eta_base_uncertainty", self.eta_base_uncertainty),
            ("eta_stale_uncertainty", self.eta_stale_uncertainty),
        ];

        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(RouterError::InvalidConfiguration {
                    reason: format!("{name} must not be negative, got {value}"),
                });
            }
        }

        if !(0.0..=180.0).contains(&self.tss_tolerance_deg) {
            return Err(RouterError::InvalidConfiguration {
                reason: format!(
                    "tss_tolerance_deg must be within [0, 180], got {}",
                    self.tss_tolerance_deg
                ),
            });
        }

        if self.speed_fractions.is_empty() {
            return Err(RouterError::InvalidConfiguration {
                reason: "speed_fractions must not be empty".to_string(),
            });
        }

        if let Some(bad) = self
            .speed_fractions
            .iter()
            .find(|f| !(f.is_finite() && **f > 0.0 && **f <= 1.0))
        {
            return Err(RouterError::InvalidConfiguration {
                reason: format!("speed fraction {bad} is outside (0, 1]"),
            });
        }

        if self.search_workers == 0 {
            return Err(RouterError::InvalidConfiguration {
                reason: "search_workers must be at least 1".to_string(),
            });
        }

        Ok(())
    }

    /// Earth model for the configured radius.
    pub fn sphere(&self) -> Sphere {
        Sphere::new(self.earth_radius_nm)
    }

    /// Configured sea-state thresholds.
    pub fn thresholds(&self) -> SafetyThresholds {
        SafetyThresholds {
            max_wave_height_m: self.max_wave_height_m,
            max_wind_speed_kts: self.max_wind_speed_kts,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        log::warn!("(default) Creating Config object with default values.");
        Self::new()
    }
}

impl Config {
    /// Default values for Config
    pub fn new() -> Self {
        Config {
            log_config: String::from("log4rs.yaml"),
            scenario_file: String::from("server/scenarios/sf_to_la.json"),
            engine: EngineConfig::default(),
        }
    }

    /// Create a new `Config` object using environment variables
    ///
    /// Engine settings are nested, e.g. `ENGINE__MAX_WAVE_HEIGHT_M=5.0`.
    pub fn try_from_env() -> Result<Self, ConfigError> {
        // read .env file if present
        dotenv().ok();
        let default_config = Config::default();

        config::Config::builder()
            .set_default("log_config", default_config.log_config)?
            .set_default("scenario_file", default_config.scenario_file)?
            .add_source(Environment::default().separator("__"))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[tokio::test]
    #[serial]
    async fn test_config_from_default() {
        crate::get_log_handle().await;
        ut_info!("(test_config_from_default) Start.");

        let config = Config::default();

        assert_eq!(config.log_config, String::from("log4rs.yaml"));
        assert_eq!(config.scenario_file, String::from("server/scenarios/sf_to_la.json"));
        assert_eq!(config.engine.min_offing_nm, 3.0);
        assert_eq!(config.engine.max_wave_height_m, 4.0);
        assert_eq!(config.engine.max_wind_speed_kts, 35.0);
        assert_eq!(config.engine.max_deviation_deg, 45.0);
        assert_eq!(config.engine.tss_mode, TssMode::Enforce);
        assert!(config.engine.validate().is_ok());

        ut_info!("(test_config_from_default) Success.");
    }

    #[tokio::test]
    #[serial]
    async fn test_config_from_env() {
        crate::get_log_handle().await;
        ut_info!("(test_config_from_env) Start.");

        std::env::set_var("LOG_CONFIG", "config_file.yaml");
        std::env::set_var("SCENARIO_FILE", "voyage.json");
        std::env::set_var("ENGINE__MAX_WAVE_HEIGHT_M", "5.5");
        std::env::set_var("ENGINE__TSS_MODE", "prefer");

        let config = Config::try_from_env();
        assert!(config.is_ok());
        let config = config.unwrap();

        assert_eq!(config.log_config, String::from("config_file.yaml"));
        assert_eq!(config.scenario_file, String::from("voyage.json"));
        assert_eq!(config.engine.max_wave_height_m, 5.5);
        assert_eq!(config.engine.tss_mode, TssMode::Prefer);
        // untouched engine settings keep their defaults
        assert_eq!(config.engine.replan_drift_hours, 2.0);

        std::env::remove_var("LOG_CONFIG");
        std::env::remove_var("SCENARIO_FILE");
        std::env::remove_var("ENGINE__MAX_WAVE_HEIGHT_M");
        std::env::remove_var("ENGINE__TSS_MODE");

        ut_info!("(test_config_from_env) Success.");
    }

    #[test]
    fn test_engine_config_validation() {
        let mut config = EngineConfig::default();
        config.speed_fractions.clear();
        assert!(matches!(
            config.validate(),
            Err(RouterError::InvalidConfiguration { .. })
        ));

        let config = EngineConfig {
            max_wave_height_m: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            speed_fractions: vec![0.5, 1.5],
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            search_workers: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
