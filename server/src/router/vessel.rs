//! Vessel particulars and performance prediction.
//!
//! The search engine and the ETA estimator only depend on the
//! [`PerformanceModel`] trait. Two implementations are provided: a
//! closed-form [`AnalyticModel`] and a [`LearnedModel`] that evaluates
//! externally trained linear coefficients over a fixed feature vector.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::router::router_utils::geodesy::bearing_difference;
use crate::router::weather::Conditions;
use crate::router::RouterError;

/// Wave height below which the hull is considered to be in calm water.
const CALM_WAVE_HEIGHT_M: f64 = 0.5;
/// Wind speed below which wind adds no resistance.
const CALM_WIND_SPEED_KTS: f64 = 10.0;
/// Lowest speed the model will predict while the engine is running.
const MIN_MANOEUVRING_SPEED_KTS: f64 = 1.0;

/// Fuel consumption as a function of speed and sea state.
///
/// `fuel_tpd = service_fuel_tpd * (v / v_service)^speed_exponent
///     * (1 + wave_factor * excess_wave) * (1 + wind_factor * excess_wind)`
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuelCurve {
    /// Fuel burn at service speed in calm water, tonnes per day
    pub service_fuel_tpd: f64,
    /// Propeller law exponent, typically close to 3
    pub speed_exponent: f64,
    /// Added fraction of fuel per metre of wave height above calm water
    pub wave_factor: f64,
    /// Added fraction of fuel per knot of wind above calm conditions
    pub wind_factor: f64,
}

impl Default for FuelCurve {
    fn default() -> Self {
        FuelCurve {
            service_fuel_tpd: 35.0,
            speed_exponent: 3.0,
            wave_factor: 0.08,
            wind_factor: 0.01,
        }
    }
}

/// Static vessel particulars, read-only for the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VesselProfile {
    /// Vessel name or identifier
    pub name: String,
    /// Length overall in metres
    pub length_m: f64,
    /// Beam in metres
    pub beam_m: f64,
    /// Maximum draft in metres
    pub draft_m: f64,
    /// Deadweight in tonnes
    pub deadweight_t: f64,
    /// Installed engine power in kilowatts
    pub engine_power_kw: f64,
    /// Economical service speed in knots
    pub service_speed_kts: f64,
    /// Maximum speed in knots
    pub max_speed_kts: f64,
    /// Block coefficient of the hull, used for squat
    #[serde(default = "default_block_coefficient")]
    pub block_coefficient: f64,
    /// Fuel consumption curve
    #[serde(default)]
    pub fuel_curve: FuelCurve,
}

fn default_block_coefficient() -> f64 {
    0.75
}

impl VesselProfile {
    /// Checks the particulars the performance models divide by or
    /// scale with.
    pub fn validate(&self) -> Result<(), RouterError> {
        let positive = [
            ("length_m", self.length_m),
            ("beam_m", self.beam_m),
            ("service_speed_kts", self.service_speed_kts),
            ("max_speed_kts", self.max_speed_kts),
            ("block_coefficient", self.block_coefficient),
            ("service_fuel_tpd", self.fuel_curve.service_fuel_tpd),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(RouterError::InvalidVessel {
                    reason: format!("{name} must be positive, got {value}"),
                });
            }
        }

        if !self.draft_m.is_finite() {
            return Err(RouterError::InvalidVessel {
                reason: format!("draft_m must be finite, got {}", self.draft_m),
            });
        }
        if self.max_speed_kts < self.service_speed_kts {
            return Err(RouterError::InvalidVessel {
                reason: format!(
                    "max_speed_kts {} is below service_speed_kts {}",
                    self.max_speed_kts, self.service_speed_kts
                ),
            });
        }
        if self.block_coefficient > 1.0 {
            return Err(RouterError::InvalidVessel {
                reason: format!("block_coefficient {} exceeds 1", self.block_coefficient),
            });
        }

        Ok(())
    }

    /// Fuel burn rate at service speed in calm water, tonnes per hour.
    pub fn service_fuel_tph(&self) -> f64 {
        self.fuel_curve.service_fuel_tpd / 24.0
    }
}

/// Environmental conditions relative to the intended heading.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeaState {
    /// Significant wave height in metres
    pub wave_height_m: f64,
    /// True wind speed in knots
    pub wind_speed_kts: f64,
    /// Angle between the heading and the direction the wind comes
    /// from: 0 is a head wind, 180 a following wind
    pub relative_wind_deg: f64,
    /// Current component along the heading (positive is favourable)
    pub current_along_kts: f64,
    /// Current component across the heading (positive sets to starboard)
    pub current_cross_kts: f64,
}

impl SeaState {
    /// Calm water, no wind and no current.
    pub fn calm() -> Self {
        SeaState {
            wave_height_m: 0.0,
            wind_speed_kts: 0.0,
            relative_wind_deg: 0.0,
            current_along_kts: 0.0,
            current_cross_kts: 0.0,
        }
    }

    /// Resolve conditions against an intended heading.
    ///
    /// Wind direction is where the wind blows from, current direction
    /// is where the current sets towards.
    pub fn relative_to(heading: f64, sample: &Conditions) -> Self {
        let relative_wind_deg = bearing_difference(heading, sample.wind_direction_deg).abs();
        let current_angle = bearing_difference(heading, sample.current_direction_deg).to_radians();

        SeaState {
            wave_height_m: sample.wave_height_m,
            wind_speed_kts: sample.wind_speed_kts,
            relative_wind_deg,
            current_along_kts: sample.current_speed_kts * current_angle.cos(),
            current_cross_kts: sample.current_speed_kts * current_angle.sin(),
        }
    }
}

/// Output of a performance prediction.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Achievable speed over ground in knots
    pub speed_kts: f64,
    /// Fuel burn rate in tonnes per day
    pub fuel_rate_tpd: f64,
    /// 1.0 is benign, 0.0 is extreme
    pub safety_scalar: f64,
}

/// Critical sea-state thresholds.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyThresholds {
    /// Critical significant wave height in metres
    pub max_wave_height_m: f64,
    /// Critical wind speed in knots
    pub max_wind_speed_kts: f64,
}

impl Default for SafetyThresholds {
    fn default() -> Self {
        SafetyThresholds {
            max_wave_height_m: 4.0,
            max_wind_speed_kts: 35.0,
        }
    }
}

impl SafetyThresholds {
    /// Largest of the wave and wind ratios to their thresholds.
    pub fn severity(&self, wave_height_m: f64, wind_speed_kts: f64) -> f64 {
        let wave = wave_height_m.max(0.0) / self.max_wave_height_m;
        let wind = wind_speed_kts.max(0.0) / self.max_wind_speed_kts;
        wave.max(wind)
    }

    /// Remaining distance to the thresholds: 1.0 in dead calm, 0.0 at
    /// a threshold, negative beyond.
    pub fn margin(&self, wave_height_m: f64, wind_speed_kts: f64) -> f64 {
        1.0 - self.severity(wave_height_m, wind_speed_kts)
    }

    /// True when either threshold is strictly crossed.
    pub fn exceeded(&self, wave_height_m: f64, wind_speed_kts: f64) -> bool {
        wave_height_m > self.max_wave_height_m || wind_speed_kts > self.max_wind_speed_kts
    }

    /// Threshold-gated safety scalar.
    ///
    /// Falls gently up to a threshold (0.5 at the threshold) and then
    /// decays strictly beyond it.
    pub fn safety_scalar(&self, wave_height_m: f64, wind_speed_kts: f64) -> f64 {
        let severity = self.severity(wave_height_m, wind_speed_kts);
        if severity <= 1.0 {
            1.0 - 0.5 * severity * severity
        } else {
            0.5 * (-3.0 * (severity - 1.0)).exp()
        }
    }
}

/// A capability that maps a vessel and local conditions to achievable
/// speed, fuel burn and a safety scalar.
///
/// Implementations must be pure so the search can call them from
/// several threads.
pub trait PerformanceModel: Debug + Send + Sync {
    /// Predict performance at `commanded_speed_kts` through the water.
    fn predict(
        &self,
        profile: &VesselProfile,
        sea_state: &SeaState,
        commanded_speed_kts: f64,
    ) -> Prediction;
}

/// Closed-form performance curves.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct AnalyticModel {
    /// Thresholds gating the safety scalar
    pub thresholds: SafetyThresholds,
}

impl AnalyticModel {
    /// Creates an analytic model with the given thresholds.
    pub fn new(thresholds: SafetyThresholds) -> Self {
        AnalyticModel { thresholds }
    }

    fn fuel_rate(profile: &VesselProfile, sea_state: &SeaState, commanded_speed_kts: f64) -> f64 {
        let curve = &profile.fuel_curve;
        let speed_ratio = (commanded_speed_kts / profile.service_speed_kts).max(0.0);
        let excess_wave = (sea_state.wave_height_m - CALM_WAVE_HEIGHT_M).max(0.0);
        let excess_wind = (sea_state.wind_speed_kts - CALM_WIND_SPEED_KTS).max(0.0);

        curve.service_fuel_tpd
            * speed_ratio.powf(curve.speed_exponent)
            * (1.0 + curve.wave_factor * excess_wave)
            * (1.0 + curve.wind_factor * excess_wind)
    }
}

impl PerformanceModel for AnalyticModel {
    fn predict(
        &self,
        profile: &VesselProfile,
        sea_state: &SeaState,
        commanded_speed_kts: f64,
    ) -> Prediction {
        let commanded = commanded_speed_kts.clamp(0.0, profile.max_speed_kts);
        // head seas slow the hull more than following seas
        let heading_factor = 0.5 + 0.5 * sea_state.relative_wind_deg.to_radians().cos();
        let wave_loss = 0.15 * sea_state.wave_height_m.max(0.0).powf(1.5) * (0.5 + heading_factor);
        let wind_loss = 0.02 * sea_state.wind_speed_kts.max(0.0) * heading_factor;

        let through_water = (commanded - wave_loss - wind_loss).max(MIN_MANOEUVRING_SPEED_KTS);
        let over_ground =
            (through_water + sea_state.current_along_kts).max(MIN_MANOEUVRING_SPEED_KTS);

        Prediction {
            speed_kts: over_ground,
            fuel_rate_tpd: Self::fuel_rate(profile, sea_state, commanded),
            safety_scalar: self
                .thresholds
                .safety_scalar(sea_state.wave_height_m, sea_state.wind_speed_kts),
        }
    }
}

/// Number of entries in the learned model feature vector.
pub const FEATURE_COUNT: usize = 7;

/// Feature vector fed to a [`LearnedModel`]:
/// `[1, commanded_speed, wave_height, wind_speed, current_along,
/// draft, cos(relative_wind)]`.
pub fn feature_vector(
    profile: &VesselProfile,
    sea_state: &SeaState,
    commanded_speed_kts: f64,
) -> [f64; FEATURE_COUNT] {
    [
        1.0,
        commanded_speed_kts,
        sea_state.wave_height_m,
        sea_state.wind_speed_kts,
        sea_state.current_along_kts,
        profile.draft_m,
        sea_state.relative_wind_deg.to_radians().cos(),
    ]
}

fn dot(weights: &[f64; FEATURE_COUNT], features: &[f64; FEATURE_COUNT]) -> f64 {
    weights.iter().zip(features.iter()).map(|(w, f)| w * f).sum()
}

/// Coefficients exported by the training pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedCoefficients {
    /// Weights of the speed over ground regression
    pub speed: [f64; FEATURE_COUNT],
    /// Weights of the fuel rate regression, tonnes per day
    pub fuel: [f64; FEATURE_COUNT],
    /// Logit weights of the safety classifier
    pub safety: [f64; FEATURE_COUNT],
    /// Thresholds bounding the learned safety scalar
    #[serde(default)]
    pub thresholds: SafetyThresholds,
}

impl From<LearnedCoefficients> for LearnedModel {
    fn from(c: LearnedCoefficients) -> Self {
        LearnedModel::new(c.speed, c.fuel, c.safety, c.thresholds)
    }
}

/// Linear predictor whose coefficients are trained outside the engine.
///
/// Wave and wind coefficients are sign-constrained on construction so
/// fuel never decreases and safety never increases with rougher seas.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "LearnedCoefficients")]
pub struct LearnedModel {
    speed_weights: [f64; FEATURE_COUNT],
    fuel_weights: [f64; FEATURE_COUNT],
    safety_weights: [f64; FEATURE_COUNT],
    thresholds: SafetyThresholds,
}

impl LearnedModel {
    /// Creates a learned model from trained coefficients.
    pub fn new(
        speed_weights: [f64; FEATURE_COUNT],
        mut fuel_weights: [f64; FEATURE_COUNT],
        mut safety_weights: [f64; FEATURE_COUNT],
        thresholds: SafetyThresholds,
    ) -> Self {
        for i in [2, 3] {
            fuel_weights[i] = fuel_weights[i].max(0.0);
            safety_weights[i] = safety_weights[i].min(0.0);
        }

        LearnedModel {
            speed_weights,
            fuel_weights,
            safety_weights,
            thresholds,
        }
    }
}

impl PerformanceModel for LearnedModel {
    fn predict(
        &self,
        profile: &VesselProfile,
        sea_state: &SeaState,
        commanded_speed_kts: f64,
    ) -> Prediction {
        let features = feature_vector(profile, sea_state, commanded_speed_kts);

        let speed_kts = dot(&self.speed_weights, &features)
            .clamp(MIN_MANOEUVRING_SPEED_KTS, profile.max_speed_kts.max(MIN_MANOEUVRING_SPEED_KTS));
        let fuel_rate_tpd = dot(&self.fuel_weights, &features).max(0.0);
        let learned_safety = 1.0 / (1.0 + (-dot(&self.safety_weights, &features)).exp());
        let envelope = self
            .thresholds
            .safety_scalar(sea_state.wave_height_m, sea_state.wind_speed_kts);

        Prediction {
            speed_kts,
            fuel_rate_tpd,
            safety_scalar: learned_safety.min(envelope),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::sample_vessel;

    fn sea(wave: f64, wind: f64) -> SeaState {
        SeaState {
            wave_height_m: wave,
            wind_speed_kts: wind,
            ..SeaState::calm()
        }
    }

    #[test]
    fn test_calm_water_prediction() {
        let vessel = sample_vessel();
        let model = AnalyticModel::default();
        let p = model.predict(&vessel, &SeaState::calm(), vessel.service_speed_kts);
        // calm water: full speed, service fuel burn, maximum safety
        assert!((p.speed_kts - vessel.service_speed_kts).abs() < 1e-9);
        assert!((p.fuel_rate_tpd - vessel.fuel_curve.service_fuel_tpd).abs() < 1e-9);
        assert_eq!(p.safety_scalar, 1.0);
    }

    #[test]
    fn test_fuel_non_decreasing_with_waves() {
        let vessel = sample_vessel();
        let model = AnalyticModel::default();
        let mut previous = 0.0;
        for step in 0..40 {
            let wave = step as f64 * 0.25;
            let p = model.predict(&vessel, &sea(wave, 10.0), 14.0);
            assert!(p.fuel_rate_tpd >= previous);
            previous = p.fuel_rate_tpd;
        }
    }

    #[test]
    fn test_safety_falls_beyond_thresholds() {
        let vessel = sample_vessel();
        let model = AnalyticModel::default();
        let at_threshold = model.predict(&vessel, &sea(4.0, 0.0), 14.0).safety_scalar;
        let beyond = model.predict(&vessel, &sea(4.5, 0.0), 14.0).safety_scalar;
        let far_beyond = model.predict(&vessel, &sea(6.0, 0.0), 14.0).safety_scalar;
        assert!(beyond < at_threshold);
        assert!(far_beyond < beyond);

        let windy = model.predict(&vessel, &sea(1.0, 36.0), 14.0).safety_scalar;
        let windier = model.predict(&vessel, &sea(1.0, 45.0), 14.0).safety_scalar;
        assert!(windy < 0.5);
        assert!(windier < windy);
    }

    #[test]
    fn test_thresholds_configurable() {
        let thresholds = SafetyThresholds {
            max_wave_height_m: 2.0,
            max_wind_speed_kts: 20.0,
        };
        assert!(thresholds.exceeded(2.5, 0.0));
        assert!(!thresholds.exceeded(2.0, 20.0));
        assert!(thresholds.margin(1.0, 0.0) > thresholds.margin(1.5, 0.0));
        assert!((thresholds.margin(0.0, 10.0) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_following_current_is_faster() {
        let vessel = sample_vessel();
        let model = AnalyticModel::default();
        let sample = Conditions {
            current_speed_kts: 2.0,
            current_direction_deg: 90.0,
            ..Conditions::calm()
        };
        let with = model.predict(&vessel, &SeaState::relative_to(90.0, &sample), 12.0);
        let against = model.predict(&vessel, &SeaState::relative_to(270.0, &sample), 12.0);
        assert!((with.speed_kts - 14.0).abs() < 1e-9);
        assert!((against.speed_kts - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_learned_model_deserialize_constrains_signs() {
        let json = r#"{
            "speed": [0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            "fuel": [0.0, 2.5, -3.0, 0.0, 0.0, 0.0, 0.0],
            "safety": [2.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0]
        }"#;
        let model: LearnedModel = serde_json::from_str(json).unwrap();
        let vessel = sample_vessel();
        let calm = model.predict(&vessel, &sea(0.0, 0.0), 12.0);
        let rough = model.predict(&vessel, &sea(3.0, 0.0), 12.0);
        assert!(rough.fuel_rate_tpd >= calm.fuel_rate_tpd);
        assert!(rough.safety_scalar <= calm.safety_scalar);
    }

    #[test]
    fn test_learned_model_is_interchangeable() {
        let vessel = sample_vessel();
        let thresholds = SafetyThresholds::default();
        let learned = LearnedModel::new(
            [0.0, 1.0, -0.4, -0.02, 1.0, 0.0, 0.0],
            [0.0, 2.5, -1.0, 0.2, 0.0, 0.0, 0.0],
            [3.0, 0.0, -0.5, -0.05, 0.0, 0.0, 0.0],
            thresholds,
        );
        let models: Vec<Box<dyn PerformanceModel>> =
            vec![Box::new(AnalyticModel::new(thresholds)), Box::new(learned)];

        for model in models {
            let calm = model.predict(&vessel, &sea(0.5, 5.0), 14.0);
            let rough = model.predict(&vessel, &sea(5.0, 40.0), 14.0);
            assert!(calm.speed_kts > 0.0);
            assert!(rough.fuel_rate_tpd >= calm.fuel_rate_tpd);
            assert!(rough.safety_scalar < calm.safety_scalar);
            assert!(rough.safety_scalar < 0.5);
        }
    }

    #[test]
    fn test_vessel_profile_validation() {
        assert!(sample_vessel().validate().is_ok());

        let stopped = VesselProfile {
            service_speed_kts: 0.0,
            ..sample_vessel()
        };
        assert!(matches!(
            stopped.validate(),
            Err(RouterError::InvalidVessel { reason }) if reason.contains("service_speed_kts")
        ));

        let slow_max = VesselProfile {
            max_speed_kts: 12.0,
            ..sample_vessel()
        };
        assert!(slow_max.validate().is_err());

        let bad_hull = VesselProfile {
            block_coefficient: f64::NAN,
            ..sample_vessel()
        };
        assert!(bad_hull.validate().is_err());
    }
}
