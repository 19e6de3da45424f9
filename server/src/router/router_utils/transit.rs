//! Time-dependent evaluation of a single leg.
//!
//! Conditions are sampled where and when the vessel is expected to be:
//! at the start of the leg on entry, at the midpoint half way through
//! and at the end on arrival. The entry sample gives the first transit
//! time estimate that places the other two.

use chrono::{DateTime, Duration, Utc};

use crate::router::router_types::location::Position;
use crate::router::router_utils::geodesy::{normalize_bearing, Sphere};
use crate::router::vessel::{PerformanceModel, SafetyThresholds, SeaState, VesselProfile};
use crate::router::weather::WeatherField;

/// Lowest speed over ground used to turn distance into time.
const MIN_PROGRESS_KTS: f64 = 0.1;

/// Everything a leg forecast needs besides the leg itself.
#[derive(Debug, Copy, Clone)]
pub struct TransitContext<'a> {
    /// Earth model
    pub sphere: Sphere,
    /// Vessel performance predictor
    pub model: &'a dyn PerformanceModel,
    /// Vessel particulars
    pub vessel: &'a VesselProfile,
    /// Weather snapshot
    pub weather: &'a WeatherField,
    /// Hard sea-state limits
    pub thresholds: SafetyThresholds,
}

/// Predicted passage of one leg.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LegForecast {
    /// Great-circle length of the leg
    pub distance_nm: f64,
    /// Initial course of the leg
    pub course_deg: f64,
    /// Commanded speed through the water
    pub commanded_speed_kts: f64,
    /// Mean predicted speed over ground
    pub speed_kts: f64,
    /// Passage time
    pub hours: f64,
    /// Fuel burnt on the leg, tonnes
    pub fuel_t: f64,
    /// Time of arrival at the end of the leg
    pub arrival: DateTime<Utc>,
    /// Highest wave height sampled along the leg
    pub max_wave_height_m: f64,
    /// Highest wind speed sampled along the leg
    pub max_wind_speed_kts: f64,
    /// Margin to the thresholds at the worst sample
    pub safety_margin: f64,
    /// Lowest safety scalar predicted along the leg
    pub safety_scalar: f64,
    /// At least one sample was extrapolated
    pub stale: bool,
}

impl LegForecast {
    /// True when the leg crosses a hard sea-state threshold.
    pub fn exceeds(&self, thresholds: &SafetyThresholds) -> bool {
        thresholds.exceeded(self.max_wave_height_m, self.max_wind_speed_kts)
    }
}

/// Convert fractional hours to a chrono duration.
pub fn hours_to_duration(hours: f64) -> Duration {
    Duration::milliseconds((hours * 3_600_000.0).round() as i64)
}

/// Forecast the passage from `from` to `to`, entering the leg at
/// `depart_at` with `commanded_speed_kts` through the water.
pub fn forecast_leg(
    ctx: &TransitContext,
    from: &Position,
    to: &Position,
    depart_at: DateTime<Utc>,
    commanded_speed_kts: f64,
) -> LegForecast {
    let distance_nm = ctx.sphere.distance(from, to);
    let course_deg = ctx.sphere.initial_bearing(from, to);
    let midpoint = ctx.sphere.intermediate_point(from, to, 0.5);
    let mid_course = ctx.sphere.initial_bearing(&midpoint, to);
    let exit_course = normalize_bearing(ctx.sphere.initial_bearing(to, from) + 180.0);

    let entry = ctx.weather.sample_at(from, depart_at);
    let entry_prediction = ctx.model.predict(
        ctx.vessel,
        &SeaState::relative_to(course_deg, &entry.conditions),
        commanded_speed_kts,
    );
    let first_estimate = distance_nm / entry_prediction.speed_kts.max(MIN_PROGRESS_KTS);

    let middle = ctx
        .weather
        .sample_at(&midpoint, depart_at + hours_to_duration(first_estimate / 2.0));
    let exit = ctx
        .weather
        .sample_at(to, depart_at + hours_to_duration(first_estimate));

    let predictions = [
        entry_prediction,
        ctx.model.predict(
            ctx.vessel,
            &SeaState::relative_to(mid_course, &middle.conditions),
            commanded_speed_kts,
        ),
        ctx.model.predict(
            ctx.vessel,
            &SeaState::relative_to(exit_course, &exit.conditions),
            commanded_speed_kts,
        ),
    ];
    let samples = [entry, middle, exit];

    let speed_kts = (predictions.iter().map(|p| p.speed_kts).sum::<f64>() / 3.0).max(MIN_PROGRESS_KTS);
    let fuel_rate_tpd = predictions.iter().map(|p| p.fuel_rate_tpd).sum::<f64>() / 3.0;
    let hours = distance_nm / speed_kts;

    let max_wave_height_m = samples
        .iter()
        .map(|s| s.conditions.wave_height_m)
        .fold(0.0, f64::max);
    let max_wind_speed_kts = samples
        .iter()
        .map(|s| s.conditions.wind_speed_kts)
        .fold(0.0, f64::max);

    LegForecast {
        distance_nm,
        course_deg,
        commanded_speed_kts,
        speed_kts,
        hours,
        fuel_t: fuel_rate_tpd / 24.0 * hours,
        arrival: depart_at + hours_to_duration(hours),
        max_wave_height_m,
        max_wind_speed_kts,
        safety_margin: ctx.thresholds.margin(max_wave_height_m, max_wind_speed_kts),
        safety_scalar: predictions
            .iter()
            .map(|p| p.safety_scalar)
            .fold(1.0, f64::min),
        stale: samples.iter().any(|s| s.stale),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::vessel::{AnalyticModel, Prediction};
    use crate::router::weather::{Conditions, WeatherSample};
    use crate::test_util::{calm_weather, departure, pos, sample_vessel, wave_corridor_weather};
    use std::sync::Mutex;

    /// Records the relative wind angle of every prediction.
    #[derive(Debug, Default)]
    struct HeadingRecorder {
        relative_wind: Mutex<Vec<f64>>,
    }

    impl PerformanceModel for HeadingRecorder {
        fn predict(
            &self,
            _profile: &VesselProfile,
            sea_state: &SeaState,
            commanded_speed_kts: f64,
        ) -> Prediction {
            if let Ok(mut seen) = self.relative_wind.lock() {
                seen.push(sea_state.relative_wind_deg);
            }
            Prediction {
                speed_kts: commanded_speed_kts,
                fuel_rate_tpd: 20.0,
                safety_scalar: 1.0,
            }
        }
    }

    #[test]
    fn test_calm_leg_forecast() {
        let vessel = sample_vessel();
        let model = AnalyticModel::default();
        let weather = calm_weather(departure());
        let ctx = TransitContext {
            sphere: Sphere::default(),
            model: &model,
            vessel: &vessel,
            weather: &weather,
            thresholds: SafetyThresholds::default(),
        };

        let from = pos(36.0, -123.0);
        let to = pos(35.5, -122.5);
        let leg = forecast_leg(&ctx, &from, &to, departure(), 14.0);
        assert!(!leg.stale);
        assert!(!leg.exceeds(&ctx.thresholds));
        assert!(leg.speed_kts > 10.0 && leg.speed_kts <= 14.0);
        assert!((leg.hours - leg.distance_nm / leg.speed_kts).abs() < 1e-9);
        assert!(leg.arrival > departure());
        assert!(leg.fuel_t > 0.0);
        assert!((leg.max_wave_height_m - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_rough_leg_exceeds_thresholds() {
        let vessel = sample_vessel();
        let model = AnalyticModel::default();
        let weather = wave_corridor_weather(departure(), 6.0, 25.0);
        let ctx = TransitContext {
            sphere: Sphere::default(),
            model: &model,
            vessel: &vessel,
            weather: &weather,
            thresholds: SafetyThresholds::default(),
        };

        // leg on the direct track in the middle of the voyage
        let sf = crate::test_util::san_francisco();
        let la = crate::test_util::los_angeles();
        let from = ctx.sphere.intermediate_point(&sf, &la, 0.45);
        let to = ctx.sphere.intermediate_point(&sf, &la, 0.55);
        let leg = forecast_leg(&ctx, &from, &to, departure(), 14.0);
        assert!(leg.exceeds(&ctx.thresholds));
        assert!(leg.safety_margin < 0.0);
    }

    #[test]
    fn test_exit_sample_uses_final_course() {
        let vessel = sample_vessel();
        let model = HeadingRecorder::default();
        let mut samples = vec![];
        for hours in [0, 200] {
            for (lat, lon) in [(55.0, -40.0), (55.0, 20.0), (65.0, -40.0), (65.0, 20.0)] {
                samples.push(WeatherSample {
                    position: pos(lat, lon),
                    time: departure() + Duration::hours(hours),
                    conditions: Conditions {
                        wind_speed_kts: 20.0,
                        wind_direction_deg: 0.0,
                        ..Conditions::calm()
                    },
                    stale: false,
                });
            }
        }
        let weather = WeatherField::new(samples, Duration::hours(300));
        let ctx = TransitContext {
            sphere: Sphere::default(),
            model: &model,
            vessel: &vessel,
            weather: &weather,
            thresholds: SafetyThresholds::default(),
        };

        // a long high latitude leg turns well to starboard along the way
        let from = pos(60.0, -30.0);
        let to = pos(60.0, 10.0);
        forecast_leg(&ctx, &from, &to, departure(), 14.0);

        let final_course = normalize_bearing(ctx.sphere.initial_bearing(&to, &from) + 180.0);
        assert!(final_course > 100.0);
        let seen = model.relative_wind.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!((seen[0] - ctx.sphere.initial_bearing(&from, &to)).abs() < 1e-6);
        assert!((seen[2] - final_course).abs() < 1e-6, "exit relative wind {}", seen[2]);
    }
}
