//! Arrival time estimation along a finalized route.
//!
//! Legs are walked in order: the arrival time of one leg is the weather
//! query time of the next, so a single route is always estimated
//! sequentially. Independent routes may be estimated concurrently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::router::router_types::{location::Position, route::Route};
use crate::router::router_utils::transit::{forecast_leg, hours_to_duration, TransitContext};
use crate::router::vessel::{PerformanceModel, VesselProfile};
use crate::router::weather::WeatherField;
use crate::router::PlanWarning;

/// Bounds applied to the calibration speed ratio.
const CALIBRATION_RATIO_RANGE: (f64, f64) = (0.5, 1.5);

/// Predicted arrival at one waypoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EtaRecord {
    /// Index of the waypoint in its route
    pub waypoint_index: usize,
    /// Waypoint position
    pub position: Position,
    /// Predicted time of arrival
    pub eta: DateTime<Utc>,
    /// Width of the confidence interval around `eta`, hours
    pub confidence_hours: f64,
    /// Predicted speed over ground on the leg ending here
    pub predicted_speed_kts: f64,
    /// Fuel burnt from the start of the estimate to this waypoint
    pub fuel_to_date_t: f64,
    /// Weather on the leg ending here was extrapolated
    pub stale: bool,
}

impl EtaRecord {
    /// Earliest arrival within the confidence interval.
    pub fn earliest(&self) -> DateTime<Utc> {
        self.eta - hours_to_duration(self.confidence_hours / 2.0)
    }

    /// Latest arrival within the confidence interval.
    pub fn latest(&self) -> DateTime<Utc> {
        self.eta + hours_to_duration(self.confidence_hours / 2.0)
    }
}

/// Per-waypoint estimates with the warnings met on the way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EtaEstimate {
    /// One record per remaining waypoint, in travel order
    pub records: Vec<EtaRecord>,
    /// Non-fatal conditions met while estimating
    pub warnings: Vec<PlanWarning>,
}

impl EtaEstimate {
    /// Record for a given waypoint index, if it was estimated.
    pub fn record_for(&self, waypoint_index: usize) -> Option<&EtaRecord> {
        self.records
            .iter()
            .find(|r| r.waypoint_index == waypoint_index)
    }

    /// Arrival estimate at the last waypoint.
    pub fn arrival(&self) -> Option<&EtaRecord> {
        self.records.last()
    }
}

/// One observed speed against the model's prediction for it.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSample {
    /// Speed the model predicted
    pub predicted_speed_kts: f64,
    /// Speed the vessel achieved
    pub actual_speed_kts: f64,
}

/// Historical actual-vs-predicted performance of one vessel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceCalibration {
    samples: Vec<CalibrationSample>,
}

impl PerformanceCalibration {
    /// Creates an empty calibration record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an observation. Observations without a positive prediction
    /// carry no information and are dropped.
    pub fn record(&mut self, predicted_speed_kts: f64, actual_speed_kts: f64) {
        if predicted_speed_kts <= 0.0 || actual_speed_kts < 0.0 {
            router_debug!(
                "(record) ignoring calibration sample {} / {}.",
                actual_speed_kts,
                predicted_speed_kts
            );
            return;
        }

        self.samples.push(CalibrationSample {
            predicted_speed_kts,
            actual_speed_kts,
        });
    }

    /// Number of observations.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True without observations.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    fn ratios(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples
            .iter()
            .map(|s| s.actual_speed_kts / s.predicted_speed_kts)
    }

    /// Mean actual/predicted speed ratio, 1 without observations.
    pub fn ratio(&self) -> f64 {
        if self.samples.is_empty() {
            return 1.0;
        }

        let mean = self.ratios().sum::<f64>() / self.samples.len() as f64;
        mean.clamp(CALIBRATION_RATIO_RANGE.0, CALIBRATION_RATIO_RANGE.1)
    }

    /// Mean relative deviation of actual from predicted speed.
    pub fn error(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }

        self.ratios().map(|r| (r - 1.0).abs()).sum::<f64>() / self.samples.len() as f64
    }
}

/// Walks routes leg by leg to predict arrival times.
#[derive(Debug, Clone)]
pub struct EtaEstimator<'a> {
    ctx: TransitContext<'a>,
    base_uncertainty: f64,
    stale_uncertainty: f64,
    calibration: Option<&'a PerformanceCalibration>,
}

impl<'a> EtaEstimator<'a> {
    /// Creates an estimator over one weather snapshot.
    pub fn new(
        config: &EngineConfig,
        model: &'a dyn PerformanceModel,
        vessel: &'a VesselProfile,
        weather: &'a WeatherField,
    ) -> Self {
        EtaEstimator {
            ctx: TransitContext {
                sphere: config.sphere(),
                model,
                vessel,
                weather,
                thresholds: config.thresholds(),
            },
            base_uncertainty: config.eta_base_uncertainty,
            stale_uncertainty: config.eta_stale_uncertainty,
            calibration: None,
        }
    }

    /// Applies a vessel's calibration record to every prediction.
    pub fn with_calibration(mut self, calibration: &'a PerformanceCalibration) -> Self {
        self.calibration = Some(calibration);
        self
    }

    /// Estimate every waypoint of `route` leaving the first one at
    /// `departure`.
    pub fn estimate(&self, route: &Route, departure: DateTime<Utc>) -> EtaEstimate {
        self.walk(route, *route.start(), departure, 1)
    }

    /// Estimate the waypoints from `next_waypoint` on, for a vessel at
    /// `position` at time `now`.
    ///
    /// The leg from `position` to the next waypoint is sailed at the
    /// speed planned for the leg the vessel is on.
    pub fn estimate_from(
        &self,
        route: &Route,
        position: &Position,
        now: DateTime<Utc>,
        next_waypoint: usize,
    ) -> EtaEstimate {
        self.walk(route, *position, now, next_waypoint.max(1))
    }

    fn walk(&self, route: &Route, origin: Position, start: DateTime<Utc>, first: usize) -> EtaEstimate {
        let (ratio, calibration_error) = self
            .calibration
            .map_or((1.0, 0.0), |c| (c.ratio(), c.error()));

        let mut records = vec![];
        if first == 1 {
            records.push(EtaRecord {
                waypoint_index: 0,
                position: origin,
                eta: start,
                confidence_hours: 0.0,
                predicted_speed_kts: 0.0,
                fuel_to_date_t: 0.0,
                stale: false,
            });
        }

        let mut clock = start;
        let mut from = origin;
        let (mut elapsed_hours, mut stale_hours, mut fuel_t) = (0.0, 0.0, 0.0);
        let mut stale_legs = 0;

        for (index, waypoint) in route.waypoints.iter().enumerate().skip(first) {
            let commanded = route.waypoints[index - 1]
                .speed_kts
                .unwrap_or(self.ctx.vessel.service_speed_kts);
            let leg = forecast_leg(&self.ctx, &from, &waypoint.position, clock, commanded);

            let speed_kts = leg.speed_kts * ratio;
            let hours = if speed_kts > 0.0 {
                leg.distance_nm / speed_kts
            } else {
                leg.hours
            };

            elapsed_hours += hours;
            fuel_t += if leg.hours > 0.0 {
                leg.fuel_t * hours / leg.hours
            } else {
                0.0
            };
            if leg.stale {
                stale_hours += hours;
                stale_legs += 1;
            }
            clock += hours_to_duration(hours);

            records.push(EtaRecord {
                waypoint_index: index,
                position: waypoint.position,
                eta: clock,
                confidence_hours: self.base_uncertainty * elapsed_hours
                    + self.stale_uncertainty * stale_hours
                    + calibration_error * elapsed_hours,
                predicted_speed_kts: speed_kts,
                fuel_to_date_t: fuel_t,
                stale: leg.stale,
            });
            from = waypoint.position;
        }

        let mut warnings = vec![];
        if stale_legs > 0 {
            router_warn!(
                "(estimate) {} leg(s) estimated on extrapolated weather.",
                stale_legs
            );
            warnings.push(PlanWarning::DegradedWeatherCoverage {
                stale_segments: stale_legs,
            });
        }

        router_debug!(
            "(estimate) {} waypoint(s), {:.1} h, calibration ratio {:.3}.",
            records.len(),
            elapsed_hours,
            ratio
        );

        EtaEstimate { records, warnings }
    }
}
