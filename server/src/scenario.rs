//! Voyage scenario files.
//!
//! A scenario bundles everything one planning session needs: the
//! vessel, hazard layers, weather samples and the voyage request. The
//! binary plans it and prints a [`VoyageReport`].

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::router::eta::{EtaEstimate, EtaEstimator, PerformanceCalibration};
use crate::router::hazard::{HazardField, HazardLayers};
use crate::router::router_types::{
    route::{RoutePlan, VoyageRequest},
    router::engine::Router,
};
use crate::router::vessel::{AnalyticModel, LearnedModel, PerformanceModel, VesselProfile};
use crate::router::weather::{WeatherField, WeatherSample};
use crate::router::router_utils::transit::hours_to_duration;

/// One planning session.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    /// The vessel
    pub vessel: VesselProfile,
    /// Static hazards
    #[serde(default)]
    pub hazards: HazardLayers,
    /// Forecast samples
    #[serde(default)]
    pub weather: Vec<WeatherSample>,
    /// Start, goal, departure and priority
    pub request: VoyageRequest,
    /// Learned performance model; the analytic model is used without one
    #[serde(default)]
    pub model: Option<LearnedModel>,
    /// Actual-vs-predicted record of the vessel
    #[serde(default)]
    pub calibration: Option<PerformanceCalibration>,
}

/// Planned route with its arrival estimates.
#[derive(Debug, Clone, Serialize)]
pub struct VoyageReport {
    /// The route and its cost breakdown
    pub plan: RoutePlan,
    /// Per-waypoint arrival estimates
    pub eta: EtaEstimate,
}

impl Scenario {
    /// Parse a scenario from JSON text.
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        let scenario: Scenario = serde_json::from_str(text).context("invalid scenario")?;
        scenario.vessel.validate()?;
        Ok(scenario)
    }

    /// Read and parse a scenario file.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("could not read scenario file [{path}]"))?;
        Self::from_json(&text).with_context(|| format!("in scenario file [{path}]"))
    }

    /// Build the hazard and weather fields of the scenario.
    pub fn fields(&self, config: &EngineConfig) -> (HazardField, WeatherField) {
        (
            HazardField::new(self.hazards.clone(), &config.sphere()),
            WeatherField::new(
                self.weather.clone(),
                hours_to_duration(config.forecast_horizon_hours),
            ),
        )
    }

    /// Performance model selected by the scenario.
    pub fn performance_model(&self, config: &EngineConfig) -> Arc<dyn PerformanceModel> {
        match &self.model {
            Some(model) => Arc::new(model.clone()),
            None => Arc::new(AnalyticModel::new(config.thresholds())),
        }
    }

    /// Plan the voyage and estimate its arrival times.
    pub fn plan(&self, config: &EngineConfig, cancel: &CancellationToken) -> anyhow::Result<VoyageReport> {
        let router = Router::new(config.clone(), self.performance_model(config))?;
        let (hazards, weather) = self.fields(config);

        let plan = router.optimize(&self.request, &self.vessel, &hazards, &weather, cancel)?;

        let mut estimator =
            EtaEstimator::new(config, router.model().as_ref(), &self.vessel, &weather);
        if let Some(calibration) = &self.calibration {
            estimator = estimator.with_calibration(calibration);
        }
        let eta = estimator.estimate(&plan.route, self.request.departure);

        Ok(VoyageReport { plan, eta })
    }
}
