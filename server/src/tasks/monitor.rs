//! Dynamic recalculation monitor.
//!
//! ```text
//! Idle --activate--> Active --timer/weather--> StaleCheck
//! StaleCheck --no drift--> Active
//! StaleCheck --blocked leg or ETA drift--> Replanning
//! Replanning --new route--> Active
//! Replanning --no feasible route--> ManualInterventionRequired
//! ```
//!
//! Routes are never edited: every replan activates a new route and moves
//! the previous one to the history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::router::eta::{EtaEstimator, PerformanceCalibration};
use crate::router::router_types::{
    location::Position,
    route::{Priority, RoutePlan, VoyageRequest},
    router::engine::{DetourOutcome, Router},
};
use crate::router::router_utils::{
    graph::{screen_leg, LegVerdict},
    transit::{forecast_leg, TransitContext},
};
use crate::router::vessel::VesselProfile;
use crate::router::RouterError;
use crate::tasks::snapshot::FieldSnapshot;

/// Monitor states.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MonitorState {
    /// No route yet
    Idle,
    /// Following the active route
    Active,
    /// Checking the active route against fresh data
    StaleCheck,
    /// A new route is being computed
    Replanning,
    /// Replanning failed; an operator must supply a route
    ManualInterventionRequired,
}

impl Display for MonitorState {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            MonitorState::Idle => write!(f, "idle"),
            MonitorState::Active => write!(f, "active"),
            MonitorState::StaleCheck => write!(f, "stale check"),
            MonitorState::Replanning => write!(f, "replanning"),
            MonitorState::ManualInterventionRequired => write!(f, "manual intervention required"),
        }
    }
}

/// Events that start a stale check.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// The periodic timer fired
    Timer,
    /// A fresh weather field was published
    WeatherRefreshed,
}

/// Errors raised by the monitor.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MonitorError {
    /// The event is not accepted in the current state.
    #[error("cannot {event} while {from}")]
    InvalidTransition {
        /// State the monitor was in
        from: MonitorState,
        /// Rejected event
        event: &'static str,
    },

    /// No route is active.
    #[error("no active route")]
    NoActiveRoute,

    /// A replan is already running for this voyage.
    #[error("a replan is already in flight")]
    ReplanInFlight,

    /// The route search failed.
    #[error(transparent)]
    Router(#[from] RouterError),
}

/// Where the vessel is on its route.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct VesselFix {
    /// Current position
    pub position: Position,
    /// Time of the fix
    pub time: DateTime<Utc>,
    /// Index of the next waypoint of the active route
    pub next_waypoint: usize,
}

/// Result of comparing the active route with fresh data.
#[derive(Debug, Clone, PartialEq)]
pub struct StaleReview {
    /// Index of the next waypoint
    pub next_waypoint: usize,
    /// Arrival at the next waypoint the active route was planned with
    pub planned_eta: DateTime<Utc>,
    /// Arrival at the next waypoint recomputed with current data
    pub recomputed_eta: DateTime<Utc>,
    /// First remaining leg, counted from the vessel, that now violates
    /// a hard constraint, with the reason
    pub blocked_leg: Option<(usize, String)>,
}

impl StaleReview {
    /// Absolute ETA drift at the next waypoint, hours.
    pub fn drift_hours(&self) -> f64 {
        (self.recomputed_eta - self.planned_eta).num_seconds().abs() as f64 / 3600.0
    }
}

/// Why a replan was started.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplanReason {
    /// A remaining leg crosses a hard constraint
    Blocked {
        /// Leg index counted from the vessel
        leg: usize,
        /// What blocks it
        reason: String,
    },
    /// The next waypoint ETA drifted beyond the threshold
    EtaDrift {
        /// Observed drift, hours
        hours: f64,
    },
}

/// Outcome of a stale check.
#[derive(Debug, Clone, PartialEq)]
pub enum ReviewOutcome {
    /// The active route stays
    Clear,
    /// A replan is needed
    Replan(ReplanReason),
}

/// Everything a replan needs, detached from the monitor so it can run
/// on a blocking thread.
#[derive(Debug, Clone)]
pub struct ReplanJob {
    /// Route being replaced
    pub previous: Arc<RoutePlan>,
    /// Why it is being replaced
    pub reason: ReplanReason,
    /// Priority of the voyage
    pub priority: Priority,
}

impl ReplanJob {
    /// Compute the replacement route for a vessel at `fix`.
    ///
    /// When only the leg to the next waypoint is blocked a bounded
    /// detour is tried first and spliced into the remaining route;
    /// otherwise, or when no detour fits, a full search from the
    /// current position to the final destination runs.
    pub fn run(
        &self,
        router: &Router,
        vessel: &VesselProfile,
        fields: &FieldSnapshot,
        fix: &VesselFix,
        cancel: &CancellationToken,
    ) -> Result<RoutePlan, RouterError> {
        let waypoints = &self.previous.route.waypoints;
        let next = fix.next_waypoint.min(waypoints.len() - 1);

        if let ReplanReason::Blocked { leg: 0, .. } = self.reason {
            let request = VoyageRequest {
                start: fix.position,
                goal: waypoints[next].position,
                departure: fix.time,
                priority: self.priority,
            };

            match router.plan_detour(&request, vessel, &fields.hazards, &fields.weather)? {
                DetourOutcome::Detour {
                    plan,
                    deviation_deg,
                } => {
                    let points: Vec<Position> = plan
                        .route
                        .positions()
                        .chain(waypoints[next + 1..].iter().map(|w| &w.position))
                        .copied()
                        .collect();
                    match router.plan_through(
                        &points,
                        fix.time,
                        self.priority,
                        vessel,
                        &fields.hazards,
                        &fields.weather,
                    ) {
                        Ok(spliced) => {
                            tasks_info!(
                                "(run) detour of {:.1} degrees spliced into the remaining route.",
                                deviation_deg
                            );
                            return Ok(spliced);
                        }
                        Err(e) => {
                            tasks_debug!("(run) spliced route rejected: {}", e);
                        }
                    }
                }
                DetourOutcome::FullReplanRequired { reason } => {
                    tasks_info!("(run) {}, running a full search.", reason);
                }
            }
        }

        let request = VoyageRequest {
            start: fix.position,
            goal: *self.previous.route.end(),
            departure: fix.time,
            priority: self.priority,
        };
        router.optimize(&request, vessel, &fields.hazards, &fields.weather, cancel)
    }
}

/// Per-voyage recalculation state machine.
#[derive(Debug, Clone)]
pub struct VoyageMonitor {
    state: MonitorState,
    drift_threshold_hours: f64,
    priority: Priority,
    active: Option<Arc<RoutePlan>>,
    history: Vec<Arc<RoutePlan>>,
    pending: Option<ReplanReason>,
    job_out: bool,
    coalesced: usize,
}

impl VoyageMonitor {
    /// Creates an idle monitor.
    pub fn new(config: &EngineConfig) -> Self {
        VoyageMonitor {
            state: MonitorState::Idle,
            drift_threshold_hours: config.replan_drift_hours,
            priority: Priority::default(),
            active: None,
            history: vec![],
            pending: None,
            job_out: false,
            coalesced: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// The route currently followed.
    pub fn active_route(&self) -> Option<&Arc<RoutePlan>> {
        self.active.as_ref()
    }

    /// Superseded routes, oldest first.
    pub fn history(&self) -> &[Arc<RoutePlan>] {
        &self.history
    }

    /// Triggers absorbed by a check or replan already under way.
    pub fn coalesced_triggers(&self) -> usize {
        self.coalesced
    }

    fn transition(&mut self, to: MonitorState) {
        tasks_info!("(transition) {} -> {}.", self.state, to);
        self.state = to;
    }

    fn invalid(&self, event: &'static str) -> MonitorError {
        tasks_warn!("(monitor) cannot {} while {}.", event, self.state);
        MonitorError::InvalidTransition {
            from: self.state,
            event,
        }
    }

    /// Start following `plan`.
    ///
    /// Accepted when idle or after a failed replan.
    pub fn activate(&mut self, plan: RoutePlan, priority: Priority) -> Result<Arc<RoutePlan>, MonitorError> {
        match self.state {
            MonitorState::Idle | MonitorState::ManualInterventionRequired => {
                let plan = Arc::new(plan);
                if let Some(previous) = self.active.replace(plan.clone()) {
                    self.history.push(previous);
                }
                self.priority = priority;
                self.transition(MonitorState::Active);
                Ok(plan)
            }
            _ => Err(self.invalid("activate a route")),
        }
    }

    /// Handle a trigger.
    ///
    /// Returns `true` when a stale check should now run and `false`
    /// when the trigger was coalesced into one already under way.
    pub fn on_trigger(&mut self, trigger: Trigger) -> Result<bool, MonitorError> {
        match self.state {
            MonitorState::Active => {
                tasks_debug!("(on_trigger) {:?}.", trigger);
                self.transition(MonitorState::StaleCheck);
                Ok(true)
            }
            MonitorState::StaleCheck | MonitorState::Replanning => {
                self.coalesced += 1;
                tasks_debug!(
                    "(on_trigger) {:?} coalesced while {} ({} so far).",
                    trigger,
                    self.state,
                    self.coalesced
                );
                Ok(false)
            }
            _ => Err(self.invalid("check the route")),
        }
    }

    /// Compare the active route with the current fields for a vessel
    /// at `fix`.
    pub fn inspect(
        &self,
        router: &Router,
        vessel: &VesselProfile,
        fields: &FieldSnapshot,
        fix: &VesselFix,
        calibration: Option<&PerformanceCalibration>,
    ) -> Result<StaleReview, MonitorError> {
        let plan = self.active.as_ref().ok_or(MonitorError::NoActiveRoute)?;
        let route = &plan.route;
        let next = fix.next_waypoint.clamp(1, route.waypoints.len() - 1);
        let config = router.config();

        let mut estimator =
            EtaEstimator::new(config, router.model().as_ref(), vessel, &fields.weather);
        if let Some(calibration) = calibration {
            estimator = estimator.with_calibration(calibration);
        }
        let estimate = estimator.estimate_from(route, &fix.position, fix.time, next);

        let recomputed_eta = estimate
            .record_for(next)
            .map(|r| r.eta)
            .ok_or(MonitorError::NoActiveRoute)?;
        let planned_eta = route.waypoints[next].eta.unwrap_or(recomputed_eta);

        let ctx = TransitContext {
            sphere: *router.sphere(),
            model: router.model().as_ref(),
            vessel,
            weather: &fields.weather,
            thresholds: config.thresholds(),
        };

        let mut blocked_leg = None;
        let mut from = fix.position;
        let mut clock = fix.time;
        for (leg, waypoint) in route.waypoints[next..].iter().enumerate() {
            let to = waypoint.position;
            match screen_leg(&fields.hazards, router.sphere(), config, &from, &to) {
                LegVerdict::Blocked(reason) => {
                    blocked_leg = Some((leg, reason));
                    break;
                }
                LegVerdict::Incomplete => {
                    blocked_leg = Some((leg, "no hazard data for the leg".to_string()));
                    break;
                }
                LegVerdict::Open(_) => {}
            }

            let commanded = route.waypoints[next + leg - 1]
                .speed_kts
                .unwrap_or(vessel.service_speed_kts);
            let forecast = forecast_leg(&ctx, &from, &to, clock, commanded);
            if forecast.exceeds(&ctx.thresholds) {
                blocked_leg = Some((
                    leg,
                    format!(
                        "forecast {:.1} m waves, {:.0} kts wind",
                        forecast.max_wave_height_m, forecast.max_wind_speed_kts
                    ),
                ));
                break;
            }

            // the next leg is entered when this one arrives
            from = to;
            clock = estimate
                .record_for(next + leg)
                .map(|r| r.eta)
                .unwrap_or(clock);
        }

        Ok(StaleReview {
            next_waypoint: next,
            planned_eta,
            recomputed_eta,
            blocked_leg,
        })
    }

    /// Decide on a stale check.
    pub fn review(&mut self, review: &StaleReview) -> Result<ReviewOutcome, MonitorError> {
        if self.state != MonitorState::StaleCheck {
            return Err(self.invalid("review the route"));
        }

        let reason = if let Some((leg, reason)) = &review.blocked_leg {
            Some(ReplanReason::Blocked {
                leg: *leg,
                reason: reason.clone(),
            })
        } else if review.drift_hours() > self.drift_threshold_hours {
            Some(ReplanReason::EtaDrift {
                hours: review.drift_hours(),
            })
        } else {
            None
        };

        match reason {
            Some(reason) => {
                tasks_info!("(review) replanning: {:?}.", reason);
                self.pending = Some(reason.clone());
                self.transition(MonitorState::Replanning);
                Ok(ReviewOutcome::Replan(reason))
            }
            None => {
                tasks_debug!(
                    "(review) drift {:.2} h within {:.2} h.",
                    review.drift_hours(),
                    self.drift_threshold_hours
                );
                self.transition(MonitorState::Active);
                Ok(ReviewOutcome::Clear)
            }
        }
    }

    /// Take the single replan slot.
    pub fn begin_replan(&mut self) -> Result<ReplanJob, MonitorError> {
        if self.state != MonitorState::Replanning {
            return Err(self.invalid("start a replan"));
        }
        if self.job_out {
            return Err(MonitorError::ReplanInFlight);
        }

        let previous = self.active.clone().ok_or(MonitorError::NoActiveRoute)?;
        let reason = self
            .pending
            .clone()
            .unwrap_or(ReplanReason::EtaDrift { hours: 0.0 });
        self.job_out = true;

        Ok(ReplanJob {
            previous,
            reason,
            priority: self.priority,
        })
    }

    /// Release the replan slot with the result of the job.
    ///
    /// A new route becomes active. A cancelled or partial search keeps
    /// the current route active so the next check decides again. Any
    /// other failure needs an operator.
    pub fn complete_replan(
        &mut self,
        result: Result<RoutePlan, RouterError>,
    ) -> Result<Arc<RoutePlan>, MonitorError> {
        if self.state != MonitorState::Replanning || !self.job_out {
            return Err(self.invalid("complete a replan"));
        }
        self.job_out = false;
        self.pending = None;

        match result {
            Ok(plan) if !plan.partial => {
                let plan = Arc::new(plan);
                if let Some(previous) = self.active.replace(plan.clone()) {
                    tasks_info!(
                        "(complete_replan) route {} superseded by {}.",
                        previous.route.id,
                        plan.route.id
                    );
                    self.history.push(previous);
                }
                self.transition(MonitorState::Active);
                Ok(plan)
            }
            Ok(_) | Err(RouterError::Cancelled) => {
                tasks_warn!("(complete_replan) replan cancelled, keeping the current route.");
                self.transition(MonitorState::Active);
                Err(MonitorError::Router(RouterError::Cancelled))
            }
            Err(e) => {
                tasks_error!("(complete_replan) replan failed: {}", e);
                if let Some(previous) = self.active.take() {
                    self.history.push(previous);
                }
                self.transition(MonitorState::ManualInterventionRequired);
                Err(MonitorError::Router(e))
            }
        }
    }

    /// Run a whole replan on the current thread.
    pub fn replan(
        &mut self,
        router: &Router,
        vessel: &VesselProfile,
        fields: &FieldSnapshot,
        fix: &VesselFix,
        cancel: &CancellationToken,
    ) -> Result<Arc<RoutePlan>, MonitorError> {
        let job = self.begin_replan()?;
        let result = job.run(router, vessel, fields, fix, cancel);
        self.complete_replan(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::hazard::{Coverage, HazardField, HazardGeometry, HazardLayers};
    use crate::router::vessel::AnalyticModel;
    use crate::router::weather::{Conditions, WeatherField, WeatherSample};
    use crate::test_util::{calm_weather, departure, los_angeles, pos, sample_vessel, san_francisco};
    use chrono::Duration;

    fn router() -> Router {
        let config = EngineConfig::default();
        let model = AnalyticModel::new(config.thresholds());
        Router::new(config, Arc::new(model)).unwrap()
    }

    fn fields(hazards: Vec<HazardGeometry>) -> FieldSnapshot {
        FieldSnapshot {
            version: 0,
            hazards: Arc::new(HazardField::new(
                HazardLayers {
                    layers: hazards,
                    coverage: Coverage::Worldwide,
                },
                &Default::default(),
            )),
            weather: Arc::new(calm_weather(departure())),
            published_at: departure(),
        }
    }

    fn plan(router: &Router, fields: &FieldSnapshot) -> RoutePlan {
        router
            .optimize(
                &VoyageRequest {
                    start: san_francisco(),
                    goal: los_angeles(),
                    departure: departure(),
                    priority: Priority::Balanced,
                },
                &sample_vessel(),
                &fields.hazards,
                &fields.weather,
                &CancellationToken::new(),
            )
            .unwrap()
    }

    fn review(drift_hours: i64, blocked_leg: Option<(usize, String)>) -> StaleReview {
        StaleReview {
            next_waypoint: 1,
            planned_eta: departure(),
            recomputed_eta: departure() + Duration::hours(drift_hours),
            blocked_leg,
        }
    }

    #[tokio::test]
    async fn test_transitions() {
        crate::get_log_handle().await;
        ut_info!("(test_transitions) start");

        let router = router();
        let fields = fields(vec![]);
        let mut monitor = VoyageMonitor::new(router.config());
        assert_eq!(monitor.state(), MonitorState::Idle);
        assert!(monitor.on_trigger(Trigger::Timer).is_err());

        monitor.activate(plan(&router, &fields), Priority::Balanced).unwrap();
        assert_eq!(monitor.state(), MonitorState::Active);
        assert!(matches!(
            monitor.activate(plan(&router, &fields), Priority::Balanced),
            Err(MonitorError::InvalidTransition { .. })
        ));

        assert!(monitor.on_trigger(Trigger::WeatherRefreshed).unwrap());
        assert_eq!(monitor.state(), MonitorState::StaleCheck);
        assert!(!monitor.on_trigger(Trigger::Timer).unwrap());
        assert_eq!(monitor.coalesced_triggers(), 1);

        assert_eq!(monitor.review(&review(1, None)).unwrap(), ReviewOutcome::Clear);
        assert_eq!(monitor.state(), MonitorState::Active);
        assert!(monitor.history().is_empty());

        ut_info!("(test_transitions) success");
    }

    #[test]
    fn test_drift_triggers_replan_with_new_route() {
        let router = router();
        let fields = fields(vec![]);
        let mut monitor = VoyageMonitor::new(router.config());
        let first = monitor
            .activate(plan(&router, &fields), Priority::Balanced)
            .unwrap();

        monitor.on_trigger(Trigger::Timer).unwrap();
        let outcome = monitor.review(&review(3, None)).unwrap();
        assert!(matches!(
            outcome,
            ReviewOutcome::Replan(ReplanReason::EtaDrift { hours }) if (hours - 3.0).abs() < 1e-9
        ));
        assert_eq!(monitor.state(), MonitorState::Replanning);

        // triggers during the replan are absorbed
        assert!(!monitor.on_trigger(Trigger::WeatherRefreshed).unwrap());

        let fix = VesselFix {
            position: first.route.waypoints[1].position,
            time: departure() + Duration::hours(3),
            next_waypoint: 2,
        };
        let job = monitor.begin_replan().unwrap();
        assert_eq!(monitor.begin_replan().unwrap_err(), MonitorError::ReplanInFlight);

        let result = job.run(&router, &sample_vessel(), &fields, &fix, &CancellationToken::new());
        let second = monitor.complete_replan(result).unwrap();

        assert_eq!(monitor.state(), MonitorState::Active);
        assert_ne!(first.route.id, second.route.id);
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.route.start(), &fix.position);
        assert_eq!(monitor.history().len(), 1);
        assert!(Arc::ptr_eq(&monitor.history()[0], &first));
        // the superseded route is untouched
        assert_eq!(first.route.start(), &san_francisco());
    }

    #[test]
    fn test_blocked_next_leg_takes_detour() {
        let router = router();
        let clear = fields(vec![]);
        let mut monitor = VoyageMonitor::new(router.config());
        let first = monitor
            .activate(plan(&router, &clear), Priority::Balanced)
            .unwrap();

        // a wreck reported on the leg ahead of the vessel
        let from = first.route.waypoints[1].position;
        let to = first.route.waypoints[2].position;
        let wreck = router.sphere().intermediate_point(&from, &to, 0.5);
        let fouled = fields(vec![HazardGeometry::PointHazard {
            name: "wreck".to_string(),
            position: wreck,
            buffer_nm: 1.0,
        }]);

        let fix = VesselFix {
            position: from,
            time: first.route.waypoints[1].eta.unwrap(),
            next_waypoint: 2,
        };
        let review = monitor
            .inspect(&router, &sample_vessel(), &fouled, &fix, None)
            .unwrap();
        assert!(matches!(review.blocked_leg, Some((0, _))));
        assert!(review.drift_hours() < 0.1);

        monitor.on_trigger(Trigger::Timer).unwrap();
        monitor.review(&review).unwrap();
        let second = monitor
            .replan(&router, &sample_vessel(), &fouled, &fix, &CancellationToken::new())
            .unwrap();

        assert_eq!(second.route.start(), &from);
        assert_eq!(second.route.end(), first.route.end());
        for (a, b) in second.route.legs() {
            assert!(fouled.hazards.blocking_hazards(a, b).is_empty());
        }
    }

    /// Seas build to 6 m east of 120.5 W from five hours after
    /// departure.
    fn building_storm() -> WeatherField {
        let mut samples = vec![];
        for hours in [0, 4, 5, 48] {
            for i in 0..=4 {
                for j in 0..=10 {
                    let position = pos(35.0 + i as f64 * 0.5, -124.0 + j as f64 * 0.5);
                    let storm = hours >= 5 && position.longitude() >= -120.5;
                    samples.push(WeatherSample {
                        position,
                        time: departure() + Duration::hours(hours),
                        conditions: Conditions {
                            wind_speed_kts: 10.0,
                            wave_height_m: if storm { 6.0 } else { 1.0 },
                            ..Conditions::calm()
                        },
                        stale: false,
                    });
                }
            }
        }
        WeatherField::new(samples, Duration::hours(72))
    }

    #[test]
    fn test_later_legs_are_checked_at_their_own_time() {
        let router = router();
        let clear = fields(vec![]);
        let points = [pos(36.0, -123.0), pos(36.0, -121.0), pos(36.0, -120.0)];
        let plan = router
            .plan_through(
                &points,
                departure(),
                Priority::Balanced,
                &sample_vessel(),
                &clear.hazards,
                &clear.weather,
            )
            .unwrap();

        let mut monitor = VoyageMonitor::new(router.config());
        monitor.activate(plan, Priority::Balanced).unwrap();

        let stormy = FieldSnapshot {
            version: 1,
            weather: Arc::new(building_storm()),
            ..clear
        };
        // still at the first waypoint, the storm is hours away
        let fix = VesselFix {
            position: points[0],
            time: departure(),
            next_waypoint: 1,
        };

        let review = monitor
            .inspect(&router, &sample_vessel(), &stormy, &fix, None)
            .unwrap();
        match &review.blocked_leg {
            Some((1, reason)) => assert!(reason.contains("6.0 m"), "{reason}"),
            other => panic!("unexpected blocked leg {other:?}"),
        }

        monitor.on_trigger(Trigger::WeatherRefreshed).unwrap();
        assert!(matches!(
            monitor.review(&review).unwrap(),
            ReviewOutcome::Replan(ReplanReason::Blocked { leg: 1, .. })
        ));
        assert_eq!(monitor.state(), MonitorState::Replanning);
    }

    #[test]
    fn test_no_feasible_replan_needs_operator() {
        let router = router();
        let clear = fields(vec![]);
        let mut monitor = VoyageMonitor::new(router.config());
        let first = monitor
            .activate(plan(&router, &clear), Priority::Balanced)
            .unwrap();

        // the destination is now inside a closed area
        let closed = fields(vec![HazardGeometry::Restricted {
            name: "port closure".to_string(),
            polygon: vec![
                pos(33.5, -118.8),
                pos(33.5, -117.8),
                pos(34.5, -117.8),
                pos(34.5, -118.8),
                pos(33.5, -118.8),
            ],
        }]);
        let fix = VesselFix {
            position: first.route.waypoints[1].position,
            time: first.route.waypoints[1].eta.unwrap(),
            next_waypoint: 2,
        };

        monitor.on_trigger(Trigger::WeatherRefreshed).unwrap();
        monitor.review(&review(3, None)).unwrap();
        let result = monitor.replan(&router, &sample_vessel(), &closed, &fix, &CancellationToken::new());

        assert!(matches!(
            result,
            Err(MonitorError::Router(RouterError::NoFeasibleRoute { .. }))
        ));
        assert_eq!(monitor.state(), MonitorState::ManualInterventionRequired);
        assert!(monitor.active_route().is_none());
        assert_eq!(monitor.history().len(), 1);
        assert!(monitor.on_trigger(Trigger::Timer).is_err());

        // an operator supplied route resumes monitoring
        monitor
            .activate(plan(&router, &clear), Priority::Safety)
            .unwrap();
        assert_eq!(monitor.state(), MonitorState::Active);
    }

    #[test]
    fn test_cancelled_replan_keeps_route() {
        let router = router();
        let fields = fields(vec![]);
        let mut monitor = VoyageMonitor::new(router.config());
        let first = monitor
            .activate(plan(&router, &fields), Priority::Balanced)
            .unwrap();

        monitor.on_trigger(Trigger::Timer).unwrap();
        monitor.review(&review(3, None)).unwrap();
        monitor.begin_replan().unwrap();
        let result = monitor.complete_replan(Err(RouterError::Cancelled));

        assert_eq!(result.unwrap_err(), MonitorError::Router(RouterError::Cancelled));
        assert_eq!(monitor.state(), MonitorState::Active);
        assert!(Arc::ptr_eq(monitor.active_route().unwrap(), &first));
    }
}
