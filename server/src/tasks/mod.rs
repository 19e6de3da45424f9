//! Background voyage supervision.
//! Each active voyage runs a [`voyage_loop`] that rechecks its route on a
//! timer and on every field refresh, replanning when it drifts.

#[macro_use]
pub mod macros;
pub mod monitor;
pub mod snapshot;

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::router::eta::PerformanceCalibration;
use crate::router::router_types::route::RoutePlan;
use crate::router::router_types::router::engine::Router;
use crate::router::vessel::VesselProfile;
use crate::router::RouterError;
use monitor::{MonitorError, MonitorState, ReviewOutcome, Trigger, VesselFix, VoyageMonitor};
use snapshot::FieldSnapshot;

/// Progress reported by a voyage loop.
#[derive(Debug, Clone, PartialEq)]
pub struct VoyageStatus {
    /// Monitor state
    pub state: MonitorState,
    /// Route currently followed
    pub route: Option<Arc<RoutePlan>>,
    /// Replans completed so far
    pub replans: usize,
}

/// Shared inputs of one voyage loop.
#[derive(Debug, Clone)]
pub struct VoyageContext {
    /// Route search engine
    pub router: Arc<Router>,
    /// The vessel
    pub vessel: Arc<VesselProfile>,
    /// Optional actual-vs-predicted record of the vessel
    pub calibration: Option<Arc<PerformanceCalibration>>,
    /// Published field snapshots
    pub fields: watch::Receiver<Arc<FieldSnapshot>>,
    /// Latest vessel fix
    pub fixes: watch::Receiver<VesselFix>,
    /// Where the loop reports progress
    pub status: watch::Sender<VoyageStatus>,
}

type InFlight = (JoinHandle<Result<RoutePlan, RouterError>>, CancellationToken);

fn report(ctx: &VoyageContext, monitor: &VoyageMonitor, replans: usize) {
    ctx.status.send_replace(VoyageStatus {
        state: monitor.state(),
        route: monitor.active_route().cloned(),
        replans,
    });
}

/// Run one stale check and, when needed, spawn the replan on a
/// blocking thread.
fn check(
    ctx: &VoyageContext,
    monitor: &mut VoyageMonitor,
    trigger: Trigger,
    cancel: &CancellationToken,
) -> Option<InFlight> {
    match monitor.on_trigger(trigger) {
        Ok(true) => (),
        Ok(false) => return None,
        Err(e) => {
            tasks_warn!("(check) {}", e);
            return None;
        }
    }

    let fields = ctx.fields.borrow().clone();
    let fix = *ctx.fixes.borrow();
    let review = match monitor.inspect(
        &ctx.router,
        &ctx.vessel,
        &fields,
        &fix,
        ctx.calibration.as_deref(),
    ) {
        Ok(review) => review,
        Err(e) => {
            tasks_error!("(check) could not inspect the route: {}", e);
            return None;
        }
    };

    match monitor.review(&review) {
        Ok(ReviewOutcome::Clear) => None,
        Ok(ReviewOutcome::Replan(_)) => {
            let job = match monitor.begin_replan() {
                Ok(job) => job,
                Err(e) => {
                    tasks_warn!("(check) {}", e);
                    return None;
                }
            };

            let token = cancel.child_token();
            let search_token = token.clone();
            let router = ctx.router.clone();
            let vessel = ctx.vessel.clone();
            tasks_info!(
                "(check) replanning from snapshot {} ({:?}).",
                fields.version,
                job.reason
            );
            let handle = tokio::task::spawn_blocking(move || {
                job.run(&router, &vessel, &fields, &fix, &search_token)
            });
            Some((handle, token))
        }
        Err(e) => {
            tasks_warn!("(check) {}", e);
            None
        }
    }
}

/// Supervise one voyage until `cancel` fires or the voyage needs an
/// operator.
///
/// Rechecks the active route every `replan_interval_hours` and on every
/// published field snapshot. At most one replan runs at a time; triggers
/// arriving meanwhile are coalesced by the monitor. Returns the monitor
/// so the caller can inspect its history.
pub async fn voyage_loop(
    mut monitor: VoyageMonitor,
    mut ctx: VoyageContext,
    cancel: CancellationToken,
) -> VoyageMonitor {
    tasks_info!("(voyage_loop) Start.");

    let period = std::time::Duration::from_secs_f64(
        ctx.router.config().replan_interval_hours * 3600.0,
    );
    let mut timer = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    let mut in_flight: Option<InFlight> = None;
    let mut replans = 0;
    report(&ctx, &monitor, replans);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                if let Some((_, token)) = in_flight.take() {
                    token.cancel();
                }
                break;
            }
            _ = timer.tick() => {
                if let Some(job) = check(&ctx, &mut monitor, Trigger::Timer, &cancel) {
                    in_flight = Some(job);
                }
            }
            changed = ctx.fields.changed() => {
                if changed.is_err() {
                    tasks_warn!("(voyage_loop) field publisher dropped.");
                    break;
                }
                if let Some(job) = check(&ctx, &mut monitor, Trigger::WeatherRefreshed, &cancel) {
                    in_flight = Some(job);
                }
            }
            joined = async {
                match in_flight.as_mut() {
                    Some((handle, _)) => handle.await,
                    None => std::future::pending().await,
                }
            }, if in_flight.is_some() => {
                in_flight = None;
                let result = joined.unwrap_or_else(|e| {
                    tasks_error!("(voyage_loop) replan task failed: {}", e);
                    Err(RouterError::Cancelled)
                });

                match monitor.complete_replan(result) {
                    Ok(plan) => {
                        replans += 1;
                        tasks_info!("(voyage_loop) now following route {}.", plan.route.id);
                    }
                    Err(MonitorError::Router(RouterError::Cancelled)) => (),
                    Err(e) => tasks_error!("(voyage_loop) {}", e),
                }
            }
        }

        report(&ctx, &monitor, replans);
        if monitor.state() == MonitorState::ManualInterventionRequired {
            tasks_error!("(voyage_loop) manual intervention required, stopping.");
            break;
        }
    }

    report(&ctx, &monitor, replans);
    tasks_info!("(voyage_loop) Stop.");
    monitor
}
