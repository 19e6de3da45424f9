//! The core of the router library.
//!
//! The engine module lays a lattice between the start and the goal,
//! screens its edges against the static hazards and then runs a
//! time-expanded label-setting search over it. A label is a
//! (node, arrival time) state: the cost of leaving a node depends on
//! when the vessel gets there because weather is sampled at the expected
//! transit time of every leg.

/// The router engine module.
pub mod engine {
    use chrono::{DateTime, Utc};
    use ordered_float::OrderedFloat;
    use petgraph::{graph::NodeIndex, stable_graph::StableDiGraph, visit::EdgeRef};
    use std::cmp::Reverse;
    use std::collections::{BinaryHeap, HashMap};
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    use crate::config::EngineConfig;
    use crate::router::hazard::{squat_m, under_keel_clearance, HazardField};
    use crate::router::router_types::{
        edge::Edge,
        location::Position,
        node::Node,
        route::{
            CostWeights, Priority, Route, RouteCostBreakdown, RoutePlan, SegmentExposure, VoyageRequest,
            Waypoint, WAYPOINT_COINCIDENCE_NM,
        },
    };
    use crate::router::router_utils::{
        geodesy::{normalize_bearing, Sphere},
        graph::{build_edges, build_lattice, screen_leg, LegVerdict, ScreeningReport},
        transit::{forecast_leg, LegForecast, TransitContext},
    };
    use crate::router::vessel::{PerformanceModel, VesselProfile};
    use crate::router::weather::WeatherField;
    use crate::router::{PlanWarning, RouterError};

    /// Non-dominated labels kept per lattice node.
    const MAX_LABELS_PER_NODE: usize = 8;

    /// Why a leg was turned down at a given speed.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub enum LegRejection {
        /// Charted depth leaves too little water under the keel.
        KeelClearance,
        /// Forecast sea state crosses a hard threshold.
        SeaState,
    }

    /// Outcome of a bounded local detour.
    #[derive(Debug, Clone, PartialEq)]
    pub enum DetourOutcome {
        /// A detour within the deviation cap was found.
        Detour {
            /// Replacement for the blocked leg
            plan: RoutePlan,
            /// Course change used at the start of the leg, degrees
            deviation_deg: f64,
        },
        /// No detour fits inside the cap; a full search is required.
        FullReplanRequired {
            /// Why the local repair failed
            reason: String,
        },
    }

    /// One search state.
    #[derive(Debug, Clone)]
    struct Label {
        node: NodeIndex,
        arrival: DateTime<Utc>,
        cost: f64,
        hours: f64,
        fuel_t: f64,
        distance_nm: f64,
        min_margin: f64,
        safety_hours: f64,
        stale_legs: usize,
        parent: Option<usize>,
        leg: Option<LegForecast>,
        alive: bool,
    }

    impl Label {
        fn dominates(&self, other: &Label) -> bool {
            self.cost <= other.cost
                && self.arrival <= other.arrival
                && self.min_margin >= other.min_margin
        }
    }

    /// Rejection tallies for the failure message and the logs.
    #[derive(Debug, Default, Copy, Clone)]
    struct SearchStats {
        expanded: usize,
        keel_rejections: usize,
        sea_state_rejections: usize,
    }

    /// The route search engine.
    ///
    /// Holds configuration and the injected performance model. Fields
    /// are passed per call so each search runs against one consistent
    /// snapshot.
    #[derive(Debug, Clone)]
    pub struct Router {
        config: EngineConfig,
        sphere: Sphere,
        model: Arc<dyn PerformanceModel>,
    }

    impl Router {
        /// Creates a router.
        ///
        /// # Errors
        /// [`RouterError::InvalidConfiguration`] if `config` fails
        /// validation.
        pub fn new(config: EngineConfig, model: Arc<dyn PerformanceModel>) -> Result<Self, RouterError> {
            config.validate()?;
            Ok(Router {
                sphere: config.sphere(),
                config,
                model,
            })
        }

        /// Engine configuration.
        pub fn config(&self) -> &EngineConfig {
            &self.config
        }

        /// Earth model used by this router.
        pub fn sphere(&self) -> &Sphere {
            &self.sphere
        }

        /// Performance model used by this router.
        pub fn model(&self) -> &Arc<dyn PerformanceModel> {
            &self.model
        }

        fn transit_context<'a>(
            &'a self,
            vessel: &'a VesselProfile,
            weather: &'a WeatherField,
        ) -> TransitContext<'a> {
            TransitContext {
                sphere: self.sphere,
                model: self.model.as_ref(),
                vessel,
                weather,
                thresholds: self.config.thresholds(),
            }
        }

        /// Evaluate one leg entered at `depart_at` with a commanded
        /// speed, applying the speed-dependent hard constraints.
        ///
        /// Returns the weighted leg cost and the forecast.
        #[allow(clippy::too_many_arguments)]
        pub fn evaluate_leg(
            &self,
            ctx: &TransitContext,
            edge: &Edge,
            from: &Position,
            to: &Position,
            depart_at: DateTime<Utc>,
            commanded_speed_kts: f64,
            weights: &CostWeights,
        ) -> Result<(f64, LegForecast), LegRejection> {
            if let Some(depth) = edge.min_depth_m {
                let draft = if ctx.vessel.draft_m > 0.0 {
                    ctx.vessel.draft_m
                } else {
                    self.config.default_draft_m
                };
                let squat = if self.config.apply_squat {
                    squat_m(ctx.vessel.block_coefficient, commanded_speed_kts, depth, draft)
                } else {
                    0.0
                };
                if under_keel_clearance(depth, draft, squat) < self.config.ukc_margin_m {
                    return Err(LegRejection::KeelClearance);
                }
            }

            let forecast = forecast_leg(ctx, from, to, depart_at, commanded_speed_kts);
            if forecast.exceeds(&ctx.thresholds) {
                return Err(LegRejection::SeaState);
            }

            let service_fuel_tph = ctx.vessel.service_fuel_tph().max(f64::EPSILON);
            let mut cost = weights.time * forecast.hours
                + weights.fuel * forecast.fuel_t / service_fuel_tph
                + weights.safety * (1.0 - forecast.safety_margin).max(0.0) * forecast.hours;
            if edge.tss_penalized {
                cost += self.config.tss_penalty;
            }

            Ok((cost, forecast))
        }

        /// Cheapest speed for a single leg, or the last rejection.
        fn best_speed(
            &self,
            ctx: &TransitContext,
            edge: &Edge,
            from: &Position,
            to: &Position,
            depart_at: DateTime<Utc>,
            weights: &CostWeights,
        ) -> Result<(f64, LegForecast), LegRejection> {
            let mut best: Option<(f64, LegForecast)> = None;
            let mut rejection = LegRejection::SeaState;
            for fraction in &self.config.speed_fractions {
                let commanded = fraction * ctx.vessel.max_speed_kts;
                match self.evaluate_leg(ctx, edge, from, to, depart_at, commanded, weights) {
                    Ok((cost, forecast)) => {
                        if best.as_ref().map_or(true, |(b, _)| cost < *b) {
                            best = Some((cost, forecast));
                        }
                    }
                    Err(e) => rejection = e,
                }
            }

            best.ok_or(rejection)
        }

        /// Find the best route from `request.start` to `request.goal`.
        ///
        /// Every hard constraint (land, offing, restricted areas, point
        /// hazards, enforced traffic separation, under-keel clearance and
        /// the sea-state thresholds) rejects a leg outright. Among the
        /// remaining routes the lowest weighted cost wins; routes within
        /// the tie-break epsilon of the best are decided by their
        /// minimum safety margin.
        ///
        /// Cancelling `cancel` stops the search and returns the best
        /// route found so far, tagged partial.
        ///
        /// # Errors
        /// * [`RouterError::NoFeasibleRoute`] when every path violates a
        ///   hard constraint.
        /// * [`RouterError::Cancelled`] when cancelled before any leg was
        ///   explored.
        /// * [`RouterError::InvalidRoute`] when start and goal coincide.
        /// * [`RouterError::InvalidVessel`] when the vessel particulars
        ///   are unusable.
        pub fn optimize(
            &self,
            request: &VoyageRequest,
            vessel: &VesselProfile,
            hazards: &HazardField,
            weather: &WeatherField,
            cancel: &CancellationToken,
        ) -> Result<RoutePlan, RouterError> {
            vessel.validate()?;
            let great_circle_nm = self.sphere.distance(&request.start, &request.goal);
            if great_circle_nm < WAYPOINT_COINCIDENCE_NM {
                return Err(RouterError::InvalidRoute {
                    reason: "start and goal coincide".to_string(),
                });
            }

            router_info!(
                "(optimize) [1/4] Building the lattice for a {:.1} nm voyage ({:?} priority)...",
                great_circle_nm,
                request.priority
            );
            let lattice = build_lattice(&self.sphere, &self.config, &request.start, &request.goal);

            router_info!("(optimize) [2/4] Screening edges...");
            let (edges, report) = build_edges(
                &lattice,
                hazards,
                &self.sphere,
                &self.config,
                self.config.search_workers,
            );

            router_info!("(optimize) [3/4] Building the graph...");
            let mut graph: StableDiGraph<&Node, Edge> = StableDiGraph::new();
            let node_indices: Vec<NodeIndex> =
                lattice.nodes.iter().map(|node| graph.add_node(node)).collect();
            for (from, to, edge) in edges {
                graph.add_edge(node_indices[from], node_indices[to], edge);
            }
            router_debug!(
                "(optimize) {} nodes, {} edges ({} blocked, {} without hazard data).",
                graph.node_count(),
                graph.edge_count(),
                report.blocked,
                report.incomplete
            );

            router_info!("(optimize) [4/4] Searching...");
            let start = node_indices[lattice.start()];
            let goal = node_indices[lattice.goal()];
            let ctx = self.transit_context(vessel, weather);
            let weights = request.priority.weights();

            let mut labels = vec![Label {
                node: start,
                arrival: request.departure,
                cost: 0.0,
                hours: 0.0,
                fuel_t: 0.0,
                distance_nm: 0.0,
                min_margin: 1.0,
                safety_hours: 0.0,
                stale_legs: 0,
                parent: None,
                leg: None,
                alive: true,
            }];
            let mut fronts: HashMap<NodeIndex, Vec<usize>> = HashMap::from([(start, vec![0])]);
            let mut heap = BinaryHeap::from([Reverse((OrderedFloat(0.0), 0usize))]);
            let mut goal_labels: Vec<usize> = vec![];
            let mut stats = SearchStats::default();
            let mut cancelled = false;

            while let Some(Reverse((OrderedFloat(cost), index))) = heap.pop() {
                if cancel.is_cancelled() {
                    cancelled = true;
                    break;
                }

                if !labels[index].alive {
                    continue;
                }

                if let Some(best) = goal_labels.first() {
                    if cost > labels[*best].cost * (1.0 + self.config.tie_break_epsilon) {
                        break;
                    }
                }

                let node = labels[index].node;
                if node == goal {
                    goal_labels.push(index);
                    continue;
                }

                stats.expanded += 1;
                let from = graph[node].position;
                let departure = labels[index].arrival;

                let outgoing: Vec<(NodeIndex, Edge)> = graph
                    .edges(node)
                    .map(|e| (e.target(), e.weight().clone()))
                    .collect();

                for (target, edge) in outgoing {
                    let to = graph[target].position;
                    for fraction in &self.config.speed_fractions {
                        let commanded = fraction * vessel.max_speed_kts;
                        let (leg_cost, forecast) = match self.evaluate_leg(
                            &ctx, &edge, &from, &to, departure, commanded, &weights,
                        ) {
                            Ok(result) => result,
                            Err(LegRejection::KeelClearance) => {
                                stats.keel_rejections += 1;
                                continue;
                            }
                            Err(LegRejection::SeaState) => {
                                stats.sea_state_rejections += 1;
                                continue;
                            }
                        };

                        let parent = &labels[index];
                        let candidate = Label {
                            node: target,
                            arrival: forecast.arrival,
                            cost: parent.cost + leg_cost,
                            hours: parent.hours + forecast.hours,
                            fuel_t: parent.fuel_t + forecast.fuel_t,
                            distance_nm: parent.distance_nm + forecast.distance_nm,
                            min_margin: parent.min_margin.min(forecast.safety_margin),
                            safety_hours: parent.safety_hours
                                + forecast.safety_scalar * forecast.hours,
                            stale_legs: parent.stale_legs + usize::from(forecast.stale),
                            parent: Some(index),
                            leg: Some(forecast),
                            alive: true,
                        };

                        if let Some(new_index) = Self::insert_label(&mut labels, &mut fronts, candidate) {
                            heap.push(Reverse((OrderedFloat(labels[new_index].cost), new_index)));
                        }
                    }
                }
            }

            router_debug!(
                "(optimize) expanded {} labels, {} leg(s) rejected for under-keel clearance, {} for sea state.",
                stats.expanded,
                stats.keel_rejections,
                stats.sea_state_rejections
            );

            let chosen = match self.choose_goal_label(&labels, &goal_labels) {
                Some(index) => index,
                None if cancelled => {
                    match self.best_explored_label(&labels, &graph, &request.goal) {
                        Some(index) => index,
                        None => {
                            router_warn!("(optimize) cancelled before any leg was explored.");
                            return Err(RouterError::Cancelled);
                        }
                    }
                }
                None => {
                    let reason = format!(
                        "goal unreachable: {} lattice edge(s) blocked by hazards, {} without hazard data, {} leg(s) rejected for under-keel clearance, {} for sea state",
                        report.blocked,
                        report.incomplete,
                        stats.keel_rejections,
                        stats.sea_state_rejections
                    );
                    router_warn!("(optimize) {}", reason);
                    return Err(RouterError::NoFeasibleRoute { reason });
                }
            };

            if cancelled {
                router_warn!("(optimize) search cancelled, returning the best route found so far.");
            }

            let plan = self.build_plan(&labels, chosen, &graph, great_circle_nm, &report, cancelled)?;
            router_info!(
                "(optimize) Done. {} waypoints, {:.1} nm, {:.1} h, {:.1} t fuel, cost {:.3}.",
                plan.route.waypoints.len(),
                plan.cost.distance_nm,
                plan.cost.duration_hours,
                plan.cost.fuel_t,
                plan.cost.weighted_cost
            );

            Ok(plan)
        }

        /// Add a label to its node's front unless it is dominated.
        ///
        /// Labels it dominates, and the costliest label when the front is
        /// full, are retired.
        fn insert_label(
            labels: &mut Vec<Label>,
            fronts: &mut HashMap<NodeIndex, Vec<usize>>,
            candidate: Label,
        ) -> Option<usize> {
            let front = fronts.entry(candidate.node).or_default();
            if front.iter().any(|i| labels[*i].dominates(&candidate)) {
                return None;
            }

            front.retain(|i| {
                if candidate.dominates(&labels[*i]) {
                    labels[*i].alive = false;
                    false
                } else {
                    true
                }
            });

            if front.len() >= MAX_LABELS_PER_NODE {
                let worst = front
                    .iter()
                    .enumerate()
                    .max_by(|a, b| labels[*a.1].cost.total_cmp(&labels[*b.1].cost))
                    .map(|(position, index)| (position, *index));
                match worst {
                    Some((position, index)) if labels[index].cost > candidate.cost => {
                        labels[index].alive = false;
                        front.swap_remove(position);
                    }
                    _ => return None,
                }
            }

            let index = labels.len();
            labels.push(candidate);
            front.push(index);
            Some(index)
        }

        /// Apply the tie-break rule to the labels that reached the goal.
        fn choose_goal_label(&self, labels: &[Label], goal_labels: &[usize]) -> Option<usize> {
            let best_cost = goal_labels
                .iter()
                .map(|i| labels[*i].cost)
                .min_by(|a, b| a.total_cmp(b))?;
            let window = best_cost * (1.0 + self.config.tie_break_epsilon);

            goal_labels
                .iter()
                .copied()
                .filter(|i| labels[*i].cost <= window)
                .min_by(|a, b| {
                    let (a, b) = (&labels[*a], &labels[*b]);
                    b.min_margin
                        .total_cmp(&a.min_margin)
                        .then(a.cost.total_cmp(&b.cost))
                })
        }

        /// The explored label closest to the goal, used for partial
        /// results.
        fn best_explored_label(
            &self,
            labels: &[Label],
            graph: &StableDiGraph<&Node, Edge>,
            goal: &Position,
        ) -> Option<usize> {
            labels
                .iter()
                .enumerate()
                .filter(|(_, label)| label.alive && label.parent.is_some())
                .min_by(|(_, a), (_, b)| {
                    let da = self.sphere.distance(&graph[a.node].position, goal);
                    let db = self.sphere.distance(&graph[b.node].position, goal);
                    da.total_cmp(&db).then(a.cost.total_cmp(&b.cost))
                })
                .map(|(index, _)| index)
        }

        fn build_plan(
            &self,
            labels: &[Label],
            chosen: usize,
            graph: &StableDiGraph<&Node, Edge>,
            great_circle_nm: f64,
            report: &ScreeningReport,
            partial: bool,
        ) -> Result<RoutePlan, RouterError> {
            let mut chain = vec![];
            let mut cursor = Some(chosen);
            while let Some(index) = cursor {
                chain.push(&labels[index]);
                cursor = labels[index].parent;
            }
            chain.reverse();

            let mut waypoints = Vec::with_capacity(chain.len());
            let mut segments = vec![];
            for (i, label) in chain.iter().enumerate() {
                let outgoing = chain.get(i + 1).and_then(|next| next.leg.as_ref());
                waypoints.push(Waypoint {
                    position: graph[label.node].position,
                    eta: Some(label.arrival),
                    course_deg: outgoing.map(|leg| leg.course_deg),
                    speed_kts: outgoing.map(|leg| leg.commanded_speed_kts),
                    distance_from_start_nm: label.distance_nm,
                });

                if let Some(leg) = outgoing {
                    segments.push(SegmentExposure {
                        from_waypoint: i,
                        max_wave_height_m: leg.max_wave_height_m,
                        max_wind_speed_kts: leg.max_wind_speed_kts,
                        safety_margin: leg.safety_margin,
                        stale: leg.stale,
                    });
                }
            }

            let last = &labels[chosen];
            let cost = RouteCostBreakdown {
                distance_nm: last.distance_nm,
                duration_hours: last.hours,
                fuel_t: last.fuel_t,
                safety_score: if last.hours > 0.0 {
                    last.safety_hours / last.hours
                } else {
                    1.0
                },
                min_safety_margin: last.min_margin,
                weighted_cost: last.cost,
                great_circle_nm,
                segments,
            };

            let mut warnings = vec![];
            if last.stale_legs > 0 {
                router_warn!(
                    "(optimize) {} leg(s) planned on extrapolated weather.",
                    last.stale_legs
                );
                warnings.push(PlanWarning::DegradedWeatherCoverage {
                    stale_segments: last.stale_legs,
                });
            }
            if report.incomplete > 0 {
                warnings.push(PlanWarning::HazardDataIncomplete {
                    skipped_edges: report.incomplete,
                });
            }
            if partial {
                warnings.push(PlanWarning::PartialResult);
            }

            Ok(RoutePlan {
                route: Route::new(waypoints, &self.sphere)?,
                cost,
                warnings,
                partial,
            })
        }

        /// Replan one blocked leg with a single intermediate waypoint,
        /// turning at most `max_deviation_deg` off the original course.
        ///
        /// Deviations of one, two and three thirds of the cap are tried
        /// on both sides, smallest first. The direct leg is returned
        /// unchanged when it is not actually blocked.
        ///
        /// # Errors
        /// [`RouterError::InvalidRoute`] if the leg endpoints coincide.
        pub fn plan_detour(
            &self,
            request: &VoyageRequest,
            vessel: &VesselProfile,
            hazards: &HazardField,
            weather: &WeatherField,
        ) -> Result<DetourOutcome, RouterError> {
            vessel.validate()?;
            let (from, to) = (request.start, request.goal);
            let distance = self.sphere.distance(&from, &to);
            if distance < WAYPOINT_COINCIDENCE_NM {
                return Err(RouterError::InvalidRoute {
                    reason: "detour endpoints coincide".to_string(),
                });
            }

            let ctx = self.transit_context(vessel, weather);
            let weights = request.priority.weights();
            let course = self.sphere.initial_bearing(&from, &to);

            if let Some(legs) = self.try_legs(&ctx, hazards, &[from, to], request.departure, &weights) {
                return Ok(DetourOutcome::Detour {
                    plan: self.plan_from_legs(legs, &[from, to], distance, request.departure)?,
                    deviation_deg: 0.0,
                });
            }

            let cap = self.config.max_deviation_deg.min(89.0);
            for step in 1..=3 {
                let deviation = cap * step as f64 / 3.0;
                let reach = distance / 2.0 / deviation.to_radians().cos();

                let mut best: Option<(f64, Vec<(f64, LegForecast)>, [Position; 3])> = None;
                for side in [1.0, -1.0] {
                    let turn = self.sphere.destination(
                        &from,
                        normalize_bearing(course + side * deviation),
                        reach,
                    );
                    let points = [from, turn, to];
                    let Some(legs) = self.try_legs(&ctx, hazards, &points, request.departure, &weights) else {
                        continue;
                    };
                    let cost: f64 = legs.iter().map(|(c, _)| c).sum();
                    if best.as_ref().map_or(true, |(b, _, _)| cost < *b) {
                        best = Some((cost, legs, points));
                    }
                }

                if let Some((_, legs, points)) = best {
                    router_info!("(plan_detour) detour found at {:.1} degrees.", deviation);
                    return Ok(DetourOutcome::Detour {
                        plan: self.plan_from_legs(legs, &points, distance, request.departure)?,
                        deviation_deg: deviation,
                    });
                }
            }

            let reason = format!(
                "no detour within {:.1} degrees of the original course",
                self.config.max_deviation_deg
            );
            router_info!("(plan_detour) {}", reason);
            Ok(DetourOutcome::FullReplanRequired { reason })
        }

        /// Plan a route through fixed points, sailing each leg at its
        /// cheapest feasible speed.
        ///
        /// # Errors
        /// * [`RouterError::InvalidRoute`] with fewer than two points.
        /// * [`RouterError::NoFeasibleRoute`] when any leg is blocked or
        ///   unsafe at every speed.
        pub fn plan_through(
            &self,
            points: &[Position],
            departure: DateTime<Utc>,
            priority: Priority,
            vessel: &VesselProfile,
            hazards: &HazardField,
            weather: &WeatherField,
        ) -> Result<RoutePlan, RouterError> {
            vessel.validate()?;
            let (Some(first), Some(last)) = (points.first(), points.last()) else {
                return Err(RouterError::InvalidRoute {
                    reason: "no points to plan through".to_string(),
                });
            };

            let ctx = self.transit_context(vessel, weather);
            let legs = self
                .try_legs(&ctx, hazards, points, departure, &priority.weights())
                .ok_or_else(|| RouterError::NoFeasibleRoute {
                    reason: "a leg through the given points is blocked or unsafe".to_string(),
                })?;

            self.plan_from_legs(legs, points, self.sphere.distance(first, last), departure)
        }

        /// Screen and forecast consecutive legs through `points`,
        /// chaining arrival times.
        fn try_legs(
            &self,
            ctx: &TransitContext,
            hazards: &HazardField,
            points: &[Position],
            departure: DateTime<Utc>,
            weights: &CostWeights,
        ) -> Option<Vec<(f64, LegForecast)>> {
            let mut clock = departure;
            let mut legs = vec![];
            for pair in points.windows(2) {
                let LegVerdict::Open(edge) = screen_leg(hazards, &self.sphere, &self.config, &pair[0], &pair[1]) else {
                    return None;
                };
                let (cost, forecast) = self
                    .best_speed(ctx, &edge, &pair[0], &pair[1], clock, weights)
                    .ok()?;
                clock = forecast.arrival;
                legs.push((cost, forecast));
            }

            Some(legs)
        }

        fn plan_from_legs(
            &self,
            legs: Vec<(f64, LegForecast)>,
            points: &[Position],
            great_circle_nm: f64,
            departure: DateTime<Utc>,
        ) -> Result<RoutePlan, RouterError> {
            let mut waypoints = vec![];
            let mut segments = vec![];
            let mut clock = departure;
            let mut distance = 0.0;
            let (mut hours, mut fuel, mut safety_hours, mut cost) = (0.0, 0.0, 0.0, 0.0);
            let mut min_margin: f64 = 1.0;
            let mut stale = 0;

            for (i, position) in points.iter().enumerate() {
                let leg = legs.get(i).map(|(_, f)| f);
                waypoints.push(Waypoint {
                    position: *position,
                    eta: Some(clock),
                    course_deg: leg.map(|f| f.course_deg),
                    speed_kts: leg.map(|f| f.commanded_speed_kts),
                    distance_from_start_nm: distance,
                });

                if let Some((leg_cost, f)) = legs.get(i) {
                    clock = f.arrival;
                    distance += f.distance_nm;
                    hours += f.hours;
                    fuel += f.fuel_t;
                    safety_hours += f.safety_scalar * f.hours;
                    cost += leg_cost;
                    min_margin = min_margin.min(f.safety_margin);
                    stale += usize::from(f.stale);
                    segments.push(SegmentExposure {
                        from_waypoint: i,
                        max_wave_height_m: f.max_wave_height_m,
                        max_wind_speed_kts: f.max_wind_speed_kts,
                        safety_margin: f.safety_margin,
                        stale: f.stale,
                    });
                }
            }

            let mut warnings = vec![];
            if stale > 0 {
                warnings.push(PlanWarning::DegradedWeatherCoverage {
                    stale_segments: stale,
                });
            }

            Ok(RoutePlan {
                route: Route::new(waypoints, &self.sphere)?,
                cost: RouteCostBreakdown {
                    distance_nm: distance,
                    duration_hours: hours,
                    fuel_t: fuel,
                    safety_score: if hours > 0.0 { safety_hours / hours } else { 1.0 },
                    min_safety_margin: min_margin,
                    weighted_cost: cost,
                    great_circle_nm,
                    segments,
                },
                warnings,
                partial: false,
            })
        }
    }
}
