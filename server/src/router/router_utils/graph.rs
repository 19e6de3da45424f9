//! Helper functions for building the search lattice.
//!
//! Nodes are placed on stations spaced along the great circle from the
//! start to the goal, each station fanning out into lanes on both sides
//! of the track. Edges connect consecutive stations whose lanes differ
//! by at most the configured shift.
//!
//! Every candidate edge is screened once against the static hazard
//! constraints before search. Screening is split across worker threads;
//! each worker collects into its own buffer and the buffers are merged
//! in edge order so the result does not depend on scheduling.

use crate::config::EngineConfig;
use crate::router::hazard::{HazardField, TssMode};
use crate::router::router_types::{edge::Edge, location::Position, node::Node};
use crate::router::router_utils::geodesy::{normalize_bearing, Sphere};

/// Result of screening one leg against the static constraints.
#[derive(Debug, Clone, PartialEq)]
pub enum LegVerdict {
    /// The leg may be sailed.
    Open(Edge),
    /// The leg violates a hard constraint.
    Blocked(String),
    /// The leg crosses a region without hazard data.
    Incomplete,
}

/// Screen a single leg against land, offing, point hazards, restricted
/// areas and traffic separation schemes.
///
/// Under-keel clearance depends on speed and is left to the caller; the
/// shallowest charted depth is returned on the edge.
pub fn screen_leg(
    hazards: &HazardField,
    sphere: &Sphere,
    config: &EngineConfig,
    from: &Position,
    to: &Position,
) -> LegVerdict {
    if hazards.check_segment_coverage(from, to).is_err() {
        return LegVerdict::Incomplete;
    }

    if let Some(hazard) = hazards.blocking_hazards(from, to).first() {
        return LegVerdict::Blocked(format!("crosses {}", hazard.name()));
    }

    // pilotage zones waive the offing only for the part inside them
    if let Some(offing) = hazards.offing_outside_pilotage(from, to, config.min_offing_nm * 2.0) {
        if offing < config.min_offing_nm {
            return LegVerdict::Blocked(format!(
                "passes {offing:.2} nm off the coast, {:.2} nm required",
                config.min_offing_nm
            ));
        }
    }

    let against_tss = hazards.violates_tss(sphere, from, to, config.tss_tolerance_deg);
    if against_tss && config.tss_mode == TssMode::Enforce {
        return LegVerdict::Blocked("runs against a traffic separation scheme".to_string());
    }

    LegVerdict::Open(Edge {
        distance_nm: sphere.distance(from, to),
        course_deg: sphere.initial_bearing(from, to),
        tss_penalized: against_tss,
        min_depth_m: hazards.min_depth_along(from, to),
    })
}

/// Lattice nodes grouped by station.
#[derive(Debug, Clone)]
pub struct Lattice {
    /// All nodes, station by station
    pub nodes: Vec<Node>,
    /// Index range of each station in `nodes`
    pub stations: Vec<std::ops::Range<usize>>,
}

impl Lattice {
    /// Index of the start node.
    pub fn start(&self) -> usize {
        0
    }

    /// Index of the goal node.
    pub fn goal(&self) -> usize {
        self.nodes.len() - 1
    }
}

/// Lay out lattice nodes between `start` and `goal`.
///
/// The first and last stations hold only the start and the goal.
pub fn build_lattice(
    sphere: &Sphere,
    config: &EngineConfig,
    start: &Position,
    goal: &Position,
) -> Lattice {
    router_debug!("(build_lattice) starting function call.");
    let total = sphere.distance(start, goal);
    let intervals = ((total / config.lattice_leg_nm).ceil() as usize).max(1);
    let lanes = config.lattice_lanes as i32;

    let mut nodes = vec![Node::new(0, 0, *start)];
    let mut stations = vec![0..1];

    for station in 1..intervals {
        let center = sphere.intermediate_point(start, goal, station as f64 / intervals as f64);
        let track = sphere.initial_bearing(&center, goal);
        let first = nodes.len();

        for lane in -lanes..=lanes {
            let position = if lane == 0 {
                center
            } else {
                let offset = lane as f64 * config.lattice_lane_spacing_nm;
                sphere.destination(
                    &center,
                    normalize_bearing(track + 90.0 * offset.signum()),
                    offset.abs(),
                )
            };
            nodes.push(Node::new(station, lane, position));
        }

        stations.push(first..nodes.len());
    }

    let last = nodes.len();
    nodes.push(Node::new(intervals, 0, *goal));
    stations.push(last..last + 1);

    Lattice { nodes, stations }
}

/// Counters collected while screening.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct ScreeningReport {
    /// Candidate edges examined
    pub examined: usize,
    /// Edges rejected by a hard constraint
    pub blocked: usize,
    /// Edges skipped for missing hazard data
    pub incomplete: usize,
}

/// Screen every candidate lattice edge on `workers` threads.
///
/// Returns `(from, to, edge)` triples sorted by `(from, to)`.
pub fn build_edges(
    lattice: &Lattice,
    hazards: &HazardField,
    sphere: &Sphere,
    config: &EngineConfig,
    workers: usize,
) -> (Vec<(usize, usize, Edge)>, ScreeningReport) {
    router_debug!("(build_edges) starting function call.");
    let shift = config.lattice_max_lane_shift as i32;

    let mut candidates = vec![];
    for pair in lattice.stations.windows(2) {
        for from in pair[0].clone() {
            for to in pair[1].clone() {
                if (lattice.nodes[from].lane - lattice.nodes[to].lane).abs() <= shift {
                    candidates.push((from, to));
                }
            }
        }
    }

    let workers = workers.max(1);
    let chunk_size = ((candidates.len() + workers - 1) / workers).max(1);

    let results: Vec<(Vec<(usize, usize, Edge)>, ScreeningReport)> = std::thread::scope(|scope| {
        let handles: Vec<_> = candidates
            .chunks(chunk_size)
            .map(|chunk| {
                scope.spawn(move || {
                    let mut edges = vec![];
                    let mut report = ScreeningReport::default();
                    for &(from, to) in chunk {
                        report.examined += 1;
                        let a = &lattice.nodes[from].position;
                        let b = &lattice.nodes[to].position;
                        match screen_leg(hazards, sphere, config, a, b) {
                            LegVerdict::Open(edge) => edges.push((from, to, edge)),
                            LegVerdict::Blocked(reason) => {
                                report.blocked += 1;
                                router_debug!(
                                    "(build_edges) {} -> {} blocked: {}",
                                    lattice.nodes[from].uid,
                                    lattice.nodes[to].uid,
                                    reason
                                );
                            }
                            LegVerdict::Incomplete => report.incomplete += 1,
                        }
                    }
                    (edges, report)
                })
            })
            .collect();

        handles
            .into_iter()
            .filter_map(|handle| match handle.join() {
                Ok(result) => Some(result),
                Err(_) => {
                    router_error!("(build_edges) screening worker panicked.");
                    None
                }
            })
            .collect()
    });

    let mut edges = vec![];
    let mut report = ScreeningReport::default();
    for (chunk, chunk_report) in results {
        edges.extend(chunk);
        report.examined += chunk_report.examined;
        report.blocked += chunk_report.blocked;
        report.incomplete += chunk_report.incomplete;
    }
    edges.sort_by_key(|(from, to, _)| (*from, *to));

    (edges, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::hazard::{Coverage, HazardGeometry, HazardLayers};
    use crate::test_util::{land_block, los_angeles, pos, san_francisco};

    fn hazards(layers: Vec<HazardGeometry>) -> HazardField {
        HazardField::new(
            HazardLayers {
                layers,
                coverage: Coverage::Worldwide,
            },
            &Sphere::default(),
        )
    }

    #[test]
    fn test_build_lattice_shape() {
        let sphere = Sphere::default();
        let config = EngineConfig::default();
        let lattice = build_lattice(&sphere, &config, &san_francisco(), &los_angeles());

        let total = sphere.distance(&san_francisco(), &los_angeles());
        let intervals = (total / config.lattice_leg_nm).ceil() as usize;
        let lanes = 2 * config.lattice_lanes + 1;
        assert_eq!(lattice.stations.len(), intervals + 1);
        assert_eq!(lattice.nodes.len(), 2 + (intervals - 1) * lanes);
        assert_eq!(lattice.nodes[lattice.start()].position, san_francisco());
        assert_eq!(lattice.nodes[lattice.goal()].position, los_angeles());

        // lanes sit at the configured spacing from the track
        let station = &lattice.stations[3];
        let center = lattice.nodes[station.start + config.lattice_lanes].position;
        let outer = lattice.nodes[station.end - 1].position;
        let expected = config.lattice_lanes as f64 * config.lattice_lane_spacing_nm;
        assert!((sphere.distance(&center, &outer) - expected).abs() < 0.01);
        let xte = sphere.cross_track_error(&outer, &san_francisco(), &los_angeles());
        assert!(xte > 0.0, "positive lanes lie to starboard");
    }

    #[test]
    fn test_short_voyage_is_single_leg() {
        let sphere = Sphere::default();
        let config = EngineConfig::default();
        let lattice = build_lattice(&sphere, &config, &pos(37.0, -123.0), &pos(37.1, -123.0));
        assert_eq!(lattice.nodes.len(), 2);

        let (edges, report) = build_edges(&lattice, &hazards(vec![]), &sphere, &config, 2);
        assert_eq!(edges.len(), 1);
        assert_eq!(report.examined, 1);
    }

    #[test]
    fn test_build_edges_screens_land_and_offing() {
        let sphere = Sphere::default();
        let config = EngineConfig::default();
        let field = hazards(vec![land_block()]);
        let lattice = build_lattice(&sphere, &config, &san_francisco(), &los_angeles());

        let (edges, report) = build_edges(&lattice, &field, &sphere, &config, 4);
        assert!(report.blocked > 0);
        assert_eq!(report.incomplete, 0);
        assert_eq!(edges.len() + report.blocked, report.examined);
        for (from, to, _) in &edges {
            let a = &lattice.nodes[*from].position;
            let b = &lattice.nodes[*to].position;
            assert!(field.blocking_hazards(a, b).is_empty());
            if let Some(offing) = field.segment_offing(a, b, 10.0) {
                assert!(offing >= config.min_offing_nm);
            }
        }

        // worker count does not change the outcome
        let (single, _) = build_edges(&lattice, &field, &sphere, &config, 1);
        assert_eq!(single, edges);
    }

    #[test]
    fn test_screen_leg_tss_modes() {
        let sphere = Sphere::default();
        let field = hazards(vec![HazardGeometry::TrafficSeparation {
            name: "southbound lane".to_string(),
            polygon: vec![
                pos(34.0, -121.0),
                pos(34.0, -120.8),
                pos(35.0, -120.8),
                pos(35.0, -121.0),
                pos(34.0, -121.0),
            ],
            direction_deg: 180.0,
        }]);
        let from = pos(34.2, -120.9);
        let to = pos(34.8, -120.9);

        let enforce = EngineConfig::default();
        assert!(matches!(
            screen_leg(&field, &sphere, &enforce, &from, &to),
            LegVerdict::Blocked(_)
        ));

        let prefer = EngineConfig {
            tss_mode: TssMode::Prefer,
            ..Default::default()
        };
        match screen_leg(&field, &sphere, &prefer, &from, &to) {
            LegVerdict::Open(edge) => assert!(edge.tss_penalized),
            other => panic!("unexpected verdict {other:?}"),
        }
    }

    #[test]
    fn test_pilotage_zone_exempts_offing_inside_it_only() {
        let sphere = Sphere::default();
        let config = EngineConfig::default();
        let land = land_block();
        // one nm south of the block
        let inshore = 35.5 - 1.0 / 60.0;
        let from = pos(inshore, -120.8);

        let harbor = HazardGeometry::PilotageZone {
            name: "harbor".to_string(),
            polygon: vec![
                pos(35.3, -120.9),
                pos(35.3, -120.7),
                pos(35.6, -120.7),
                pos(35.6, -120.9),
                pos(35.3, -120.9),
            ],
        };
        let field = hazards(vec![land.clone(), harbor]);
        let without_harbor = hazards(vec![land]);

        // within the harbor
        let to = pos(inshore, -120.75);
        assert!(matches!(
            screen_leg(&without_harbor, &sphere, &config, &from, &to),
            LegVerdict::Blocked(_)
        ));
        assert!(matches!(
            screen_leg(&field, &sphere, &config, &from, &to),
            LegVerdict::Open(_)
        ));

        // leaving the harbor straight out to sea
        let to = pos(35.0, -120.8);
        assert!(matches!(
            screen_leg(&field, &sphere, &config, &from, &to),
            LegVerdict::Open(_)
        ));

        // leaving the harbor and running along the coast
        let to = pos(inshore, -120.2);
        match screen_leg(&field, &sphere, &config, &from, &to) {
            LegVerdict::Blocked(reason) => assert!(reason.contains("off the coast"), "{reason}"),
            other => panic!("unexpected verdict {other:?}"),
        }
        let offing = field
            .offing_outside_pilotage(&from, &to, config.min_offing_nm * 2.0)
            .unwrap();
        assert!((offing - 1.0).abs() < 0.05, "offing {offing} nm");
    }
}
