//! Routes, their cost breakdown and the request that produces them.
//!
//! A [`Route`] is immutable once built. Replanning always produces a new
//! route with a new id; the previous one is kept only for history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::location::Position;
use crate::router::router_utils::geodesy::Sphere;
use crate::router::{PlanWarning, RouterError};

/// Consecutive waypoints closer than this are considered coincident.
pub const WAYPOINT_COINCIDENCE_NM: f64 = 0.05;

/// Optimization priority selecting the cost weights.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Minimize fuel burn
    Fuel,
    /// Minimize passage time
    Time,
    /// Keep clear of rough weather
    Safety,
    /// Equal weighting
    #[default]
    Balanced,
}

/// Weights over the three cost dimensions.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostWeights {
    /// Weight per hour underway
    pub time: f64,
    /// Weight per hour of service-speed fuel burn
    pub fuel: f64,
    /// Weight per hour, scaled by proximity to the sea-state thresholds
    pub safety: f64,
}

impl Priority {
    /// Weight vector for this priority.
    pub fn weights(&self) -> CostWeights {
        let (time, fuel, safety) = match self {
            Priority::Time => (1.0, 0.1, 0.2),
            Priority::Fuel => (0.1, 1.0, 0.2),
            Priority::Safety => (0.2, 0.2, 2.0),
            Priority::Balanced => (0.5, 0.5, 0.5),
        };

        CostWeights { time, fuel, safety }
    }
}

/// A point of a route with its planning annotations.
///
/// Course and speed describe the leg leaving this waypoint and are
/// absent on the last one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    /// Waypoint position
    pub position: Position,
    /// Planned time of arrival
    #[serde(default)]
    pub eta: Option<DateTime<Utc>>,
    /// Course of the outgoing leg, degrees true
    #[serde(default)]
    pub course_deg: Option<f64>,
    /// Commanded speed through the water on the outgoing leg, knots
    #[serde(default)]
    pub speed_kts: Option<f64>,
    /// Distance sailed from departure, nautical miles
    #[serde(default)]
    pub distance_from_start_nm: f64,
}

impl Waypoint {
    /// A bare waypoint without annotations.
    pub fn at(position: Position) -> Self {
        Waypoint {
            position,
            eta: None,
            course_deg: None,
            speed_kts: None,
            distance_from_start_nm: 0.0,
        }
    }
}

/// Ordered waypoint sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// Identity of this route object
    pub id: Uuid,
    /// Waypoints in travel order
    pub waypoints: Vec<Waypoint>,
    /// When the route was produced
    pub created_at: DateTime<Utc>,
}

impl Route {
    /// Builds a route with a fresh id.
    ///
    /// # Errors
    /// [`RouterError::InvalidRoute`] with fewer than two waypoints or
    /// with consecutive waypoints closer than
    /// [`WAYPOINT_COINCIDENCE_NM`].
    pub fn new(waypoints: Vec<Waypoint>, sphere: &Sphere) -> Result<Self, RouterError> {
        if waypoints.len() < 2 {
            return Err(RouterError::InvalidRoute {
                reason: format!("a route needs at least 2 waypoints, got {}", waypoints.len()),
            });
        }

        if let Some(i) = waypoints.windows(2).position(|pair| {
            sphere.distance(&pair[0].position, &pair[1].position) < WAYPOINT_COINCIDENCE_NM
        }) {
            return Err(RouterError::InvalidRoute {
                reason: format!("waypoints {i} and {} coincide", i + 1),
            });
        }

        Ok(Route {
            id: Uuid::new_v4(),
            waypoints,
            created_at: Utc::now(),
        })
    }

    /// First waypoint position.
    pub fn start(&self) -> &Position {
        &self.waypoints[0].position
    }

    /// Last waypoint position.
    pub fn end(&self) -> &Position {
        &self.waypoints[self.waypoints.len() - 1].position
    }

    /// Positions in travel order.
    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.waypoints.iter().map(|w| &w.position)
    }

    /// Consecutive position pairs.
    pub fn legs(&self) -> impl Iterator<Item = (&Position, &Position)> {
        self.waypoints
            .windows(2)
            .map(|pair| (&pair[0].position, &pair[1].position))
    }

    /// Total great-circle length of the legs.
    pub fn distance_nm(&self, sphere: &Sphere) -> f64 {
        self.legs().map(|(a, b)| sphere.distance(a, b)).sum()
    }
}

/// Weather exposure of one leg at its planned transit time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentExposure {
    /// Index of the leg's first waypoint
    pub from_waypoint: usize,
    /// Highest wave height seen along the leg
    pub max_wave_height_m: f64,
    /// Highest wind speed seen along the leg
    pub max_wind_speed_kts: f64,
    /// Distance to the sea-state thresholds, 1 in calm, 0 at a threshold
    pub safety_margin: f64,
    /// Weather along the leg was extrapolated
    pub stale: bool,
}

/// Totals of a planned route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteCostBreakdown {
    /// Sailed distance
    pub distance_nm: f64,
    /// Passage time
    pub duration_hours: f64,
    /// Fuel burnt
    pub fuel_t: f64,
    /// Time-weighted mean of the safety scalar, 0 to 1, higher is safer
    pub safety_score: f64,
    /// Smallest safety margin over all legs
    pub min_safety_margin: f64,
    /// Weighted search cost under the chosen priority
    pub weighted_cost: f64,
    /// Great-circle distance from start to goal, a lower bound on
    /// `distance_nm`
    pub great_circle_nm: f64,
    /// Per-leg weather exposure
    pub segments: Vec<SegmentExposure>,
}

/// Result of one route search invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePlan {
    /// The route
    pub route: Route,
    /// Its cost breakdown
    pub cost: RouteCostBreakdown,
    /// Non-fatal conditions met while planning
    pub warnings: Vec<PlanWarning>,
    /// The search was cancelled; `route` is the best found so far and
    /// may stop short of the goal
    pub partial: bool,
}

/// Inputs of a route search besides the vessel and the fields.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoyageRequest {
    /// Departure position
    pub start: Position,
    /// Destination
    pub goal: Position,
    /// Departure time
    pub departure: DateTime<Utc>,
    /// Optimization priority
    #[serde(default)]
    pub priority: Priority,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::pos;

    #[test]
    fn test_route_needs_two_waypoints() {
        let sphere = Sphere::default();
        let result = Route::new(vec![Waypoint::at(pos(37.0, -122.0))], &sphere);
        assert!(matches!(result, Err(RouterError::InvalidRoute { .. })));
    }

    #[test]
    fn test_route_rejects_coincident_waypoints() {
        let sphere = Sphere::default();
        let result = Route::new(
            vec![
                Waypoint::at(pos(37.0, -122.0)),
                Waypoint::at(pos(37.0001, -122.0)),
                Waypoint::at(pos(36.0, -121.0)),
            ],
            &sphere,
        );
        assert!(matches!(result, Err(RouterError::InvalidRoute { .. })));
    }

    #[test]
    fn test_routes_have_distinct_ids() {
        let sphere = Sphere::default();
        let waypoints = vec![Waypoint::at(pos(37.0, -122.0)), Waypoint::at(pos(36.0, -121.0))];
        let a = Route::new(waypoints.clone(), &sphere).unwrap();
        let b = Route::new(waypoints, &sphere).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(a.waypoints, b.waypoints);
        assert!((a.distance_nm(&sphere) - sphere.distance(a.start(), a.end())).abs() < 1e-9);
    }

    #[test]
    fn test_priority_weights() {
        let fuel = Priority::Fuel.weights();
        let time = Priority::Time.weights();
        let safety = Priority::Safety.weights();
        assert!(fuel.fuel > time.fuel);
        assert!(time.time > fuel.time);
        assert!(safety.safety > fuel.safety.max(time.safety));
        assert_eq!(Priority::default(), Priority::Balanced);

        let p: Priority = serde_json::from_str(r#""safety""#).unwrap();
        assert_eq!(p, Priority::Safety);
    }
}
