//! Router module
//!
//! Voyage route optimization: geodesy, vessel performance, hazard and
//! weather fields, the time-expanded route search and arrival time
//! estimation.

#[macro_use]
pub mod macros;
pub mod eta;
pub mod hazard;
pub mod router_types;
pub mod router_utils;
pub mod vessel;
pub mod weather;

use serde::{Deserialize, Serialize};

/// Errors raised by the routing engine.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RouterError {
    /// A position is outside the WGS84 range or not a finite number.
    #[error("invalid coordinate ({latitude}, {longitude})")]
    InvalidCoordinate {
        /// Offending latitude
        latitude: f64,
        /// Offending longitude
        longitude: f64,
    },

    /// Every candidate path violates a hard constraint.
    #[error("no feasible route: {reason}")]
    NoFeasibleRoute {
        /// What made the goal unreachable
        reason: String,
    },

    /// A query fell in a region with no loaded hazard geometry.
    #[error("no hazard data loaded at ({latitude}, {longitude})")]
    HazardDataIncomplete {
        /// Latitude of the query
        latitude: f64,
        /// Longitude of the query
        longitude: f64,
    },

    /// A route does not satisfy its structural invariants.
    #[error("invalid route: {reason}")]
    InvalidRoute {
        /// Which invariant failed
        reason: String,
    },

    /// The search was cancelled before any candidate was explored.
    #[error("search cancelled before a candidate was found")]
    Cancelled,

    /// The vessel particulars are unusable.
    #[error("invalid vessel profile: {reason}")]
    InvalidVessel {
        /// Which particular was rejected
        reason: String,
    },

    /// The engine configuration is unusable.
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration {
        /// Which setting was rejected
        reason: String,
    },
}

/// Non-fatal conditions attached to a plan or an estimate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanWarning {
    /// Weather beyond the forecast horizon or outside the grid was used.
    DegradedWeatherCoverage {
        /// Number of route segments evaluated with stale weather
        stale_segments: usize,
    },

    /// Some lattice edges crossed regions with no hazard data and were
    /// avoided.
    HazardDataIncomplete {
        /// Number of lattice edges skipped for missing data
        skipped_edges: usize,
    },

    /// The search was cancelled and the best path found so far was
    /// returned.
    PartialResult,
}

impl std::fmt::Display for PlanWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            PlanWarning::DegradedWeatherCoverage { stale_segments } => {
                write!(f, "degraded weather coverage on {stale_segments} segment(s)")
            }
            PlanWarning::HazardDataIncomplete { skipped_edges } => {
                write!(f, "{skipped_edges} edge(s) skipped for missing hazard data")
            }
            PlanWarning::PartialResult => write!(f, "partial result"),
        }
    }
}
