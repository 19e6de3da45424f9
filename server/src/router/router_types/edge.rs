//! Definition of the `Edge` type.
use serde::Serialize;

/// A screened lattice leg between two adjacent stations.
///
/// Only time-independent facts are stored here. Weather, speed and fuel
/// depend on when the leg is entered and are evaluated during search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Edge {
    /// Great-circle length of the leg
    pub distance_nm: f64,

    /// Initial great-circle course of the leg
    pub course_deg: f64,

    /// The leg runs against a traffic separation corridor and carries
    /// the configured penalty (prefer mode only)
    pub tss_penalized: bool,

    /// Shallowest charted depth crossed by the leg, if any
    pub min_depth_m: Option<f64>,
}
