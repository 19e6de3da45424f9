//! Vertices of the search lattice.
//!
//! The lattice is laid out along the great circle from departure to
//! destination. Stations are evenly spaced along the track and each
//! station carries a fan of lanes offset perpendicular to it. A [`Node`]
//! is one (station, lane) cell of that grid.

use serde::{Deserialize, Serialize};

use super::location::Position;

/// Represent a vertex in the lattice graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    /// Synthetic id of the form `s{station}:l{lane}`, e.g. `s4:l-2`.
    pub uid: String,

    /// Geographic position of the node.
    pub position: Position,

    /// Index of the station along the track, 0 at departure.
    pub station: usize,

    /// Lateral lane, 0 on the direct track, positive to starboard.
    pub lane: i32,
}

impl Node {
    /// Creates the node for a lattice cell.
    pub fn new(station: usize, lane: i32, position: Position) -> Self {
        Node {
            uid: format!("s{station}:l{lane}"),
            position,
            station,
            lane,
        }
    }
}
