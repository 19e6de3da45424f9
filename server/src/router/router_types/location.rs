//! Struct definitions and implementations for [`Position`].
//!
//! A [`Position`] can only be built through [`Position::new`], which
//! rejects coordinates outside the WGS84 range. Deserialization goes
//! through the same check, so every position that reaches the engine
//! is known to be valid.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::router::RouterError;

/// A geographic position in decimal degrees (WGS84).
///
/// Float values are wrapped in [`OrderedFloat`] so positions can be
/// used as keys when building the search lattice.
#[derive(Debug, PartialEq, Hash, Eq, Copy, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawPosition", into = "RawPosition")]
pub struct Position {
    latitude: OrderedFloat<f64>,
    longitude: OrderedFloat<f64>,
}

/// Unchecked wire form of a [`Position`].
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
pub struct RawPosition {
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
}

impl Position {
    /// Creates a validated position.
    ///
    /// # Errors
    /// [`RouterError::InvalidCoordinate`] if the latitude is outside
    /// [-90, 90], the longitude is outside [-180, 180], or either value
    /// is not finite.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, RouterError> {
        if !latitude.is_finite()
            || !longitude.is_finite()
            || !(-90.0..=90.0).contains(&latitude)
            || !(-180.0..=180.0).contains(&longitude)
        {
            return Err(RouterError::InvalidCoordinate {
                latitude,
                longitude,
            });
        }

        Ok(Self {
            latitude: OrderedFloat(latitude),
            longitude: OrderedFloat(longitude),
        })
    }

    /// Builds a position from computed values, wrapping the longitude
    /// into [-180, 180] and clamping the latitude to the poles.
    pub(crate) fn normalized(latitude: f64, longitude: f64) -> Self {
        let mut longitude = (longitude + 540.0).rem_euclid(360.0) - 180.0;
        if longitude == -180.0 {
            longitude = 180.0;
        }

        Self {
            latitude: OrderedFloat(latitude.clamp(-90.0, 90.0)),
            longitude: OrderedFloat(longitude),
        }
    }

    /// Latitude in decimal degrees.
    pub fn latitude(&self) -> f64 {
        self.latitude.into_inner()
    }

    /// Longitude in decimal degrees.
    pub fn longitude(&self) -> f64 {
        self.longitude.into_inner()
    }
}

impl TryFrom<RawPosition> for Position {
    type Error = RouterError;

    fn try_from(raw: RawPosition) -> Result<Self, Self::Error> {
        Position::new(raw.latitude, raw.longitude)
    }
}

impl From<Position> for RawPosition {
    fn from(position: Position) -> Self {
        RawPosition {
            latitude: position.latitude(),
            longitude: position.longitude(),
        }
    }
}

impl From<Position> for geo::Point<f64> {
    fn from(position: Position) -> Self {
        geo::Point::new(position.longitude(), position.latitude())
    }
}

impl From<Position> for geo::Coord<f64> {
    fn from(position: Position) -> Self {
        geo::Coord {
            x: position.longitude(),
            y: position.latitude(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_rejects_out_of_range() {
        assert!(Position::new(90.1, 0.0).is_err());
        assert!(Position::new(-90.1, 0.0).is_err());
        assert!(Position::new(0.0, 180.5).is_err());
        assert!(Position::new(0.0, -181.0).is_err());
        assert!(Position::new(f64::NAN, 0.0).is_err());
        assert!(Position::new(90.0, -180.0).is_ok());
    }

    #[test]
    fn test_position_deserialize_is_validated() {
        let ok: Result<Position, _> =
            serde_json::from_str(r#"{"latitude": 37.7749, "longitude": -122.4194}"#);
        assert!(ok.is_ok());

        let bad: Result<Position, _> =
            serde_json::from_str(r#"{"latitude": 137.0, "longitude": -122.4194}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_normalized_wraps_longitude() {
        let p = Position::normalized(10.0, 190.0);
        assert!((p.longitude() + 170.0).abs() < 1e-9);

        let p = Position::normalized(10.0, -190.0);
        assert!((p.longitude() - 170.0).abs() < 1e-9);

        let p = Position::normalized(95.0, 0.0);
        assert_eq!(p.latitude(), 90.0);
    }
}
