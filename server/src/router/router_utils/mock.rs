//! A number of methods to generate random data for testing.

use crate::router::hazard::HazardGeometry;
use crate::router::router_types::location::Position;
use crate::router::router_utils::geodesy::Sphere;
use crate::router::vessel::{FuelCurve, VesselProfile};
use crate::router::weather::{Conditions, WeatherField, WeatherSample};
use chrono::{DateTime, Duration, Utc};
use geo::Point;
use rand::Rng;

/// Departure point used by the scenario fixtures.
pub fn san_francisco() -> Position {
    Position::normalized(37.7749, -122.4194)
}

/// Destination used by the scenario fixtures.
pub fn los_angeles() -> Position {
    Position::normalized(34.0522, -118.2437)
}

/// A coastal handysize bulk carrier.
pub fn sample_vessel() -> VesselProfile {
    VesselProfile {
        name: "MV Pacific Trader".to_string(),
        length_m: 180.0,
        beam_m: 30.0,
        draft_m: 10.5,
        deadweight_t: 35_000.0,
        engine_power_kw: 9_000.0,
        service_speed_kts: 14.0,
        max_speed_kts: 16.0,
        block_coefficient: 0.78,
        fuel_curve: FuelCurve::default(),
    }
}

/// Synthetic land mass lying across the direct San Francisco to Los
/// Angeles track.
pub fn land_block() -> HazardGeometry {
    HazardGeometry::Land {
        name: "central coast block".to_string(),
        polygon: vec![
            Position::normalized(35.5, -121.0),
            Position::normalized(35.5, -119.5),
            Position::normalized(36.5, -119.5),
            Position::normalized(36.5, -121.0),
            Position::normalized(35.5, -121.0),
        ],
    }
}

/// Weather grid over the California coast, 0.25 degree spacing, with
/// two forecast times 72 hours apart. `wave_at` gives the wave height
/// for each grid position.
pub fn coastal_weather(
    departure: DateTime<Utc>,
    wave_at: impl Fn(&Position) -> f64,
) -> WeatherField {
    let mut samples = vec![];
    for hours in [0, 72] {
        for i in 0..=28 {
            for j in 0..=36 {
                let position = Position::normalized(32.0 + i as f64 * 0.25, -125.0 + j as f64 * 0.25);
                samples.push(WeatherSample {
                    position,
                    time: departure + Duration::hours(hours),
                    conditions: Conditions {
                        wind_speed_kts: 10.0,
                        wind_direction_deg: 300.0,
                        wave_height_m: wave_at(&position),
                        ..Conditions::calm()
                    },
                    stale: false,
                });
            }
        }
    }

    WeatherField::new(samples, Duration::hours(96))
}

/// Moderate seas everywhere.
pub fn calm_weather(departure: DateTime<Utc>) -> WeatherField {
    coastal_weather(departure, |_| 1.0)
}

/// Moderate seas with a band of `wave_height_m` waves covering the
/// middle half of the direct San Francisco to Los Angeles track, out to
/// `half_width_nm` either side of it.
pub fn wave_corridor_weather(
    departure: DateTime<Utc>,
    wave_height_m: f64,
    half_width_nm: f64,
) -> WeatherField {
    let sphere = Sphere::default();
    let (start, end) = (san_francisco(), los_angeles());
    let total = sphere.distance(&start, &end);

    coastal_weather(departure, |p| {
        let cross = sphere.cross_track_error(p, &start, &end).abs();
        let along = sphere.along_track_distance(p, &start, &end);
        if cross <= half_width_nm && along >= 0.25 * total && along <= 0.75 * total {
            wave_height_m
        } else {
            1.0
        }
    })
}

/// Generate a random position anywhere on earth.
pub fn generate_position() -> Position {
    let mut rng = rand::thread_rng();
    let latitude = rng.gen_range(-90.0..=90.0);
    let longitude = rng.gen_range(-180.0..=180.0);
    Position::normalized(latitude, longitude)
}

/// Generate a random position within `radius_nm` of a point.
///
/// The point is given in `geo` convention (x = longitude, y = latitude).
pub fn generate_position_near(center: &Point, radius_nm: f64) -> Position {
    let mut rng = rand::thread_rng();
    let origin = Position::normalized(center.y(), center.x());
    let bearing = rng.gen_range(0.0..360.0);
    // sqrt keeps the samples uniform over the disc
    let distance = radius_nm * rng.gen_range(0.0_f64..=1.0).sqrt();
    Sphere::default().destination(&origin, bearing, distance)
}

/// Generate a vector of random positions near a point.
///
/// The provided radius (nautical miles) is the maximum distance the
/// generated positions can be from the point. `capacity` is the number
/// of positions generated.
pub fn generate_positions_near(center: &Point, radius_nm: f64, capacity: usize) -> Vec<Position> {
    (0..capacity)
        .map(|_| generate_position_near(center, radius_nm))
        .collect()
}
