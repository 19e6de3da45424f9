//! Great-circle and rhumb-line navigation on a spherical Earth.
//!
//! Distances use the Haversine formula; see
//! [Wikipedia](https://en.wikipedia.org/wiki/Haversine_formula) for
//! more.
//!
//! **Distance is returned in nautical miles** and all bearings are
//! degrees true, normalized to [0, 360).
//!
//! Every function is pure. [`Position`] is validated on construction,
//! so none of these calls can fail.

use serde::{Deserialize, Serialize};

use crate::router::router_types::location::Position;

/// Mean Earth radius in nautical miles.
pub const EARTH_RADIUS_NM: f64 = 3440.065;

/// Normalize a bearing to [0, 360).
pub fn normalize_bearing(bearing: f64) -> f64 {
    let b = bearing.rem_euclid(360.0);
    if b >= 360.0 {
        0.0
    } else {
        b
    }
}

/// Signed smallest difference `to - from` in degrees, in (-180, 180].
pub fn bearing_difference(from: f64, to: f64) -> f64 {
    let d = (to - from).rem_euclid(360.0);
    if d > 180.0 {
        d - 360.0
    } else {
        d
    }
}

/// Summary of progress from a departure point towards a target.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseMadeGood {
    /// Great-circle course from the start to the current position
    pub course_made_good: f64,
    /// Distance from the start to the current position
    pub distance_made_good_nm: f64,
    /// Initial course from the current position to the target
    pub course_to_target: f64,
    /// Remaining distance to the target
    pub distance_to_target_nm: f64,
    /// Start to target distance
    pub total_distance_nm: f64,
    /// `distance_made_good / total_distance` as a percentage
    pub progress_percent: f64,
}

/// Spherical Earth model used by every navigation calculation.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Sphere {
    /// Radius in nautical miles.
    pub radius_nm: f64,
}

impl Default for Sphere {
    fn default() -> Self {
        Sphere {
            radius_nm: EARTH_RADIUS_NM,
        }
    }
}

impl Sphere {
    /// Creates a sphere with the given radius in nautical miles.
    pub fn new(radius_nm: f64) -> Self {
        Sphere { radius_nm }
    }

    /// Angular distance in radians between two positions.
    fn central_angle(&self, start: &Position, end: &Position) -> f64 {
        let lat1 = start.latitude().to_radians();
        let lat2 = end.latitude().to_radians();
        let d_lat = lat2 - lat1;
        let d_lon = (end.longitude() - start.longitude()).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);

        2.0 * a.sqrt().atan2((1.0 - a).sqrt())
    }

    /// Great-circle distance between two positions.
    pub fn distance(&self, start: &Position, end: &Position) -> f64 {
        self.radius_nm * self.central_angle(start, end)
    }

    /// Initial great-circle bearing from `start` towards `end`.
    ///
    /// Returns 0.0 for coincident positions.
    pub fn initial_bearing(&self, start: &Position, end: &Position) -> f64 {
        let lat1 = start.latitude().to_radians();
        let lat2 = end.latitude().to_radians();
        let d_lon = (end.longitude() - start.longitude()).to_radians();

        let y = d_lon.sin() * lat2.cos();
        let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lon.cos();
        if x == 0.0 && y == 0.0 {
            return 0.0;
        }

        normalize_bearing(y.atan2(x).to_degrees())
    }

    /// Longitude difference in radians, taking the short way across
    /// the antimeridian.
    fn rhumb_delta_lon(start: &Position, end: &Position) -> f64 {
        let mut d_lon = (end.longitude() - start.longitude()).to_radians();
        if d_lon.abs() > std::f64::consts::PI {
            d_lon -= 2.0 * std::f64::consts::PI * d_lon.signum();
        }
        d_lon
    }

    /// Difference in Mercator-projected latitude.
    fn projected_delta_lat(lat1: f64, lat2: f64) -> f64 {
        let quarter = std::f64::consts::FRAC_PI_4;
        ((lat2 / 2.0 + quarter).tan() / (lat1 / 2.0 + quarter).tan()).ln()
    }

    /// Rhumb-line (constant bearing) distance.
    pub fn rhumb_distance(&self, start: &Position, end: &Position) -> f64 {
        let lat1 = start.latitude().to_radians();
        let lat2 = end.latitude().to_radians();
        let d_lat = lat2 - lat1;
        let d_lon = Self::rhumb_delta_lon(start, end);
        let d_psi = Self::projected_delta_lat(lat1, lat2);

        // E-W lines have a degenerate projected latitude difference
        let q = if d_psi.abs() > 1e-12 {
            d_lat / d_psi
        } else {
            lat1.cos()
        };

        (d_lat * d_lat + q * q * d_lon * d_lon).sqrt() * self.radius_nm
    }

    /// Constant bearing of the rhumb line from `start` to `end`.
    pub fn rhumb_bearing(&self, start: &Position, end: &Position) -> f64 {
        let lat1 = start.latitude().to_radians();
        let lat2 = end.latitude().to_radians();
        let d_lon = Self::rhumb_delta_lon(start, end);
        let d_psi = Self::projected_delta_lat(lat1, lat2);
        if d_lon == 0.0 && d_psi == 0.0 {
            return 0.0;
        }

        normalize_bearing(d_lon.atan2(d_psi).to_degrees())
    }

    /// Position reached by following a great circle from `start` on
    /// the initial `bearing` for `distance_nm`.
    pub fn destination(&self, start: &Position, bearing: f64, distance_nm: f64) -> Position {
        let delta = distance_nm / self.radius_nm;
        let theta = bearing.to_radians();
        let lat1 = start.latitude().to_radians();
        let lon1 = start.longitude().to_radians();

        let sin_lat2 = lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * theta.cos();
        let lat2 = sin_lat2.clamp(-1.0, 1.0).asin();
        let lon2 = lon1
            + (theta.sin() * delta.sin() * lat1.cos()).atan2(delta.cos() - lat1.sin() * sin_lat2);

        Position::normalized(lat2.to_degrees(), lon2.to_degrees())
    }

    /// Signed distance of `position` from the great circle through
    /// `route_start` and `route_end`. Positive is to starboard (right)
    /// of the track.
    pub fn cross_track_error(
        &self,
        position: &Position,
        route_start: &Position,
        route_end: &Position,
    ) -> f64 {
        let d13 = self.central_angle(route_start, position);
        let theta13 = self.initial_bearing(route_start, position).to_radians();
        let theta12 = self.initial_bearing(route_start, route_end).to_radians();

        (d13.sin() * (theta13 - theta12).sin()).asin() * self.radius_nm
    }

    /// Distance from `route_start` to the point on the track closest to
    /// `position`. Negative when the closest point lies behind the start.
    pub fn along_track_distance(
        &self,
        position: &Position,
        route_start: &Position,
        route_end: &Position,
    ) -> f64 {
        let d13 = self.central_angle(route_start, position);
        let theta13 = self.initial_bearing(route_start, position).to_radians();
        let theta12 = self.initial_bearing(route_start, route_end).to_radians();
        let dxt = (d13.sin() * (theta13 - theta12).sin()).asin();

        let cos_dxt = dxt.cos();
        if cos_dxt.abs() < 1e-15 {
            return 0.0;
        }

        let dat = (d13.cos() / cos_dxt).clamp(-1.0, 1.0).acos();
        dat * (theta12 - theta13).cos().signum() * self.radius_nm
    }

    /// Point at `fraction` (0 = start, 1 = end) along the great circle.
    pub fn intermediate_point(&self, start: &Position, end: &Position, fraction: f64) -> Position {
        let delta = self.central_angle(start, end);
        if delta.abs() < 1e-12 {
            return *start;
        }

        let lat1 = start.latitude().to_radians();
        let lon1 = start.longitude().to_radians();
        let lat2 = end.latitude().to_radians();
        let lon2 = end.longitude().to_radians();

        let a = ((1.0 - fraction) * delta).sin() / delta.sin();
        let b = (fraction * delta).sin() / delta.sin();

        let x = a * lat1.cos() * lon1.cos() + b * lat2.cos() * lon2.cos();
        let y = a * lat1.cos() * lon1.sin() + b * lat2.cos() * lon2.sin();
        let z = a * lat1.sin() + b * lat2.sin();

        let lat = z.atan2((x * x + y * y).sqrt());
        let lon = y.atan2(x);

        Position::normalized(lat.to_degrees(), lon.to_degrees())
    }

    /// Course and distance made good on the way from `start` to
    /// `target`, as seen from `current`.
    pub fn course_made_good(
        &self,
        start: &Position,
        current: &Position,
        target: &Position,
    ) -> CourseMadeGood {
        let distance_made_good_nm = self.distance(start, current);
        let total_distance_nm = self.distance(start, target);
        let progress_percent = if total_distance_nm > 0.0 {
            distance_made_good_nm / total_distance_nm * 100.0
        } else {
            0.0
        };

        CourseMadeGood {
            course_made_good: self.initial_bearing(start, current),
            distance_made_good_nm,
            course_to_target: self.initial_bearing(current, target),
            distance_to_target_nm: self.distance(current, target),
            total_distance_nm,
            progress_percent,
        }
    }
}

#[cfg(test)]
pub mod geodesy_test {
    use super::*;
    use crate::router::router_utils::mock::generate_positions_near;
    use geo::{GeodesicDistance, Point};

    fn pos(lat: f64, lon: f64) -> Position {
        Position::new(lat, lon).unwrap()
    }

    #[test]
    fn test_distance_in_nautical_miles() {
        let sphere = Sphere::default();
        // one minute of latitude is one nautical mile
        let d = sphere.distance(&pos(0.0, 0.0), &pos(1.0, 0.0));
        assert!((d - 60.04).abs() < 0.05);

        let sf = pos(37.7749, -122.4194);
        let la = pos(34.0522, -118.2437);
        let d = sphere.distance(&sf, &la);
        assert!(d > 290.0 && d < 350.0, "got {d}");
    }

    #[test]
    fn test_distance_symmetric_and_zero() {
        let sphere = Sphere::default();
        let center: Point = pos(37.0, -123.0).into();
        let positions = generate_positions_near(&center, 500.0, 50);
        for a in &positions {
            assert_eq!(sphere.distance(a, a), 0.0);
            for b in &positions {
                let ab = sphere.distance(a, b);
                let ba = sphere.distance(b, a);
                assert!((ab - ba).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_distance_matches_geodesic() {
        let sphere = Sphere::default();
        let a = pos(37.7749, -122.4194);
        let b = pos(34.0522, -118.2437);
        let geodesic_nm = Point::from(a).geodesic_distance(&Point::from(b)) / 1852.0;
        let haversine_nm = sphere.distance(&a, &b);
        assert!((geodesic_nm - haversine_nm).abs() / geodesic_nm < 0.005);
    }

    #[test]
    fn test_bearings_normalized() {
        let sphere = Sphere::default();
        let origin = pos(0.0, 0.0);
        assert!((sphere.initial_bearing(&origin, &pos(1.0, 0.0)) - 0.0).abs() < 1e-9);
        assert!((sphere.initial_bearing(&origin, &pos(0.0, 1.0)) - 90.0).abs() < 1e-9);
        assert!((sphere.initial_bearing(&origin, &pos(-1.0, 0.0)) - 180.0).abs() < 1e-9);
        assert!((sphere.initial_bearing(&origin, &pos(0.0, -1.0)) - 270.0).abs() < 1e-9);
        assert_eq!(normalize_bearing(-10.0), 350.0);
        assert_eq!(normalize_bearing(720.0), 0.0);
        assert_eq!(bearing_difference(350.0, 10.0), 20.0);
        assert_eq!(bearing_difference(10.0, 350.0), -20.0);
    }

    #[test]
    fn test_rhumb_line() {
        let sphere = Sphere::default();
        let a = pos(10.0, 0.0);
        let b = pos(10.0, 5.0);
        assert!((sphere.rhumb_bearing(&a, &b) - 90.0).abs() < 1e-9);
        // east-west rhumb line follows the parallel
        let expected = 5.0_f64.to_radians() * 10.0_f64.to_radians().cos() * EARTH_RADIUS_NM;
        assert!((sphere.rhumb_distance(&a, &b) - expected).abs() < 1e-6);
        // rhumb line is never shorter than the great circle
        let c = pos(50.0, -30.0);
        let d = pos(40.0, 20.0);
        assert!(sphere.rhumb_distance(&c, &d) >= sphere.distance(&c, &d));
    }

    #[test]
    fn test_destination_round_trip() {
        let sphere = Sphere::default();
        let start = pos(37.7749, -122.4194);
        let end = sphere.destination(&start, 135.0, 100.0);
        assert!((sphere.distance(&start, &end) - 100.0).abs() < 1e-6);
        assert!((sphere.initial_bearing(&start, &end) - 135.0).abs() < 1e-6);
    }

    #[test]
    fn test_cross_and_along_track() {
        let sphere = Sphere::default();
        let start = pos(0.0, 0.0);
        let end = pos(0.0, 10.0);
        // north of an eastbound track is to port
        let xte = sphere.cross_track_error(&pos(1.0, 5.0), &start, &end);
        assert!((xte + 60.04).abs() < 0.1, "got {xte}");
        let xte = sphere.cross_track_error(&pos(-1.0, 5.0), &start, &end);
        assert!((xte - 60.04).abs() < 0.1, "got {xte}");

        let atd = sphere.along_track_distance(&pos(1.0, 5.0), &start, &end);
        assert!((atd - 300.2).abs() < 0.5, "got {atd}");
    }

    #[test]
    fn test_intermediate_point_and_course_made_good() {
        let sphere = Sphere::default();
        let start = pos(0.0, 0.0);
        let end = pos(0.0, 10.0);
        let mid = sphere.intermediate_point(&start, &end, 0.5);
        assert!(mid.latitude().abs() < 1e-9);
        assert!((mid.longitude() - 5.0).abs() < 1e-9);

        let cmg = sphere.course_made_good(&start, &mid, &end);
        assert!((cmg.progress_percent - 50.0).abs() < 1e-6);
        assert!((cmg.course_to_target - 90.0).abs() < 1e-6);
    }
}
