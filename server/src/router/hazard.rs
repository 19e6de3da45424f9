//! Static hazard geometry and the queries the search engine runs
//! against it.
//!
//! Containment and intersection tests run on longitude/latitude
//! coordinates. Distances are measured in a local equirectangular
//! projection centred on the query, scaled to nautical miles, which is
//! accurate for the short legs and standoff distances used in routing.

use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::{
    BoundingRect, Coord, EuclideanDistance, Intersects, Line, LineString, MapCoords, Point,
    Polygon, Rect,
};
use serde::{Deserialize, Serialize};

use crate::router::router_types::location::Position;
use crate::router::router_utils::geodesy::{bearing_difference, Sphere};
use crate::router::RouterError;

/// Traffic separation scheme enforcement.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TssMode {
    /// A leg against the mandated direction is rejected.
    Enforce,
    /// A leg against the mandated direction is penalized.
    Prefer,
}

/// One record of a hazard layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HazardGeometry {
    /// Land mass bounded by a coastline.
    Land {
        /// Layer name
        name: String,
        /// Outer ring
        polygon: Vec<Position>,
    },
    /// Area closed to transit.
    Restricted {
        /// Layer name
        name: String,
        /// Outer ring
        polygon: Vec<Position>,
    },
    /// Traffic separation corridor with a mandated direction.
    TrafficSeparation {
        /// Layer name
        name: String,
        /// Outer ring
        polygon: Vec<Position>,
        /// Direction of travel, degrees true
        direction_deg: f64,
    },
    /// Charted area whose shallowest sounding is `min_depth_m`.
    DepthArea {
        /// Layer name
        name: String,
        /// Outer ring
        polygon: Vec<Position>,
        /// Shallowest charted depth in metres
        min_depth_m: f64,
    },
    /// Wreck or obstruction with a keep-clear radius.
    PointHazard {
        /// Layer name
        name: String,
        /// Charted position
        position: Position,
        /// Keep-clear radius in nautical miles
        buffer_nm: f64,
    },
    /// Pipeline or submarine cable.
    Cable {
        /// Layer name
        name: String,
        /// Cable track
        line: Vec<Position>,
        /// Width of the protected strip on each side, nautical miles
        buffer_nm: f64,
    },
    /// Harbor or pilotage zone where the offing rule does not apply.
    PilotageZone {
        /// Layer name
        name: String,
        /// Outer ring
        polygon: Vec<Position>,
    },
}

impl HazardGeometry {
    /// Layer name of the record.
    pub fn name(&self) -> &str {
        match self {
            HazardGeometry::Land { name, .. }
            | HazardGeometry::Restricted { name, .. }
            | HazardGeometry::TrafficSeparation { name, .. }
            | HazardGeometry::DepthArea { name, .. }
            | HazardGeometry::PointHazard { name, .. }
            | HazardGeometry::Cable { name, .. }
            | HazardGeometry::PilotageZone { name, .. } => name,
        }
    }

    /// True when crossing the geometry is never allowed.
    pub fn is_hard(&self) -> bool {
        matches!(
            self,
            HazardGeometry::Land { .. }
                | HazardGeometry::Restricted { .. }
                | HazardGeometry::PointHazard { .. }
        )
    }
}

/// Latitude/longitude box inside which hazard data is known to be
/// complete.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageArea {
    /// Southern edge, degrees
    pub south: f64,
    /// Western edge, degrees
    pub west: f64,
    /// Northern edge, degrees
    pub north: f64,
    /// Eastern edge, degrees
    pub east: f64,
}

impl CoverageArea {
    fn contains(&self, position: &Position) -> bool {
        (self.south..=self.north).contains(&position.latitude())
            && (self.west..=self.east).contains(&position.longitude())
    }
}

/// Where hazard data is known to be complete.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Coverage {
    /// Nothing declared; every position is unknown
    #[default]
    Undeclared,
    /// Complete everywhere
    Worldwide,
    /// Complete inside the listed boxes only
    Areas {
        /// Covered boxes
        areas: Vec<CoverageArea>,
    },
}

impl Coverage {
    fn contains(&self, position: &Position) -> bool {
        match self {
            Coverage::Undeclared => false,
            Coverage::Worldwide => true,
            Coverage::Areas { areas } => areas.iter().any(|a| a.contains(position)),
        }
    }
}

/// Serialized form of a hazard field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HazardLayers {
    /// All hazard records
    #[serde(default)]
    pub layers: Vec<HazardGeometry>,
    /// Where the layers are complete
    #[serde(default)]
    pub coverage: Coverage,
}

#[derive(Debug, Clone)]
enum Shape {
    Area(Polygon<f64>),
    Track(LineString<f64>),
    Spot(Point<f64>),
}

#[derive(Debug, Clone)]
struct Prepared {
    geometry: HazardGeometry,
    shape: Shape,
    bounds: Option<Rect<f64>>,
}

fn ring(points: &[Position]) -> Polygon<f64> {
    let exterior: LineString<f64> = points.iter().map(|p| Coord::from(*p)).collect();
    Polygon::new(exterior, vec![])
}

impl Prepared {
    fn new(geometry: HazardGeometry) -> Self {
        let shape = match &geometry {
            HazardGeometry::Land { polygon, .. }
            | HazardGeometry::Restricted { polygon, .. }
            | HazardGeometry::TrafficSeparation { polygon, .. }
            | HazardGeometry::DepthArea { polygon, .. }
            | HazardGeometry::PilotageZone { polygon, .. } => Shape::Area(ring(polygon)),
            HazardGeometry::Cable { line, .. } => {
                Shape::Track(line.iter().map(|p| Coord::from(*p)).collect())
            }
            HazardGeometry::PointHazard { position, .. } => Shape::Spot((*position).into()),
        };

        let bounds = match &shape {
            Shape::Area(polygon) => polygon.bounding_rect(),
            Shape::Track(line) => line.bounding_rect(),
            Shape::Spot(point) => Some(point.bounding_rect()),
        };

        Prepared {
            geometry,
            shape,
            bounds,
        }
    }

    fn buffer_nm(&self) -> f64 {
        match &self.geometry {
            HazardGeometry::PointHazard { buffer_nm, .. }
            | HazardGeometry::Cable { buffer_nm, .. } => *buffer_nm,
            _ => 0.0,
        }
    }

    /// Cheap bounding box rejection, with `margin_deg` of slack.
    fn may_touch(&self, rect: &Rect<f64>, margin_deg: f64) -> bool {
        let Some(bounds) = self.bounds else {
            return false;
        };

        bounds.min().x - margin_deg <= rect.max().x
            && bounds.max().x + margin_deg >= rect.min().x
            && bounds.min().y - margin_deg <= rect.max().y
            && bounds.max().y + margin_deg >= rect.min().y
    }

    fn touches_segment(&self, line: &Line<f64>) -> bool {
        match &self.shape {
            Shape::Area(polygon) => line.intersects(polygon),
            Shape::Track(track) => line.intersects(track),
            Shape::Spot(_) => false,
        }
    }
}

/// Local equirectangular projection to nautical miles around an origin.
#[derive(Debug, Copy, Clone)]
struct LocalProjection {
    origin: Coord<f64>,
    x_scale: f64,
    y_scale: f64,
}

impl LocalProjection {
    fn new(origin: Coord<f64>, nm_per_degree: f64) -> Self {
        LocalProjection {
            origin,
            x_scale: nm_per_degree * origin.y.to_radians().cos(),
            y_scale: nm_per_degree,
        }
    }

    fn project(&self, coord: Coord<f64>) -> Coord<f64> {
        let d_lon = bearing_difference(self.origin.x, coord.x);
        Coord {
            x: d_lon * self.x_scale,
            y: (coord.y - self.origin.y) * self.y_scale,
        }
    }

    fn line(&self, line: &Line<f64>) -> Line<f64> {
        Line::new(self.project(line.start), self.project(line.end))
    }

    fn distance_to_point(&self, point: &Point<f64>, shape: &Shape) -> f64 {
        let point = Point::from(self.project(point.0));
        match shape {
            Shape::Area(polygon) => point.euclidean_distance(&polygon.map_coords(|c| self.project(c))),
            Shape::Track(track) => point.euclidean_distance(&track.map_coords(|c| self.project(c))),
            Shape::Spot(spot) => point.euclidean_distance(&Point::from(self.project(spot.0))),
        }
    }

    fn distance_to_line(&self, line: &Line<f64>, shape: &Shape) -> f64 {
        let line = self.line(line);
        match shape {
            Shape::Area(polygon) => line.euclidean_distance(&polygon.map_coords(|c| self.project(c))),
            Shape::Track(track) => line.euclidean_distance(&track.map_coords(|c| self.project(c))),
            Shape::Spot(point) => Point::from(self.project(point.0)).euclidean_distance(&line),
        }
    }
}

/// Position of `coord` along `line` as a fraction of its length.
fn fraction_along(line: &Line<f64>, coord: Coord<f64>) -> f64 {
    let delta = line.delta();
    let t = if delta.x.abs() >= delta.y.abs() && delta.x != 0.0 {
        (coord.x - line.start.x) / delta.x
    } else if delta.y != 0.0 {
        (coord.y - line.start.y) / delta.y
    } else {
        0.0
    };
    t.clamp(0.0, 1.0)
}

fn point_along(line: &Line<f64>, fraction: f64) -> Coord<f64> {
    line.start + line.delta() * fraction
}

/// Queryable index over immutable hazard layers.
#[derive(Debug, Clone)]
pub struct HazardField {
    hazards: Vec<Prepared>,
    coverage: Coverage,
    nm_per_degree: f64,
}

impl Default for HazardField {
    fn default() -> Self {
        HazardField::new(HazardLayers::default(), &Sphere::default())
    }
}

impl HazardField {
    /// Builds a field from decoded hazard layers.
    pub fn new(layers: HazardLayers, sphere: &Sphere) -> Self {
        router_debug!(
            "(HazardField::new) {} hazard record(s), coverage {:?}.",
            layers.layers.len(),
            layers.coverage
        );

        HazardField {
            hazards: layers.layers.into_iter().map(Prepared::new).collect(),
            coverage: layers.coverage,
            nm_per_degree: sphere.radius_nm.to_radians(),
        }
    }

    /// Number of hazard records.
    pub fn len(&self) -> usize {
        self.hazards.len()
    }

    /// True when the field holds no hazard records.
    pub fn is_empty(&self) -> bool {
        self.hazards.is_empty()
    }

    fn segment(p1: &Position, p2: &Position) -> Line<f64> {
        Line::new(Coord::from(*p1), Coord::from(*p2))
    }

    fn margin_deg(&self, distance_nm: f64, latitude: f64) -> f64 {
        let cos_lat = latitude.to_radians().cos().abs().max(0.01);
        distance_nm / (self.nm_per_degree * cos_lat)
    }

    fn projection(&self, line: &Line<f64>) -> LocalProjection {
        LocalProjection::new(line.start, self.nm_per_degree)
    }

    /// Fails with [`RouterError::HazardDataIncomplete`] when `position`
    /// lies outside the declared coverage.
    pub fn check_coverage(&self, position: &Position) -> Result<(), RouterError> {
        if self.coverage.contains(position) {
            return Ok(());
        }

        Err(RouterError::HazardDataIncomplete {
            latitude: position.latitude(),
            longitude: position.longitude(),
        })
    }

    /// Coverage check for both ends and the midpoint of a segment.
    pub fn check_segment_coverage(&self, p1: &Position, p2: &Position) -> Result<(), RouterError> {
        let midpoint = Position::normalized(
            (p1.latitude() + p2.latitude()) / 2.0,
            p1.longitude() + bearing_difference(p1.longitude(), p2.longitude()) / 2.0,
        );

        self.check_coverage(p1)?;
        self.check_coverage(&midpoint)?;
        self.check_coverage(p2)
    }

    /// Every hazard record the segment crosses, including point hazards
    /// and cables whose buffer it enters.
    pub fn intersects_segment(&self, p1: &Position, p2: &Position) -> Vec<&HazardGeometry> {
        let line = Self::segment(p1, p2);
        let rect = line.bounding_rect();
        let projection = self.projection(&line);

        self.hazards
            .iter()
            .filter(|h| {
                let buffer = h.buffer_nm();
                h.may_touch(&rect, self.margin_deg(buffer, p1.latitude()))
                    && (h.touches_segment(&line)
                        || (buffer > 0.0 && projection.distance_to_line(&line, &h.shape) < buffer))
            })
            .map(|h| &h.geometry)
            .collect()
    }

    /// Hard hazards (land, restricted areas, point hazards) crossed by
    /// the segment.
    pub fn blocking_hazards(&self, p1: &Position, p2: &Position) -> Vec<&HazardGeometry> {
        self.intersects_segment(p1, p2)
            .into_iter()
            .filter(|h| h.is_hard())
            .collect()
    }

    /// Distance to the nearest hard hazard, or `None` if there is none.
    ///
    /// Zero when the position is inside one.
    pub fn distance_to_nearest_hazard(&self, position: &Position) -> Option<f64> {
        let point: Point<f64> = (*position).into();
        let projection = LocalProjection::new(point.0, self.nm_per_degree);

        self.hazards
            .iter()
            .filter(|h| h.geometry.is_hard())
            .map(|h| (projection.distance_to_point(&point, &h.shape) - h.buffer_nm()).max(0.0))
            .min_by(|a, b| a.total_cmp(b))
    }

    /// Smallest distance between the segment and any land, or `None`
    /// when no land lies within `search_nm`.
    pub fn segment_offing(&self, p1: &Position, p2: &Position, search_nm: f64) -> Option<f64> {
        let line = Self::segment(p1, p2);
        let rect = line.bounding_rect();
        let margin = self.margin_deg(search_nm, p1.latitude().abs().max(p2.latitude().abs()));
        let projection = self.projection(&line);

        self.hazards
            .iter()
            .filter(|h| matches!(h.geometry, HazardGeometry::Land { .. }))
            .filter(|h| h.may_touch(&rect, margin))
            .map(|h| projection.distance_to_line(&line, &h.shape))
            .min_by(|a, b| a.total_cmp(b))
    }

    /// True when the position is inside a restricted area.
    pub fn is_inside_restricted(&self, position: &Position) -> bool {
        let point: Point<f64> = (*position).into();
        self.hazards.iter().any(|h| match (&h.geometry, &h.shape) {
            (HazardGeometry::Restricted { .. }, Shape::Area(polygon)) => polygon.intersects(&point),
            _ => false,
        })
    }

    /// Offing of the parts of a segment outside every pilotage zone.
    ///
    /// The segment is cut where it crosses a zone boundary and only the
    /// pieces lying outside the zones are measured. `None` when those
    /// pieces have no land within `search_nm`.
    pub fn offing_outside_pilotage(
        &self,
        p1: &Position,
        p2: &Position,
        search_nm: f64,
    ) -> Option<f64> {
        let line = Self::segment(p1, p2);
        let rect = line.bounding_rect();
        let zones: Vec<&Polygon<f64>> = self
            .hazards
            .iter()
            .filter(|h| h.may_touch(&rect, 0.0))
            .filter_map(|h| match (&h.geometry, &h.shape) {
                (HazardGeometry::PilotageZone { .. }, Shape::Area(polygon)) => Some(polygon),
                _ => None,
            })
            .collect();
        if zones.is_empty() {
            return self.segment_offing(p1, p2, search_nm);
        }

        let mut cuts = vec![0.0, 1.0];
        for zone in &zones {
            let edges = zone
                .exterior()
                .lines()
                .chain(zone.interiors().iter().flat_map(|ring| ring.lines()));
            for edge in edges {
                match line_intersection(line, edge) {
                    Some(LineIntersection::SinglePoint { intersection, .. }) => {
                        cuts.push(fraction_along(&line, intersection));
                    }
                    Some(LineIntersection::Collinear { intersection }) => {
                        cuts.push(fraction_along(&line, intersection.start));
                        cuts.push(fraction_along(&line, intersection.end));
                    }
                    None => {}
                }
            }
        }
        cuts.sort_by(f64::total_cmp);
        cuts.dedup_by(|a, b| (*a - *b).abs() < 1e-12);

        cuts.windows(2)
            .filter(|w| {
                let middle = Point::from(point_along(&line, (w[0] + w[1]) / 2.0));
                !zones.iter().any(|zone| zone.intersects(&middle))
            })
            .filter_map(|w| {
                let (a, b) = (point_along(&line, w[0]), point_along(&line, w[1]));
                self.segment_offing(
                    &Position::normalized(a.y, a.x),
                    &Position::normalized(b.y, b.x),
                    search_nm,
                )
            })
            .min_by(|a, b| a.total_cmp(b))
    }

    /// True when the position is inside a harbor or pilotage zone.
    pub fn in_pilotage_zone(&self, position: &Position) -> bool {
        let point: Point<f64> = (*position).into();
        self.hazards.iter().any(|h| match (&h.geometry, &h.shape) {
            (HazardGeometry::PilotageZone { .. }, Shape::Area(polygon)) => {
                polygon.intersects(&point)
            }
            _ => false,
        })
    }

    /// Shallowest charted depth at a position, `None` if uncharted.
    pub fn min_charted_depth(&self, position: &Position) -> Option<f64> {
        let point: Point<f64> = (*position).into();
        self.hazards
            .iter()
            .filter_map(|h| match (&h.geometry, &h.shape) {
                (HazardGeometry::DepthArea { min_depth_m, .. }, Shape::Area(polygon))
                    if polygon.intersects(&point) =>
                {
                    Some(*min_depth_m)
                }
                _ => None,
            })
            .min_by(|a, b| a.total_cmp(b))
    }

    /// Shallowest charted depth anywhere along a segment.
    pub fn min_depth_along(&self, p1: &Position, p2: &Position) -> Option<f64> {
        let line = Self::segment(p1, p2);
        self.hazards
            .iter()
            .filter_map(|h| match (&h.geometry, &h.shape) {
                (HazardGeometry::DepthArea { min_depth_m, .. }, Shape::Area(polygon))
                    if line.intersects(polygon) =>
                {
                    Some(*min_depth_m)
                }
                _ => None,
            })
            .min_by(|a, b| a.total_cmp(b))
    }

    /// True when the segment crosses a traffic separation corridor more
    /// than `tolerance_deg` away from its mandated direction.
    pub fn violates_tss(
        &self,
        sphere: &Sphere,
        p1: &Position,
        p2: &Position,
        tolerance_deg: f64,
    ) -> bool {
        let line = Self::segment(p1, p2);
        let bearing = sphere.initial_bearing(p1, p2);

        self.hazards.iter().any(|h| match (&h.geometry, &h.shape) {
            (HazardGeometry::TrafficSeparation { direction_deg, .. }, Shape::Area(polygon)) => {
                line.intersects(polygon)
                    && bearing_difference(*direction_deg, bearing).abs() > tolerance_deg
            }
            _ => false,
        })
    }
}

/// Squat in metres, after Barrass.
///
/// `Cb * V^2 / 100` scaled by the depth to draft ratio: doubled in
/// confined shallow water (ratio 1.2 or less), unscaled at 1.5 and
/// vanishing in deep water (ratio 3.0 or more).
pub fn squat_m(block_coefficient: f64, speed_kts: f64, depth_m: f64, draft_m: f64) -> f64 {
    if draft_m <= 0.0 {
        return 0.0;
    }

    let ratio = depth_m / draft_m;
    let factor = if ratio <= 1.2 {
        2.0
    } else if ratio <= 1.5 {
        2.0 - (ratio - 1.2) / 0.3
    } else if ratio < 3.0 {
        1.0 - (ratio - 1.5) / 1.5
    } else {
        0.0
    };

    block_coefficient * speed_kts * speed_kts / 100.0 * factor
}

/// Under-keel clearance left once draft and squat are taken from the
/// charted depth.
pub fn under_keel_clearance(depth_m: f64, draft_m: f64, squat_m: f64) -> f64 {
    depth_m - draft_m - squat_m
}
