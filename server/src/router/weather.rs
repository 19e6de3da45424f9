//! Time-indexed weather grid.
//!
//! Samples are snapped to grid lines inferred from the latitudes and
//! longitudes they were delivered with, and bucketed by forecast time.
//! Lookups interpolate bilinearly in space and linearly in time. Wind and current are
//! blended as vector components so opposing directions cancel instead
//! of averaging to a meaningless bearing.

use chrono::{DateTime, Duration, Utc};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::router::router_types::location::Position;
use crate::router::router_utils::geodesy::normalize_bearing;

/// Local environmental conditions.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conditions {
    /// Wind speed, knots
    pub wind_speed_kts: f64,
    /// Direction the wind blows from, degrees true
    pub wind_direction_deg: f64,
    /// Significant wave height, metres
    pub wave_height_m: f64,
    /// Current speed, knots
    pub current_speed_kts: f64,
    /// Direction the current sets towards, degrees true
    pub current_direction_deg: f64,
    /// Mean sea level pressure, hPa
    #[serde(default = "standard_pressure")]
    pub pressure_hpa: f64,
    /// Air temperature, degrees Celsius
    #[serde(default = "standard_temperature")]
    pub temperature_c: f64,
}

fn standard_pressure() -> f64 {
    1013.25
}

fn standard_temperature() -> f64 {
    15.0
}

impl Conditions {
    /// Flat calm under a standard atmosphere.
    pub fn calm() -> Self {
        Conditions {
            wind_speed_kts: 0.0,
            wind_direction_deg: 0.0,
            wave_height_m: 0.0,
            current_speed_kts: 0.0,
            current_direction_deg: 0.0,
            pressure_hpa: standard_pressure(),
            temperature_c: standard_temperature(),
        }
    }
}

/// Conditions at a position and time.
///
/// `stale` marks values obtained by holding the last forecast past the
/// horizon, clamping to the grid edge or falling back to calm.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSample {
    /// Sample position
    pub position: Position,
    /// Valid time
    pub time: DateTime<Utc>,
    /// Conditions at `position` and `time`
    #[serde(flatten)]
    pub conditions: Conditions,
    /// True when the value is extrapolated
    #[serde(default)]
    pub stale: bool,
}

/// Running weighted sum of conditions.
#[derive(Debug, Default, Copy, Clone)]
struct Blend {
    weight: f64,
    wind_u: f64,
    wind_v: f64,
    wave: f64,
    current_u: f64,
    current_v: f64,
    pressure: f64,
    temperature: f64,
}

impl Blend {
    fn add(&mut self, c: &Conditions, weight: f64) {
        let wind = c.wind_direction_deg.to_radians();
        let current = c.current_direction_deg.to_radians();

        self.weight += weight;
        self.wind_u += weight * c.wind_speed_kts * wind.sin();
        self.wind_v += weight * c.wind_speed_kts * wind.cos();
        self.wave += weight * c.wave_height_m;
        self.current_u += weight * c.current_speed_kts * current.sin();
        self.current_v += weight * c.current_speed_kts * current.cos();
        self.pressure += weight * c.pressure_hpa;
        self.temperature += weight * c.temperature_c;
    }

    fn finish(&self) -> Option<Conditions> {
        if self.weight <= 0.0 {
            return None;
        }

        let w = self.weight;
        let (wind_u, wind_v) = (self.wind_u / w, self.wind_v / w);
        let (current_u, current_v) = (self.current_u / w, self.current_v / w);

        Some(Conditions {
            wind_speed_kts: wind_u.hypot(wind_v),
            wind_direction_deg: normalize_bearing(wind_u.atan2(wind_v).to_degrees()),
            wave_height_m: self.wave / w,
            current_speed_kts: current_u.hypot(current_v),
            current_direction_deg: normalize_bearing(current_u.atan2(current_v).to_degrees()),
            pressure_hpa: self.pressure / w,
            temperature_c: self.temperature / w,
        })
    }
}

/// Position of a value between two grid lines.
#[derive(Debug, Copy, Clone)]
struct Bracket {
    lower: usize,
    upper: usize,
    fraction: f64,
    clamped: bool,
}

fn bracket(axis: &[f64], value: f64) -> Bracket {
    let last = axis.len() - 1;
    if value <= axis[0] {
        return Bracket {
            lower: 0,
            upper: 0,
            fraction: 0.0,
            clamped: value < axis[0],
        };
    }
    if value >= axis[last] {
        return Bracket {
            lower: last,
            upper: last,
            fraction: 0.0,
            clamped: value > axis[last],
        };
    }

    let upper = axis.partition_point(|v| *v <= value);
    let lower = upper - 1;
    let span = axis[upper] - axis[lower];
    Bracket {
        lower,
        upper,
        fraction: if span > 0.0 {
            (value - axis[lower]) / span
        } else {
            0.0
        },
        clamped: false,
    }
}

/// Spacing ratio separating jitter from grid spacing.
const SPACING_BREAK: f64 = 5.0;

/// Grid lines of one axis.
///
/// Coordinates closer together than the natural break in their spacing
/// collapse onto one line placed at their mean.
#[derive(Debug, Clone, Default)]
struct Axis {
    lines: Vec<f64>,
    /// Smallest and largest member coordinate of each line
    members: Vec<(f64, f64)>,
}

impl Axis {
    fn infer(values: impl Iterator<Item = f64>) -> Self {
        let distinct: Vec<f64> = values
            .map(OrderedFloat)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(|v| v.into_inner())
            .collect();

        let mut gaps: Vec<f64> = distinct.windows(2).map(|w| w[1] - w[0]).collect();
        gaps.sort_by(f64::total_cmp);
        let tolerance = gaps
            .windows(2)
            .filter(|w| w[1] > SPACING_BREAK * w[0])
            .map(|w| w[0])
            .last()
            .unwrap_or(0.0);

        let mut axis = Axis::default();
        let mut cluster: Vec<f64> = vec![];
        for value in distinct {
            if let Some(last) = cluster.last() {
                if value - last > tolerance {
                    axis.push(&cluster);
                    cluster.clear();
                }
            }
            cluster.push(value);
        }
        if !cluster.is_empty() {
            axis.push(&cluster);
        }

        axis
    }

    fn push(&mut self, cluster: &[f64]) {
        let (Some(first), Some(last)) = (cluster.first(), cluster.last()) else {
            return;
        };
        self.lines.push(cluster.iter().sum::<f64>() / cluster.len() as f64);
        self.members.push((*first, *last));
    }

    fn len(&self) -> usize {
        self.lines.len()
    }

    /// Line a delivered coordinate was snapped to.
    fn index_of(&self, value: f64) -> Option<usize> {
        let index = self.members.partition_point(|(low, _)| *low <= value).checked_sub(1)?;
        (value <= self.members[index].1).then_some(index)
    }
}

/// Immutable weather field for one refresh cycle.
#[derive(Debug, Clone)]
pub struct WeatherField {
    latitudes: Axis,
    longitudes: Axis,
    times: Vec<DateTime<Utc>>,
    cells: Vec<Option<Conditions>>,
    horizon: Duration,
}

impl Default for WeatherField {
    fn default() -> Self {
        WeatherField::new(vec![], Duration::hours(72))
    }
}

impl WeatherField {
    /// Builds a field from delivered samples.
    ///
    /// Jittered positions are snapped to the nearest inferred grid
    /// line. Later samples for the same grid point and time replace
    /// earlier ones. `horizon` is measured from the earliest forecast time.
    pub fn new(samples: Vec<WeatherSample>, horizon: Duration) -> Self {
        let latitudes = Axis::infer(samples.iter().map(|s| s.position.latitude()));
        let longitudes = Axis::infer(samples.iter().map(|s| s.position.longitude()));
        let times: Vec<DateTime<Utc>> = samples
            .iter()
            .map(|s| s.time)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut cells = vec![None; latitudes.len() * longitudes.len() * times.len()];
        for sample in &samples {
            let index = (
                latitudes.index_of(sample.position.latitude()),
                longitudes.index_of(sample.position.longitude()),
                times.binary_search(&sample.time).ok(),
            );
            if let (Some(i), Some(j), Some(k)) = index {
                cells[(k * latitudes.len() + i) * longitudes.len() + j] = Some(sample.conditions);
            }
        }

        router_debug!(
            "(WeatherField::new) {} sample(s) on a {}x{} grid with {} forecast time(s).",
            samples.len(),
            latitudes.len(),
            longitudes.len(),
            times.len()
        );

        WeatherField {
            latitudes,
            longitudes,
            times,
            cells,
            horizon,
        }
    }

    /// True when the field holds no samples.
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// First and last forecast times, if any.
    pub fn time_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        Some((*self.times.first()?, *self.times.last()?))
    }

    /// Last time that can be served without extrapolation.
    pub fn valid_until(&self) -> Option<DateTime<Utc>> {
        let (first, last) = self.time_range()?;
        Some(last.min(first + self.horizon))
    }

    fn cell(&self, time: usize, lat: usize, lon: usize) -> Option<&Conditions> {
        self.cells
            .get((time * self.latitudes.len() + lat) * self.longitudes.len() + lon)?
            .as_ref()
    }

    /// Conditions at one forecast time.
    ///
    /// Returns the blend and whether the position had to be clamped to
    /// the grid or filled from the nearest available point.
    fn sample_slice(&self, time: usize, position: &Position) -> (Option<Conditions>, bool) {
        let lat = bracket(&self.latitudes.lines, position.latitude());
        let lon = bracket(&self.longitudes.lines, position.longitude());

        let corners = [
            (lat.lower, lon.lower, (1.0 - lat.fraction) * (1.0 - lon.fraction)),
            (lat.lower, lon.upper, (1.0 - lat.fraction) * lon.fraction),
            (lat.upper, lon.lower, lat.fraction * (1.0 - lon.fraction)),
            (lat.upper, lon.upper, lat.fraction * lon.fraction),
        ];

        let mut blend = Blend::default();
        let mut missing = false;
        for (i, j, weight) in corners {
            match self.cell(time, i, j) {
                Some(c) => blend.add(c, weight),
                None if weight > 0.0 => missing = true,
                None => {}
            }
        }

        // a partial cell is filled, not interpolated
        let clamped = lat.clamped || lon.clamped || missing;
        if let Some(conditions) = blend.finish() {
            return (Some(conditions), clamped);
        }

        if !missing {
            return (None, clamped);
        }

        // no surrounding corner carries data, use the nearest point
        let nearest = (0..self.latitudes.len())
            .flat_map(|i| (0..self.longitudes.len()).map(move |j| (i, j)))
            .filter_map(|(i, j)| {
                let c = self.cell(time, i, j)?;
                let d_lat = self.latitudes.lines[i] - position.latitude();
                let d_lon = self.longitudes.lines[j] - position.longitude();
                Some((d_lat * d_lat + d_lon * d_lon, c))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, c)| *c);

        (nearest, true)
    }

    /// Interpolated conditions at `position` and `time`.
    ///
    /// Never fails: beyond the horizon the last forecast is held, and an
    /// empty field yields calm. Both cases set `stale`.
    pub fn sample_at(&self, position: &Position, time: DateTime<Utc>) -> WeatherSample {
        let stale_calm = WeatherSample {
            position: *position,
            time,
            conditions: Conditions::calm(),
            stale: true,
        };

        let (Some((first, _)), Some(valid_until)) = (self.time_range(), self.valid_until()) else {
            return stale_calm;
        };

        let mut stale = time < first || time > valid_until;
        let query = time.clamp(first, valid_until);

        let upper = self.times.partition_point(|t| *t <= query).max(1).min(self.times.len());
        let lower = upper - 1;
        let (lower_time, upper_index, fraction) = match self.times.get(upper) {
            Some(next) if *next > self.times[lower] => {
                let span = (*next - self.times[lower]).num_seconds() as f64;
                let offset = (query - self.times[lower]).num_seconds() as f64;
                (lower, upper, (offset / span).clamp(0.0, 1.0))
            }
            _ => (lower, lower, 0.0),
        };

        let (before, before_clamped) = self.sample_slice(lower_time, position);
        let (after, after_clamped) = self.sample_slice(upper_index, position);
        stale |= before_clamped || after_clamped;

        let mut blend = Blend::default();
        if let Some(c) = before {
            blend.add(&c, 1.0 - fraction);
        }
        if let Some(c) = after {
            blend.add(&c, fraction);
        }

        match blend.finish().or(before).or(after) {
            Some(conditions) => WeatherSample {
                position: *position,
                time,
                conditions,
                stale,
            },
            None => stale_calm,
        }
    }
}
