//! test utilities. Provides logging macros and fixtures shared by the
//! unit tests.

use chrono::{DateTime, TimeZone, Utc};

use crate::router::router_types::location::Position;

pub use crate::router::router_utils::mock::{
    calm_weather, land_block, los_angeles, sample_vessel, san_francisco, wave_corridor_weather,
};

/// Writes a debug! message to the app::test logger
#[macro_export]
macro_rules! ut_debug {
    ($($arg:tt)+) => {
        log::debug!(target: "app::test", $($arg)+)
    };
}

/// Writes an info! message to the app::test logger
#[macro_export]
macro_rules! ut_info {
    ($($arg:tt)+) => {
        log::info!(target: "app::test", $($arg)+)
    };
}

/// Writes an warn! message to the app::test logger
#[macro_export]
macro_rules! ut_warn {
    ($($arg:tt)+) => {
        log::warn!(target: "app::test", $($arg)+)
    };
}

/// Writes an error! message to the app::test logger
#[macro_export]
macro_rules! ut_error {
    ($($arg:tt)+) => {
        log::error!(target: "app::test", $($arg)+)
    };
}

/// Shorthand for a valid position.
pub fn pos(latitude: f64, longitude: f64) -> Position {
    Position::new(latitude, longitude).unwrap()
}

/// Fixed departure time used across tests.
pub fn departure() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
}
