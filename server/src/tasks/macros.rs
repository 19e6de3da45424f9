//! log macro's for voyage task logging

/// Writes a debug! message to the app::tasks logger
#[macro_export]
macro_rules! tasks_debug {
    ($($arg:tt)+) => {
        log::debug!(target: "app::tasks", $($arg)+)
    };
}

/// Writes an info! message to the app::tasks logger
#[macro_export]
macro_rules! tasks_info {
    ($($arg:tt)+) => {
        log::info!(target: "app::tasks", $($arg)+)
    };
}

/// Writes an warn! message to the app::tasks logger
#[macro_export]
macro_rules! tasks_warn {
    ($($arg:tt)+) => {
        log::warn!(target: "app::tasks", $($arg)+)
    };
}

/// Writes an error! message to the app::tasks logger
#[macro_export]
macro_rules! tasks_error {
    ($($arg:tt)+) => {
        log::error!(target: "app::tasks", $($arg)+)
    };
}
