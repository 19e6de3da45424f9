#![doc = include_str!("../README.md")]

use tokio::sync::OnceCell;

#[cfg(test)]
#[macro_use]
pub mod test_util;

pub mod config;
#[macro_use]
pub mod router;
pub mod scenario;
pub mod tasks;
pub use crate::config::Config;

/// Initialized log4rs handle
pub static LOG_HANDLE: OnceCell<Option<log4rs::Handle>> = OnceCell::const_new();
pub(crate) async fn get_log_handle() -> Option<log4rs::Handle> {
    LOG_HANDLE
        .get_or_init(|| async move {
            // Set up basic logger to make sure we can write to stdout
            let stdout = log4rs::append::console::ConsoleAppender::builder()
                .encoder(Box::new(log4rs::encode::pattern::PatternEncoder::new(
                    "{d(%Y-%m-%d %H:%M:%S)} | {I} | {h({l}):5.5} | {f}:{L} | {m}{n}",
                )))
                .build();
            match log4rs::config::Config::builder()
                .appender(log4rs::config::Appender::builder().build("stdout", Box::new(stdout)))
                .build(
                    log4rs::config::Root::builder()
                        .appender("stdout")
                        .build(log::LevelFilter::Debug),
                ) {
                Ok(config) => log4rs::init_config(config).ok(),
                Err(_) => None,
            }
        })
        .await
        .to_owned()
}

/// Initialize a log4rs logger with provided configuration file path
pub async fn load_logger_config_from_file(config_file: &str) -> Result<(), String> {
    let log_handle = get_log_handle()
        .await
        .ok_or("(load_logger_config_from_file) Could not get the log handle.")?;
    match log4rs::config::load_config_file(config_file, Default::default()) {
        Ok(config) => {
            log_handle.set_config(config);
            Ok(())
        }
        Err(e) => Err(format!(
            "(logger) Could not parse log config file [{}]: {}.",
            config_file, e,
        )),
    }
}

/// Tokio signal handler that will wait for a user to press CTRL+C.
/// The voyage loops of the binary stop once it returns.
///
/// # Examples
///
/// ## using a shutdown signal channel
/// ```
/// use svc_voyage::shutdown_signal;
/// pub async fn supervise() {
///     let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
///     let waiter = tokio::spawn(shutdown_signal("voyage", Some(shutdown_rx)));
///
///     // Request the shutdown
///     let _ = shutdown_tx.send(());
///     let _ = waiter.await;
/// }
/// ```
pub async fn shutdown_signal(
    service: &str,
    shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>,
) {
    let result = match shutdown_rx {
        Some(receiver) => receiver.await.map_err(|e| e.to_string()),
        None => tokio::signal::ctrl_c().await.map_err(|e| e.to_string()),
    };

    if let Err(e) = result {
        log::error!("(shutdown_signal) signal wait failed for [{}]: {}", service, e);
    }

    log::warn!("(shutdown_signal) shutdown for [{}].", service);
}
