//! Voyage planner entry point

use anyhow::Context;
use log::info;
use svc_voyage::scenario::Scenario;
use svc_voyage::*;
use tokio_util::sync::CancellationToken;

#[tokio::main]
#[cfg(not(tarpaulin_include))]
async fn main() -> anyhow::Result<()> {
    // Will use default config settings if no environment vars are found.
    let config = Config::try_from_env().context("Failed to load configuration from environment")?;

    // Try to load log configuration from the provided log file.
    // Will default to stdout debug logging if the file can not be loaded.
    if let Err(e) = load_logger_config_from_file(config.log_config.as_str()).await {
        log::error!("(main) {}", e);
    }

    info!("(main) Loading scenario [{}].", config.scenario_file);
    config.engine.validate()?;
    let scenario = Scenario::from_file(&config.scenario_file)?;

    // Ctrl-C stops the search; the best route found so far is printed
    let cancel = CancellationToken::new();
    let watcher = cancel.clone();
    let signal = tokio::spawn(async move {
        shutdown_signal("planner", None).await;
        watcher.cancel();
    });

    let engine = config.engine.clone();
    let search = cancel.clone();
    let report = tokio::task::spawn_blocking(move || scenario.plan(&engine, &search))
        .await
        .context("planning task failed")??;
    signal.abort();

    for warning in report.plan.warnings.iter().chain(report.eta.warnings.iter()) {
        log::warn!("(main) {}", warning);
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    info!("(main) Done.");

    // Make sure all log message are written/ displayed before shutdown
    log::logger().flush();

    Ok(())
}
