use std::{env, fs::File, path::PathBuf};

use color_eyre::{Result, eyre::Context};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::Config;

/// Env variable overriding the configured log filter, enabling logs even if they're disabled
pub const LOG_ENV: &str = "FLEET_SELECT_LOG";

/// Resolves the log path and filter based on the config and environment variable.
/// If logging is disabled, returns `None` for the filter.
pub fn resolve_path_and_filter(config: &Config) -> (PathBuf, Option<String>) {
    let logs_path = config.data_dir.join("fleet-select.log");
    (logs_path, resolve_filter(config, env::var(LOG_ENV).ok()))
}

fn resolve_filter(config: &Config, env_filter: Option<String>) -> Option<String> {
    (config.logs.enabled || env_filter.is_some()).then(|| env_filter.unwrap_or_else(|| config.logs.filter.clone()))
}

/// Initializes the tracing subscriber to output logs to a file
pub fn init(logs_path: PathBuf, filter: Option<String>) -> Result<()> {
    if let Some(filter) = filter {
        if let Some(parent) = logs_path.parent() {
            std::fs::create_dir_all(parent)
                .wrap_err_with(|| format!("Couldn't create the data dir: {}", parent.display()))?;
        }
        let log_file = File::create(&logs_path)
            .wrap_err_with(|| format!("Couldn't create the log file: {}", logs_path.display()))?;
        let env_filter = EnvFilter::builder()
            .with_default_directive(tracing::Level::WARN.into())
            .parse(filter)
            .wrap_err("Couldn't parse the log filter")?;
        let file_subscriber = fmt::layer()
            .with_file(true)
            .with_line_number(true)
            .with_writer(log_file)
            .with_target(false)
            .with_ansi(false)
            .with_filter(env_filter);
        tracing_subscriber::registry()
            .with(file_subscriber)
            .with(ErrorLayer::default())
            .init();
    }
    Ok(())
}
