//! Structured logging for the CnCNet lobby client.
//!
//! Installs a `tracing` subscriber with console output and, when enabled, a
//! JSON log file for post-mortem analysis of lobby sessions. The level comes
//! from `RUST_LOG`, then the config's `debug.log_level`, then the default.

use cncnet_config::Config;
use std::path::Path;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "info,cncnet_irc=info,cncnet_lan=info";
const LOG_FILE: &str = "cncnet.log";

/// Initialize the tracing subscriber.
///
/// * `log_dir` - Directory for the JSON log file
/// * `file_logging` - Whether to write `cncnet.log` into `log_dir`
/// * `config` - Optional configuration supplying the log level
///
/// # Examples
///
/// ```no_run
/// use cncnet_log::init_logging;
///
/// init_logging(None, false, None);
/// ```
pub fn init_logging(log_dir: Option<&Path>, file_logging: bool, config: Option<&Config>) {
    let filter_str = filter_string(config);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(true)
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    if file_logging
        && let Some(log_dir) = log_dir
        && let Some(log_file) = open_log_file(log_dir)
    {
        let file_layer = fmt::layer()
            .with_writer(log_file)
            .with_ansi(false)
            .with_target(true)
            .with_timer(fmt::time::uptime())
            .json();

        subscriber.with(file_layer).init();
        return;
    }

    subscriber.init();
}

/// Create `log_dir` and truncate `cncnet.log` inside it.
fn open_log_file(log_dir: &Path) -> Option<std::fs::File> {
    std::fs::create_dir_all(log_dir).ok()?;
    std::fs::File::create(log_dir.join(LOG_FILE)).ok()
}

/// Filter directive derived from the config, falling back to the default.
fn filter_string(config: Option<&Config>) -> String {
    match config {
        Some(config) if !config.debug.log_level.is_empty() => config.debug.log_level.clone(),
        _ => DEFAULT_FILTER.to_string(),
    }
}

/// Create an `EnvFilter` with the default filter string.
pub fn default_env_filter() -> EnvFilter {
    EnvFilter::new(DEFAULT_FILTER)
}
