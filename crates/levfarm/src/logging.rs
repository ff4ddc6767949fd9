//! Keeper log output.
//!
//! Two sinks share one filter:
//! - `<log_dir>/levfarm.log.<date>`: one JSON object per event, rolled
//!   daily. Loop steps carry `iteration`, `deposits`, `borrows` fields so a
//!   lever-up or lever-down run can be replayed from the file.
//! - stderr: compact lines for the operator.
//!
//! The filter comes from `RUST_LOG` when set. Per-iteration loop steps are
//! logged at `debug`, so `RUST_LOG=levfarm::core=debug` shows them.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

const LOG_FILE_PREFIX: &str = "levfarm.log";

/// Verbose for this crate, warnings only for dependencies.
const DEFAULT_FILTER: &str = "levfarm=info,warn";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber. Keep the returned guard alive until exit;
/// dropping it flushes the file sink.
pub fn init_tracing(logging: &LoggingConfig) -> Result<WorkerGuard> {
    std::fs::create_dir_all(&logging.log_dir)
        .with_context(|| format!("failed to create log dir: {}", logging.log_dir))?;

    let (file_writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(
        &logging.log_dir,
        LOG_FILE_PREFIX,
    ));

    let json_file = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .json();
    let operator = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter())
        .with(json_file)
        .with(operator)
        .try_init()
        .context("tracing subscriber already installed")?;

    Ok(guard)
}
