// src/logging.rs

//! Logging setup for `stepdag` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log filter:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `STEPDAG_LOG` environment variable, either a bare level ("debug") or a
//!    full filter directive ("stepdag::exec=trace,info")
//! 3. default to `info`
//!
//! Logs are sent to STDERR so that stdout stays free for the dry-run plan
//! and the report path.

use anyhow::{Result, anyhow};
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

/// Environment variable consulted when `--log-level` is absent.
pub const LOG_ENV: &str = "STEPDAG_LOG";

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env_value = std::env::var(LOG_ENV).ok();
    let directive = resolve_directive(cli_level, env_value.as_deref());

    let filter = EnvFilter::try_new(&directive)
        .map_err(|e| anyhow!("invalid log filter '{directive}': {e}"))?;

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to initialise logging: {e}"))
}

/// Pick the filter directive: CLI flag, then env value, then `info`.
///
/// Unparseable env values fall back to `info` instead of aborting startup.
pub fn resolve_directive(cli_level: Option<LogLevel>, env_value: Option<&str>) -> String {
    if let Some(lvl) = cli_level {
        return level_name(lvl).to_string();
    }

    match env_value.map(str::trim).filter(|s| !s.is_empty()) {
        Some(value) if EnvFilter::try_new(value).is_ok() => value.to_string(),
        _ => "info".to_string(),
    }
}

fn level_name(lvl: LogLevel) -> &'static str {
    match lvl {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}
