// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `stepdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "stepdag",
    version,
    about = "Run a multi-step process as a dependency graph.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    #[arg(long, value_name = "PATH")]
    pub config: PathBuf,

    /// Name of the `[process.<name>]` to execute.
    #[arg(long, value_name = "NAME")]
    pub process: String,

    /// Override `[config].concurrency_limit`.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    pub concurrency: Option<u64>,

    /// Override `[config].report_dir`.
    #[arg(long, value_name = "DIR")]
    pub report_dir: Option<PathBuf>,

    /// Do not write the execution report file.
    #[arg(long)]
    pub no_report: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `STEPDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the execution plan, but don't run any commands.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
