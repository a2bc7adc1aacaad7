// tests/cli_logging.rs

use std::path::Path;

use clap::Parser;
use stepdag::cli::{CliArgs, LogLevel};
use stepdag::logging::resolve_directive;

#[test]
fn parses_required_and_optional_flags() {
    let args = CliArgs::try_parse_from([
        "stepdag",
        "--config",
        "stepdag.toml",
        "--process",
        "deploy",
        "--concurrency",
        "8",
        "--report-dir",
        "out",
        "--no-report",
        "--log-level",
        "debug",
        "--dry-run",
    ])
    .unwrap();

    assert_eq!(args.config, Path::new("stepdag.toml"));
    assert_eq!(args.process, "deploy");
    assert_eq!(args.concurrency, Some(8));
    assert_eq!(args.report_dir.as_deref(), Some(Path::new("out")));
    assert!(args.no_report);
    assert!(matches!(args.log_level, Some(LogLevel::Debug)));
    assert!(args.dry_run);
}

#[test]
fn config_and_process_are_required() {
    assert!(CliArgs::try_parse_from(["stepdag", "--config", "x.toml"]).is_err());
    assert!(CliArgs::try_parse_from(["stepdag", "--process", "p"]).is_err());
}

#[test]
fn zero_concurrency_is_rejected_at_parse_time() {
    let res = CliArgs::try_parse_from([
        "stepdag",
        "--config",
        "x.toml",
        "--process",
        "p",
        "--concurrency",
        "0",
    ]);
    assert!(res.is_err());
}

#[test]
fn cli_level_wins_over_environment() {
    assert_eq!(resolve_directive(Some(LogLevel::Warn), Some("trace")), "warn");
}

#[test]
fn environment_directive_is_used_verbatim() {
    assert_eq!(resolve_directive(None, Some("debug")), "debug");
    assert_eq!(
        resolve_directive(None, Some("stepdag::exec=trace,info")),
        "stepdag::exec=trace,info"
    );
}

#[test]
fn missing_or_invalid_environment_falls_back_to_info() {
    assert_eq!(resolve_directive(None, None), "info");
    assert_eq!(resolve_directive(None, Some("   ")), "info");
    assert_eq!(resolve_directive(None, Some("stepdag=loud")), "info");
}
