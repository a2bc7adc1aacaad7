// tests/config_loading.rs

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use stepdag::config::{ConfigFile, load_and_validate, load_from_fs, parse_str};
use stepdag::errors::StepdagError;
use stepdag::fs::MockFileSystem;
use stepdag::types::DurationSpec;
use stepdag_test_utils::builders::{ConfigFileBuilder, StepConfigBuilder};

const SAMPLE: &str = r#"
[config]
concurrency_limit = 2
report_dir = "out/reports"

[default]
timeout = "30s"
retry_delay = "250ms"
environment = { REGION = "eu", MODE = "default" }

[process.deploy]
description = "Build and ship"

[[process.deploy.steps]]
name = "build"
command = "make build"
retry_count = 2

[[process.deploy.steps]]
name = "ship"
command = "make ship"
dependencies = ["build"]
timeout = 600
critical = true
environment = { MODE = "release" }

[[process.deploy.steps]]
name = "rollback"
command = "make rollback"
condition = "step ship failed"
"#;

#[test]
fn parses_sections_and_applies_defaults() {
    let cfg = ConfigFile::try_from(parse_str(SAMPLE).unwrap()).unwrap();

    assert_eq!(cfg.config.concurrency_limit, 2);
    assert_eq!(cfg.config.report_dir, Path::new("out/reports"));
    assert!(cfg.config.write_report);
    assert_eq!(cfg.process_names().collect::<Vec<_>>(), vec!["deploy"]);

    let process = cfg.process_definition("deploy").unwrap();
    assert_eq!(process.description.as_deref(), Some("Build and ship"));
    let names: Vec<_> = process.steps.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["build", "ship", "rollback"]);

    let build = &process.steps[0];
    assert_eq!(build.timeout, Duration::from_secs(30));
    assert_eq!(build.retry_delay, Duration::from_millis(250));
    assert_eq!(build.max_attempts(), 3);
    assert!(!build.critical);

    let ship = &process.steps[1];
    assert_eq!(ship.timeout, Duration::from_secs(600));
    assert_eq!(ship.dependencies, vec!["build".to_string()]);
    assert!(ship.critical);
    assert_eq!(ship.environment["MODE"], "release");
    assert_eq!(ship.environment["REGION"], "eu");

    let rollback = &process.steps[2];
    let cond = rollback.condition.as_ref().unwrap();
    assert!(!cond.is_malformed());
    assert_eq!(cond.referenced_steps(), vec!["ship".to_string()]);
}

#[test]
fn empty_sections_fall_back_to_builtin_defaults() {
    let raw = parse_str(
        r#"
[[process.p.steps]]
name = "only"
command = "true"
"#,
    )
    .unwrap();
    let cfg = ConfigFile::try_from(raw).unwrap();

    assert_eq!(cfg.config.concurrency_limit, 4);
    assert_eq!(cfg.config.report_dir, Path::new("reports"));

    let step = &cfg.process_definition("p").unwrap().steps[0];
    assert_eq!(step.timeout, Duration::from_secs(300));
    assert_eq!(step.retry_delay, Duration::from_secs(5));
    assert_eq!(step.retry_count, 0);
    assert!(step.condition.is_none());
}

#[test]
fn loads_from_a_file_on_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(SAMPLE.as_bytes()).unwrap();

    let cfg = load_and_validate(file.path()).unwrap();
    assert!(cfg.process.contains_key("deploy"));
}

#[test]
fn loads_through_a_mock_filesystem() {
    let fs = MockFileSystem::new();
    fs.add_file("/etc/stepdag.toml", SAMPLE);

    let cfg = load_from_fs(&fs, Path::new("/etc/stepdag.toml")).unwrap();
    assert_eq!(cfg.config.concurrency_limit, 2);
}

#[test]
fn missing_file_is_a_config_error() {
    let fs = MockFileSystem::new();
    let err = load_from_fs(&fs, Path::new("/nope.toml")).unwrap_err();

    assert!(matches!(err, StepdagError::ConfigError(ref msg) if msg.contains("/nope.toml")));
    assert!(err.to_string().contains("not found"));
}

#[test]
fn a_directory_is_not_a_config_file() {
    let fs = MockFileSystem::new();
    fs.add_file("/etc/stepdag/extra.toml", SAMPLE);

    let err = load_from_fs(&fs, Path::new("/etc/stepdag")).unwrap_err();
    assert!(matches!(err, StepdagError::ConfigError(ref msg) if msg.contains("cannot read config")));
}

#[test]
fn invalid_toml_is_reported() {
    let err = parse_str("[[process.p.steps]\nname = ").unwrap_err();
    assert!(matches!(err, StepdagError::TomlError(_)));
}

#[test]
fn unknown_process_is_reported() {
    let cfg = ConfigFile::try_from(parse_str(SAMPLE).unwrap()).unwrap();

    match cfg.process_definition("missing") {
        Err(StepdagError::ProcessNotFound(name)) => assert_eq!(name, "missing"),
        other => panic!("expected ProcessNotFound, got {other:?}"),
    }
}

#[test]
fn config_without_processes_is_rejected() {
    let err = ConfigFile::try_from(parse_str("[config]\nconcurrency_limit = 2\n").unwrap()).unwrap_err();
    assert!(matches!(err, StepdagError::ConfigError(_)));
}

#[test]
fn zero_concurrency_is_rejected() {
    let raw = ConfigFileBuilder::new()
        .concurrency(0)
        .with_step("p", StepConfigBuilder::new("a", "true").build())
        .raw();

    assert!(matches!(
        ConfigFile::try_from(raw),
        Err(StepdagError::ConfigError(msg)) if msg.contains("concurrency_limit")
    ));
}

#[test]
fn bad_durations_are_rejected() {
    let raw = ConfigFileBuilder::new()
        .default_timeout("5 fortnights")
        .with_step("p", StepConfigBuilder::new("a", "true").build())
        .raw();
    assert!(matches!(ConfigFile::try_from(raw), Err(StepdagError::ConfigError(_))));

    let raw = ConfigFileBuilder::new()
        .with_step(
            "p",
            StepConfigBuilder::new("a", "true")
                .timeout(DurationSpec::Seconds(0))
                .build(),
        )
        .raw();
    assert!(matches!(
        ConfigFile::try_from(raw),
        Err(StepdagError::ConfigError(msg)) if msg.contains("greater than zero")
    ));
}

#[test]
fn zero_default_timeout_is_rejected() {
    let raw = ConfigFileBuilder::new()
        .default_timeout("0s")
        .with_step("p", StepConfigBuilder::new("a", "true").build())
        .raw();

    assert!(matches!(
        ConfigFile::try_from(raw),
        Err(StepdagError::ConfigError(msg))
            if msg.contains("[default].timeout") && msg.contains("greater than zero")
    ));
}

#[test]
fn oversized_durations_are_rejected_not_wrapped() {
    assert!(DurationSpec::Text("6000000000000000h".into()).to_duration().is_err());
    assert!(DurationSpec::Text("400000000000000000m".into()).to_duration().is_err());
    assert_eq!(
        DurationSpec::Text("2h".into()).to_duration().unwrap(),
        Duration::from_secs(7200)
    );

    let raw = ConfigFileBuilder::new()
        .default_timeout("6000000000000000h")
        .with_step("p", StepConfigBuilder::new("a", "true").build())
        .raw();
    assert!(matches!(
        ConfigFile::try_from(raw),
        Err(StepdagError::ConfigError(msg)) if msg.contains("too large")
    ));
}

#[test]
fn empty_command_is_rejected() {
    let raw = ConfigFileBuilder::new()
        .with_step("p", StepConfigBuilder::new("a", "   ").build())
        .raw();

    assert!(matches!(
        ConfigFile::try_from(raw),
        Err(StepdagError::ConfigError(msg)) if msg.contains("empty command")
    ));
}

#[test]
fn malformed_condition_is_kept_not_rejected() {
    let cfg = ConfigFileBuilder::new()
        .with_step("p", StepConfigBuilder::new("a", "true").build())
        .with_step(
            "p",
            StepConfigBuilder::new("b", "true").condition("step a ((").build(),
        )
        .build();

    let process = cfg.process_definition("p").unwrap();
    let cond = process.steps[1].condition.as_ref().unwrap();
    assert!(cond.is_malformed());
    assert_eq!(cond.source(), "step a ((");
}

#[test]
fn structural_errors_surface_when_the_graph_is_built() {
    let cfg = ConfigFileBuilder::new()
        .with_step("p", StepConfigBuilder::new("a", "true").after("b").build())
        .with_step("p", StepConfigBuilder::new("b", "true").after("a").build())
        .build();

    // The config itself is fine; the cycle is a property of the process.
    let process = cfg.process_definition("p").unwrap();
    assert!(matches!(
        stepdag::dag::DagGraph::from_process(&process),
        Err(StepdagError::CyclicDependency(_))
    ));
}

#[test]
fn duration_specs_accept_units_and_bare_seconds() {
    assert_eq!(
        DurationSpec::Text("250ms".into()).to_duration().unwrap(),
        Duration::from_millis(250)
    );
    assert_eq!(
        DurationSpec::Text("2m".into()).to_duration().unwrap(),
        Duration::from_secs(120)
    );
    assert_eq!(
        DurationSpec::Text("15".into()).to_duration().unwrap(),
        Duration::from_secs(15)
    );
    assert_eq!(DurationSpec::Seconds(3).to_duration().unwrap(), Duration::from_secs(3));
    assert!(DurationSpec::Text("".into()).to_duration().is_err());
    assert!(DurationSpec::Text("3d".into()).to_duration().is_err());
}
