// tests/process_scenarios.rs

//! End-to-end runs through the real runtime and step runner, with a scripted
//! command runner standing in for the shell.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use stepdag::dag::{SkipReason, StepStatus};
use stepdag::engine::RunOptions;
use stepdag::errors::StepdagError;
use stepdag::exec::CommandRunner;
use stepdag::fs::{FileSystem, MockFileSystem};
use stepdag::{execute_and_report, execute_process};
use stepdag_test_utils::builders::{
    ConfigFileBuilder, ProcessBuilder, StepBuilder, StepConfigBuilder,
};
use stepdag_test_utils::fake_runner::FakeCommandRunner;
use stepdag_test_utils::{init_tracing, with_timeout};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn as_runner(fake: &Arc<FakeCommandRunner>) -> Arc<dyn CommandRunner> {
    fake.clone()
}

fn options(limit: usize) -> RunOptions {
    RunOptions {
        concurrency_limit: limit,
    }
}

#[tokio::test]
async fn diamond_of_successes_reports_full_success() {
    init_tracing();

    let process = ProcessBuilder::new("build")
        .step(StepBuilder::new("A"))
        .step(StepBuilder::new("B").after("A"))
        .step(StepBuilder::new("C").after("A"))
        .build();
    let fake = FakeCommandRunner::new()
        .delay("B", Duration::from_millis(50))
        .delay("C", Duration::from_millis(50))
        .into_arc();

    let report = with_timeout(execute_process(
        &process,
        as_runner(&fake),
        options(4),
        CancellationToken::new(),
    ))
    .await
    .unwrap();

    assert_eq!(fake.calls()[0], "A");
    assert_eq!(fake.max_concurrency(), 2, "B and C should overlap");
    assert!(report.results.values().all(|ok| *ok));
    assert_eq!(report.results.len(), 3);
    assert_eq!(report.success_rate, 1.0);
    assert!(report.success);
    assert_eq!(report.process, "build");
}

#[tokio::test]
async fn critical_step_exhausts_retries_and_cancels_dependent() {
    init_tracing();

    let process = ProcessBuilder::new("p")
        .step(StepBuilder::new("A").critical().retries(2))
        .step(StepBuilder::new("B").after("A"))
        .build();
    let fake = FakeCommandRunner::new().failing("A").into_arc();

    let report = with_timeout(execute_process(
        &process,
        as_runner(&fake),
        options(4),
        CancellationToken::new(),
    ))
    .await
    .unwrap();

    assert_eq!(fake.attempts_of("A"), 3);
    assert_eq!(fake.attempts_of("B"), 0);
    assert_eq!(report.steps["A"].status, StepStatus::Failed);
    assert_eq!(report.steps["A"].attempts, 3);
    assert_eq!(report.steps["B"].status, StepStatus::Cancelled);
    assert_eq!(report.steps["B"].attempts, 0);
    assert_eq!(report.results["A"], false);
    assert_eq!(report.results["B"], false);
    assert!(!report.success);
}

#[tokio::test]
async fn cycle_is_rejected_before_anything_runs() {
    init_tracing();

    let process = ProcessBuilder::new("p")
        .step(StepBuilder::new("A").after("B"))
        .step(StepBuilder::new("B").after("A"))
        .build();
    let fake = FakeCommandRunner::new().into_arc();

    let err = with_timeout(execute_process(
        &process,
        as_runner(&fake),
        options(4),
        CancellationToken::new(),
    ))
    .await
    .unwrap_err();

    assert!(matches!(err, StepdagError::CyclicDependency(_)));
    assert!(err.is_structural());
    assert!(fake.calls().is_empty());
}

#[tokio::test]
async fn independent_branch_completes_despite_unrelated_failure() {
    init_tracing();

    let process = ProcessBuilder::new("p")
        .step(StepBuilder::new("A"))
        .step(StepBuilder::new("D"))
        .build();
    let fake = FakeCommandRunner::new().failing("A").into_arc();

    let report = with_timeout(execute_process(
        &process,
        as_runner(&fake),
        options(4),
        CancellationToken::new(),
    ))
    .await
    .unwrap();

    assert_eq!(report.results["A"], false);
    assert_eq!(report.results["D"], true);
    assert_eq!(report.steps["D"].status, StepStatus::Completed);
    assert_eq!(report.success_rate, 0.5);
    assert!(!report.success);
}

#[tokio::test]
async fn compensation_step_runs_when_its_condition_sees_a_failure() {
    init_tracing();

    let process = ProcessBuilder::new("p")
        .step(StepBuilder::new("A"))
        .step(StepBuilder::new("E").condition("step A failed"))
        .build();
    let fake = FakeCommandRunner::new().failing("A").into_arc();

    let report = with_timeout(execute_process(
        &process,
        as_runner(&fake),
        options(4),
        CancellationToken::new(),
    ))
    .await
    .unwrap();

    assert_eq!(fake.calls(), vec!["A", "E"]);
    assert_eq!(report.steps["A"].status, StepStatus::Failed);
    assert_eq!(report.steps["E"].status, StepStatus::Completed);
    assert!(!report.success);
}

#[tokio::test]
async fn false_condition_skips_without_failing_the_run() {
    init_tracing();

    let process = ProcessBuilder::new("p")
        .step(StepBuilder::new("A"))
        .step(StepBuilder::new("cleanup").condition("step A failed"))
        .step(StepBuilder::new("after").after("cleanup"))
        .build();
    let fake = FakeCommandRunner::new().into_arc();

    let report = with_timeout(execute_process(
        &process,
        as_runner(&fake),
        options(4),
        CancellationToken::new(),
    ))
    .await
    .unwrap();

    assert_eq!(fake.calls(), vec!["A"]);
    assert_eq!(
        report.steps["cleanup"].skip_reason,
        Some(SkipReason::ConditionNotMet)
    );
    assert_eq!(
        report.steps["after"].skip_reason,
        Some(SkipReason::UpstreamSkipped {
            dependency: "cleanup".into()
        })
    );
    assert_eq!(report.steps["cleanup"].attempts, 0);
    assert_eq!(report.steps["after"].attempts, 0);
    assert_eq!(report.steps["A"].attempts, 1);
    assert_eq!(report.results["cleanup"], false);
    assert!(report.success);
}

#[tokio::test]
async fn malformed_condition_skips_only_its_own_step() {
    init_tracing();

    let process = ProcessBuilder::new("p")
        .step(StepBuilder::new("A"))
        .step(StepBuilder::new("B").condition("step A ???"))
        .step(StepBuilder::new("C").after("A"))
        .build();
    let fake = FakeCommandRunner::new().into_arc();

    let report = with_timeout(execute_process(
        &process,
        as_runner(&fake),
        options(4),
        CancellationToken::new(),
    ))
    .await
    .unwrap();

    assert_eq!(fake.attempts_of("B"), 0);
    let b = &report.steps["B"];
    assert_eq!(b.status, StepStatus::Skipped);
    assert!(matches!(
        b.skip_reason,
        Some(SkipReason::ConditionError { .. })
    ));
    assert!(b.error.is_some());
    assert_eq!(report.steps["C"].status, StepStatus::Completed);
}

#[tokio::test]
async fn concurrency_limit_is_never_exceeded() {
    init_tracing();

    let mut builder = ProcessBuilder::new("wide");
    let mut fake = FakeCommandRunner::new();
    for i in 0..6 {
        let name = format!("s{i}");
        fake = fake.delay(&name, Duration::from_millis(30));
        builder = builder.step(StepBuilder::new(&name));
    }
    let fake = fake.into_arc();

    let report = with_timeout(execute_process(
        &builder.build(),
        as_runner(&fake),
        options(2),
        CancellationToken::new(),
    ))
    .await
    .unwrap();

    assert!(report.success);
    assert_eq!(fake.calls().len(), 6);
    assert!(fake.max_concurrency() <= 2);
}

#[tokio::test]
async fn flaky_step_succeeds_within_its_retry_budget() {
    init_tracing();

    let process = ProcessBuilder::new("p")
        .step(StepBuilder::new("flaky").retries(3))
        .step(StepBuilder::new("next").after("flaky"))
        .build();
    let fake = FakeCommandRunner::new().failing_times("flaky", 2).into_arc();

    let report = with_timeout(execute_process(
        &process,
        as_runner(&fake),
        options(4),
        CancellationToken::new(),
    ))
    .await
    .unwrap();

    assert_eq!(fake.attempts_of("flaky"), 3);
    assert_eq!(report.steps["flaky"].attempts, 3);
    assert_eq!(report.steps["flaky"].status, StepStatus::Completed);
    assert_eq!(report.steps["flaky"].error, None);
    assert_eq!(report.steps["next"].status, StepStatus::Completed);
    assert!(report.success);
}

#[tokio::test]
async fn retry_waits_out_the_delay_between_attempts() {
    init_tracing();

    let delay = Duration::from_millis(200);
    let process = ProcessBuilder::new("p")
        .step(StepBuilder::new("flaky").retries(1).retry_delay(delay))
        .build();
    let fake = FakeCommandRunner::new().failing_times("flaky", 1).into_arc();

    let started = Instant::now();
    let report = with_timeout(execute_process(
        &process,
        as_runner(&fake),
        options(4),
        CancellationToken::new(),
    ))
    .await
    .unwrap();

    assert!(
        started.elapsed() >= delay,
        "second attempt came after {:?}",
        started.elapsed()
    );
    assert_eq!(fake.attempts_of("flaky"), 2);
    assert_eq!(report.steps["flaky"].status, StepStatus::Completed);
    assert_eq!(report.steps["flaky"].attempts, 2);
}

#[tokio::test]
async fn critical_failure_cancels_a_step_waiting_to_retry() {
    init_tracing();

    let process = ProcessBuilder::new("p")
        .step(
            StepBuilder::new("R")
                .retries(3)
                .retry_delay(Duration::from_secs(10)),
        )
        .step(StepBuilder::new("C").critical())
        .build();
    let fake = FakeCommandRunner::new()
        .failing("R")
        .failing("C")
        .delay("C", Duration::from_millis(100))
        .into_arc();

    let started = Instant::now();
    let report = with_timeout(execute_process(
        &process,
        as_runner(&fake),
        options(4),
        CancellationToken::new(),
    ))
    .await
    .unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(fake.attempts_of("R"), 1);
    assert_eq!(report.steps["R"].status, StepStatus::Cancelled);
    assert_eq!(report.steps["R"].attempts, 1);
    assert_eq!(report.steps["C"].status, StepStatus::Failed);
    assert!(!report.success);
}

#[tokio::test]
async fn stop_token_cancels_a_step_waiting_to_retry() {
    init_tracing();

    let process = ProcessBuilder::new("p")
        .step(
            StepBuilder::new("R")
                .retries(3)
                .retry_delay(Duration::from_secs(10)),
        )
        .step(StepBuilder::new("next").after("R"))
        .build();
    let fake = FakeCommandRunner::new().failing("R").into_arc();

    let stop = CancellationToken::new();
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            stop.cancel();
        });
    }

    let report = with_timeout(execute_process(
        &process,
        as_runner(&fake),
        options(4),
        stop,
    ))
    .await
    .unwrap();

    assert_eq!(fake.attempts_of("R"), 1);
    assert_eq!(report.steps["R"].status, StepStatus::Cancelled);
    assert_eq!(report.steps["next"].status, StepStatus::Cancelled);
    assert!(!report.success);
}

#[tokio::test]
async fn other_steps_run_while_one_waits_to_retry() {
    init_tracing();

    let process = ProcessBuilder::new("p")
        .step(
            StepBuilder::new("R")
                .retries(1)
                .retry_delay(Duration::from_millis(300)),
        )
        .step(StepBuilder::new("B"))
        .step(StepBuilder::new("C").after("B"))
        .build();
    let fake = FakeCommandRunner::new()
        .failing_times("R", 1)
        .delay("B", Duration::from_millis(50))
        .into_arc();

    let report = with_timeout(execute_process(
        &process,
        as_runner(&fake),
        options(2),
        CancellationToken::new(),
    ))
    .await
    .unwrap();

    let calls = fake.calls();
    let c_at = calls.iter().position(|s| s == "C").unwrap();
    let r_retry_at = calls.iter().rposition(|s| s == "R").unwrap();
    assert!(
        c_at < r_retry_at,
        "C should run during R's retry delay, calls: {calls:?}"
    );
    assert!(fake.max_concurrency() <= 2);
    assert_eq!(report.steps["R"].attempts, 2);
    assert!(report.success);
}

#[tokio::test]
async fn attempt_timeout_feeds_the_retry_loop() {
    init_tracing();

    let process = ProcessBuilder::new("p")
        .step(
            StepBuilder::new("slow")
                .timeout(Duration::from_millis(50))
                .retries(1),
        )
        .build();
    let fake = FakeCommandRunner::new()
        .delay("slow", Duration::from_secs(10))
        .into_arc();

    let report = with_timeout(execute_process(
        &process,
        as_runner(&fake),
        options(4),
        CancellationToken::new(),
    ))
    .await
    .unwrap();

    let slow = &report.steps["slow"];
    assert_eq!(fake.attempts_of("slow"), 2);
    assert_eq!(slow.status, StepStatus::Failed);
    assert_eq!(slow.attempts, 2);
    assert!(slow.error.as_deref().unwrap().contains("timed out"));
}

#[tokio::test]
async fn captured_output_feeds_output_conditions() {
    init_tracing();

    let process = ProcessBuilder::new("p")
        .step(StepBuilder::new("probe"))
        .step(StepBuilder::new("deploy").condition("output(probe) contains \"READY\""))
        .step(StepBuilder::new("wait").condition("output(probe) contains \"BUSY\""))
        .build();
    let fake = FakeCommandRunner::new()
        .output("probe", "service READY")
        .into_arc();

    let report = with_timeout(execute_process(
        &process,
        as_runner(&fake),
        options(4),
        CancellationToken::new(),
    ))
    .await
    .unwrap();

    assert_eq!(report.steps["deploy"].status, StepStatus::Completed);
    assert_eq!(report.steps["wait"].status, StepStatus::Skipped);
}

#[tokio::test]
async fn step_environment_overrides_defaults() {
    init_tracing();

    let config = ConfigFileBuilder::new()
        .default_env("REGION", "eu")
        .default_env("MODE", "default")
        .with_step(
            "deploy",
            StepConfigBuilder::new("ship", "make ship")
                .env("MODE", "release")
                .build(),
        )
        .build();
    let process = config.process_definition("deploy").unwrap();
    let fake = FakeCommandRunner::new().into_arc();

    let report = with_timeout(execute_process(
        &process,
        as_runner(&fake),
        options(4),
        CancellationToken::new(),
    ))
    .await
    .unwrap();

    assert!(report.success);
    let env = fake.environment_of("ship").unwrap();
    assert_eq!(env.get("REGION").map(String::as_str), Some("eu"));
    assert_eq!(env.get("MODE").map(String::as_str), Some("release"));
}

#[tokio::test]
async fn stop_token_cancels_running_and_pending_steps() {
    init_tracing();

    let process = ProcessBuilder::new("p")
        .step(StepBuilder::new("long"))
        .step(StepBuilder::new("after").after("long"))
        .build();
    let fake = FakeCommandRunner::new()
        .delay("long", Duration::from_secs(30))
        .into_arc();

    let stop = CancellationToken::new();
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            stop.cancel();
        });
    }

    let report = with_timeout(execute_process(
        &process,
        as_runner(&fake),
        options(4),
        stop,
    ))
    .await
    .unwrap();

    assert_eq!(report.steps["long"].status, StepStatus::Cancelled);
    assert_eq!(report.steps["after"].status, StepStatus::Cancelled);
    assert_eq!(fake.attempts_of("after"), 0);
    assert_eq!(report.steps["after"].attempts, 0);
    assert!(!report.success);
}

#[tokio::test]
async fn empty_process_reports_zero_success_rate() {
    init_tracing();

    let process = ProcessBuilder::new("nothing").build();
    let fake = FakeCommandRunner::new().into_arc();

    let report = with_timeout(execute_process(
        &process,
        as_runner(&fake),
        options(4),
        CancellationToken::new(),
    ))
    .await
    .unwrap();

    assert!(report.results.is_empty());
    assert_eq!(report.success_rate, 0.0);
    assert!(report.success);
}

#[tokio::test]
async fn execute_and_report_writes_the_report() {
    init_tracing();

    let process = ProcessBuilder::new("nightly")
        .step(StepBuilder::new("A"))
        .build();
    let fake = FakeCommandRunner::new().into_arc();
    let fs = MockFileSystem::new();

    let report = with_timeout(execute_and_report(
        &process,
        as_runner(&fake),
        options(4),
        &fs,
        Path::new("reports"),
    ))
    .await
    .unwrap();

    let written = fs.paths();
    assert_eq!(written.len(), 1);
    let name = written[0].file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("nightly_") && name.ends_with(".json"));

    let json: serde_json::Value =
        serde_json::from_str(&fs.read_to_string(&written[0]).unwrap()).unwrap();
    assert_eq!(json["success"], report.success);
    assert_eq!(json["results"]["A"], true);
}
