// tests/shell_runner.rs

#![cfg(unix)]

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use stepdag::exec::{CommandRequest, CommandRunner, CommandStatus, ShellCommandRunner};
use stepdag_test_utils::{init_tracing, with_timeout};
use tokio_util::sync::CancellationToken;

fn request(command: &str) -> CommandRequest {
    CommandRequest {
        step: "t".to_string(),
        command: command.to_string(),
        environment: BTreeMap::new(),
        timeout: Duration::from_secs(5),
    }
}

#[tokio::test]
async fn captures_stdout_of_a_successful_command() {
    init_tracing();

    let outcome = with_timeout(
        ShellCommandRunner::new().run(request("echo one; echo two"), CancellationToken::new()),
    )
    .await;

    assert!(outcome.is_success());
    assert_eq!(outcome.stdout, "one\ntwo");
    assert!(outcome.stderr.is_empty());
    assert_eq!(outcome.combined_output().as_deref(), Some("one\ntwo"));
}

#[tokio::test]
async fn reports_exit_code_and_stderr() {
    init_tracing();

    let outcome = with_timeout(
        ShellCommandRunner::new().run(request("echo oops >&2; exit 3"), CancellationToken::new()),
    )
    .await;

    assert_eq!(outcome.status, CommandStatus::Failed { exit_code: Some(3) });
    assert_eq!(outcome.stderr, "oops");
}

#[tokio::test]
async fn passes_step_environment() {
    init_tracing();

    let mut req = request("printf '%s' \"$STEPDAG_TEST_VALUE\"");
    req.environment
        .insert("STEPDAG_TEST_VALUE".to_string(), "hello env".to_string());

    let outcome = with_timeout(ShellCommandRunner::new().run(req, CancellationToken::new())).await;

    assert!(outcome.is_success());
    assert_eq!(outcome.stdout, "hello env");
}

#[tokio::test]
async fn cancellation_kills_the_process() {
    init_tracing();

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        });
    }

    let started = Instant::now();
    let outcome = with_timeout(ShellCommandRunner::new().run(request("sleep 30"), cancel)).await;

    assert_eq!(outcome.status, CommandStatus::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn invalid_utf8_output_is_decoded_lossily_and_fully_drained() {
    init_tracing();

    let outcome = with_timeout(ShellCommandRunner::new().run(
        request("printf 'a\\377b\\n'; sleep 0.3; seq 1 20000"),
        CancellationToken::new(),
    ))
    .await;

    assert_eq!(outcome.status, CommandStatus::Success);
    assert!(outcome.stdout.starts_with("a\u{FFFD}b\n1\n"));
    assert!(outcome.stdout.ends_with("\n20000"));
}

#[tokio::test]
async fn background_child_holding_the_pipes_does_not_delay_the_result() {
    init_tracing();

    let started = Instant::now();
    let outcome = with_timeout(ShellCommandRunner::new().run(
        request("sleep 3 & echo started"),
        CancellationToken::new(),
    ))
    .await;

    assert!(
        started.elapsed() < Duration::from_secs(1),
        "returned after {:?}",
        started.elapsed()
    );
    assert_eq!(outcome.status, CommandStatus::Success);
    assert_eq!(outcome.stdout, "started");
}
