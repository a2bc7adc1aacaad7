// src/exec/command.rs

//! The execution collaborator: something that can run one command string.
//!
//! [`CommandRunner`] is the seam between the step runner (retries, timeouts,
//! conditions) and whatever actually executes work. Production uses
//! [`ShellCommandRunner`]; tests plug in a scripted fake.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long to keep draining stdout/stderr once the shell has exited.
/// Background children that inherited the pipes can hold them open forever.
const OUTPUT_GRACE: Duration = Duration::from_millis(200);

/// One attempt's worth of work handed to a runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub step: String,
    pub command: String,
    /// Merged over the inherited environment.
    pub environment: BTreeMap<String, String>,
    /// Advisory; the step runner enforces it independently.
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandStatus {
    Success,
    Failed { exit_code: Option<i32> },
    SpawnFailed(String),
    TimedOut,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub status: CommandStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutcome {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Success,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(exit_code: Option<i32>, stderr: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Failed { exit_code },
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self {
            status: CommandStatus::Cancelled,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == CommandStatus::Success
    }

    /// Combined output recorded on the step state.
    pub fn combined_output(&self) -> Option<String> {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (true, true) => None,
            (false, true) => Some(self.stdout.clone()),
            (true, false) => Some(self.stderr.clone()),
            (false, false) => Some(format!("{}\n{}", self.stdout, self.stderr)),
        }
    }
}

/// Trait abstracting how a single command is executed.
///
/// Implementations should watch `cancel` and stop early (killing any child
/// process) when it fires, reporting [`CommandStatus::Cancelled`]. Dropping
/// the returned future must also release whatever the attempt holds.
pub trait CommandRunner: Send + Sync {
    fn run(
        &self,
        request: CommandRequest,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = CommandOutcome> + Send + '_>>;
}

/// Runs commands through the platform shell.
#[derive(Debug, Clone, Default)]
pub struct ShellCommandRunner;

impl ShellCommandRunner {
    pub fn new() -> Self {
        Self
    }

    async fn run_inner(request: CommandRequest, cancel: CancellationToken) -> CommandOutcome {
        info!(step = %request.step, cmd = %request.command, "starting step process");

        // Build a shell command appropriate for the platform.
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&request.command);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&request.command);
            c
        };

        cmd.envs(&request.environment)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                warn!(step = %request.step, error = %err, "failed to spawn step process");
                return CommandOutcome {
                    status: CommandStatus::SpawnFailed(err.to_string()),
                    stdout: String::new(),
                    stderr: String::new(),
                };
            }
        };

        let stdout = PipeCapture::spawn(child.stdout.take(), request.step.clone(), "stdout");
        let stderr = PipeCapture::spawn(child.stderr.take(), request.step.clone(), "stderr");

        // Either the process exits on its own (normal case), or the run is
        // being cancelled.
        let status = tokio::select! {
            status_res = child.wait() => match status_res {
                Ok(status) => {
                    info!(
                        step = %request.step,
                        exit_code = status.code().unwrap_or(-1),
                        success = status.success(),
                        "step process exited"
                    );
                    if status.success() {
                        CommandStatus::Success
                    } else {
                        CommandStatus::Failed { exit_code: status.code() }
                    }
                }
                Err(err) => CommandStatus::SpawnFailed(format!(
                    "waiting for process of step '{}': {err}",
                    request.step
                )),
            },
            _ = cancel.cancelled() => {
                info!(step = %request.step, "cancellation requested; killing process");
                if let Err(e) = child.kill().await {
                    warn!(step = %request.step, error = %e, "failed to kill child process on cancellation");
                }
                CommandStatus::Cancelled
            }
        };

        if status == CommandStatus::Cancelled {
            // Grandchildren may still hold the pipes open.
            for capture in [stdout, stderr].into_iter().flatten() {
                capture.task.abort();
            }
            return CommandOutcome::cancelled();
        }

        let (stdout, stderr) = tokio::join!(
            PipeCapture::finish(stdout, &request.step),
            PipeCapture::finish(stderr, &request.step)
        );
        CommandOutcome {
            status,
            stdout,
            stderr,
        }
    }
}

impl CommandRunner for ShellCommandRunner {
    fn run(
        &self,
        request: CommandRequest,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = CommandOutcome> + Send + '_>> {
        Box::pin(Self::run_inner(request, cancel))
    }
}

/// Background reader for one child pipe.
///
/// The pipe is always drained so the child never blocks or dies on a full or
/// closed pipe. Bytes are split on `\n` and decoded lossily, so output that
/// is not UTF-8 is still consumed and kept.
struct PipeCapture {
    lines: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl PipeCapture {
    fn spawn<R>(pipe: Option<R>, step: String, stream: &'static str) -> Option<Self>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let pipe = pipe?;
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);

        let task = tokio::spawn(async move {
            let mut reader = BufReader::new(pipe);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = decode_line(&buf);
                        debug!(step = %step, stream, "{}", line);
                        lock(&sink).push(line);
                    }
                    Err(err) => {
                        warn!(step = %step, stream, error = %err, "reading step output failed");
                        break;
                    }
                }
            }
        });

        Some(Self { lines, task })
    }

    /// Wait briefly for EOF, then return whatever was captured.
    async fn finish(capture: Option<Self>, step: &str) -> String {
        let Some(mut capture) = capture else {
            return String::new();
        };

        if tokio::time::timeout(OUTPUT_GRACE, &mut capture.task)
            .await
            .is_err()
        {
            debug!(step = %step, "output pipe still open after exit; keeping what was read");
            capture.task.abort();
        }

        lock(&capture.lines).join("\n")
    }
}

fn lock(lines: &Mutex<Vec<String>>) -> std::sync::MutexGuard<'_, Vec<String>> {
    lines.lock().unwrap_or_else(|e| e.into_inner())
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}
