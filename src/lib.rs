// src/lib.rs

pub mod cli;
pub mod condition;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod report;
pub mod types;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::dag::{DagGraph, ProcessDefinition, StepStatus};
use crate::engine::{RunOptions, run_graph};
use crate::exec::{CommandRunner, ShellCommandRunner};
use crate::fs::{FileSystem, RealFileSystem};
use crate::report::{ExecutionReport, write_report};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and process selection
/// - graph validation
/// - scheduler / runtime / executor
/// - Ctrl-C handling
/// - report generation and writing
///
/// Returns the run's overall success; structural and configuration problems
/// come back as `Err`.
pub async fn run(args: CliArgs) -> Result<bool> {
    let cfg = load_and_validate(&args.config)?;
    let process = cfg.process_definition(&args.process)?;
    let graph = DagGraph::from_process(&process)?;

    if args.dry_run {
        print_dry_run(&process, &graph);
        return Ok(true);
    }

    let concurrency_limit = args
        .concurrency
        .map(|n| usize::try_from(n).unwrap_or(usize::MAX))
        .unwrap_or(cfg.config.concurrency_limit);

    // Ctrl-C → cooperative stop.
    let stop = CancellationToken::new();
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            info!("Ctrl+C received; stopping run");
            stop.cancel();
        });
    }

    let runner: Arc<dyn CommandRunner> = Arc::new(ShellCommandRunner::new());
    let report = execute_graph(
        &process.name,
        graph,
        runner,
        RunOptions { concurrency_limit },
        stop,
    )
    .await?;

    if cfg.config.write_report && !args.no_report {
        let dir = args
            .report_dir
            .as_deref()
            .unwrap_or(cfg.config.report_dir.as_path());
        let path = write_report(&RealFileSystem, dir, &report)?;
        println!("{}", path.display());
    }

    Ok(report.success)
}

/// Validate `process`, run it, and summarise the outcome.
pub async fn execute_process(
    process: &ProcessDefinition,
    runner: Arc<dyn CommandRunner>,
    options: RunOptions,
    stop: CancellationToken,
) -> errors::Result<ExecutionReport> {
    let graph = DagGraph::from_process(process)?;
    execute_graph(&process.name, graph, runner, options, stop).await
}

async fn execute_graph(
    process: &str,
    graph: DagGraph,
    runner: Arc<dyn CommandRunner>,
    options: RunOptions,
    stop: CancellationToken,
) -> errors::Result<ExecutionReport> {
    info!(
        process = %process,
        steps = graph.len(),
        concurrency_limit = options.concurrency_limit,
        "starting process"
    );

    let states = run_graph(graph, runner, options, stop).await?;
    let report = ExecutionReport::generate(process, &states);

    info!(
        process = %process,
        success = report.success,
        success_rate = report.success_rate,
        failed = ?report.steps_with_status(StepStatus::Failed),
        cancelled = ?report.steps_with_status(StepStatus::Cancelled),
        "process finished"
    );

    Ok(report)
}

/// Run a process and write its report through `fs`.
pub async fn execute_and_report(
    process: &ProcessDefinition,
    runner: Arc<dyn CommandRunner>,
    options: RunOptions,
    fs: &dyn FileSystem,
    report_dir: &Path,
) -> errors::Result<ExecutionReport> {
    let report = execute_process(process, runner, options, CancellationToken::new()).await?;
    write_report(fs, report_dir, &report)?;
    Ok(report)
}

/// Dry-run output: the validated execution plan, wave by wave.
fn print_dry_run(process: &ProcessDefinition, graph: &DagGraph) {
    println!("stepdag dry-run: process '{}'", process.name);
    if let Some(desc) = &process.description {
        println!("  {desc}");
    }
    println!();

    for (i, wave) in graph.execution_waves().iter().enumerate() {
        println!("wave {} ({} step(s)):", i + 1, wave.len());
        for name in wave {
            let Some(step) = graph.step(name) else {
                continue;
            };
            println!("  - {name}");
            println!("      command: {}", step.command);
            if !step.dependencies.is_empty() {
                println!("      dependencies: {:?}", step.dependencies);
            }
            if let Some(cond) = &step.condition {
                let note = if cond.is_malformed() { " (malformed; will skip)" } else { "" };
                println!("      condition: {cond}{note}");
            }
            println!(
                "      timeout: {:?}, retries: {} (delay {:?})",
                step.timeout, step.retry_count, step.retry_delay
            );
            if step.critical {
                println!("      critical: true");
            }
        }
    }

    debug!("dry-run complete (no execution)");
}
