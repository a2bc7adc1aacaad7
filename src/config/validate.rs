// src/config/validate.rs

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::warn;

use crate::condition::StepCondition;
use crate::config::model::{ConfigFile, DefaultSection, RawConfigFile, StepConfig};
use crate::dag::{ProcessDefinition, StepDefinition};
use crate::errors::{Result, StepdagError};
use crate::types::DurationSpec;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = StepdagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.config, raw.default, raw.process))
    }
}

/// Semantic checks that do not need the step graph.
///
/// Graph structure (duplicates, unknown dependencies, cycles) is validated
/// per process by `DagGraph::build` when the process is selected.
pub fn validate_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_processes(cfg)?;
    validate_global_config(cfg)?;
    validate_defaults(&cfg.default)?;
    validate_steps(cfg)?;
    Ok(())
}

fn ensure_has_processes(cfg: &RawConfigFile) -> Result<()> {
    if cfg.process.is_empty() {
        return Err(StepdagError::ConfigError(
            "config must contain at least one [process.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.concurrency_limit == 0 {
        return Err(StepdagError::ConfigError(
            "[config].concurrency_limit must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_defaults(default: &DefaultSection) -> Result<()> {
    check_timeout("[default].timeout", default.timeout.as_ref())?;
    check_duration("[default].retry_delay", default.retry_delay.as_ref())?;
    Ok(())
}

fn validate_steps(cfg: &RawConfigFile) -> Result<()> {
    for (process, pc) in cfg.process.iter() {
        if pc.steps.is_empty() {
            warn!(process = %process, "process has no steps");
        }

        for step in &pc.steps {
            if step.name.trim().is_empty() {
                return Err(StepdagError::ConfigError(format!(
                    "process '{process}' has a step with an empty name"
                )));
            }
            if step.command.trim().is_empty() {
                return Err(StepdagError::ConfigError(format!(
                    "step '{}' in process '{process}' has an empty command",
                    step.name
                )));
            }

            let ctx = format!("step '{}' in process '{process}'", step.name);
            check_timeout(&format!("{ctx}: timeout"), step.timeout.as_ref())?;
            check_duration(&format!("{ctx}: retry_delay"), step.retry_delay.as_ref())?;
        }
    }
    Ok(())
}

fn check_duration(what: &str, spec: Option<&DurationSpec>) -> Result<()> {
    if let Some(spec) = spec {
        spec.to_duration()
            .map_err(|e| StepdagError::ConfigError(format!("{what}: {e}")))?;
    }
    Ok(())
}

/// Like [`check_duration`], but zero is rejected too.
fn check_timeout(what: &str, spec: Option<&DurationSpec>) -> Result<()> {
    check_duration(what, spec)?;
    if let Some(Duration::ZERO) = spec.and_then(|t| t.to_duration().ok()) {
        return Err(StepdagError::ConfigError(format!(
            "{what} must be greater than zero"
        )));
    }
    Ok(())
}

fn resolve_duration(
    what: &str,
    own: Option<&DurationSpec>,
    fallback: Option<&DurationSpec>,
    default: Duration,
) -> Result<Duration> {
    match own.or(fallback) {
        Some(spec) => spec
            .to_duration()
            .map_err(|e| StepdagError::ConfigError(format!("{what}: {e}"))),
        None => Ok(default),
    }
}

impl ConfigFile {
    /// Turn `[process.<name>]` into a [`ProcessDefinition`], applying
    /// `[default]` values and parsing conditions.
    ///
    /// A malformed condition does not fail here; it is kept and makes its
    /// step skip at run time.
    pub fn process_definition(&self, name: &str) -> Result<ProcessDefinition> {
        let pc = self
            .process
            .get(name)
            .ok_or_else(|| StepdagError::ProcessNotFound(name.to_string()))?;

        let steps = pc
            .steps
            .iter()
            .map(|sc| self.step_definition(sc))
            .collect::<Result<Vec<_>>>()?;

        Ok(ProcessDefinition {
            name: name.to_string(),
            description: pc.description.clone(),
            steps,
        })
    }

    fn step_definition(&self, sc: &StepConfig) -> Result<StepDefinition> {
        let timeout = resolve_duration(
            &format!("step '{}': timeout", sc.name),
            sc.timeout.as_ref(),
            self.default.timeout.as_ref(),
            StepDefinition::DEFAULT_TIMEOUT,
        )?;
        let retry_delay = resolve_duration(
            &format!("step '{}': retry_delay", sc.name),
            sc.retry_delay.as_ref(),
            self.default.retry_delay.as_ref(),
            StepDefinition::DEFAULT_RETRY_DELAY,
        )?;

        let mut environment: BTreeMap<String, String> = self.default.environment.clone();
        environment.extend(sc.environment.clone());

        let condition = sc.condition.as_ref().map(|source| {
            let cond = StepCondition::parse(source.as_str());
            if let Err(err) = cond.parsed() {
                warn!(
                    step = %sc.name,
                    condition = %source,
                    error = %err,
                    "malformed condition; the step will be skipped"
                );
            }
            cond
        });

        Ok(StepDefinition {
            name: sc.name.clone(),
            command: sc.command.clone(),
            dependencies: sc.dependencies.clone(),
            timeout,
            retry_count: sc.retry_count,
            retry_delay,
            critical: sc.critical,
            environment,
            condition,
        })
    }
}
