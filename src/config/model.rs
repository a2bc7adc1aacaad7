// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::types::DurationSpec;

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [config]
/// concurrency_limit = 4
///
/// [default]
/// timeout = "300s"
///
/// [process.deploy]
/// description = "Build and ship"
///
/// [[process.deploy.steps]]
/// name = "build"
/// command = "make build"
///
/// [[process.deploy.steps]]
/// name = "ship"
/// command = "make ship"
/// dependencies = ["build"]
/// critical = true
/// ```
///
/// All sections are optional and have reasonable defaults; unknown keys are
/// ignored.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    /// Global behaviour config from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// Step defaults from `[default]`.
    #[serde(default)]
    pub default: DefaultSection,

    /// All processes from `[process.<name>]`.
    #[serde(default)]
    pub process: BTreeMap<String, ProcessConfig>,
}

/// Validated configuration. Build it with `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub default: DefaultSection,
    pub process: BTreeMap<String, ProcessConfig>,
}

impl ConfigFile {
    /// Assemble a config without running validation. Only `TryFrom` should
    /// call this.
    pub(crate) fn new_unchecked(
        config: ConfigSection,
        default: DefaultSection,
        process: BTreeMap<String, ProcessConfig>,
    ) -> Self {
        Self {
            config,
            default,
            process,
        }
    }

    pub fn process_names(&self) -> impl Iterator<Item = &str> {
        self.process.keys().map(String::as_str)
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Maximum number of steps running at the same time.
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    /// Directory the execution report is written to.
    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,

    /// Set to `false` to skip writing the report file.
    #[serde(default = "default_write_report")]
    pub write_report: bool,
}

fn default_concurrency_limit() -> usize {
    4
}

fn default_report_dir() -> PathBuf {
    PathBuf::from("reports")
}

fn default_write_report() -> bool {
    true
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency_limit(),
            report_dir: default_report_dir(),
            write_report: default_write_report(),
        }
    }
}

/// `[default]` section: values applied to steps that do not set their own.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DefaultSection {
    #[serde(default)]
    pub timeout: Option<DurationSpec>,

    #[serde(default)]
    pub retry_delay: Option<DurationSpec>,

    /// Merged under every step's own `environment`.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

/// `[process.<name>]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProcessConfig {
    #[serde(default)]
    pub description: Option<String>,

    /// Steps in declaration order (`[[process.<name>.steps]]`).
    #[serde(default)]
    pub steps: Vec<StepConfig>,
}

/// One `[[process.<name>.steps]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct StepConfig {
    pub name: String,

    /// Command string handed to the shell.
    pub command: String,

    /// Steps that must complete before this one runs.
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Per-attempt time limit; falls back to `default.timeout`, then 300s.
    #[serde(default)]
    pub timeout: Option<DurationSpec>,

    /// Extra attempts after the first.
    #[serde(default)]
    pub retry_count: u32,

    /// Falls back to `default.retry_delay`, then 5s.
    #[serde(default)]
    pub retry_delay: Option<DurationSpec>,

    /// A critical failure cancels everything not yet started.
    #[serde(default)]
    pub critical: bool,

    #[serde(default)]
    pub environment: BTreeMap<String, String>,

    /// Predicate over earlier steps' outcomes, e.g. `step lint failed`.
    #[serde(default)]
    pub condition: Option<String>,
}
