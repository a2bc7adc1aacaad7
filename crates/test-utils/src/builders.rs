#![allow(dead_code)]

use std::collections::BTreeMap;
use std::time::Duration;

use stepdag::condition::StepCondition;
use stepdag::config::{
    ConfigFile, ConfigSection, DefaultSection, ProcessConfig, RawConfigFile, StepConfig,
};
use stepdag::dag::{DagGraph, ProcessDefinition, StepDefinition};
use stepdag::types::DurationSpec;

/// Builder for `StepDefinition` with fast test-friendly defaults
/// (no retry delay, 5s timeout).
pub struct StepBuilder {
    step: StepDefinition,
}

impl StepBuilder {
    pub fn new(name: &str) -> Self {
        let mut step = StepDefinition::new(name, format!("echo {name}"));
        step.timeout = Duration::from_secs(5);
        step.retry_delay = Duration::ZERO;
        Self { step }
    }

    pub fn command(mut self, cmd: &str) -> Self {
        self.step.command = cmd.to_string();
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.step.dependencies.push(dep.to_string());
        self
    }

    pub fn retries(mut self, n: u32) -> Self {
        self.step.retry_count = n;
        self
    }

    pub fn retry_delay(mut self, d: Duration) -> Self {
        self.step.retry_delay = d;
        self
    }

    pub fn timeout(mut self, d: Duration) -> Self {
        self.step.timeout = d;
        self
    }

    pub fn critical(mut self) -> Self {
        self.step.critical = true;
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.step
            .environment
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn condition(mut self, source: &str) -> Self {
        self.step.condition = Some(StepCondition::parse(source));
        self
    }

    pub fn build(self) -> StepDefinition {
        self.step
    }
}

/// Builder for `ProcessDefinition`.
pub struct ProcessBuilder {
    name: String,
    steps: Vec<StepDefinition>,
}

impl ProcessBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            steps: Vec::new(),
        }
    }

    pub fn step(mut self, step: StepBuilder) -> Self {
        self.steps.push(step.build());
        self
    }

    pub fn build(self) -> ProcessDefinition {
        ProcessDefinition::new(self.name, self.steps)
    }

    pub fn graph(self) -> DagGraph {
        DagGraph::build(self.steps).expect("Failed to build valid graph from builder")
    }
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                default: DefaultSection::default(),
                process: BTreeMap::new(),
            },
        }
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.config.concurrency_limit = n;
        self
    }

    pub fn default_timeout(mut self, spec: &str) -> Self {
        self.config.default.timeout = Some(DurationSpec::Text(spec.to_string()));
        self
    }

    pub fn default_env(mut self, key: &str, value: &str) -> Self {
        self.config
            .default
            .environment
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_step(mut self, process: &str, step: StepConfig) -> Self {
        self.config
            .process
            .entry(process.to_string())
            .or_insert_with(ProcessConfig::default)
            .steps
            .push(step);
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `StepConfig`.
pub struct StepConfigBuilder {
    step: StepConfig,
}

impl StepConfigBuilder {
    pub fn new(name: &str, command: &str) -> Self {
        Self {
            step: StepConfig {
                name: name.to_string(),
                command: command.to_string(),
                dependencies: vec![],
                timeout: None,
                retry_count: 0,
                retry_delay: None,
                critical: false,
                environment: BTreeMap::new(),
                condition: None,
            },
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.step.dependencies.push(dep.to_string());
        self
    }

    pub fn timeout(mut self, spec: DurationSpec) -> Self {
        self.step.timeout = Some(spec);
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.step
            .environment
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn condition(mut self, source: &str) -> Self {
        self.step.condition = Some(source.to_string());
        self
    }

    pub fn build(self) -> StepConfig {
        self.step
    }
}
