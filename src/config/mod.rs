// src/config/mod.rs

//! Configuration loading and validation for stepdag.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate basic invariants and build process definitions (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_fs, load_from_path, parse_str};
pub use model::{ConfigFile, ConfigSection, DefaultSection, ProcessConfig, RawConfigFile, StepConfig};
pub use validate::validate_config;
