// src/config/loader.rs

use std::path::Path;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{Result, StepdagError};
use crate::fs::{FileSystem, RealFileSystem};

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    load_raw_from_fs(&RealFileSystem, path.as_ref())
}

/// Parse TOML text into a `RawConfigFile`.
pub fn parse_str(contents: &str) -> Result<RawConfigFile> {
    let config: RawConfigFile = toml::from_str(contents)?;
    Ok(config)
}

fn load_raw_from_fs(fs: &dyn FileSystem, path: &Path) -> Result<RawConfigFile> {
    if !fs.exists(path) {
        return Err(StepdagError::ConfigError(format!(
            "config file {} not found",
            path.display()
        )));
    }
    let contents = fs.read_to_string(path).map_err(|e| {
        StepdagError::ConfigError(format!("cannot read config {}: {e:#}", path.display()))
    })?;
    parse_str(&contents)
}

/// Load a configuration file from path and run basic validation.
///
/// This is the recommended entry point for the rest of the application:
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks global sanity, durations and step names.
///
/// Step graph structure is checked later, per process, by `DagGraph::build`.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    load_from_fs(&RealFileSystem, path.as_ref())
}

/// Same as [`load_and_validate`], reading through a [`FileSystem`].
pub fn load_from_fs(fs: &dyn FileSystem, path: &Path) -> Result<ConfigFile> {
    let raw_config = load_raw_from_fs(fs, path)?;
    ConfigFile::try_from(raw_config)
}
