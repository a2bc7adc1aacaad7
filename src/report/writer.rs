// src/report/writer.rs

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::info;

use crate::errors::Result;
use crate::fs::FileSystem;

use super::ExecutionReport;

/// `<process>_<YYYYmmdd_HHMMSS>.json`, using the report's own timestamp.
pub fn report_file_name(report: &ExecutionReport) -> String {
    format!(
        "{}_{}.json",
        report.process,
        report.timestamp.format("%Y%m%d_%H%M%S")
    )
}

/// Write `report` as pretty JSON under `dir`, creating it if missing.
///
/// Returns the path written.
pub fn write_report(fs: &dyn FileSystem, dir: &Path, report: &ExecutionReport) -> Result<PathBuf> {
    let path = dir.join(report_file_name(report));
    let json = serde_json::to_string_pretty(report).context("serialising execution report")?;

    fs.write(&path, json.as_bytes())
        .with_context(|| format!("writing execution report to {:?}", path))?;

    info!(path = %path.display(), "execution report written");
    Ok(path)
}
