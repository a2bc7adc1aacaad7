// src/types.rs

//! Small value types shared between the config layer and the engine.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

/// Duration as written in the config file.
///
/// Accepts either a bare integer (seconds) or a string with a unit suffix:
///
/// ```toml
/// timeout = 30
/// retry_delay = "250ms"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum DurationSpec {
    Seconds(u64),
    Text(String),
}

impl DurationSpec {
    pub fn to_duration(&self) -> Result<Duration, String> {
        match self {
            DurationSpec::Seconds(secs) => Ok(Duration::from_secs(*secs)),
            DurationSpec::Text(s) => parse_duration(s),
        }
    }
}

impl fmt::Display for DurationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DurationSpec::Seconds(secs) => write!(f, "{secs}s"),
            DurationSpec::Text(s) => f.write_str(s),
        }
    }
}

impl From<Duration> for DurationSpec {
    fn from(d: Duration) -> Self {
        if d.subsec_millis() == 0 {
            DurationSpec::Seconds(d.as_secs())
        } else {
            DurationSpec::Text(format!("{}ms", d.as_millis()))
        }
    }
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
///
/// A bare number without a suffix is read as seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .unwrap_or(s.len());

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let secs_per_unit = match unit.as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "" | "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => {
            return Err(format!(
                "unsupported duration unit '{}'; expected ms, s, m, or h",
                unit
            ));
        }
    };

    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{s}' is too large"))
}
