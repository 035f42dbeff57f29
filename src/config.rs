//! Runner configuration, loadable from a TOML file
//!
//! ```toml
//! shell = "/bin/sh"
//! termination_grace = "2s"
//! output_collection_timeout = "10s"
//! max_output_size = 10485760
//! process_group = true
//! default_timeout = "5m"
//! ```
//!
//! Every key is optional.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};

/// Default time a terminated child gets between SIGTERM and SIGKILL
pub const DEFAULT_TERMINATION_GRACE: Duration = Duration::from_secs(2);

/// Timeout for collecting output from child process pipes after exit
pub const DEFAULT_OUTPUT_COLLECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Bytes kept per output stream before the rest is discarded
pub const DEFAULT_MAX_OUTPUT_SIZE: usize = 10 * 1024 * 1024;

pub const DEFAULT_SHELL: &str = "/bin/sh";

/// Configuration shared by every execution of a [`Runner`](crate::process::Runner)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerConfig {
    /// Shell used for shell-interpreted commands, invoked as `<shell> -c`
    pub shell: PathBuf,
    #[serde(deserialize_with = "de_duration")]
    pub termination_grace: Duration,
    /// How long to wait for the pipes to close once a timed-out child has
    /// been killed
    #[serde(deserialize_with = "de_duration")]
    pub output_collection_timeout: Duration,
    pub max_output_size: usize,
    /// Start each child in its own process group so a timeout also
    /// reaches the processes it spawned
    pub process_group: bool,
    /// Applied when a command spec carries no timeout of its own
    #[serde(deserialize_with = "de_opt_duration")]
    pub default_timeout: Option<Duration>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            shell: PathBuf::from(DEFAULT_SHELL),
            termination_grace: DEFAULT_TERMINATION_GRACE,
            output_collection_timeout: DEFAULT_OUTPUT_COLLECTION_TIMEOUT,
            max_output_size: DEFAULT_MAX_OUTPUT_SIZE,
            process_group: true,
            default_timeout: None,
        }
    }
}

impl RunnerConfig {
    /// Load from a TOML file. Missing keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: RunnerConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Load `path` if given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{s}' is missing a unit (ms, s, m, h)"))?;

    if idx == 0 {
        return Err(format!("duration '{s}' must start with a number"));
    }

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid number in duration '{s}': {e}"))?;

    let seconds_per_unit = match unit_part.trim().to_lowercase().as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        unit => {
            return Err(format!(
                "unsupported duration unit '{unit}'; expected ms, s, m, or h"
            ))
        }
    };

    value
        .checked_mul(seconds_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{s}' is too large"))
}

fn de_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_duration(&raw).map_err(serde::de::Error::custom)
}

fn de_opt_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|s| parse_duration(&s).map_err(serde::de::Error::custom))
        .transpose()
}
