use crate::error::ConfigError;
use crate::event::DetectionMode;
use crate::severity::Severity;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default detection timeout.
pub const DEFAULT_TIMEOUT_MS: i64 = 5000;

/// Default number of hang records kept by `HangLog`.
pub const DEFAULT_MAX_BLOCKS: usize = 20;

/// Watchdog settings, minus the handler.
///
/// `timeout_ms` is stored exactly as given. Zero and negative values are
/// accepted and mean "check again immediately".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub timeout_ms: i64,
    #[serde(rename = "log_level")]
    pub min_severity: Severity,
    pub mode: DetectionMode,
}

impl MonitorConfig {
    /// The wait between checks. Negative timeouts clamp to zero.
    pub fn timeout(&self) -> Duration {
        clamp_timeout(self.timeout_ms)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            min_severity: Severity::Info,
            mode: DetectionMode::Timer,
        }
    }
}

pub(crate) fn clamp_timeout(timeout_ms: i64) -> Duration {
    Duration::from_millis(timeout_ms.max(0) as u64)
}

/// Top-level configuration loaded from anrwatch.toml.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
#[derive(Default)]
pub struct HarnessConfig {
    pub watchdog: MonitorConfig,
    pub recorder: RecorderConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RecorderConfig {
    pub max_blocks: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            max_blocks: DEFAULT_MAX_BLOCKS,
        }
    }
}

impl HarnessConfig {
    /// Load config from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };

        Self::parse(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }
}
