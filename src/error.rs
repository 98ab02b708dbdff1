use std::path::PathBuf;

/// Errors raised while loading or parsing configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The config file is not valid TOML for `HarnessConfig`.
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// A severity name that is not one of the known levels.
    InvalidSeverity(String),
    /// A detection mode name that is not `timer` or `probe`.
    InvalidMode(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {}", path.display(), source)
            }
            ConfigError::InvalidSeverity(name) => {
                write!(
                    f,
                    "unknown log level '{name}' (expected verbose, debug, info, warn, error or assert)"
                )
            }
            ConfigError::InvalidMode(name) => {
                write!(f, "unknown detection mode '{name}' (expected timer or probe)")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::InvalidSeverity(_) | ConfigError::InvalidMode(_) => None,
        }
    }
}

/// Errors surfaced by the watchdog lifecycle.
///
/// Configuration setters never fail and nothing raised inside the worker
/// loop reaches the caller, so the only failure is spawning the worker.
#[derive(Debug)]
pub enum WatchdogError {
    /// The OS refused to create the background worker thread.
    Spawn { source: std::io::Error },
}

impl std::fmt::Display for WatchdogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatchdogError::Spawn { source } => {
                write!(f, "failed to spawn watchdog thread: {}", source)
            }
        }
    }
}

impl std::error::Error for WatchdogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WatchdogError::Spawn { source } => Some(source),
        }
    }
}
