/// Ordered log severity used to gate detection logging.
///
/// The ordering mirrors the classic mobile log priorities:
/// `Verbose < Debug < Info < Warn < Error < Assert`.
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum Severity {
    Verbose,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Assert,
}

impl Severity {
    /// All severities in ascending order.
    pub const ALL: [Severity; 6] = [
        Severity::Verbose,
        Severity::Debug,
        Severity::Info,
        Severity::Warn,
        Severity::Error,
        Severity::Assert,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Verbose => "verbose",
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
            Severity::Assert => "assert",
        }
    }

    pub(crate) fn as_u8(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_u8(value: u8) -> Severity {
        Severity::ALL
            .get(value as usize)
            .copied()
            .unwrap_or(Severity::Assert)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "verbose" | "trace" => Ok(Severity::Verbose),
            "debug" => Ok(Severity::Debug),
            "info" => Ok(Severity::Info),
            "warn" | "warning" => Ok(Severity::Warn),
            "error" => Ok(Severity::Error),
            "assert" => Ok(Severity::Assert),
            _ => Err(ConfigError::InvalidSeverity(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_is_ascending() {
        for pair in Severity::ALL.windows(2) {
            assert!(pair[0] < pair[1], "{} should be below {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_default_is_info() {
        assert_eq!(Severity::default(), Severity::Info);
    }

    #[test]
    fn test_parse_case_insensitive_and_aliases() {
        assert_eq!("DEBUG".parse::<Severity>().unwrap(), Severity::Debug);
        assert_eq!("Warning".parse::<Severity>().unwrap(), Severity::Warn);
        assert_eq!("trace".parse::<Severity>().unwrap(), Severity::Verbose);
        assert_eq!(" assert ".parse::<Severity>().unwrap(), Severity::Assert);
    }

    #[test]
    fn test_parse_unknown_is_error() {
        let err = "loud".parse::<Severity>().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSeverity(ref s) if s == "loud"));
        assert!(err.to_string().contains("loud"));
    }

    #[test]
    fn test_u8_round_trip_covers_all_levels() {
        for level in Severity::ALL {
            assert_eq!(Severity::from_u8(level.as_u8()), level);
        }
        assert_eq!(Severity::from_u8(200), Severity::Assert);
    }

    #[test]
    fn test_serde_lowercase() {
        #[derive(Deserialize)]
        struct Wrapper {
            level: Severity,
        }
        let w: Wrapper = toml::from_str("level = \"error\"").unwrap();
        assert_eq!(w.level, Severity::Error);
    }
}
