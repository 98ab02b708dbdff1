/// Detection payload handed to hang handlers.
use crate::error::ConfigError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// How the watchdog decides that the target is unresponsive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum DetectionMode {
    /// Every wake-up after the timeout counts as a detection.
    #[default]
    Timer,
    /// Post a no-op task to the target and report only if it has not run
    /// within the timeout.
    Probe,
}

impl DetectionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            DetectionMode::Timer => "timer",
            DetectionMode::Probe => "probe",
        }
    }
}

impl fmt::Display for DetectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectionMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "timer" => Ok(DetectionMode::Timer),
            "probe" => Ok(DetectionMode::Probe),
            _ => Err(ConfigError::InvalidMode(s.to_string())),
        }
    }
}

/// A single detected hang.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HangEvent {
    /// Name of the observed target context.
    pub context: String,
    /// How long the target has gone without responding. In timer mode this
    /// is the interval that elapsed since the previous check.
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    /// 1-based check counter within the current run.
    pub cycle: u64,
    pub mode: DetectionMode,
    pub detected_at: DateTime<Utc>,
}

impl HangEvent {
    pub fn elapsed_ms(&self) -> u128 {
        self.elapsed.as_millis()
    }
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis().min(u64::MAX as u128) as u64)
}

/// Caller-supplied callback invoked on the watchdog thread for each detection.
pub type Handler = Arc<dyn Fn(&HangEvent) + Send + Sync + 'static>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse() {
        assert_eq!("probe".parse::<DetectionMode>().unwrap(), DetectionMode::Probe);
        assert_eq!("TIMER".parse::<DetectionMode>().unwrap(), DetectionMode::Timer);
        assert!(matches!(
            "poll".parse::<DetectionMode>(),
            Err(ConfigError::InvalidMode(_))
        ));
    }

    #[test]
    fn test_default_mode_is_timer() {
        assert_eq!(DetectionMode::default(), DetectionMode::Timer);
    }

    #[test]
    fn test_event_serializes_elapsed_as_millis() {
        let event = HangEvent {
            context: "main".to_string(),
            elapsed: Duration::from_millis(1250),
            cycle: 3,
            mode: DetectionMode::Probe,
            detected_at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["context"], "main");
        assert_eq!(json["elapsed_ms"], 1250);
        assert_eq!(json["cycle"], 3);
        assert_eq!(json["mode"], "probe");
        assert!(json.get("elapsed").is_none());
    }
}
