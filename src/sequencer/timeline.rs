// Timeline - Tempo and step grid timing
// Converts BPM/subdivision into step durations and validates config updates

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_BPM: f64 = 120.0;
/// Seconds of audio scheduled ahead of the clock
pub const DEFAULT_LOOKAHEAD: f64 = 0.12;
/// Steps per beat (4 = sixteenth notes)
pub const DEFAULT_SUBDIVISION: u32 = 4;

/// Timing parameters shared by both scheduler models
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchedulerConfig {
    pub bpm: f64,
    #[serde(alias = "lookAhead")]
    pub lookahead: f64,
    pub subdivision: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            bpm: DEFAULT_BPM,
            lookahead: DEFAULT_LOOKAHEAD,
            subdivision: DEFAULT_SUBDIVISION,
        }
    }
}

impl SchedulerConfig {
    /// Duration of one step in seconds: 60 / bpm / subdivision
    #[inline]
    pub fn step_duration(&self) -> f64 {
        60.0 / self.bpm / self.subdivision as f64
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !valid_bpm(self.bpm) {
            return Err(ConfigError::InvalidBpm(self.bpm));
        }
        if !valid_lookahead(self.lookahead) {
            return Err(ConfigError::InvalidLookahead(self.lookahead));
        }
        if self.subdivision == 0 {
            return Err(ConfigError::InvalidSubdivision);
        }
        Ok(())
    }

    /// Merge an update field by field
    ///
    /// Invalid fields are ignored and the last valid value is kept.
    /// Returns true if anything actually changed, so repeating the same
    /// update is a no-op.
    pub fn apply(&mut self, update: &ConfigUpdate) -> bool {
        let before = *self;

        if let Some(bpm) = update.bpm.filter(|&b| valid_bpm(b)) {
            self.bpm = bpm;
        }
        if let Some(lookahead) = update.lookahead.filter(|&l| valid_lookahead(l)) {
            self.lookahead = lookahead;
        }
        if let Some(subdivision) = update.subdivision.filter(|&s| s > 0) {
            self.subdivision = subdivision;
        }

        *self != before
    }
}

impl fmt::Display for SchedulerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.2} BPM, 1/{} steps, {:.0} ms lookahead",
            self.bpm,
            self.subdivision * 4,
            self.lookahead * 1000.0
        )
    }
}

fn valid_bpm(bpm: f64) -> bool {
    bpm.is_finite() && bpm > 0.0
}

fn valid_lookahead(lookahead: f64) -> bool {
    lookahead.is_finite() && lookahead >= 0.0
}

/// Partial configuration message, every field optional
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bpm: Option<f64>,
    #[serde(default, alias = "lookAhead", skip_serializing_if = "Option::is_none")]
    pub lookahead: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdivision: Option<u32>,
}

impl ConfigUpdate {
    pub fn bpm(bpm: f64) -> Self {
        Self {
            bpm: Some(bpm),
            ..Self::default()
        }
    }

    /// Names of the fields that `SchedulerConfig::apply` would reject
    pub fn rejected_fields(&self) -> Vec<&'static str> {
        let mut rejected = Vec::new();
        if self.bpm.is_some_and(|b| !valid_bpm(b)) {
            rejected.push("bpm");
        }
        if self.lookahead.is_some_and(|l| !valid_lookahead(l)) {
            rejected.push("lookahead");
        }
        if self.subdivision == Some(0) {
            rejected.push("subdivision");
        }
        rejected
    }
}

impl From<SchedulerConfig> for ConfigUpdate {
    fn from(config: SchedulerConfig) -> Self {
        Self {
            bpm: Some(config.bpm),
            lookahead: Some(config.lookahead),
            subdivision: Some(config.subdivision),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.bpm, 120.0);
        assert_eq!(config.lookahead, 0.12);
        assert_eq!(config.subdivision, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_step_duration() {
        let config = SchedulerConfig::default();
        assert_eq!(config.step_duration(), 60.0 / 120.0 / 4.0);
        assert_eq!(config.step_duration(), 0.125);

        let config = SchedulerConfig {
            bpm: 90.0,
            subdivision: 3,
            ..SchedulerConfig::default()
        };
        assert_eq!(config.step_duration(), 60.0 / 90.0 / 3.0);
    }

    #[test]
    fn test_invalid_fields_ignored() {
        let mut config = SchedulerConfig::default();
        let changed = config.apply(&ConfigUpdate {
            bpm: Some(-10.0),
            lookahead: Some(0.2),
            subdivision: Some(0),
        });

        assert!(changed);
        assert_eq!(config.bpm, 120.0);
        assert_eq!(config.lookahead, 0.2);
        assert_eq!(config.subdivision, 4);

        assert!(!config.apply(&ConfigUpdate::bpm(f64::NAN)));
        assert_eq!(config.bpm, 120.0);
    }

    #[test]
    fn test_apply_is_idempotent() {
        let mut config = SchedulerConfig::default();
        assert!(config.apply(&ConfigUpdate::bpm(140.0)));
        assert!(!config.apply(&ConfigUpdate::bpm(140.0)));
        assert_eq!(config.bpm, 140.0);
    }

    #[test]
    fn test_rejected_fields() {
        let update = ConfigUpdate {
            bpm: Some(0.0),
            lookahead: Some(-1.0),
            subdivision: Some(2),
        };
        assert_eq!(update.rejected_fields(), vec!["bpm", "lookahead"]);
        assert!(ConfigUpdate::bpm(100.0).rejected_fields().is_empty());
    }

    #[test]
    fn test_lookahead_alias() {
        let update: ConfigUpdate = serde_json::from_str(r#"{"lookAhead": 0.05}"#).unwrap();
        assert_eq!(update.lookahead, Some(0.05));
        assert_eq!(update.bpm, None);
    }

    #[test]
    fn test_validate() {
        let config = SchedulerConfig {
            bpm: 0.0,
            ..SchedulerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidBpm(_))));

        let config = SchedulerConfig {
            subdivision: 0,
            ..SchedulerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSubdivision)
        ));
    }
}
