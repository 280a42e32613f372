// Engine configuration - Loaded from JSON or RON, validated after loading

use crate::error::ConfigError;
use crate::sequencer::lookahead::DEFAULT_WAKE_INTERVAL;
use crate::sequencer::timeline::SchedulerConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Everything needed to run a session, in either scheduling model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scheduler: SchedulerConfig,
    /// Lookahead timer period in milliseconds
    pub wake_interval_ms: f64,
    /// Seconds between `start()` and the first step
    pub start_delay: f64,
    pub control_capacity: usize,
    pub event_capacity: usize,
    pub step_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            wake_interval_ms: DEFAULT_WAKE_INTERVAL * 1000.0,
            // Transport start delay plus playback warm-up
            start_delay: 0.1,
            control_capacity: 64,
            event_capacity: 256,
            step_capacity: 64,
        }
    }
}

impl EngineConfig {
    pub fn wake_interval(&self) -> f64 {
        self.wake_interval_ms / 1000.0
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheduler.validate()?;
        if !self.start_delay.is_finite() || self.start_delay < 0.0 {
            return Err(ConfigError::InvalidStartDelay(self.start_delay));
        }
        if !self.wake_interval_ms.is_finite() || self.wake_interval_ms <= 0.0 {
            return Err(ConfigError::InvalidWakeInterval(self.wake_interval_ms));
        }
        if self.control_capacity == 0 || self.event_capacity == 0 || self.step_capacity == 0 {
            return Err(ConfigError::InvalidQueueCapacity);
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_ron(ron_str: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(ron_str)?;
        config.validate()?;
        Ok(config)
    }
}

/// Load a config file, choosing the format from the extension
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => EngineConfig::from_json(&contents),
        Some("ron") => EngineConfig::from_ron(&contents),
        other => Err(ConfigError::UnsupportedFormat(
            other.unwrap_or("<none>").to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.wake_interval(), 0.025);
        assert_eq!(config.scheduler.bpm, 120.0);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = EngineConfig::from_json(r#"{"scheduler": {"bpm": 90}}"#).unwrap();
        assert_eq!(config.scheduler.bpm, 90.0);
        assert_eq!(config.scheduler.subdivision, 4);
        assert_eq!(config.start_delay, 0.1);
    }

    #[test]
    fn test_invalid_json_config_rejected() {
        let result = EngineConfig::from_json(r#"{"scheduler": {"bpm": -4}}"#);
        assert!(matches!(result, Err(ConfigError::InvalidBpm(_))));

        let result = EngineConfig::from_json(r#"{"event_capacity": 0}"#);
        assert!(matches!(result, Err(ConfigError::InvalidQueueCapacity)));
    }

    #[test]
    fn test_load_ron_file() {
        let mut file = Builder::new().suffix(".ron").tempfile().unwrap();
        write!(
            file,
            "(scheduler: (bpm: 140.0, lookahead: 0.1, subdivision: 4), start_delay: 0.05)"
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.scheduler.bpm, 140.0);
        assert_eq!(config.start_delay, 0.05);
        assert_eq!(config.event_capacity, 256);
    }

    #[test]
    fn test_load_json_file() {
        let mut file = Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"wake_interval_ms": 10.0}}"#).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.wake_interval(), 0.01);
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let file = Builder::new().suffix(".toml").tempfile().unwrap();
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(ext)) if ext == "toml"));
    }
}
