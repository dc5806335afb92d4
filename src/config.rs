//! Runtime configuration
//!
//! Frontend-facing settings for the output pipeline, loadable from JSON.

use crate::constants::{FRAME_QUEUE_CAPACITY, NATIVE_SAMPLE_RATE};
use crate::{CsndError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// CSND output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsndConfig {
    /// Linear UI volume in `[0.0, 1.0]`
    pub volume: f32,
    /// Absorb producer/consumer rate mismatch with time stretching
    pub enable_time_stretching: bool,
    /// Sink backend: `"auto"`, `"rodio"` or `"null"`
    pub sink_id: String,
    /// Output device name, `"auto"` for the host default
    pub audio_device_id: String,
    /// Frame queue capacity (stereo frames)
    pub queue_capacity: usize,
    /// Rate channels are converted to before mixing (Hz)
    pub native_sample_rate: u32,
}

impl Default for CsndConfig {
    fn default() -> Self {
        CsndConfig {
            volume: 1.0,
            enable_time_stretching: true,
            sink_id: "auto".to_string(),
            audio_device_id: "auto".to_string(),
            queue_capacity: FRAME_QUEUE_CAPACITY,
            native_sample_rate: NATIVE_SAMPLE_RATE,
        }
    }
}

impl CsndConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: CsndConfig =
            serde_json::from_str(json).map_err(|e| CsndError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if !self.volume.is_finite() || !(0.0..=1.0).contains(&self.volume) {
            return Err(CsndError::ConfigError(format!(
                "volume {} outside [0.0, 1.0]",
                self.volume
            )));
        }
        if self.queue_capacity == 0 {
            return Err(CsndError::ConfigError(
                "queue_capacity must be greater than 0".into(),
            ));
        }
        if self.native_sample_rate == 0 {
            return Err(CsndError::ConfigError(
                "native_sample_rate must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = CsndConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.queue_capacity, 8192);
        assert_eq!(config.native_sample_rate, 32728);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = CsndConfig::from_json_str(r#"{ "volume": 0.5, "sink_id": "null" }"#)
            .expect("partial config should parse");
        assert_eq!(config.volume, 0.5);
        assert_eq!(config.sink_id, "null");
        assert!(config.enable_time_stretching);
        assert_eq!(config.queue_capacity, FRAME_QUEUE_CAPACITY);
    }

    #[test]
    fn test_out_of_range_volume_rejected() {
        let result = CsndConfig::from_json_str(r#"{ "volume": 1.5 }"#);
        assert!(matches!(result, Err(CsndError::ConfigError(_))));
    }

    #[test]
    fn test_malformed_json_rejected() {
        let result = CsndConfig::from_json_str("{ volume: ");
        assert!(matches!(result, Err(CsndError::ConfigError(_))));
    }
}
