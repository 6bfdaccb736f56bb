//! JSON configuration for the playback engine
//!
//! **Why**: The same engine drives interactive playback, headless pipeline
//! runs and the HTTP sink; all of them share one small set of knobs loaded
//! from `config.json` and overridable from the CLI.
//!
//! **Used by**: main (load + overrides), PlaybackLoop, StreamingPipeline

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Engine configuration. Loading mechanics live here; the core components
/// consume values only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Rolling time-window size for the time-space strips (seconds)
    pub window_size: f64,
    /// Query/advance rate (Hz)
    pub framerate: f64,
    /// Capacity of each attribute/color cache (entries)
    pub cache_capacity: usize,
    /// Roadway x-range for the overhead view (feet)
    pub x_min: f64,
    pub x_max: f64,
    /// Optional playback duration; clamps t_max to t_min + duration (seconds)
    pub duration: Option<f64>,
    /// Ascending lane boundaries in feet; N boundaries define N-1 lanes
    pub lane_boundaries: Vec<f64>,
    /// Drive the window from the overhead frame clock (anchored mode);
    /// false runs time-space only with a fixed per-tick increment
    pub overhead_view: bool,
    /// Bounded channel capacity for the streaming pipeline (items)
    pub channel_capacity: usize,
    /// HTTP sink port
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            window_size: 10.0,
            framerate: 25.0,
            cache_capacity: 100,
            x_min: 1000.0,
            x_max: 2000.0,
            duration: None,
            lane_boundaries: crate::lanes::default_boundaries(),
            overhead_view: true,
            channel_capacity: 30,
            port: 8077,
        }
    }
}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(String),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "config read error: {}", e),
            ConfigError::Parse(e) => write!(f, "config parse error: {}", e),
            ConfigError::Invalid(e) => write!(f, "invalid config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    /// Load from a JSON file and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        let config: Config =
            serde_json::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.window_size > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "window_size must be > 0, got {}",
                self.window_size
            )));
        }
        if !(self.framerate > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "framerate must be > 0, got {}",
                self.framerate
            )));
        }
        if self.cache_capacity == 0 {
            return Err(ConfigError::Invalid("cache_capacity must be >= 1".to_string()));
        }
        if self.x_min >= self.x_max {
            return Err(ConfigError::Invalid(format!(
                "x range is empty: [{}, {}]",
                self.x_min, self.x_max
            )));
        }
        if self.lane_boundaries.len() < 2 {
            return Err(ConfigError::Invalid("need at least 2 lane boundaries".to_string()));
        }
        if !self.lane_boundaries.windows(2).all(|w| w[0] < w[1]) {
            return Err(ConfigError::Invalid("lane boundaries must be ascending".to_string()));
        }
        if let Some(d) = self.duration {
            if !(d > 0.0) {
                return Err(ConfigError::Invalid(format!("duration must be > 0, got {}", d)));
            }
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::Invalid("channel_capacity must be >= 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test: defaults validate
    /// Validates: the out-of-the-box config is usable
    #[test]
    fn test_default_config_valid() {
        assert!(Config::default().validate().is_ok());
        assert_eq!(Config::default().lane_boundaries.len(), 13);
    }

    /// Test: validation rejects bad knobs
    /// Validates: each constraint fires independently
    #[test]
    fn test_validation_rejects() {
        let mut c = Config::default();
        c.window_size = 0.0;
        assert!(c.validate().is_err());

        let mut c = Config::default();
        c.framerate = -1.0;
        assert!(c.validate().is_err());

        let mut c = Config::default();
        c.cache_capacity = 0;
        assert!(c.validate().is_err());

        let mut c = Config::default();
        c.x_min = c.x_max;
        assert!(c.validate().is_err());

        let mut c = Config::default();
        c.lane_boundaries = vec![0.0, 12.0, 12.0];
        assert!(c.validate().is_err());
    }

    /// Test: partial JSON fills from defaults
    /// Validates: serde(default) on the whole struct
    #[test]
    fn test_partial_json() {
        let c: Config = serde_json::from_str(r#"{"framerate": 10.0}"#).unwrap();
        assert_eq!(c.framerate, 10.0);
        assert_eq!(c.window_size, 10.0);
        assert!(c.validate().is_ok());
    }
}
