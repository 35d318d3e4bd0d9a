//! Engine configuration, loaded from JSON.
//!
//! Every key is optional; missing keys keep their defaults.
//!
//! ```
//! use tether_engine::config::EngineConfig;
//!
//! let config = EngineConfig::from_json_str(r#"{ "logging_interval": 0.5, "lead_in": 0.1 }"#).unwrap();
//! assert_eq!(config.logging_interval, 0.5);
//! assert_eq!(config.scroll_log_lines, 8);
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use tether_sync::config::SyncConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seconds between snapshot captures.
    pub logging_interval: f32,
    /// Delay from mission start to the first capture.
    pub lead_in: f32,
    /// Where saved logs live.
    pub save_directory: PathBuf,
    /// Lines kept by the scrolling journal.
    pub scroll_log_lines: usize,
    pub sync: SyncConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            logging_interval: 1.0,
            lead_in: 0.2,
            save_directory: std::env::temp_dir().join("tether-logs"),
            scroll_log_lines: 8,
            sync: SyncConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, anyhow::Error> {
        let config: EngineConfig =
            serde_json::from_str(json).context("engine config is not valid JSON")?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate the JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self, anyhow::Error> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config {}", path.display()))?;
        Self::from_json_str(&json).with_context(|| format!("in engine config {}", path.display()))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        let interval = self.logging_interval;
        if !(interval > 0.0 && interval.is_finite()) {
            bail!("logging_interval must be positive and finite, got {interval}");
        }
        if !(0.0..interval).contains(&self.lead_in) {
            bail!("lead_in must lie in [0, {interval}), got {}", self.lead_in);
        }
        if self.scroll_log_lines == 0 {
            bail!("scroll_log_lines must be at least 1");
        }
        self.sync.validate().map_err(anyhow::Error::msg)?;
        Ok(())
    }

    pub fn to_json_string(&self) -> Result<String, anyhow::Error> {
        serde_json::to_string_pretty(self).context("failed to serialize engine config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn json_round_trip() {
        let mut config = EngineConfig::default();
        config.sync.reconcile.damping = 0.5;
        config.save_directory = PathBuf::from("/var/tether");
        let json = config.to_json_string().unwrap();
        assert_eq!(EngineConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn lead_in_must_be_shorter_than_interval() {
        let err = EngineConfig::from_json_str(r#"{ "logging_interval": 1.0, "lead_in": 1.0 }"#)
            .unwrap_err();
        assert!(err.to_string().contains("lead_in"));
    }

    #[test]
    fn zero_interval_is_rejected() {
        assert!(EngineConfig::from_json_str(r#"{ "logging_interval": 0.0, "lead_in": 0.0 }"#).is_err());
    }

    #[test]
    fn bad_damping_is_rejected() {
        let err = EngineConfig::from_json_str(r#"{ "sync": { "reconcile": { "damping": 1.5 } } }"#)
            .unwrap_err();
        assert!(format!("{err:#}").contains("damping"));
    }

    #[test]
    fn missing_file_names_path() {
        let err = EngineConfig::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(err.to_string().contains("here.json"));
    }
}
