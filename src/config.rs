use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::dashboard::MIN_SWITCH_POLL;
use crate::error::{CollectorError, Result};
use crate::processor::EngineConfig;

/// Collector settings. Every field has a default, so a config file only
/// needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Capture interface; the system default device when unset.
    pub interface: Option<String>,
    pub filter: String,
    pub output: PathBuf,
    /// Stop after this many seconds.
    pub timeout_secs: Option<u64>,
    pub window_secs: u64,
    pub history_capacity: usize,
    pub stale_after_secs: u64,
    pub reap_interval_secs: u64,
    pub model: PathBuf,
    pub model_dir: PathBuf,
    pub use_ml: bool,
    pub dashboard_url: Option<String>,
    pub stats_every_packets: u64,
    /// Log capture progress every this many packets; 0 disables it.
    pub progress_every_packets: u64,
    pub switch_poll_secs: u64,
    pub dashboard_timeout_secs: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            interface: None,
            filter: "ip".to_string(),
            output: PathBuf::from("ids_data.csv"),
            timeout_secs: None,
            window_secs: 2,
            history_capacity: 10_000,
            stale_after_secs: 60,
            reap_interval_secs: 5,
            model: PathBuf::from("hids_model.onnx"),
            model_dir: PathBuf::from("."),
            use_ml: true,
            dashboard_url: None,
            stats_every_packets: 500,
            progress_every_packets: 100,
            switch_poll_secs: 5,
            dashboard_timeout_secs: 5,
        }
    }
}

impl CollectorConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.window_secs == 0 {
            return Err(CollectorError::Config("window must be at least 1 second".into()));
        }
        if self.history_capacity == 0 {
            return Err(CollectorError::Config("history capacity must be positive".into()));
        }
        if self.reap_interval_secs == 0 {
            return Err(CollectorError::Config("reap interval must be at least 1 second".into()));
        }
        if self.filter.trim().is_empty() {
            return Err(CollectorError::Config("capture filter is empty".into()));
        }
        Ok(())
    }

    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            window: Duration::from_secs(self.window_secs),
            history_capacity: self.history_capacity,
            stale_after: Duration::from_secs(self.stale_after_secs),
            reap_interval: Duration::from_secs(self.reap_interval_secs),
            stats_every: self.stats_every_packets,
            progress_every: self.progress_every_packets,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn switch_poll(&self) -> Duration {
        Duration::from_secs(self.switch_poll_secs).max(MIN_SWITCH_POLL)
    }

    pub fn dashboard_timeout(&self) -> Duration {
        Duration::from_secs(self.dashboard_timeout_secs)
    }

    /// A bare model name resolves against `model_dir`.
    pub fn model_path(&self) -> PathBuf {
        if self.model.components().count() > 1 || self.model.is_absolute() {
            self.model.clone()
        } else {
            self.model_dir.join(&self.model)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: CollectorConfig =
            serde_json::from_str(r#"{"interface": "eth0", "window_secs": 3, "use_ml": false}"#).unwrap();
        assert_eq!(config.interface.as_deref(), Some("eth0"));
        assert_eq!(config.window_secs, 3);
        assert!(!config.use_ml);
        assert_eq!(config.filter, "ip");
        assert_eq!(config.output, PathBuf::from("ids_data.csv"));
        assert_eq!(config.history_capacity, 10_000);
    }

    #[test]
    fn test_switch_poll_is_clamped() {
        let config = CollectorConfig { switch_poll_secs: 1, ..CollectorConfig::default() };
        assert_eq!(config.switch_poll(), Duration::from_secs(5));
        let config = CollectorConfig { switch_poll_secs: 30, ..CollectorConfig::default() };
        assert_eq!(config.switch_poll(), Duration::from_secs(30));
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let config = CollectorConfig { window_secs: 0, ..CollectorConfig::default() };
        assert!(matches!(config.validate(), Err(CollectorError::Config(_))));
        assert!(CollectorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_engine_config_mapping() {
        let engine = CollectorConfig::default().engine();
        assert_eq!(engine.window, Duration::from_secs(2));
        assert_eq!(engine.stale_after, Duration::from_secs(60));
        assert_eq!(engine.reap_interval, Duration::from_secs(5));
        assert_eq!(engine.stats_every, 500);
        assert_eq!(engine.progress_every, 100);
    }

    #[test]
    fn test_model_path_resolution() {
        let config = CollectorConfig { model_dir: PathBuf::from("/opt/models"), ..CollectorConfig::default() };
        assert_eq!(config.model_path(), PathBuf::from("/opt/models/hids_model.onnx"));

        let config = CollectorConfig { model: PathBuf::from("./nn.json"), ..config };
        assert_eq!(config.model_path(), PathBuf::from("./nn.json"));
    }
}
