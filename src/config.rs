//! # Configuration
//!
//! Runtime settings of the RFPlayer engine, loadable from a JSON file. Every
//! field has a default so a partial file (or none at all) is valid:
//!
//! ```json
//! {
//!   "serial": { "baudrate": 115200, "rtscts": true, "timeout": 100 },
//!   "engine": { "request_timeout": 5000 },
//!   "default_ping_secs": 30
//! }
//! ```
//!
//! Durations are written in milliseconds.

use crate::constants::{
    DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_POLL_INTERVAL, DEFAULT_REBOOT_DELAY,
    DEFAULT_REQUEST_TIMEOUT, DEFAULT_SETTLE_DELAY, FIRMWARE_VALIDATION_TIMEOUT,
};
use crate::error::RfpError;
use crate::rfp::transport::SerialConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Serde helpers storing a `Duration` as integer milliseconds.
pub mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Timing of the dispatch engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Bound of every blocking wait of the duty cycles.
    #[serde(with = "millis")]
    pub poll_interval: Duration,
    /// Pause between starting the duty cycles and the first STATUS.
    #[serde(with = "millis")]
    pub settle_delay: Duration,
    #[serde(with = "millis")]
    pub handshake_timeout: Duration,
    #[serde(with = "millis")]
    pub request_timeout: Duration,
    #[serde(with = "millis")]
    pub firmware_timeout: Duration,
    /// Wait for the dongle to reboot on a new firmware.
    #[serde(with = "millis")]
    pub reboot_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            poll_interval: DEFAULT_POLL_INTERVAL,
            settle_delay: DEFAULT_SETTLE_DELAY,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            firmware_timeout: FIRMWARE_VALIDATION_TIMEOUT,
            reboot_delay: DEFAULT_REBOOT_DELAY,
        }
    }
}

/// Top level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RfpConfig {
    pub serial: SerialConfig,
    pub engine: EngineConfig,
    /// Directory of the client monitor logs.
    pub monitor_dir: PathBuf,
    /// Ping period applied to dongles without `timer_status`; 0 disables.
    pub default_ping_secs: u64,
}

impl Default for RfpConfig {
    fn default() -> Self {
        RfpConfig {
            serial: SerialConfig::default(),
            engine: EngineConfig::default(),
            monitor_dir: std::env::temp_dir(),
            default_ping_secs: 0,
        }
    }
}

impl RfpConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RfpError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            RfpError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, RfpError> {
        let config: RfpConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RfpError> {
        if self.serial.baudrate == 0 {
            return Err(RfpError::Configuration("baudrate must be positive".into()));
        }
        if self.engine.poll_interval.is_zero() {
            return Err(RfpError::Configuration("poll_interval must be positive".into()));
        }
        if self.engine.request_timeout < self.engine.poll_interval {
            return Err(RfpError::Configuration(
                "request_timeout shorter than poll_interval".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = RfpConfig::default();
        assert_eq!(cfg.engine.poll_interval, Duration::from_millis(100));
        assert_eq!(cfg.engine.settle_delay, Duration::from_secs(1));
        assert_eq!(cfg.engine.request_timeout, Duration::from_secs(5));
        assert_eq!(cfg.engine.firmware_timeout, Duration::from_secs(80));
        assert_eq!(cfg.default_ping_secs, 0);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let cfg = RfpConfig::from_json(
            r#"{"serial":{"rtscts":false},"engine":{"request_timeout":250},"default_ping_secs":30}"#,
        )
        .unwrap();
        assert!(!cfg.serial.rtscts);
        assert_eq!(cfg.serial.baudrate, 115_200);
        assert_eq!(cfg.engine.request_timeout, Duration::from_millis(250));
        assert_eq!(cfg.engine.poll_interval, Duration::from_millis(100));
        assert_eq!(cfg.default_ping_secs, 30);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            RfpConfig::from_json(r#"{"engine":{"poll_interval":0}}"#),
            Err(RfpError::Configuration(_))
        ));
        assert!(matches!(RfpConfig::from_json("{not json"), Err(RfpError::Json(_))));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rfplayer.json");
        std::fs::write(&path, r#"{"monitor_dir":"/var/log/rfplayer"}"#).unwrap();
        let cfg = RfpConfig::from_file(&path).unwrap();
        assert_eq!(cfg.monitor_dir, PathBuf::from("/var/log/rfplayer"));
        assert!(RfpConfig::from_file(dir.path().join("missing.json")).is_err());
    }
}
