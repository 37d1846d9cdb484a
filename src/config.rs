//! Manager configuration
//!
//! Everything except the group id has a default, so a minimal JSON config is
//! `{"group_id": "study-1", "source_id": "phone-1"}`.

use crate::error::DeviceError;
use crate::types::{Series, SeriesKey};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default period between call-log scans (24 hours)
pub const DEFAULT_CALL_LOG_PERIOD_SECS: u64 = 24 * 60 * 60;

/// Default timeout hint for direct battery sends
pub const DEFAULT_BATTERY_SEND_TIMEOUT_MS: u64 = 500;

/// Sampling rate requested from the sensor subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingDelay {
    #[default]
    Normal,
    Ui,
    Game,
    Fastest,
}

/// Topic names for each measurement series
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicNames {
    pub acceleration: String,
    pub light: String,
    pub battery_level: String,
}

impl Default for TopicNames {
    fn default() -> Self {
        Self {
            acceleration: "android_phone_acceleration".to_string(),
            light: "android_phone_light".to_string(),
            battery_level: "android_phone_battery_level".to_string(),
        }
    }
}

impl TopicNames {
    pub fn key(&self, series: Series) -> SeriesKey {
        let topic = match series {
            Series::Acceleration => &self.acceleration,
            Series::Light => &self.light,
            Series::BatteryLevel => &self.battery_level,
        };
        SeriesKey::new(series, topic.clone())
    }
}

/// Configuration of a single device manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Group (study/user) identifier
    pub group_id: String,
    /// Device source identifier; also the call-log hash salt
    #[serde(default)]
    pub source_id: Option<String>,
    /// Device model reported by `DeviceManager::name`
    #[serde(default = "default_device_name")]
    pub device_name: String,
    /// Seconds between call-log scans
    #[serde(default = "default_call_log_period_secs")]
    pub call_log_period_secs: u64,
    /// Maximum age of a call-log entry, in seconds; defaults to the period
    #[serde(default)]
    pub call_log_lookback_secs: Option<u64>,
    /// Timeout hint passed with best-effort battery sends
    #[serde(default = "default_battery_send_timeout_ms")]
    pub battery_send_timeout_ms: u64,
    #[serde(default)]
    pub sampling_delay: SamplingDelay,
    #[serde(default)]
    pub topics: TopicNames,
}

fn default_device_name() -> String {
    "unknown".to_string()
}

fn default_call_log_period_secs() -> u64 {
    DEFAULT_CALL_LOG_PERIOD_SECS
}

fn default_battery_send_timeout_ms() -> u64 {
    DEFAULT_BATTERY_SEND_TIMEOUT_MS
}

impl ManagerConfig {
    pub fn new(group_id: impl Into<String>, source_id: Option<String>) -> Self {
        Self {
            group_id: group_id.into(),
            source_id,
            device_name: default_device_name(),
            call_log_period_secs: DEFAULT_CALL_LOG_PERIOD_SECS,
            call_log_lookback_secs: None,
            battery_send_timeout_ms: DEFAULT_BATTERY_SEND_TIMEOUT_MS,
            sampling_delay: SamplingDelay::default(),
            topics: TopicNames::default(),
        }
    }

    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self, DeviceError> {
        let config: ManagerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DeviceError> {
        if self.group_id.trim().is_empty() {
            return Err(DeviceError::InvalidConfig(
                "group_id must not be empty".to_string(),
            ));
        }
        if self.call_log_period_secs == 0 {
            return Err(DeviceError::InvalidConfig(
                "call_log_period_secs must be positive".to_string(),
            ));
        }
        if self.call_log_lookback_secs == Some(0) {
            return Err(DeviceError::InvalidConfig(
                "call_log_lookback_secs must be positive".to_string(),
            ));
        }
        let topics = [
            &self.topics.acceleration,
            &self.topics.light,
            &self.topics.battery_level,
        ];
        if topics.iter().any(|t| t.is_empty()) {
            return Err(DeviceError::InvalidConfig(
                "topic names must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn call_log_period(&self) -> Duration {
        Duration::from_secs(self.call_log_period_secs)
    }

    pub fn call_log_lookback(&self) -> Duration {
        Duration::from_secs(self.call_log_lookback_secs.unwrap_or(self.call_log_period_secs))
    }

    pub fn battery_send_timeout(&self) -> Duration {
        Duration::from_millis(self.battery_send_timeout_ms)
    }
}
