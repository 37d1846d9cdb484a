//! Core data types for the phone sensor manager
//!
//! Identity and status of a device, the raw events handed over by the sensor
//! subsystem, and the normalized measurements forwarded to the sink.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Standard gravity used to express acceleration in g
pub const STANDARD_GRAVITY: f32 = 9.81;

/// Identity of a device instance, used as the measurement key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Group (study/user) the device belongs to
    pub user_group_id: String,
    /// Stable identifier of the physical device; also the call-log hash salt
    pub source_id: Option<String>,
}

impl DeviceIdentity {
    pub fn new(user_group_id: impl Into<String>, source_id: Option<String>) -> Self {
        Self {
            user_group_id: user_group_id.into(),
            source_id,
        }
    }

    /// Salt used when hashing call-log numbers
    pub fn salt(&self) -> &str {
        self.source_id.as_deref().unwrap_or("")
    }
}

/// Connection status of a device manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Ready,
    Connected,
    Disconnected,
}

impl DeviceStatus {
    fn rank(self) -> u8 {
        match self {
            DeviceStatus::Ready => 0,
            DeviceStatus::Connected => 1,
            DeviceStatus::Disconnected => 2,
        }
    }

    /// Whether `next` is a forward transition from this status
    pub fn can_advance_to(self, next: DeviceStatus) -> bool {
        next.rank() > self.rank()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Ready => "ready",
            DeviceStatus::Connected => "connected",
            DeviceStatus::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of hardware sensor that produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Accelerometer,
    Light,
    /// Any other platform sensor, by vendor type code
    Other(i32),
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorKind::Accelerometer => f.write_str("accelerometer"),
            SensorKind::Light => f.write_str("light"),
            SensorKind::Other(code) => write!(f, "other({})", code),
        }
    }
}

/// Raw reading as delivered by the sensor subsystem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSensorEvent {
    /// Sensor that produced the event
    pub kind: SensorKind,
    /// Hardware timestamp in nanoseconds
    pub timestamp_nanos: i64,
    /// Sensor values; acceleration in m/s², light in lux
    pub values: Vec<f32>,
}

impl RawSensorEvent {
    pub fn new(kind: SensorKind, timestamp_nanos: i64, values: Vec<f32>) -> Self {
        Self {
            kind,
            timestamp_nanos,
            values,
        }
    }
}

/// Battery state extras as captured from the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatterySnapshot {
    /// Current charge level, in units of `scale`
    pub level: Option<i32>,
    /// Maximum charge level
    pub scale: Option<i32>,
}

impl BatterySnapshot {
    /// Build from platform extras, where -1 means the extra was absent
    pub fn from_extras(level: i32, scale: i32) -> Self {
        Self {
            level: (level != -1).then_some(level),
            scale: (scale != -1).then_some(scale),
        }
    }
}

/// Acceleration in g
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccelerationSample {
    /// Sensor hardware timestamp (nanoseconds)
    pub time: f64,
    /// Wall clock time of conversion (seconds)
    pub time_received: f64,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Ambient light in lux
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightSample {
    /// Sensor hardware timestamp (nanoseconds)
    pub time: f64,
    /// Wall clock time of conversion (seconds)
    pub time_received: f64,
    pub light: f32,
}

/// Battery charge as a fraction of full
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatterySample {
    /// Wall clock time of the read (seconds)
    pub time: f64,
    /// Same as `time`; battery reads have no hardware timestamp
    pub time_received: f64,
    /// Charge fraction in [0, 1]
    pub battery_level: f32,
}

/// A converted measurement headed for the sink
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Measurement {
    Acceleration(AccelerationSample),
    Light(LightSample),
    Battery(BatterySample),
}

impl Measurement {
    pub fn series(&self) -> Series {
        match self {
            Measurement::Acceleration(_) => Series::Acceleration,
            Measurement::Light(_) => Series::Light,
            Measurement::Battery(_) => Series::BatteryLevel,
        }
    }
}

/// Measurement series produced by the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Series {
    Acceleration,
    Light,
    BatteryLevel,
}

/// Routing key for a measurement: its series and the configured topic name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeriesKey {
    pub series: Series,
    pub topic: String,
}

impl SeriesKey {
    pub fn new(series: Series, topic: impl Into<String>) -> Self {
        Self {
            series,
            topic: topic.into(),
        }
    }
}

/// One row of the call-history store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallLogEntry {
    /// Raw phone number; never leaves the scanner unhashed
    pub number: String,
    /// Call duration in seconds, as stored
    pub duration: String,
    /// Platform call type code (incoming, outgoing, missed, ...)
    pub call_type: i32,
    /// Call time in milliseconds since the epoch
    pub date_millis: i64,
}

/// Call-history record with the number replaced by its salted hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallLogRecord {
    /// Hex-encoded SHA-256 of number + salt
    pub hashed_number: String,
    pub duration: String,
    pub call_type: i32,
    /// Original call time (ms)
    pub call_timestamp: i64,
    /// Time of the scan that emitted this record (ms)
    pub scan_time: i64,
}

/// Last known readings and status of a device
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatestDeviceState {
    pub status: DeviceStatus,
    /// Last acceleration in g
    pub acceleration: Option<[f32; 3]>,
    /// Last illuminance in lux
    pub light: Option<f32>,
    /// Last battery charge fraction
    pub battery_level: Option<f32>,
}

impl Default for LatestDeviceState {
    fn default() -> Self {
        Self {
            status: DeviceStatus::Ready,
            acceleration: None,
            light: None,
            battery_level: None,
        }
    }
}

/// Read-only view of a device for status queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStateSnapshot {
    pub identity: DeviceIdentity,
    #[serde(flatten)]
    pub latest: LatestDeviceState,
}
