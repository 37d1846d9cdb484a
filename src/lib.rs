//! Phone Sensors - On-device ingestion manager for phone sensor data
//!
//! Binds to the phone's accelerometer, ambient light sensor and battery status,
//! converts raw readings into normalized measurements and forwards them to a
//! downstream sink: sensor event → router → converter → sink.
//!
//! Independently, a background scan walks the recent call history and emits
//! each call with the phone number replaced by a salted SHA-256 hash.
//!
//! ## Modules
//!
//! - **Manager**: lifecycle, routing and measurement forwarding for one device
//! - **Call log**: scheduled, hashed call-history scanning
//! - **Adapters**: in-memory collaborators and an NDJSON sink

pub mod adapters;
pub mod call_log;
pub mod capability;
pub mod clock;
pub mod config;
pub mod converter;
pub mod error;
pub mod lifecycle;
pub mod manager;
pub mod router;
pub mod schedule;
pub mod state;
pub mod types;

pub use call_log::{hash_number, CallLogScanner, ScanSummary, StopReason, TracingCallLogSink};
pub use capability::{
    BatteryMonitor, CallLogCursor, CallLogSink, CallLogStore, MeasurementSink, SensorCapability,
    SensorEventListener, StatusListener,
};
pub use config::ManagerConfig;
pub use error::DeviceError;
pub use lifecycle::StartReport;
pub use manager::{DeviceManager, DeviceManagerBuilder};
pub use types::{
    DeviceIdentity, DeviceStateSnapshot, DeviceStatus, Measurement, RawSensorEvent, SensorKind,
};

/// Crate version embedded in sink envelopes
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for sink envelopes
pub const PRODUCER_NAME: &str = "phone-sensors";
