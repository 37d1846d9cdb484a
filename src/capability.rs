//! External interfaces
//!
//! The manager only consumes these; platform code (or the in-memory adapters
//! in [`crate::adapters`]) provides the implementations.

use crate::config::SamplingDelay;
use crate::error::DeviceError;
use crate::types::{
    BatterySnapshot, CallLogEntry, CallLogRecord, DeviceIdentity, DeviceStatus, Measurement,
    RawSensorEvent, SensorKind, SeriesKey,
};
use std::sync::Arc;
use std::time::Duration;

/// A hardware sensor offered by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorHandle {
    pub kind: SensorKind,
    /// Platform sensor name, for logging
    pub name: String,
}

impl SensorHandle {
    pub fn new(kind: SensorKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

/// Token returned by a sensor registration, used to release it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationId(pub u64);

/// Receiver of raw sensor events
pub trait SensorEventListener: Send + Sync {
    fn on_sensor_changed(&self, event: &RawSensorEvent) -> Result<(), DeviceError>;
}

/// The platform sensor subsystem
pub trait SensorCapability: Send + Sync {
    /// Default sensor of the given kind, if the device has one
    fn default_sensor(&self, kind: SensorKind) -> Option<SensorHandle>;

    /// Deliver events of `sensor` to `listener`; `None` if the platform refused
    fn register_listener(
        &self,
        listener: Arc<dyn SensorEventListener>,
        sensor: &SensorHandle,
        delay: SamplingDelay,
    ) -> Option<RegistrationId>;

    fn unregister_listener(&self, registration: RegistrationId);
}

/// The platform battery status broadcast
pub trait BatteryMonitor: Send + Sync {
    /// Start observing battery changes; false if the platform has no battery status
    fn register_observer(&self) -> bool;

    /// Most recent battery extras, if any were captured
    fn battery_status(&self) -> Option<BatterySnapshot>;

    fn unregister_observer(&self);
}

/// Downstream storage and streaming pipeline
pub trait MeasurementSink: Send + Sync {
    /// Buffer a measurement for a high-rate series; failures are hard errors
    fn enqueue(
        &self,
        key: &SeriesKey,
        identity: &DeviceIdentity,
        measurement: Measurement,
    ) -> Result<(), DeviceError>;

    /// Send a measurement directly if the pipeline can take it within `timeout`
    fn best_effort_send(
        &self,
        key: &SeriesKey,
        identity: &DeviceIdentity,
        measurement: Measurement,
        timeout: Duration,
    ) -> Result<(), DeviceError>;
}

/// Observer of device status transitions
///
/// Called with the lifecycle lock held: implementations must not call
/// `start`, `close` or `is_closed` on the manager that notified them.
pub trait StatusListener: Send + Sync {
    fn device_status_updated(&self, identity: &DeviceIdentity, status: DeviceStatus);
}

/// Cursor over call-history rows, ordered oldest to newest
pub trait CallLogCursor {
    /// Position on the newest row; false if the store is empty
    fn move_to_last(&mut self) -> bool;

    /// Step to the next older row; false if there is none
    fn move_to_previous(&mut self) -> bool;

    /// Row under the cursor
    fn entry(&self) -> Result<CallLogEntry, DeviceError>;

    /// Release the underlying resource
    fn close(&mut self);
}

/// The platform call-history store
pub trait CallLogStore: Send + Sync {
    fn query(&self) -> Result<Box<dyn CallLogCursor + '_>, DeviceError>;
}

/// Destination of hashed call-log records
pub trait CallLogSink: Send + Sync {
    fn emit(&self, record: &CallLogRecord);
}
