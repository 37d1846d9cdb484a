//! Sensor event routing
//!
//! Dispatches raw events to the matching converter and forwards the result to
//! the sink. Battery has no schedule of its own: every sensor event, whatever
//! its kind and whether or not it converted cleanly, is followed by a battery
//! read that is sent directly.

use crate::capability::{BatteryMonitor, MeasurementSink, SensorEventListener};
use crate::clock::Clock;
use crate::config::TopicNames;
use crate::converter::MeasurementConverter;
use crate::error::DeviceError;
use crate::state::DeviceStateCell;
use crate::types::{DeviceStatus, Measurement, RawSensorEvent, SensorKind, Series};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Router from raw sensor events to sink measurements
pub struct SensorEventRouter {
    state: Arc<DeviceStateCell>,
    sink: Arc<dyn MeasurementSink>,
    battery: Arc<dyn BatteryMonitor>,
    clock: Arc<dyn Clock>,
    topics: TopicNames,
    battery_send_timeout: Duration,
}

impl SensorEventRouter {
    pub fn new(
        state: Arc<DeviceStateCell>,
        sink: Arc<dyn MeasurementSink>,
        battery: Arc<dyn BatteryMonitor>,
        clock: Arc<dyn Clock>,
        topics: TopicNames,
        battery_send_timeout: Duration,
    ) -> Self {
        Self {
            state,
            sink,
            battery,
            clock,
            topics,
            battery_send_timeout,
        }
    }

    /// Handle one raw event
    ///
    /// Events are ignored unless the device is connected. Enqueue failures for
    /// the primary measurement are returned; battery send failures are not.
    pub fn on_event(&self, event: &RawSensorEvent) -> Result<(), DeviceError> {
        if self.state.status() != DeviceStatus::Connected {
            debug!(kind = %event.kind, "Dropping sensor event while not connected");
            return Ok(());
        }

        let primary = match event.kind {
            SensorKind::Accelerometer => self.process_acceleration(event),
            SensorKind::Light => self.process_light(event),
            SensorKind::Other(code) => {
                info!(code, "Phone registered other sensor change");
                Ok(())
            }
        };

        if let Err(e) = &primary {
            warn!(kind = %event.kind, error = %e, "Failed to process sensor event");
        }

        self.process_battery();
        primary
    }

    fn process_acceleration(&self, event: &RawSensorEvent) -> Result<(), DeviceError> {
        let sample =
            MeasurementConverter::acceleration(event, &self.state, self.clock.now_seconds())?;
        self.sink.enqueue(
            &self.topics.key(Series::Acceleration),
            self.state.identity(),
            Measurement::Acceleration(sample),
        )
    }

    fn process_light(&self, event: &RawSensorEvent) -> Result<(), DeviceError> {
        let sample = MeasurementConverter::light(event, &self.state, self.clock.now_seconds())?;
        self.sink.enqueue(
            &self.topics.key(Series::Light),
            self.state.identity(),
            Measurement::Light(sample),
        )
    }

    fn process_battery(&self) {
        let snapshot = self.battery.battery_status();
        let Some(sample) =
            MeasurementConverter::battery(snapshot.as_ref(), &self.state, self.clock.now_seconds())
        else {
            debug!(?snapshot, "Battery level unknown, skipping");
            return;
        };

        let key = self.topics.key(Series::BatteryLevel);
        if let Err(e) = self.sink.best_effort_send(
            &key,
            self.state.identity(),
            Measurement::Battery(sample),
            self.battery_send_timeout,
        ) {
            warn!(topic = %key.topic, error = %e, "Dropped battery measurement");
        }
    }
}

impl SensorEventListener for SensorEventRouter {
    fn on_sensor_changed(&self, event: &RawSensorEvent) -> Result<(), DeviceError> {
        self.on_event(event)
    }
}
