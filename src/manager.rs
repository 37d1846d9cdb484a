//! Device manager
//!
//! Composition root: wires the sensor capability into the router, owns the
//! lifecycle, and exposes name, state and identity-based equality.

use crate::call_log::{CallLogScanner, TracingCallLogSink};
use crate::capability::{
    BatteryMonitor, CallLogSink, CallLogStore, MeasurementSink, SensorCapability,
    SensorEventListener, StatusListener,
};
use crate::clock::{Clock, SystemClock};
use crate::config::ManagerConfig;
use crate::error::DeviceError;
use crate::lifecycle::{DeviceLifecycle, LifecycleResources, StartReport};
use crate::router::SensorEventRouter;
use crate::state::DeviceStateCell;
use crate::types::{DeviceIdentity, DeviceStateSnapshot, DeviceStatus, RawSensorEvent};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Manager of the phone's on-board sensors and call log
pub struct DeviceManager {
    name: String,
    state: Arc<DeviceStateCell>,
    router: Arc<SensorEventRouter>,
    lifecycle: DeviceLifecycle,
}

impl DeviceManager {
    pub fn builder(config: ManagerConfig) -> DeviceManagerBuilder {
        DeviceManagerBuilder::new(config)
    }

    /// Device model, fixed at construction
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identity(&self) -> &DeviceIdentity {
        self.state.identity()
    }

    pub fn status(&self) -> DeviceStatus {
        self.state.status()
    }

    /// Current status and last readings
    pub fn state(&self) -> DeviceStateSnapshot {
        self.state.snapshot()
    }

    /// Register with the sensors and start the call-log schedule
    ///
    /// Only valid once per instance; see [`DeviceLifecycle::start`].
    pub fn start(
        &self,
        acceptable_source_ids: &HashSet<String>,
    ) -> Result<StartReport, DeviceError> {
        self.lifecycle.start(acceptable_source_ids)
    }

    pub fn close(&self) {
        self.lifecycle.close();
    }

    pub fn is_closed(&self) -> bool {
        self.lifecycle.is_closed()
    }

    /// Feed a raw event directly, bypassing the sensor capability
    pub fn on_sensor_changed(&self, event: &RawSensorEvent) -> Result<(), DeviceError> {
        self.router.on_event(event)
    }
}

impl Drop for DeviceManager {
    fn drop(&mut self) {
        self.lifecycle.close();
    }
}

impl PartialEq for DeviceManager {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        match (&self.identity().source_id, &other.identity().source_id) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for DeviceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceManager")
            .field("name", &self.name)
            .field("identity", self.identity())
            .field("status", &self.status())
            .finish()
    }
}

/// Builder collecting the collaborators of a [`DeviceManager`]
pub struct DeviceManagerBuilder {
    config: ManagerConfig,
    sensors: Option<Arc<dyn SensorCapability>>,
    battery: Option<Arc<dyn BatteryMonitor>>,
    sink: Option<Arc<dyn MeasurementSink>>,
    status_listener: Option<Arc<dyn StatusListener>>,
    call_log: Option<Arc<dyn CallLogStore>>,
    call_log_sink: Option<Arc<dyn CallLogSink>>,
    clock: Option<Arc<dyn Clock>>,
}

impl DeviceManagerBuilder {
    pub fn new(config: ManagerConfig) -> Self {
        Self {
            config,
            sensors: None,
            battery: None,
            sink: None,
            status_listener: None,
            call_log: None,
            call_log_sink: None,
            clock: None,
        }
    }

    pub fn sensors(mut self, sensors: Arc<dyn SensorCapability>) -> Self {
        self.sensors = Some(sensors);
        self
    }

    pub fn battery(mut self, battery: Arc<dyn BatteryMonitor>) -> Self {
        self.battery = Some(battery);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn MeasurementSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn status_listener(mut self, listener: Arc<dyn StatusListener>) -> Self {
        self.status_listener = Some(listener);
        self
    }

    pub fn call_log(mut self, store: Arc<dyn CallLogStore>) -> Self {
        self.call_log = Some(store);
        self
    }

    /// Destination of hashed call-log records; defaults to [`TracingCallLogSink`]
    pub fn call_log_sink(mut self, sink: Arc<dyn CallLogSink>) -> Self {
        self.call_log_sink = Some(sink);
        self
    }

    /// Wall clock; defaults to [`SystemClock`]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validate the configuration and assemble the manager in the Ready state
    pub fn build(self) -> Result<DeviceManager, DeviceError> {
        self.config.validate()?;

        let sensors = self.sensors.ok_or(DeviceError::MissingCollaborator("sensors"))?;
        let battery = self.battery.ok_or(DeviceError::MissingCollaborator("battery"))?;
        let sink = self.sink.ok_or(DeviceError::MissingCollaborator("sink"))?;
        let status_listener = self
            .status_listener
            .ok_or(DeviceError::MissingCollaborator("status_listener"))?;
        let call_log = self.call_log.ok_or(DeviceError::MissingCollaborator("call_log"))?;
        let call_log_sink: Arc<dyn CallLogSink> = match self.call_log_sink {
            Some(sink) => sink,
            None => Arc::new(TracingCallLogSink),
        };
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };

        let config = self.config;
        let identity = DeviceIdentity::new(config.group_id.clone(), config.source_id.clone());
        let state = Arc::new(DeviceStateCell::new(identity.clone()));

        let router = Arc::new(SensorEventRouter::new(
            Arc::clone(&state),
            sink,
            Arc::clone(&battery),
            Arc::clone(&clock),
            config.topics.clone(),
            config.battery_send_timeout(),
        ));

        let scanner = Arc::new(CallLogScanner::new(
            call_log,
            call_log_sink,
            clock,
            identity.salt(),
            config.call_log_lookback(),
        ));

        let event_listener: Arc<dyn SensorEventListener> = router.clone();
        let lifecycle = DeviceLifecycle::new(
            Arc::clone(&state),
            status_listener,
            LifecycleResources {
                sensors,
                battery,
                event_listener,
                scanner,
                scan_period: config.call_log_period(),
                sampling_delay: config.sampling_delay,
            },
        );

        Ok(DeviceManager {
            name: config.device_name,
            state,
            router,
            lifecycle,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        MemoryBattery, MemoryCallLog, MemoryCallLogSink, MemorySink, RecordingStatusListener,
        SimulatedSensors,
    };
    use crate::call_log::hash_number;
    use crate::clock::ManualClock;
    use crate::types::{CallLogEntry, Measurement, SensorKind, Series};
    use pretty_assertions::assert_eq;
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    const NOW: i64 = 1_700_000_000_000;

    struct Fixture {
        sensors: Arc<SimulatedSensors>,
        battery: Arc<MemoryBattery>,
        sink: Arc<MemorySink>,
        listener: Arc<RecordingStatusListener>,
        call_log: Arc<MemoryCallLog>,
        call_log_sink: Arc<MemoryCallLogSink>,
        manager: DeviceManager,
    }

    fn config(source_id: Option<&str>) -> ManagerConfig {
        let mut config = ManagerConfig::new("study-1", source_id.map(str::to_string));
        config.device_name = "Pixel 8".to_string();
        config
    }

    fn fixture_with(config: ManagerConfig, calls: Vec<CallLogEntry>) -> Fixture {
        let sensors = Arc::new(SimulatedSensors::with_all());
        let battery = Arc::new(MemoryBattery::new(Some((50, 100))));
        let sink = Arc::new(MemorySink::default());
        let listener = Arc::new(RecordingStatusListener::default());
        let call_log = Arc::new(MemoryCallLog::new(calls));
        let call_log_sink = Arc::new(MemoryCallLogSink::default());

        let manager = DeviceManager::builder(config)
            .sensors(sensors.clone())
            .battery(battery.clone())
            .sink(sink.clone())
            .status_listener(listener.clone())
            .call_log(call_log.clone())
            .call_log_sink(call_log_sink.clone())
            .clock(Arc::new(ManualClock::new(NOW)))
            .build()
            .unwrap();

        Fixture {
            sensors,
            battery,
            sink,
            listener,
            call_log,
            call_log_sink,
            manager,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(config(Some("phone-1")), Vec::new())
    }

    #[test]
    fn test_new_manager_is_ready() {
        let f = fixture();

        assert_eq!(f.manager.name(), "Pixel 8");
        assert_eq!(f.manager.status(), DeviceStatus::Ready);
        assert!(f.manager.is_closed());
        assert_eq!(f.listener.statuses(), vec![DeviceStatus::Ready]);

        let (identity, _) = &f.listener.updates()[0];
        assert_eq!(identity.source_id.as_deref(), Some("phone-1"));
    }

    #[test]
    fn test_events_flow_to_sink_while_connected() {
        let f = fixture();
        f.manager.start(&HashSet::new()).unwrap();

        f.sensors.emit(&RawSensorEvent::new(
            SensorKind::Accelerometer,
            1_000,
            vec![0.0, 0.0, 9.81],
        ));
        f.sensors
            .emit(&RawSensorEvent::new(SensorKind::Light, 2_000, vec![80.0]));

        let queued = f.sink.enqueued();
        assert_eq!(queued.len(), 2);
        assert_eq!(queued[0].key.series, Series::Acceleration);
        assert_eq!(queued[1].key.series, Series::Light);
        assert_eq!(f.sink.sent().len(), 2);

        let state = f.manager.state();
        assert_eq!(state.latest.status, DeviceStatus::Connected);
        let [_, _, z] = state.latest.acceleration.unwrap();
        assert!((z - 1.0).abs() < 1e-6);
        assert_eq!(state.latest.light, Some(80.0));
        assert_eq!(state.latest.battery_level, Some(0.5));

        f.manager.close();
    }

    #[test]
    fn test_emitted_record_matches_cached_state() {
        let f = fixture();
        f.manager.start(&HashSet::new()).unwrap();

        f.manager
            .on_sensor_changed(&RawSensorEvent::new(
                SensorKind::Accelerometer,
                5,
                vec![1.0, 2.0, 3.0],
            ))
            .unwrap();

        let cached = f.manager.state().latest.acceleration.unwrap();
        match f.sink.enqueued()[0].measurement {
            Measurement::Acceleration(sample) => {
                assert_eq!([sample.x, sample.y, sample.z], cached)
            }
            other => panic!("unexpected measurement {:?}", other),
        }
        f.manager.close();
    }

    #[test]
    fn test_no_measurements_outside_session() {
        let f = fixture();
        let event = RawSensorEvent::new(SensorKind::Light, 0, vec![1.0]);

        f.manager.on_sensor_changed(&event).unwrap();
        f.manager.start(&HashSet::new()).unwrap();
        f.manager.close();
        f.manager.on_sensor_changed(&event).unwrap();

        assert!(f.sink.enqueued().is_empty());
        assert!(f.sink.sent().is_empty());
        assert!(f.sensors.emit(&event).is_empty());
    }

    #[test]
    fn test_lifecycle_sequence_and_unsupported_restart() {
        let f = fixture();

        f.manager.start(&HashSet::from(["phone-1".to_string()])).unwrap();
        assert!(!f.manager.is_closed());
        f.manager.close();
        assert!(f.manager.is_closed());
        assert!(!f.battery.is_observed());

        // restarting a closed manager is unsupported; a new instance is required
        assert!(matches!(
            f.manager.start(&HashSet::new()),
            Err(DeviceError::InvalidTransition { .. })
        ));
        assert_eq!(
            f.listener.statuses(),
            vec![
                DeviceStatus::Ready,
                DeviceStatus::Connected,
                DeviceStatus::Disconnected
            ]
        );
    }

    #[test]
    fn test_start_scans_call_log_with_source_salt() {
        let calls = vec![
            CallLogEntry {
                number: "+31600000001".to_string(),
                duration: "65".to_string(),
                call_type: 2,
                date_millis: NOW - 60_000,
            },
            CallLogEntry {
                number: "+31600000002".to_string(),
                duration: "3".to_string(),
                call_type: 1,
                date_millis: NOW - 3 * 86_400_000,
            },
        ];
        let f = fixture_with(config(Some("phone-1")), calls);

        f.manager.start(&HashSet::new()).unwrap();
        f.manager.close();

        let records = f.call_log_sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].hashed_number, hash_number("+31600000001", "phone-1"));
        assert_eq!(records[0].duration, "65");
        assert_eq!(records[0].call_type, 2);
    }

    #[test]
    fn test_equality_by_source_id() {
        let a = fixture_with(config(Some("phone-1")), Vec::new());
        let mut other_config = config(Some("phone-1"));
        other_config.group_id = "study-2".to_string();
        other_config.device_name = "Galaxy".to_string();
        let b = fixture_with(other_config, Vec::new());
        let c = fixture_with(config(Some("phone-2")), Vec::new());

        assert_eq!(a.manager, b.manager);
        assert_ne!(a.manager, c.manager);
    }

    #[test]
    fn test_missing_source_id_is_never_equal_to_another() {
        let a = fixture_with(config(None), Vec::new());
        let b = fixture_with(config(None), Vec::new());

        let same = &a.manager;
        assert_ne!(a.manager, b.manager);
        assert_eq!(a.manager, *same);
    }

    #[test]
    fn test_build_requires_collaborators() {
        let result = DeviceManager::builder(config(Some("phone-1")))
            .sensors(Arc::new(SimulatedSensors::with_all()))
            .build();

        assert!(matches!(
            result,
            Err(DeviceError::MissingCollaborator("battery"))
        ));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let mut bad = config(Some("phone-1"));
        bad.call_log_period_secs = 0;

        let result = DeviceManager::builder(bad).build();
        assert!(matches!(result, Err(DeviceError::InvalidConfig(_))));
    }

    #[test]
    fn test_dropping_started_manager_releases_everything() {
        let mut config = config(Some("phone-1"));
        config.call_log_period_secs = 1;
        let f = fixture_with(config, Vec::new());
        f.manager.start(&HashSet::new()).unwrap();
        assert_eq!(f.sensors.registration_count(), 2);

        drop(f.manager);

        assert_eq!(f.sensors.registration_count(), 0);
        assert!(!f.battery.is_observed());
        assert_eq!(
            f.listener.statuses(),
            vec![
                DeviceStatus::Ready,
                DeviceStatus::Connected,
                DeviceStatus::Disconnected
            ]
        );

        // the worker was joined after its first tick and never ticks again
        let scans = f.call_log.query_count();
        assert_eq!(scans, 1);
        thread::sleep(Duration::from_millis(1_300));
        assert_eq!(f.call_log.query_count(), scans);

        let event = RawSensorEvent::new(SensorKind::Light, 0, vec![10.0]);
        assert!(f.sensors.emit(&event).is_empty());
        assert!(f.sink.enqueued().is_empty());
    }

    #[test]
    fn test_dropping_closed_manager_does_not_notify_again() {
        let f = fixture();
        f.manager.start(&HashSet::new()).unwrap();
        f.manager.close();

        drop(f.manager);

        assert_eq!(f.listener.statuses().len(), 3);
        assert_eq!(f.sensors.unregister_count(), 2);
    }

    #[test]
    fn test_concurrent_start_and_close_are_serialized() {
        let f = fixture();
        let manager = Arc::new(f.manager);
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let manager = Arc::clone(&manager);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    if i % 2 == 0 {
                        let _ = manager.start(&HashSet::new());
                    } else {
                        manager.close();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let statuses = f.listener.statuses();
        let full = vec![
            DeviceStatus::Ready,
            DeviceStatus::Connected,
            DeviceStatus::Disconnected,
        ];
        let closed_first = vec![DeviceStatus::Ready, DeviceStatus::Disconnected];
        assert!(
            statuses == full || statuses == closed_first,
            "unexpected transitions {:?}",
            statuses
        );
        assert_eq!(manager.status(), DeviceStatus::Disconnected);
        assert!(manager.is_closed());
        assert_eq!(f.sensors.registration_count(), 0);
        assert!(!f.battery.is_observed());
    }
}
