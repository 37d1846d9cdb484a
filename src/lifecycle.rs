//! Device lifecycle
//!
//! Ready → Connected → Disconnected, once per instance. Every transition and
//! its listener notification happen under the session lock, so concurrent
//! `start`/`close` calls are serialized.

use crate::call_log::CallLogScanner;
use crate::capability::{
    BatteryMonitor, RegistrationId, SensorCapability, SensorEventListener, StatusListener,
};
use crate::config::SamplingDelay;
use crate::error::DeviceError;
use crate::schedule::RepeatingTask;
use crate::state::DeviceStateCell;
use crate::types::{DeviceStatus, SensorKind};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Capabilities acquired by a successful start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StartReport {
    pub accelerometer: bool,
    pub light: bool,
    pub battery: bool,
    pub call_log: bool,
}

/// Collaborators the lifecycle acquires and releases
pub struct LifecycleResources {
    pub sensors: Arc<dyn SensorCapability>,
    pub battery: Arc<dyn BatteryMonitor>,
    pub event_listener: Arc<dyn SensorEventListener>,
    pub scanner: Arc<CallLogScanner>,
    pub scan_period: Duration,
    pub sampling_delay: SamplingDelay,
}

#[derive(Default)]
struct Session {
    registered: bool,
    registrations: Vec<RegistrationId>,
    battery_observed: bool,
    scan_task: Option<RepeatingTask>,
}

/// State machine governing registration and status notification
pub struct DeviceLifecycle {
    state: Arc<DeviceStateCell>,
    listener: Arc<dyn StatusListener>,
    resources: LifecycleResources,
    session: Mutex<Session>,
}

impl DeviceLifecycle {
    /// Create a lifecycle in the Ready state and announce it
    pub fn new(
        state: Arc<DeviceStateCell>,
        listener: Arc<dyn StatusListener>,
        resources: LifecycleResources,
    ) -> Self {
        let lifecycle = Self {
            state,
            listener,
            resources,
            session: Mutex::new(Session::default()),
        };
        {
            let _session = lifecycle.lock();
            lifecycle.state.set_status(DeviceStatus::Ready);
            lifecycle
                .listener
                .device_status_updated(lifecycle.state.identity(), DeviceStatus::Ready);
        }
        lifecycle
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> DeviceStatus {
        self.state.status()
    }

    /// Acquire sensors, battery observer and call-log schedule, then connect
    ///
    /// Only valid from Ready. A closed instance cannot be restarted; create a
    /// new one instead.
    pub fn start(
        &self,
        acceptable_source_ids: &HashSet<String>,
    ) -> Result<StartReport, DeviceError> {
        let mut session = self.lock();

        let current = self.state.status();
        if current != DeviceStatus::Ready {
            return Err(DeviceError::InvalidTransition {
                from: current,
                to: DeviceStatus::Connected,
            });
        }

        debug!(
            acceptable = acceptable_source_ids.len(),
            "Acceptable source ids do not apply to on-board phone sensors"
        );

        let accelerometer = self.register_sensor(&mut session, SensorKind::Accelerometer);
        let light = self.register_sensor(&mut session, SensorKind::Light);

        let battery = self.resources.battery.register_observer();
        if !battery {
            warn!("Phone battery status not available");
        }
        session.battery_observed = battery;

        session.scan_task = self.schedule_call_log();
        let call_log = session.scan_task.is_some();

        session.registered = true;
        self.advance(DeviceStatus::Connected)?;

        let report = StartReport {
            accelerometer,
            light,
            battery,
            call_log,
        };
        info!(?report, "Phone sensors started");
        Ok(report)
    }

    fn register_sensor(&self, session: &mut Session, kind: SensorKind) -> bool {
        let Some(sensor) = self.resources.sensors.default_sensor(kind) else {
            warn!(%kind, "Phone sensor not found");
            return false;
        };

        match self.resources.sensors.register_listener(
            Arc::clone(&self.resources.event_listener),
            &sensor,
            self.resources.sampling_delay,
        ) {
            Some(registration) => {
                debug!(%kind, sensor = %sensor.name, "Registered sensor listener");
                session.registrations.push(registration);
                true
            }
            None => {
                warn!(%kind, sensor = %sensor.name, "Sensor listener registration refused");
                false
            }
        }
    }

    fn schedule_call_log(&self) -> Option<RepeatingTask> {
        let scanner = Arc::clone(&self.resources.scanner);
        let name = format!(
            "call-log-{}",
            self.state.identity().source_id.as_deref().unwrap_or("unknown")
        );

        let spawned = RepeatingTask::spawn(name, self.resources.scan_period, move || {
            match scanner.scan() {
                Ok(summary) => debug!(emitted = summary.emitted, "Call log tick"),
                Err(e) => warn!(error = %e, "Call log scan failed"),
            }
        });

        match spawned {
            Ok(task) => Some(task),
            Err(e) => {
                warn!(error = %e, "Could not start call log scanner");
                None
            }
        }
    }

    /// Release everything acquired by `start` and disconnect; repeated calls are no-ops
    pub fn close(&self) {
        let mut session = self.lock();

        if self.state.status() == DeviceStatus::Disconnected {
            debug!("Phone sensors already closed");
            return;
        }

        for registration in session.registrations.drain(..) {
            self.resources.sensors.unregister_listener(registration);
        }
        if std::mem::take(&mut session.battery_observed) {
            self.resources.battery.unregister_observer();
        }
        if let Some(task) = session.scan_task.take() {
            task.stop();
        }

        session.registered = false;
        if let Err(e) = self.advance(DeviceStatus::Disconnected) {
            warn!(error = %e, "Unexpected status on close");
        }
        info!("Phone sensors closed");
    }

    pub fn is_closed(&self) -> bool {
        !self.lock().registered
    }

    /// Move forward to `next` and notify; callers hold the session lock
    fn advance(&self, next: DeviceStatus) -> Result<(), DeviceError> {
        let current = self.state.status();
        if !current.can_advance_to(next) {
            return Err(DeviceError::InvalidTransition {
                from: current,
                to: next,
            });
        }
        self.state.set_status(next);
        self.listener.device_status_updated(self.state.identity(), next);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        MemoryBattery, MemoryCallLog, MemoryCallLogSink, RecordingStatusListener, SimulatedSensors,
    };
    use crate::clock::ManualClock;
    use crate::types::{DeviceIdentity, RawSensorEvent};
    use pretty_assertions::assert_eq;

    struct NullListener;

    impl SensorEventListener for NullListener {
        fn on_sensor_changed(&self, _event: &RawSensorEvent) -> Result<(), DeviceError> {
            Ok(())
        }
    }

    struct Fixture {
        sensors: Arc<SimulatedSensors>,
        battery: Arc<MemoryBattery>,
        listener: Arc<RecordingStatusListener>,
        call_log: Arc<MemoryCallLog>,
        lifecycle: DeviceLifecycle,
    }

    fn fixture(sensors: SimulatedSensors) -> Fixture {
        let sensors = Arc::new(sensors);
        let battery = Arc::new(MemoryBattery::new(Some((80, 100))));
        let listener = Arc::new(RecordingStatusListener::default());
        let call_log = Arc::new(MemoryCallLog::new(Vec::new()));
        let state = Arc::new(DeviceStateCell::new(DeviceIdentity::new(
            "group",
            Some("source".to_string()),
        )));
        let scanner = Arc::new(CallLogScanner::new(
            call_log.clone(),
            Arc::new(MemoryCallLogSink::default()),
            Arc::new(ManualClock::new(0)),
            "source",
            Duration::from_secs(3600),
        ));

        let lifecycle = DeviceLifecycle::new(
            state,
            listener.clone(),
            LifecycleResources {
                sensors: sensors.clone(),
                battery: battery.clone(),
                event_listener: Arc::new(NullListener),
                scanner,
                scan_period: Duration::from_secs(3600),
                sampling_delay: SamplingDelay::Normal,
            },
        );

        Fixture {
            sensors,
            battery,
            listener,
            call_log,
            lifecycle,
        }
    }

    #[test]
    fn test_full_session_transitions_in_order() {
        let f = fixture(SimulatedSensors::with_all());
        assert_eq!(f.lifecycle.status(), DeviceStatus::Ready);
        assert!(f.lifecycle.is_closed());

        let report = f.lifecycle.start(&HashSet::new()).unwrap();
        assert_eq!(
            report,
            StartReport {
                accelerometer: true,
                light: true,
                battery: true,
                call_log: true,
            }
        );
        assert!(!f.lifecycle.is_closed());
        assert_eq!(f.sensors.registration_count(), 2);
        assert!(f.battery.is_observed());

        f.lifecycle.close();
        assert!(f.lifecycle.is_closed());
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
    }

    #[test]
    fn test_missing_sensors_do_not_abort_start() {
        let f = fixture(SimulatedSensors::with_kinds(&[SensorKind::Light]));

        let report = f.lifecycle.start(&HashSet::new()).unwrap();

        assert!(!report.accelerometer);
        assert!(report.light);
        assert_eq!(f.lifecycle.status(), DeviceStatus::Connected);
        assert_eq!(f.sensors.registration_count(), 1);
    }

    #[test]
    fn test_close_is_idempotent() {
        let f = fixture(SimulatedSensors::with_all());
        f.lifecycle.start(&HashSet::new()).unwrap();

        f.lifecycle.close();
        f.lifecycle.close();

        assert_eq!(f.listener.statuses().len(), 3);
        assert_eq!(f.sensors.unregister_count(), 2);
    }

    #[test]
    fn test_restart_after_close_is_rejected() {
        let f = fixture(SimulatedSensors::with_all());
        f.lifecycle.start(&HashSet::new()).unwrap();
        f.lifecycle.close();

        let result = f.lifecycle.start(&HashSet::new());

        assert!(matches!(
            result,
            Err(DeviceError::InvalidTransition {
                from: DeviceStatus::Disconnected,
                to: DeviceStatus::Connected
            })
        ));
        assert!(f.lifecycle.is_closed());
        assert_eq!(f.sensors.registration_count(), 0);
        assert_eq!(f.listener.statuses().last(), Some(&DeviceStatus::Disconnected));
    }

    #[test]
    fn test_second_start_is_rejected() {
        let f = fixture(SimulatedSensors::with_all());
        f.lifecycle.start(&HashSet::new()).unwrap();

        assert!(f.lifecycle.start(&HashSet::new()).is_err());
        assert_eq!(f.sensors.registration_count(), 2);
        f.lifecycle.close();
    }

    #[test]
    fn test_close_before_start_disconnects() {
        let f = fixture(SimulatedSensors::with_all());

        f.lifecycle.close();

        assert_eq!(
            f.listener.statuses(),
            vec![DeviceStatus::Ready, DeviceStatus::Disconnected]
        );
        assert!(f.lifecycle.start(&HashSet::new()).is_err());
    }

    #[test]
    fn test_start_runs_first_call_log_scan() {
        let f = fixture(SimulatedSensors::with_all());
        f.lifecycle.start(&HashSet::new()).unwrap();

        // close joins the worker, so the immediate first tick has run
        f.lifecycle.close();
        assert_eq!(f.call_log.query_count(), 1);
        assert_eq!(f.call_log.close_count(), 1);
    }
}
