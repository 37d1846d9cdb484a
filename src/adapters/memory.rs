//! In-memory collaborators
//!
//! Stand-ins for the platform sensor subsystem, battery broadcast, call-history
//! store and downstream sink. They record what the manager does with them and
//! can be told to fail, which is what the tests and the CLI replay need.

use crate::capability::{
    BatteryMonitor, CallLogCursor, CallLogSink, CallLogStore, MeasurementSink, RegistrationId,
    SensorCapability, SensorEventListener, SensorHandle, StatusListener,
};
use crate::config::SamplingDelay;
use crate::error::DeviceError;
use crate::types::{
    BatterySnapshot, CallLogEntry, CallLogRecord, DeviceIdentity, DeviceStatus, Measurement,
    RawSensorEvent, SensorKind, SeriesKey,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Registration {
    id: RegistrationId,
    kind: SensorKind,
    listener: Arc<dyn SensorEventListener>,
}

/// Simulated sensor subsystem that delivers events on demand
#[derive(Default)]
pub struct SimulatedSensors {
    available: HashSet<SensorKind>,
    registrations: Mutex<Vec<Registration>>,
    next_id: AtomicU64,
    unregistered: AtomicUsize,
}

impl SimulatedSensors {
    /// A device with an accelerometer and a light sensor
    pub fn with_all() -> Self {
        Self::with_kinds(&[SensorKind::Accelerometer, SensorKind::Light])
    }

    pub fn with_kinds(kinds: &[SensorKind]) -> Self {
        Self {
            available: kinds.iter().copied().collect(),
            ..Self::default()
        }
    }

    /// Deliver an event to the listeners registered for its kind
    ///
    /// Events of other kinds go to the first registered listener, the way the
    /// platform reports changes of unrequested sensors to a shared listener.
    /// Returns the result of every delivery.
    pub fn emit(&self, event: &RawSensorEvent) -> Vec<Result<(), DeviceError>> {
        let listeners: Vec<Arc<dyn SensorEventListener>> = {
            let registrations = lock(&self.registrations);
            match event.kind {
                SensorKind::Other(_) => registrations
                    .first()
                    .map(|r| Arc::clone(&r.listener))
                    .into_iter()
                    .collect(),
                kind => registrations
                    .iter()
                    .filter(|r| r.kind == kind)
                    .map(|r| Arc::clone(&r.listener))
                    .collect(),
            }
        };

        listeners
            .iter()
            .map(|listener| listener.on_sensor_changed(event))
            .collect()
    }

    pub fn registration_count(&self) -> usize {
        lock(&self.registrations).len()
    }

    pub fn unregister_count(&self) -> usize {
        self.unregistered.load(Ordering::SeqCst)
    }
}

impl SensorCapability for SimulatedSensors {
    fn default_sensor(&self, kind: SensorKind) -> Option<SensorHandle> {
        self.available
            .contains(&kind)
            .then(|| SensorHandle::new(kind, format!("simulated {}", kind)))
    }

    fn register_listener(
        &self,
        listener: Arc<dyn SensorEventListener>,
        sensor: &SensorHandle,
        _delay: SamplingDelay,
    ) -> Option<RegistrationId> {
        if !self.available.contains(&sensor.kind) {
            return None;
        }
        let id = RegistrationId(self.next_id.fetch_add(1, Ordering::SeqCst));
        lock(&self.registrations).push(Registration {
            id,
            kind: sensor.kind,
            listener,
        });
        Some(id)
    }

    fn unregister_listener(&self, registration: RegistrationId) {
        let mut registrations = lock(&self.registrations);
        let before = registrations.len();
        registrations.retain(|r| r.id != registration);
        if registrations.len() < before {
            self.unregistered.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Battery broadcast with settable extras
#[derive(Debug, Default)]
pub struct MemoryBattery {
    extras: Mutex<Option<(i32, i32)>>,
    observed: AtomicBool,
}

impl MemoryBattery {
    /// `extras` is a (level, scale) pair; `None` means no battery status at all
    pub fn new(extras: Option<(i32, i32)>) -> Self {
        Self {
            extras: Mutex::new(extras),
            observed: AtomicBool::new(false),
        }
    }

    pub fn set_extras(&self, extras: Option<(i32, i32)>) {
        *lock(&self.extras) = extras;
    }

    pub fn is_observed(&self) -> bool {
        self.observed.load(Ordering::SeqCst)
    }
}

impl BatteryMonitor for MemoryBattery {
    fn register_observer(&self) -> bool {
        let available = lock(&self.extras).is_some();
        self.observed.store(available, Ordering::SeqCst);
        available
    }

    fn battery_status(&self) -> Option<BatterySnapshot> {
        lock(&self.extras).map(|(level, scale)| BatterySnapshot::from_extras(level, scale))
    }

    fn unregister_observer(&self) {
        self.observed.store(false, Ordering::SeqCst);
    }
}

/// A measurement accepted by [`MemorySink`]
#[derive(Debug, Clone, PartialEq)]
pub struct SinkRecord {
    pub key: SeriesKey,
    pub identity: DeviceIdentity,
    pub measurement: Measurement,
    /// Timeout hint, present for direct sends
    pub timeout: Option<Duration>,
}

/// Sink that keeps everything it accepts
#[derive(Debug, Default)]
pub struct MemorySink {
    enqueued: Mutex<Vec<SinkRecord>>,
    sent: Mutex<Vec<SinkRecord>>,
    fail_enqueue: AtomicBool,
    fail_send: AtomicBool,
}

impl MemorySink {
    pub fn enqueued(&self) -> Vec<SinkRecord> {
        lock(&self.enqueued).clone()
    }

    pub fn sent(&self) -> Vec<SinkRecord> {
        lock(&self.sent).clone()
    }

    pub fn fail_enqueue(&self, fail: bool) {
        self.fail_enqueue.store(fail, Ordering::SeqCst);
    }

    pub fn fail_send(&self, fail: bool) {
        self.fail_send.store(fail, Ordering::SeqCst);
    }
}

impl MeasurementSink for MemorySink {
    fn enqueue(
        &self,
        key: &SeriesKey,
        identity: &DeviceIdentity,
        measurement: Measurement,
    ) -> Result<(), DeviceError> {
        if self.fail_enqueue.load(Ordering::SeqCst) {
            return Err(DeviceError::Enqueue {
                topic: key.topic.clone(),
                reason: "cache unavailable".to_string(),
            });
        }
        lock(&self.enqueued).push(SinkRecord {
            key: key.clone(),
            identity: identity.clone(),
            measurement,
            timeout: None,
        });
        Ok(())
    }

    fn best_effort_send(
        &self,
        key: &SeriesKey,
        identity: &DeviceIdentity,
        measurement: Measurement,
        timeout: Duration,
    ) -> Result<(), DeviceError> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(DeviceError::SendFailed {
                topic: key.topic.clone(),
                reason: "sender unavailable".to_string(),
            });
        }
        lock(&self.sent).push(SinkRecord {
            key: key.clone(),
            identity: identity.clone(),
            measurement,
            timeout: Some(timeout),
        });
        Ok(())
    }
}

/// Status listener that records every notification
#[derive(Debug, Default)]
pub struct RecordingStatusListener {
    updates: Mutex<Vec<(DeviceIdentity, DeviceStatus)>>,
}

impl RecordingStatusListener {
    pub fn statuses(&self) -> Vec<DeviceStatus> {
        lock(&self.updates).iter().map(|(_, s)| *s).collect()
    }

    pub fn updates(&self) -> Vec<(DeviceIdentity, DeviceStatus)> {
        lock(&self.updates).clone()
    }
}

impl StatusListener for RecordingStatusListener {
    fn device_status_updated(&self, identity: &DeviceIdentity, status: DeviceStatus) {
        lock(&self.updates).push((identity.clone(), status));
    }
}

/// Call-history store over a fixed list of entries
#[derive(Debug, Default)]
pub struct MemoryCallLog {
    /// Oldest first, like the platform's default ordering
    entries: Vec<CallLogEntry>,
    failing_reads: bool,
    queries: AtomicUsize,
    closes: AtomicUsize,
}

impl MemoryCallLog {
    pub fn new(mut entries: Vec<CallLogEntry>) -> Self {
        entries.sort_by_key(|e| e.date_millis);
        Self {
            entries,
            ..Self::default()
        }
    }

    /// Parse a JSON array of entries
    pub fn from_json(json: &str) -> Result<Self, DeviceError> {
        let entries: Vec<CallLogEntry> = serde_json::from_str(json)?;
        Ok(Self::new(entries))
    }

    /// Make every row read fail
    pub fn failing_reads(mut self) -> Self {
        self.failing_reads = true;
        self
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Number of cursor `close` calls so far
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl CallLogStore for MemoryCallLog {
    fn query(&self) -> Result<Box<dyn CallLogCursor + '_>, DeviceError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryCursor {
            log: self,
            position: None,
        }))
    }
}

struct MemoryCursor<'a> {
    log: &'a MemoryCallLog,
    position: Option<usize>,
}

impl CallLogCursor for MemoryCursor<'_> {
    fn move_to_last(&mut self) -> bool {
        self.position = self.log.entries.len().checked_sub(1);
        self.position.is_some()
    }

    fn move_to_previous(&mut self) -> bool {
        match self.position {
            Some(p) if p > 0 => {
                self.position = Some(p - 1);
                true
            }
            _ => {
                self.position = None;
                false
            }
        }
    }

    fn entry(&self) -> Result<CallLogEntry, DeviceError> {
        if self.log.failing_reads {
            return Err(DeviceError::CallLog("row could not be read".to_string()));
        }
        self.position
            .and_then(|p| self.log.entries.get(p))
            .cloned()
            .ok_or_else(|| DeviceError::CallLog("cursor is not on a row".to_string()))
    }

    fn close(&mut self) {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Call-log sink that keeps the records it receives
#[derive(Debug, Default)]
pub struct MemoryCallLogSink {
    records: Mutex<Vec<CallLogRecord>>,
}

impl MemoryCallLogSink {
    pub fn records(&self) -> Vec<CallLogRecord> {
        lock(&self.records).clone()
    }
}

impl CallLogSink for MemoryCallLogSink {
    fn emit(&self, record: &CallLogRecord) {
        lock(&self.records).push(record.clone());
    }
}
