//! Latest device state cell
//!
//! Sensor callbacks for different sensor kinds may run on different threads,
//! so every write and every snapshot goes through one mutex.

use crate::types::{DeviceIdentity, DeviceStateSnapshot, DeviceStatus, LatestDeviceState};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Synchronized holder of the last known readings and status
#[derive(Debug)]
pub struct DeviceStateCell {
    identity: DeviceIdentity,
    latest: Mutex<LatestDeviceState>,
}

impl DeviceStateCell {
    pub fn new(identity: DeviceIdentity) -> Self {
        Self {
            identity,
            latest: Mutex::new(LatestDeviceState::default()),
        }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    fn lock(&self) -> MutexGuard<'_, LatestDeviceState> {
        // The state is plain data, a panicked writer cannot leave it half-built.
        self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a new acceleration vector and return the stored value
    pub fn set_acceleration(&self, x: f32, y: f32, z: f32) -> [f32; 3] {
        let mut latest = self.lock();
        latest.acceleration = Some([x, y, z]);
        [x, y, z]
    }

    /// Store a new light value and return the stored value
    pub fn set_light(&self, lux: f32) -> f32 {
        let mut latest = self.lock();
        latest.light = Some(lux);
        lux
    }

    pub fn set_battery_level(&self, fraction: f32) {
        self.lock().battery_level = Some(fraction);
    }

    pub fn set_status(&self, status: DeviceStatus) {
        self.lock().status = status;
    }

    pub fn status(&self) -> DeviceStatus {
        self.lock().status
    }

    pub fn latest(&self) -> LatestDeviceState {
        *self.lock()
    }

    pub fn snapshot(&self) -> DeviceStateSnapshot {
        DeviceStateSnapshot {
            identity: self.identity.clone(),
            latest: self.latest(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_snapshot_reflects_writes() {
        let cell = DeviceStateCell::new(DeviceIdentity::new("g", Some("s".to_string())));
        cell.set_acceleration(0.1, 0.2, 1.0);
        cell.set_light(42.0);
        cell.set_status(DeviceStatus::Connected);

        let snapshot = cell.snapshot();
        assert_eq!(snapshot.identity.source_id.as_deref(), Some("s"));
        assert_eq!(snapshot.latest.acceleration, Some([0.1, 0.2, 1.0]));
        assert_eq!(snapshot.latest.light, Some(42.0));
        assert_eq!(snapshot.latest.battery_level, None);
        assert_eq!(snapshot.latest.status, DeviceStatus::Connected);
    }

    #[test]
    fn test_concurrent_writers_keep_vectors_whole() {
        let cell = Arc::new(DeviceStateCell::new(DeviceIdentity::new("g", None)));

        let writers: Vec<_> = (0..4)
            .map(|i| {
                let cell = Arc::clone(&cell);
                thread::spawn(move || {
                    for _ in 0..500 {
                        let v = i as f32;
                        cell.set_acceleration(v, v, v);
                        cell.set_light(v);
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let [x, y, z] = cell.latest().acceleration.unwrap();
        assert_eq!(x, y);
        assert_eq!(y, z);
    }
}
