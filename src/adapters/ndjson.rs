//! NDJSON measurement sink
//!
//! Writes one JSON envelope per measurement to any `Write`. Queued and direct
//! measurements end up in the same stream; a direct send never waits for a
//! writer that is busy with another line.

use crate::capability::MeasurementSink;
use crate::error::DeviceError;
use crate::types::{DeviceIdentity, Measurement, Series, SeriesKey};
use crate::{PRODUCER_NAME, VERSION};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::{Mutex, PoisonError, TryLockError};
use std::time::Duration;
use uuid::Uuid;

/// Producer metadata stamped on every envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Producer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// One measurement line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementEnvelope {
    pub producer: Producer,
    pub topic: String,
    pub series: Series,
    pub key: DeviceIdentity,
    pub value: Measurement,
}

/// Sink writing NDJSON envelopes
pub struct NdjsonSink<W: Write + Send> {
    writer: Mutex<W>,
    producer: Producer,
}

impl<W: Write + Send> NdjsonSink<W> {
    /// Create a sink with a unique instance ID
    pub fn new(writer: W) -> Self {
        Self::with_instance_id(writer, Uuid::new_v4().to_string())
    }

    /// Create a sink with a specific instance ID
    pub fn with_instance_id(writer: W, instance_id: String) -> Self {
        Self {
            writer: Mutex::new(writer),
            producer: Producer {
                name: PRODUCER_NAME.to_string(),
                version: VERSION.to_string(),
                instance_id,
            },
        }
    }

    pub fn producer(&self) -> &Producer {
        &self.producer
    }

    pub fn flush(&self) -> Result<(), DeviceError> {
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn encode(
        &self,
        key: &SeriesKey,
        identity: &DeviceIdentity,
        measurement: Measurement,
    ) -> Result<String, DeviceError> {
        let envelope = MeasurementEnvelope {
            producer: self.producer.clone(),
            topic: key.topic.clone(),
            series: key.series,
            key: identity.clone(),
            value: measurement,
        };
        Ok(serde_json::to_string(&envelope)?)
    }
}

impl<W: Write + Send> MeasurementSink for NdjsonSink<W> {
    fn enqueue(
        &self,
        key: &SeriesKey,
        identity: &DeviceIdentity,
        measurement: Measurement,
    ) -> Result<(), DeviceError> {
        let line = self.encode(key, identity, measurement)?;
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(writer, "{}", line).map_err(|e| DeviceError::Enqueue {
            topic: key.topic.clone(),
            reason: e.to_string(),
        })
    }

    fn best_effort_send(
        &self,
        key: &SeriesKey,
        identity: &DeviceIdentity,
        measurement: Measurement,
        _timeout: Duration,
    ) -> Result<(), DeviceError> {
        let line = self.encode(key, identity, measurement)?;
        let mut writer = match self.writer.try_lock() {
            Ok(writer) => writer,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                return Err(DeviceError::SendFailed {
                    topic: key.topic.clone(),
                    reason: "writer busy".to_string(),
                })
            }
        };
        writeln!(writer, "{}", line).map_err(|e| DeviceError::SendFailed {
            topic: key.topic.clone(),
            reason: e.to_string(),
        })
    }
}
