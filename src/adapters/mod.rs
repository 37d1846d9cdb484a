//! Collaborator adapters
//!
//! Concrete implementations of the [`crate::capability`] traits that live in
//! this crate: in-memory stand-ins for the platform and an NDJSON sink.

pub mod memory;
pub mod ndjson;

pub use memory::{
    MemoryBattery, MemoryCallLog, MemoryCallLogSink, MemorySink, RecordingStatusListener,
    SimulatedSensors, SinkRecord,
};
pub use ndjson::{MeasurementEnvelope, NdjsonSink, Producer};
