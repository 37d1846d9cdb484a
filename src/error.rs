//! Error types for the phone sensor manager

use crate::types::DeviceStatus;
use thiserror::Error;

/// Errors that can occur while managing a device
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: DeviceStatus,
        to: DeviceStatus,
    },

    #[error("Malformed sensor event: {0}")]
    MalformedEvent(String),

    #[error("Missing collaborator: {0}")]
    MissingCollaborator(&'static str),

    #[error("Failed to enqueue measurement on {topic}: {reason}")]
    Enqueue { topic: String, reason: String },

    #[error("Failed to send measurement on {topic}: {reason}")]
    SendFailed { topic: String, reason: String },

    #[error("Call log error: {0}")]
    CallLog(String),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
