//! Call-log scanning
//!
//! Walks the call-history store from the newest entry backward while entries
//! are inside the lookback window, and emits each one with its number replaced
//! by `hex(sha256(number + salt))`.

use crate::capability::{CallLogCursor, CallLogSink, CallLogStore};
use crate::clock::Clock;
use crate::error::DeviceError;
use crate::types::CallLogRecord;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Hash a phone number with a salt
pub fn hash_number(number: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(number.as_bytes());
    hasher.update(salt.as_bytes());
    hex::encode(hasher.finalize())
}

/// Why a scan stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The store had no entries
    Empty,
    /// The next entry was older than the lookback window
    WindowBoundary,
    /// Every entry was inside the window
    Exhausted,
}

/// Outcome of one scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSummary {
    pub emitted: usize,
    pub stopped: StopReason,
}

/// Cursor that is closed exactly once, on every exit path
struct ScopedCursor<'a> {
    cursor: Box<dyn CallLogCursor + 'a>,
}

impl<'a> ScopedCursor<'a> {
    fn new(cursor: Box<dyn CallLogCursor + 'a>) -> Self {
        Self { cursor }
    }
}

impl<'a> std::ops::Deref for ScopedCursor<'a> {
    type Target = dyn CallLogCursor + 'a;

    fn deref(&self) -> &Self::Target {
        self.cursor.as_ref()
    }
}

impl<'a> std::ops::DerefMut for ScopedCursor<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.cursor.as_mut()
    }
}

impl Drop for ScopedCursor<'_> {
    fn drop(&mut self) {
        self.cursor.close();
    }
}

/// Scanner over the call-history store of one device
pub struct CallLogScanner {
    store: Arc<dyn CallLogStore>,
    sink: Arc<dyn CallLogSink>,
    clock: Arc<dyn Clock>,
    salt: String,
    lookback: Duration,
}

impl CallLogScanner {
    pub fn new(
        store: Arc<dyn CallLogStore>,
        sink: Arc<dyn CallLogSink>,
        clock: Arc<dyn Clock>,
        salt: impl Into<String>,
        lookback: Duration,
    ) -> Self {
        Self {
            store,
            sink,
            clock,
            salt: salt.into(),
            lookback,
        }
    }

    pub fn lookback(&self) -> Duration {
        self.lookback
    }

    /// Run one scan
    pub fn scan(&self) -> Result<ScanSummary, DeviceError> {
        let mut cursor = ScopedCursor::new(self.store.query()?);

        if !cursor.move_to_last() {
            debug!("Call log is empty");
            return Ok(ScanSummary {
                emitted: 0,
                stopped: StopReason::Empty,
            });
        }

        let now = self.clock.now_millis();
        let lookback_ms = i64::try_from(self.lookback.as_millis()).unwrap_or(i64::MAX);
        let mut emitted = 0;

        let stopped = loop {
            let entry = cursor.entry()?;
            if now.saturating_sub(entry.date_millis) > lookback_ms {
                break StopReason::WindowBoundary;
            }

            let record = CallLogRecord {
                hashed_number: hash_number(&entry.number, &self.salt),
                duration: entry.duration,
                call_type: entry.call_type,
                call_timestamp: entry.date_millis,
                scan_time: now,
            };
            self.sink.emit(&record);
            emitted += 1;

            if !cursor.move_to_previous() {
                break StopReason::Exhausted;
            }
        };

        debug!(emitted, ?stopped, "Call log scan finished");
        Ok(ScanSummary { emitted, stopped })
    }
}

/// Call-log sink writing one structured log event per record
#[derive(Debug, Default)]
pub struct TracingCallLogSink;

impl CallLogSink for TracingCallLogSink {
    fn emit(&self, record: &CallLogRecord) {
        info!(
            hashed_number = %record.hashed_number,
            duration = %record.duration,
            call_type = record.call_type,
            call_timestamp = record.call_timestamp,
            scan_time = record.scan_time,
            "Call log record"
        );
    }
}
