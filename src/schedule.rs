//! Cancellable repeating background task
//!
//! One dedicated thread runs the task immediately and then once per period.
//! Ticks never overlap: when a tick overruns, the ticks it missed are skipped
//! and the schedule resumes at the next period boundary.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Handle to a running repeating task
#[derive(Debug)]
pub struct RepeatingTask {
    name: String,
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl RepeatingTask {
    /// Spawn `tick` on a new thread, first run immediately
    pub fn spawn<F>(
        name: impl Into<String>,
        period: Duration,
        mut tick: F,
    ) -> std::io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let name = name.into();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            let started = Instant::now();
            let mut next_tick = started;

            loop {
                tick();

                let now = Instant::now();
                next_tick += period;
                if next_tick <= now {
                    let missed =
                        now.duration_since(next_tick).as_nanos() / period.as_nanos().max(1);
                    let skip = u32::try_from(missed + 1).unwrap_or(u32::MAX);
                    next_tick += period.saturating_mul(skip);
                    warn!(skipped = skip, "Scheduled task overran its period");
                }

                match stop_rx.recv_timeout(next_tick.saturating_duration_since(now)) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        })?;

        debug!(task = %name, ?period, "Scheduled repeating task");
        Ok(Self {
            name,
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop scheduling and wait for an in-flight tick to finish
    pub fn stop(mut self) {
        self.signal_stop();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!(task = %self.name, "Scheduled task panicked");
            }
        }
    }

    fn signal_stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            // The worker may already have exited; nothing to signal then.
            let _ = stop.send(());
        }
    }
}

impl Drop for RepeatingTask {
    fn drop(&mut self) {
        self.signal_stop();
    }
}
