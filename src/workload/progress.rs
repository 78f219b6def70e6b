//! Progress accounting for a running benchmark
//!
//! [`Progress`] is a cheap, cloneable handle. Strategies report bytes as they
//! are written (from any task); every time the running total crosses another
//! `log_percent` of the target size a JSON record is appended to the test's
//! log, and the terminal progress bar, if any, is advanced.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::util::units::calculate_throughput_mbps;
use crate::Result;

/// One line of a test's progress log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressRecord {
    /// Wall-clock time the record was taken
    pub timestamp: DateTime<Utc>,
    /// Value bytes written so far
    pub written: u64,
    /// Target number of value bytes
    pub total: u64,
    /// Milliseconds since the workload started
    pub elapsed_ms: u64,
    /// Average throughput since start in MiB/s
    pub throughput_mbps: f64,
    /// Set on the record written when the workload ends
    #[serde(default)]
    pub done: bool,
}

struct Inner {
    total: u64,
    log_step: u64,
    written: AtomicU64,
    reports: AtomicU64,
    next_log: AtomicU64,
    started: Mutex<Instant>,
    log: Mutex<Box<dyn Write + Send>>,
    bar: Option<ProgressBar>,
}

/// Shared byte counter and progress log of one benchmark run
#[derive(Clone)]
pub struct Progress {
    inner: Arc<Inner>,
}

impl Progress {
    /// Create a progress tracker for `total` bytes that logs every
    /// `log_percent` percent.
    pub fn new(total: u64, log_percent: u8, log: Box<dyn Write + Send>) -> Self {
        let log_step = (total.saturating_mul(log_percent.max(1) as u64) / 100).max(1);
        Self {
            inner: Arc::new(Inner {
                total,
                log_step,
                written: AtomicU64::new(0),
                reports: AtomicU64::new(0),
                next_log: AtomicU64::new(log_step),
                started: Mutex::new(Instant::now()),
                log: Mutex::new(log),
                bar: None,
            }),
        }
    }

    /// Progress tracker that discards its records
    pub fn sink(total: u64) -> Self {
        Self::new(total, 100, Box::new(std::io::sink()))
    }

    /// Attach a terminal progress bar. Must be called before the handle is
    /// cloned.
    pub fn with_bar(mut self, bar: ProgressBar) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            bar.set_length(inner.total);
            inner.bar = Some(bar);
        }
        self
    }

    /// Reset the clock; called when the workload starts producing items.
    pub fn start(&self) {
        *self.lock_started() = Instant::now();
    }

    /// Record `bytes` value bytes as durably handed to the engine.
    pub fn add(&self, bytes: usize) {
        let bytes = bytes as u64;
        let written = self.inner.written.fetch_add(bytes, Ordering::SeqCst) + bytes;
        self.inner.reports.fetch_add(1, Ordering::SeqCst);

        if let Some(bar) = &self.inner.bar {
            bar.set_position(written);
        }

        let mut next = self.inner.next_log.load(Ordering::SeqCst);
        while written >= next {
            let advanced = next + self.inner.log_step * ((written - next) / self.inner.log_step + 1);
            match self.inner.next_log.compare_exchange(
                next,
                advanced,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => {
                    if let Err(e) = self.write_record(written, false) {
                        warn!("dropping progress record: {}", e);
                    }
                    break;
                }
                Err(current) => next = current,
            }
        }
    }

    /// Value bytes reported so far
    pub fn written(&self) -> u64 {
        self.inner.written.load(Ordering::SeqCst)
    }

    /// Number of `add` calls so far
    pub fn reports(&self) -> u64 {
        self.inner.reports.load(Ordering::SeqCst)
    }

    pub fn elapsed(&self) -> Duration {
        self.lock_started().elapsed()
    }

    /// Write the closing record and finish the progress bar.
    pub fn finish(&self) -> Result<()> {
        if let Some(bar) = &self.inner.bar {
            bar.finish();
        }
        self.write_record(self.written(), true)
    }

    /// Build a snapshot record without logging it
    pub fn snapshot(&self, done: bool) -> ProgressRecord {
        let elapsed = self.elapsed();
        let written = self.written();
        ProgressRecord {
            timestamp: Utc::now(),
            written,
            total: self.inner.total,
            elapsed_ms: elapsed.as_millis() as u64,
            throughput_mbps: calculate_throughput_mbps(written, elapsed),
            done,
        }
    }

    fn write_record(&self, written: u64, done: bool) -> Result<()> {
        let mut record = self.snapshot(done);
        record.written = written;
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        // only the reporter that advanced `next_log` gets here, once per log
        // step; the runner hands in a `BufWriter` so the lock covers a copy
        let mut log = self
            .inner
            .log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        log.write_all(&line)?;
        if done {
            log.flush()?;
        }
        Ok(())
    }

    fn lock_started(&self) -> std::sync::MutexGuard<'_, Instant> {
        self.inner
            .started
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress")
            .field("total", &self.inner.total)
            .field("written", &self.written())
            .field("reports", &self.reports())
            .finish()
    }
}
