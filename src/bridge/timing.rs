// SPDX-License-Identifier: GPL-3.0-only

//! Per-frame delivery timing

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use tracing::info;

/// Wall-clock span of one delivered frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingSample {
    /// Taken before the thread attach and buffer write
    pub start: DateTime<Utc>,
    /// Taken after the handler returned
    pub end: DateTime<Utc>,
}

impl TimingSample {
    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }
}

impl fmt::Display for TimingSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "callback: start={}.{:09} end={}.{:09}",
            self.start.timestamp(),
            self.start.timestamp_subsec_nanos(),
            self.end.timestamp(),
            self.end.timestamp_subsec_nanos()
        )
    }
}

/// Collects timing samples for one capture run
///
/// Enabled at capture start and drained at capture stop. Samples arrive from
/// driver threads in completion order.
#[derive(Debug, Default)]
pub struct TimingRecorder {
    enabled: AtomicBool,
    log: Mutex<Vec<TimingSample>>,
}

impl TimingRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enabling starts a fresh log
    pub fn set_enabled(&self, enabled: bool) {
        if enabled {
            self.lock().clear();
        }
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Start timestamp for a frame, `None` while disabled
    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.is_enabled().then(Utc::now)
    }

    pub fn record(&self, start: DateTime<Utc>, end: DateTime<Utc>) {
        if self.is_enabled() {
            self.lock().push(TimingSample { start, end });
        }
    }

    /// Samples recorded so far
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take the log in order of start time and emit each sample
    pub fn drain(&self) -> Vec<TimingSample> {
        let mut samples = std::mem::take(&mut *self.lock());
        samples.sort_by_key(|sample| sample.start);
        for sample in &samples {
            info!("{}", sample);
        }
        samples
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<TimingSample>> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
