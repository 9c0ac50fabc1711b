// SPDX-License-Identifier: GPL-3.0-only
//! Thread lifecycle management for driver-side frame loops
//!
//! Drivers deliver frames from threads they own. This module gives the
//! simulated driver (and any other in-process frame source) a named thread
//! that runs one closure per frame until it is told to stop.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Action returned by the loop closure to control loop behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Run another iteration
    Continue,
    /// Leave the loop; the thread exits
    Stop,
}

/// Controller for a frame loop running on its own thread
///
/// # Example
///
/// ```ignore
/// let controller = CaptureLoopController::start("depth-source", |stop| {
///     emit_frame();
///     sleep_unless_stopped(stop, frame_interval);
///     LoopAction::Continue
/// })?;
///
/// controller.stop();
/// ```
pub struct CaptureLoopController {
    thread_handle: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    name: String,
}

impl CaptureLoopController {
    /// Spawn a thread named `name` that calls `loop_fn` until it returns
    /// [`LoopAction::Stop`] or [`stop`](Self::stop) is called.
    ///
    /// The closure receives the stop flag so it can cut long waits short.
    pub fn start<F>(name: &str, mut loop_fn: F) -> io::Result<Self>
    where
        F: FnMut(&AtomicBool) -> LoopAction + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop_signal);
        let thread_name = name.to_string();

        info!(name = %name, "Starting frame loop");

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                debug!(name = %thread_name, "Frame loop thread started");

                while !thread_stop.load(Ordering::SeqCst) {
                    if loop_fn(&thread_stop) == LoopAction::Stop {
                        debug!(name = %thread_name, "Loop requested stop");
                        break;
                    }
                }

                info!(name = %thread_name, "Frame loop thread exiting");
            })?;

        Ok(Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            name: name.to_string(),
        })
    }

    /// Check if the loop thread is still alive
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Signal the loop to stop without waiting for it
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting frame loop stop");
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Signal the loop to stop and wait for the thread to finish
    pub fn stop(&mut self) {
        self.request_stop();
        self.join();
    }

    /// Wait for the thread to finish without sending the stop signal
    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            // Joining ourselves would deadlock; the loop exits on its own.
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if let Err(e) = handle.join() {
                warn!(name = %self.name, "Frame loop thread panicked: {:?}", e);
            } else {
                debug!(name = %self.name, "Frame loop thread finished");
            }
        }
    }
}

impl Drop for CaptureLoopController {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "CaptureLoopController dropped, stopping loop");
            self.stop();
        }
    }
}

/// Sleep for `duration`, waking early once `stop` is set
///
/// Returns `false` if the sleep was cut short.
pub fn sleep_unless_stopped(stop: &AtomicBool, duration: Duration) -> bool {
    const SLICE: Duration = Duration::from_millis(5);

    let deadline = Instant::now() + duration;
    loop {
        if stop.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep(SLICE.min(deadline - now));
    }
}
