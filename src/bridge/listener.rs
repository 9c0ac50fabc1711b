// SPDX-License-Identifier: GPL-3.0-only

//! Driver listener tying the delivery path together

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error};

use super::dispatcher::{DispatchOutcome, Dispatcher};
use super::frame_buffer::{FrameBuffer, OverflowPolicy};
use super::handoff::{FrameHandoff, HandoffStatus};
use super::thread_binding::ThreadBinding;
use super::timing::TimingRecorder;
use crate::backends::driver::{DepthData, DepthDataListener, DepthPoint};
use crate::backends::host::{BufferView, FrameDelivery};
use crate::errors::BridgeResult;

/// Delivery counters of a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryStats {
    /// Frames the handler accepted
    pub delivered: u64,
    /// Frames dropped because the thread could not attach
    pub attach_failures: u64,
    /// Frames the handler failed on
    pub handler_failures: u64,
    /// Frames dropped for exceeding the buffer
    pub overflow_rejects: u64,
    /// Frames published with points cut off
    pub truncated_frames: u64,
    /// Frames dropped because the handoff pool was exhausted
    pub backpressure_drops: u64,
}

#[derive(Debug, Default)]
pub(crate) struct DeliveryCounters {
    delivered: AtomicU64,
    attach_failures: AtomicU64,
    handler_failures: AtomicU64,
    overflow_rejects: AtomicU64,
    truncated_frames: AtomicU64,
    backpressure_drops: AtomicU64,
}

impl DeliveryCounters {
    pub(crate) fn snapshot(&self) -> DeliveryStats {
        DeliveryStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            attach_failures: self.attach_failures.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            overflow_rejects: self.overflow_rejects.load(Ordering::Relaxed),
            truncated_frames: self.truncated_frames.load(Ordering::Relaxed),
            backpressure_drops: self.backpressure_drops.load(Ordering::Relaxed),
        }
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Attach, write, invoke and time one frame
pub(crate) struct DeliveryPath {
    pub(crate) binding: ThreadBinding,
    pub(crate) buffer: Mutex<FrameBuffer>,
    pub(crate) view: BufferView,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) policy: OverflowPolicy,
    pub(crate) timing: Arc<TimingRecorder>,
    pub(crate) counters: Arc<DeliveryCounters>,
    pub(crate) sequence: AtomicU64,
}

impl DeliveryPath {
    /// Returns whether the handler accepted the frame
    fn deliver(&self, points: &[DepthPoint]) -> bool {
        let start = self.timing.start();

        let Some(handle) = self.binding.attach() else {
            bump(&self.counters.attach_failures);
            return false;
        };

        // Held until the handler returns so it never reads a half-written frame
        let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        let written = match buffer.write(points, self.policy) {
            Ok(outcome) => {
                if outcome.truncated > 0 {
                    bump(&self.counters.truncated_frames);
                }
                outcome.written
            }
            Err(_) => {
                bump(&self.counters.overflow_rejects);
                return false;
            }
        };

        let delivery = FrameDelivery {
            view: self.view,
            data: buffer.as_bytes(),
            point_count: written,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
        };
        let outcome = self.dispatcher.invoke(handle, &delivery);
        let end = Utc::now();
        drop(buffer);

        match outcome {
            DispatchOutcome::Delivered => {
                bump(&self.counters.delivered);
                if let Some(start) = start {
                    self.timing.record(start, end);
                }
                true
            }
            DispatchOutcome::Failed(_) => {
                bump(&self.counters.handler_failures);
                false
            }
        }
    }
}

/// Listener registered with the depth device
///
/// Synchronous listeners deliver on the calling driver thread. Queued
/// listeners copy the frame into the handoff and return.
pub struct FrameListener {
    path: Arc<DeliveryPath>,
    handoff: Option<FrameHandoff>,
}

impl FrameListener {
    pub(crate) fn synchronous(path: DeliveryPath) -> Self {
        Self {
            path: Arc::new(path),
            handoff: None,
        }
    }

    pub(crate) fn queued(path: DeliveryPath, depth: usize) -> BridgeResult<Self> {
        let path = Arc::new(path);
        let max_points = path
            .buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .capacity();
        let sink = Arc::clone(&path);
        let handoff = FrameHandoff::spawn(depth, max_points, move |points| {
            sink.deliver(points);
        })
        .inspect_err(|e| error!(error = %e, "Failed to spawn dispatch thread"))?;

        Ok(Self {
            path,
            handoff: Some(handoff),
        })
    }

    /// Let queued frames drain and stop the dispatch thread
    pub fn shutdown(&self) {
        if let Some(handoff) = &self.handoff {
            handoff.shutdown();
        }
    }
}

impl DepthDataListener for FrameListener {
    fn on_new_data(&self, data: &DepthData) {
        match &self.handoff {
            None => {
                self.path.deliver(&data.points);
            }
            Some(handoff) => {
                if handoff.submit(&data.points) == HandoffStatus::Dropped {
                    bump(&self.path.counters.backpressure_drops);
                    debug!(sequence = data.sequence, "Frame dropped, dispatch thread busy");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::host::{HostRuntime, InProcessRuntime};

    fn path(runtime: Arc<InProcessRuntime>, capacity: usize, policy: OverflowPolicy) -> DeliveryPath {
        let mut buffer = FrameBuffer::with_capacity(capacity).unwrap();
        let view = buffer.view();
        runtime.expose_buffer(view).unwrap();
        DeliveryPath {
            binding: ThreadBinding::new(runtime.clone(), "listener-test"),
            buffer: Mutex::new(buffer),
            view,
            dispatcher: Dispatcher::new(runtime),
            policy,
            timing: Arc::new(TimingRecorder::new()),
            counters: Arc::new(DeliveryCounters::default()),
            sequence: AtomicU64::new(0),
        }
    }

    fn data(sequence: u64, n: usize) -> DepthData {
        DepthData::new(sequence, vec![DepthPoint::new(1.0, 2.0, 3.0); n])
    }

    #[test]
    fn test_synchronous_delivery_counts() {
        let runtime = Arc::new(InProcessRuntime::new(|d| {
            if d.point_count == 3 {
                Err("rejected".to_string())
            } else {
                Ok(())
            }
        }));
        let listener =
            FrameListener::synchronous(path(runtime.clone(), 4, OverflowPolicy::Truncate));
        listener.path.timing.set_enabled(true);

        listener.on_new_data(&data(0, 2));
        listener.on_new_data(&data(1, 3));
        listener.on_new_data(&data(2, 6));

        let stats = listener.path.counters.snapshot();
        assert_eq!(stats.delivered, 2);
        assert_eq!(stats.handler_failures, 1);
        assert_eq!(stats.truncated_frames, 1);
        // Failed frames are not timed
        assert_eq!(listener.path.timing.len(), 2);
    }

    #[test]
    fn test_overflow_skips_handler() {
        let runtime = Arc::new(InProcessRuntime::accept_all());
        let listener = FrameListener::synchronous(path(runtime.clone(), 2, OverflowPolicy::Reject));

        listener.on_new_data(&data(0, 3));
        assert_eq!(listener.path.counters.snapshot().overflow_rejects, 1);
        assert_eq!(runtime.counters().invocations, 0);
    }

    #[test]
    fn test_attach_failure_drops_frame() {
        let runtime = Arc::new(InProcessRuntime::accept_all());
        runtime.set_fail_attach(true);
        let listener = FrameListener::synchronous(path(runtime.clone(), 2, OverflowPolicy::Reject));

        listener.on_new_data(&data(0, 1));
        runtime.set_fail_attach(false);
        listener.on_new_data(&data(1, 1));

        let stats = listener.path.counters.snapshot();
        assert_eq!(stats.attach_failures, 1);
        assert_eq!(stats.delivered, 1);
        assert_eq!(runtime.counters().invocations, 1);
    }

    #[test]
    fn test_queued_delivery_on_dispatch_thread() {
        let runtime = Arc::new(InProcessRuntime::accept_all());
        let listener =
            FrameListener::queued(path(runtime.clone(), 4, OverflowPolicy::Reject), 8).unwrap();

        for sequence in 0..5 {
            listener.on_new_data(&data(sequence, 2));
        }
        listener.shutdown();

        let stats = listener.path.counters.snapshot();
        assert_eq!(stats.delivered + stats.backpressure_drops, 5);
        assert!(stats.delivered >= 1);
        // Only the dispatch thread attached, and it detached on exit
        let counters = runtime.counters();
        assert_eq!(counters.attaches, 1);
        assert_eq!(counters.detaches, 1);
    }
}
