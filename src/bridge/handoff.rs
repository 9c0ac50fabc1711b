// SPDX-License-Identifier: GPL-3.0-only

//! Bounded handoff from driver threads to a dispatch thread
//!
//! A fixed pool of frame slots circulates between the driver side and the
//! dispatch thread:
//!
//! ```text
//!             free slots (depth)
//!   ┌──────────────────────────────────────┐
//!   ▼                                      │
//! submit() ──▶ queue (depth) ──▶ dispatch thread ──▶ sink(points)
//! ```
//!
//! `submit` never blocks. When every slot is in flight the frame is dropped
//! and [`HandoffStatus::Dropped`] is returned.

use std::io;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backends::driver::DepthPoint;

/// Name of the dispatch thread, also used when it attaches to the host
pub const DISPATCH_THREAD_NAME: &str = "depth-bridge-dispatch";

/// Where the host handler runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// On the driver thread, blocking it until the handler returns
    #[default]
    Synchronous,
    /// On a dispatch thread fed through a bounded pool
    Queued,
}

/// Backpressure signal returned to the driver side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffStatus {
    Queued,
    /// No free slot, or the handoff is shut down
    Dropped,
}

pub struct FrameHandoff {
    free: Mutex<Receiver<Vec<DepthPoint>>>,
    queue: Mutex<Option<SyncSender<Vec<DepthPoint>>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl FrameHandoff {
    /// Spawn the dispatch thread with `depth` slots of `max_points` each
    ///
    /// `sink` runs on the dispatch thread once per queued frame, in
    /// submission order.
    pub fn spawn<F>(depth: usize, max_points: usize, mut sink: F) -> io::Result<Self>
    where
        F: FnMut(&[DepthPoint]) + Send + 'static,
    {
        let (free_tx, free_rx) = mpsc::channel();
        for _ in 0..depth {
            // The receiver is alive, so this cannot fail
            let _ = free_tx.send(Vec::with_capacity(max_points));
        }
        let (queue_tx, queue_rx) = mpsc::sync_channel::<Vec<DepthPoint>>(depth);

        let thread = thread::Builder::new()
            .name(DISPATCH_THREAD_NAME.to_string())
            .spawn(move || {
                for mut frame in queue_rx.iter() {
                    sink(&frame);
                    frame.clear();
                    if free_tx.send(frame).is_err() {
                        break;
                    }
                }
                debug!("Dispatch thread exiting");
            })?;

        debug!(depth, max_points, "Frame handoff started");
        Ok(Self {
            free: Mutex::new(free_rx),
            queue: Mutex::new(Some(queue_tx)),
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Copy `points` into a free slot and queue it
    pub fn submit(&self, points: &[DepthPoint]) -> HandoffStatus {
        let slot = self
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_recv();
        let Ok(mut frame) = slot else {
            debug!(points = points.len(), "No free frame slot, frame dropped");
            return HandoffStatus::Dropped;
        };

        frame.clear();
        frame.extend_from_slice(points);

        let queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        match queue.as_ref().map(|tx| tx.try_send(frame)) {
            Some(Ok(())) => HandoffStatus::Queued,
            _ => HandoffStatus::Dropped,
        }
    }

    /// Stop accepting frames, let the dispatch thread finish the queued ones
    /// and join it
    pub fn shutdown(&self) {
        drop(
            self.queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );

        let thread = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(thread) = thread {
            // A handler closing the session runs on the dispatch thread itself
            if thread.thread().id() == thread::current().id() {
                return;
            }
            if thread.join().is_err() {
                warn!("Dispatch thread panicked");
            }
        }
    }
}

impl Drop for FrameHandoff {
    fn drop(&mut self) {
        self.shutdown();
    }
}
