// SPDX-License-Identifier: GPL-3.0-only

//! Host runtime that runs the frame handler as a Rust closure
//!
//! Used by the command line tool and the tests. It keeps the semantics of a
//! managed runtime that matter to the bridge: threads get a distinct handle
//! when they attach, and a handler error does not propagate out of the call
//! but stays pending on the thread until it is taken.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use super::HostRuntime;
use super::types::*;

type FrameHandler = dyn Fn(&FrameDelivery<'_>) -> Result<(), String> + Send + Sync;

/// Attach/detach/invocation counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeCounters {
    pub attaches: usize,
    pub detaches: usize,
    pub invocations: usize,
}

pub struct InProcessRuntime {
    handler: Box<FrameHandler>,
    next_handle: AtomicUsize,
    attaches: AtomicUsize,
    detaches: AtomicUsize,
    invocations: AtomicUsize,
    fail_attach: AtomicBool,
    exposed: Mutex<HashSet<BufferView>>,
    pending: Mutex<HashMap<RuntimeHandle, String>>,
}

impl InProcessRuntime {
    /// Runtime whose frame handler is `handler`
    ///
    /// An `Err` returned by the handler becomes a pending failure.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&FrameDelivery<'_>) -> Result<(), String> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            next_handle: AtomicUsize::new(1),
            attaches: AtomicUsize::new(0),
            detaches: AtomicUsize::new(0),
            invocations: AtomicUsize::new(0),
            fail_attach: AtomicBool::new(false),
            exposed: Mutex::new(HashSet::new()),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Runtime that accepts every frame
    pub fn accept_all() -> Self {
        Self::new(|_| Ok(()))
    }

    /// Make subsequent attach attempts fail
    pub fn set_fail_attach(&self, fail: bool) {
        self.fail_attach.store(fail, Ordering::SeqCst);
    }

    pub fn counters(&self) -> RuntimeCounters {
        RuntimeCounters {
            attaches: self.attaches.load(Ordering::SeqCst),
            detaches: self.detaches.load(Ordering::SeqCst),
            invocations: self.invocations.load(Ordering::SeqCst),
        }
    }

    /// Views handed over by `expose_buffer` and not yet retracted
    pub fn exposed_views(&self) -> Vec<BufferView> {
        self.exposed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect()
    }

    pub fn is_exposed(&self, view: BufferView) -> bool {
        self.exposed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&view)
    }
}

impl HostRuntime for InProcessRuntime {
    fn attach_current_thread(&self, thread_name: &str) -> HostResult<RuntimeHandle> {
        if self.fail_attach.load(Ordering::SeqCst) {
            return Err(HostError::AttachFailed("attach disabled".to_string()));
        }

        let raw = self.next_handle.fetch_add(1, Ordering::SeqCst);
        let handle = RuntimeHandle::from_raw(raw)
            .ok_or_else(|| HostError::AttachFailed("handle space exhausted".to_string()))?;
        self.attaches.fetch_add(1, Ordering::SeqCst);
        debug!(thread_name, handle = raw, "Thread attached to in-process runtime");
        Ok(handle)
    }

    fn detach_current_thread(&self) {
        self.detaches.fetch_add(1, Ordering::SeqCst);
    }

    fn expose_buffer(&self, view: BufferView) -> HostResult<()> {
        self.exposed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(view);
        Ok(())
    }

    fn retract_buffer(&self, view: BufferView) {
        self.exposed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&view);
    }

    fn invoke_frame_handler(
        &self,
        handle: RuntimeHandle,
        delivery: &FrameDelivery<'_>,
    ) -> HostResult<()> {
        if !self.is_exposed(delivery.view) {
            return Err(HostError::NoBuffer);
        }

        self.invocations.fetch_add(1, Ordering::SeqCst);
        if let Err(failure) = (self.handler)(delivery) {
            self.pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(handle, failure);
        }
        Ok(())
    }

    fn take_pending_failure(&self, handle: RuntimeHandle) -> Option<String> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle)
    }
}
