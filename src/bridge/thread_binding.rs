// SPDX-License-Identifier: GPL-3.0-only

//! Lazy per-thread attachment to the host runtime
//!
//! Each thread keeps a registry of the runtimes it is attached to, one entry
//! per runtime. Every binding on the same runtime shares that entry, so a
//! driver thread serving many sessions in turn stays attached once. The
//! entry owns the attachment: when the thread exits the entry is dropped and
//! the thread is detached from the runtime. Callers never detach explicitly.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error};

use crate::backends::host::{HostRuntime, RuntimeHandle};

thread_local! {
    static ATTACHED: RefCell<HashMap<RuntimeKey, AttachGuard>> = RefCell::new(HashMap::new());
}

/// Address of a runtime, stable while an entry holds a reference to it
type RuntimeKey = usize;

fn runtime_key(runtime: &Arc<dyn HostRuntime>) -> RuntimeKey {
    Arc::as_ptr(runtime) as *const () as usize
}

/// One thread's attachment to one runtime
struct AttachGuard {
    handle: RuntimeHandle,
    runtime: Arc<dyn HostRuntime>,
}

impl Drop for AttachGuard {
    fn drop(&mut self) {
        // Runs during thread-local teardown; thread::current() is off limits
        debug!(handle = self.handle.as_raw(), "Detaching thread from host runtime");
        self.runtime.detach_current_thread();
    }
}

/// Attaches calling threads to a host runtime on first use
pub struct ThreadBinding {
    key: RuntimeKey,
    runtime: Arc<dyn HostRuntime>,
    thread_name: String,
}

impl ThreadBinding {
    pub fn new(runtime: Arc<dyn HostRuntime>, thread_name: impl Into<String>) -> Self {
        Self {
            key: runtime_key(&runtime),
            runtime,
            thread_name: thread_name.into(),
        }
    }

    /// Runtime handle for the calling thread, attaching it if needed
    ///
    /// Returns `None` when the runtime refuses the attach. Nothing is cached
    /// in that case, so the next call on the same thread tries again.
    pub fn attach(&self) -> Option<RuntimeHandle> {
        if let Some(handle) = self.cached() {
            return Some(handle);
        }

        let handle = match self.runtime.attach_current_thread(&self.thread_name) {
            Ok(handle) => handle,
            Err(e) => {
                error!(thread_name = %self.thread_name, error = %e, "Unable to attach current thread");
                return None;
            }
        };

        let guard = AttachGuard {
            handle,
            runtime: Arc::clone(&self.runtime),
        };
        // Fails only while the thread is already tearing down its locals;
        // the guard is dropped with the closure and detaches right away.
        let key = self.key;
        let registered = ATTACHED.try_with(move |attached| {
            attached.borrow_mut().insert(key, guard);
        });
        if registered.is_err() {
            error!(thread_name = %self.thread_name, "Thread is exiting, attachment not kept");
            return None;
        }

        debug!(
            thread_name = %self.thread_name,
            handle = handle.as_raw(),
            "Thread attached to host runtime"
        );
        Some(handle)
    }

    /// Whether the calling thread is attached to this binding's runtime
    pub fn is_attached(&self) -> bool {
        self.cached().is_some()
    }

    fn cached(&self) -> Option<RuntimeHandle> {
        ATTACHED
            .try_with(|attached| attached.borrow().get(&self.key).map(|guard| guard.handle))
            .ok()
            .flatten()
    }
}
