// SPDX-License-Identifier: GPL-3.0-only

//! Host runtime abstraction
//!
//! The host is the managed runtime that consumes frames (a JVM on Android).
//! Driver threads are foreign to it, so every thread has to attach before it
//! may call in, and the runtime reports handler failures as pending state
//! that must be checked and cleared after each call.

pub mod in_process;
#[cfg(feature = "jni")]
pub mod jni;
pub mod types;

pub use in_process::{InProcessRuntime, RuntimeCounters};
#[cfg(feature = "jni")]
pub use jni::JniRuntime;
pub use types::*;

/// Operations the bridge needs from a host runtime
pub trait HostRuntime: Send + Sync {
    /// Attach the calling thread, returning its per-thread handle
    ///
    /// `thread_name` is how the thread shows up inside the runtime.
    fn attach_current_thread(&self, thread_name: &str) -> HostResult<RuntimeHandle>;

    /// Detach the calling thread. Called at most once per successful attach,
    /// on the attached thread, when it exits.
    fn detach_current_thread(&self);

    /// Hand a session's frame buffer to the host. Called once per session
    /// open; several sessions may have buffers exposed at the same time.
    fn expose_buffer(&self, view: BufferView) -> HostResult<()>;

    /// Withdraw a buffer handed over by `expose_buffer`. Called at session
    /// close, before the memory behind `view` is freed.
    fn retract_buffer(&self, view: BufferView);

    /// Call the registered frame handler with the buffer `delivery.view`
    /// names and block until it returns
    fn invoke_frame_handler(&self, handle: RuntimeHandle, delivery: &FrameDelivery<'_>)
    -> HostResult<()>;

    /// Report and clear a failure raised by the handler on this thread
    fn take_pending_failure(&self, handle: RuntimeHandle) -> Option<String>;
}
