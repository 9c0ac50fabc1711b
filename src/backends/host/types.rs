// SPDX-License-Identifier: GPL-3.0-only

//! Types crossing the host runtime boundary

use std::fmt;
use std::num::NonZeroUsize;
use std::ptr::NonNull;

/// Result type for host runtime operations
pub type HostResult<T> = Result<T, HostError>;

/// Errors reported by a host runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// The calling thread could not be attached
    AttachFailed(String),
    /// The frame buffer could not be handed to the host
    ExposeFailed(String),
    /// The handler call itself failed (not a handler-raised failure)
    InvocationFailed(String),
    /// The delivery names a buffer that is not exposed
    NoBuffer,
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostError::AttachFailed(msg) => write!(f, "Unable to attach thread: {}", msg),
            HostError::ExposeFailed(msg) => write!(f, "Unable to expose frame buffer: {}", msg),
            HostError::InvocationFailed(msg) => write!(f, "Frame handler call failed: {}", msg),
            HostError::NoBuffer => write!(f, "Frame buffer is not exposed"),
        }
    }
}

impl std::error::Error for HostError {}

/// Per-thread token proving the thread is attached to the host runtime
///
/// For the JVM this is the thread's `JNIEnv` pointer. It is only
/// meaningful on the thread that obtained it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuntimeHandle(NonZeroUsize);

impl RuntimeHandle {
    /// Wrap a raw runtime pointer or token; `None` for null
    pub fn from_raw(raw: usize) -> Option<Self> {
        NonZeroUsize::new(raw).map(Self)
    }

    pub fn as_raw(&self) -> usize {
        self.0.get()
    }
}

/// Non-owning view of a frame buffer
///
/// Points at memory owned by a `FrameBuffer`. The view stays valid as long
/// as the capture session that exposed it is alive; the address never
/// changes between frames. Each session exposes its own buffer, so the view
/// also identifies the session a delivery belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferView {
    ptr: NonNull<u8>,
    len: usize,
}

// The view is an address and a length; reading through it is governed by
// the session's delivery lock, not by the view itself.
unsafe impl Send for BufferView {}
unsafe impl Sync for BufferView {}

impl BufferView {
    /// # Safety
    ///
    /// `ptr` must point to `len` bytes that stay allocated for as long as
    /// the view is used.
    pub unsafe fn from_raw_parts(ptr: NonNull<u8>, len: usize) -> Self {
        Self { ptr, len }
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Everything the host handler gets for one frame
#[derive(Debug, Clone, Copy)]
pub struct FrameDelivery<'a> {
    /// The view exposed at session open
    pub view: BufferView,
    /// Buffer contents, the full fixed capacity
    pub data: &'a [u8],
    /// Points of the current frame at the start of `data`
    pub point_count: usize,
    /// Delivery sequence number within the session
    pub sequence: u64,
}

impl FrameDelivery<'_> {
    /// Bytes belonging to the current frame
    pub fn frame_bytes(&self) -> &[u8] {
        let end = (self.point_count * crate::constants::BYTES_PER_POINT).min(self.data.len());
        &self.data[..end]
    }
}
