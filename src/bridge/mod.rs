// SPDX-License-Identifier: GPL-3.0-only

//! Frame delivery from driver threads into the host runtime
//!
//! Per frame, on the thread the driver calls back on:
//!
//! ```text
//! attach thread ─▶ write FrameBuffer ─▶ invoke host handler ─▶ record timing
//! ```
//!
//! [`CaptureSession`] owns the device and everything on this path. With
//! [`DeliveryMode::Queued`] the same path runs on a dedicated dispatch thread
//! instead, fed from a bounded pool of frames.

pub mod dispatcher;
pub mod frame_buffer;
pub mod handoff;
pub mod listener;
pub mod session;
pub mod thread_binding;
pub mod timing;

pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use frame_buffer::{FrameBuffer, OverflowPolicy, PointField, PointLayout, WriteOutcome};
pub use handoff::{DeliveryMode, FrameHandoff, HandoffStatus};
pub use listener::{DeliveryStats, FrameListener};
pub use session::{CaptureSession, SessionState};
pub use thread_binding::ThreadBinding;
pub use timing::{TimingRecorder, TimingSample};
