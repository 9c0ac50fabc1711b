// SPDX-License-Identifier: MPL-2.0

//! Depth Bridge - depth-camera frames into a managed host runtime
//!
//! The driver SDK calls back on threads it owns. This crate attaches those
//! threads to the host runtime, publishes every frame through one
//! fixed-capacity buffer shared with the host, invokes the host's frame
//! handler and optionally records how long each delivery took.
//!
//! # Architecture
//!
//! - [`backends`]: driver SDK and host runtime abstractions, with in-process
//!   implementations and a JNI runtime behind the `jni` feature
//! - [`bridge`]: the delivery path and the [`CaptureSession`] lifecycle
//! - [`config`]: user configuration
//! - [`constants`]: sensor limits and the frame-rate table
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use depth_bridge::backends::driver::DeviceDescriptor;
//! use depth_bridge::backends::driver::simulated::SimulatedManager;
//! use depth_bridge::backends::host::InProcessRuntime;
//! use depth_bridge::{BridgeConfig, CaptureSession};
//!
//! let manager = Arc::new(SimulatedManager::single(3));
//! let runtime = Arc::new(InProcessRuntime::accept_all());
//! let mut session = CaptureSession::new(manager, runtime, BridgeConfig::default())?;
//! session.open(&DeviceDescriptor::from_fd(3), 10)?;
//! session.start(true)?;
//! let samples = session.stop()?;
//! # Ok::<(), depth_bridge::BridgeError>(())
//! ```

pub mod backends;
pub mod bridge;
pub mod config;
pub mod constants;
pub mod errors;

// Re-export commonly used types
pub use bridge::{CaptureSession, DeliveryMode, DeliveryStats, OverflowPolicy, SessionState};
pub use config::BridgeConfig;
pub use constants::FrameRate;
pub use errors::{BridgeError, BridgeResult};
