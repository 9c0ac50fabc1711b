// SPDX-License-Identifier: GPL-3.0-only

//! Depth-camera driver abstraction
//!
//! The bridge never talks to a vendor SDK directly. Everything it needs
//! from the driver is expressed by the traits in this module:
//!
//! ```text
//! ┌──────────────────┐  connected_cameras / create_camera
//! │  DeviceManager   │ ─────────────────────────────────┐
//! └──────────────────┘                                  ▼
//!                                           ┌──────────────────────┐
//!                                           │     DepthDevice      │
//!                                           │ initialize, use case │
//!                                           │ exposure, start/stop │
//!                                           └──────────┬───────────┘
//!                                                      │ driver thread(s)
//!                                                      ▼
//!                                           ┌──────────────────────┐
//!                                           │  DepthDataListener   │
//!                                           └──────────────────────┘
//! ```
//!
//! The [`simulated`] driver implements the traits in-process for tests and
//! the command line tool.

pub mod frame_loop;
pub mod simulated;
pub mod types;

pub use types::*;

use std::sync::Arc;

/// Receives frames from the driver
///
/// The driver calls [`on_new_data`](Self::on_new_data) from a thread it
/// owns. The thread may change between calls, and nothing prevents two
/// calls from overlapping.
pub trait DepthDataListener: Send + Sync {
    fn on_new_data(&self, data: &DepthData);
}

/// An opened depth camera
pub trait DepthDevice: Send {
    /// Must be called before any other operation
    fn initialize(&mut self) -> DriverResult<()>;

    /// Register the single data listener. Replaces any previous listener.
    fn register_data_listener(&mut self, listener: Arc<dyn DepthDataListener>) -> DriverResult<()>;

    fn unregister_data_listener(&mut self) -> DriverResult<()>;

    /// Names of the operating modes the camera supports
    fn use_cases(&self) -> DriverResult<Vec<String>>;

    fn set_use_case(&mut self, name: &str) -> DriverResult<()>;

    fn set_exposure_mode(&mut self, mode: ExposureMode) -> DriverResult<()>;

    /// Exposure time in microseconds. Only valid in manual exposure mode.
    fn set_exposure_time(&mut self, micros: u32) -> DriverResult<()>;

    fn start_capture(&mut self) -> DriverResult<()>;

    fn stop_capture(&mut self) -> DriverResult<()>;

    fn max_sensor_width(&self) -> DriverResult<u32>;

    fn max_sensor_height(&self) -> DriverResult<u32>;
}

/// Camera enumeration entry point of the driver SDK
pub trait DeviceManager: Send + Sync {
    /// SDK version string for diagnostics
    fn sdk_version(&self) -> String;

    /// Cameras reachable through the given platform handle
    fn connected_cameras(&self, descriptor: &DeviceDescriptor) -> Vec<CameraId>;

    /// Create a device object for an enumerated camera
    fn create_camera(&self, id: &CameraId) -> DriverResult<Box<dyn DepthDevice>>;
}
