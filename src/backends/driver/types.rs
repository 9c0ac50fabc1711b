// SPDX-License-Identifier: GPL-3.0-only
// Shared types for the depth-camera driver abstraction

//! Shared types for depth-camera drivers

use bytemuck::{Pod, Zeroable};
use std::fmt;

/// Result type for driver operations
pub type DriverResult<T> = Result<T, CameraStatus>;

/// Platform handle used to enumerate cameras
///
/// On Android this is the file descriptor of an opened USB device
/// connection; the driver only looks for cameras behind that descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceDescriptor {
    pub fd: i32,
}

impl DeviceDescriptor {
    pub fn from_fd(fd: i32) -> Self {
        Self { fd }
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fd:{}", self.fd)
    }
}

/// Driver-assigned camera identifier (usually the serial number)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CameraId(pub String);

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single 3D point as delivered by the driver
///
/// Coordinates are in meters in the camera frame. Only `x`, `y` and `z`
/// are published to the host; the remaining fields are driver metadata.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct DepthPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Standard deviation estimate of the depth value
    pub noise: f32,
    /// 16-bit infrared amplitude
    pub gray_value: u16,
    /// 0 = invalid, 255 = full confidence
    pub depth_confidence: u8,
    _pad: u8,
}

impl DepthPoint {
    /// Point with full confidence and no metadata
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            x,
            y,
            z,
            noise: 0.0,
            gray_value: 0,
            depth_confidence: u8::MAX,
            _pad: 0,
        }
    }

    /// Attach driver metadata
    pub fn with_metadata(mut self, noise: f32, gray_value: u16, depth_confidence: u8) -> Self {
        self.noise = noise;
        self.gray_value = gray_value;
        self.depth_confidence = depth_confidence;
        self
    }
}

/// One frame delivered by the driver
#[derive(Debug, Clone, Default)]
pub struct DepthData {
    /// Driver frame counter
    pub sequence: u64,
    /// Driver timestamp in microseconds
    pub timestamp_us: u64,
    pub width: u32,
    pub height: u32,
    /// Points in sensor order
    pub points: Vec<DepthPoint>,
}

impl DepthData {
    pub fn new(sequence: u64, points: Vec<DepthPoint>) -> Self {
        Self {
            sequence,
            timestamp_us: 0,
            width: points.len() as u32,
            height: 1,
            points,
        }
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }
}

/// Exposure control mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExposureMode {
    /// Exposure time is set explicitly by the application
    Manual,
    /// Exposure time is adapted by the driver
    #[default]
    Automatic,
}

/// Status codes reported by the driver SDK
///
/// `Success` is only used for logging; failing calls carry one of the
/// other variants in their `Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CameraStatus {
    Success,
    RuntimeError,
    DisconnectedDevice,
    InvalidValue,
    Timeout,
    LogicError,
    NotImplemented,
    OutOfBounds,
    ResourceError,
    FileNotFound,
    CouldNotOpen,
    DataNotFound,
    DeviceIsBusy,
    WrongDataFormatFound,
    UsecaseNotSupported,
    FrameDropped,
    NoUseCasesForDevice,
    DeviceNotInitialized,
    CalibrationDataError,
    InsufficientPrivileges,
    Unknown,
}

impl CameraStatus {
    /// Numeric code as reported by the SDK
    pub fn code(&self) -> i32 {
        match self {
            CameraStatus::Success => 0,
            CameraStatus::RuntimeError => 1024,
            CameraStatus::DisconnectedDevice => 1026,
            CameraStatus::InvalidValue => 1027,
            CameraStatus::Timeout => 1028,
            CameraStatus::LogicError => 2048,
            CameraStatus::NotImplemented => 2049,
            CameraStatus::OutOfBounds => 2050,
            CameraStatus::ResourceError => 4096,
            CameraStatus::FileNotFound => 4097,
            CameraStatus::CouldNotOpen => 4098,
            CameraStatus::DataNotFound => 4099,
            CameraStatus::DeviceIsBusy => 4100,
            CameraStatus::WrongDataFormatFound => 4101,
            CameraStatus::UsecaseNotSupported => 5001,
            CameraStatus::FrameDropped => 5002,
            CameraStatus::NoUseCasesForDevice => 5003,
            CameraStatus::DeviceNotInitialized => 5004,
            CameraStatus::CalibrationDataError => 5005,
            CameraStatus::InsufficientPrivileges => 5006,
            CameraStatus::Unknown => 0x7fff_ffff,
        }
    }

    pub fn is_success(&self) -> bool {
        *self == CameraStatus::Success
    }
}

impl fmt::Display for CameraStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} (code {})", self, self.code())
    }
}

impl std::error::Error for CameraStatus {}
