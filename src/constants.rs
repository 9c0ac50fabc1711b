// SPDX-License-Identifier: GPL-3.0-only

//! Sensor-wide constants and the supported frame-rate table

use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest number of points the sensor can deliver in one frame (224 x 171)
pub const MAX_POINTS: usize = 38_304;

/// Floats published per point (x, y, z)
pub const FLOATS_PER_POINT: usize = 3;

/// Bytes published per point in the frame buffer
pub const BYTES_PER_POINT: usize = FLOATS_PER_POINT * std::mem::size_of::<f32>();

/// Byte size of a frame buffer holding [`MAX_POINTS`]
pub const MAX_DATA_SIZE: usize = MAX_POINTS * BYTES_PER_POINT;

/// Exposure time applied by `set_exposure`, in microseconds
pub const EXPOSURE_TIME_US: u32 = 450;

/// Longest manual exposure the sensor accepts, in microseconds
pub const MAX_EXPOSURE_TIME_US: u32 = 2000;

/// Default name given to driver threads when they attach to the host runtime
pub const DEFAULT_ATTACH_THREAD_NAME: &str = "depth-bridge";

/// Default number of pooled frames for queued delivery
pub const DEFAULT_HANDOFF_DEPTH: usize = 4;

/// Sensor geometry of the supported camera family
pub mod sensor {
    /// Maximum sensor width in pixels
    pub const MAX_WIDTH: u32 = 224;

    /// Maximum sensor height in pixels
    pub const MAX_HEIGHT: u32 = 171;
}

/// Frame-rate keys accepted by `CaptureSession::open`
///
/// Each key selects one named driver use case. Keys outside this table are
/// rejected before the device is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FrameRate {
    /// 5 fps, long exposure window (default)
    #[default]
    Fps5,
    /// 10 fps
    Fps10,
    /// 15 fps, short exposure window
    Fps15,
}

impl FrameRate {
    /// All supported rates, slowest first
    pub const ALL: [FrameRate; 3] = [FrameRate::Fps5, FrameRate::Fps10, FrameRate::Fps15];

    /// Look up a rate by its numeric key
    pub fn from_key(key: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|rate| rate.key() == key)
    }

    /// Numeric key (frames per second)
    pub fn key(&self) -> u32 {
        match self {
            FrameRate::Fps5 => 5,
            FrameRate::Fps10 => 10,
            FrameRate::Fps15 => 15,
        }
    }

    /// Driver use case selected by this rate
    pub fn use_case(&self) -> &'static str {
        match self {
            FrameRate::Fps5 => "MODE_9_5FPS_2000",
            FrameRate::Fps10 => "MODE_9_10FPS_1000",
            FrameRate::Fps15 => "MODE_9_15FPS_700",
        }
    }

    /// Human readable description for listings
    pub fn description(&self) -> &'static str {
        match self {
            FrameRate::Fps5 => "5 fps, 2000 points",
            FrameRate::Fps10 => "10 fps, 1000 points",
            FrameRate::Fps15 => "15 fps, 700 points",
        }
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} fps", self.key())
    }
}

/// Parse the frames-per-second figure out of a driver use case name
///
/// `MODE_9_10FPS_1000` yields `Some(10)`. Names without an `FPS` token
/// yield `None`.
pub fn use_case_fps(name: &str) -> Option<u32> {
    name.split('_')
        .find_map(|part| part.strip_suffix("FPS"))
        .and_then(|digits| digits.parse().ok())
}
