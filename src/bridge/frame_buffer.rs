// SPDX-License-Identifier: GPL-3.0-only

//! Fixed-capacity frame buffer shared with the host
//!
//! Points are stored as interleaved native-endian `f32` triples, point-major:
//!
//! ```text
//! | x0 | y0 | z0 | x1 | y1 | z1 | ... | x(n-1) | y(n-1) | z(n-1) | stale ... |
//! ```
//!
//! The allocation is made once and never resized, so the address handed to
//! the host at open time stays valid for every frame. A write only replaces
//! the first `point_count` triples; the host reads the point count from the
//! delivery and ignores the rest.

use std::ptr::NonNull;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::backends::driver::DepthPoint;
use crate::backends::host::BufferView;
use crate::constants::{BYTES_PER_POINT, FLOATS_PER_POINT, MAX_POINTS};
use crate::errors::{BridgeError, BridgeResult};

/// What to do with a frame that has more points than the buffer holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Drop the whole frame
    #[default]
    Reject,
    /// Publish the first `capacity` points
    Truncate,
}

/// Result of a successful write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteOutcome {
    /// Points now in the buffer
    pub written: usize,
    /// Points cut off by [`OverflowPolicy::Truncate`]
    pub truncated: usize,
}

pub struct FrameBuffer {
    data: Box<[f32]>,
    len: usize,
}

impl FrameBuffer {
    /// Allocate room for `points` points, zero-filled
    ///
    /// `points` may not exceed [`MAX_POINTS`], the most the sensor produces.
    pub fn with_capacity(points: usize) -> BridgeResult<Self> {
        if points > MAX_POINTS {
            warn!(points, max = MAX_POINTS, "Frame buffer capacity too large");
            return Err(BridgeError::Config(format!(
                "buffer capacity {} exceeds {} points",
                points, MAX_POINTS
            )));
        }
        Ok(Self {
            data: vec![0.0; points * FLOATS_PER_POINT].into_boxed_slice(),
            len: 0,
        })
    }

    /// Capacity in points
    pub fn capacity(&self) -> usize {
        self.data.len() / FLOATS_PER_POINT
    }

    /// Points written by the last successful write
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy x, y and z of every point into the buffer, in order
    ///
    /// Frames larger than the capacity are handled per `policy`. A rejected
    /// frame leaves the previous contents untouched.
    pub fn write(
        &mut self,
        points: &[DepthPoint],
        policy: OverflowPolicy,
    ) -> BridgeResult<WriteOutcome> {
        let capacity = self.capacity();
        let count = if points.len() > capacity {
            match policy {
                OverflowPolicy::Reject => {
                    warn!(points = points.len(), capacity, "Frame exceeds buffer, dropped");
                    return Err(BridgeError::BufferOverflow {
                        points: points.len(),
                        capacity,
                    });
                }
                OverflowPolicy::Truncate => {
                    warn!(points = points.len(), capacity, "Frame exceeds buffer, truncated");
                    capacity
                }
            }
        } else {
            points.len()
        };

        for (slot, point) in self
            .data
            .chunks_exact_mut(FLOATS_PER_POINT)
            .zip(&points[..count])
        {
            slot[0] = point.x;
            slot[1] = point.y;
            slot[2] = point.z;
        }
        self.len = count;

        Ok(WriteOutcome {
            written: count,
            truncated: points.len() - count,
        })
    }

    /// Floats of the current frame
    pub fn frame(&self) -> &[f32] {
        &self.data[..self.len * FLOATS_PER_POINT]
    }

    /// The whole buffer as bytes, stale tail included
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    /// Non-owning view of the whole buffer for the host
    ///
    /// The same view is returned every time; it stays valid until the buffer
    /// is dropped.
    pub fn view(&mut self) -> BufferView {
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut self.data);
        let len = bytes.len();
        // SAFETY: the boxed slice is never reallocated, so the pointer is
        // valid for `len` bytes for as long as `self` lives.
        unsafe { BufferView::from_raw_parts(NonNull::from(bytes).cast::<u8>(), len) }
    }
}

/// ROS `sensor_msgs/PointField` datatype for `f32`
pub const FLOAT32: u8 = 7;

/// One field of a published point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PointField {
    pub name: &'static str,
    pub offset: u32,
    pub datatype: u8,
    pub count: u32,
}

/// Binary layout of the published buffer, for hosts that build point cloud
/// messages from it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PointLayout {
    pub fields: [PointField; 3],
    pub point_step: u32,
    pub is_bigendian: bool,
    pub max_points: usize,
}

impl PointLayout {
    pub fn for_capacity(max_points: usize) -> Self {
        let field = |name, offset| PointField {
            name,
            offset,
            datatype: FLOAT32,
            count: 1,
        };
        Self {
            fields: [field("x", 0), field("y", 4), field("z", 8)],
            point_step: BYTES_PER_POINT as u32,
            is_bigendian: cfg!(target_endian = "big"),
            max_points,
        }
    }

    /// Bytes per row of an organized cloud `width` points wide
    pub fn row_step(&self, width: u32) -> u32 {
        self.point_step * width
    }
}
