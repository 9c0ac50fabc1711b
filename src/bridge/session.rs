// SPDX-License-Identifier: GPL-3.0-only

//! Capture session lifecycle
//!
//! ```text
//!          open            start
//! Closed ───────▶ Opened ───────▶ Capturing
//!    ▲              │  ▲              │
//!    └──── close ───┘  └──── stop ────┘
//! ```
//!
//! `close` is also accepted from `Capturing`. Every session owns its device,
//! buffer and listener; sessions do not share state, even when they share a
//! host runtime. Each one exposes its own buffer and retracts it on close.

use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::dispatcher::Dispatcher;
use super::frame_buffer::{FrameBuffer, PointLayout};
use super::handoff::{DISPATCH_THREAD_NAME, DeliveryMode};
use super::listener::{DeliveryCounters, DeliveryPath, DeliveryStats, FrameListener};
use super::thread_binding::ThreadBinding;
use super::timing::{TimingRecorder, TimingSample};
use crate::backends::driver::{CameraId, DepthDevice, DeviceDescriptor, DeviceManager, ExposureMode};
use crate::backends::host::{BufferView, HostRuntime};
use crate::config::BridgeConfig;
use crate::constants::FrameRate;
use crate::errors::{BridgeError, BridgeResult, DeviceContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SessionState {
    #[default]
    Closed,
    Opened,
    Capturing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Closed => write!(f, "closed"),
            SessionState::Opened => write!(f, "opened"),
            SessionState::Capturing => write!(f, "capturing"),
        }
    }
}

/// Everything that exists only while the session is open
struct OpenCamera {
    device: Box<dyn DepthDevice>,
    listener: Arc<FrameListener>,
    view: BufferView,
    camera: CameraId,
    frame_rate: FrameRate,
}

pub struct CaptureSession {
    manager: Arc<dyn DeviceManager>,
    runtime: Arc<dyn HostRuntime>,
    config: BridgeConfig,
    state: SessionState,
    camera: Option<OpenCamera>,
    timing: Arc<TimingRecorder>,
    counters: Arc<DeliveryCounters>,
}

impl CaptureSession {
    pub fn new(
        manager: Arc<dyn DeviceManager>,
        runtime: Arc<dyn HostRuntime>,
        config: BridgeConfig,
    ) -> BridgeResult<Self> {
        config.validate()?;
        Ok(Self {
            manager,
            runtime,
            config,
            state: SessionState::Closed,
            camera: None,
            timing: Arc::new(TimingRecorder::new()),
            counters: Arc::new(DeliveryCounters::default()),
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Camera and frame rate of the open session
    pub fn camera(&self) -> Option<(&CameraId, FrameRate)> {
        self.camera.as_ref().map(|c| (&c.camera, c.frame_rate))
    }

    pub fn stats(&self) -> DeliveryStats {
        self.counters.snapshot()
    }

    /// Binary layout of the buffer handed to the host
    pub fn point_layout(&self) -> PointLayout {
        PointLayout::for_capacity(self.config.max_points)
    }

    /// Open the single camera behind `descriptor` at the frame rate `rate_key`
    ///
    /// On failure the session stays closed and nothing reaches the host.
    pub fn open(&mut self, descriptor: &DeviceDescriptor, rate_key: u32) -> BridgeResult<()> {
        if self.state != SessionState::Closed {
            return Err(self.invalid_state("open"));
        }
        let frame_rate = FrameRate::from_key(rate_key).ok_or_else(|| {
            error!(rate_key, "Unsupported frame rate");
            BridgeError::UnsupportedFrameRate(rate_key)
        })?;

        info!(sdk = %self.manager.sdk_version(), %descriptor, "Opening depth camera");

        let camera = match self.manager.connected_cameras(descriptor).as_slice() {
            [camera] => camera.clone(),
            [] => {
                error!(%descriptor, "No camera connected");
                return Err(BridgeError::NoDevice);
            }
            cameras => {
                error!(%descriptor, count = cameras.len(), "More than one camera connected");
                return Err(BridgeError::AmbiguousDevice(cameras.len()));
            }
        };

        let mut device = self
            .manager
            .create_camera(&camera)
            .device_op("create the camera device")?;
        device.initialize().device_op("initialize the camera device")?;

        let (listener, view) = self.build_listener()?;
        device
            .register_data_listener(listener.clone())
            .device_op("register data listener")?;

        let use_cases = device.use_cases().device_op("retrieve use cases")?;
        debug!(?use_cases, "Camera use cases");
        let wanted = frame_rate.use_case();
        if !use_cases.iter().any(|uc| uc == wanted) {
            error!(use_case = wanted, "Cannot find appropriate mode");
            return Err(BridgeError::UseCaseNotFound(wanted.to_string()));
        }
        device.set_use_case(wanted).device_op("set use case")?;
        device
            .set_exposure_mode(ExposureMode::Manual)
            .device_op("set exposure mode to manual")?;

        self.runtime.expose_buffer(view)?;

        info!(%camera, use_case = wanted, "Depth camera opened");
        self.camera = Some(OpenCamera {
            device,
            listener,
            view,
            camera,
            frame_rate,
        });
        self.state = SessionState::Opened;
        Ok(())
    }

    /// Begin frame delivery
    pub fn start(&mut self, enable_timing: bool) -> BridgeResult<()> {
        if self.state != SessionState::Opened {
            return Err(self.invalid_state("start capture"));
        }

        self.timing.set_enabled(enable_timing);
        let started = self
            .open_camera("start capture")
            .and_then(|camera| camera.device.start_capture().device_op("start capture"));
        if let Err(e) = started {
            self.timing.set_enabled(false);
            return Err(e);
        }

        info!(timing = enable_timing, "Capture started");
        self.state = SessionState::Capturing;
        Ok(())
    }

    /// Halt frame delivery and return the timing log of the run
    ///
    /// A callback already running on a driver thread may still complete
    /// after this returns.
    pub fn stop(&mut self) -> BridgeResult<Vec<TimingSample>> {
        if self.state != SessionState::Capturing {
            return Err(self.invalid_state("stop capture"));
        }
        let camera = self.open_camera("stop capture")?;
        camera.device.stop_capture().device_op("stop capture")?;

        let samples = if self.timing.is_enabled() {
            self.timing.drain()
        } else {
            Vec::new()
        };
        self.timing.set_enabled(false);

        info!(samples = samples.len(), "Capture stopped");
        self.state = SessionState::Opened;
        Ok(samples)
    }

    /// Apply the configured manual exposure time
    pub fn set_exposure(&mut self) -> BridgeResult<()> {
        let micros = self.config.exposure_time_us;
        let camera = self.open_camera("set exposure time")?;
        camera
            .device
            .set_exposure_time(micros)
            .device_op("set exposure time")?;
        debug!(micros, "Exposure time set");
        Ok(())
    }

    pub fn max_width(&mut self) -> BridgeResult<u32> {
        let camera = self.open_camera("get max sensor width")?;
        camera.device.max_sensor_width().device_op("get max sensor width")
    }

    pub fn max_height(&mut self) -> BridgeResult<u32> {
        let camera = self.open_camera("get max sensor height")?;
        camera
            .device
            .max_sensor_height()
            .device_op("get max sensor height")
    }

    /// Release the camera
    ///
    /// Stops capture if needed, unregisters the listener, waits for the
    /// dispatch thread and drops the device. The buffer is then retracted
    /// from the host before it is freed. Closing a closed session does
    /// nothing.
    pub fn close(&mut self) {
        let Some(mut camera) = self.camera.take() else {
            return;
        };

        if self.state == SessionState::Capturing {
            if let Err(status) = camera.device.stop_capture() {
                warn!(%status, "Failed to stop capture while closing");
            }
            self.timing.set_enabled(false);
        }
        if let Err(status) = camera.device.unregister_data_listener() {
            warn!(%status, "Failed to unregister data listener");
        }
        camera.listener.shutdown();
        drop(camera.device);
        self.runtime.retract_buffer(camera.view);

        info!(camera = %camera.camera, "Depth camera closed");
        self.state = SessionState::Closed;
    }

    fn open_camera(&mut self, operation: &'static str) -> BridgeResult<&mut OpenCamera> {
        let state = self.state;
        self.camera
            .as_mut()
            .ok_or(BridgeError::InvalidState { operation, state })
    }

    fn invalid_state(&self, operation: &'static str) -> BridgeError {
        warn!(operation, state = %self.state, "Operation not valid in this state");
        BridgeError::InvalidState {
            operation,
            state: self.state,
        }
    }

    /// Allocate the buffer and build the listener around it
    ///
    /// The buffer view is returned separately so it is only handed to the
    /// host once the device is fully configured.
    fn build_listener(&self) -> BridgeResult<(Arc<FrameListener>, BufferView)> {
        let mut buffer = FrameBuffer::with_capacity(self.config.max_points)?;
        let view = buffer.view();

        let thread_name = match self.config.delivery {
            DeliveryMode::Synchronous => self.config.attach_thread_name.as_str(),
            DeliveryMode::Queued => DISPATCH_THREAD_NAME,
        };
        let path = DeliveryPath {
            binding: ThreadBinding::new(Arc::clone(&self.runtime), thread_name),
            buffer: Mutex::new(buffer),
            view,
            dispatcher: Dispatcher::new(Arc::clone(&self.runtime)),
            policy: self.config.overflow_policy,
            timing: Arc::clone(&self.timing),
            counters: Arc::clone(&self.counters),
            sequence: AtomicU64::new(0),
        };

        let listener = match self.config.delivery {
            DeliveryMode::Synchronous => FrameListener::synchronous(path),
            DeliveryMode::Queued => FrameListener::queued(path, self.config.handoff_depth)?,
        };
        Ok((Arc::new(listener), view))
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.close();
    }
}
