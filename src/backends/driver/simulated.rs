// SPDX-License-Identifier: GPL-3.0-only

//! In-process depth camera driver
//!
//! Behaves like the vendor SDK as far as the bridge can observe: cameras are
//! found through a descriptor, must be initialized, expose named use cases,
//! and deliver frames to a registered listener from a driver-owned thread.
//!
//! Every camera has a [`SimulatedHandle`] that outlives the device object.
//! Tests use it to inject failures, inspect what the bridge configured and
//! push frames synchronously from any thread.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::frame_loop::{CaptureLoopController, LoopAction, sleep_unless_stopped};
use super::types::*;
use super::{DepthDataListener, DepthDevice, DeviceManager};
use crate::constants::{self, sensor};

/// Use cases reported by simulated cameras
pub const SIMULATED_USE_CASES: &[&str] = &[
    "MODE_9_5FPS_2000",
    "MODE_9_10FPS_1000",
    "MODE_9_15FPS_700",
    "MODE_9_25FPS_450",
    "MODE_5_35FPS_600",
    "MODE_5_45FPS_500",
];

/// Driver operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverOp {
    CreateCamera,
    Initialize,
    RegisterListener,
    UseCases,
    SetUseCase,
    SetExposureMode,
    SetExposureTime,
    StartCapture,
    StopCapture,
    MaxSensorWidth,
    MaxSensorHeight,
}

/// How a simulated camera produces frames once capture has started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamMode {
    /// Frames are only delivered through [`SimulatedHandle::emit`]
    #[default]
    Manual,
    /// A driver thread delivers synthetic frames at the use case frame rate
    Paced {
        /// Stop producing after this many frames
        max_frames: Option<u64>,
    },
}

/// Static description of a simulated camera
#[derive(Debug, Clone)]
pub struct SimulatedCamera {
    pub id: CameraId,
    /// Descriptor the camera is reachable through
    pub fd: i32,
    pub width: u32,
    pub height: u32,
    pub use_cases: Vec<String>,
    pub stream: StreamMode,
}

impl SimulatedCamera {
    pub fn new(serial: &str, fd: i32) -> Self {
        Self {
            id: CameraId(serial.to_string()),
            fd,
            width: sensor::MAX_WIDTH,
            height: sensor::MAX_HEIGHT,
            use_cases: SIMULATED_USE_CASES.iter().map(|s| s.to_string()).collect(),
            stream: StreamMode::Manual,
        }
    }

    pub fn with_use_cases(mut self, use_cases: &[&str]) -> Self {
        self.use_cases = use_cases.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_stream(mut self, stream: StreamMode) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_sensor_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }
}

/// State shared between a simulated device, its frame thread and its handle
struct DeviceShared {
    camera: SimulatedCamera,
    faults: Mutex<HashMap<DriverOp, CameraStatus>>,
    listener: Mutex<Option<Arc<dyn DepthDataListener>>>,
    initialized: AtomicBool,
    capturing: AtomicBool,
    use_case: Mutex<Option<String>>,
    exposure_mode: Mutex<ExposureMode>,
    exposure_time_us: AtomicU32,
    sequence: AtomicU64,
}

impl DeviceShared {
    fn new(camera: SimulatedCamera) -> Self {
        Self {
            camera,
            faults: Mutex::new(HashMap::new()),
            listener: Mutex::new(None),
            initialized: AtomicBool::new(false),
            capturing: AtomicBool::new(false),
            use_case: Mutex::new(None),
            exposure_mode: Mutex::new(ExposureMode::Automatic),
            exposure_time_us: AtomicU32::new(0),
            sequence: AtomicU64::new(0),
        }
    }

    fn check(&self, op: DriverOp) -> DriverResult<()> {
        let faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        match faults.get(&op) {
            Some(status) => {
                debug!(camera = %self.camera.id, ?op, %status, "Injected driver failure");
                Err(*status)
            }
            None => Ok(()),
        }
    }

    fn require_initialized(&self) -> DriverResult<()> {
        if self.initialized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CameraStatus::DeviceNotInitialized)
        }
    }

    /// Deliver a frame on the calling thread
    fn deliver(&self, points: Vec<DepthPoint>) -> bool {
        if !self.capturing.load(Ordering::SeqCst) {
            return false;
        }

        // Never call out while holding the listener lock
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(listener) = listener else {
            return false;
        };

        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let data = DepthData {
            sequence,
            timestamp_us: chrono::Utc::now().timestamp_micros().max(0) as u64,
            width: self.camera.width,
            height: self.camera.height,
            points,
        };
        listener.on_new_data(&data);
        true
    }

    /// Wavy surface about one meter in front of the sensor
    fn synthetic_points(&self, phase: u64) -> Vec<DepthPoint> {
        let (width, height) = (self.camera.width, self.camera.height);
        let mut points = Vec::with_capacity((width * height) as usize);
        let phase = phase as f32 * 0.2;

        for row in 0..height {
            for col in 0..width {
                let z = 1.0 + 0.1 * (phase + col as f32 * 0.05).sin();
                let x = (col as f32 - width as f32 / 2.0) * 0.004 * z;
                let y = (row as f32 - height as f32 / 2.0) * 0.004 * z;
                points.push(
                    DepthPoint::new(x, y, z).with_metadata(0.002, (z * 1000.0) as u16, u8::MAX),
                );
            }
        }
        points
    }
}

/// Inspection and control handle for one simulated camera
#[derive(Clone)]
pub struct SimulatedHandle(Arc<DeviceShared>);

impl SimulatedHandle {
    /// Make `op` fail with `status` until cleared
    pub fn fail(&self, op: DriverOp, status: CameraStatus) {
        self.0
            .faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(op, status);
    }

    pub fn clear_faults(&self) {
        self.0
            .faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn is_initialized(&self) -> bool {
        self.0.initialized.load(Ordering::SeqCst)
    }

    pub fn is_capturing(&self) -> bool {
        self.0.capturing.load(Ordering::SeqCst)
    }

    pub fn has_listener(&self) -> bool {
        self.0
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Use case selected by the last successful `set_use_case`
    pub fn use_case(&self) -> Option<String> {
        self.0
            .use_case
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn exposure_mode(&self) -> ExposureMode {
        *self
            .0
            .exposure_mode
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Last exposure time set, 0 if never set
    pub fn exposure_time_us(&self) -> u32 {
        self.0.exposure_time_us.load(Ordering::SeqCst)
    }

    /// Frames handed to the listener so far
    pub fn frames_emitted(&self) -> u64 {
        self.0.sequence.load(Ordering::SeqCst)
    }

    /// Deliver `points` to the registered listener on the calling thread
    ///
    /// Returns `false` if the camera is not capturing or has no listener.
    pub fn emit(&self, points: Vec<DepthPoint>) -> bool {
        self.0.deliver(points)
    }

    /// Deliver one full synthetic frame on the calling thread
    pub fn emit_synthetic(&self) -> bool {
        let phase = self.frames_emitted();
        self.0.deliver(self.0.synthetic_points(phase))
    }
}

/// Simulated device object handed to the bridge
pub struct SimulatedDevice {
    shared: Arc<DeviceShared>,
    source: Option<CaptureLoopController>,
}

impl SimulatedDevice {
    fn start_source(&mut self, max_frames: Option<u64>) -> DriverResult<()> {
        let fps = self
            .shared
            .use_case
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_deref()
            .and_then(constants::use_case_fps)
            .unwrap_or(5)
            .max(1);
        let interval = Duration::from_secs(1) / fps;
        let shared = Arc::clone(&self.shared);
        let mut produced = 0u64;

        let name = format!("depth-source-{}", self.shared.camera.id);
        let controller = CaptureLoopController::start(&name, move |stop| {
            if !sleep_unless_stopped(stop, interval) {
                return LoopAction::Stop;
            }
            if max_frames.is_some_and(|max| produced >= max) {
                return LoopAction::Stop;
            }
            shared.deliver(shared.synthetic_points(produced));
            produced += 1;
            LoopAction::Continue
        })
        .map_err(|e| {
            warn!(error = %e, "Failed to spawn simulated frame thread");
            CameraStatus::ResourceError
        })?;

        self.source = Some(controller);
        Ok(())
    }
}

impl DepthDevice for SimulatedDevice {
    fn initialize(&mut self) -> DriverResult<()> {
        self.shared.check(DriverOp::Initialize)?;
        self.shared.initialized.store(true, Ordering::SeqCst);
        debug!(camera = %self.shared.camera.id, "Simulated camera initialized");
        Ok(())
    }

    fn register_data_listener(&mut self, listener: Arc<dyn DepthDataListener>) -> DriverResult<()> {
        self.shared.check(DriverOp::RegisterListener)?;
        self.shared.require_initialized()?;
        *self
            .shared
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(listener);
        Ok(())
    }

    fn unregister_data_listener(&mut self) -> DriverResult<()> {
        *self
            .shared
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }

    fn use_cases(&self) -> DriverResult<Vec<String>> {
        self.shared.check(DriverOp::UseCases)?;
        self.shared.require_initialized()?;
        if self.shared.camera.use_cases.is_empty() {
            return Err(CameraStatus::NoUseCasesForDevice);
        }
        Ok(self.shared.camera.use_cases.clone())
    }

    fn set_use_case(&mut self, name: &str) -> DriverResult<()> {
        self.shared.check(DriverOp::SetUseCase)?;
        self.shared.require_initialized()?;
        if self.shared.capturing.load(Ordering::SeqCst) {
            return Err(CameraStatus::DeviceIsBusy);
        }
        if !self.shared.camera.use_cases.iter().any(|uc| uc == name) {
            return Err(CameraStatus::UsecaseNotSupported);
        }
        *self
            .shared
            .use_case
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(name.to_string());
        Ok(())
    }

    fn set_exposure_mode(&mut self, mode: ExposureMode) -> DriverResult<()> {
        self.shared.check(DriverOp::SetExposureMode)?;
        self.shared.require_initialized()?;
        *self
            .shared
            .exposure_mode
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = mode;
        Ok(())
    }

    fn set_exposure_time(&mut self, micros: u32) -> DriverResult<()> {
        self.shared.check(DriverOp::SetExposureTime)?;
        self.shared.require_initialized()?;
        if *self
            .shared
            .exposure_mode
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            != ExposureMode::Manual
        {
            return Err(CameraStatus::LogicError);
        }
        if micros == 0 || micros > constants::MAX_EXPOSURE_TIME_US {
            return Err(CameraStatus::OutOfBounds);
        }
        self.shared.exposure_time_us.store(micros, Ordering::SeqCst);
        Ok(())
    }

    fn start_capture(&mut self) -> DriverResult<()> {
        self.shared.check(DriverOp::StartCapture)?;
        self.shared.require_initialized()?;
        if self.shared.capturing.swap(true, Ordering::SeqCst) {
            return Err(CameraStatus::LogicError);
        }

        if let StreamMode::Paced { max_frames } = self.shared.camera.stream {
            if let Err(status) = self.start_source(max_frames) {
                self.shared.capturing.store(false, Ordering::SeqCst);
                return Err(status);
            }
        }

        info!(camera = %self.shared.camera.id, "Simulated capture started");
        Ok(())
    }

    fn stop_capture(&mut self) -> DriverResult<()> {
        self.shared.check(DriverOp::StopCapture)?;
        self.shared.require_initialized()?;
        self.shared.capturing.store(false, Ordering::SeqCst);
        if let Some(mut source) = self.source.take() {
            source.stop();
        }
        info!(camera = %self.shared.camera.id, "Simulated capture stopped");
        Ok(())
    }

    fn max_sensor_width(&self) -> DriverResult<u32> {
        self.shared.check(DriverOp::MaxSensorWidth)?;
        self.shared.require_initialized()?;
        Ok(self.shared.camera.width)
    }

    fn max_sensor_height(&self) -> DriverResult<u32> {
        self.shared.check(DriverOp::MaxSensorHeight)?;
        self.shared.require_initialized()?;
        Ok(self.shared.camera.height)
    }
}

impl Drop for SimulatedDevice {
    fn drop(&mut self) {
        self.shared.capturing.store(false, Ordering::SeqCst);
        if let Some(mut source) = self.source.take() {
            source.stop();
        }
        *self
            .shared
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        self.shared.initialized.store(false, Ordering::SeqCst);
    }
}

/// Simulated driver entry point
pub struct SimulatedManager {
    cameras: Vec<Arc<DeviceShared>>,
}

impl SimulatedManager {
    pub fn new(cameras: Vec<SimulatedCamera>) -> Self {
        Self {
            cameras: cameras
                .into_iter()
                .map(|camera| Arc::new(DeviceShared::new(camera)))
                .collect(),
        }
    }

    /// One camera reachable through `fd`
    pub fn single(fd: i32) -> Self {
        Self::new(vec![SimulatedCamera::new("sim-0001", fd)])
    }

    /// Handle for the camera with the given serial
    pub fn handle(&self, serial: &str) -> Option<SimulatedHandle> {
        self.cameras
            .iter()
            .find(|shared| shared.camera.id.0 == serial)
            .map(|shared| SimulatedHandle(Arc::clone(shared)))
    }

    /// Handle for the first camera
    pub fn first_handle(&self) -> Option<SimulatedHandle> {
        self.cameras
            .first()
            .map(|shared| SimulatedHandle(Arc::clone(shared)))
    }
}

impl DeviceManager for SimulatedManager {
    fn sdk_version(&self) -> String {
        format!("simulated {}", env!("CARGO_PKG_VERSION"))
    }

    fn connected_cameras(&self, descriptor: &DeviceDescriptor) -> Vec<CameraId> {
        self.cameras
            .iter()
            .filter(|shared| shared.camera.fd == descriptor.fd)
            .map(|shared| shared.camera.id.clone())
            .collect()
    }

    fn create_camera(&self, id: &CameraId) -> DriverResult<Box<dyn DepthDevice>> {
        let shared = self
            .cameras
            .iter()
            .find(|shared| &shared.camera.id == id)
            .ok_or(CameraStatus::DisconnectedDevice)?;
        shared.check(DriverOp::CreateCamera)?;

        Ok(Box::new(SimulatedDevice {
            shared: Arc::clone(shared),
            source: None,
        }))
    }
}
