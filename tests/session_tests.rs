// SPDX-License-Identifier: MPL-2.0

//! End-to-end tests of the capture session on the simulated driver

use depth_bridge::backends::driver::simulated::{
    DriverOp, SimulatedCamera, SimulatedHandle, SimulatedManager,
};
use depth_bridge::backends::driver::{CameraStatus, DepthPoint, DeviceDescriptor, ExposureMode};
use depth_bridge::backends::host::{HostRuntime, InProcessRuntime};
use depth_bridge::constants;
use depth_bridge::{
    BridgeConfig, BridgeError, CaptureSession, DeliveryMode, OverflowPolicy, SessionState,
};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

const FD: i32 = 7;

struct Rig {
    session: CaptureSession,
    camera: SimulatedHandle,
    runtime: Arc<InProcessRuntime>,
}

fn rig_with(runtime: InProcessRuntime, config: BridgeConfig) -> Rig {
    let manager = Arc::new(SimulatedManager::single(FD));
    let camera = manager.first_handle().unwrap();
    let runtime = Arc::new(runtime);
    let session = CaptureSession::new(manager, runtime.clone(), config).unwrap();
    Rig {
        session,
        camera,
        runtime,
    }
}

fn rig() -> Rig {
    rig_with(InProcessRuntime::accept_all(), BridgeConfig::default())
}

fn descriptor() -> DeviceDescriptor {
    DeviceDescriptor::from_fd(FD)
}

fn frame(n: usize, value: f32) -> Vec<DepthPoint> {
    (0..n)
        .map(|i| DepthPoint::new(value, value + i as f32, 1.0))
        .collect()
}

#[test]
fn test_open_selects_use_case_for_rate() {
    let mut rig = rig();
    rig.session.open(&descriptor(), 10).unwrap();

    assert_eq!(rig.session.state(), SessionState::Opened);
    assert_eq!(rig.camera.use_case().as_deref(), Some("MODE_9_10FPS_1000"));
    assert_eq!(rig.camera.exposure_mode(), ExposureMode::Manual);
    assert!(rig.camera.has_listener());

    let views = rig.runtime.exposed_views();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].len(), constants::MAX_DATA_SIZE);
}

#[test]
fn test_open_with_unsupported_rate_changes_nothing() {
    let mut rig = rig();
    let err = rig.session.open(&descriptor(), 7).unwrap_err();

    assert_eq!(err, BridgeError::UnsupportedFrameRate(7));
    assert_eq!(rig.session.state(), SessionState::Closed);
    assert!(!rig.camera.is_initialized());
    assert!(!rig.camera.has_listener());
    assert!(rig.runtime.exposed_views().is_empty());

    // Still usable afterwards
    rig.session.open(&descriptor(), 15).unwrap();
    assert_eq!(rig.camera.use_case().as_deref(), Some("MODE_9_15FPS_700"));
}

#[test]
fn test_open_requires_exactly_one_camera() {
    let runtime: Arc<dyn HostRuntime> = Arc::new(InProcessRuntime::accept_all());

    let empty = Arc::new(SimulatedManager::new(Vec::new()));
    let mut session = CaptureSession::new(empty, runtime.clone(), BridgeConfig::default()).unwrap();
    assert_eq!(session.open(&descriptor(), 5), Err(BridgeError::NoDevice));

    let two = Arc::new(SimulatedManager::new(vec![
        SimulatedCamera::new("a", FD),
        SimulatedCamera::new("b", FD),
    ]));
    let mut session = CaptureSession::new(two, runtime, BridgeConfig::default()).unwrap();
    assert_eq!(session.open(&descriptor(), 5), Err(BridgeError::AmbiguousDevice(2)));
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn test_open_fails_when_use_case_missing() {
    let manager = Arc::new(SimulatedManager::new(vec![
        SimulatedCamera::new("narrow", FD).with_use_cases(&["MODE_9_5FPS_2000"]),
    ]));
    let runtime = Arc::new(InProcessRuntime::accept_all());
    let mut session = CaptureSession::new(manager, runtime, BridgeConfig::default()).unwrap();

    assert_eq!(
        session.open(&descriptor(), 10),
        Err(BridgeError::UseCaseNotFound("MODE_9_10FPS_1000".to_string()))
    );
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn test_open_twice_is_rejected() {
    let mut rig = rig();
    rig.session.open(&descriptor(), 5).unwrap();
    assert!(matches!(
        rig.session.open(&descriptor(), 5),
        Err(BridgeError::InvalidState { state: SessionState::Opened, .. })
    ));
}

#[test]
fn test_start_and_stop_out_of_order() {
    let mut rig = rig();
    assert!(rig.session.start(false).is_err());
    assert_eq!(rig.session.state(), SessionState::Closed);

    rig.session.open(&descriptor(), 5).unwrap();
    assert!(matches!(
        rig.session.stop(),
        Err(BridgeError::InvalidState { state: SessionState::Opened, .. })
    ));
    assert_eq!(rig.session.state(), SessionState::Opened);
    assert!(!rig.camera.is_capturing());
}

#[test]
fn test_device_failure_is_reported_with_status() {
    let mut rig = rig();
    rig.session.open(&descriptor(), 5).unwrap();
    rig.camera.fail(DriverOp::StartCapture, CameraStatus::DeviceIsBusy);

    let err = rig.session.start(true).unwrap_err();
    assert_eq!(
        err,
        BridgeError::Device {
            operation: "start capture",
            status: CameraStatus::DeviceIsBusy
        }
    );
    assert_eq!(rig.session.state(), SessionState::Opened);

    rig.camera.clear_faults();
    rig.session.start(true).unwrap();
    assert_eq!(rig.session.state(), SessionState::Capturing);
}

#[test]
fn test_sensor_queries_and_exposure() {
    let mut rig = rig();
    assert!(rig.session.max_width().is_err());
    assert!(rig.session.set_exposure().is_err());

    rig.session.open(&descriptor(), 5).unwrap();
    assert_eq!(rig.session.max_width(), Ok(constants::sensor::MAX_WIDTH));
    assert_eq!(rig.session.max_height(), Ok(constants::sensor::MAX_HEIGHT));

    rig.session.set_exposure().unwrap();
    assert_eq!(rig.camera.exposure_time_us(), constants::EXPOSURE_TIME_US);
}

#[test]
fn test_handler_sees_points_in_order() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let record = Arc::clone(&seen);
    let mut rig = rig_with(
        InProcessRuntime::new(move |delivery| {
            record.lock().unwrap().push(delivery.frame_bytes().to_vec());
            Ok(())
        }),
        BridgeConfig::default(),
    );
    rig.session.open(&descriptor(), 5).unwrap();
    rig.session.start(false).unwrap();

    let points = frame(5, 2.5);
    assert!(rig.camera.emit(points.clone()));

    let expected: Vec<u8> = points
        .iter()
        .flat_map(|p| [p.x, p.y, p.z])
        .flat_map(f32::to_ne_bytes)
        .collect();
    assert_eq!(*seen.lock().unwrap(), vec![expected]);
}

#[test]
fn test_timing_samples_for_delivered_frames() {
    let mut rig = rig();
    rig.session.open(&descriptor(), 5).unwrap();
    rig.session.start(true).unwrap();

    const K: usize = 12;
    for i in 0..K {
        assert!(rig.camera.emit(frame(4, i as f32)));
    }
    let samples = rig.session.stop().unwrap();

    assert_eq!(samples.len(), K);
    assert!(samples.iter().all(|s| s.start <= s.end));
    assert!(samples.windows(2).all(|w| w[0].start <= w[1].start));
    assert_eq!(rig.session.state(), SessionState::Opened);

    // A run without timing yields nothing
    rig.session.start(false).unwrap();
    rig.camera.emit(frame(4, 0.0));
    assert!(rig.session.stop().unwrap().is_empty());
}

#[test]
fn test_timing_samples_from_two_driver_threads() {
    let mut rig = rig();
    rig.session.open(&descriptor(), 15).unwrap();
    rig.session.start(true).unwrap();

    const PER_THREAD: usize = 50;
    let workers: Vec<_> = (0..2)
        .map(|t| {
            let camera = rig.camera.clone();
            thread::spawn(move || {
                for i in 0..PER_THREAD {
                    assert!(camera.emit(frame(8, (t * PER_THREAD + i) as f32)));
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
    let samples = rig.session.stop().unwrap();

    assert_eq!(samples.len(), 2 * PER_THREAD);
    assert_eq!(rig.session.stats().delivered, 2 * PER_THREAD as u64);
    assert!(samples.iter().all(|s| s.start <= s.end));
    assert!(samples.windows(2).all(|w| w[0].start <= w[1].start));
}

#[test]
fn test_handler_failure_does_not_stop_capture() {
    let mut rig = rig_with(
        InProcessRuntime::new(|delivery| {
            if delivery.sequence % 2 == 0 {
                Err("RuntimeException".to_string())
            } else {
                Ok(())
            }
        }),
        BridgeConfig::default(),
    );
    rig.session.open(&descriptor(), 5).unwrap();
    rig.session.start(true).unwrap();

    for _ in 0..6 {
        rig.camera.emit(frame(3, 1.0));
    }
    let samples = rig.session.stop().unwrap();

    let stats = rig.session.stats();
    assert_eq!(stats.handler_failures, 3);
    assert_eq!(stats.delivered, 3);
    assert_eq!(samples.len(), 3);
}

#[test]
fn test_oversized_frame_is_rejected() {
    let config = BridgeConfig {
        max_points: 16,
        ..BridgeConfig::default()
    };
    let mut rig = rig_with(InProcessRuntime::accept_all(), config);
    rig.session.open(&descriptor(), 5).unwrap();
    rig.session.start(false).unwrap();

    rig.camera.emit(frame(16, 0.0));
    rig.camera.emit(frame(17, 0.0));

    let stats = rig.session.stats();
    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.overflow_rejects, 1);
    assert_eq!(rig.runtime.counters().invocations, 1);
}

#[test]
fn test_oversized_frame_is_truncated() {
    let config = BridgeConfig {
        max_points: 16,
        overflow_policy: OverflowPolicy::Truncate,
        ..BridgeConfig::default()
    };
    let counts = Arc::new(Mutex::new(Vec::new()));
    let record = Arc::clone(&counts);
    let mut rig = rig_with(
        InProcessRuntime::new(move |delivery| {
            record.lock().unwrap().push(delivery.point_count);
            Ok(())
        }),
        config,
    );
    rig.session.open(&descriptor(), 5).unwrap();
    rig.session.start(false).unwrap();
    rig.camera.emit(frame(40, 0.0));

    assert_eq!(*counts.lock().unwrap(), vec![16]);
    assert_eq!(rig.session.stats().truncated_frames, 1);
}

#[test]
fn test_concurrent_driver_threads_never_see_torn_frames() {
    let torn = Arc::new(Mutex::new(0usize));
    let record = Arc::clone(&torn);
    let mut rig = rig_with(
        InProcessRuntime::new(move |delivery| {
            // Every point of a frame carries the emitting thread's value in x
            let xs: Vec<f32> = delivery
                .frame_bytes()
                .chunks_exact(constants::BYTES_PER_POINT)
                .map(|p| f32::from_ne_bytes([p[0], p[1], p[2], p[3]]))
                .collect();
            if xs.windows(2).any(|w| w[0] != w[1]) {
                *record.lock().unwrap() += 1;
            }
            thread::yield_now();
            Ok(())
        }),
        BridgeConfig::default(),
    );
    rig.session.open(&descriptor(), 5).unwrap();
    rig.session.start(false).unwrap();

    let drivers: Vec<_> = (0..4)
        .map(|t| {
            let camera = rig.camera.clone();
            thread::spawn(move || {
                for _ in 0..25 {
                    camera.emit(frame(64, t as f32));
                }
            })
        })
        .collect();
    for driver in drivers {
        driver.join().unwrap();
    }
    rig.session.stop().unwrap();

    assert_eq!(*torn.lock().unwrap(), 0);
    assert_eq!(rig.session.stats().delivered, 100);
    let counters = rig.runtime.counters();
    assert_eq!(counters.attaches, 4);
    assert_eq!(counters.detaches, 4);
}

#[test]
fn test_attach_failure_drops_frame_and_retries() {
    let mut rig = rig();
    rig.session.open(&descriptor(), 5).unwrap();
    rig.session.start(false).unwrap();

    rig.runtime.set_fail_attach(true);
    rig.camera.emit(frame(2, 0.0));
    rig.runtime.set_fail_attach(false);
    rig.camera.emit(frame(2, 0.0));

    let stats = rig.session.stats();
    assert_eq!(stats.attach_failures, 1);
    assert_eq!(stats.delivered, 1);
}

#[test]
fn test_queued_delivery_drops_under_backpressure() {
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let release_rx = Mutex::new(release_rx);
    let config = BridgeConfig {
        delivery: DeliveryMode::Queued,
        handoff_depth: 2,
        ..BridgeConfig::default()
    };
    let mut rig = rig_with(
        InProcessRuntime::new(move |_| {
            let _ = release_rx.lock().unwrap().recv();
            Ok(())
        }),
        config,
    );
    rig.session.open(&descriptor(), 5).unwrap();
    rig.session.start(false).unwrap();

    for _ in 0..4 {
        assert!(rig.camera.emit(frame(8, 0.0)));
    }
    assert_eq!(rig.session.stats().backpressure_drops, 2);

    release_tx.send(()).unwrap();
    release_tx.send(()).unwrap();
    rig.session.close();

    let stats = rig.session.stats();
    assert_eq!(stats.delivered, 2);
    assert_eq!(stats.backpressure_drops, 2);
    // Only the dispatch thread attached
    assert_eq!(rig.runtime.counters().attaches, 1);
}

#[test]
fn test_close_from_capturing() {
    let mut rig = rig();
    rig.session.open(&descriptor(), 5).unwrap();
    rig.session.start(true).unwrap();
    rig.session.close();

    assert_eq!(rig.session.state(), SessionState::Closed);
    assert!(!rig.camera.is_capturing());
    assert!(!rig.camera.has_listener());
    assert!(!rig.camera.emit(frame(1, 0.0)));
    assert!(rig.runtime.exposed_views().is_empty());

    // Closing again is harmless, reopening works
    rig.session.close();
    rig.session.open(&descriptor(), 10).unwrap();
    assert_eq!(rig.runtime.exposed_views().len(), 1);
}

#[test]
fn test_sessions_are_independent() {
    let manager = Arc::new(SimulatedManager::new(vec![
        SimulatedCamera::new("left", 10),
        SimulatedCamera::new("right", 11),
    ]));
    let left_runtime = Arc::new(InProcessRuntime::accept_all());
    let right_runtime = Arc::new(InProcessRuntime::accept_all());

    let mut left =
        CaptureSession::new(manager.clone(), left_runtime.clone(), BridgeConfig::default()).unwrap();
    let mut right =
        CaptureSession::new(manager.clone(), right_runtime.clone(), BridgeConfig::default())
            .unwrap();
    left.open(&DeviceDescriptor::from_fd(10), 5).unwrap();
    right.open(&DeviceDescriptor::from_fd(11), 15).unwrap();
    left.start(false).unwrap();
    right.start(false).unwrap();

    manager.handle("left").unwrap().emit(frame(3, 0.0));
    drop(left);

    manager.handle("right").unwrap().emit(frame(3, 0.0));
    assert_eq!(right.stats().delivered, 1);
    assert_eq!(left_runtime.counters().invocations, 1);
    assert_eq!(right_runtime.counters().invocations, 1);
}

#[test]
fn test_sessions_sharing_a_runtime_are_independent() {
    let manager = Arc::new(SimulatedManager::new(vec![
        SimulatedCamera::new("left", 10),
        SimulatedCamera::new("right", 11),
    ]));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let handler_seen = Arc::clone(&seen);
    let runtime = Arc::new(InProcessRuntime::new(move |delivery| {
        handler_seen
            .lock()
            .unwrap()
            .push((delivery.view, delivery.frame_bytes().to_vec()));
        Ok(())
    }));

    let mut left =
        CaptureSession::new(manager.clone(), runtime.clone(), BridgeConfig::default()).unwrap();
    let mut right =
        CaptureSession::new(manager.clone(), runtime.clone(), BridgeConfig::default()).unwrap();
    left.open(&DeviceDescriptor::from_fd(10), 5).unwrap();
    right.open(&DeviceDescriptor::from_fd(11), 15).unwrap();
    assert_eq!(runtime.exposed_views().len(), 2);
    left.start(false).unwrap();
    right.start(false).unwrap();

    let left_frame = frame(2, 1.0);
    let right_frame = frame(3, 2.0);
    assert!(manager.handle("left").unwrap().emit(left_frame.clone()));
    assert!(manager.handle("right").unwrap().emit(right_frame.clone()));

    let (left_stats, right_stats) = (left.stats(), right.stats());
    assert_eq!(left_stats.delivered, 1);
    assert_eq!(left_stats.handler_failures, 0);
    assert_eq!(right_stats.delivered, 1);
    assert_eq!(right_stats.handler_failures, 0);

    // Each handler call saw its own session's buffer and points
    let bytes = |points: &[DepthPoint]| -> Vec<u8> {
        points
            .iter()
            .flat_map(|p| [p.x, p.y, p.z])
            .flat_map(f32::to_ne_bytes)
            .collect()
    };
    {
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_ne!(seen[0].0, seen[1].0);
        assert_eq!(seen[0].1, bytes(&left_frame));
        assert_eq!(seen[1].1, bytes(&right_frame));
    }

    // Closing one session leaves the other delivering
    left.close();
    assert_eq!(runtime.exposed_views().len(), 1);
    assert!(manager.handle("right").unwrap().emit(right_frame));
    assert_eq!(right.stats().delivered, 2);
    assert_eq!(right.stats().handler_failures, 0);

    right.close();
    assert!(runtime.exposed_views().is_empty());
    assert_eq!(runtime.counters().invocations, 3);
}

#[test]
fn test_point_layout() {
    let rig = rig();
    let layout = rig.session.point_layout();
    let offsets: Vec<u32> = layout.fields.iter().map(|f| f.offset).collect();
    assert_eq!(offsets, vec![0, 4, 8]);
    assert_eq!(layout.point_step, 12);
    assert_eq!(layout.max_points, constants::MAX_POINTS);
}
