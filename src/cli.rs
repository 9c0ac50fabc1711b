// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for the depth bridge
//!
//! This module provides command-line functionality for:
//! - Listing the supported frame rates
//! - Showing the effective configuration
//! - Running a capture cycle against the simulated driver

use depth_bridge::backends::driver::DeviceDescriptor;
use depth_bridge::backends::driver::simulated::{SimulatedCamera, SimulatedManager, StreamMode};
use depth_bridge::backends::host::InProcessRuntime;
use depth_bridge::bridge::TimingSample;
use depth_bridge::{BridgeConfig, CaptureSession, DeliveryMode, FrameRate};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Descriptor the simulated camera is reachable through
const SIMULATED_FD: i32 = 3;

/// Options of the `capture` command
pub struct CaptureOptions {
    pub rate: Option<u32>,
    pub seconds: u64,
    pub frames: Option<u64>,
    pub timing: bool,
    pub queued: bool,
}

fn load_config(path: Option<&Path>) -> Result<BridgeConfig, Box<dyn std::error::Error>> {
    Ok(match path {
        Some(path) => BridgeConfig::load(path)?,
        None => BridgeConfig::load_default()?,
    })
}

/// List the supported frame-rate keys
pub fn list_modes() -> Result<(), Box<dyn std::error::Error>> {
    println!("Supported frame rates:");
    println!();
    for rate in FrameRate::ALL {
        println!("  {:>2}  {:<20} {}", rate.key(), rate.use_case(), rate.description());
    }
    Ok(())
}

/// Print the effective configuration as JSON
pub fn show_config(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(path)?;
    if path.is_none() {
        if let Some(default_path) = BridgeConfig::default_path() {
            println!("# {}", default_path.display());
        }
    }
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Open the simulated camera, capture, and print delivery statistics
pub fn capture(
    options: CaptureOptions,
    config_path: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(config_path)?;
    if options.queued {
        config.delivery = DeliveryMode::Queued;
    }
    let rate = options.rate.unwrap_or(config.frame_rate);

    let manager = Arc::new(SimulatedManager::new(vec![
        SimulatedCamera::new("sim-0001", SIMULATED_FD).with_stream(StreamMode::Paced {
            max_frames: options.frames,
        }),
    ]));
    let source = manager
        .first_handle()
        .ok_or("simulated driver has no camera")?;

    let points_seen = Arc::new(AtomicU64::new(0));
    let handler_points = Arc::clone(&points_seen);
    let runtime = Arc::new(InProcessRuntime::new(move |delivery| {
        handler_points.fetch_add(delivery.point_count as u64, Ordering::Relaxed);
        Ok(())
    }));

    let mut session = CaptureSession::new(manager, runtime, config)?;
    session.open(&DeviceDescriptor::from_fd(SIMULATED_FD), rate)?;
    session.set_exposure()?;

    println!("Sensor: {}x{}", session.max_width()?, session.max_height()?);
    if let Some((camera, frame_rate)) = session.camera() {
        println!("Camera: {} ({})", camera, frame_rate.description());
    }

    println!();
    println!("Capturing... (press Ctrl+C to stop early)");
    session.start(options.timing)?;

    // Set up Ctrl+C handler
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    let start = Instant::now();
    let target_duration = Duration::from_secs(options.seconds);
    while start.elapsed() < target_duration {
        if stop_flag.load(Ordering::SeqCst) {
            println!();
            println!("Stopping early...");
            break;
        }
        if options
            .frames
            .is_some_and(|max| source.frames_emitted() >= max)
        {
            break;
        }

        print!("\rFrames: {}", session.stats().delivered);
        std::io::Write::flush(&mut std::io::stdout())?;
        std::thread::sleep(Duration::from_millis(100));
    }
    println!();

    let samples = session.stop()?;
    session.close();

    if options.timing {
        print_timing(&samples);
    }
    println!("Points delivered: {}", points_seen.load(Ordering::Relaxed));
    println!("{}", serde_json::to_string_pretty(&session.stats())?);

    Ok(())
}

fn print_timing(samples: &[TimingSample]) {
    if samples.is_empty() {
        println!("No timing samples recorded");
        return;
    }

    let micros: Vec<i64> = samples
        .iter()
        .filter_map(|s| s.duration().num_microseconds())
        .collect();
    let total: i64 = micros.iter().sum();
    let max = micros.iter().copied().max().unwrap_or(0);
    println!(
        "Timing: {} samples, mean {} us, max {} us",
        samples.len(),
        total / micros.len().max(1) as i64,
        max
    );
}
