// SPDX-License-Identifier: MPL-2.0

//! Integration tests for configuration module

use depth_bridge::backends::driver::simulated::SimulatedManager;
use depth_bridge::backends::host::InProcessRuntime;
use depth_bridge::{BridgeConfig, BridgeError, CaptureSession, DeliveryMode, OverflowPolicy, constants};
use std::sync::Arc;
use std::path::PathBuf;

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir()
        .join(format!("depth-bridge-test-{}", std::process::id()))
        .join(name)
}

#[test]
fn test_config_default() {
    let config = BridgeConfig::default();

    assert_eq!(config.frame_rate, 5);
    assert_eq!(config.exposure_time_us, 450);
    assert_eq!(config.max_points, 38_304);
    assert_eq!(config.overflow_policy, OverflowPolicy::Reject);
    assert_eq!(config.delivery, DeliveryMode::Synchronous);
    assert!(config.validate().is_ok());
}

#[test]
fn test_partial_file_uses_defaults() {
    let config: BridgeConfig =
        serde_json::from_str(r#"{ "delivery": "queued", "overflow_policy": "truncate" }"#).unwrap();

    assert_eq!(config.delivery, DeliveryMode::Queued);
    assert_eq!(config.overflow_policy, OverflowPolicy::Truncate);
    assert_eq!(config.handoff_depth, 4);
    assert_eq!(config.attach_thread_name, "depth-bridge");
}

#[test]
fn test_validate_rejects_bad_values() {
    let mut config = BridgeConfig::default();
    config.frame_rate = 7;
    assert!(matches!(config.validate(), Err(BridgeError::Config(_))));

    let mut config = BridgeConfig::default();
    config.max_points = 0;
    assert!(config.validate().is_err());

    let mut config = BridgeConfig::default();
    config.handoff_depth = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_max_points_is_bounded_by_sensor() {
    let mut config = BridgeConfig::default();
    config.max_points = constants::MAX_POINTS;
    assert!(config.validate().is_ok());

    config.max_points = constants::MAX_POINTS + 1;
    assert!(matches!(config.validate(), Err(BridgeError::Config(_))));

    config.max_points = usize::MAX / 2;
    assert!(matches!(config.validate(), Err(BridgeError::Config(_))));
}

#[test]
fn test_exposure_time_is_bounded() {
    let mut config = BridgeConfig::default();
    config.exposure_time_us = constants::MAX_EXPOSURE_TIME_US;
    assert!(config.validate().is_ok());
    config.exposure_time_us = 1;
    assert!(config.validate().is_ok());

    config.exposure_time_us = 0;
    assert!(matches!(config.validate(), Err(BridgeError::Config(_))));

    config.exposure_time_us = constants::MAX_EXPOSURE_TIME_US + 1;
    assert!(matches!(config.validate(), Err(BridgeError::Config(_))));
}

#[test]
fn test_session_refuses_oversized_buffer_config() {
    let config = BridgeConfig {
        max_points: usize::MAX / 2,
        ..BridgeConfig::default()
    };
    let result = CaptureSession::new(
        Arc::new(SimulatedManager::new(Vec::new())),
        Arc::new(InProcessRuntime::accept_all()),
        config,
    );
    assert!(matches!(result, Err(BridgeError::Config(_))));
}

#[test]
fn test_oversized_file_is_rejected_on_load() {
    let path = temp_path("oversized.json");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, r#"{ "max_points": 9223372036854775807 }"#).unwrap();

    assert!(matches!(BridgeConfig::load(&path), Err(BridgeError::Config(_))));
    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_missing_file_yields_defaults() {
    let config = BridgeConfig::load(&temp_path("does-not-exist.json")).unwrap();
    assert_eq!(config, BridgeConfig::default());
}

#[test]
fn test_save_and_load() {
    let path = temp_path("saved.json");
    let mut config = BridgeConfig::default();
    config.frame_rate = 15;
    config.delivery = DeliveryMode::Queued;

    config.save(&path).unwrap();
    assert_eq!(BridgeConfig::load(&path).unwrap(), config);
    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_malformed_file_is_an_error() {
    let path = temp_path("malformed.json");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "{ not json").unwrap();

    assert!(matches!(BridgeConfig::load(&path), Err(BridgeError::Config(_))));
    let _ = std::fs::remove_file(&path);
}
