// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for configuration module

use slotcam::config::{CaptureConfig, CapturePriority, SlotOverrides};
use std::time::Duration;

#[test]
fn test_config_default() {
    let config = CaptureConfig::default();

    assert_eq!(config.priority, CapturePriority::Unset);
    assert!(config.slots.is_empty());
    assert_eq!((config.capture_width, config.capture_height), (640, 480));
    assert_eq!(config.pipeline_fps, 30);
    assert!(
        config.generic_fallback,
        "GStreamer fallback should be enabled by default"
    );
}

#[test]
fn test_partial_json_keeps_defaults() {
    let json = r#"{
        "priority": "direct-only",
        "capture_width": 1280,
        "slots": { "1": { "device_path": "/dev/video6" } }
    }"#;
    let config: CaptureConfig = serde_json::from_str(json).unwrap();

    assert_eq!(config.priority, CapturePriority::DirectOnly);
    assert_eq!(config.capture_width, 1280);
    assert_eq!(config.capture_height, 480);
    assert_eq!(
        config.slot(1),
        Some(&SlotOverrides {
            device_path: Some("/dev/video6".to_string()),
            ..SlotOverrides::default()
        })
    );
}

#[test]
fn test_load_from_file() {
    let path = std::env::temp_dir().join(format!("slotcam-config-{}.json", std::process::id()));
    std::fs::write(&path, r#"{ "warmup_ms": 100, "validation_timeout_ms": 50 }"#).unwrap();

    let config = CaptureConfig::load(&path).unwrap();
    std::fs::remove_file(&path).ok();

    let options = config.resolver_options();
    assert_eq!(options.warmup, Duration::from_millis(100));
    assert_eq!(options.read_timeout, Duration::from_millis(50));
}

#[test]
fn test_load_missing_file_is_config_error() {
    let err = CaptureConfig::load(std::path::Path::new("/nonexistent/slotcam.json")).unwrap_err();
    assert!(matches!(err, slotcam::CaptureError::Config(_)));
}

#[test]
fn test_env_overrides_file_values() {
    let mut config = CaptureConfig::default();
    config.slot_mut(0).pipeline = Some("from-file ! appsink".to_string());

    config.apply_env(|key| match key {
        "GST_PIPELINE_CAM0" => Some("from-env ! appsink".to_string()),
        "CAP_PRIORITY" => Some("V4L2".to_string()),
        "CAP_FPS" => Some("15".to_string()),
        _ => None,
    });

    assert_eq!(
        config.slot(0).and_then(|s| s.pipeline.as_deref()),
        Some("from-env ! appsink")
    );
    assert_eq!(config.priority, CapturePriority::DirectOnly);
    assert_eq!(config.request().fps, 15.0);
}
