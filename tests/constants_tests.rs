// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for constants module

use slotcam::constants::{buffers, paths, pipeline, timing};

#[test]
fn test_buffer_counts() {
    // Double-buffering needs at least two
    assert!(buffers::MIN_COUNT >= 2);
    assert!(buffers::DEFAULT_COUNT >= buffers::MIN_COUNT);
}

#[test]
fn test_validation_shorter_than_frame_timeout() {
    assert!(timing::VALIDATION_TIMEOUT_MS <= timing::FRAME_TIMEOUT_MS);
    assert!(timing::WARMUP_MS > 0);
}

#[test]
fn test_appsink_is_named_sink() {
    assert!(pipeline::APPSINK.starts_with("appsink name=sink"));
}

#[test]
fn test_schemes_end_with_colon() {
    assert!(paths::V4L2_SCHEME.ends_with(':'));
    assert!(paths::GST_SCHEME.ends_with(':'));
    assert!(paths::VIDEO_DEVICE_PREFIX.starts_with(paths::DEVICE_DIR_PREFIX));
}
