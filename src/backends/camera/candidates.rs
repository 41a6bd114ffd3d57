// SPDX-License-Identifier: GPL-3.0-only

//! Ordered capture sources for a logical camera slot
//!
//! Explicit overrides come first, then the platform's default device for the
//! slot, then libcamera pipelines depending on [`CapturePriority`].

use tracing::debug;

use super::types::CaptureSource;
use crate::config::{CaptureConfig, CapturePriority};
use crate::constants::{paths, pipeline};

/// What kind of default sources a platform offers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Cameras appear as `/dev/videoN` nodes
    DeviceNodes,
    /// Cameras are reachable by index only
    IndexOnly,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "linux") {
            Platform::DeviceNodes
        } else {
            Platform::IndexOnly
        }
    }
}

/// Candidates for `slot` on the current platform
pub fn build(slot: u32, config: &CaptureConfig) -> Vec<CaptureSource> {
    build_for(slot, config, Platform::current())
}

/// Candidates for `slot`, most specific first
pub fn build_for(slot: u32, config: &CaptureConfig, platform: Platform) -> Vec<CaptureSource> {
    let overrides = config.slot(slot);
    let pipelines_allowed = config.priority != CapturePriority::DirectOnly;
    let mut candidates = Vec::new();

    if pipelines_allowed
        && let Some(spec) = overrides.and_then(|o| non_empty(o.pipeline.as_deref()))
    {
        candidates.push(CaptureSource::pipeline(spec));
    }

    if let Some(path) = overrides.and_then(|o| non_empty(o.device_path.as_deref())) {
        candidates.push(CaptureSource::device_path(path));
    }

    if pipelines_allowed
        && let Some(name) = overrides.and_then(|o| non_empty(o.camera_name.as_deref()))
    {
        let selector = format!("camera-name={}", name);
        candidates.push(libcamera_source(&selector, config));
    }

    if config.priority == CapturePriority::PipelinePreferred {
        candidates.push(camera_id_source(slot, config));
    }

    candidates.push(CaptureSource::index(slot));
    if platform == Platform::DeviceNodes {
        candidates.push(CaptureSource::device_path(format!(
            "{}{}",
            paths::VIDEO_DEVICE_PREFIX,
            slot
        )));
    }

    if config.priority == CapturePriority::Unset {
        candidates.push(camera_id_source(slot, config));
    }

    debug!(
        slot,
        priority = ?config.priority,
        candidates = ?candidates.iter().map(|c| c.to_string()).collect::<Vec<_>>(),
        "Built capture candidates"
    );
    candidates
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn camera_id_source(slot: u32, config: &CaptureConfig) -> CaptureSource {
    libcamera_source(&format!("camera-id={}", slot), config)
}

fn libcamera_source(selector: &str, config: &CaptureConfig) -> CaptureSource {
    CaptureSource::pipeline(pipeline::libcamera(
        selector,
        config.pipeline_width,
        config.pipeline_height,
        config.pipeline_fps,
    ))
}
