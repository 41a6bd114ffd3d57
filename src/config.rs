// SPDX-License-Identifier: GPL-3.0-only

//! Capture configuration
//!
//! Layered as defaults, then an optional JSON file, then environment
//! variables, then command-line flags. The environment is read once into a
//! [`CaptureConfig`]; nothing downstream looks at process state.

use crate::backends::camera::{BackendOptions, CaptureRequest, ResolverOptions};
use crate::constants::{buffers, defaults, timing};
use crate::errors::{CaptureError, CaptureResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Which kind of source is tried first for a slot
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CapturePriority {
    /// Device nodes and indices only; every pipeline source is skipped
    DirectOnly,
    /// A libcamera pipeline is tried ahead of the default device
    PipelinePreferred,
    /// Default device first, libcamera pipeline as the last resort
    #[default]
    Unset,
}

impl CapturePriority {
    /// Interpret a free-form priority string such as `v4l2` or `libcamera`
    pub fn parse(value: &str) -> Self {
        let value = value.trim().to_ascii_lowercase();
        if value.contains("v4l2") || value.contains("direct") {
            CapturePriority::DirectOnly
        } else if value.contains("libcamera") || value.contains("gst") || value.contains("pipeline")
        {
            CapturePriority::PipelinePreferred
        } else {
            CapturePriority::Unset
        }
    }
}

/// Explicit sources for one slot
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotOverrides {
    /// GStreamer pipeline description
    pub pipeline: Option<String>,
    /// Device path such as `/dev/video2`
    pub device_path: Option<String>,
    /// libcamera camera name, expanded into a pipeline
    pub camera_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub priority: CapturePriority,
    /// Per-slot overrides keyed by slot index
    pub slots: BTreeMap<u32, SlotOverrides>,
    /// Geometry used in generated libcamera pipelines
    pub pipeline_width: u32,
    pub pipeline_height: u32,
    pub pipeline_fps: u32,
    /// Geometry requested from capture devices
    pub capture_width: u32,
    pub capture_height: u32,
    pub capture_fps: f64,
    pub warmup_ms: u64,
    pub validation_timeout_ms: u64,
    pub frame_timeout_ms: u64,
    pub buffer_count: u32,
    /// Retry device paths and indices through GStreamer when direct capture fails
    pub generic_fallback: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            priority: CapturePriority::default(),
            slots: BTreeMap::new(),
            pipeline_width: defaults::WIDTH,
            pipeline_height: defaults::HEIGHT,
            pipeline_fps: defaults::FPS,
            capture_width: defaults::WIDTH,
            capture_height: defaults::HEIGHT,
            capture_fps: defaults::FPS as f64,
            warmup_ms: timing::WARMUP_MS,
            validation_timeout_ms: timing::VALIDATION_TIMEOUT_MS,
            frame_timeout_ms: timing::FRAME_TIMEOUT_MS,
            buffer_count: buffers::DEFAULT_COUNT,
            generic_fallback: true,
        }
    }
}

impl CaptureConfig {
    /// Default config file location (`~/.config/slotcam/config.json`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("slotcam").join("config.json"))
    }

    /// Load from a JSON file; missing keys take their defaults
    pub fn load(path: &Path) -> CaptureResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| CaptureError::Config(format!("{}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&text)?;
        debug!(path = %path.display(), "Loaded capture config");
        Ok(config)
    }

    /// Load `path` if given, else the default file if it exists, else defaults
    pub fn load_or_default(path: Option<&Path>) -> CaptureResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::load(&path),
                None => Ok(Self::default()),
            },
        }
    }

    /// Overrides for `slot`, if any were configured
    pub fn slot(&self, slot: u32) -> Option<&SlotOverrides> {
        self.slots.get(&slot)
    }

    pub fn slot_mut(&mut self, slot: u32) -> &mut SlotOverrides {
        self.slots.entry(slot).or_default()
    }

    /// Overlay the process environment
    pub fn apply_process_env(&mut self) {
        self.apply_env(|key| std::env::var(key).ok());
    }

    /// Overlay environment variables read through `lookup`
    ///
    /// Unset, blank and out-of-range values leave the current setting alone.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(value) = get("CAP_PRIORITY") {
            self.priority = CapturePriority::parse(&value);
        }

        for slot in 0..defaults::MAX_ENV_SLOTS {
            if let Some(value) = get(&format!("GST_PIPELINE_CAM{}", slot)) {
                self.slot_mut(slot).pipeline = Some(value);
            }
            if let Some(value) = get(&format!("DEV_VIDEO_CAM{}", slot)) {
                self.slot_mut(slot).device_path = Some(value);
            }
            if let Some(value) = get(&format!("GST_CAMERA_NAME_CAM{}", slot)) {
                self.slot_mut(slot).camera_name = Some(value);
            }
        }

        let positive = |key: &str| {
            get(key)
                .and_then(|v| v.trim().parse::<u32>().ok())
                .filter(|v| *v > 0)
        };
        if let Some(v) = positive("GST_WIDTH") {
            self.pipeline_width = v;
        }
        if let Some(v) = positive("GST_HEIGHT") {
            self.pipeline_height = v;
        }
        if let Some(v) = positive("GST_FPS") {
            self.pipeline_fps = v;
        }
        if let Some(v) = positive("CAP_WIDTH") {
            self.capture_width = v;
        }
        if let Some(v) = positive("CAP_HEIGHT") {
            self.capture_height = v;
        }
        if let Some(v) = get("CAP_FPS")
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| *v > 1.0)
        {
            self.capture_fps = v;
        }

        debug!(priority = ?self.priority, slots = self.slots.len(), "Applied environment");
    }

    /// Geometry to request from capture sources
    pub fn request(&self) -> CaptureRequest {
        CaptureRequest {
            width: self.capture_width,
            height: self.capture_height,
            fps: self.capture_fps,
        }
    }

    pub fn resolver_options(&self) -> ResolverOptions {
        ResolverOptions {
            warmup: Duration::from_millis(self.warmup_ms),
            read_timeout: Duration::from_millis(self.validation_timeout_ms),
        }
    }

    pub fn backend_options(&self) -> BackendOptions {
        let frame_timeout = Duration::from_millis(self.frame_timeout_ms);
        let mut options = BackendOptions {
            generic_fallback: self.generic_fallback,
            ..BackendOptions::default()
        };
        options.generic.frame_timeout = frame_timeout;
        #[cfg(target_os = "linux")]
        {
            options.direct.frame_timeout = frame_timeout;
            options.direct.buffer_count = self.buffer_count.max(buffers::MIN_COUNT);
        }
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!(CapturePriority::parse("v4l2"), CapturePriority::DirectOnly);
        assert_eq!(
            CapturePriority::parse("LibCamera"),
            CapturePriority::PipelinePreferred
        );
        assert_eq!(
            CapturePriority::parse("gstreamer"),
            CapturePriority::PipelinePreferred
        );
        assert_eq!(CapturePriority::parse("auto"), CapturePriority::Unset);
    }

    #[test]
    fn test_apply_env_slots_and_geometry() {
        let vars = env(&[
            ("CAP_PRIORITY", "libcamera"),
            ("GST_PIPELINE_CAM1", "gst:videotestsrc ! appsink"),
            ("DEV_VIDEO_CAM0", "/dev/video4"),
            ("GST_CAMERA_NAME_CAM0", ""),
            ("GST_WIDTH", "1280"),
            ("GST_HEIGHT", "0"),
            ("CAP_FPS", "1"),
            ("CAP_WIDTH", "abc"),
        ]);
        let mut config = CaptureConfig::default();
        config.apply_env(|key| vars.get(key).cloned());

        assert_eq!(config.priority, CapturePriority::PipelinePreferred);
        assert_eq!(
            config.slot(1).and_then(|s| s.pipeline.as_deref()),
            Some("gst:videotestsrc ! appsink")
        );
        assert_eq!(
            config.slot(0).and_then(|s| s.device_path.as_deref()),
            Some("/dev/video4")
        );
        assert_eq!(config.slot(0).and_then(|s| s.camera_name.as_deref()), None);
        assert_eq!(config.pipeline_width, 1280);
        assert_eq!(config.pipeline_height, defaults::HEIGHT);
        assert_eq!(config.capture_fps, defaults::FPS as f64);
        assert_eq!(config.capture_width, defaults::WIDTH);
    }

    #[test]
    fn test_env_slot_scan_covers_slots_zero_through_seven() {
        let last = defaults::MAX_ENV_SLOTS - 1;
        let inside = format!("DEV_VIDEO_CAM{}", last);
        let outside = format!("DEV_VIDEO_CAM{}", defaults::MAX_ENV_SLOTS);
        let vars = env(&[(inside.as_str(), "/dev/video7"), (outside.as_str(), "/dev/video8")]);
        let mut config = CaptureConfig::default();
        config.apply_env(|key| vars.get(key).cloned());

        assert_eq!(
            config.slot(last).and_then(|s| s.device_path.as_deref()),
            Some("/dev/video7")
        );
        assert!(config.slot(defaults::MAX_ENV_SLOTS).is_none());
    }

    #[test]
    fn test_backend_options_follow_config() {
        let mut config = CaptureConfig::default();
        config.frame_timeout_ms = 250;
        config.generic_fallback = false;
        let options = config.backend_options();
        assert!(!options.generic_fallback);
        assert_eq!(options.generic.frame_timeout, Duration::from_millis(250));
    }
}
