// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

/// Timeouts used while opening and reading capture sources
pub mod timing {
    /// Frames are discarded for this long after a source opens, letting driver
    /// queues drain and auto-exposure settle
    pub const WARMUP_MS: u64 = 600;

    /// Upper bound for the single validation read after warmup
    pub const VALIDATION_TIMEOUT_MS: u64 = 500;

    /// How long a direct device read blocks waiting for a filled buffer
    pub const FRAME_TIMEOUT_MS: u64 = 1000;

    /// How long to wait for a GStreamer pipeline to reach PLAYING
    pub const STATE_CHANGE_TIMEOUT_MS: u64 = 3000;
}

/// Kernel buffer pool sizing
pub mod buffers {
    /// Number of mmap buffers requested from the driver
    pub const DEFAULT_COUNT: u32 = 4;

    /// Fewest buffers that still allow double-buffering
    pub const MIN_COUNT: u32 = 2;
}

/// Capture defaults when nothing is configured
pub mod defaults {
    pub const WIDTH: u32 = 640;
    pub const HEIGHT: u32 = 480;
    pub const FPS: u32 = 30;

    /// Number of logical slots the CLI resolves when none are named
    pub const SLOT_COUNT: u32 = 2;

    /// Number of slots (0 through 7) scanned for per-slot environment overrides
    pub const MAX_ENV_SLOTS: u32 = 8;
}

/// Source string prefixes
pub mod paths {
    /// Conventional V4L2 device node prefix; the slot index is appended
    pub const VIDEO_DEVICE_PREFIX: &str = "/dev/video";

    /// Any path under this directory is treated as a device path
    pub const DEVICE_DIR_PREFIX: &str = "/dev/";

    /// Explicit direct-device scheme, stripped before opening
    pub const V4L2_SCHEME: &str = "v4l2:";

    /// Explicit pipeline scheme, stripped before parsing
    pub const GST_SCHEME: &str = "gst:";
}

/// GStreamer pipeline fragments
pub mod pipeline {
    /// Sink appended to every generated pipeline; the backend looks it up by name
    pub const APPSINK: &str = "appsink name=sink max-buffers=1 drop=true sync=false";

    /// Build a libcamera pipeline for `selector` (e.g. `camera-id=0`)
    pub fn libcamera(selector: &str, width: u32, height: u32, fps: u32) -> String {
        format!(
            "libcamerasrc {} ! video/x-raw,width={},height={},framerate={}/1,format=YUY2 \
             ! videoconvert ! video/x-raw,format=BGR ! {}",
            selector, width, height, fps, APPSINK
        )
    }
}

/// Application information utilities
pub mod app_info {
    /// Get the application version from build-time environment
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }
}
