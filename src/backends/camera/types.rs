// SPDX-License-Identifier: GPL-3.0-only
// Shared types for camera backend abstraction

//! Shared types for capture backends

use crate::constants::{defaults, paths};
use crate::errors::{CaptureError, CaptureResult};
use crate::media::decoders::converters::swap_red_blue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a [`CaptureSource`] spec string is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    /// GStreamer pipeline description, used verbatim
    Pipeline,
    /// OS device path such as `/dev/video2`
    DevicePath,
    /// Numeric capture index rendered as decimal text
    Index,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Pipeline => write!(f, "pipeline"),
            SourceKind::DevicePath => write!(f, "device"),
            SourceKind::Index => write!(f, "index"),
        }
    }
}

/// One way of reaching a camera; immutable once built
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaptureSource {
    spec: String,
    kind: SourceKind,
}

impl CaptureSource {
    /// Pipeline source; a leading `gst:` scheme is stripped
    pub fn pipeline(spec: impl Into<String>) -> Self {
        let spec = spec.into();
        let spec = match spec.strip_prefix(paths::GST_SCHEME) {
            Some(rest) => rest.to_string(),
            None => spec,
        };
        Self {
            spec,
            kind: SourceKind::Pipeline,
        }
    }

    /// Device path source; a leading `v4l2:` scheme is stripped
    pub fn device_path(path: impl Into<String>) -> Self {
        let path = path.into();
        let path = match path.strip_prefix(paths::V4L2_SCHEME) {
            Some(rest) => rest.to_string(),
            None => path,
        };
        Self {
            spec: path,
            kind: SourceKind::DevicePath,
        }
    }

    /// Numeric index source
    pub fn index(index: u32) -> Self {
        Self {
            spec: index.to_string(),
            kind: SourceKind::Index,
        }
    }

    /// Classify a free-form source string
    ///
    /// A decimal integer (optionally signed) is an index, a `/dev/` or `v4l2:`
    /// prefix is a device path, and `gst:` or any `!` stage operator marks a
    /// pipeline. Anything else cannot be opened.
    pub fn parse(spec: &str) -> CaptureResult<Self> {
        let trimmed = spec.trim();

        if trimmed.starts_with(paths::GST_SCHEME) {
            return Ok(Self::pipeline(trimmed));
        }
        if trimmed.parse::<i64>().is_ok() {
            return Ok(Self {
                spec: trimmed.to_string(),
                kind: SourceKind::Index,
            });
        }
        if trimmed.starts_with(paths::V4L2_SCHEME) || trimmed.starts_with(paths::DEVICE_DIR_PREFIX)
        {
            return Ok(Self::device_path(trimmed));
        }
        if trimmed.contains('!') {
            return Ok(Self::pipeline(trimmed));
        }

        Err(CaptureError::OpenFailure(format!(
            "unrecognized source '{}'",
            spec
        )))
    }

    pub fn spec(&self) -> &str {
        &self.spec
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Parsed index for [`SourceKind::Index`] sources
    pub fn as_index(&self) -> Option<i64> {
        match self.kind {
            SourceKind::Index => self.spec.parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for CaptureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.spec)
    }
}

/// Requested capture geometry; devices may substitute their own
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureRequest {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

impl Default for CaptureRequest {
    fn default() -> Self {
        Self {
            width: defaults::WIDTH,
            height: defaults::HEIGHT,
            fps: defaults::FPS as f64,
        }
    }
}

/// Channel layout of a decoded frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channels {
    /// One 8-bit luminance channel
    Gray,
    /// Three 8-bit channels in B, G, R order
    Bgr,
}

impl Channels {
    pub fn count(&self) -> usize {
        match self {
            Channels::Gray => 1,
            Channels::Bgr => 3,
        }
    }
}

/// A decoded image owned by the caller
///
/// Row-major, top-left origin, tightly packed (`stride == width * channels`),
/// 8 bits per channel.
#[derive(Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub width: u32,
    pub height: u32,
    pub channels: Channels,
    pub data: Vec<u8>,
}

impl DecodedFrame {
    pub fn new(width: u32, height: u32, channels: Channels, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            channels,
            data,
        }
    }

    /// Bytes per row
    pub fn stride(&self) -> usize {
        self.width as usize * self.channels.count()
    }

    /// Channel bytes of the pixel at (x, y)
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let n = self.channels.count();
        let start = y as usize * self.stride() + x as usize * n;
        self.data.get(start..start + n)
    }

    /// Convert to an [`image::DynamicImage`] (RGB or Luma) for saving
    pub fn to_image(&self) -> Option<image::DynamicImage> {
        match self.channels {
            Channels::Gray => {
                image::GrayImage::from_raw(self.width, self.height, self.data.clone())
                    .map(image::DynamicImage::ImageLuma8)
            }
            Channels::Bgr => {
                let mut rgb = self.data.clone();
                swap_red_blue(&mut rgb);
                image::RgbImage::from_raw(self.width, self.height, rgb)
                    .map(image::DynamicImage::ImageRgb8)
            }
        }
    }
}

impl fmt::Debug for DecodedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DecodedFrame({}x{} {:?}, {} bytes)",
            self.width,
            self.height,
            self.channels,
            self.data.len()
        )
    }
}

/// Device information from V4L2 capability
#[derive(Debug, Clone, Default)]
pub struct DeviceInfo {
    /// Name of the device (V4L2 card)
    pub card: String,
    /// Driver name (V4L2 driver)
    pub driver: String,
    /// Device path (e.g., /dev/video0)
    pub path: String,
    /// Real device path (resolved symlinks)
    pub real_path: String,
}
