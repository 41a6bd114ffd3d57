// SPDX-License-Identifier: GPL-3.0-only

//! slotcam - camera capture for logical camera slots
//!
//! Each logical slot (front, rear, ...) is resolved to a working capture
//! source by trying an ordered list of candidates: explicit overrides,
//! direct V4L2 device access and GStreamer/libcamera pipelines.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Capture backends, candidate building and source resolution
//! - [`media`]: Pixel format tags and raw buffer decoding
//! - [`config`]: Capture configuration (file and environment)
//! - [`constants`]: Timing, buffer and pipeline defaults
//! - [`errors`]: Error types
//!
//! # Example
//!
//! ```ignore
//! use slotcam::backends::camera::{SourceResolver, candidates};
//! use slotcam::config::CaptureConfig;
//!
//! let mut config = CaptureConfig::default();
//! config.apply_process_env();
//!
//! let resolver = SourceResolver::new(config.resolver_options(), config.backend_options());
//! let mut front = resolver.resolve(&candidates::build(0, &config), &config.request())?;
//! let frame = front.backend.read_frame()?;
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod media;

// Re-export commonly used types
pub use backends::camera::{
    CaptureBackend, CaptureRequest, CaptureSource, DecodedFrame, ResolvedSource, SourceKind,
    SourceResolver,
};
pub use config::{CaptureConfig, CapturePriority};
pub use errors::{CaptureError, CaptureResult, DecodeError, FrameError};
