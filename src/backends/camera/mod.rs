// SPDX-License-Identifier: GPL-3.0-only

//! Camera capture backends
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │  candidates::build   │  ← Ordered sources for a slot
//! └──────────┬───────────┘
//!            │
//!            ▼
//! ┌──────────────────────┐
//! │    SourceResolver    │  ← Open, warm up, validate
//! └──────────┬───────────┘
//!            │
//!            ▼
//! ┌──────────────────────┐
//! │ CaptureBackend trait │  ← Common interface
//! └──────────┬───────────┘
//!            │
//!       ┌────┴─────┐
//!       ▼          ▼
//!   ┌──────┐  ┌─────────┐
//!   │ V4L2 │  │GStreamer│
//!   └──────┘  └─────────┘
//! ```

pub mod candidates;
pub mod generic;
pub mod resolver;
pub mod types;
#[cfg(target_os = "linux")]
pub mod v4l2;
#[cfg(target_os = "linux")]
pub mod v4l2_utils;

pub use candidates::Platform;
pub use generic::{GenericBackend, GenericOptions};
pub use resolver::{ResolvedSource, ResolverOptions, SourceResolver};
pub use types::*;
#[cfg(target_os = "linux")]
pub use v4l2::{DirectDeviceBackend, DirectOptions};

use std::time::Duration;

use tracing::debug;

use crate::errors::{CaptureError, CaptureResult, FrameError};

/// An opened capture source
///
/// Construction either yields a streaming backend or an error, so a live
/// value is open until [`close`](Self::close) is called. Reads never block
/// longer than their timeout and never invalidate the backend.
pub trait CaptureBackend {
    /// Whether frames can still be read
    fn is_opened(&self) -> bool;

    /// Read one frame with the backend's default timeout
    fn read_frame(&mut self) -> Result<DecodedFrame, FrameError>;

    /// Read one frame, waiting at most `timeout`
    fn read_frame_timeout(&mut self, timeout: Duration) -> Result<DecodedFrame, FrameError>;

    /// Release the device or pipeline. Safe to call more than once.
    fn close(&mut self);

    /// Short human-readable description for logs
    fn describe(&self) -> String;
}

/// Settings forwarded to whichever backend [`open_backend`] picks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackendOptions {
    #[cfg(target_os = "linux")]
    pub direct: DirectOptions,
    pub generic: GenericOptions,
    /// Retry device paths and indices through GStreamer if direct capture fails
    pub generic_fallback: bool,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            #[cfg(target_os = "linux")]
            direct: DirectOptions::default(),
            generic: GenericOptions::default(),
            generic_fallback: true,
        }
    }
}

/// Open `source` with the most suitable backend
///
/// Pipelines always go through GStreamer. Device paths and indices use direct
/// V4L2 capture where available, falling back to GStreamer when enabled.
pub fn open_backend(
    source: &CaptureSource,
    request: &CaptureRequest,
    options: &BackendOptions,
) -> CaptureResult<Box<dyn CaptureBackend>> {
    let generic = |source: &CaptureSource, request: &CaptureRequest| {
        open_generic(source, request, options.generic)
    };

    #[cfg(target_os = "linux")]
    {
        let direct = |source: &CaptureSource, request: &CaptureRequest| {
            open_direct(source, request, options.direct)
                .map(|backend| Box::new(backend) as Box<dyn CaptureBackend>)
        };
        open_backend_with(source, request, options.generic_fallback, direct, generic)
    }

    #[cfg(not(target_os = "linux"))]
    {
        let direct = |source: &CaptureSource, _: &CaptureRequest| {
            Err(CaptureError::OpenFailure(format!(
                "no direct capture for {} on this platform",
                source
            )))
        };
        open_backend_with(source, request, true, direct, generic)
    }
}

fn open_generic(
    source: &CaptureSource,
    request: &CaptureRequest,
    options: GenericOptions,
) -> CaptureResult<Box<dyn CaptureBackend>> {
    Ok(Box::new(GenericBackend::open(source, request, options)?))
}

/// Backend selection with injected openers
///
/// `generic` runs for pipelines, and for other sources only after `direct`
/// failed with `fallback` set. Otherwise the direct error is returned.
pub fn open_backend_with<D, G>(
    source: &CaptureSource,
    request: &CaptureRequest,
    fallback: bool,
    direct: D,
    generic: G,
) -> CaptureResult<Box<dyn CaptureBackend>>
where
    D: FnOnce(&CaptureSource, &CaptureRequest) -> CaptureResult<Box<dyn CaptureBackend>>,
    G: FnOnce(&CaptureSource, &CaptureRequest) -> CaptureResult<Box<dyn CaptureBackend>>,
{
    if source.kind() == SourceKind::Pipeline {
        return generic(source, request);
    }

    match direct(source, request) {
        Ok(backend) => Ok(backend),
        Err(e) if fallback => {
            debug!(source = %source, error = %e, "Direct capture failed, trying GStreamer");
            generic(source, request)
        }
        Err(e) => Err(e),
    }
}

/// Device node a direct-capable source refers to
#[cfg(target_os = "linux")]
pub fn device_path_for(source: &CaptureSource) -> CaptureResult<String> {
    use crate::constants::paths;

    match source.kind() {
        SourceKind::DevicePath => Ok(source.spec().to_string()),
        SourceKind::Index => source
            .as_index()
            .filter(|i| *i >= 0)
            .map(|i| format!("{}{}", paths::VIDEO_DEVICE_PREFIX, i))
            .ok_or_else(|| {
                CaptureError::OpenFailure(format!("invalid capture index '{}'", source.spec()))
            }),
        SourceKind::Pipeline => Err(CaptureError::OpenFailure(format!(
            "{} is not a device",
            source
        ))),
    }
}

#[cfg(target_os = "linux")]
fn open_direct(
    source: &CaptureSource,
    request: &CaptureRequest,
    options: DirectOptions,
) -> CaptureResult<DirectDeviceBackend> {
    let path = device_path_for(source)?;
    DirectDeviceBackend::open(&path, request, options)
}
