// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline descriptions and launch helpers for the generic backend

use gstreamer::prelude::*;
use gstreamer_app::AppSink;
use tracing::{debug, warn};

use crate::backends::camera::types::{CaptureRequest, CaptureSource, SourceKind};
use crate::constants::paths;
use crate::constants::pipeline::APPSINK;
use crate::errors::{CaptureError, CaptureResult};

/// Source element for a device path or index on the current OS
pub fn source_element(source: &CaptureSource) -> CaptureResult<String> {
    match source.kind() {
        SourceKind::Pipeline => Ok(source.spec().to_string()),
        SourceKind::DevicePath => device_path_element(source.spec()),
        SourceKind::Index => {
            let index = source
                .as_index()
                .filter(|i| *i >= 0)
                .ok_or_else(|| {
                    CaptureError::OpenFailure(format!("invalid capture index '{}'", source.spec()))
                })?;
            Ok(index_element(index))
        }
    }
}

#[cfg(target_os = "linux")]
fn device_path_element(path: &str) -> CaptureResult<String> {
    Ok(format!("v4l2src device={}", path))
}

#[cfg(not(target_os = "linux"))]
fn device_path_element(path: &str) -> CaptureResult<String> {
    Err(CaptureError::OpenFailure(format!(
        "device paths are not supported on this platform: {}",
        path
    )))
}

fn index_element(index: i64) -> String {
    if cfg!(target_os = "linux") {
        format!("v4l2src device={}{}", paths::VIDEO_DEVICE_PREFIX, index)
    } else if cfg!(target_os = "macos") {
        format!("avfvideosrc device-index={}", index)
    } else if cfg!(target_os = "windows") {
        format!("mfvideosrc device-index={}", index)
    } else {
        "autovideosrc".to_string()
    }
}

/// `src ! ... ! appsink` producing BGR frames
///
/// With a request the size and rate are pinned in caps after conversion. The
/// unconstrained form goes through `decodebin` so compressed-only sources still
/// negotiate.
pub fn capture_description(src: &str, request: Option<&CaptureRequest>) -> String {
    match request {
        Some(req) => {
            let mut caps = format!(
                "video/x-raw,format=BGR,width={},height={}",
                req.width, req.height
            );
            if req.fps > 0.0 {
                caps.push_str(&format!(",framerate={}/1", req.fps.round().max(1.0) as u32));
            }
            format!("{} ! videoconvert ! {} ! {}", src, caps, APPSINK)
        }
        None => format!(
            "{} ! decodebin ! videoconvert ! video/x-raw,format=BGR ! {}",
            src,
            APPSINK
        ),
    }
}

/// Parse `description`, locate its appsink and bring it to PLAYING
pub fn launch(
    description: &str,
    state_timeout_ms: u64,
) -> CaptureResult<(gstreamer::Pipeline, AppSink)> {
    debug!(pipeline = %description, "Launching pipeline");

    let pipeline = gstreamer::parse::launch(description)
        .map_err(|e| CaptureError::OpenFailure(format!("Failed to parse pipeline: {}", e)))?
        .dynamic_cast::<gstreamer::Pipeline>()
        .map_err(|_| CaptureError::OpenFailure("Description is not a pipeline".to_string()))?;

    let appsink = find_appsink(&pipeline).ok_or_else(|| {
        CaptureError::OpenFailure("Pipeline has no appsink element".to_string())
    })?;

    if let Err(e) = pipeline.set_state(gstreamer::State::Playing) {
        let detail = bus_error(&pipeline).unwrap_or_else(|| e.to_string());
        stop(&pipeline);
        return Err(CaptureError::OpenFailure(format!(
            "Failed to start pipeline: {}",
            detail
        )));
    }

    let (result, state, pending) =
        pipeline.state(gstreamer::ClockTime::from_mseconds(state_timeout_ms));
    debug!(?result, ?state, ?pending, "Pipeline state");

    if let Some(detail) = bus_error(&pipeline) {
        stop(&pipeline);
        return Err(CaptureError::OpenFailure(detail));
    }

    let playing = result.is_ok() && state == gstreamer::State::Playing;
    let arriving = matches!(result, Ok(gstreamer::StateChangeSuccess::Async))
        && pending == gstreamer::State::Playing;
    if !playing && !arriving {
        stop(&pipeline);
        return Err(CaptureError::OpenFailure(format!(
            "Pipeline failed to reach PLAYING (state: {:?}, result: {:?})",
            state, result
        )));
    }

    Ok((pipeline, appsink))
}

/// The element named `sink`, otherwise the first appsink in the bin
fn find_appsink(pipeline: &gstreamer::Pipeline) -> Option<AppSink> {
    pipeline
        .by_name("sink")
        .and_then(|e| e.dynamic_cast::<AppSink>().ok())
        .or_else(|| {
            pipeline
                .children()
                .into_iter()
                .find_map(|e| e.dynamic_cast::<AppSink>().ok())
        })
}

/// Drain the bus and return the first error message, if any
pub fn bus_error(pipeline: &gstreamer::Pipeline) -> Option<String> {
    let bus = pipeline.bus()?;
    while let Some(msg) = bus.pop_filtered(&[gstreamer::MessageType::Error]) {
        if let gstreamer::MessageView::Error(err) = msg.view() {
            let source = msg
                .src()
                .map(|s| s.path_string().to_string())
                .unwrap_or_default();
            warn!(source = %source, error = %err.error(), debug = ?err.debug(), "Pipeline error");
            return Some(format!("{}: {}", source, err.error()));
        }
    }
    None
}

/// Set NULL and wait for it so the device is released
pub fn stop(pipeline: &gstreamer::Pipeline) {
    if let Err(e) = pipeline.set_state(gstreamer::State::Null) {
        debug!(error = %e, "Failed to set pipeline to NULL");
    }
    let _ = pipeline.state(gstreamer::ClockTime::from_seconds(2));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constrained_description() {
        let req = CaptureRequest {
            width: 1280,
            height: 720,
            fps: 29.97,
        };
        let desc = capture_description("videotestsrc", Some(&req));
        assert_eq!(
            desc,
            format!(
                "videotestsrc ! videoconvert ! video/x-raw,format=BGR,width=1280,height=720,framerate=30/1 ! {}",
                APPSINK
            )
        );
    }

    #[test]
    fn test_unconstrained_description_decodes() {
        let desc = capture_description("videotestsrc", None);
        assert!(desc.contains("decodebin"));
        assert!(!desc.contains("width="));
    }

    #[test]
    fn test_negative_index_rejected() {
        let src = CaptureSource::parse("-1").unwrap();
        assert!(matches!(
            source_element(&src),
            Err(CaptureError::OpenFailure(_))
        ));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_index_maps_to_device_node() {
        let src = CaptureSource::index(3);
        assert_eq!(source_element(&src).unwrap(), "v4l2src device=/dev/video3");
    }
}
