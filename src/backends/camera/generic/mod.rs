// SPDX-License-Identifier: GPL-3.0-only

//! GStreamer capture backend
//!
//! Handles pipeline descriptions verbatim and acts as the fallback for
//! device paths and indices. Frames are pulled from an appsink on demand.

pub mod pipeline;

use std::time::Duration;

use gstreamer_app::AppSink;
use gstreamer_video::{VideoFormat, VideoInfo};
use tracing::{debug, info};

use super::CaptureBackend;
use super::types::{CaptureRequest, CaptureSource, Channels, DecodedFrame, SourceKind};
use crate::constants::timing;
use crate::errors::{CaptureError, CaptureResult, DecodeError, FrameError};
use crate::media::decoders::converters;

/// Tuning for the generic backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenericOptions {
    /// Bound for [`CaptureBackend::read_frame`]
    pub frame_timeout: Duration,
    /// How long to wait for PLAYING when opening
    pub state_timeout: Duration,
}

impl Default for GenericOptions {
    fn default() -> Self {
        Self {
            frame_timeout: Duration::from_millis(timing::FRAME_TIMEOUT_MS),
            state_timeout: Duration::from_millis(timing::STATE_CHANGE_TIMEOUT_MS),
        }
    }
}

pub struct GenericBackend {
    source: CaptureSource,
    pipeline: Option<gstreamer::Pipeline>,
    appsink: AppSink,
    frame_timeout: Duration,
}

impl GenericBackend {
    /// Build and start a pipeline for `source`
    ///
    /// Pipeline sources are launched as given. Device paths and indices get a
    /// generated pipeline, first pinned to the requested geometry and then,
    /// if that does not start, left to negotiate freely.
    pub fn open(
        source: &CaptureSource,
        request: &CaptureRequest,
        options: GenericOptions,
    ) -> CaptureResult<Self> {
        gstreamer::init()
            .map_err(|e| CaptureError::OpenFailure(format!("GStreamer init failed: {}", e)))?;

        let timeout_ms = options.state_timeout.as_millis() as u64;
        let (gst_pipeline, appsink) = match source.kind() {
            SourceKind::Pipeline => pipeline::launch(source.spec(), timeout_ms)?,
            SourceKind::DevicePath | SourceKind::Index => {
                let src = pipeline::source_element(source)?;
                let pinned = pipeline::capture_description(&src, Some(request));
                match pipeline::launch(&pinned, timeout_ms) {
                    Ok(launched) => launched,
                    Err(e) => {
                        debug!(source = %source, error = %e, "Pinned caps failed, retrying unconstrained");
                        let free = pipeline::capture_description(&src, None);
                        pipeline::launch(&free, timeout_ms)?
                    }
                }
            }
        };

        info!(source = %source, "Pipeline capture started");
        Ok(Self {
            source: source.clone(),
            pipeline: Some(gst_pipeline),
            appsink,
            frame_timeout: options.frame_timeout,
        })
    }
}

impl CaptureBackend for GenericBackend {
    fn is_opened(&self) -> bool {
        self.pipeline.is_some()
    }

    fn read_frame(&mut self) -> Result<DecodedFrame, FrameError> {
        self.read_frame_timeout(self.frame_timeout)
    }

    fn read_frame_timeout(&mut self, timeout: Duration) -> Result<DecodedFrame, FrameError> {
        let Some(gst_pipeline) = self.pipeline.as_ref() else {
            return Err(FrameError::NotOpened);
        };

        let timeout = gstreamer::ClockTime::from_mseconds(timeout.as_millis() as u64);
        match self.appsink.try_pull_sample(timeout) {
            Some(sample) => sample_to_frame(&sample).map_err(FrameError::Decode),
            None => {
                if let Some(detail) = pipeline::bus_error(gst_pipeline) {
                    return Err(FrameError::Device(detail));
                }
                if self.appsink.is_eos() {
                    return Err(FrameError::EndOfStream);
                }
                Err(FrameError::Timeout)
            }
        }
    }

    fn close(&mut self) {
        if let Some(gst_pipeline) = self.pipeline.take() {
            pipeline::stop(&gst_pipeline);
            debug!(source = %self.source, "Pipeline capture closed");
        }
    }

    fn describe(&self) -> String {
        format!("gstreamer {}", self.source)
    }
}

impl Drop for GenericBackend {
    fn drop(&mut self) {
        self.close();
    }
}

/// Copy an appsink sample into a tightly packed frame
fn sample_to_frame(sample: &gstreamer::Sample) -> Result<DecodedFrame, DecodeError> {
    let caps = sample
        .caps()
        .ok_or_else(|| DecodeError::Malformed("sample has no caps".to_string()))?;
    let info = VideoInfo::from_caps(caps).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    let (channels, swap) = match info.format() {
        VideoFormat::Bgr => (Channels::Bgr, false),
        VideoFormat::Rgb => (Channels::Bgr, true),
        VideoFormat::Gray8 => (Channels::Gray, false),
        other => return Err(DecodeError::Unsupported(format!("{:?}", other))),
    };

    let buffer = sample.buffer().ok_or(DecodeError::Empty)?;
    let map = buffer
        .map_readable()
        .map_err(|_| DecodeError::Malformed("buffer is not readable".to_string()))?;

    let stride = info.stride().first().copied().unwrap_or(0).max(0) as usize;
    let mut data = pack_rows(
        map.as_slice(),
        info.width(),
        info.height(),
        channels.count(),
        stride,
    )?;
    if swap {
        converters::swap_red_blue(&mut data);
    }

    Ok(DecodedFrame::new(info.width(), info.height(), channels, data))
}

/// Strip row padding from a strided plane
fn pack_rows(
    bytes: &[u8],
    width: u32,
    height: u32,
    channels: usize,
    stride: usize,
) -> Result<Vec<u8>, DecodeError> {
    if width == 0 || height == 0 {
        return Err(DecodeError::ZeroDimensions);
    }
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }

    let row = width as usize * channels;
    let stride = stride.max(row);
    let expected = stride * (height as usize - 1) + row;
    if bytes.len() < expected {
        return Err(DecodeError::ShortBuffer {
            expected,
            actual: bytes.len(),
        });
    }

    let mut data = Vec::with_capacity(row * height as usize);
    for y in 0..height as usize {
        let start = y * stride;
        data.extend_from_slice(&bytes[start..start + row]);
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_rows_strips_padding() {
        // 2x2 grey with 4-byte stride
        let bytes = [1, 2, 0, 0, 3, 4];
        assert_eq!(pack_rows(&bytes, 2, 2, 1, 4).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_pack_rows_short_plane() {
        let err = pack_rows(&[0; 5], 2, 2, 3, 6).unwrap_err();
        assert_eq!(
            err,
            DecodeError::ShortBuffer {
                expected: 12,
                actual: 5
            }
        );
    }

    #[test]
    fn test_unparseable_pipeline_is_open_failure() {
        if gstreamer::init().is_err() {
            return;
        }
        let source = CaptureSource::pipeline("this-element-does-not-exist ! appsink name=sink");
        let err = GenericBackend::open(&source, &CaptureRequest::default(), GenericOptions::default())
            .err()
            .unwrap();
        assert!(err.is_open_time());
    }
}
