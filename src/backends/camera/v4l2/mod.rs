// SPDX-License-Identifier: GPL-3.0-only

//! Direct V4L2 capture backend
//!
//! Opens a device node, negotiates the first decodable pixel format, sets up
//! an mmap buffer ring and streams from it. Each read dequeues one buffer,
//! decodes it into a caller-owned frame and hands the buffer straight back to
//! the driver.
//!
//! ```text
//! Closed -> FormatNegotiated -> BuffersAllocated -> Streaming -> Closed
//! ```
//!
//! Teardown runs in reverse from whatever state was reached: stream off,
//! unmap and free buffers, close the descriptor.

pub mod buffer_pool;
pub mod device;
#[cfg(test)]
pub(crate) mod testing;

pub use buffer_pool::{BufferPool, Dequeue, FilledBuffer};
pub use device::{DeviceIo, V4l2Device};

use std::time::Duration;

use tracing::{debug, info, warn};

use super::CaptureBackend;
use super::types::{CaptureRequest, DecodedFrame};
use crate::constants::{buffers, defaults, timing};
use crate::errors::{CaptureError, CaptureResult, FrameError};
use crate::media::{PixelFormat, decode};

/// Tuning for the direct backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectOptions {
    /// Buffers requested from the driver
    pub buffer_count: u32,
    /// Bound for [`CaptureBackend::read_frame`]
    pub frame_timeout: Duration,
}

impl Default for DirectOptions {
    fn default() -> Self {
        Self {
            buffer_count: buffers::DEFAULT_COUNT,
            frame_timeout: Duration::from_millis(timing::FRAME_TIMEOUT_MS),
        }
    }
}

/// Lifecycle position of a direct backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Closed,
    FormatNegotiated,
    BuffersAllocated,
    Streaming,
}

/// Open descriptor plus what was negotiated on it
pub struct DeviceHandle<D> {
    io: D,
    open: bool,
    streaming: bool,
    format: PixelFormat,
    width: u32,
    height: u32,
}

/// Capture straight from a V4L2 device node
pub struct DirectDeviceBackend<D: DeviceIo = V4l2Device> {
    path: String,
    handle: DeviceHandle<D>,
    pool: BufferPool<D::Region>,
    state: DeviceState,
    frame_timeout: Duration,
}

impl DirectDeviceBackend<V4l2Device> {
    /// Open `path` and start streaming at (or near) the requested geometry
    pub fn open(
        path: &str,
        request: &CaptureRequest,
        options: DirectOptions,
    ) -> CaptureResult<Self> {
        let device = V4l2Device::open(path)
            .map_err(|e| CaptureError::OpenFailure(format!("{}: {}", path, e)))?;
        Self::with_device(path, device, request, options)
    }
}

impl<D: DeviceIo> DirectDeviceBackend<D> {
    /// Bring up capture on an already opened device
    ///
    /// On any failure everything acquired so far is released, including the
    /// descriptor.
    pub fn with_device(
        path: &str,
        mut io: D,
        request: &CaptureRequest,
        options: DirectOptions,
    ) -> CaptureResult<Self> {
        let (format, width, height) = match negotiate_format(&mut io, request) {
            Ok(negotiated) => negotiated,
            Err(e) => {
                io.close();
                return Err(e);
            }
        };
        apply_frame_rate(&mut io, request.fps, path);

        let mut backend = Self {
            path: path.to_string(),
            handle: DeviceHandle {
                io,
                open: true,
                streaming: false,
                format,
                width,
                height,
            },
            pool: BufferPool::new(),
            state: DeviceState::FormatNegotiated,
            frame_timeout: options.frame_timeout,
        };

        // Early returns drop `backend`, which tears down what was set up
        backend
            .pool
            .allocate(&mut backend.handle.io, options.buffer_count)?;
        backend.state = DeviceState::BuffersAllocated;
        backend.pool.queue_all(&mut backend.handle.io)?;

        backend.handle.io.stream_on().map_err(|e| {
            CaptureError::StreamStartFailure(format!("{}: {}", backend.path, e))
        })?;
        backend.handle.streaming = true;
        backend.state = DeviceState::Streaming;

        info!(
            path,
            format = %format,
            width,
            height,
            buffers = backend.pool.len(),
            "Direct capture streaming"
        );
        Ok(backend)
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Negotiated pixel format
    pub fn format(&self) -> PixelFormat {
        self.handle.format
    }

    /// Negotiated frame size; may differ from the request
    pub fn dimensions(&self) -> (u32, u32) {
        (self.handle.width, self.handle.height)
    }

    /// Stop streaming and release buffers and descriptor; idempotent
    pub fn shutdown(&mut self) {
        if self.handle.streaming {
            if let Err(e) = self.handle.io.stream_off() {
                warn!(path = %self.path, error = %e, "Stream off failed");
            }
            self.handle.streaming = false;
        }

        self.pool.release_all(&mut self.handle.io);

        if self.handle.open {
            self.handle.io.close();
            self.handle.open = false;
            debug!(path = %self.path, "Direct capture closed");
        }
        self.state = DeviceState::Closed;
    }
}

impl<D: DeviceIo> CaptureBackend for DirectDeviceBackend<D> {
    fn is_opened(&self) -> bool {
        self.state == DeviceState::Streaming
    }

    fn read_frame(&mut self) -> Result<DecodedFrame, FrameError> {
        self.read_frame_timeout(self.frame_timeout)
    }

    fn read_frame_timeout(&mut self, timeout: Duration) -> Result<DecodedFrame, FrameError> {
        if self.state != DeviceState::Streaming {
            return Err(FrameError::NotOpened);
        }

        let filled = match self.pool.dequeue_next(&mut self.handle.io, timeout)? {
            Dequeue::Ready(filled) => filled,
            Dequeue::TimedOut => return Err(FrameError::Timeout),
        };

        let decoded = decode(
            self.pool.bytes(&filled),
            self.handle.format,
            self.handle.width,
            self.handle.height,
        );

        // Requeue whatever the decoder said, or the ring drains
        if let Err(e) = self.pool.requeue(&mut self.handle.io, filled.index) {
            warn!(path = %self.path, index = filled.index, error = %e, "Requeue failed");
        }

        decoded.map_err(|e| {
            debug!(path = %self.path, error = %e, "Dropping undecodable frame");
            FrameError::Decode(e)
        })
    }

    fn close(&mut self) {
        self.shutdown();
    }

    fn describe(&self) -> String {
        format!(
            "v4l2 {} ({} {}x{})",
            self.path, self.handle.format, self.handle.width, self.handle.height
        )
    }
}

impl<D: DeviceIo> Drop for DirectDeviceBackend<D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Try each decodable format in preference order
fn negotiate_format<D: DeviceIo>(
    io: &mut D,
    request: &CaptureRequest,
) -> CaptureResult<(PixelFormat, u32, u32)> {
    for candidate in PixelFormat::PREFERENCE {
        let applied = match io.set_format(candidate.fourcc(), request.width, request.height) {
            Ok(applied) => applied,
            Err(e) => {
                debug!(format = %candidate, error = %e, "Format rejected");
                continue;
            }
        };

        let Some(format) = PixelFormat::from_fourcc(&applied.fourcc) else {
            debug!(
                requested = %candidate,
                reported = %String::from_utf8_lossy(&applied.fourcc),
                "Device substituted an undecodable format"
            );
            continue;
        };

        if applied.width == 0 || applied.height == 0 {
            return Err(CaptureError::FormatNegotiationFailure(format!(
                "device reported {}x{} for {}",
                applied.width, applied.height, format
            )));
        }

        if applied.width != request.width || applied.height != request.height {
            debug!(
                requested_width = request.width,
                requested_height = request.height,
                width = applied.width,
                height = applied.height,
                "Device substituted frame size"
            );
        }
        return Ok((format, applied.width, applied.height));
    }

    Err(CaptureError::FormatNegotiationFailure(
        "device accepted none of MJPEG, YUYV, GREY, Y16, BGR24".to_string(),
    ))
}

/// Best-effort frame interval; failure never aborts the open
fn apply_frame_rate<D: DeviceIo>(io: &mut D, fps: f64, path: &str) {
    let fps = if fps > 0.0 {
        fps.round().max(1.0) as u32
    } else {
        defaults::FPS
    };

    match io.set_frame_interval(fps) {
        Ok(true) => debug!(path, fps, "Frame interval set"),
        Ok(false) => debug!(path, "Device has no frame interval control"),
        Err(e) => warn!(path, fps, error = %e, "Failed to set frame interval"),
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeDevice;
    use super::*;
    use crate::backends::camera::types::Channels;
    use crate::errors::DecodeError;
    use std::time::Instant;

    fn options() -> DirectOptions {
        DirectOptions {
            buffer_count: 4,
            frame_timeout: Duration::from_millis(50),
        }
    }

    fn request(width: u32, height: u32) -> CaptureRequest {
        CaptureRequest {
            width,
            height,
            fps: 30.0,
        }
    }

    /// 2x2 YUYV frame of mid grey
    fn grey_yuyv() -> Vec<u8> {
        vec![128, 128, 128, 128, 128, 128, 128, 128]
    }

    #[test]
    fn test_negotiates_first_accepted_format() {
        let dev = FakeDevice::new(&[*b"GREY", *b"YUYV"], grey_yuyv());
        let backend =
            DirectDeviceBackend::with_device("/dev/fake", dev, &request(2, 2), options()).unwrap();
        assert_eq!(backend.format(), PixelFormat::Yuyv);
        assert_eq!(backend.state(), DeviceState::Streaming);
        assert!(backend.is_opened());
    }

    #[test]
    fn test_device_size_is_authoritative() {
        let mut dev = FakeDevice::new(&[*b"GREY"], vec![7; 4 * 2]);
        dev.substitute_size = Some((4, 2));
        let mut backend =
            DirectDeviceBackend::with_device("/dev/fake", dev, &request(640, 480), options())
                .unwrap();
        assert_eq!(backend.dimensions(), (4, 2));

        let frame = backend.read_frame().unwrap();
        assert_eq!((frame.width, frame.height), (4, 2));
        assert_eq!(frame.channels, Channels::Gray);
    }

    #[test]
    fn test_no_format_accepted_closes_descriptor() {
        let dev = FakeDevice::new(&[*b"H264"], Vec::new());
        let counters = std::rc::Rc::clone(&dev.counters);
        let err = DirectDeviceBackend::with_device("/dev/fake", dev, &request(2, 2), options())
            .err()
            .unwrap();
        assert!(matches!(err, CaptureError::FormatNegotiationFailure(_)));
        assert_eq!(counters.closes.get(), 1);
    }

    #[test]
    fn test_zero_reported_size_fails() {
        let mut dev = FakeDevice::new(&[*b"MJPG"], Vec::new());
        dev.substitute_size = Some((0, 480));
        let err = DirectDeviceBackend::with_device("/dev/fake", dev, &request(2, 2), options())
            .err()
            .unwrap();
        assert!(matches!(err, CaptureError::FormatNegotiationFailure(_)));
    }

    #[test]
    fn test_stream_start_failure_releases_everything() {
        let mut dev = FakeDevice::new(&[*b"YUYV"], grey_yuyv());
        dev.fail_stream_on = true;
        let counters = std::rc::Rc::clone(&dev.counters);
        let err = DirectDeviceBackend::with_device("/dev/fake", dev, &request(2, 2), options())
            .err()
            .unwrap();
        assert!(matches!(err, CaptureError::StreamStartFailure(_)));
        assert_eq!(counters.live_mappings(), 0);
        assert_eq!(counters.closes.get(), 1);
        assert_eq!(counters.stream_offs.get(), 0);
    }

    #[test]
    fn test_repeated_open_close_leaks_nothing() {
        let mut dev = FakeDevice::new(&[*b"YUYV"], grey_yuyv());
        let counters = std::rc::Rc::clone(&dev.counters);
        for cycle in 1..=5 {
            let mut backend =
                DirectDeviceBackend::with_device("/dev/fake", dev, &request(2, 2), options())
                    .unwrap();
            backend.read_frame().unwrap();
            backend.close();
            backend.close();
            assert_eq!(counters.live_mappings(), 0);
            assert_eq!(counters.closes.get(), cycle);
            assert_eq!(counters.stream_offs.get(), cycle);
            drop(backend);
            assert_eq!(counters.closes.get(), cycle);

            dev = FakeDevice::new(&[*b"YUYV"], grey_yuyv());
            dev.counters = std::rc::Rc::clone(&counters);
        }
    }

    #[test]
    fn test_failed_allocation_releases_only_what_was_acquired() {
        let counters = std::rc::Rc::new(super::testing::FakeCounters::default());
        let setups: [fn(&mut FakeDevice); 2] = [
            |dev| dev.grant = 1,
            |dev| dev.fail_map_at = Some(2),
        ];

        let mut cycle = 0;
        for setup in setups {
            for _ in 0..3 {
                cycle += 1;
                let mut dev = FakeDevice::new(&[*b"YUYV"], grey_yuyv());
                dev.counters = std::rc::Rc::clone(&counters);
                setup(&mut dev);

                let err =
                    DirectDeviceBackend::with_device("/dev/fake", dev, &request(2, 2), options())
                        .err()
                        .unwrap();
                assert!(matches!(err, CaptureError::BufferAllocationFailure(_)));

                assert_eq!(counters.closes.get(), cycle);
                assert_eq!(counters.live_mappings(), 0);
                assert_eq!(counters.stream_ons.get(), 0);
                assert_eq!(counters.stream_offs.get(), 0);

                // Every request for buffers is matched by exactly one release
                let requests = counters.buffer_requests.borrow();
                assert_eq!(requests.len(), cycle * 2);
                for pair in requests.chunks(2) {
                    assert_eq!(pair, [options().buffer_count, 0]);
                }
            }
        }
        // The partial-map cycles really did map something first
        assert_eq!(counters.maps.get(), 3 * 2);
    }

    #[test]
    fn test_decode_failure_still_requeues() {
        // YUYV needs 8 bytes for 2x2; every buffer carries 3
        let dev = FakeDevice::new(&[*b"YUYV"], vec![1, 2, 3]);
        let mut backend =
            DirectDeviceBackend::with_device("/dev/fake", dev, &request(2, 2), options()).unwrap();

        for _ in 0..10 {
            let err = backend.read_frame().unwrap_err();
            assert!(matches!(
                err,
                FrameError::Decode(DecodeError::ShortBuffer { .. })
            ));
        }
        assert_eq!(backend.pool.queued_count(), 4);
    }

    #[test]
    fn test_stalled_device_times_out() {
        let mut dev = FakeDevice::new(&[*b"YUYV"], grey_yuyv());
        dev.stalled = true;
        let mut backend =
            DirectDeviceBackend::with_device("/dev/fake", dev, &request(2, 2), options()).unwrap();

        let start = Instant::now();
        let err = backend
            .read_frame_timeout(Duration::from_millis(20))
            .unwrap_err();
        assert_eq!(err, FrameError::Timeout);
        assert!(start.elapsed() < Duration::from_millis(500));
        assert!(backend.is_opened());
    }

    #[test]
    fn test_read_after_close_reports_not_opened() {
        let dev = FakeDevice::new(&[*b"YUYV"], grey_yuyv());
        let mut backend =
            DirectDeviceBackend::with_device("/dev/fake", dev, &request(2, 2), options()).unwrap();
        backend.close();
        assert!(!backend.is_opened());
        assert_eq!(backend.read_frame().unwrap_err(), FrameError::NotOpened);
    }
}
