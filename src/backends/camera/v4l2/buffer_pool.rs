// SPDX-License-Identifier: GPL-3.0-only

//! Kernel-shared frame buffers for streaming capture
//!
//! The pool owns the mapped regions and tracks which side currently holds each
//! buffer. A buffer is either queued (the driver may fill it) or dequeued (the
//! caller is reading it). Every dequeued buffer must be requeued before the
//! next dequeue, otherwise the driver runs out of buffers and capture stalls.

use std::ops::Deref;
use std::time::Duration;

use tracing::{debug, warn};

use super::device::DeviceIo;
use crate::constants::buffers;
use crate::errors::{CaptureError, CaptureResult, FrameError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BufferState {
    /// Mapped but not yet handed to the driver
    Idle,
    Queued,
    Dequeued,
}

struct FrameBuffer<R> {
    region: R,
    state: BufferState,
}

/// A buffer taken from the driver; pass the index back to
/// [`BufferPool::requeue`] when done with the bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilledBuffer {
    pub index: u32,
    pub bytes_used: usize,
}

/// Outcome of waiting for the next buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dequeue {
    Ready(FilledBuffer),
    TimedOut,
}

pub struct BufferPool<R> {
    buffers: Vec<FrameBuffer<R>>,
    /// Driver-side buffers exist and need a zero-count request to free
    requested: bool,
}

impl<R> Default for BufferPool<R> {
    fn default() -> Self {
        Self {
            buffers: Vec::new(),
            requested: false,
        }
    }
}

impl<R: Deref<Target = [u8]>> BufferPool<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Buffers currently owned by the driver
    pub fn queued_count(&self) -> usize {
        self.count_in(BufferState::Queued)
    }

    /// Buffers currently owned by the caller
    pub fn dequeued_count(&self) -> usize {
        self.count_in(BufferState::Dequeued)
    }

    fn count_in(&self, state: BufferState) -> usize {
        self.buffers.iter().filter(|b| b.state == state).count()
    }

    /// Request `count` buffers and map every granted one
    ///
    /// Fails if the driver grants fewer than two buffers or any mapping fails.
    /// Regions mapped before the failure stay in the pool so
    /// [`release_all`](Self::release_all) can unmap them.
    pub fn allocate<D>(&mut self, device: &mut D, count: u32) -> CaptureResult<()>
    where
        D: DeviceIo<Region = R>,
    {
        if !self.buffers.is_empty() {
            return Err(CaptureError::BufferAllocationFailure(
                "pool is already allocated".to_string(),
            ));
        }

        let granted = device.request_buffers(count).map_err(|e| {
            CaptureError::BufferAllocationFailure(format!("buffer request failed: {}", e))
        })?;
        self.requested = true;

        if granted < buffers::MIN_COUNT {
            return Err(CaptureError::BufferAllocationFailure(format!(
                "driver granted {} of {} buffers",
                granted, count
            )));
        }

        for index in 0..granted {
            let region = device.map_buffer(index).map_err(|e| {
                CaptureError::BufferAllocationFailure(format!(
                    "mapping buffer {} failed: {}",
                    index, e
                ))
            })?;
            self.buffers.push(FrameBuffer {
                region,
                state: BufferState::Idle,
            });
        }

        debug!(requested = count, granted, "Allocated capture buffers");
        Ok(())
    }

    /// Hand every idle buffer to the driver
    pub fn queue_all<D>(&mut self, device: &mut D) -> CaptureResult<()>
    where
        D: DeviceIo<Region = R>,
    {
        for (index, buffer) in self.buffers.iter_mut().enumerate() {
            if buffer.state != BufferState::Idle {
                continue;
            }
            device.queue_buffer(index as u32).map_err(|e| {
                CaptureError::BufferAllocationFailure(format!(
                    "queueing buffer {} failed: {}",
                    index, e
                ))
            })?;
            buffer.state = BufferState::Queued;
        }
        Ok(())
    }

    /// Wait up to `timeout` for a filled buffer and take it from the driver
    pub fn dequeue_next<D>(&mut self, device: &mut D, timeout: Duration) -> Result<Dequeue, FrameError>
    where
        D: DeviceIo<Region = R>,
    {
        if !device.wait_readable(timeout)? {
            return Ok(Dequeue::TimedOut);
        }

        let taken = match device.dequeue_buffer() {
            Ok(taken) => taken,
            // Readiness without a buffer; treat like a missed deadline
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(Dequeue::TimedOut),
            Err(e) => return Err(e.into()),
        };

        let buffer = self
            .buffers
            .get_mut(taken.index as usize)
            .filter(|b| b.state == BufferState::Queued)
            .ok_or_else(|| {
                FrameError::Device(format!("driver returned unexpected buffer {}", taken.index))
            })?;
        buffer.state = BufferState::Dequeued;

        Ok(Dequeue::Ready(FilledBuffer {
            index: taken.index,
            bytes_used: taken.bytes_used.min(buffer.region.len()),
        }))
    }

    /// Valid bytes of a dequeued buffer
    pub fn bytes(&self, filled: &FilledBuffer) -> &[u8] {
        self.buffers
            .get(filled.index as usize)
            .filter(|b| b.state == BufferState::Dequeued)
            .map(|b| &b.region[..filled.bytes_used.min(b.region.len())])
            .unwrap_or(&[])
    }

    /// Return a dequeued buffer to the driver
    pub fn requeue<D>(&mut self, device: &mut D, index: u32) -> Result<(), FrameError>
    where
        D: DeviceIo<Region = R>,
    {
        let buffer = self
            .buffers
            .get_mut(index as usize)
            .filter(|b| b.state == BufferState::Dequeued)
            .ok_or_else(|| FrameError::Device(format!("buffer {} is not dequeued", index)))?;
        device.queue_buffer(index)?;
        buffer.state = BufferState::Queued;
        Ok(())
    }

    /// Unmap every region and free the driver-side buffers
    ///
    /// Safe to call on a partially allocated pool and more than once. The
    /// stream must already be off.
    pub fn release_all<D>(&mut self, device: &mut D)
    where
        D: DeviceIo<Region = R>,
    {
        let mapped = self.buffers.len();
        self.buffers.clear();

        if self.requested {
            if let Err(e) = device.request_buffers(0) {
                warn!(error = %e, "Failed to free driver buffers");
            }
            self.requested = false;
            debug!(mapped, "Released capture buffers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::v4l2::testing::{FakeDevice, FakeRegion};
    use std::time::Instant;

    fn device() -> FakeDevice {
        FakeDevice::new(&[*b"YUYV"], vec![0x80; 32])
    }

    fn ready(dequeue: Dequeue) -> FilledBuffer {
        match dequeue {
            Dequeue::Ready(filled) => filled,
            Dequeue::TimedOut => panic!("expected a filled buffer"),
        }
    }

    #[test]
    fn test_round_trip_visits_each_buffer_once_per_cycle() {
        let mut dev = device();
        let mut pool = BufferPool::<FakeRegion>::new();
        pool.allocate(&mut dev, 4).unwrap();
        pool.queue_all(&mut dev).unwrap();
        assert_eq!(pool.queued_count(), 4);

        for _cycle in 0..3 {
            let mut seen = Vec::new();
            for _ in 0..pool.len() {
                let filled = ready(pool.dequeue_next(&mut dev, Duration::from_millis(10)).unwrap());
                assert_eq!(pool.bytes(&filled).len(), 32);
                seen.push(filled.index);
                pool.requeue(&mut dev, filled.index).unwrap();
            }
            seen.sort_unstable();
            assert_eq!(seen, vec![0, 1, 2, 3]);
        }
        assert_eq!(pool.dequeued_count(), 0);
        assert_eq!(dev.queued(), 4);
    }

    #[test]
    fn test_dequeue_times_out_within_bound() {
        let mut dev = device();
        dev.stalled = true;
        let mut pool = BufferPool::<FakeRegion>::new();
        pool.allocate(&mut dev, 4).unwrap();
        pool.queue_all(&mut dev).unwrap();

        let timeout = Duration::from_millis(30);
        let start = Instant::now();
        let result = pool.dequeue_next(&mut dev, timeout).unwrap();
        let elapsed = start.elapsed();

        assert_eq!(result, Dequeue::TimedOut);
        assert!(elapsed >= timeout);
        assert!(elapsed < timeout + Duration::from_millis(500));
    }

    #[test]
    fn test_too_few_buffers_fails() {
        let mut dev = device();
        dev.grant = 1;
        let mut pool = BufferPool::<FakeRegion>::new();
        let err = pool.allocate(&mut dev, 4).unwrap_err();
        assert!(matches!(err, CaptureError::BufferAllocationFailure(_)));

        pool.release_all(&mut dev);
        assert_eq!(*dev.counters.buffer_requests.borrow(), vec![4, 0]);
    }

    #[test]
    fn test_partial_map_failure_releases_mapped_regions() {
        let mut dev = device();
        dev.fail_map_at = Some(2);
        let mut pool = BufferPool::<FakeRegion>::new();
        assert!(pool.allocate(&mut dev, 4).is_err());
        assert_eq!(dev.counters.live_mappings(), 2);

        pool.release_all(&mut dev);
        assert_eq!(dev.counters.live_mappings(), 0);

        // Second release is a no-op
        pool.release_all(&mut dev);
        assert_eq!(dev.counters.buffer_requests.borrow().len(), 2);
    }

    #[test]
    fn test_requeue_rejects_buffer_not_dequeued() {
        let mut dev = device();
        let mut pool = BufferPool::<FakeRegion>::new();
        pool.allocate(&mut dev, 2).unwrap();
        pool.queue_all(&mut dev).unwrap();

        assert!(pool.requeue(&mut dev, 0).is_err());
        assert!(pool.requeue(&mut dev, 9).is_err());
    }
}
