// SPDX-License-Identifier: GPL-3.0-only

//! In-memory [`DeviceIo`] used by the pool and backend tests

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io;
use std::ops::Deref;
use std::rc::Rc;
use std::time::Duration;

use super::device::{DequeuedBuffer, DeviceIo, NegotiatedFormat};

/// Resource counters shared between a fake device and its regions
#[derive(Default)]
pub(crate) struct FakeCounters {
    pub maps: Cell<usize>,
    pub unmaps: Cell<usize>,
    pub closes: Cell<usize>,
    pub stream_ons: Cell<usize>,
    pub stream_offs: Cell<usize>,
    pub buffer_requests: RefCell<Vec<u32>>,
}

impl FakeCounters {
    pub fn live_mappings(&self) -> usize {
        self.maps.get() - self.unmaps.get()
    }
}

pub(crate) struct FakeRegion {
    data: Vec<u8>,
    counters: Rc<FakeCounters>,
}

impl Deref for FakeRegion {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for FakeRegion {
    fn drop(&mut self) {
        self.counters.unmaps.set(self.counters.unmaps.get() + 1);
    }
}

pub(crate) struct FakeDevice {
    /// Fourccs the device acknowledges; others are rejected
    pub accepted: Vec<[u8; 4]>,
    /// Size reported back instead of the requested one
    pub substitute_size: Option<(u32, u32)>,
    /// Upper bound on granted buffers
    pub grant: u32,
    pub fail_map_at: Option<u32>,
    pub fail_stream_on: bool,
    pub frame_interval_supported: bool,
    /// Never produce a frame
    pub stalled: bool,
    /// Payload every mapped buffer carries
    pub frame: Vec<u8>,
    pub counters: Rc<FakeCounters>,
    filled: VecDeque<u32>,
}

impl FakeDevice {
    pub fn new(accepted: &[[u8; 4]], frame: Vec<u8>) -> Self {
        Self {
            accepted: accepted.to_vec(),
            substitute_size: None,
            grant: u32::MAX,
            fail_map_at: None,
            fail_stream_on: false,
            frame_interval_supported: true,
            stalled: false,
            frame,
            counters: Rc::new(FakeCounters::default()),
            filled: VecDeque::new(),
        }
    }

    pub fn queued(&self) -> usize {
        self.filled.len()
    }
}

impl DeviceIo for FakeDevice {
    type Region = FakeRegion;

    fn set_format(
        &mut self,
        fourcc: [u8; 4],
        width: u32,
        height: u32,
    ) -> io::Result<NegotiatedFormat> {
        if !self.accepted.contains(&fourcc) {
            return Err(io::Error::from(io::ErrorKind::InvalidInput));
        }
        let (width, height) = self.substitute_size.unwrap_or((width, height));
        Ok(NegotiatedFormat {
            fourcc,
            width,
            height,
        })
    }

    fn set_frame_interval(&mut self, _fps: u32) -> io::Result<bool> {
        Ok(self.frame_interval_supported)
    }

    fn request_buffers(&mut self, count: u32) -> io::Result<u32> {
        self.counters.buffer_requests.borrow_mut().push(count);
        if count == 0 {
            self.filled.clear();
            return Ok(0);
        }
        Ok(count.min(self.grant))
    }

    fn map_buffer(&mut self, index: u32) -> io::Result<FakeRegion> {
        if self.fail_map_at == Some(index) {
            return Err(io::Error::from(io::ErrorKind::OutOfMemory));
        }
        self.counters.maps.set(self.counters.maps.get() + 1);
        Ok(FakeRegion {
            data: self.frame.clone(),
            counters: Rc::clone(&self.counters),
        })
    }

    fn queue_buffer(&mut self, index: u32) -> io::Result<()> {
        self.filled.push_back(index);
        Ok(())
    }

    fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool> {
        if self.stalled || self.filled.is_empty() {
            std::thread::sleep(timeout);
            return Ok(false);
        }
        Ok(true)
    }

    fn dequeue_buffer(&mut self) -> io::Result<DequeuedBuffer> {
        let index = self
            .filled
            .pop_front()
            .ok_or_else(|| io::Error::from(io::ErrorKind::WouldBlock))?;
        Ok(DequeuedBuffer {
            index,
            bytes_used: self.frame.len(),
        })
    }

    fn stream_on(&mut self) -> io::Result<()> {
        if self.fail_stream_on {
            return Err(io::Error::from(io::ErrorKind::ResourceBusy));
        }
        self.counters.stream_ons.set(self.counters.stream_ons.get() + 1);
        Ok(())
    }

    fn stream_off(&mut self) -> io::Result<()> {
        self.counters
            .stream_offs
            .set(self.counters.stream_offs.get() + 1);
        Ok(())
    }

    fn close(&mut self) {
        self.counters.closes.set(self.counters.closes.get() + 1);
    }
}
