// SPDX-License-Identifier: GPL-3.0-only

//! Device I/O for direct V4L2 capture
//!
//! [`DeviceIo`] is the narrow set of driver operations the buffer pool and the
//! direct backend need. [`V4l2Device`] implements it on a real device node:
//! format and frame-interval negotiation go through the `v4l` crate, the mmap
//! buffer cycle uses raw ioctls on the same descriptor.

use std::io;
use std::ops::Deref;
use std::os::unix::io::RawFd;
use std::ptr::NonNull;
use std::time::Duration;

use tracing::debug;
use v4l::video::Capture;
use v4l::video::capture::Parameters;
use v4l::{Format, FourCC};

/// Format the driver settled on after a set-format request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedFormat {
    pub fourcc: [u8; 4],
    pub width: u32,
    pub height: u32,
}

/// A filled buffer handed back by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DequeuedBuffer {
    pub index: u32,
    pub bytes_used: usize,
}

/// Driver operations used by the direct capture path
pub trait DeviceIo {
    /// Memory shared with the driver for one buffer; unmapped on drop
    type Region: Deref<Target = [u8]>;

    /// Request a pixel format and size; returns what the driver applied
    fn set_format(&mut self, fourcc: [u8; 4], width: u32, height: u32)
    -> io::Result<NegotiatedFormat>;

    /// Request `1/fps` frame interval. `Ok(false)` if the device has no
    /// frame-interval control.
    fn set_frame_interval(&mut self, fps: u32) -> io::Result<bool>;

    /// Ask for `count` mmap buffers; returns how many were granted.
    /// A count of zero frees the driver-side buffers.
    fn request_buffers(&mut self, count: u32) -> io::Result<u32>;

    /// Map buffer `index` into this process
    fn map_buffer(&mut self, index: u32) -> io::Result<Self::Region>;

    /// Hand buffer `index` to the driver for filling
    fn queue_buffer(&mut self, index: u32) -> io::Result<()>;

    /// Wait up to `timeout` for a filled buffer. `Ok(false)` on timeout.
    fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool>;

    /// Take the next filled buffer from the driver
    fn dequeue_buffer(&mut self) -> io::Result<DequeuedBuffer>;

    fn stream_on(&mut self) -> io::Result<()>;

    fn stream_off(&mut self) -> io::Result<()>;

    /// Release the descriptor. Must be idempotent.
    fn close(&mut self);
}

// ===== V4L2 constants =====

const V4L2_BUF_TYPE_VIDEO_CAPTURE: u32 = 1;
const V4L2_MEMORY_MMAP: u32 = 1;

// ===== V4L2 ioctl Structures =====

/// Buffer request (struct v4l2_requestbuffers)
#[repr(C)]
struct V4l2RequestBuffers {
    count: u32,
    type_: u32,
    memory: u32,
    capabilities: u32,
    flags: u8,
    reserved: [u8; 3],
}

/// SMPTE timecode (struct v4l2_timecode)
#[repr(C)]
struct V4l2Timecode {
    type_: u32,
    flags: u32,
    frames: u8,
    seconds: u8,
    minutes: u8,
    hours: u8,
    userbits: [u8; 4],
}

/// Memory location union inside struct v4l2_buffer
#[repr(C)]
union V4l2BufferM {
    offset: u32,
    userptr: libc::c_ulong,
    planes: *mut libc::c_void,
    fd: i32,
}

/// Buffer descriptor (struct v4l2_buffer)
#[repr(C)]
struct V4l2Buffer {
    index: u32,
    type_: u32,
    bytesused: u32,
    flags: u32,
    field: u32,
    timestamp: libc::timeval,
    timecode: V4l2Timecode,
    sequence: u32,
    memory: u32,
    m: V4l2BufferM,
    length: u32,
    reserved2: u32,
    request_fd: i32,
}

impl V4l2Buffer {
    fn mmap_capture(index: u32) -> Self {
        let mut buf: V4l2Buffer = unsafe { std::mem::zeroed() };
        buf.index = index;
        buf.type_ = V4L2_BUF_TYPE_VIDEO_CAPTURE;
        buf.memory = V4L2_MEMORY_MMAP;
        buf
    }
}

// ===== V4L2 ioctl Numbers =====
// Calculated as: (dir << 30) | (size << 16) | ('V' << 8) | nr
// where dir: 1=WRITE, 3=READ|WRITE. Sizes follow the target's struct layout.

const IOC_WRITE: libc::c_ulong = 1;
const IOC_READ_WRITE: libc::c_ulong = 3;

const fn vidioc(dir: libc::c_ulong, nr: libc::c_ulong, size: usize) -> libc::c_ulong {
    (dir << 30) | ((size as libc::c_ulong) << 16) | ((b'V' as libc::c_ulong) << 8) | nr
}

const VIDIOC_REQBUFS: libc::c_ulong =
    vidioc(IOC_READ_WRITE, 8, std::mem::size_of::<V4l2RequestBuffers>());
const VIDIOC_QUERYBUF: libc::c_ulong = vidioc(IOC_READ_WRITE, 9, std::mem::size_of::<V4l2Buffer>());
const VIDIOC_QBUF: libc::c_ulong = vidioc(IOC_READ_WRITE, 15, std::mem::size_of::<V4l2Buffer>());
const VIDIOC_DQBUF: libc::c_ulong = vidioc(IOC_READ_WRITE, 17, std::mem::size_of::<V4l2Buffer>());
const VIDIOC_STREAMON: libc::c_ulong = vidioc(IOC_WRITE, 18, std::mem::size_of::<libc::c_int>());
const VIDIOC_STREAMOFF: libc::c_ulong = vidioc(IOC_WRITE, 19, std::mem::size_of::<libc::c_int>());

/// ioctl that retries on EINTR
fn xioctl<T>(fd: RawFd, request: libc::c_ulong, arg: &mut T) -> io::Result<()> {
    loop {
        let result = unsafe { libc::ioctl(fd, request as _, arg as *mut T) };
        if result != -1 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

/// One buffer mapped from the driver with `mmap`
pub struct MmapRegion {
    ptr: NonNull<u8>,
    len: usize,
}

impl Deref for MmapRegion {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for MmapRegion {
    fn drop(&mut self) {
        let result = unsafe { libc::munmap(self.ptr.as_ptr().cast(), self.len) };
        if result != 0 {
            debug!(error = %io::Error::last_os_error(), "munmap failed");
        }
    }
}

/// An open V4L2 capture node
pub struct V4l2Device {
    device: Option<v4l::Device>,
    path: String,
}

impl V4l2Device {
    /// Open a device node such as `/dev/video0`
    pub fn open(path: &str) -> io::Result<Self> {
        let device = v4l::Device::with_path(path)?;
        debug!(path, "Opened V4L2 device");
        Ok(Self {
            device: Some(device),
            path: path.to_string(),
        })
    }

    fn device(&self) -> io::Result<&v4l::Device> {
        self.device
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "device is closed"))
    }

    fn fd(&self) -> io::Result<RawFd> {
        Ok(self.device()?.handle().fd())
    }

    fn stream_ioctl(&mut self, request: libc::c_ulong) -> io::Result<()> {
        let fd = self.fd()?;
        let mut buf_type = V4L2_BUF_TYPE_VIDEO_CAPTURE as libc::c_int;
        xioctl(fd, request, &mut buf_type)
    }
}

impl DeviceIo for V4l2Device {
    type Region = MmapRegion;

    fn set_format(
        &mut self,
        fourcc: [u8; 4],
        width: u32,
        height: u32,
    ) -> io::Result<NegotiatedFormat> {
        let requested = Format::new(width, height, FourCC::new(&fourcc));
        let actual = self.device()?.set_format(&requested)?;
        Ok(NegotiatedFormat {
            fourcc: actual.fourcc.repr,
            width: actual.width,
            height: actual.height,
        })
    }

    fn set_frame_interval(&mut self, fps: u32) -> io::Result<bool> {
        let device = self.device()?;
        let params = device.params()?;
        if !params
            .capabilities
            .contains(v4l::parameters::Capabilities::TIME_PER_FRAME)
        {
            return Ok(false);
        }
        device.set_params(&Parameters::with_fps(fps))?;
        Ok(true)
    }

    fn request_buffers(&mut self, count: u32) -> io::Result<u32> {
        let fd = self.fd()?;
        let mut req = V4l2RequestBuffers {
            count,
            type_: V4L2_BUF_TYPE_VIDEO_CAPTURE,
            memory: V4L2_MEMORY_MMAP,
            capabilities: 0,
            flags: 0,
            reserved: [0; 3],
        };
        xioctl(fd, VIDIOC_REQBUFS, &mut req)?;
        Ok(req.count)
    }

    fn map_buffer(&mut self, index: u32) -> io::Result<MmapRegion> {
        let fd = self.fd()?;
        let mut buf = V4l2Buffer::mmap_capture(index);
        xioctl(fd, VIDIOC_QUERYBUF, &mut buf)?;

        let len = buf.length as usize;
        let offset = unsafe { buf.m.offset };
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                offset as libc::off_t,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        let ptr = NonNull::new(ptr.cast::<u8>())
            .ok_or_else(|| io::Error::other("mmap returned a null mapping"))?;
        Ok(MmapRegion { ptr, len })
    }

    fn queue_buffer(&mut self, index: u32) -> io::Result<()> {
        let fd = self.fd()?;
        let mut buf = V4l2Buffer::mmap_capture(index);
        xioctl(fd, VIDIOC_QBUF, &mut buf)
    }

    fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool> {
        let fd = self.fd()?;
        let mut pfd = libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

        let result = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if result < 0 {
            let err = io::Error::last_os_error();
            // A signal cut the wait short; report it as a miss
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(err);
        }
        if result == 0 {
            return Ok(false);
        }
        if pfd.revents & libc::POLLERR != 0 {
            return Err(io::Error::other("device reported POLLERR"));
        }
        Ok(pfd.revents & libc::POLLIN != 0)
    }

    fn dequeue_buffer(&mut self) -> io::Result<DequeuedBuffer> {
        let fd = self.fd()?;
        let mut buf = V4l2Buffer::mmap_capture(0);
        xioctl(fd, VIDIOC_DQBUF, &mut buf)?;
        Ok(DequeuedBuffer {
            index: buf.index,
            bytes_used: buf.bytesused as usize,
        })
    }

    fn stream_on(&mut self) -> io::Result<()> {
        self.stream_ioctl(VIDIOC_STREAMON)
    }

    fn stream_off(&mut self) -> io::Result<()> {
        self.stream_ioctl(VIDIOC_STREAMOFF)
    }

    fn close(&mut self) {
        if self.device.take().is_some() {
            debug!(path = %self.path, "Closed V4L2 device");
        }
    }
}
