// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 device discovery
//!
//! Scans `/dev/video*` and keeps the nodes that can capture frames, skipping
//! metadata and output-only nodes that UVC drivers also register.

use super::types::DeviceInfo;
use crate::constants::paths;
use std::os::unix::io::{AsRawFd, RawFd};
use tracing::debug;

/// VIDIOC_QUERYCAP ioctl number
const VIDIOC_QUERYCAP: libc::c_ulong = 0x80685600;

/// Single-planar video capture capability
const V4L2_CAP_VIDEO_CAPTURE: u32 = 0x0000_0001;
/// Device caps field is valid
const V4L2_CAP_DEVICE_CAPS: u32 = 0x8000_0000;

/// V4L2 capability structure for VIDIOC_QUERYCAP ioctl
#[repr(C)]
struct V4l2Capability {
    driver: [u8; 16],
    card: [u8; 32],
    bus_info: [u8; 32],
    version: u32,
    capabilities: u32,
    device_caps: u32,
    reserved: [u32; 3],
}

impl V4l2Capability {
    /// Capabilities of this node rather than the whole physical device
    fn node_caps(&self) -> u32 {
        if self.capabilities & V4L2_CAP_DEVICE_CAPS != 0 {
            self.device_caps
        } else {
            self.capabilities
        }
    }
}

/// Query V4L2 capabilities for an open file descriptor.
///
/// Issues the `VIDIOC_QUERYCAP` ioctl and returns the capability struct,
/// or `None` if the ioctl fails.
fn query_v4l2_cap(fd: RawFd) -> Option<V4l2Capability> {
    let mut cap: V4l2Capability = unsafe { std::mem::zeroed() };
    let result = unsafe { libc::ioctl(fd, VIDIOC_QUERYCAP as _, &mut cap as *mut V4l2Capability) };
    if result < 0 { None } else { Some(cap) }
}

fn c_string(bytes: &[u8]) -> String {
    let len = bytes.iter().position(|&c| c == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..len]).trim().to_string()
}

/// Get V4L2 driver name using ioctl
///
/// Returns None if the device cannot be opened or the ioctl fails.
pub fn get_v4l2_driver(device_path: &str) -> Option<String> {
    let file = std::fs::File::open(device_path).ok()?;
    let cap = query_v4l2_cap(file.as_raw_fd())?;
    let driver = c_string(&cap.driver);

    debug!(device_path, driver = %driver, "Got V4L2 driver name");
    Some(driver)
}

/// Build DeviceInfo from V4L2 device path and optional card name
///
/// Resolves symlinks to get the real device path and queries the driver name.
pub fn build_device_info(v4l2_path: &str, card: Option<&str>) -> DeviceInfo {
    let real_path = std::fs::canonicalize(v4l2_path)
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| v4l2_path.to_string());

    let driver = get_v4l2_driver(v4l2_path).unwrap_or_default();

    DeviceInfo {
        card: card.unwrap_or_default().to_string(),
        driver,
        path: v4l2_path.to_string(),
        real_path,
    }
}

/// Query one node; `None` unless it can capture video
pub fn probe_capture_device(path: &str) -> Option<DeviceInfo> {
    let file = std::fs::File::open(path).ok()?;
    let cap = query_v4l2_cap(file.as_raw_fd())?;

    if cap.node_caps() & V4L2_CAP_VIDEO_CAPTURE == 0 {
        debug!(path, "Skipping non-capture node");
        return None;
    }

    let card = c_string(&cap.card);
    Some(build_device_info(path, Some(&card)))
}

/// Capture-capable `/dev/video*` nodes, ordered by node number
pub fn enumerate_capture_devices() -> Vec<DeviceInfo> {
    let entries = match std::fs::read_dir("/dev") {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut nodes: Vec<(u32, String)> = entries
        .flatten()
        .filter_map(|entry| {
            let path = entry.path().to_string_lossy().to_string();
            let number = video_node_number(&path)?;
            Some((number, path))
        })
        .collect();
    nodes.sort();

    let devices: Vec<DeviceInfo> = nodes
        .iter()
        .filter_map(|(_, path)| probe_capture_device(path))
        .collect();
    debug!(
        nodes = nodes.len(),
        capture = devices.len(),
        "Enumerated V4L2 devices"
    );
    devices
}

/// `N` for a `/dev/videoN` path
pub fn video_node_number(path: &str) -> Option<u32> {
    path.strip_prefix(paths::VIDEO_DEVICE_PREFIX)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_node_number() {
        assert_eq!(video_node_number("/dev/video12"), Some(12));
        assert_eq!(video_node_number("/dev/video"), None);
        assert_eq!(video_node_number("/dev/v4l-subdev0"), None);
    }

    #[test]
    fn test_c_string_stops_at_nul() {
        assert_eq!(c_string(b"uvcvideo\0\0\0"), "uvcvideo");
        assert_eq!(c_string(b"full"), "full");
    }

    #[test]
    fn test_missing_node_is_not_a_capture_device() {
        assert!(probe_capture_device("/dev/video-does-not-exist").is_none());
    }
}
