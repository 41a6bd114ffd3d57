// SPDX-License-Identifier: GPL-3.0-only

//! Pixel format tags understood by the decoder

use std::fmt;

use crate::backends::camera::types::Channels;

/// Raw encodings a capture device may hand back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Motion JPEG - one compressed JPEG image per buffer
    Mjpeg,
    /// YUYV 4:2:2 - packed YUV (Y0 U Y1 V byte order)
    Yuyv,
    /// GREY/Y8 - 8-bit grayscale
    Grey,
    /// Y16 - 16-bit little-endian grayscale
    Y16,
    /// BGR 24-bit - packed B, G, R bytes
    Bgr24,
}

impl PixelFormat {
    /// Negotiation order for direct device capture, most preferred first
    pub const PREFERENCE: [PixelFormat; 5] = [
        PixelFormat::Mjpeg,
        PixelFormat::Yuyv,
        PixelFormat::Grey,
        PixelFormat::Y16,
        PixelFormat::Bgr24,
    ];

    /// V4L2 FourCC code for this format
    pub fn fourcc(&self) -> [u8; 4] {
        match self {
            PixelFormat::Mjpeg => *b"MJPG",
            PixelFormat::Yuyv => *b"YUYV",
            PixelFormat::Grey => *b"GREY",
            PixelFormat::Y16 => *b"Y16 ",
            PixelFormat::Bgr24 => *b"BGR3",
        }
    }

    /// Map a FourCC reported by a driver back to a decodable format
    pub fn from_fourcc(code: &[u8; 4]) -> Option<Self> {
        match code {
            b"MJPG" | b"JPEG" => Some(PixelFormat::Mjpeg),
            b"YUYV" | b"YUY2" => Some(PixelFormat::Yuyv),
            b"GREY" | b"Y8  " => Some(PixelFormat::Grey),
            b"Y16 " => Some(PixelFormat::Y16),
            b"BGR3" => Some(PixelFormat::Bgr24),
            _ => None,
        }
    }

    /// Bytes per pixel for uncompressed formats, `None` for MJPEG
    pub fn bytes_per_pixel(&self) -> Option<usize> {
        match self {
            PixelFormat::Mjpeg => None,
            PixelFormat::Yuyv | PixelFormat::Y16 => Some(2),
            PixelFormat::Grey => Some(1),
            PixelFormat::Bgr24 => Some(3),
        }
    }

    /// Channel layout of the decoded output
    pub fn decoded_channels(&self) -> Channels {
        match self {
            PixelFormat::Grey | PixelFormat::Y16 => Channels::Gray,
            PixelFormat::Mjpeg | PixelFormat::Yuyv | PixelFormat::Bgr24 => Channels::Bgr,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self.fourcc();
        write!(f, "{}", String::from_utf8_lossy(&code).trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_mapping_is_reversible() {
        for format in PixelFormat::PREFERENCE {
            assert_eq!(PixelFormat::from_fourcc(&format.fourcc()), Some(format));
        }
    }

    #[test]
    fn test_aliases_and_unknown_codes() {
        assert_eq!(PixelFormat::from_fourcc(b"JPEG"), Some(PixelFormat::Mjpeg));
        assert_eq!(PixelFormat::from_fourcc(b"NV12"), None);
    }

    #[test]
    fn test_display_trims_padding() {
        assert_eq!(PixelFormat::Y16.to_string(), "Y16");
        assert_eq!(PixelFormat::Mjpeg.to_string(), "MJPG");
    }
}
