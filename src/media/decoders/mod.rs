// SPDX-License-Identifier: GPL-3.0-only

//! Raw capture buffer decoding
//!
//! [`decode`] turns whatever the driver handed back into a [`DecodedFrame`]:
//! 3-channel BGR for colour formats, 1-channel grey for greyscale formats.
//! Failures are per-buffer; callers treat them like a missed read.

pub mod converters;

use crate::backends::camera::types::{Channels, DecodedFrame};
use crate::errors::DecodeError;
use crate::media::formats::PixelFormat;

/// Decode one raw buffer of the given format and declared geometry
///
/// For MJPEG the dimensions stored in the JPEG stream win over the declared
/// ones; uncompressed formats must be at least `width * height * bpp` bytes.
pub fn decode(
    raw: &[u8],
    format: PixelFormat,
    width: u32,
    height: u32,
) -> Result<DecodedFrame, DecodeError> {
    if raw.is_empty() {
        return Err(DecodeError::Empty);
    }

    let Some(bpp) = format.bytes_per_pixel() else {
        return decode_jpeg(raw);
    };
    check_length(raw, width, height, bpp)?;

    let data = match format {
        PixelFormat::Yuyv => converters::yuyv_to_bgr(raw, width, height),
        PixelFormat::Y16 => converters::grey16_to_grey8(raw, width, height),
        PixelFormat::Grey | PixelFormat::Bgr24 => converters::copy_packed(raw, width, height, bpp),
        PixelFormat::Mjpeg => return decode_jpeg(raw),
    };

    Ok(DecodedFrame::new(
        width,
        height,
        format.decoded_channels(),
        data,
    ))
}

fn check_length(raw: &[u8], width: u32, height: u32, bpp: usize) -> Result<(), DecodeError> {
    if width == 0 || height == 0 {
        return Err(DecodeError::ZeroDimensions);
    }

    let expected = width as usize * height as usize * bpp;
    if raw.len() < expected {
        return Err(DecodeError::ShortBuffer {
            expected,
            actual: raw.len(),
        });
    }

    Ok(())
}

fn decode_jpeg(raw: &[u8]) -> Result<DecodedFrame, DecodeError> {
    let image = image::load_from_memory_with_format(raw, image::ImageFormat::Jpeg)
        .map_err(|e| DecodeError::Malformed(e.to_string()))?;

    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    if width == 0 || height == 0 {
        return Err(DecodeError::ZeroDimensions);
    }

    let mut data = rgb.into_raw();
    converters::swap_red_blue(&mut data);

    Ok(DecodedFrame::new(width, height, Channels::Bgr, data))
}
