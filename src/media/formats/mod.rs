// SPDX-License-Identifier: GPL-3.0-only

//! Pixel format tags shared by the device backends and the decoder

pub mod pixel_format;

pub use pixel_format::PixelFormat;
