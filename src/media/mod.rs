// SPDX-License-Identifier: GPL-3.0-only

//! Media utilities for turning raw capture buffers into images
//!
//! # Modules
//!
//! - [`formats`]: pixel format tags and their FourCC codes
//! - [`decoders`]: raw buffer to [`DecodedFrame`](crate::backends::camera::DecodedFrame)
//!   conversion (JPEG, packed YUV, greyscale, BGR)

pub mod decoders;
pub mod formats;

// Re-export commonly used types
pub use decoders::decode;
pub use formats::PixelFormat;
