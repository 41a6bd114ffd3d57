// SPDX-License-Identifier: GPL-3.0-only

//! Error types for capture sources
//!
//! Errors are split by when they can happen:
//!
//! - [`CaptureError`]: opening a source or resolving a slot. These never abort
//!   the process; the resolver treats them as "try the next candidate".
//! - [`FrameError`]: a single `read_frame()` call. Always recoverable, the
//!   backend stays usable for the next tick.
//! - [`DecodeError`]: the pixel decoder rejected one buffer.

use std::fmt;

/// Result type alias using CaptureError
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Failures while constructing a backend or resolving a slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// Device node, index or pipeline could not be obtained
    OpenFailure(String),
    /// Device accepted none of the decodable pixel formats
    FormatNegotiationFailure(String),
    /// Driver granted fewer buffers than double-buffering needs
    BufferAllocationFailure(String),
    /// Device refused to start streaming
    StreamStartFailure(String),
    /// Every candidate for a slot failed to open or validate
    AllCandidatesExhausted {
        /// Number of candidates that were tried
        attempted: usize,
    },
    /// Configuration could not be loaded or parsed
    Config(String),
}

/// Per-frame failures; none of them invalidate the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// No frame arrived before the read timeout
    Timeout,
    /// A frame arrived but could not be decoded
    Decode(DecodeError),
    /// The device or pipeline reported an error for this read
    Device(String),
    /// The pipeline reached end-of-stream
    EndOfStream,
    /// The backend has been closed
    NotOpened,
}

/// Pixel decoder failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Buffer holds no bytes
    Empty,
    /// Width or height is zero
    ZeroDimensions,
    /// Buffer shorter than the uncompressed frame
    ShortBuffer {
        /// Bytes required for the declared geometry
        expected: usize,
        /// Bytes actually present
        actual: usize,
    },
    /// Compressed stream could not be decoded
    Malformed(String),
    /// Format tag has no decoder
    Unsupported(String),
}

impl CaptureError {
    /// Whether the error belongs to backend construction (as opposed to slot
    /// resolution or configuration)
    pub fn is_open_time(&self) -> bool {
        matches!(
            self,
            CaptureError::OpenFailure(_)
                | CaptureError::FormatNegotiationFailure(_)
                | CaptureError::BufferAllocationFailure(_)
                | CaptureError::StreamStartFailure(_)
        )
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::OpenFailure(msg) => write!(f, "Could not open source: {}", msg),
            CaptureError::FormatNegotiationFailure(msg) => {
                write!(f, "No acceptable pixel format: {}", msg)
            }
            CaptureError::BufferAllocationFailure(msg) => {
                write!(f, "Buffer allocation failed: {}", msg)
            }
            CaptureError::StreamStartFailure(msg) => write!(f, "Stream start failed: {}", msg),
            CaptureError::AllCandidatesExhausted { attempted } => {
                write!(f, "No camera available ({} candidates tried)", attempted)
            }
            CaptureError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Timeout => write!(f, "Timed out waiting for a frame"),
            FrameError::Decode(e) => write!(f, "Frame decode failed: {}", e),
            FrameError::Device(msg) => write!(f, "Device error: {}", msg),
            FrameError::EndOfStream => write!(f, "End of stream"),
            FrameError::NotOpened => write!(f, "Source is not open"),
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Empty => write!(f, "empty buffer"),
            DecodeError::ZeroDimensions => write!(f, "zero width or height"),
            DecodeError::ShortBuffer { expected, actual } => {
                write!(f, "buffer too short ({} of {} bytes)", actual, expected)
            }
            DecodeError::Malformed(msg) => write!(f, "malformed stream: {}", msg),
            DecodeError::Unsupported(tag) => write!(f, "unsupported format {}", tag),
        }
    }
}

impl std::error::Error for CaptureError {}
impl std::error::Error for FrameError {}
impl std::error::Error for DecodeError {}

impl From<DecodeError> for FrameError {
    fn from(err: DecodeError) -> Self {
        FrameError::Decode(err)
    }
}

impl From<std::io::Error> for FrameError {
    fn from(err: std::io::Error) -> Self {
        FrameError::Device(err.to_string())
    }
}

impl From<serde_json::Error> for CaptureError {
    fn from(err: serde_json::Error) -> Self {
        CaptureError::Config(err.to_string())
    }
}
