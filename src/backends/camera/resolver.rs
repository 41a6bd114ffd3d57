// SPDX-License-Identifier: GPL-3.0-only

//! Pick the first working source from a candidate list
//!
//! A candidate counts as working only once it has produced a frame: sources
//! that open but never deliver (a busy node, a pipeline with no camera behind
//! it) are closed and skipped.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::types::{CaptureRequest, CaptureSource, DecodedFrame};
use super::{BackendOptions, CaptureBackend, open_backend};
use crate::constants::timing;
use crate::errors::{CaptureError, CaptureResult, FrameError};

/// Warmup and validation timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverOptions {
    /// Frames are read and discarded for this long after opening
    pub warmup: Duration,
    /// Bound for the validation read that follows warmup
    pub read_timeout: Duration,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            warmup: Duration::from_millis(timing::WARMUP_MS),
            read_timeout: Duration::from_millis(timing::VALIDATION_TIMEOUT_MS),
        }
    }
}

/// A validated, streaming source
pub struct ResolvedSource {
    pub source: CaptureSource,
    /// Position of `source` in the candidate list
    pub position: usize,
    pub backend: Box<dyn CaptureBackend>,
    /// Frame read during validation
    pub first_frame: DecodedFrame,
}

impl std::fmt::Debug for ResolvedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSource")
            .field("source", &self.source)
            .field("position", &self.position)
            .field("backend", &self.backend.describe())
            .field("first_frame", &self.first_frame)
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SourceResolver {
    options: ResolverOptions,
    backend_options: BackendOptions,
}

impl SourceResolver {
    pub fn new(options: ResolverOptions, backend_options: BackendOptions) -> Self {
        Self {
            options,
            backend_options,
        }
    }

    /// Open candidates in order with the real backends
    pub fn resolve(
        &self,
        candidates: &[CaptureSource],
        request: &CaptureRequest,
    ) -> CaptureResult<ResolvedSource> {
        let backend_options = self.backend_options;
        self.resolve_with(candidates, request, |source, request| {
            open_backend(source, request, &backend_options)
        })
    }

    /// Open candidates in order through `open`
    ///
    /// Returns the first candidate that opens and yields a frame, or
    /// [`CaptureError::AllCandidatesExhausted`].
    pub fn resolve_with<F>(
        &self,
        candidates: &[CaptureSource],
        request: &CaptureRequest,
        mut open: F,
    ) -> CaptureResult<ResolvedSource>
    where
        F: FnMut(&CaptureSource, &CaptureRequest) -> CaptureResult<Box<dyn CaptureBackend>>,
    {
        for (position, source) in candidates.iter().enumerate() {
            debug!(position, source = %source, "Trying capture source");

            let mut backend = match open(source, request) {
                Ok(backend) if backend.is_opened() => backend,
                Ok(_) => {
                    debug!(source = %source, "Backend reported closed after open");
                    continue;
                }
                Err(e) => {
                    info!(source = %source, error = %e, "Capture source failed to open");
                    continue;
                }
            };

            let discarded = self.warm_up(backend.as_mut());
            debug!(source = %source, discarded, "Warmup finished");

            match self.validate(backend.as_mut()) {
                Some(first_frame) => {
                    info!(
                        source = %source,
                        backend = %backend.describe(),
                        width = first_frame.width,
                        height = first_frame.height,
                        "Capture source ready"
                    );
                    return Ok(ResolvedSource {
                        source: source.clone(),
                        position,
                        backend,
                        first_frame,
                    });
                }
                None => {
                    warn!(source = %source, "Capture source opened but delivered no frame");
                    backend.close();
                }
            }
        }

        warn!(attempted = candidates.len(), "No capture source available");
        Err(CaptureError::AllCandidatesExhausted {
            attempted: candidates.len(),
        })
    }

    /// Read and drop frames until the warmup window closes
    fn warm_up(&self, backend: &mut dyn CaptureBackend) -> usize {
        let start = Instant::now();
        let mut discarded = 0;

        loop {
            let Some(remaining) = self.options.warmup.checked_sub(start.elapsed()) else {
                break;
            };
            if remaining.is_zero() {
                break;
            }
            match backend.read_frame_timeout(remaining) {
                Ok(_) => discarded += 1,
                Err(FrameError::Timeout) | Err(FrameError::Decode(_)) => {}
                Err(e) => {
                    debug!(error = %e, "Warmup read failed");
                    break;
                }
            }
        }

        discarded
    }

    /// First frame within the read timeout; decode misses are retried
    fn validate(&self, backend: &mut dyn CaptureBackend) -> Option<DecodedFrame> {
        let deadline = Instant::now() + self.options.read_timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            match backend.read_frame_timeout(remaining) {
                Ok(frame) => return Some(frame),
                Err(FrameError::Timeout) => {}
                Err(FrameError::Decode(e)) => debug!(error = %e, "Validation frame undecodable"),
                Err(e) => {
                    debug!(error = %e, "Validation read failed");
                    return None;
                }
            }
        }
    }
}
