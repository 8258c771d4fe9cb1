//! The Decode Adapter capability interface.
//!
//! The core never talks to a codec library directly. It depends on
//! [`DecodeAdapter`], which can probe a file and return one decoded frame at
//! a timestamp. [`FfmpegDecoder`](crate::FfmpegDecoder) is the bundled
//! implementation; tests and alternative backends provide their own.

use std::path::Path;
use std::time::Duration;

use image::DynamicImage;

use crate::error::DecodeError;
use crate::source::{ProbeInfo, VideoSource};
use crate::tonemap::ToneMapAlgorithm;

/// Per-call decode settings.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[must_use]
pub struct DecodeRequest {
    /// Tone-map HDR pixels to SDR with this algorithm. `None` returns the
    /// frame without an HDR transform.
    pub tone_map: Option<ToneMapAlgorithm>,
    /// Ask for the hardware decode path. Adapters without one fall back to
    /// software and say so in [`DecodedFrame::hardware_fallback`].
    pub use_hardware: bool,
    /// Scale the frame so its longest edge is at most this many pixels.
    pub max_dimension: Option<u32>,
}

impl DecodeRequest {
    /// A plain software decode with no transforms.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request tone-mapped output.
    pub fn with_tone_map(mut self, algorithm: ToneMapAlgorithm) -> Self {
        self.tone_map = Some(algorithm);
        self
    }

    /// Request the hardware decode path.
    pub fn with_hardware(mut self, use_hardware: bool) -> Self {
        self.use_hardware = use_hardware;
        self
    }

    /// Limit the decoded frame's longest edge.
    pub fn with_max_dimension(mut self, max_dimension: Option<u32>) -> Self {
        self.max_dimension = max_dimension;
        self
    }
}

/// One decoded frame plus how it was produced.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    /// Decoded RGB pixels.
    pub image: DynamicImage,
    /// Presentation timestamp of the frame actually returned.
    pub timestamp: Duration,
    /// Whether a tone-mapping transform was applied.
    pub tone_mapped: bool,
    /// Whether the hardware path produced this frame.
    pub hardware_used: bool,
    /// Set when hardware was requested but the adapter used software, with
    /// the reason. Diagnostic only.
    pub hardware_fallback: Option<String>,
}

/// Capability interface over a video decoding backend.
///
/// Implementations must be usable from worker threads. The engine may call
/// `decode_at` concurrently; an adapter whose backend handle is not
/// thread-safe must serialise calls internally.
pub trait DecodeAdapter: Send + Sync {
    /// Read duration, frame rate, dimensions and dynamic range.
    fn probe(&self, path: &Path) -> Result<ProbeInfo, DecodeError>;

    /// Decode the frame displayed at `timestamp`.
    fn decode_at(
        &self,
        source: &VideoSource,
        timestamp: Duration,
        request: &DecodeRequest,
    ) -> Result<DecodedFrame, DecodeError>;
}
