//! Video source handles.
//!
//! A [`VideoSource`] is created once per input by probing it through a
//! [`DecodeAdapter`](crate::DecodeAdapter) and is read-only afterwards. It is
//! cheap to clone; every clone shares the same probe result.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use crate::decode::DecodeAdapter;
use crate::error::DecodeError;

/// Transfer function of an HDR stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferFunction {
    /// SMPTE ST 2084 perceptual quantizer (HDR10, Dolby Vision base layer).
    Pq,
    /// ARIB STD-B67 hybrid log-gamma.
    Hlg,
}

/// Dynamic-range classification of a video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DynamicRange {
    /// Standard dynamic range (BT.709 / sRGB-like transfer).
    #[default]
    Sdr,
    /// High dynamic range with the given transfer function.
    Hdr(TransferFunction),
}

impl DynamicRange {
    /// Returns `true` for HDR content.
    pub fn is_hdr(self) -> bool {
        matches!(self, DynamicRange::Hdr(_))
    }
}

/// What a Decode Adapter learns about a file without decoding frames.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct ProbeInfo {
    /// Total duration of the video stream.
    pub duration: Duration,
    /// Average frames per second (0.0 when unknown).
    pub frames_per_second: f64,
    /// Native frame width in pixels.
    pub width: u32,
    /// Native frame height in pixels.
    pub height: u32,
    /// SDR/HDR classification.
    pub dynamic_range: DynamicRange,
    /// Whether a hardware decode path is available for this stream.
    pub hardware_decode_available: bool,
    /// Codec name (e.g. `"h264"`, `"hevc"`).
    pub codec: String,
}

/// Immutable handle to a probed video file.
///
/// # Example
///
/// ```no_run
/// use movieprint::{FfmpegDecoder, VideoSource};
///
/// let decoder = FfmpegDecoder::new();
/// let source = VideoSource::open("input.mp4", &decoder)?;
/// println!("{:?} @ {} fps", source.duration(), source.frames_per_second());
/// # Ok::<(), movieprint::DecodeError>(())
/// ```
#[derive(Debug, Clone)]
pub struct VideoSource {
    inner: Arc<SourceInner>,
}

#[derive(Debug)]
struct SourceInner {
    path: PathBuf,
    info: ProbeInfo,
}

impl VideoSource {
    /// Probe `path` with `adapter` and build a source handle.
    ///
    /// # Errors
    ///
    /// Returns whatever the adapter's `probe` returns.
    pub fn open<P: AsRef<Path>>(
        path: P,
        adapter: &dyn DecodeAdapter,
    ) -> Result<Self, DecodeError> {
        let path = path.as_ref();
        log::debug!("Probing video source: {}", path.display());
        let info = adapter.probe(path)?;
        Ok(Self::from_probe(path, info))
    }

    /// Build a source handle from an already known probe result.
    pub fn from_probe<P: Into<PathBuf>>(path: P, info: ProbeInfo) -> Self {
        Self {
            inner: Arc::new(SourceInner {
                path: path.into(),
                info,
            }),
        }
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// File name for display purposes.
    pub fn display_name(&self) -> String {
        self.inner
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.inner.path.display().to_string())
    }

    /// Full probe result.
    pub fn info(&self) -> &ProbeInfo {
        &self.inner.info
    }

    /// Duration of the video stream.
    pub fn duration(&self) -> Duration {
        self.inner.info.duration
    }

    /// Average frame rate; 0.0 when unknown.
    pub fn frames_per_second(&self) -> f64 {
        self.inner.info.frames_per_second
    }

    /// Native `(width, height)`.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.inner.info.width, self.inner.info.height)
    }

    /// SDR/HDR classification.
    pub fn dynamic_range(&self) -> DynamicRange {
        self.inner.info.dynamic_range
    }

    /// Convert a timestamp to the nearest frame index.
    pub fn frame_number_at(&self, timestamp: Duration) -> u64 {
        crate::conversion::timestamp_to_frame_number(timestamp, self.frames_per_second())
    }

    /// Whether two handles refer to the same probe (same `open` call).
    pub fn same_handle(&self, other: &VideoSource) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
