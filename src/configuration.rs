//! Extraction configuration.
//!
//! [`ExtractOptions`] is a builder that threads progress callbacks,
//! cancellation tokens, tone mapping and decode settings through the
//! [`ExtractionEngine`](crate::ExtractionEngine) without widening every
//! function signature.
//!
//! # Example
//!
//! ```no_run
//! use std::{sync::Arc, time::Duration};
//!
//! use movieprint::{
//!     CancellationToken, ExtractOptions, ProgressCallback, ProgressInfo, ToneMapAlgorithm,
//!     WorkingStorage,
//! };
//!
//! struct LogProgress;
//! impl ProgressCallback for LogProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         println!("{:?}: {} done", info.operation, info.current);
//!     }
//! }
//!
//! let token = CancellationToken::new();
//! let options = ExtractOptions::new()
//!     .with_progress(Arc::new(LogProgress))
//!     .with_cancellation(token.clone())
//!     .with_tone_map_algorithm(ToneMapAlgorithm::Reinhard)
//!     .with_decode_timeout(Some(Duration::from_secs(5)))
//!     .with_working_storage(WorkingStorage::TempDirectory);
//! ```

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use image::ImageFormat;

use crate::extraction::FaceDetector;
use crate::progress::{CancellationToken, NoOpProgress, ProgressCallback};
use crate::tonemap::ToneMapAlgorithm;

/// Default per-frame decode time limit.
pub const DEFAULT_DECODE_TIMEOUT: Duration = Duration::from_secs(10);

/// HDR → SDR tone mapping settings.
///
/// Only consulted for sources probed as HDR; SDR sources are never
/// transformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToneMapping {
    /// Whether HDR sources are tone-mapped at all.
    pub enabled: bool,
    /// Curve used when enabled.
    pub algorithm: ToneMapAlgorithm,
}

impl Default for ToneMapping {
    fn default() -> Self {
        Self {
            enabled: true,
            algorithm: ToneMapAlgorithm::Hable,
        }
    }
}

/// Where decoded frame images live between extraction and composition.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum WorkingStorage {
    /// Keep decoded images in memory.
    #[default]
    InMemory,
    /// Spill images to a temporary directory removed when the engine is
    /// dropped.
    TempDirectory,
    /// Spill images to a caller-owned directory that is kept.
    Directory(PathBuf),
}

/// File format of spilled frame images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameFormat {
    /// Lossless; larger files.
    #[default]
    Png,
    /// Smaller files at the cost of a lossy round trip.
    Jpeg,
}

impl FrameFormat {
    /// Parse `"png"`, `"jpg"` or `"jpeg"`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "png" => Some(FrameFormat::Png),
            "jpg" | "jpeg" => Some(FrameFormat::Jpeg),
            _ => None,
        }
    }

    /// File extension used for spilled frames.
    pub fn extension(self) -> &'static str {
        match self {
            FrameFormat::Png => "png",
            FrameFormat::Jpeg => "jpg",
        }
    }

    pub(crate) fn image_format(self) -> ImageFormat {
        match self {
            FrameFormat::Png => ImageFormat::Png,
            FrameFormat::Jpeg => ImageFormat::Jpeg,
        }
    }
}

/// Configuration for extraction runs.
///
/// All fields have sensible defaults: a default-constructed value decodes
/// in memory, tone-maps HDR with Hable, uses software decoding and gives
/// each frame ten seconds.
#[derive(Clone)]
pub struct ExtractOptions {
    pub(crate) progress: Arc<dyn ProgressCallback>,
    pub(crate) cancellation: Option<CancellationToken>,
    pub(crate) batch_size: u64,
    pub(crate) decode_timeout: Option<Duration>,
    pub(crate) tone_mapping: ToneMapping,
    pub(crate) use_hardware: bool,
    pub(crate) max_dimension: Option<u32>,
    pub(crate) working_storage: WorkingStorage,
    pub(crate) frame_format: FrameFormat,
    pub(crate) face_detector: Option<Arc<dyn FaceDetector>>,
}

impl Debug for ExtractOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ExtractOptions")
            .field("has_cancellation", &self.cancellation.is_some())
            .field("batch_size", &self.batch_size)
            .field("decode_timeout", &self.decode_timeout)
            .field("tone_mapping", &self.tone_mapping)
            .field("use_hardware", &self.use_hardware)
            .field("max_dimension", &self.max_dimension)
            .field("working_storage", &self.working_storage)
            .field("frame_format", &self.frame_format)
            .field("has_face_detector", &self.face_detector.is_some())
            .finish()
    }
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self {
            progress: Arc::new(NoOpProgress),
            cancellation: None,
            batch_size: 1,
            decode_timeout: Some(DEFAULT_DECODE_TIMEOUT),
            tone_mapping: ToneMapping::default(),
            use_hardware: false,
            max_dimension: None,
            working_storage: WorkingStorage::InMemory,
            frame_format: FrameFormat::Png,
            face_detector: None,
        }
    }

    /// Attach a progress callback.
    ///
    /// The callback fires every [`batch_size`](ExtractOptions::with_batch_size)
    /// completed frames.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Attach a cancellation token.
    ///
    /// The engine checks the token before each per-frame decode and returns
    /// [`ExtractionError::Cancelled`](crate::ExtractionError::Cancelled).
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Set how often the progress callback fires. Clamped to at least 1.
    #[must_use]
    pub fn with_batch_size(mut self, size: u64) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Limit how long a single frame may take to decode. `None` waits
    /// forever.
    #[must_use]
    pub fn with_decode_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.decode_timeout = timeout;
        self
    }

    /// Replace the tone mapping settings.
    #[must_use]
    pub fn with_tone_mapping(mut self, tone_mapping: ToneMapping) -> Self {
        self.tone_mapping = tone_mapping;
        self
    }

    /// Enable tone mapping with the given curve.
    #[must_use]
    pub fn with_tone_map_algorithm(mut self, algorithm: ToneMapAlgorithm) -> Self {
        self.tone_mapping = ToneMapping {
            enabled: true,
            algorithm,
        };
        self
    }

    /// Ask the adapter for hardware-accelerated decoding.
    #[must_use]
    pub fn with_hardware(mut self, use_hardware: bool) -> Self {
        self.use_hardware = use_hardware;
        self
    }

    /// Downscale decoded frames so their longest edge fits.
    #[must_use]
    pub fn with_max_dimension(mut self, max_dimension: Option<u32>) -> Self {
        self.max_dimension = max_dimension.filter(|&value| value > 0);
        self
    }

    /// Choose where decoded frames are kept.
    #[must_use]
    pub fn with_working_storage(mut self, storage: WorkingStorage) -> Self {
        self.working_storage = storage;
        self
    }

    /// Choose the file format of spilled frames. Ignored for in-memory
    /// storage.
    #[must_use]
    pub fn with_frame_format(mut self, format: FrameFormat) -> Self {
        self.frame_format = format;
        self
    }

    /// Run a face detector on each decoded frame.
    #[must_use]
    pub fn with_face_detector(mut self, detector: Arc<dyn FaceDetector>) -> Self {
        self.face_detector = Some(detector);
        self
    }

    /// Current tone mapping settings.
    pub fn tone_mapping(&self) -> ToneMapping {
        self.tone_mapping
    }

    /// Current per-frame decode limit.
    pub fn decode_timeout(&self) -> Option<Duration> {
        self.decode_timeout
    }

    /// Current working storage policy.
    pub fn working_storage(&self) -> &WorkingStorage {
        &self.working_storage
    }

    /// Copy of these options with a different cancellation token.
    pub(crate) fn cancelled_by(&self, token: CancellationToken) -> Self {
        let mut options = self.clone();
        options.cancellation = Some(token);
        options
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }
}
