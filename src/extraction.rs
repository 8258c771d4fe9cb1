//! The Extraction Engine.
//!
//! [`ExtractionEngine`] drives a [`DecodeAdapter`] over a planned instant
//! list on a bounded rayon pool and assembles one [`FrameRecord`] per
//! instant, in sequence order no matter which decode finishes first.
//!
//! A single bad frame never fails a run: it becomes a
//! [`FrameImage::Failed`] placeholder. Only adapter-level failures
//! ([`DecodeError::is_fatal`]) and cancellation abort extraction.

use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
        mpsc,
    },
    thread,
    time::Duration,
};

use image::DynamicImage;
use rayon::ThreadPool;
use tempfile::TempDir;

use crate::configuration::{ExtractOptions, WorkingStorage};
use crate::decode::{DecodeAdapter, DecodeRequest, DecodedFrame};
use crate::error::{CompositionError, DecodeError, ExtractionError};
use crate::planner::{PlannedInstant, ShotSpan};
use crate::progress::{OperationType, ProgressTracker};
use crate::source::VideoSource;

/// A detected face, in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FaceBox {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Optional face-detection capability run on every decoded frame.
pub trait FaceDetector: Send + Sync {
    /// Faces found in `image`.
    fn detect(&self, image: &DynamicImage) -> Vec<FaceBox>;
}

/// Where a record's pixels are.
#[derive(Debug, Clone)]
pub enum FrameImage {
    /// Decoded image held in memory.
    Memory(Arc<DynamicImage>),
    /// Decoded image spilled to a PNG file.
    File(PathBuf),
    /// Decoding failed; the cell renders as a placeholder.
    Failed(String),
    /// The pixels were dropped after composition.
    Released,
}

/// One sampled instant and its decoded image.
#[derive(Debug, Clone)]
pub struct FrameRecord {
    /// Position in the print; equals the layout slot index.
    pub sequence_index: usize,
    /// Source time this record was decoded at.
    pub source_timestamp: Duration,
    /// `round(source_timestamp × fps)`.
    pub frame_number: u64,
    /// Decoded pixels or a failure marker.
    pub image: FrameImage,
    /// Frame width in pixels (nominal size for placeholders).
    pub width: u32,
    /// Frame height in pixels (nominal size for placeholders).
    pub height: u32,
    /// Whether an HDR → SDR transform was applied.
    pub tone_mapped: bool,
    /// Whether the hardware decode path produced the frame.
    pub hardware_decoded: bool,
    /// Faces, when a detector is configured.
    pub face_boxes: Option<Vec<FaceBox>>,
    /// Shot this record represents (shot mode).
    pub shot: Option<ShotSpan>,
}

impl FrameRecord {
    /// Whether decoding failed for this slot.
    pub fn is_placeholder(&self) -> bool {
        matches!(self.image, FrameImage::Failed(_))
    }

    /// The decode error message for a placeholder slot.
    pub fn error(&self) -> Option<&str> {
        match &self.image {
            FrameImage::Failed(reason) => Some(reason),
            _ => None,
        }
    }

    /// Whether the pixels are still available for rendering.
    pub fn has_pixels(&self) -> bool {
        matches!(self.image, FrameImage::Memory(_) | FrameImage::File(_))
    }

    /// Width over height; 1.0 for degenerate sizes.
    pub fn aspect_ratio(&self) -> f64 {
        if self.width == 0 || self.height == 0 {
            1.0
        } else {
            self.width as f64 / self.height as f64
        }
    }

    /// Load the pixels. `Ok(None)` for placeholders.
    ///
    /// # Errors
    ///
    /// [`CompositionError::FrameLoad`] if a spilled file cannot be read or
    /// the pixels were released.
    pub fn load_image(&self) -> Result<Option<Arc<DynamicImage>>, CompositionError> {
        match &self.image {
            FrameImage::Memory(image) => Ok(Some(Arc::clone(image))),
            FrameImage::File(path) => image::open(path)
                .map(|image| Some(Arc::new(image)))
                .map_err(|error| CompositionError::FrameLoad {
                    path: path.clone(),
                    reason: error.to_string(),
                }),
            FrameImage::Failed(_) => Ok(None),
            FrameImage::Released => Err(CompositionError::FrameLoad {
                path: PathBuf::new(),
                reason: format!("pixels of slot {} were released", self.sequence_index),
            }),
        }
    }

    /// Drop in-memory pixels. Spilled files and failure markers are kept.
    pub fn release(&mut self) {
        if matches!(self.image, FrameImage::Memory(_)) {
            self.image = FrameImage::Released;
        }
    }
}

enum SlotOutcome {
    Done(FrameRecord),
    Cancelled,
    Fatal(DecodeError),
    StorageFailed(String),
}

enum StorageArea {
    Memory,
    Temporary(TempDir),
    Directory(PathBuf),
}

impl StorageArea {
    fn directory(&self) -> Option<PathBuf> {
        match self {
            StorageArea::Memory => None,
            StorageArea::Temporary(directory) => Some(directory.path().to_path_buf()),
            StorageArea::Directory(path) => Some(path.clone()),
        }
    }
}

/// Decodes planned instants into [`FrameRecord`]s.
///
/// Cheap to share behind an [`Arc`]; all methods take `&self`.
pub struct ExtractionEngine {
    adapter: Arc<dyn DecodeAdapter>,
    options: ExtractOptions,
    pool: Arc<ThreadPool>,
    storage: StorageArea,
    spill_counter: AtomicU64,
}

impl std::fmt::Debug for ExtractionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionEngine")
            .field("options", &self.options)
            .field("threads", &self.pool.current_num_threads())
            .field("storage", &self.storage.directory())
            .finish()
    }
}

impl ExtractionEngine {
    /// Create an engine.
    ///
    /// # Errors
    ///
    /// [`ExtractionError::Storage`] if the working directory cannot be
    /// created.
    pub fn new(
        adapter: Arc<dyn DecodeAdapter>,
        options: ExtractOptions,
        pool: Arc<ThreadPool>,
    ) -> Result<Self, ExtractionError> {
        let storage = match &options.working_storage {
            WorkingStorage::InMemory => StorageArea::Memory,
            WorkingStorage::TempDirectory => {
                let directory = tempfile::Builder::new()
                    .prefix("movieprint-")
                    .tempdir()
                    .map_err(|error| ExtractionError::Storage(error.to_string()))?;
                log::debug!("Spilling frames to {}", directory.path().display());
                StorageArea::Temporary(directory)
            }
            WorkingStorage::Directory(path) => {
                std::fs::create_dir_all(path)
                    .map_err(|error| ExtractionError::Storage(error.to_string()))?;
                StorageArea::Directory(path.clone())
            }
        };

        Ok(Self {
            adapter,
            options,
            pool,
            storage,
            spill_counter: AtomicU64::new(0),
        })
    }

    /// The options this engine was built with.
    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    /// The shared worker pool.
    pub fn pool(&self) -> &Arc<ThreadPool> {
        &self.pool
    }

    /// Decode every planned instant.
    ///
    /// Decodes run concurrently on the pool; records come back ordered by
    /// sequence index.
    ///
    /// # Errors
    ///
    /// [`ExtractionError::Cancelled`] when the configured token fires,
    /// [`ExtractionError::Decode`] for fatal adapter failures and
    /// [`ExtractionError::Storage`] when spilling a frame fails.
    pub fn extract(
        &self,
        source: &VideoSource,
        instants: &[PlannedInstant],
    ) -> Result<Vec<FrameRecord>, ExtractionError> {
        self.extract_with(&self.options, source, instants)
    }

    /// [`extract`](Self::extract) with per-run options (e.g. a fresh
    /// cancellation token).
    pub(crate) fn extract_with(
        &self,
        options: &ExtractOptions,
        source: &VideoSource,
        instants: &[PlannedInstant],
    ) -> Result<Vec<FrameRecord>, ExtractionError> {
        log::debug!(
            "Extracting {} frames from {}",
            instants.len(),
            source.display_name()
        );

        let request = self.request_for(options, source);
        let aborted = AtomicBool::new(false);
        let tracker = ProgressTracker::new(
            Arc::clone(&options.progress),
            OperationType::FrameExtraction,
            instants.len() as u64,
            options.batch_size,
        );
        let (sender, receiver) = mpsc::channel();

        self.pool.scope(|scope| {
            for instant in instants {
                let sender = sender.clone();
                let aborted = &aborted;
                let tracker = &tracker;
                let request = &request;
                scope.spawn(move |_| {
                    if options.is_cancelled() || aborted.load(Ordering::Acquire) {
                        let _ = sender.send(SlotOutcome::Cancelled);
                        return;
                    }
                    let outcome = self.decode_slot(options, source, instant, request);
                    if !matches!(outcome, SlotOutcome::Done(_)) {
                        aborted.store(true, Ordering::Release);
                    }
                    tracker.complete(instant.frame_number, instant.timestamp);
                    let _ = sender.send(outcome);
                });
            }
        });
        drop(sender);

        let mut records = Vec::with_capacity(instants.len());
        let mut cancelled = false;
        for outcome in receiver {
            match outcome {
                SlotOutcome::Done(record) => records.push(record),
                SlotOutcome::Cancelled => cancelled = true,
                SlotOutcome::Fatal(error) => return Err(ExtractionError::Decode(error)),
                SlotOutcome::StorageFailed(reason) => return Err(ExtractionError::Storage(reason)),
            }
        }
        if cancelled || options.is_cancelled() {
            log::debug!("Extraction cancelled");
            return Err(ExtractionError::Cancelled);
        }

        tracker.finish();

        records.sort_by_key(|record| record.sequence_index);
        let failures = records.iter().filter(|record| record.is_placeholder()).count();
        log::info!(
            "Extracted {} frames ({} placeholders)",
            records.len(),
            failures
        );
        Ok(records)
    }

    /// Decode one slot at `timestamp` without planning.
    ///
    /// This is the scrubbing fast path. A per-frame failure still yields a
    /// placeholder record rather than an error.
    ///
    /// # Errors
    ///
    /// Fatal adapter failures and storage failures.
    pub fn extract_single(
        &self,
        source: &VideoSource,
        slot: usize,
        timestamp: Duration,
    ) -> Result<FrameRecord, ExtractionError> {
        let instant = PlannedInstant {
            sequence_index: slot,
            timestamp,
            frame_number: source.frame_number_at(timestamp),
            shot: None,
        };
        let request = self.request_for(&self.options, source);
        let tracker = ProgressTracker::new(
            Arc::clone(&self.options.progress),
            OperationType::SlotRefresh,
            1,
            1,
        );
        let outcome = self.decode_slot(&self.options, source, &instant, &request);
        tracker.complete(instant.frame_number, timestamp);
        match outcome {
            SlotOutcome::Done(record) => Ok(record),
            SlotOutcome::Cancelled => Err(ExtractionError::Cancelled),
            SlotOutcome::Fatal(error) => Err(ExtractionError::Decode(error)),
            SlotOutcome::StorageFailed(reason) => Err(ExtractionError::Storage(reason)),
        }
    }

    fn request_for(&self, options: &ExtractOptions, source: &VideoSource) -> DecodeRequest {
        let mut request = DecodeRequest::new()
            .with_hardware(options.use_hardware)
            .with_max_dimension(options.max_dimension);
        if source.dynamic_range().is_hdr() && options.tone_mapping.enabled {
            request = request.with_tone_map(options.tone_mapping.algorithm);
        }
        request
    }

    fn decode_slot(
        &self,
        options: &ExtractOptions,
        source: &VideoSource,
        instant: &PlannedInstant,
        request: &DecodeRequest,
    ) -> SlotOutcome {
        match self.decode_with_timeout(options.decode_timeout, source, instant.timestamp, request) {
            Ok(decoded) => match self.build_record(options, instant, decoded) {
                Ok(record) => SlotOutcome::Done(record),
                Err(reason) => SlotOutcome::StorageFailed(reason),
            },
            Err(error) if error.is_fatal() => SlotOutcome::Fatal(error),
            Err(error) => {
                log::warn!(
                    "Slot {} at {:?} failed to decode: {error}",
                    instant.sequence_index,
                    instant.timestamp
                );
                SlotOutcome::Done(self.placeholder(source, instant, error.to_string()))
            }
        }
    }

    fn decode_with_timeout(
        &self,
        timeout: Option<Duration>,
        source: &VideoSource,
        timestamp: Duration,
        request: &DecodeRequest,
    ) -> Result<DecodedFrame, DecodeError> {
        let Some(limit) = timeout else {
            return self.adapter.decode_at(source, timestamp, request);
        };

        let (sender, receiver) = mpsc::sync_channel(1);
        let adapter = Arc::clone(&self.adapter);
        let source = source.clone();
        let request = *request;
        thread::Builder::new()
            .name("movieprint-decode".to_string())
            .spawn(move || {
                let _ = sender.send(adapter.decode_at(&source, timestamp, &request));
            })
            .map_err(|error| DecodeError::Frame {
                timestamp,
                reason: format!("could not start decode thread: {error}"),
            })?;

        match receiver.recv_timeout(limit) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(DecodeError::Timeout { timestamp, limit }),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(DecodeError::Frame {
                timestamp,
                reason: "decode thread exited without a result".to_string(),
            }),
        }
    }

    fn build_record(
        &self,
        options: &ExtractOptions,
        instant: &PlannedInstant,
        decoded: DecodedFrame,
    ) -> Result<FrameRecord, String> {
        if let Some(reason) = &decoded.hardware_fallback {
            log::info!(
                "Hardware decode unavailable for slot {}, used software: {reason}",
                instant.sequence_index
            );
        }

        let face_boxes = options
            .face_detector
            .as_ref()
            .map(|detector| detector.detect(&decoded.image));
        let (width, height) = (decoded.image.width(), decoded.image.height());

        let image = match self.storage.directory() {
            None => FrameImage::Memory(Arc::new(decoded.image)),
            Some(directory) => {
                let serial = self.spill_counter.fetch_add(1, Ordering::Relaxed);
                let format = options.frame_format;
                let path = directory.join(format!(
                    "frame_{:05}_{serial:06}.{}",
                    instant.sequence_index,
                    format.extension()
                ));
                decoded
                    .image
                    .to_rgb8()
                    .save_with_format(&path, format.image_format())
                    .map_err(|error| format!("{}: {error}", path.display()))?;
                FrameImage::File(path)
            }
        };

        Ok(FrameRecord {
            sequence_index: instant.sequence_index,
            source_timestamp: instant.timestamp,
            frame_number: instant.frame_number,
            image,
            width,
            height,
            tone_mapped: decoded.tone_mapped,
            hardware_decoded: decoded.hardware_used,
            face_boxes,
            shot: instant.shot,
        })
    }

    fn placeholder(
        &self,
        source: &VideoSource,
        instant: &PlannedInstant,
        reason: String,
    ) -> FrameRecord {
        let (width, height) = nominal_dimensions(source, self.options.max_dimension);
        FrameRecord {
            sequence_index: instant.sequence_index,
            source_timestamp: instant.timestamp,
            frame_number: instant.frame_number,
            image: FrameImage::Failed(reason),
            width,
            height,
            tone_mapped: false,
            hardware_decoded: false,
            face_boxes: None,
            shot: instant.shot,
        }
    }
}

/// Source size after the optional longest-edge limit.
fn nominal_dimensions(source: &VideoSource, max_dimension: Option<u32>) -> (u32, u32) {
    let (width, height) = source.dimensions();
    let (width, height) = (width.max(1), height.max(1));
    match max_dimension {
        Some(limit) if width.max(height) > limit => {
            let scale = limit as f64 / width.max(height) as f64;
            (
                ((width as f64 * scale).round() as u32).max(1),
                ((height as f64 * scale).round() as u32).max(1),
            )
        }
        _ => (width, height),
    }
}
