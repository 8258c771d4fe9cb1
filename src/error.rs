//! Error types for the `movieprint` crate.
//!
//! Each pipeline stage has its own error enum so a failure can always be
//! attributed to the stage that produced it. [`MoviePrintError`] unifies them
//! for callers that drive the whole pipeline.
//!
//! Propagation rules:
//!
//! - [`PlanningError`] and [`LayoutError`] abort a run before any decode work
//!   starts.
//! - [`DecodeError`] is per-slot and recovered locally (the slot becomes a
//!   placeholder), except [`DecodeError::Unavailable`] which aborts the run.
//! - [`CompositionError`] is always surfaced; an unwritten output is never
//!   reported as success.

use std::{io::Error as IoError, path::PathBuf, time::Duration};

use ffmpeg_next::Error as FfmpegError;
use image::ImageError;
use thiserror::Error;

/// The extraction plan could not be turned into sample instants.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum PlanningError {
    /// The time range is empty or starts beyond the end of the source.
    #[error("Invalid time range: start ({start:?}) must be less than end ({end:?})")]
    InvalidRange {
        /// Requested start of the range.
        start: Duration,
        /// Effective end of the range.
        end: Duration,
    },

    /// An interval of zero seconds or zero frames was given.
    #[error("Interval must be greater than zero")]
    InvalidInterval,

    /// Neither an interval in seconds nor one in frames was given.
    #[error("Interval mode requires an interval in seconds or in frames")]
    MissingInterval,

    /// A frame-count interval needs a known frame rate.
    #[error("Source frame rate is unknown; cannot step by frame count")]
    UnknownFrameRate,

    /// Shot mode was requested without shot-boundary data.
    #[error("Shot mode requires shot boundaries, but none were supplied")]
    MissingShotBoundaries,

    /// Planning produced no instants (everything excluded or range too short).
    #[error("Extraction plan is empty")]
    EmptyPlan,
}

/// A Decode Adapter failed.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum DecodeError {
    /// The adapter cannot decode at all (backend missing, file unreadable).
    /// Fatal to a whole extraction run.
    #[error("Decoder unavailable for {path}: {reason}")]
    Unavailable {
        /// Source path the adapter was asked about.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },

    /// The file has no decodable video stream.
    #[error("No video stream found in {0}")]
    NoVideoStream(PathBuf),

    /// A single frame could not be decoded. Non-fatal.
    #[error("Failed to decode frame at {timestamp:?}: {reason}")]
    Frame {
        /// Requested timestamp.
        timestamp: Duration,
        /// Underlying reason.
        reason: String,
    },

    /// A single decode call exceeded its time budget. Non-fatal.
    #[error("Decoding frame at {timestamp:?} timed out after {limit:?}")]
    Timeout {
        /// Requested timestamp.
        timestamp: Duration,
        /// Configured per-frame limit.
        limit: Duration,
    },

    /// The requested timestamp is outside the source.
    #[error("Timestamp {0:?} is outside the source duration")]
    InvalidTimestamp(Duration),

    /// An error from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    Backend(String),
}

impl DecodeError {
    /// Whether this failure aborts a whole extraction run rather than a
    /// single slot.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DecodeError::Unavailable { .. } | DecodeError::NoVideoStream(_)
        )
    }
}

impl From<FfmpegError> for DecodeError {
    fn from(error: FfmpegError) -> Self {
        DecodeError::Backend(error.to_string())
    }
}

/// The Extraction Engine failed as a whole.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExtractionError {
    /// The adapter reported a fatal failure.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The run was cancelled via a [`CancellationToken`](crate::CancellationToken).
    #[error("Extraction cancelled")]
    Cancelled,

    /// Writing or reading an intermediate frame image failed.
    #[error("Working storage error: {0}")]
    Storage(String),
}

/// Geometry could not be computed.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum LayoutError {
    /// Timeline mode needs a positive duration for every item.
    #[error("Timeline layout requires shot durations (missing for slot {slot})")]
    MissingShotDurations {
        /// First slot without a usable duration.
        slot: usize,
    },

    /// There is nothing to lay out.
    #[error("Layout has zero cells")]
    NoCells,

    /// Columns or rows were zero.
    #[error("Grid needs at least one column or row")]
    InvalidGrid,

    /// A fixed output size, row height or row width of zero was requested.
    #[error("Invalid output size {width}x{height}")]
    InvalidOutputSize {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },

    /// Padding and margins leave no room for a timeline row.
    #[error("Timeline row at slot {slot} has no room for thumbnails")]
    RowTooNarrow {
        /// First slot of the offending row.
        slot: usize,
    },
}

/// Rendering or encoding the print failed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CompositionError {
    /// The layout and frame set disagree in length.
    #[error("Layout has {cells} cells but {frames} frames were supplied")]
    CellCountMismatch {
        /// Number of cells.
        cells: usize,
        /// Number of frame records.
        frames: usize,
    },

    /// A cell index outside the layout was requested.
    #[error("Cell {0} does not exist in the layout")]
    CellOutOfRange(usize),

    /// The image encoder failed.
    #[error("Failed to encode print: {0}")]
    Encode(#[from] ImageError),

    /// A frame image stored on disk could not be loaded.
    #[error("Failed to load frame image {path}: {reason}")]
    FrameLoad {
        /// Path of the intermediate image.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },

    /// The size target could not be met before hitting the quality floor.
    #[error(
        "Output is {achieved_kb:.1} KB at quality floor {floor}; target was {target_kb} KB"
    )]
    SizeTargetUnmet {
        /// Requested maximum size.
        target_kb: u64,
        /// Size at the floor.
        achieved_kb: f64,
        /// Quality floor that was reached.
        floor: u8,
    },

    /// Writing the output failed.
    #[error("I/O error writing print: {0}")]
    Io(#[from] IoError),
}

/// An interactive session command could not be carried out.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum SessionError {
    /// Scrubbing targeted a slot that does not exist.
    #[error("Slot {slot} is out of range (print has {count} slots)")]
    SlotOutOfRange {
        /// Requested slot.
        slot: usize,
        /// Number of slots.
        count: usize,
    },

    /// Scrubbing targeted a timestamp outside the source.
    #[error("Timestamp {0:?} is outside the source")]
    InvalidTimestamp(Duration),

    /// There is no rendered print yet.
    #[error("Nothing has been rendered yet")]
    NotRendered,

    /// The worker pool could not be started.
    #[error("Failed to start worker pool: {0}")]
    WorkerPool(String),
}

/// The unified error type for whole-pipeline operations.
///
/// The variant names the stage that failed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MoviePrintError {
    /// Planning failed; no decode work was started.
    #[error("Planning failed: {0}")]
    Planning(#[from] PlanningError),

    /// Extraction failed as a whole.
    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    /// Layout failed; no decode work was started.
    #[error("Layout failed: {0}")]
    Layout(#[from] LayoutError),

    /// Rendering or encoding failed.
    #[error("Composition failed: {0}")]
    Composition(#[from] CompositionError),

    /// An interactive command was rejected.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// An I/O error outside composition (e.g. writing the sidecar).
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Serialising sidecar metadata failed.
    #[error("Metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
}

impl From<DecodeError> for MoviePrintError {
    fn from(error: DecodeError) -> Self {
        MoviePrintError::Extraction(ExtractionError::Decode(error))
    }
}
