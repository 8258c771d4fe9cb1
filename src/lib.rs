//! # movieprint
//!
//! Turn a video into a single composite image: thumbnails sampled at chosen
//! instants, laid out as a grid or a duration-proportional timeline,
//! optionally tone-mapped from HDR, and adjustable cell by cell with
//! undo/redo.
//!
//! Decoding goes through the [`DecodeAdapter`] trait; [`FfmpegDecoder`] is
//! the bundled implementation built on
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next).
//!
//! ## Quick Start
//!
//! ### One-shot print
//!
//! ```no_run
//! use std::{sync::Arc, time::Duration};
//!
//! use movieprint::{
//!     ExtractionPlan, FfmpegDecoder, GridShape, IntervalStep, LayoutSpec, MoviePrinter,
//!     OutputOptions, Styling,
//! };
//!
//! let printer = MoviePrinter::new(Arc::new(FfmpegDecoder::new()));
//! let source = printer.open("input.mp4")?;
//! printer.render_to_file(
//!     &source,
//!     &ExtractionPlan::interval(IntervalStep::Seconds(Duration::from_secs(20))),
//!     &LayoutSpec::grid(GridShape::Columns(5)).with_thumbnail_width(320),
//!     &Styling::default(),
//!     None,
//!     "print.jpg",
//!     &OutputOptions::default().with_max_size_kb(800),
//! )?;
//! # Ok::<(), movieprint::MoviePrintError>(())
//! ```
//!
//! ### Planning only
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use movieprint::{ExtractionPlan, FfmpegDecoder, IntervalStep, VideoSource, plan};
//!
//! let source = VideoSource::open("input.mp4", &FfmpegDecoder::new())?;
//! let extraction_plan = ExtractionPlan::interval(IntervalStep::Frames(240)).with_max_frames(24);
//! for instant in plan(&extraction_plan, &source, None)? {
//!     println!("{:>3}: {:?}", instant.sequence_index, instant.timestamp);
//! }
//! # Ok::<(), movieprint::MoviePrintError>(())
//! ```
//!
//! ## Features
//!
//! - **Interval and shot planning**: fixed time or frame steps, shot
//!   midpoints, exclusions, even downsampling to a frame budget
//! - **Concurrent extraction** on a bounded rayon pool with per-frame
//!   timeouts and placeholder tiles for frames that fail
//! - **HDR tone mapping** (Hable, Reinhard, Möbius) for PQ and HLG sources
//! - **Grid and timeline layouts** with fit-to-output sizing
//! - **Styling**: rotation, rounded corners, timecode or frame-number
//!   overlays, header bar
//! - **Size-targeted encoding** to JPEG or PNG, plus a JSON sidecar
//! - **Interactive sessions**: scrub single cells, undo/redo, results
//!   tagged by snapshot
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `hardware` | Hardware-accelerated decoding (CUDA, VAAPI, D3D11VA, VideoToolbox, QSV) |
//! | `full` | Enables all of the above |
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed to build the bundled
//! decoder.

pub mod compose;
pub mod configuration;
mod conversion;
pub mod decode;
pub mod error;
pub mod extraction;
pub mod ffmpeg;
pub mod ffmpeg_decoder;
mod glyphs;
#[cfg(feature = "hardware")]
pub mod hardware_acceleration;
pub mod history;
pub mod layout;
pub mod output;
pub mod pipeline;
pub mod planner;
pub mod progress;
pub mod session;
pub mod shots;
pub mod sidecar;
pub mod source;
pub mod tonemap;

pub use compose::{
    Compositor, HeaderInfo, HeaderOptions, OverlayAnchor, OverlayContent, OverlayOptions,
    Rotation, Styling,
};
pub use configuration::{
    DEFAULT_DECODE_TIMEOUT, ExtractOptions, FrameFormat, ToneMapping, WorkingStorage,
};
pub use decode::{DecodeAdapter, DecodeRequest, DecodedFrame};
pub use error::{
    CompositionError, DecodeError, ExtractionError, LayoutError, MoviePrintError, PlanningError,
    SessionError,
};
pub use extraction::{ExtractionEngine, FaceBox, FaceDetector, FrameImage, FrameRecord};
pub use ffmpeg::{FfmpegLogLevel, set_ffmpeg_log_level};
pub use ffmpeg_decoder::FfmpegDecoder;
#[cfg(feature = "hardware")]
pub use hardware_acceleration::{HardwareDevice, available_hardware_devices};
pub use history::{SessionChange, SessionSnapshot, SnapshotId, StateManager};
pub use layout::{
    CellGeometry, GridShape, Layout, LayoutItem, LayoutMode, LayoutSpec, OutputSize,
    compute_layout,
};
pub use output::{EncodedPrint, OutputFormat, OutputOptions, encode_print};
pub use pipeline::{MoviePrinter, RenderedPrint};
pub use planner::{
    ExtractionMode, ExtractionPlan, IntervalStep, PlannedInstant, ShotInstantPolicy, ShotSpan,
    plan,
};
pub use progress::{CancellationToken, OperationType, ProgressCallback, ProgressInfo};
pub use session::{Session, SessionEvent, SessionOptions, ThumbnailSlot};
pub use shots::{ShotBoundaries, ShotBoundariesError, ShotBoundary, ShotDetector};
pub use sidecar::{PrintMetadata, SIDECAR_FORMAT_VERSION};
pub use source::{DynamicRange, ProbeInfo, TransferFunction, VideoSource};
pub use tonemap::{ToneMapAlgorithm, ToneMapper};
