//! One-shot print generation.
//!
//! [`MoviePrinter`] runs the stages in order (plan, validate the layout,
//! extract, lay out, render, encode) and reports failures as a
//! [`MoviePrintError`] naming the stage. Planning and layout problems are
//! caught before any frame is decoded.

use std::{path::Path, sync::Arc};

use image::RgbImage;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::compose::{Compositor, HeaderInfo, Styling};
use crate::configuration::ExtractOptions;
use crate::decode::DecodeAdapter;
use crate::error::{LayoutError, MoviePrintError, SessionError};
use crate::extraction::{ExtractionEngine, FrameRecord};
use crate::layout::{Layout, LayoutItem, LayoutSpec, compute_layout};
use crate::output::{EncodedPrint, OutputOptions, encode_print};
use crate::planner::{ExtractionMode, ExtractionPlan, PlannedInstant, plan};
use crate::shots::{ShotBoundaries, ShotDetector};
use crate::sidecar::PrintMetadata;
use crate::source::VideoSource;

/// A rendered, not yet encoded, print.
#[derive(Debug, Clone)]
pub struct RenderedPrint {
    /// The canvas.
    pub image: RgbImage,
    /// Layout parameters after reserving the header band.
    pub layout_spec: LayoutSpec,
    /// Cell geometry of `image`.
    pub layout: Layout,
    /// Frame records in slot order. Pixels have been released.
    pub records: Vec<FrameRecord>,
}

/// Generates movie prints in one call.
///
/// # Example
///
/// ```no_run
/// use std::{sync::Arc, time::Duration};
///
/// use movieprint::{
///     ExtractionPlan, FfmpegDecoder, GridShape, IntervalStep, LayoutSpec, MoviePrinter,
///     OutputOptions, Styling,
/// };
///
/// let printer = MoviePrinter::new(Arc::new(FfmpegDecoder::new()));
/// let source = printer.open("input.mp4")?;
/// let plan = ExtractionPlan::interval(IntervalStep::Seconds(Duration::from_secs(10)));
/// let layout = LayoutSpec::grid(GridShape::Columns(4));
/// printer.render_to_file(
///     &source,
///     &plan,
///     &layout,
///     &Styling::default(),
///     None,
///     "print.jpg",
///     &OutputOptions::default(),
/// )?;
/// # Ok::<(), movieprint::MoviePrintError>(())
/// ```
pub struct MoviePrinter {
    adapter: Arc<dyn DecodeAdapter>,
    options: ExtractOptions,
    pool: Option<Arc<ThreadPool>>,
    shot_detector: Option<Arc<dyn ShotDetector>>,
    compositor: Compositor,
}

impl std::fmt::Debug for MoviePrinter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MoviePrinter")
            .field("options", &self.options)
            .field("has_pool", &self.pool.is_some())
            .field("has_shot_detector", &self.shot_detector.is_some())
            .field("compositor", &self.compositor)
            .finish()
    }
}

impl MoviePrinter {
    /// Printer with default options decoding through `adapter`.
    pub fn new(adapter: Arc<dyn DecodeAdapter>) -> Self {
        Self {
            adapter,
            options: ExtractOptions::default(),
            pool: None,
            shot_detector: None,
            compositor: Compositor::default(),
        }
    }

    /// Replace the extraction options.
    #[must_use]
    pub fn with_options(mut self, options: ExtractOptions) -> Self {
        self.options = options;
        self
    }

    /// Decode on an existing pool instead of a fresh one per print.
    #[must_use]
    pub fn with_pool(mut self, pool: Arc<ThreadPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Detect shots on demand for shot-mode plans.
    #[must_use]
    pub fn with_shot_detector(mut self, detector: Arc<dyn ShotDetector>) -> Self {
        self.shot_detector = Some(detector);
        self
    }

    /// Use a custom compositor.
    #[must_use]
    pub fn with_compositor(mut self, compositor: Compositor) -> Self {
        self.compositor = compositor;
        self
    }

    /// Probe `path` through the adapter.
    ///
    /// # Errors
    ///
    /// The adapter's probe error, as an extraction failure.
    pub fn open<P: AsRef<Path>>(&self, path: P) -> Result<VideoSource, MoviePrintError> {
        Ok(VideoSource::open(path, self.adapter.as_ref())?)
    }

    /// Plan, extract and render a print.
    ///
    /// `shots` supplies shot boundaries for shot-mode plans; without them
    /// the configured [`ShotDetector`] is asked.
    ///
    /// # Errors
    ///
    /// A [`MoviePrintError`] whose variant names the failing stage.
    pub fn render(
        &self,
        source: &VideoSource,
        extraction_plan: &ExtractionPlan,
        layout_spec: &LayoutSpec,
        styling: &Styling,
        shots: Option<&ShotBoundaries>,
    ) -> Result<RenderedPrint, MoviePrintError> {
        let detected;
        let shots = match (shots, &extraction_plan.mode, &self.shot_detector) {
            (Some(shots), _, _) => Some(shots),
            (None, ExtractionMode::Shot { sensitivity, .. }, Some(detector)) => {
                let range = extraction_plan.effective_range(source)?;
                detected = detector.detect_shots(source, *sensitivity, range)?;
                log::info!("Detected {} shots", detected.len());
                Some(&detected)
            }
            (None, _, _) => None,
        };

        let instants = plan(extraction_plan, source, shots)?;
        let layout_spec = styling.reserve_header(*layout_spec);
        validate_layout(&layout_spec, styling, source, &instants)?;

        let engine = ExtractionEngine::new(
            Arc::clone(&self.adapter),
            self.options.clone(),
            self.pool()?,
        )?;
        let mut records = engine.extract(source, &instants)?;

        let (layout, image) =
            compose_records(&self.compositor, source, &layout_spec, styling, &records)?;
        for record in &mut records {
            record.release();
        }

        Ok(RenderedPrint {
            image,
            layout_spec,
            layout,
            records,
        })
    }

    /// [`render`](Self::render), then encode and write the print (and the
    /// sidecar when `output.sidecar` is set).
    ///
    /// # Errors
    ///
    /// A [`MoviePrintError`] whose variant names the failing stage.
    #[allow(clippy::too_many_arguments)]
    pub fn render_to_file<P: AsRef<Path>>(
        &self,
        source: &VideoSource,
        extraction_plan: &ExtractionPlan,
        layout_spec: &LayoutSpec,
        styling: &Styling,
        shots: Option<&ShotBoundaries>,
        path: P,
        output: &OutputOptions,
    ) -> Result<EncodedPrint, MoviePrintError> {
        let print = self.render(source, extraction_plan, layout_spec, styling, shots)?;
        let encoded = encode_print(&print.image, output)?;
        encoded.write_to(path.as_ref())?;

        if let Some(sidecar) = &output.sidecar {
            let overrides = Default::default();
            PrintMetadata {
                source,
                plan: extraction_plan,
                records: &print.records,
                overrides: &overrides,
                layout_spec: &print.layout_spec,
                layout: &print.layout,
                styling,
                encoded: Some(&encoded),
            }
            .write(sidecar)?;
        }
        Ok(encoded)
    }

    fn pool(&self) -> Result<Arc<ThreadPool>, MoviePrintError> {
        match &self.pool {
            Some(pool) => Ok(Arc::clone(pool)),
            None => build_pool(0),
        }
    }
}

/// Build a worker pool; `threads == 0` lets rayon choose.
pub(crate) fn build_pool(threads: usize) -> Result<Arc<ThreadPool>, MoviePrintError> {
    ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|index| format!("movieprint-worker-{index}"))
        .build()
        .map(Arc::new)
        .map_err(|error| SessionError::WorkerPool(error.to_string()).into())
}

/// Layout items for `records` as they will be drawn.
pub(crate) fn layout_items(records: &[FrameRecord], styling: &Styling) -> Vec<LayoutItem> {
    records
        .iter()
        .map(|record| LayoutItem::from_record(record, styling.rotation))
        .collect()
}

/// Lay out and render `records`.
pub(crate) fn compose_records(
    compositor: &Compositor,
    source: &VideoSource,
    layout_spec: &LayoutSpec,
    styling: &Styling,
    records: &[FrameRecord],
) -> Result<(Layout, RgbImage), MoviePrintError> {
    let layout = compute_layout(layout_spec, &layout_items(records, styling))?;
    let header = styling.header.map(|_| HeaderInfo::from_source(source));
    let image = compositor.render(&layout, records, styling, header.as_ref())?;
    Ok((layout, image))
}

/// Check that the layout is satisfiable with source-sized frames, so bad
/// geometry fails before decoding starts.
pub(crate) fn validate_layout(
    layout_spec: &LayoutSpec,
    styling: &Styling,
    source: &VideoSource,
    instants: &[PlannedInstant],
) -> Result<(), LayoutError> {
    let (width, height) = source.dimensions();
    let (width, height) = styling.rotation.rotated_size(width, height);
    let items: Vec<LayoutItem> = instants
        .iter()
        .map(|instant| {
            let item = LayoutItem::new(width, height);
            match instant.shot {
                Some(shot) => item.with_duration(shot.duration()),
                None => item,
            }
        })
        .collect();
    compute_layout(layout_spec, &items).map(|_| ())
}
