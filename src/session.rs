//! Interactive print sessions.
//!
//! A [`Session`] is owned by one control thread. Commands (`apply`,
//! `scrub`, `undo`, `redo`) update the snapshot history immediately and
//! hand decode work to a bounded rayon pool. Workers send back results
//! tagged with the [`SnapshotId`] they were computed for; [`Session::poll`]
//! folds them into the print and drops any whose snapshot is no longer
//! current.
//!
//! At most one full extraction runs at a time. Starting another cancels the
//! previous one between frame decodes. Scrubbing decodes one slot and
//! re-renders only that cell.

use std::{
    collections::BTreeSet,
    path::Path,
    sync::{
        Arc,
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
    },
    time::{Duration, Instant},
};

use image::RgbImage;

use crate::compose::{Compositor, Styling};
use crate::configuration::ExtractOptions;
use crate::decode::DecodeAdapter;
use crate::error::{ExtractionError, MoviePrintError, SessionError};
use crate::extraction::{ExtractionEngine, FrameImage, FrameRecord};
use crate::history::{
    DEFAULT_MAX_HISTORY, SessionChange, SessionSnapshot, SnapshotId, StateManager,
};
use crate::layout::{Layout, LayoutSpec, compute_layout};
use crate::output::{EncodedPrint, OutputOptions, encode_print};
use crate::pipeline::{build_pool, compose_records, layout_items, validate_layout};
use crate::planner::{ExtractionPlan, PlannedInstant, plan};
use crate::progress::CancellationToken;
use crate::shots::ShotBoundaries;
use crate::sidecar::PrintMetadata;
use crate::source::VideoSource;

/// Session-level settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct SessionOptions {
    /// Worker threads for decoding; 0 lets rayon choose.
    pub worker_threads: usize,
    /// Keep decoded pixels after rendering so re-renders need no decoding.
    pub retain_frames: bool,
    /// Undo depth.
    pub max_history: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            retain_frames: true,
            max_history: DEFAULT_MAX_HISTORY,
        }
    }
}

impl SessionOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker thread count.
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    /// Keep or release decoded pixels after rendering.
    pub fn with_retain_frames(mut self, retain: bool) -> Self {
        self.retain_frames = retain;
        self
    }

    /// Set the undo depth.
    pub fn with_max_history(mut self, depth: usize) -> Self {
        self.max_history = depth.max(1);
        self
    }
}

/// What one cell of the print currently shows.
#[derive(Debug, Clone)]
pub struct ThumbnailSlot {
    /// Cell index.
    pub slot_index: usize,
    /// Frame drawn in the cell.
    pub record: FrameRecord,
    /// Timestamp chosen by scrubbing, superseding the planned one.
    pub override_timestamp: Option<Duration>,
}

/// Something that changed while processing worker results.
#[derive(Debug)]
pub enum SessionEvent {
    /// A full extraction finished and its frames were adopted.
    FramesExtracted {
        /// Snapshot the run was started for.
        snapshot: SnapshotId,
        /// Number of frames.
        frames: usize,
        /// Number of placeholder frames.
        placeholders: usize,
    },
    /// The whole canvas was rendered.
    Rendered {
        /// Snapshot the canvas shows.
        snapshot: SnapshotId,
    },
    /// One cell was re-rendered in place.
    CellUpdated {
        /// Snapshot the canvas shows.
        snapshot: SnapshotId,
        /// Cell index.
        slot: usize,
    },
    /// A result arrived for a snapshot that is no longer current.
    Discarded {
        /// Snapshot the result was computed for.
        snapshot: SnapshotId,
    },
    /// Background work failed.
    Failed {
        /// Snapshot the work was started for.
        snapshot: SnapshotId,
        /// What went wrong.
        error: MoviePrintError,
    },
}

/// Results sent from the worker pool to the control thread.
enum WorkerResult {
    Extracted {
        run: u64,
        snapshot: SnapshotId,
        plan: Arc<ExtractionPlan>,
        result: Result<Vec<FrameRecord>, ExtractionError>,
    },
    Slot {
        snapshot: SnapshotId,
        slot: usize,
        timestamp: Duration,
        result: Result<FrameRecord, ExtractionError>,
    },
}

struct FullRun {
    run: u64,
    snapshot: SnapshotId,
    plan: Arc<ExtractionPlan>,
    token: CancellationToken,
}

/// Frames produced by the last adopted full run.
struct FrameSet {
    plan: Arc<ExtractionPlan>,
    records: Vec<FrameRecord>,
}

struct Canvas {
    snapshot: SnapshotId,
    layout_spec: LayoutSpec,
    layout: Layout,
    image: RgbImage,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum RenderScope {
    Full,
    ChangedCells,
}

/// An interactive movie print.
///
/// # Example
///
/// ```no_run
/// use std::{sync::Arc, time::Duration};
///
/// use movieprint::{
///     ExtractOptions, ExtractionPlan, FfmpegDecoder, GridShape, IntervalStep, LayoutSpec,
///     Session, SessionOptions, Styling, VideoSource,
/// };
///
/// let decoder = Arc::new(FfmpegDecoder::new());
/// let source = VideoSource::open("input.mp4", decoder.as_ref())?;
/// let mut session = Session::new(
///     source,
///     decoder,
///     ExtractOptions::new(),
///     ExtractionPlan::interval(IntervalStep::Seconds(Duration::from_secs(30))),
///     LayoutSpec::grid(GridShape::Columns(4)),
///     Styling::default(),
///     None,
///     SessionOptions::default(),
/// )?;
/// session.wait_until_idle(Duration::from_secs(60));
///
/// session.scrub(2, Duration::from_secs(75))?;
/// session.wait_until_idle(Duration::from_secs(10));
/// session.undo()?;
/// session.wait_until_idle(Duration::from_secs(10));
/// # Ok::<(), movieprint::MoviePrintError>(())
/// ```
pub struct Session {
    source: VideoSource,
    engine: Arc<ExtractionEngine>,
    compositor: Compositor,
    history: StateManager,
    shots: Option<ShotBoundaries>,
    options: SessionOptions,
    sender: Sender<WorkerResult>,
    receiver: Receiver<WorkerResult>,
    full_run: Option<FullRun>,
    next_run: u64,
    frames: Option<FrameSet>,
    slots: Vec<ThumbnailSlot>,
    outstanding: BTreeSet<usize>,
    render_pending: bool,
    canvas: Option<Canvas>,
    queued: Vec<SessionEvent>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("source", &self.source.path())
            .field("current", &self.history.current_id())
            .field("slots", &self.slots.len())
            .field("full_run", &self.full_run.as_ref().map(|run| run.snapshot))
            .field("outstanding", &self.outstanding)
            .finish()
    }
}

impl Session {
    /// Open a session and start the first full extraction.
    ///
    /// # Errors
    ///
    /// Planning errors for the initial plan, layout errors when the layout
    /// cannot hold its instants, and [`SessionError::WorkerPool`] / storage errors during setup.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: VideoSource,
        adapter: Arc<dyn DecodeAdapter>,
        extract_options: ExtractOptions,
        extraction_plan: ExtractionPlan,
        layout_spec: LayoutSpec,
        styling: Styling,
        shots: Option<ShotBoundaries>,
        options: SessionOptions,
    ) -> Result<Self, MoviePrintError> {
        let instants = plan(&extraction_plan, &source, shots.as_ref())?;
        validate_layout(
            &styling.reserve_header(layout_spec),
            &styling,
            &source,
            &instants,
        )?;
        let pool = build_pool(options.worker_threads)?;
        let engine = ExtractionEngine::new(adapter, extract_options, pool)?;
        let history = StateManager::new(extraction_plan, layout_spec, styling)
            .with_max_history(options.max_history);
        let (sender, receiver) = mpsc::channel();

        let mut session = Self {
            source,
            engine: Arc::new(engine),
            compositor: Compositor::default(),
            history,
            shots,
            options,
            sender,
            receiver,
            full_run: None,
            next_run: 0,
            frames: None,
            slots: Vec::new(),
            outstanding: BTreeSet::new(),
            render_pending: false,
            canvas: None,
            queued: Vec::new(),
        };
        let snapshot = session.history.current();
        session.start_full_run(&snapshot, instants);
        Ok(session)
    }

    /// Use a custom compositor for subsequent renders.
    #[must_use]
    pub fn with_compositor(mut self, compositor: Compositor) -> Self {
        self.compositor = compositor;
        self
    }

    /// The video being printed.
    pub fn source(&self) -> &VideoSource {
        &self.source
    }

    /// The current snapshot.
    pub fn current(&self) -> Arc<SessionSnapshot> {
        self.history.current()
    }

    /// The snapshot history.
    pub fn history(&self) -> &StateManager {
        &self.history
    }

    /// Replace the plan, layout or styling.
    ///
    /// A plan change is validated first and starts a new full extraction;
    /// layout and styling changes re-render from the frames already held.
    ///
    /// # Errors
    ///
    /// [`MoviePrintError::Planning`] for an unusable plan and
    /// [`MoviePrintError::Layout`] for geometry the current plan cannot
    /// satisfy. The history is unchanged in both cases.
    pub fn apply(&mut self, change: SessionChange) -> Result<SnapshotId, MoviePrintError> {
        let current = self.history.current();
        let instants = match &change {
            SessionChange::Plan(new_plan) => {
                let instants = plan(new_plan, &self.source, self.shots.as_ref())?;
                validate_layout(
                    &current.styling.reserve_header(*current.layout),
                    &current.styling,
                    &self.source,
                    &instants,
                )?;
                Some(instants)
            }
            SessionChange::Layout(layout_spec) => {
                self.check_layout(&current, layout_spec, &current.styling)?;
                None
            }
            SessionChange::Styling(styling) => {
                self.check_layout(&current, &current.layout, styling)?;
                None
            }
        };
        let id = self.history.apply(change);
        log::debug!("Applied change as snapshot {id}");
        let snapshot = self.history.current();
        match instants {
            Some(instants) => self.start_full_run(&snapshot, instants),
            None => self.materialize_queued(&snapshot, RenderScope::Full)?,
        }
        Ok(id)
    }

    /// Show the frame at `timestamp` in `slot`.
    ///
    /// Only that slot is decoded and only its cell is re-rendered.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotRendered`] while the current plan's frames are
    /// still being extracted, [`SessionError::SlotOutOfRange`] and
    /// [`SessionError::InvalidTimestamp`].
    pub fn scrub(&mut self, slot: usize, timestamp: Duration) -> Result<SnapshotId, MoviePrintError> {
        if !self.frames_match(&self.history.current()) {
            return Err(SessionError::NotRendered.into());
        }
        if slot >= self.slots.len() {
            return Err(SessionError::SlotOutOfRange {
                slot,
                count: self.slots.len(),
            }
            .into());
        }
        if timestamp >= self.source.duration() {
            return Err(SessionError::InvalidTimestamp(timestamp).into());
        }

        let id = self.history.scrub(slot, timestamp);
        log::debug!("Scrubbed slot {slot} to {timestamp:?} as snapshot {id}");
        let snapshot = self.history.current();
        self.materialize_queued(&snapshot, RenderScope::ChangedCells)?;
        Ok(id)
    }

    /// Step back one snapshot and re-render it. `Ok(None)` when there is
    /// nothing to undo.
    ///
    /// # Errors
    ///
    /// Planning errors when the restored plan needs a new extraction.
    pub fn undo(&mut self) -> Result<Option<Arc<SessionSnapshot>>, MoviePrintError> {
        let Some(snapshot) = self.history.undo() else {
            return Ok(None);
        };
        self.materialize_queued(&snapshot, RenderScope::Full)?;
        Ok(Some(snapshot))
    }

    /// Re-apply the last undone snapshot and re-render it.
    ///
    /// # Errors
    ///
    /// Planning errors when the restored plan needs a new extraction.
    pub fn redo(&mut self) -> Result<Option<Arc<SessionSnapshot>>, MoviePrintError> {
        let Some(snapshot) = self.history.redo() else {
            return Ok(None);
        };
        self.materialize_queued(&snapshot, RenderScope::Full)?;
        Ok(Some(snapshot))
    }

    /// Process every result that has already arrived.
    pub fn poll(&mut self) -> Vec<SessionEvent> {
        let mut events = std::mem::take(&mut self.queued);
        while let Ok(result) = self.receiver.try_recv() {
            self.handle(result, &mut events);
        }
        events
    }

    /// Wait up to `timeout` for the next result, then process it and
    /// everything else already queued.
    pub fn wait_for_event(&mut self, timeout: Duration) -> Vec<SessionEvent> {
        let mut events = std::mem::take(&mut self.queued);
        if !events.is_empty() {
            events.extend(self.poll());
            return events;
        }
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => self.handle(result, &mut events),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return events,
        }
        events.extend(self.poll());
        events
    }

    /// Keep processing results until no work is pending or `timeout`
    /// elapses.
    pub fn wait_until_idle(&mut self, timeout: Duration) -> Vec<SessionEvent> {
        let deadline = Instant::now() + timeout;
        let mut events = self.poll();
        while !self.is_idle() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            events.extend(self.wait_for_event(remaining));
        }
        events
    }

    /// `true` when no extraction, slot decode or render is pending.
    pub fn is_idle(&self) -> bool {
        self.full_run.is_none() && self.outstanding.is_empty() && !self.render_pending
    }

    /// The latest rendered canvas.
    pub fn canvas(&self) -> Option<&RgbImage> {
        self.canvas.as_ref().map(|canvas| &canvas.image)
    }

    /// Geometry of the latest rendered canvas.
    pub fn layout(&self) -> Option<&Layout> {
        self.canvas.as_ref().map(|canvas| &canvas.layout)
    }

    /// Snapshot shown by the latest rendered canvas.
    pub fn rendered_snapshot(&self) -> Option<SnapshotId> {
        self.canvas.as_ref().map(|canvas| canvas.snapshot)
    }

    /// What each cell currently shows.
    pub fn slots(&self) -> &[ThumbnailSlot] {
        &self.slots
    }

    /// The records currently shown, in slot order.
    pub fn records(&self) -> Vec<FrameRecord> {
        self.slots.iter().map(|slot| slot.record.clone()).collect()
    }

    /// Encode the current canvas to `path`, plus the sidecar when
    /// `output.sidecar` is set.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotRendered`] before the first render, and encoding
    /// or I/O failures.
    pub fn export<P: AsRef<Path>>(
        &self,
        path: P,
        output: &OutputOptions,
    ) -> Result<EncodedPrint, MoviePrintError> {
        let canvas = self.canvas.as_ref().ok_or(SessionError::NotRendered)?;
        let encoded = encode_print(&canvas.image, output)?;
        encoded.write_to(path.as_ref())?;

        if let Some(sidecar) = &output.sidecar {
            let snapshot = self.history.current();
            let records = self.records();
            PrintMetadata {
                source: &self.source,
                plan: &snapshot.plan,
                records: &records,
                overrides: &snapshot.overrides,
                layout_spec: &canvas.layout_spec,
                layout: &canvas.layout,
                styling: &snapshot.styling,
                encoded: Some(&encoded),
            }
            .write(sidecar)?;
        }
        Ok(encoded)
    }

    fn frames_match(&self, snapshot: &SessionSnapshot) -> bool {
        self.frames
            .as_ref()
            .is_some_and(|frames| Arc::ptr_eq(&frames.plan, &snapshot.plan))
    }

    /// Reject geometry that cannot hold the current plan's frames.
    fn check_layout(
        &self,
        snapshot: &SessionSnapshot,
        layout_spec: &LayoutSpec,
        styling: &Styling,
    ) -> Result<(), MoviePrintError> {
        let layout_spec = styling.reserve_header(*layout_spec);
        if self.frames_match(snapshot) {
            let items = layout_items(&self.records(), styling);
            compute_layout(&layout_spec, &items)?;
        } else {
            let instants = plan(&snapshot.plan, &self.source, self.shots.as_ref())?;
            validate_layout(&layout_spec, styling, &self.source, &instants)?;
        }
        Ok(())
    }

    /// [`materialize`](Self::materialize) from a command; synchronous
    /// events are delivered by the next poll.
    fn materialize_queued(
        &mut self,
        snapshot: &SessionSnapshot,
        scope: RenderScope,
    ) -> Result<(), MoviePrintError> {
        let mut events = Vec::new();
        let result = self.materialize(snapshot, scope, &mut events);
        self.queued.extend(events);
        result
    }

    fn start_full_run(&mut self, snapshot: &SessionSnapshot, instants: Vec<PlannedInstant>) {
        self.cancel_full_run();
        self.outstanding.clear();
        self.render_pending = false;

        let token = CancellationToken::new();
        let options = self.engine.options().cancelled_by(token.clone());
        let engine = Arc::clone(&self.engine);
        let source = self.source.clone();
        let sender = self.sender.clone();
        let id = snapshot.id;
        let run_plan = Arc::clone(&snapshot.plan);
        let run = self.next_run;
        self.next_run += 1;

        log::debug!(
            "Starting full extraction of {} instants for snapshot {id}",
            instants.len()
        );
        self.full_run = Some(FullRun {
            run,
            snapshot: id,
            plan: Arc::clone(&run_plan),
            token,
        });
        self.engine.pool().spawn(move || {
            let result = engine.extract_with(&options, &source, &instants);
            let _ = sender.send(WorkerResult::Extracted {
                run,
                snapshot: id,
                plan: run_plan,
                result,
            });
        });
    }

    fn cancel_full_run(&mut self) {
        if let Some(run) = self.full_run.take() {
            log::debug!("Cancelling extraction for snapshot {}", run.snapshot);
            run.token.cancel();
        }
    }

    /// Bring the displayed slots and the canvas in line with `snapshot`.
    ///
    /// Only planning a restored plan can fail here; render failures are
    /// reported as events.
    fn materialize(
        &mut self,
        snapshot: &SessionSnapshot,
        scope: RenderScope,
        events: &mut Vec<SessionEvent>,
    ) -> Result<(), MoviePrintError> {
        if !self.frames_match(snapshot) {
            let in_flight = self
                .full_run
                .as_ref()
                .is_some_and(|run| Arc::ptr_eq(&run.plan, &snapshot.plan));
            if !in_flight {
                let instants = plan(&snapshot.plan, &self.source, self.shots.as_ref())?;
                self.start_full_run(snapshot, instants);
            }
            return Ok(());
        }

        // The held frames already belong to this plan.
        self.cancel_full_run();
        self.outstanding.clear();
        if scope == RenderScope::Full {
            self.render_pending = true;
        }

        let mut changed = Vec::new();
        let planned = self
            .frames
            .as_ref()
            .map(|frames| frames.records.clone())
            .unwrap_or_default();
        for (slot, planned_record) in planned.into_iter().enumerate() {
            let override_timestamp = snapshot.override_for(slot);
            let desired = override_timestamp.unwrap_or(planned_record.source_timestamp);
            let Some(displayed) = self.slots.get_mut(slot) else {
                continue;
            };
            displayed.override_timestamp = override_timestamp;

            if displayed.record.source_timestamp != desired {
                if override_timestamp.is_none() && renderable(&planned_record) {
                    displayed.record = planned_record;
                    changed.push(slot);
                } else {
                    self.outstanding.insert(slot);
                }
            } else if self.render_pending && !renderable(&displayed.record) {
                self.outstanding.insert(slot);
            }
        }

        let pending: Vec<usize> = self.outstanding.iter().copied().collect();
        for slot in pending {
            let timestamp = snapshot
                .override_for(slot)
                .or_else(|| self.planned_timestamp(slot))
                .unwrap_or_default();
            self.spawn_slot(snapshot.id, slot, timestamp);
        }

        if self.render_pending {
            if self.outstanding.is_empty() {
                self.render_full(snapshot, events);
            }
        } else {
            for slot in changed {
                self.render_slot(snapshot, slot, events);
            }
        }
        Ok(())
    }

    fn planned_timestamp(&self, slot: usize) -> Option<Duration> {
        self.frames
            .as_ref()
            .and_then(|frames| frames.records.get(slot))
            .map(|record| record.source_timestamp)
    }

    fn spawn_slot(&self, snapshot: SnapshotId, slot: usize, timestamp: Duration) {
        let engine = Arc::clone(&self.engine);
        let source = self.source.clone();
        let sender = self.sender.clone();
        self.engine.pool().spawn(move || {
            let result = engine.extract_single(&source, slot, timestamp);
            let _ = sender.send(WorkerResult::Slot {
                snapshot,
                slot,
                timestamp,
                result,
            });
        });
    }

    fn handle(&mut self, result: WorkerResult, events: &mut Vec<SessionEvent>) {
        match result {
            WorkerResult::Extracted {
                run,
                snapshot,
                plan,
                result,
            } => self.handle_extracted(run, snapshot, plan, result, events),
            WorkerResult::Slot {
                snapshot,
                slot,
                timestamp,
                result,
            } => self.handle_slot(snapshot, slot, timestamp, result, events),
        }
    }

    fn handle_extracted(
        &mut self,
        run: u64,
        snapshot: SnapshotId,
        run_plan: Arc<ExtractionPlan>,
        result: Result<Vec<FrameRecord>, ExtractionError>,
        events: &mut Vec<SessionEvent>,
    ) {
        // A restored plan shares its Arc with the run it replaced, so only
        // the run id tells a cancelled run from the live one.
        let is_active = self
            .full_run
            .as_ref()
            .is_some_and(|active| active.run == run);
        if !is_active {
            log::debug!("Dropping extraction result for snapshot {snapshot}");
            events.push(SessionEvent::Discarded { snapshot });
            return;
        }
        self.full_run = None;

        let records = match result {
            Ok(records) => records,
            Err(error) => {
                events.push(SessionEvent::Failed {
                    snapshot,
                    error: error.into(),
                });
                return;
            }
        };

        let placeholders = records.iter().filter(|record| record.is_placeholder()).count();
        events.push(SessionEvent::FramesExtracted {
            snapshot,
            frames: records.len(),
            placeholders,
        });
        self.slots = records
            .iter()
            .map(|record| ThumbnailSlot {
                slot_index: record.sequence_index,
                record: record.clone(),
                override_timestamp: None,
            })
            .collect();
        self.frames = Some(FrameSet {
            plan: run_plan,
            records,
        });

        let current = self.history.current();
        self.materialize_full(&current, events);
    }

    fn handle_slot(
        &mut self,
        snapshot: SnapshotId,
        slot: usize,
        timestamp: Duration,
        result: Result<FrameRecord, ExtractionError>,
        events: &mut Vec<SessionEvent>,
    ) {
        if !self.history.is_current(snapshot) || !self.outstanding.contains(&slot) {
            log::debug!("Dropping slot {slot} result for snapshot {snapshot}");
            events.push(SessionEvent::Discarded { snapshot });
            return;
        }
        self.outstanding.remove(&slot);

        let Some(displayed) = self.slots.get_mut(slot) else {
            return;
        };
        let shot = displayed.record.shot;
        let mut record = match result {
            Ok(record) => record,
            Err(error) => {
                let mut record = displayed.record.clone();
                record.source_timestamp = timestamp;
                record.frame_number = self.source.frame_number_at(timestamp);
                record.image = FrameImage::Failed(error.to_string());
                events.push(SessionEvent::Failed {
                    snapshot,
                    error: error.into(),
                });
                record
            }
        };
        // The cell still stands for the planned shot.
        record.shot = shot;
        displayed.record = record;

        let current = self.history.current();
        if self.render_pending {
            if self.outstanding.is_empty() {
                self.render_full(&current, events);
            }
        } else {
            self.render_slot(&current, slot, events);
        }
    }

    fn render_full(&mut self, snapshot: &SessionSnapshot, events: &mut Vec<SessionEvent>) {
        self.render_pending = false;
        let layout_spec = snapshot.styling.reserve_header(*snapshot.layout);
        let records: Vec<FrameRecord> = self.records();
        match compose_records(
            &self.compositor,
            &self.source,
            &layout_spec,
            &snapshot.styling,
            &records,
        ) {
            Ok((layout, image)) => {
                self.canvas = Some(Canvas {
                    snapshot: snapshot.id,
                    layout_spec,
                    layout,
                    image,
                });
                self.release_pixels(None);
                log::debug!("Rendered snapshot {}", snapshot.id);
                events.push(SessionEvent::Rendered {
                    snapshot: snapshot.id,
                });
            }
            Err(error) => events.push(SessionEvent::Failed {
                snapshot: snapshot.id,
                error,
            }),
        }
    }

    fn render_slot(&mut self, snapshot: &SessionSnapshot, slot: usize, events: &mut Vec<SessionEvent>) {
        // A frame of a different shape moves other cells; redraw everything.
        let items = layout_items(&self.records(), &snapshot.styling);
        let layout_unchanged = self.canvas.as_ref().is_some_and(|canvas| {
            compute_layout(&canvas.layout_spec, &items).ok().as_ref() == Some(&canvas.layout)
        });
        if !layout_unchanged {
            self.materialize_full(snapshot, events);
            return;
        }

        let (Some(canvas), Some(displayed)) = (self.canvas.as_mut(), self.slots.get(slot)) else {
            return;
        };
        match self.compositor.render_cell(
            &mut canvas.image,
            &canvas.layout,
            slot,
            &displayed.record,
            &snapshot.styling,
        ) {
            Ok(()) => {
                canvas.snapshot = snapshot.id;
                self.release_pixels(Some(slot));
                events.push(SessionEvent::CellUpdated {
                    snapshot: snapshot.id,
                    slot,
                });
            }
            Err(error) => events.push(SessionEvent::Failed {
                snapshot: snapshot.id,
                error: error.into(),
            }),
        }
    }

    fn materialize_full(&mut self, snapshot: &SessionSnapshot, events: &mut Vec<SessionEvent>) {
        self.render_pending = true;
        if let Err(error) = self.materialize(snapshot, RenderScope::Full, events) {
            events.push(SessionEvent::Failed {
                snapshot: snapshot.id,
                error,
            });
        }
    }

    /// Drop decoded pixels once drawn, unless the session retains them.
    fn release_pixels(&mut self, slot: Option<usize>) {
        if self.options.retain_frames {
            return;
        }
        match slot {
            Some(slot) => {
                if let Some(displayed) = self.slots.get_mut(slot) {
                    displayed.record.release();
                }
            }
            None => {
                for displayed in &mut self.slots {
                    displayed.record.release();
                }
                if let Some(frames) = self.frames.as_mut() {
                    for record in &mut frames.records {
                        record.release();
                    }
                }
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel_full_run();
    }
}

fn renderable(record: &FrameRecord) -> bool {
    record.has_pixels() || record.is_placeholder()
}
