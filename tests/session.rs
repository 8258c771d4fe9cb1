//! Interactive session integration tests.
//!
//! Sessions decode on a background pool; every test waits for the session
//! to go idle before checking the canvas.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{SyntheticDecoder, close, color_for, secs};
use image::{Rgb, RgbImage};
use movieprint::{
    ExtractOptions, ExtractionPlan, GridShape, IntervalStep, LayoutError, LayoutSpec,
    MoviePrintError, OutputFormat, OutputOptions, Session, SessionChange, SessionError,
    SessionEvent, SessionOptions, ShotBoundaries, Styling,
};

const WAIT: Duration = Duration::from_secs(10);

fn ten_second_plan() -> ExtractionPlan {
    ExtractionPlan::interval(IntervalStep::Seconds(secs(10)))
}

fn open_with(decoder: Arc<SyntheticDecoder>, options: SessionOptions) -> Session {
    let source = decoder.source();
    let mut session = Session::new(
        source,
        decoder,
        ExtractOptions::new(),
        ten_second_plan(),
        LayoutSpec::grid(GridShape::Columns(3)),
        Styling::default(),
        None,
        options,
    )
    .unwrap();
    let events = session.wait_until_idle(WAIT);
    assert!(session.is_idle());
    assert!(
        events
            .iter()
            .any(|event| matches!(event, SessionEvent::Rendered { .. }))
    );
    session
}

fn open() -> Session {
    open_with(Arc::new(SyntheticDecoder::new()), SessionOptions::new())
}

fn cell_center(session: &Session, slot: usize) -> (u32, u32) {
    let cell = session.layout().unwrap().cell(slot).unwrap();
    (cell.x + cell.width / 2, cell.y + cell.height / 2)
}

fn cell_color(session: &Session, slot: usize) -> Rgb<u8> {
    let (x, y) = cell_center(session, slot);
    *session.canvas().unwrap().get_pixel(x, y)
}

// ── Initial render ─────────────────────────────────────────────────

#[test]
fn first_render_shows_every_planned_frame() {
    let session = open();
    assert_eq!(session.slots().len(), 6);
    assert_eq!(session.rendered_snapshot(), Some(session.current().id));
    for slot in 0..6 {
        assert!(close(cell_color(&session, slot), color_for(secs(slot as u64 * 10))));
    }
}

#[test]
fn scrubbing_before_frames_arrive_is_rejected() {
    let decoder = Arc::new(SyntheticDecoder::new().with_delay(Duration::from_millis(50)));
    let source = decoder.source();
    let mut session = Session::new(
        source,
        decoder,
        ExtractOptions::new(),
        ten_second_plan(),
        LayoutSpec::grid(GridShape::Columns(3)),
        Styling::default(),
        None,
        SessionOptions::new(),
    )
    .unwrap();

    assert!(matches!(
        session.scrub(0, secs(5)),
        Err(MoviePrintError::Session(SessionError::NotRendered))
    ));
    assert!(matches!(
        session.export("unused.jpg", &OutputOptions::default()),
        Err(MoviePrintError::Session(SessionError::NotRendered))
    ));
}

// ── Scrubbing ──────────────────────────────────────────────────────

#[test]
fn scrub_rerenders_only_that_cell() {
    let mut session = open();
    let before: RgbImage = session.canvas().unwrap().clone();

    session.scrub(1, secs(37)).unwrap();
    let events = session.wait_until_idle(WAIT);
    assert!(
        events
            .iter()
            .any(|event| matches!(event, SessionEvent::CellUpdated { slot: 1, .. }))
    );
    assert!(
        !events
            .iter()
            .any(|event| matches!(event, SessionEvent::Rendered { .. }))
    );

    let after = session.canvas().unwrap();
    let cell = *session.layout().unwrap().cell(1).unwrap();
    for (x, y, pixel) in after.enumerate_pixels() {
        if !cell.contains(x, y) {
            assert_eq!(pixel, before.get_pixel(x, y), "pixel ({x}, {y}) changed");
        }
    }
    assert!(close(cell_color(&session, 1), color_for(secs(37))));

    let slot = &session.slots()[1];
    assert_eq!(slot.override_timestamp, Some(secs(37)));
    assert_eq!(slot.record.source_timestamp, secs(37));
}

#[test]
fn superseded_scrub_results_are_discarded() {
    let mut session = open();
    let first = session.scrub(0, secs(3)).unwrap();
    let second = session.scrub(0, secs(44)).unwrap();

    // The session can go idle before the superseded result arrives.
    let deadline = Instant::now() + WAIT;
    let mut events = session.wait_until_idle(WAIT);
    let discarded = |events: &[SessionEvent]| {
        events
            .iter()
            .any(|event| matches!(event, SessionEvent::Discarded { snapshot } if *snapshot == first))
    };
    while !discarded(&events) && Instant::now() < deadline {
        events.extend(session.wait_for_event(Duration::from_millis(100)));
    }
    assert!(discarded(&events));
    assert_eq!(session.rendered_snapshot(), Some(second));
    assert!(close(cell_color(&session, 0), color_for(secs(44))));
}

#[test]
fn scrub_arguments_are_validated() {
    let mut session = open();
    assert!(matches!(
        session.scrub(6, secs(1)),
        Err(MoviePrintError::Session(SessionError::SlotOutOfRange {
            slot: 6,
            count: 6
        }))
    ));
    assert!(matches!(
        session.scrub(0, secs(60)),
        Err(MoviePrintError::Session(SessionError::InvalidTimestamp(_)))
    ));
    assert!(!session.history().can_undo());
}

#[test]
fn scrub_to_undecodable_frame_shows_placeholder() {
    let decoder = Arc::new(SyntheticDecoder::new().failing_at(secs(7)));
    let mut session = open_with(decoder, SessionOptions::new());
    session.scrub(2, secs(7)).unwrap();
    session.wait_until_idle(WAIT);

    assert!(session.slots()[2].record.is_placeholder());
    assert_eq!(cell_color(&session, 2), Styling::default().placeholder_color);
}

// ── Undo / redo ────────────────────────────────────────────────────

#[test]
fn undo_restores_the_previous_canvas_exactly() {
    let mut session = open();
    let original = session.canvas().unwrap().clone();

    session.scrub(4, secs(21)).unwrap();
    session.wait_until_idle(WAIT);
    let scrubbed = session.canvas().unwrap().clone();
    assert_ne!(original, scrubbed);

    assert!(session.undo().unwrap().is_some());
    let events = session.wait_until_idle(WAIT);
    assert!(
        events
            .iter()
            .any(|event| matches!(event, SessionEvent::Rendered { .. }))
    );
    assert_eq!(session.canvas().unwrap(), &original);
    assert_eq!(session.slots()[4].override_timestamp, None);

    session.redo().unwrap();
    session.wait_until_idle(WAIT);
    assert_eq!(session.canvas().unwrap(), &scrubbed);
}

#[test]
fn undo_past_the_start_is_a_no_op() {
    let mut session = open();
    assert!(session.undo().unwrap().is_none());
    assert!(session.redo().unwrap().is_none());
}

// ── Changes ────────────────────────────────────────────────────────

#[test]
fn styling_change_rerenders_from_held_frames() {
    let decoder = Arc::new(SyntheticDecoder::new());
    let mut session = open_with(Arc::clone(&decoder), SessionOptions::new());
    let decoded = decoder.calls();

    let background = Rgb([1, 2, 3]);
    session
        .apply(SessionChange::Styling(Styling::default().with_background(background)))
        .unwrap();
    session.wait_until_idle(WAIT);

    assert_eq!(decoder.calls(), decoded);
    assert_eq!(*session.canvas().unwrap().get_pixel(0, 0), background);
}

#[test]
fn released_frames_are_decoded_again_for_a_full_render() {
    let decoder = Arc::new(SyntheticDecoder::new());
    let mut session = open_with(
        Arc::clone(&decoder),
        SessionOptions::new().with_retain_frames(false),
    );
    assert!(session.slots().iter().all(|slot| !slot.record.has_pixels()));
    let decoded = decoder.calls();

    session
        .apply(SessionChange::Layout(LayoutSpec::grid(GridShape::Columns(2))))
        .unwrap();
    session.wait_until_idle(WAIT);

    assert_eq!(decoder.calls(), decoded + 6);
    assert_eq!(session.layout().unwrap().cell(2).unwrap().x, 5);
    assert!(close(cell_color(&session, 5), color_for(secs(50))));
}

#[test]
fn plan_change_extracts_a_new_frame_set() {
    let mut session = open();
    session
        .apply(SessionChange::Plan(ExtractionPlan::interval(
            IntervalStep::Seconds(secs(20)),
        )))
        .unwrap();
    let events = session.wait_until_idle(WAIT);

    assert!(events.iter().any(|event| matches!(
        event,
        SessionEvent::FramesExtracted {
            frames: 3,
            placeholders: 0,
            ..
        }
    )));
    assert_eq!(session.slots().len(), 3);
    assert_eq!(session.layout().unwrap().len(), 3);

    session.undo().unwrap();
    session.wait_until_idle(WAIT);
    assert_eq!(session.slots().len(), 6);
}

#[test]
fn invalid_layout_change_leaves_history_untouched() {
    let mut session = open();
    let before = session.current().id;
    let result = session.apply(SessionChange::Layout(LayoutSpec::timeline(90, 800)));

    assert!(matches!(result, Err(MoviePrintError::Layout(_))));
    assert_eq!(session.current().id, before);
    assert!(!session.history().can_undo());
}

#[test]
fn invalid_plan_change_is_rejected() {
    let mut session = open();
    let result = session.apply(SessionChange::Plan(
        ExtractionPlan::interval(IntervalStep::Seconds(secs(1))).with_range(secs(90), None),
    ));
    assert!(matches!(result, Err(MoviePrintError::Planning(_))));
    assert_eq!(session.slots().len(), 6);
}

#[test]
fn unsatisfiable_layout_fails_before_any_decode() {
    let decoder = Arc::new(SyntheticDecoder::new());
    let source = decoder.source();
    let result = Session::new(
        source,
        decoder.clone(),
        ExtractOptions::new(),
        ten_second_plan(),
        LayoutSpec::timeline(90, 800),
        Styling::default(),
        None,
        SessionOptions::new(),
    );

    assert!(matches!(
        result,
        Err(MoviePrintError::Layout(LayoutError::MissingShotDurations { .. }))
    ));
    assert_eq!(decoder.calls(), 0);
}

#[test]
fn plan_change_the_layout_cannot_hold_is_rejected() {
    let decoder = Arc::new(SyntheticDecoder::new());
    let source = decoder.source();
    let shots = ShotBoundaries::from_cuts(&[secs(20), secs(40)], secs(0)..secs(60));
    let mut session = Session::new(
        source,
        decoder.clone(),
        ExtractOptions::new(),
        ExtractionPlan::shots(),
        LayoutSpec::timeline(90, 800),
        Styling::default(),
        Some(shots),
        SessionOptions::new(),
    )
    .unwrap();
    session.wait_until_idle(WAIT);
    assert_eq!(session.slots().len(), 3);

    let decoded = decoder.calls();
    let before = session.current().id;
    let result = session.apply(SessionChange::Plan(ten_second_plan()));

    assert!(matches!(
        result,
        Err(MoviePrintError::Layout(LayoutError::MissingShotDurations { .. }))
    ));
    assert_eq!(session.current().id, before);
    assert!(session.is_idle());
    assert_eq!(decoder.calls(), decoded);
}

// ── Full runs ──────────────────────────────────────────────────────

#[test]
fn newer_plan_cancels_the_run_in_flight() {
    let decoder = Arc::new(SyntheticDecoder::new().with_delay(Duration::from_millis(30)));
    let mut session = open_with(decoder.clone(), SessionOptions::new().with_worker_threads(2));
    let decoded = decoder.calls();

    let first = session
        .apply(SessionChange::Plan(ExtractionPlan::interval(
            IntervalStep::Seconds(secs(5)),
        )))
        .unwrap();
    let second = session
        .apply(SessionChange::Plan(ExtractionPlan::interval(
            IntervalStep::Seconds(secs(20)),
        )))
        .unwrap();

    let deadline = Instant::now() + WAIT;
    let mut events = session.wait_until_idle(WAIT);
    let discarded = |events: &[SessionEvent]| {
        events
            .iter()
            .any(|event| matches!(event, SessionEvent::Discarded { snapshot } if *snapshot == first))
    };
    while !discarded(&events) && Instant::now() < deadline {
        events.extend(session.wait_for_event(Duration::from_millis(100)));
    }

    assert!(discarded(&events));
    assert!(events.iter().all(|event| !matches!(
        event,
        SessionEvent::FramesExtracted { snapshot, .. } if *snapshot == first
    )));
    assert_eq!(session.rendered_snapshot(), Some(second));
    assert_eq!(session.slots().len(), 3);
    assert!(decoder.calls() - decoded < 12 + 3);
}

#[test]
fn redo_after_cancelled_run_adopts_the_new_run() {
    let decoder = Arc::new(SyntheticDecoder::new().with_delay(Duration::from_millis(30)));
    let mut session = open_with(decoder, SessionOptions::new());

    session
        .apply(SessionChange::Plan(ExtractionPlan::interval(
            IntervalStep::Seconds(secs(20)),
        )))
        .unwrap();
    session.undo().unwrap();
    session.redo().unwrap();

    let mut events = session.wait_until_idle(WAIT);
    events.extend(session.wait_for_event(Duration::from_millis(200)));

    assert!(
        !events
            .iter()
            .any(|event| matches!(event, SessionEvent::Failed { .. }))
    );
    assert!(session.is_idle());
    assert_eq!(session.rendered_snapshot(), Some(session.current().id));
    assert_eq!(session.slots().len(), 3);
    session.scrub(0, secs(7)).unwrap();
}

// ── Export ─────────────────────────────────────────────────────────

#[test]
fn export_writes_print_and_sidecar() {
    let dir = tempfile::tempdir().unwrap();
    let image_path = dir.path().join("print.png");
    let sidecar_path = dir.path().join("print.json");

    let mut session = open();
    session.scrub(3, secs(33)).unwrap();
    session.wait_until_idle(WAIT);

    let output = OutputOptions::new(OutputFormat::Png).with_sidecar(&sidecar_path);
    let encoded = session.export(&image_path, &output).unwrap();

    let written = image::open(&image_path).unwrap().to_rgb8();
    assert_eq!(&written, session.canvas().unwrap());
    assert_eq!(encoded.width, written.width());

    let metadata: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&sidecar_path).unwrap()).unwrap();
    let frames = metadata["frames"].as_array().unwrap();
    assert_eq!(frames.len(), 6);
    assert_eq!(frames[3]["scrubbed"], true);
    assert_eq!(frames[3]["timestamp_seconds"], 33.0);
    assert_eq!(frames[0]["scrubbed"], false);
    assert_eq!(metadata["output"]["format"], "png");
}
