//! FFmpeg decoder integration tests.
//!
//! Tests that need media skip themselves unless
//! `tests/fixtures/sample_video.mp4` exists.

mod common;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use common::FIXTURE_PATH;
use movieprint::{
    DecodeAdapter, DecodeError, DecodeRequest, ExtractionPlan, FfmpegDecoder, GridShape,
    IntervalStep, LayoutSpec, MoviePrinter, Styling, VideoSource,
};

fn fixture() -> Option<&'static str> {
    Path::new(FIXTURE_PATH).exists().then_some(FIXTURE_PATH)
}

// ── Probing ────────────────────────────────────────────────────────

#[test]
fn missing_file_is_unavailable() {
    let result = VideoSource::open("tests/fixtures/does_not_exist.mp4", &FfmpegDecoder::new());
    assert!(matches!(result, Err(DecodeError::Unavailable { .. })));
}

#[test]
fn probe_reads_stream_properties() {
    let Some(path) = fixture() else {
        return;
    };
    let source = VideoSource::open(path, &FfmpegDecoder::new()).unwrap();
    let (width, height) = source.dimensions();
    assert!(width > 0 && height > 0);
    assert!(source.duration() > Duration::ZERO);
    assert!(source.frames_per_second() > 0.0);
    assert!(!source.info().codec.is_empty());
}

// ── Decoding ───────────────────────────────────────────────────────

#[test]
fn decode_at_returns_a_frame_near_the_target() {
    let Some(path) = fixture() else {
        return;
    };
    let decoder = FfmpegDecoder::new();
    let source = VideoSource::open(path, &decoder).unwrap();
    let target = source.duration() / 2;
    let frame = decoder
        .decode_at(&source, target, &DecodeRequest::new())
        .unwrap();

    assert_eq!((frame.image.width(), frame.image.height()), source.dimensions());
    let frame_length = Duration::from_secs_f64(1.0 / source.frames_per_second());
    assert!(frame.timestamp <= target + frame_length);
    assert!(!frame.tone_mapped);
}

#[test]
fn max_dimension_scales_the_frame() {
    let Some(path) = fixture() else {
        return;
    };
    let decoder = FfmpegDecoder::new();
    let source = VideoSource::open(path, &decoder).unwrap();
    let frame = decoder
        .decode_at(
            &source,
            Duration::ZERO,
            &DecodeRequest::new().with_max_dimension(Some(64)),
        )
        .unwrap();
    assert_eq!(frame.image.width().max(frame.image.height()), 64);
}

#[test]
fn decoding_past_the_end_fails_for_that_frame_only() {
    let Some(path) = fixture() else {
        return;
    };
    let decoder = FfmpegDecoder::new();
    let source = VideoSource::open(path, &decoder).unwrap();
    let error = decoder
        .decode_at(
            &source,
            source.duration() + Duration::from_secs(60),
            &DecodeRequest::new(),
        )
        .unwrap_err();
    assert!(!error.is_fatal());
}

// ── End to end ─────────────────────────────────────────────────────

#[test]
fn fixture_prints_end_to_end() {
    let Some(path) = fixture() else {
        return;
    };
    let printer = MoviePrinter::new(Arc::new(FfmpegDecoder::new()));
    let source = printer.open(path).unwrap();
    let extraction_plan =
        ExtractionPlan::interval(IntervalStep::Seconds(source.duration() / 4)).with_max_frames(4);
    let print = printer
        .render(
            &source,
            &extraction_plan,
            &LayoutSpec::grid(GridShape::Columns(2)).with_thumbnail_width(160),
            &Styling::default(),
            None,
        )
        .unwrap();

    assert_eq!(print.records.len(), 4);
    assert!(print.records.iter().all(|record| !record.is_placeholder()));
    assert_eq!(print.image.width(), 2 * 160 + 3 * 5);
}
