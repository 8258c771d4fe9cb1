//! Extraction engine integration tests.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{SyntheticDecoder, color_for, millis, secs};
use image::DynamicImage;
use movieprint::{
    CancellationToken, DecodeError, DynamicRange, ExtractOptions, ExtractionEngine,
    ExtractionError, ExtractionPlan, FaceBox, FaceDetector, FrameFormat, FrameImage, IntervalStep,
    OperationType, ProgressCallback, ProgressInfo, ToneMapping, ToneMapAlgorithm,
    TransferFunction, WorkingStorage, plan,
};
use rayon::ThreadPoolBuilder;

fn pool(threads: usize) -> Arc<rayon::ThreadPool> {
    Arc::new(ThreadPoolBuilder::new().num_threads(threads).build().unwrap())
}

fn engine(decoder: Arc<SyntheticDecoder>, options: ExtractOptions) -> ExtractionEngine {
    ExtractionEngine::new(decoder, options, pool(4)).unwrap()
}

fn every_five_seconds() -> ExtractionPlan {
    ExtractionPlan::interval(IntervalStep::Seconds(secs(5)))
}

// ── Ordering and content ───────────────────────────────────────────

#[test]
fn records_come_back_in_sequence_order() {
    let decoder = Arc::new(SyntheticDecoder::new());
    let source = decoder.source();
    let instants = plan(&every_five_seconds(), &source, None).unwrap();
    let records = engine(Arc::clone(&decoder), ExtractOptions::new())
        .extract(&source, &instants)
        .unwrap();

    assert_eq!(records.len(), 12);
    for (index, (record, instant)) in records.iter().zip(&instants).enumerate() {
        assert_eq!(record.sequence_index, index);
        assert_eq!(record.source_timestamp, instant.timestamp);
        assert_eq!(record.frame_number, instant.frame_number);

        let image = record.load_image().unwrap().unwrap();
        assert_eq!(image.to_rgb8().get_pixel(0, 0), &color_for(instant.timestamp));
    }
    assert_eq!(decoder.calls(), 12);
}

#[test]
fn failed_frames_become_placeholders() {
    let decoder = Arc::new(SyntheticDecoder::new().failing_at(secs(10)));
    let source = decoder.source();
    let instants = plan(&every_five_seconds(), &source, None).unwrap();
    let records = engine(decoder, ExtractOptions::new())
        .extract(&source, &instants)
        .unwrap();

    assert_eq!(records.len(), instants.len());
    let failed: Vec<usize> = records
        .iter()
        .filter(|record| record.is_placeholder())
        .map(|record| record.sequence_index)
        .collect();
    assert_eq!(failed, vec![2]);
    assert!(records[2].error().unwrap().contains("corrupt packet"));
    assert_eq!((records[2].width, records[2].height), (64, 36));
}

#[test]
fn fatal_errors_fail_the_run() {
    let decoder = Arc::new(SyntheticDecoder::new().unavailable());
    let source = decoder.source();
    let instants = plan(&every_five_seconds(), &source, None).unwrap();
    let result = engine(decoder, ExtractOptions::new()).extract(&source, &instants);

    assert!(matches!(
        result,
        Err(ExtractionError::Decode(DecodeError::Unavailable { .. }))
    ));
}

#[test]
fn single_slot_extraction_keeps_the_slot_index() {
    let decoder = Arc::new(SyntheticDecoder::new());
    let source = decoder.source();
    let record = engine(decoder, ExtractOptions::new())
        .extract_single(&source, 7, millis(12_500))
        .unwrap();

    assert_eq!(record.sequence_index, 7);
    assert_eq!(record.source_timestamp, millis(12_500));
    assert_eq!(record.frame_number, 300);
    assert!(record.has_pixels());
}

#[test]
fn single_slot_past_the_end_is_a_placeholder() {
    let decoder = Arc::new(SyntheticDecoder::new());
    let source = decoder.source();
    let record = engine(decoder, ExtractOptions::new())
        .extract_single(&source, 0, secs(90))
        .unwrap();
    assert!(record.is_placeholder());
}

// ── Cancellation and timeouts ──────────────────────────────────────

#[test]
fn cancelled_run_returns_cancelled() {
    let decoder = Arc::new(SyntheticDecoder::new());
    let source = decoder.source();
    let instants = plan(&every_five_seconds(), &source, None).unwrap();

    let token = CancellationToken::new();
    token.cancel();
    let options = ExtractOptions::new().with_cancellation(token);
    let result = engine(Arc::clone(&decoder), options).extract(&source, &instants);

    assert!(matches!(result, Err(ExtractionError::Cancelled)));
    assert_eq!(decoder.calls(), 0);
}

#[test]
fn slow_frames_time_out_into_placeholders() {
    let decoder = Arc::new(SyntheticDecoder::new().with_delay(millis(500)));
    let source = decoder.source();
    let extraction_plan = every_five_seconds().with_range(secs(0), Some(secs(10)));
    let instants = plan(&extraction_plan, &source, None).unwrap();

    let options = ExtractOptions::new().with_decode_timeout(Some(millis(20)));
    let records = engine(decoder, options).extract(&source, &instants).unwrap();

    assert_eq!(records.len(), 2);
    for record in &records {
        assert!(record.is_placeholder());
        assert!(record.error().unwrap().contains("timed out"));
    }
}

// ── Working storage ────────────────────────────────────────────────

#[test]
fn frames_spill_to_a_caller_directory() {
    let dir = tempfile::tempdir().unwrap();
    let frames = dir.path().join("frames");
    let decoder = Arc::new(SyntheticDecoder::new());
    let source = decoder.source();
    let instants = plan(&every_five_seconds().with_max_frames(3), &source, None).unwrap();

    let options = ExtractOptions::new().with_working_storage(WorkingStorage::Directory(frames.clone()));
    let records = engine(decoder, options).extract(&source, &instants).unwrap();

    for record in &records {
        let FrameImage::File(path) = &record.image else {
            panic!("slot {} was not spilled", record.sequence_index);
        };
        assert!(path.starts_with(&frames));
        assert!(path.exists());
        let image = record.load_image().unwrap().unwrap();
        assert_eq!(
            image.to_rgb8().get_pixel(3, 3),
            &color_for(record.source_timestamp)
        );
    }
}

#[test]
fn temporary_storage_is_removed_with_the_engine() {
    let decoder = Arc::new(SyntheticDecoder::new());
    let source = decoder.source();
    let instants = plan(&every_five_seconds().with_max_frames(2), &source, None).unwrap();

    let options = ExtractOptions::new().with_working_storage(WorkingStorage::TempDirectory);
    let engine = engine(decoder, options);
    let records = engine.extract(&source, &instants).unwrap();
    let FrameImage::File(path) = records[0].image.clone() else {
        panic!("frame was not spilled");
    };
    assert!(path.exists());

    drop(engine);
    assert!(!path.exists());
}

#[test]
fn spilled_frames_use_the_configured_format() {
    let dir = tempfile::tempdir().unwrap();
    let decoder = Arc::new(SyntheticDecoder::new());
    let source = decoder.source();
    let instants = plan(&every_five_seconds().with_max_frames(2), &source, None).unwrap();

    let options = ExtractOptions::new()
        .with_working_storage(WorkingStorage::Directory(dir.path().to_path_buf()))
        .with_frame_format(FrameFormat::Jpeg);
    let records = engine(decoder, options).extract(&source, &instants).unwrap();

    for record in &records {
        let FrameImage::File(path) = &record.image else {
            panic!("slot {} was not spilled", record.sequence_index);
        };
        assert_eq!(path.extension().and_then(|ext| ext.to_str()), Some("jpg"));
        let pixel = *record.load_image().unwrap().unwrap().to_rgb8().get_pixel(8, 8);
        let expected = color_for(record.source_timestamp);
        for channel in 0..3 {
            assert!(pixel[channel].abs_diff(expected[channel]) <= 8);
        }
    }
}

// ── Tone mapping and detectors ─────────────────────────────────────

#[test]
fn hdr_sources_are_tone_mapped_by_default() {
    let decoder = Arc::new(
        SyntheticDecoder::new().with_dynamic_range(DynamicRange::Hdr(TransferFunction::Pq)),
    );
    let source = decoder.source();
    let record = engine(Arc::clone(&decoder), ExtractOptions::new())
        .extract_single(&source, 0, secs(1))
        .unwrap();
    assert!(record.tone_mapped);

    let disabled = ExtractOptions::new().with_tone_mapping(ToneMapping {
        enabled: false,
        algorithm: ToneMapAlgorithm::Reinhard,
    });
    let record = engine(decoder, disabled)
        .extract_single(&source, 0, secs(1))
        .unwrap();
    assert!(!record.tone_mapped);
}

#[test]
fn sdr_sources_are_never_tone_mapped() {
    let decoder = Arc::new(SyntheticDecoder::new());
    let source = decoder.source();
    let options = ExtractOptions::new().with_tone_map_algorithm(ToneMapAlgorithm::Mobius);
    let record = engine(decoder, options)
        .extract_single(&source, 0, secs(1))
        .unwrap();
    assert!(!record.tone_mapped);
}

struct CentreFace;

impl FaceDetector for CentreFace {
    fn detect(&self, image: &DynamicImage) -> Vec<FaceBox> {
        vec![FaceBox {
            x: image.width() / 4,
            y: image.height() / 4,
            width: image.width() / 2,
            height: image.height() / 2,
        }]
    }
}

#[test]
fn face_detector_annotates_records() {
    let decoder = Arc::new(SyntheticDecoder::new());
    let source = decoder.source();
    let options = ExtractOptions::new().with_face_detector(Arc::new(CentreFace));
    let record = engine(decoder, options)
        .extract_single(&source, 0, secs(2))
        .unwrap();

    let faces = record.face_boxes.unwrap();
    assert_eq!(faces.len(), 1);
    assert_eq!((faces[0].x, faces[0].width), (16, 32));
}

// ── Hardware hint ──────────────────────────────────────────────────

#[test]
fn hardware_fallback_still_decodes_in_software() {
    let decoder = Arc::new(SyntheticDecoder::new());
    let source = decoder.source();
    let instants = plan(&every_five_seconds(), &source, None).unwrap();
    let records = engine(decoder, ExtractOptions::new().with_hardware(true))
        .extract(&source, &instants)
        .unwrap();

    assert_eq!(records.len(), 12);
    assert!(records.iter().all(|record| !record.is_placeholder()));
    assert!(records.iter().all(|record| !record.hardware_decoded));
}

// ── Progress ───────────────────────────────────────────────────────

#[derive(Default)]
struct Recorder {
    reports: Mutex<Vec<(OperationType, u64, Option<u64>)>>,
}

impl ProgressCallback for Recorder {
    fn on_progress(&self, info: &ProgressInfo) {
        self.reports
            .lock()
            .unwrap()
            .push((info.operation, info.current, info.total));
    }
}

#[test]
fn progress_reports_every_batch_and_at_the_end() {
    let decoder = Arc::new(SyntheticDecoder::new());
    let source = decoder.source();
    let instants = plan(&every_five_seconds(), &source, None).unwrap();

    let recorder = Arc::new(Recorder::default());
    let options = ExtractOptions::new()
        .with_progress(Arc::clone(&recorder) as Arc<dyn ProgressCallback>)
        .with_batch_size(4);
    engine(decoder, options).extract(&source, &instants).unwrap();

    let reports = recorder.reports.lock().unwrap();
    assert_eq!(reports.len(), 4);
    assert!(reports.iter().all(|(operation, _, total)| {
        *operation == OperationType::FrameExtraction && *total == Some(12)
    }));
    assert_eq!(reports.last().unwrap().1, 12);
}
