//! Encoding and size-fitting integration tests.

use image::{Rgb, RgbImage};
use movieprint::{CompositionError, OutputFormat, OutputOptions, encode_print};

/// Deterministic noise; compresses poorly so quality changes matter.
fn noisy_canvas(width: u32, height: u32) -> RgbImage {
    let mut state: u32 = 0x1234_5678;
    RgbImage::from_fn(width, height, |_, _| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let bytes = state.to_le_bytes();
        Rgb([bytes[0], bytes[1], bytes[2]])
    })
}

fn jpeg(quality: u8) -> OutputOptions {
    OutputOptions::new(OutputFormat::Jpeg)
        .with_quality(quality)
        .with_quality_search(20, 5)
}

// ── JPEG ───────────────────────────────────────────────────────────

#[test]
fn unconstrained_encode_is_a_single_attempt() {
    let canvas = noisy_canvas(320, 240);
    let print = encode_print(&canvas, &jpeg(90)).unwrap();

    assert_eq!(print.attempts, 1);
    assert_eq!(print.quality, Some(90));
    assert!(print.size_target_met);
    assert_eq!((print.width, print.height), (320, 240));

    let decoded = image::load_from_memory(&print.bytes).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (320, 240));
}

#[test]
fn size_target_lowers_quality_not_dimensions() {
    let canvas = noisy_canvas(320, 240);
    let at_floor = encode_print(&canvas, &jpeg(20)).unwrap();
    let target_kb = at_floor.bytes.len() as u64 / 1024 + 1;

    let print = encode_print(&canvas, &jpeg(90).with_max_size_kb(target_kb)).unwrap();
    assert!(print.size_target_met);
    assert!(print.bytes.len() as u64 <= target_kb * 1024);
    assert!(print.quality.unwrap() < 90);
    assert!(print.quality.unwrap() >= 20);
    assert!(print.attempts > 1);
    assert_eq!((print.width, print.height), (320, 240));
}

#[test]
fn unreachable_target_stops_at_floor_and_warns() {
    let canvas = noisy_canvas(320, 240);
    let print = encode_print(&canvas, &jpeg(90).with_max_size_kb(1)).unwrap();

    assert!(!print.size_target_met);
    assert_eq!(print.quality, Some(20));
    assert_eq!((print.width, print.height), (320, 240));
}

#[test]
fn unreachable_target_fails_when_required() {
    let canvas = noisy_canvas(320, 240);
    let options = jpeg(90).with_max_size_kb(1).with_required_size_target(true);
    let result = encode_print(&canvas, &options);
    assert!(matches!(
        result,
        Err(CompositionError::SizeTargetUnmet {
            target_kb: 1,
            floor: 20,
            ..
        })
    ));
}

// ── PNG ────────────────────────────────────────────────────────────

#[test]
fn png_is_lossless() {
    let canvas = noisy_canvas(64, 48);
    let print = encode_print(&canvas, &OutputOptions::new(OutputFormat::Png)).unwrap();
    assert_eq!(print.quality, None);

    let decoded = image::load_from_memory(&print.bytes).unwrap().to_rgb8();
    assert_eq!(decoded, canvas);
}

// ── Writing ────────────────────────────────────────────────────────

#[test]
fn write_to_creates_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("print.jpg");
    let print = encode_print(&noisy_canvas(32, 32), &jpeg(80)).unwrap();
    print.write_to(&path).unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), print.bytes);
}

#[test]
fn write_to_missing_directory_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("print.jpg");
    let print = encode_print(&noisy_canvas(8, 8), &jpeg(80)).unwrap();
    assert!(matches!(print.write_to(&path), Err(CompositionError::Io(_))));
}

#[test]
fn format_names_round_trip() {
    assert_eq!(OutputFormat::from_name("jpg"), Some(OutputFormat::Jpeg));
    assert_eq!(OutputFormat::from_name("PNG"), Some(OutputFormat::Png));
    assert_eq!(OutputFormat::Jpeg.name(), "jpeg");
}
