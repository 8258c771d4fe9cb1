//! Compositor integration tests.

mod common;

use std::sync::Arc;

use common::{close, solid_record};
use image::{DynamicImage, Rgb, RgbImage};
use movieprint::{
    CompositionError, Compositor, FrameImage, GridShape, HeaderInfo, HeaderOptions, Layout,
    LayoutItem, LayoutSpec, OverlayContent, OverlayOptions, Rotation, Styling, compute_layout,
};

const RED: Rgb<u8> = Rgb([200, 20, 20]);
const GREEN: Rgb<u8> = Rgb([20, 200, 20]);
const BLUE: Rgb<u8> = Rgb([20, 20, 200]);

fn grid_for(records: &[movieprint::FrameRecord], styling: &Styling, columns: u32) -> Layout {
    let items: Vec<LayoutItem> = records
        .iter()
        .map(|record| LayoutItem::from_record(record, styling.rotation))
        .collect();
    compute_layout(&LayoutSpec::grid(GridShape::Columns(columns)), &items).unwrap()
}

fn center(layout: &Layout, slot: usize) -> (u32, u32) {
    let cell = layout.cell(slot).unwrap();
    (cell.x + cell.width / 2, cell.y + cell.height / 2)
}

// ── Full render ────────────────────────────────────────────────────

#[test]
fn frames_land_in_their_cells() {
    let records = vec![
        solid_record(0, RED, 64, 36),
        solid_record(1, GREEN, 64, 36),
        solid_record(2, BLUE, 64, 36),
    ];
    let styling = Styling::default();
    let layout = grid_for(&records, &styling, 2);
    let canvas = Compositor::new()
        .render(&layout, &records, &styling, None)
        .unwrap();

    assert_eq!(canvas.dimensions(), (layout.width(), layout.height()));
    for (slot, color) in [RED, GREEN, BLUE].into_iter().enumerate() {
        let (x, y) = center(&layout, slot);
        assert!(close(*canvas.get_pixel(x, y), color), "slot {slot}");
    }
    assert_eq!(*canvas.get_pixel(0, 0), styling.background);
}

#[test]
fn failed_frames_render_as_placeholders() {
    let mut failed = solid_record(1, GREEN, 64, 36);
    failed.image = FrameImage::Failed("corrupt packet".to_string());
    let records = vec![solid_record(0, RED, 64, 36), failed];
    let styling = Styling::default().with_placeholder_color(Rgb([9, 9, 9]));
    let layout = grid_for(&records, &styling, 2);
    let canvas = Compositor::new()
        .render(&layout, &records, &styling, None)
        .unwrap();

    let (x, y) = center(&layout, 1);
    assert_eq!(*canvas.get_pixel(x, y), Rgb([9, 9, 9]));
    assert!(records[1].is_placeholder());
    assert_eq!(records[1].error(), Some("corrupt packet"));
}

#[test]
fn released_pixels_cannot_be_rendered() {
    let mut record = solid_record(0, RED, 64, 36);
    record.release();
    assert!(!record.has_pixels());

    let records = vec![record];
    let styling = Styling::default();
    let layout = grid_for(&records, &styling, 1);
    let result = Compositor::new().render(&layout, &records, &styling, None);
    assert!(matches!(result, Err(CompositionError::FrameLoad { .. })));
}

#[test]
fn cell_count_mismatch_is_rejected() {
    let records = vec![solid_record(0, RED, 64, 36), solid_record(1, GREEN, 64, 36)];
    let styling = Styling::default();
    let layout = grid_for(&records[..1], &styling, 1);
    let result = Compositor::new().render(&layout, &records, &styling, None);
    assert!(matches!(
        result,
        Err(CompositionError::CellCountMismatch {
            cells: 1,
            frames: 2
        })
    ));
}

// ── Incremental render ─────────────────────────────────────────────

#[test]
fn render_cell_only_touches_its_rectangle() {
    let records = vec![
        solid_record(0, RED, 64, 36),
        solid_record(1, GREEN, 64, 36),
        solid_record(2, BLUE, 64, 36),
        solid_record(3, RED, 64, 36),
    ];
    let styling = Styling::default()
        .with_corner_radius(6)
        .with_overlay(OverlayOptions::new(OverlayContent::FrameNumber));
    let layout = grid_for(&records, &styling, 2);
    let compositor = Compositor::new();
    let before = compositor
        .render(&layout, &records, &styling, None)
        .unwrap();

    let mut after = before.clone();
    let replacement = solid_record(2, GREEN, 64, 36);
    compositor
        .render_cell(&mut after, &layout, 2, &replacement, &styling)
        .unwrap();

    let cell = *layout.cell(2).unwrap();
    let mut changed = 0;
    for (x, y, pixel) in after.enumerate_pixels() {
        if cell.contains(x, y) {
            changed += usize::from(pixel != before.get_pixel(x, y));
        } else {
            assert_eq!(pixel, before.get_pixel(x, y), "pixel ({x}, {y}) outside the cell");
        }
    }
    assert!(changed > 0);
    let (x, y) = center(&layout, 2);
    assert!(close(*after.get_pixel(x, y), GREEN));
}

#[test]
fn render_cell_rejects_unknown_slot() {
    let records = vec![solid_record(0, RED, 64, 36)];
    let styling = Styling::default();
    let layout = grid_for(&records, &styling, 1);
    let mut canvas = RgbImage::new(layout.width(), layout.height());
    let result = Compositor::new().render_cell(&mut canvas, &layout, 3, &records[0], &styling);
    assert!(matches!(result, Err(CompositionError::CellOutOfRange(3))));
}

// ── Styling ────────────────────────────────────────────────────────

#[test]
fn overlay_box_sits_in_the_anchor_corner() {
    let records = vec![solid_record(0, RED, 160, 90)];
    let overlay = OverlayOptions::new(OverlayContent::Timecode)
        .with_colors(Rgb([255, 255, 255]), Rgb([0, 0, 0]))
        .with_scale(2);
    let styling = Styling::default().with_overlay(overlay);
    let layout = grid_for(&records, &styling, 1);
    let canvas = Compositor::new()
        .render(&layout, &records, &styling, None)
        .unwrap();

    let cell = layout.cell(0).unwrap();
    let right = cell.x + cell.width;
    let bottom = cell.y + cell.height;
    // Inset by 2×scale, then the box's own padding.
    assert_eq!(*canvas.get_pixel(right - 5, bottom - 5), Rgb([0, 0, 0]));
    assert!(close(*canvas.get_pixel(right - 2, bottom - 2), RED));
    assert!(close(*canvas.get_pixel(cell.x + 2, cell.y + 2), RED));
}

#[test]
fn rotation_turns_the_frame() {
    // Left half red, right half blue.
    let image = RgbImage::from_fn(40, 20, |x, _| if x < 20 { RED } else { BLUE });
    let mut record = solid_record(0, RED, 40, 20);
    record.image = FrameImage::Memory(Arc::new(DynamicImage::ImageRgb8(image)));
    let records = vec![record];

    let styling = Styling::default().with_rotation(Rotation::Clockwise90);
    let layout = grid_for(&records, &styling, 1);
    let cell = *layout.cell(0).unwrap();
    assert_eq!((cell.width, cell.height), (20, 40));

    let canvas = Compositor::new()
        .render(&layout, &records, &styling, None)
        .unwrap();
    assert!(close(*canvas.get_pixel(cell.x + 10, cell.y + 5), RED));
    assert!(close(*canvas.get_pixel(cell.x + 10, cell.y + 35), BLUE));
}

#[test]
fn rounded_corners_blend_into_background() {
    let records = vec![solid_record(0, RED, 64, 36)];
    let styling = Styling::default().with_corner_radius(8);
    let layout = grid_for(&records, &styling, 1);
    let canvas = Compositor::new()
        .render(&layout, &records, &styling, None)
        .unwrap();

    let cell = layout.cell(0).unwrap();
    assert_eq!(*canvas.get_pixel(cell.x, cell.y), styling.background);
    let (x, y) = center(&layout, 0);
    assert!(close(*canvas.get_pixel(x, y), RED));
}

#[test]
fn header_band_is_painted() {
    let records = vec![solid_record(0, RED, 64, 36)];
    let header = HeaderOptions::default();
    let styling = Styling::default().with_header(header);
    let items = vec![LayoutItem::from_record(&records[0], Rotation::None)];
    let spec = styling.reserve_header(LayoutSpec::grid(GridShape::Columns(1)));
    let layout = compute_layout(&spec, &items).unwrap();

    let info = HeaderInfo {
        file_name: "clip.mp4".to_string(),
        duration: std::time::Duration::from_secs(90),
        frames_per_second: 24.0,
        width: 64,
        height: 36,
        hdr: true,
    };
    let canvas = Compositor::new()
        .render(&layout, &records, &styling, Some(&info))
        .unwrap();

    let band = layout.header().unwrap();
    assert_eq!(*canvas.get_pixel(0, 0), header.background);
    let text_pixels = (0..band.width)
        .flat_map(|x| (0..band.height).map(move |y| (x, y)))
        .filter(|&(x, y)| *canvas.get_pixel(x, y) == header.text_color)
        .count();
    assert!(text_pixels > 0);
}
