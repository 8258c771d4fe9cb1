//! The Composition Engine.
//!
//! [`Compositor`] paints frame records into the geometry computed by the
//! layout engine. Drawing order is fixed: background, then every cell in
//! slot order (rotate, resize, round corners, overlay), then the header.
//! Each cell only ever writes inside its own rectangle, which is what makes
//! single-cell re-rendering after a scrub leave every other pixel intact.

use std::time::Duration;

use image::{
    Rgb, RgbImage,
    imageops::{self, FilterType},
};

use crate::conversion::format_timecode;
use crate::error::CompositionError;
use crate::extraction::FrameRecord;
use crate::glyphs::{draw_text, text_height, text_width};
use crate::layout::{CellGeometry, Layout, LayoutSpec};
use crate::source::VideoSource;

/// Clockwise rotation applied to every thumbnail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rotation {
    /// No rotation.
    #[default]
    None,
    /// 90° clockwise.
    Clockwise90,
    /// 180°.
    Clockwise180,
    /// 270° clockwise.
    Clockwise270,
}

impl Rotation {
    /// Parse 0, 90, 180 or 270.
    pub fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees {
            0 => Some(Rotation::None),
            90 => Some(Rotation::Clockwise90),
            180 => Some(Rotation::Clockwise180),
            270 => Some(Rotation::Clockwise270),
            _ => None,
        }
    }

    /// Rotation in degrees.
    pub fn degrees(self) -> u32 {
        match self {
            Rotation::None => 0,
            Rotation::Clockwise90 => 90,
            Rotation::Clockwise180 => 180,
            Rotation::Clockwise270 => 270,
        }
    }

    /// Size of a `width × height` frame after rotation.
    pub fn rotated_size(self, width: u32, height: u32) -> (u32, u32) {
        match self {
            Rotation::Clockwise90 | Rotation::Clockwise270 => (height, width),
            Rotation::None | Rotation::Clockwise180 => (width, height),
        }
    }

    fn apply(self, image: RgbImage) -> RgbImage {
        match self {
            Rotation::None => image,
            Rotation::Clockwise90 => imageops::rotate90(&image),
            Rotation::Clockwise180 => imageops::rotate180(&image),
            Rotation::Clockwise270 => imageops::rotate270(&image),
        }
    }
}

/// Corner of a cell that holds the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OverlayAnchor {
    /// Top-left corner.
    TopLeft,
    /// Top-right corner.
    TopRight,
    /// Bottom-left corner.
    BottomLeft,
    /// Bottom-right corner.
    #[default]
    BottomRight,
}

impl OverlayAnchor {
    /// Parse `top-left`, `top-right`, `bottom-left` or `bottom-right`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "top-left" => Some(OverlayAnchor::TopLeft),
            "top-right" => Some(OverlayAnchor::TopRight),
            "bottom-left" => Some(OverlayAnchor::BottomLeft),
            "bottom-right" => Some(OverlayAnchor::BottomRight),
            _ => None,
        }
    }

    /// Name as accepted by [`from_name`](Self::from_name).
    pub fn name(self) -> &'static str {
        match self {
            OverlayAnchor::TopLeft => "top-left",
            OverlayAnchor::TopRight => "top-right",
            OverlayAnchor::BottomLeft => "bottom-left",
            OverlayAnchor::BottomRight => "bottom-right",
        }
    }
}

/// What the per-cell overlay shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OverlayContent {
    /// `HH:MM:SS.mmm` of the sampled instant.
    #[default]
    Timecode,
    /// Source frame number.
    FrameNumber,
}

impl OverlayContent {
    /// Lowercase name, as used in sidecar metadata.
    pub fn name(self) -> &'static str {
        match self {
            OverlayContent::Timecode => "timecode",
            OverlayContent::FrameNumber => "frame",
        }
    }
}

/// Per-cell overlay text settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct OverlayOptions {
    /// Timecode or frame number.
    pub content: OverlayContent,
    /// Corner of the cell.
    pub anchor: OverlayAnchor,
    /// Text colour.
    pub text_color: Rgb<u8>,
    /// Colour of the box behind the text.
    pub box_color: Rgb<u8>,
    /// Integer glyph scale.
    pub scale: u32,
}

impl Default for OverlayOptions {
    fn default() -> Self {
        Self {
            content: OverlayContent::Timecode,
            anchor: OverlayAnchor::BottomRight,
            text_color: Rgb([255, 255, 255]),
            box_color: Rgb([0, 0, 0]),
            scale: 2,
        }
    }
}

impl OverlayOptions {
    /// Default overlay showing `content`.
    pub fn new(content: OverlayContent) -> Self {
        Self {
            content,
            ..Self::default()
        }
    }

    /// Place the overlay in `anchor`.
    pub fn with_anchor(mut self, anchor: OverlayAnchor) -> Self {
        self.anchor = anchor;
        self
    }

    /// Set text and box colours.
    pub fn with_colors(mut self, text: Rgb<u8>, background: Rgb<u8>) -> Self {
        self.text_color = text;
        self.box_color = background;
        self
    }

    /// Set the glyph scale (at least 1).
    pub fn with_scale(mut self, scale: u32) -> Self {
        self.scale = scale.max(1);
        self
    }
}

/// Header bar settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct HeaderOptions {
    /// Text colour.
    pub text_color: Rgb<u8>,
    /// Bar colour.
    pub background: Rgb<u8>,
    /// Integer glyph scale.
    pub scale: u32,
}

impl Default for HeaderOptions {
    fn default() -> Self {
        Self {
            text_color: Rgb([230, 230, 230]),
            background: Rgb([20, 20, 20]),
            scale: 2,
        }
    }
}

impl HeaderOptions {
    /// Height of the band the header needs.
    pub fn band_height(&self) -> u32 {
        text_height(self.scale.max(1)) + 4 * self.scale.max(1)
    }
}

/// Source summary printed in the header bar.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderInfo {
    /// File name.
    pub file_name: String,
    /// Source duration.
    pub duration: Duration,
    /// Frames per second.
    pub frames_per_second: f64,
    /// Native width.
    pub width: u32,
    /// Native height.
    pub height: u32,
    /// Whether the source is HDR.
    pub hdr: bool,
}

impl HeaderInfo {
    /// Summarise `source`.
    pub fn from_source(source: &VideoSource) -> Self {
        let (width, height) = source.dimensions();
        Self {
            file_name: source.display_name(),
            duration: source.duration(),
            frames_per_second: source.frames_per_second(),
            width,
            height,
            hdr: source.dynamic_range().is_hdr(),
        }
    }

    fn text(&self) -> String {
        let mut text = format!(
            "{} | {} | {:.3} FPS | {}x{}",
            self.file_name,
            format_timecode(self.duration),
            self.frames_per_second,
            self.width,
            self.height
        );
        if self.hdr {
            text.push_str(" | HDR");
        }
        text
    }
}

/// Visual parameters of the print.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct Styling {
    /// Canvas background.
    pub background: Rgb<u8>,
    /// Corner radius in pixels; 0 disables rounding.
    pub corner_radius: u32,
    /// Rotation applied to every thumbnail.
    pub rotation: Rotation,
    /// Per-cell overlay.
    pub overlay: Option<OverlayOptions>,
    /// Header bar.
    pub header: Option<HeaderOptions>,
    /// Fill colour of cells whose frame failed to decode.
    pub placeholder_color: Rgb<u8>,
}

impl Default for Styling {
    fn default() -> Self {
        Self {
            background: Rgb([255, 255, 255]),
            corner_radius: 0,
            rotation: Rotation::None,
            overlay: None,
            header: None,
            placeholder_color: Rgb([64, 64, 64]),
        }
    }
}

impl Styling {
    /// Default styling.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the background colour.
    pub fn with_background(mut self, color: Rgb<u8>) -> Self {
        self.background = color;
        self
    }

    /// Set the corner radius.
    pub fn with_corner_radius(mut self, radius: u32) -> Self {
        self.corner_radius = radius;
        self
    }

    /// Set the thumbnail rotation.
    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    /// Enable the per-cell overlay.
    pub fn with_overlay(mut self, overlay: OverlayOptions) -> Self {
        self.overlay = Some(overlay);
        self
    }

    /// Enable the header bar.
    pub fn with_header(mut self, header: HeaderOptions) -> Self {
        self.header = Some(header);
        self
    }

    /// Set the placeholder colour.
    pub fn with_placeholder_color(mut self, color: Rgb<u8>) -> Self {
        self.placeholder_color = color;
        self
    }

    /// `spec` with a header band tall enough for this styling's header.
    pub fn reserve_header(&self, spec: LayoutSpec) -> LayoutSpec {
        match self.header {
            Some(header) if spec.header_height < header.band_height() => {
                spec.with_header_height(header.band_height())
            }
            _ => spec,
        }
    }
}

/// Renders prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Compositor {
    filter: FilterType,
}

impl Default for Compositor {
    fn default() -> Self {
        Self {
            filter: FilterType::Triangle,
        }
    }
}

impl Compositor {
    /// Compositor using bilinear resampling.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different resampling filter.
    #[must_use]
    pub fn with_filter(mut self, filter: FilterType) -> Self {
        self.filter = filter;
        self
    }

    /// Render the whole print.
    ///
    /// `records[i]` is drawn into `layout.cells()[i]`.
    ///
    /// # Errors
    ///
    /// [`CompositionError::CellCountMismatch`] when the lengths differ and
    /// [`CompositionError::FrameLoad`] when pixels cannot be loaded.
    pub fn render(
        &self,
        layout: &Layout,
        records: &[FrameRecord],
        styling: &Styling,
        header: Option<&HeaderInfo>,
    ) -> Result<RgbImage, CompositionError> {
        if layout.len() != records.len() {
            return Err(CompositionError::CellCountMismatch {
                cells: layout.len(),
                frames: records.len(),
            });
        }
        log::debug!(
            "Rendering {} cells onto {}x{} canvas",
            records.len(),
            layout.width(),
            layout.height()
        );

        let mut canvas = RgbImage::from_pixel(layout.width(), layout.height(), styling.background);
        for (cell, record) in layout.cells().iter().zip(records) {
            self.draw_cell(&mut canvas, cell, record, styling)?;
        }

        if let (Some(band), Some(options), Some(info)) = (layout.header(), styling.header, header)
        {
            draw_header(&mut canvas, band, &options, info);
        }
        Ok(canvas)
    }

    /// Re-render one cell of an existing canvas in place.
    ///
    /// Only pixels inside the cell's rectangle change.
    ///
    /// # Errors
    ///
    /// [`CompositionError::CellOutOfRange`] for an unknown slot, plus the
    /// errors of [`render`](Self::render).
    pub fn render_cell(
        &self,
        canvas: &mut RgbImage,
        layout: &Layout,
        slot: usize,
        record: &FrameRecord,
        styling: &Styling,
    ) -> Result<(), CompositionError> {
        let cell = layout
            .cell(slot)
            .ok_or(CompositionError::CellOutOfRange(slot))?;
        fill_rect(canvas, cell, styling.background);
        self.draw_cell(canvas, cell, record, styling)
    }

    fn draw_cell(
        &self,
        canvas: &mut RgbImage,
        cell: &CellGeometry,
        record: &FrameRecord,
        styling: &Styling,
    ) -> Result<(), CompositionError> {
        match record.load_image()? {
            Some(image) => {
                let rotated = styling.rotation.apply(image.to_rgb8());
                let thumbnail = imageops::resize(&rotated, cell.width, cell.height, self.filter);
                let radius = styling
                    .corner_radius
                    .min(cell.width / 2)
                    .min(cell.height / 2);
                blit_rounded(canvas, cell, &thumbnail, radius, styling.background);
            }
            None => fill_rect(canvas, cell, styling.placeholder_color),
        }

        if let Some(overlay) = &styling.overlay {
            let text = match overlay.content {
                OverlayContent::Timecode => format_timecode(record.source_timestamp),
                OverlayContent::FrameNumber => record.frame_number.to_string(),
            };
            draw_overlay(canvas, cell, &text, overlay);
        }
        Ok(())
    }
}

/// Fill `rect` clipped to the canvas.
fn fill_rect(canvas: &mut RgbImage, rect: &CellGeometry, color: Rgb<u8>) {
    let right = (rect.x + rect.width).min(canvas.width());
    let bottom = (rect.y + rect.height).min(canvas.height());
    for y in rect.y..bottom {
        for x in rect.x..right {
            canvas.put_pixel(x, y, color);
        }
    }
}

/// Copy `thumbnail` into `cell`, blending rounded corners into `background`.
fn blit_rounded(
    canvas: &mut RgbImage,
    cell: &CellGeometry,
    thumbnail: &RgbImage,
    radius: u32,
    background: Rgb<u8>,
) {
    let width = thumbnail.width().min(cell.width);
    let height = thumbnail.height().min(cell.height);
    for local_y in 0..height {
        let y = cell.y + local_y;
        if y >= canvas.height() {
            break;
        }
        for local_x in 0..width {
            let x = cell.x + local_x;
            if x >= canvas.width() {
                break;
            }
            let pixel = *thumbnail.get_pixel(local_x, local_y);
            let coverage = corner_coverage(local_x, local_y, width, height, radius);
            let value = if coverage >= 1.0 {
                pixel
            } else {
                blend(background, pixel, coverage)
            };
            canvas.put_pixel(x, y, value);
        }
    }
}

/// Fraction of the pixel at `(x, y)` inside a rounded rectangle.
fn corner_coverage(x: u32, y: u32, width: u32, height: u32, radius: u32) -> f32 {
    if radius == 0 {
        return 1.0;
    }
    let radius_f = radius as f32;
    let center_x = if x < radius {
        radius_f
    } else if x >= width - radius {
        (width - radius) as f32
    } else {
        return 1.0;
    };
    let center_y = if y < radius {
        radius_f
    } else if y >= height - radius {
        (height - radius) as f32
    } else {
        return 1.0;
    };

    let delta_x = x as f32 + 0.5 - center_x;
    let delta_y = y as f32 + 0.5 - center_y;
    let distance = (delta_x * delta_x + delta_y * delta_y).sqrt();
    (radius_f - distance + 0.5).clamp(0.0, 1.0)
}

fn blend(under: Rgb<u8>, over: Rgb<u8>, alpha: f32) -> Rgb<u8> {
    let mix = |a: u8, b: u8| (a as f32 * (1.0 - alpha) + b as f32 * alpha).round() as u8;
    Rgb([
        mix(under[0], over[0]),
        mix(under[1], over[1]),
        mix(under[2], over[2]),
    ])
}

fn draw_overlay(canvas: &mut RgbImage, cell: &CellGeometry, text: &str, overlay: &OverlayOptions) {
    let scale = overlay.scale.max(1);
    let pad = 2 * scale;
    let box_width = text_width(text, scale) + 2 * pad;
    let box_height = text_height(scale) + 2 * pad;
    let inset = pad as i64;

    let cell_right = (cell.x + cell.width) as i64;
    let cell_bottom = (cell.y + cell.height) as i64;
    let box_x = match overlay.anchor {
        OverlayAnchor::TopLeft | OverlayAnchor::BottomLeft => cell.x as i64 + inset,
        OverlayAnchor::TopRight | OverlayAnchor::BottomRight => {
            cell_right - inset - box_width as i64
        }
    };
    let box_y = match overlay.anchor {
        OverlayAnchor::TopLeft | OverlayAnchor::TopRight => cell.y as i64 + inset,
        OverlayAnchor::BottomLeft | OverlayAnchor::BottomRight => {
            cell_bottom - inset - box_height as i64
        }
    };

    // Clip the box to the cell.
    let left = box_x.max(cell.x as i64);
    let top = box_y.max(cell.y as i64);
    let right = (box_x + box_width as i64).min(cell_right);
    let bottom = (box_y + box_height as i64).min(cell_bottom);
    if right > left && bottom > top {
        fill_rect(
            canvas,
            &CellGeometry {
                x: left as u32,
                y: top as u32,
                width: (right - left) as u32,
                height: (bottom - top) as u32,
            },
            overlay.box_color,
        );
    }

    draw_text(
        canvas,
        box_x + pad as i64,
        box_y + pad as i64,
        text,
        scale,
        overlay.text_color,
        cell,
    );
}

fn draw_header(canvas: &mut RgbImage, band: &CellGeometry, options: &HeaderOptions, info: &HeaderInfo) {
    fill_rect(canvas, band, options.background);
    let scale = options.scale.max(1);
    let text_y = band.y as i64 + (band.height.saturating_sub(text_height(scale)) / 2) as i64;
    draw_text(
        canvas,
        band.x as i64 + 2 * scale as i64,
        text_y,
        &info.text(),
        scale,
        options.text_color,
        band,
    );
}
