//! The Layout Engine.
//!
//! [`compute_layout`] is a pure function from a [`LayoutSpec`] and the
//! per-slot frame sizes (plus shot durations for timelines) to a canvas
//! size and one [`CellGeometry`] per slot. It never looks at pixels, so
//! geometry can be computed and validated before anything is decoded.
//!
//! All fractional geometry is rounded half-to-even, so the same inputs
//! always land on the same pixels.

use std::time::Duration;

use crate::compose::Rotation;
use crate::conversion::round_pixel;
use crate::error::LayoutError;
use crate::extraction::FrameRecord;

/// How grid columns are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GridShape {
    /// Fixed number of columns.
    Columns(u32),
    /// Fixed number of rows; columns become `ceil(n / rows)`.
    Rows(u32),
}

/// Arrangement of the cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayoutMode {
    /// Uniform-width cells in rows.
    Grid {
        /// Columns or rows.
        shape: GridShape,
        /// Cell width before any fit scaling.
        thumbnail_width: Option<u32>,
    },
    /// Rows of fixed height whose cell widths follow shot durations.
    Timeline {
        /// Height of every row.
        row_height: u32,
        /// Width of the whole canvas.
        output_width: u32,
    },
}

/// Exact output dimensions for fit-to-output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputSize {
    /// Canvas width in pixels.
    pub width: u32,
    /// Canvas height in pixels.
    pub height: u32,
}

/// Geometry parameters. Immutable; replace it to change the layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[must_use]
pub struct LayoutSpec {
    /// Grid or timeline.
    pub mode: LayoutMode,
    /// Gap between cells, also added inside the outer margin.
    pub padding: u32,
    /// Extra outer border.
    pub margin: u32,
    /// Force the canvas to exactly this size.
    pub fit: Option<OutputSize>,
    /// Height of the band reserved for the header bar at the top.
    pub header_height: u32,
}

impl LayoutSpec {
    /// Grid layout with 5 px padding and no margin.
    pub fn grid(shape: GridShape) -> Self {
        Self {
            mode: LayoutMode::Grid {
                shape,
                thumbnail_width: None,
            },
            padding: 5,
            margin: 0,
            fit: None,
            header_height: 0,
        }
    }

    /// Timeline layout with 5 px padding and no margin.
    pub fn timeline(row_height: u32, output_width: u32) -> Self {
        Self {
            mode: LayoutMode::Timeline {
                row_height,
                output_width,
            },
            padding: 5,
            margin: 0,
            fit: None,
            header_height: 0,
        }
    }

    /// Set the gap between cells.
    pub fn with_padding(mut self, padding: u32) -> Self {
        self.padding = padding;
        self
    }

    /// Set the outer margin.
    pub fn with_margin(mut self, margin: u32) -> Self {
        self.margin = margin;
        self
    }

    /// Force the canvas to `width × height`.
    pub fn with_fit(mut self, width: u32, height: u32) -> Self {
        self.fit = Some(OutputSize { width, height });
        self
    }

    /// Set the grid cell width (grid mode only).
    pub fn with_thumbnail_width(mut self, width: u32) -> Self {
        if let LayoutMode::Grid {
            thumbnail_width, ..
        } = &mut self.mode
        {
            *thumbnail_width = (width > 0).then_some(width);
        }
        self
    }

    /// Reserve a header band.
    pub fn with_header_height(mut self, height: u32) -> Self {
        self.header_height = height;
        self
    }

    /// Whether the layout needs shot durations.
    pub fn is_timeline(&self) -> bool {
        matches!(self.mode, LayoutMode::Timeline { .. })
    }

    fn border(&self) -> f64 {
        (self.margin + self.padding) as f64
    }
}

/// What the layout needs to know about one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutItem {
    /// Width as placed (after rotation).
    pub width: u32,
    /// Height as placed (after rotation).
    pub height: u32,
    /// Shot duration, for timelines.
    pub duration: Option<Duration>,
}

impl LayoutItem {
    /// An item of the given placed size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            duration: None,
        }
    }

    /// Attach a shot duration.
    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Item for a record as it will be drawn with `rotation`.
    pub fn from_record(record: &FrameRecord, rotation: Rotation) -> Self {
        let (width, height) = rotation.rotated_size(record.width, record.height);
        Self {
            width: width.max(1),
            height: height.max(1),
            duration: record.shot.map(|shot| shot.duration()),
        }
    }

    fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

/// One cell's placement on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CellGeometry {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl CellGeometry {
    /// Whether `(x, y)` lies inside the cell.
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }
}

/// Computed geometry for one print.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    width: u32,
    height: u32,
    cells: Vec<CellGeometry>,
    header: Option<CellGeometry>,
    scale: f64,
}

impl Layout {
    /// Canvas width.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Canvas height.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Cells in slot order.
    pub fn cells(&self) -> &[CellGeometry] {
        &self.cells
    }

    /// Geometry of one slot.
    pub fn cell(&self, slot: usize) -> Option<&CellGeometry> {
        self.cells.get(slot)
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether there are no cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// The header band, when one is reserved.
    pub fn header(&self) -> Option<&CellGeometry> {
        self.header.as_ref()
    }

    /// Scale applied by fit-to-output (1.0 otherwise).
    pub fn scale(&self) -> f64 {
        self.scale
    }
}

/// Cell rectangle before rounding, relative to the content origin.
#[derive(Debug, Clone, Copy)]
struct Rect {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

/// Content before fitting: cells plus the content size.
struct NaturalLayout {
    cells: Vec<Rect>,
    width: f64,
    height: f64,
}

/// Compute cell geometry and canvas size.
///
/// # Errors
///
/// [`LayoutError::NoCells`] for an empty item list,
/// [`LayoutError::InvalidGrid`] for zero rows or columns,
/// [`LayoutError::MissingShotDurations`] when a timeline item lacks a
/// duration, [`LayoutError::InvalidOutputSize`] for zero sizes and
/// [`LayoutError::RowTooNarrow`] when padding leaves no room in a timeline
/// row.
pub fn compute_layout(spec: &LayoutSpec, items: &[LayoutItem]) -> Result<Layout, LayoutError> {
    if items.is_empty() {
        return Err(LayoutError::NoCells);
    }

    let natural = match spec.mode {
        LayoutMode::Grid {
            shape,
            thumbnail_width,
        } => grid_layout(spec, shape, thumbnail_width, items)?,
        LayoutMode::Timeline {
            row_height,
            output_width,
        } => timeline_layout(spec, row_height, output_width, items)?,
    };

    let layout = match spec.fit {
        Some(size) => fit_layout(spec, &natural, size)?,
        None => place_natural(spec, &natural),
    };
    log::debug!(
        "Layout: {} cells on {}x{} canvas (scale {:.3})",
        layout.cells.len(),
        layout.width,
        layout.height,
        layout.scale
    );
    Ok(layout)
}

fn grid_layout(
    spec: &LayoutSpec,
    shape: GridShape,
    thumbnail_width: Option<u32>,
    items: &[LayoutItem],
) -> Result<NaturalLayout, LayoutError> {
    let count = items.len();
    let columns = match shape {
        GridShape::Columns(0) | GridShape::Rows(0) => return Err(LayoutError::InvalidGrid),
        GridShape::Columns(columns) => (columns as usize).min(count),
        GridShape::Rows(rows) => count.div_ceil(rows as usize),
    };

    let border = spec.border();
    let padding = spec.padding as f64;

    let cell_width = match (thumbnail_width, spec.fit) {
        (Some(width), _) => width as f64,
        (None, Some(size)) => {
            let available = size.width as f64 - 2.0 * border - (columns - 1) as f64 * padding;
            (available / columns as f64).floor().max(1.0)
        }
        (None, None) => items
            .iter()
            .map(|item| item.width)
            .max()
            .unwrap_or(1) as f64,
    };

    let mut cells = Vec::with_capacity(count);
    let mut y = border;
    for row in items.chunks(columns) {
        let heights: Vec<f64> = row
            .iter()
            .map(|item| (cell_width / item.aspect_ratio()).round().max(1.0))
            .collect();
        let row_height = heights.iter().copied().fold(0.0, f64::max);

        for (column, height) in heights.iter().enumerate() {
            cells.push(Rect {
                x: border + column as f64 * (cell_width + padding),
                y: y + ((row_height - height) / 2.0).floor(),
                width: cell_width,
                height: *height,
            });
        }
        y += row_height + padding;
    }

    Ok(NaturalLayout {
        cells,
        width: 2.0 * border + columns as f64 * cell_width + (columns - 1) as f64 * padding,
        height: y - padding + border,
    })
}

fn timeline_layout(
    spec: &LayoutSpec,
    row_height: u32,
    output_width: u32,
    items: &[LayoutItem],
) -> Result<NaturalLayout, LayoutError> {
    if row_height == 0 || output_width == 0 {
        return Err(LayoutError::InvalidOutputSize {
            width: output_width,
            height: row_height,
        });
    }

    let durations = items
        .iter()
        .enumerate()
        .map(|(slot, item)| {
            item.duration
                .filter(|duration| !duration.is_zero())
                .map(|duration| duration.as_secs_f64())
                .ok_or(LayoutError::MissingShotDurations { slot })
        })
        .collect::<Result<Vec<f64>, LayoutError>>()?;

    let border = spec.border();
    let padding = spec.padding as f64;
    let row_height_f = row_height as f64;
    let output_width_f = output_width as f64;

    // Wrap where natural widths at row height would overflow.
    let mut rows: Vec<Vec<usize>> = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    let mut natural_sum = 0.0;
    for (slot, item) in items.iter().enumerate() {
        let natural = row_height_f * item.aspect_ratio();
        let needed =
            2.0 * border + natural_sum + natural + current.len() as f64 * padding;
        if !current.is_empty() && needed > output_width_f {
            rows.push(std::mem::take(&mut current));
            natural_sum = 0.0;
        }
        current.push(slot);
        natural_sum += natural;
    }
    if !current.is_empty() {
        rows.push(current);
    }

    let mut cells = Vec::with_capacity(items.len());
    let mut y = border;
    for row in &rows {
        let gaps = (row.len() - 1) as f64 * padding;
        let available = output_width_f - 2.0 * border - gaps;
        if available < row.len() as f64 {
            return Err(LayoutError::RowTooNarrow { slot: row[0] });
        }
        let weights: Vec<f64> = row.iter().map(|&slot| durations[slot]).collect();
        let widths = split_proportionally(available as u64, &weights);

        let mut x = border;
        for width in widths {
            cells.push(Rect {
                x,
                y,
                width: width as f64,
                height: row_height_f,
            });
            x += width as f64 + padding;
        }
        y += row_height_f + padding;
    }

    Ok(NaturalLayout {
        cells,
        width: output_width_f,
        height: y - padding + border,
    })
}

/// Largest-remainder split of `total` by `weights`; parts sum to `total`
/// and each is at least 1.
fn split_proportionally(total: u64, weights: &[f64]) -> Vec<u64> {
    let count = weights.len() as u64;
    let sum: f64 = weights.iter().sum();
    // Reserve one pixel per part so nothing collapses to zero width.
    let distributable = total.saturating_sub(count);
    let exact: Vec<f64> = weights
        .iter()
        .map(|weight| distributable as f64 * weight / sum)
        .collect();
    let mut parts: Vec<u64> = exact.iter().map(|value| value.floor() as u64).collect();

    let assigned: u64 = parts.iter().sum();
    let mut order: Vec<usize> = (0..parts.len()).collect();
    order.sort_by(|&a, &b| {
        let remainder_a = exact[a] - exact[a].floor();
        let remainder_b = exact[b] - exact[b].floor();
        remainder_b.total_cmp(&remainder_a).then(a.cmp(&b))
    });
    for &index in order
        .iter()
        .cycle()
        .take(distributable.saturating_sub(assigned) as usize)
    {
        parts[index] += 1;
    }

    parts.iter().map(|part| part + 1).collect()
}

fn place_natural(spec: &LayoutSpec, natural: &NaturalLayout) -> Layout {
    let offset = spec.header_height as f64;
    let width = round_pixel(natural.width).max(1);
    let height = round_pixel(natural.height + offset).max(1);
    let cells = natural
        .cells
        .iter()
        .map(|rect| CellGeometry {
            x: round_pixel(rect.x),
            y: round_pixel(rect.y + offset),
            width: round_pixel(rect.width).max(1),
            height: round_pixel(rect.height).max(1),
        })
        .collect();
    Layout {
        width,
        height,
        cells,
        header: header_band(spec, width),
        scale: 1.0,
    }
}

fn fit_layout(
    spec: &LayoutSpec,
    natural: &NaturalLayout,
    size: OutputSize,
) -> Result<Layout, LayoutError> {
    if size.width == 0 || size.height <= spec.header_height {
        return Err(LayoutError::InvalidOutputSize {
            width: size.width,
            height: size.height,
        });
    }

    let area_width = size.width as f64;
    let area_height = (size.height - spec.header_height) as f64;
    let scale = (area_width / natural.width).min(area_height / natural.height);

    // Centre the scaled content; the slack becomes extra outer padding.
    let offset_x = (area_width - natural.width * scale) / 2.0;
    let offset_y = spec.header_height as f64 + (area_height - natural.height * scale) / 2.0;

    let cells = natural
        .cells
        .iter()
        .map(|rect| {
            let left = round_pixel(offset_x + rect.x * scale);
            let top = round_pixel(offset_y + rect.y * scale);
            let right = round_pixel(offset_x + (rect.x + rect.width) * scale);
            let bottom = round_pixel(offset_y + (rect.y + rect.height) * scale);
            CellGeometry {
                x: left.min(size.width - 1),
                y: top.min(size.height - 1),
                width: right.saturating_sub(left).max(1),
                height: bottom.saturating_sub(top).max(1),
            }
        })
        .collect();

    Ok(Layout {
        width: size.width,
        height: size.height,
        cells,
        header: header_band(spec, size.width),
        scale,
    })
}

fn header_band(spec: &LayoutSpec, width: u32) -> Option<CellGeometry> {
    (spec.header_height > 0).then_some(CellGeometry {
        x: 0,
        y: 0,
        width,
        height: spec.header_height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proportional_split_sums_exactly() {
        let parts = split_proportionally(100, &[1.0, 1.0, 1.0]);
        assert_eq!(parts.iter().sum::<u64>(), 100);
        assert_eq!(parts, vec![34, 33, 33]);

        let parts = split_proportionally(7, &[10.0, 0.001]);
        assert_eq!(parts.iter().sum::<u64>(), 7);
        assert!(parts[1] >= 1);
    }

    #[test]
    fn cell_contains_is_half_open() {
        let cell = CellGeometry {
            x: 10,
            y: 10,
            width: 5,
            height: 5,
        };
        assert!(cell.contains(10, 14));
        assert!(!cell.contains(15, 10));
    }
}
