//! JSON sidecar metadata written next to a print.
//!
//! One record per generation: the source, the resolved plan, every frame's
//! timestamp, index and cell, and the layout, styling and encoding used.
//! The `format_version` field changes whenever a field is renamed or
//! removed.

use std::{collections::BTreeMap, fs, path::Path, time::Duration};

use serde_json::{Value, json};

use crate::compose::Styling;
use crate::error::MoviePrintError;
use crate::extraction::FrameRecord;
use crate::layout::{GridShape, Layout, LayoutMode, LayoutSpec};
use crate::output::EncodedPrint;
use crate::planner::{ExtractionMode, ExtractionPlan, IntervalStep, ShotInstantPolicy};
use crate::source::{DynamicRange, TransferFunction, VideoSource};

/// Current sidecar schema version.
pub const SIDECAR_FORMAT_VERSION: u32 = 1;

/// Everything that went into one print.
#[derive(Debug, Clone, Copy)]
pub struct PrintMetadata<'a> {
    /// Input video.
    pub source: &'a VideoSource,
    /// Plan the frames were sampled with.
    pub plan: &'a ExtractionPlan,
    /// Frame records in slot order.
    pub records: &'a [FrameRecord],
    /// Scrubbed slots and their timestamps.
    pub overrides: &'a BTreeMap<usize, Duration>,
    /// Layout parameters.
    pub layout_spec: &'a LayoutSpec,
    /// Computed geometry.
    pub layout: &'a Layout,
    /// Styling parameters.
    pub styling: &'a Styling,
    /// Encoding result, when the print was encoded.
    pub encoded: Option<&'a EncodedPrint>,
}

impl PrintMetadata<'_> {
    /// Build the JSON document.
    pub fn to_json(&self) -> Value {
        let (width, height) = self.source.dimensions();
        let dynamic_range = match self.source.dynamic_range() {
            DynamicRange::Sdr => "sdr",
            DynamicRange::Hdr(TransferFunction::Pq) => "hdr-pq",
            DynamicRange::Hdr(TransferFunction::Hlg) => "hdr-hlg",
        };

        let frames: Vec<Value> = self
            .records
            .iter()
            .map(|record| {
                let cell = self.layout.cell(record.sequence_index);
                json!({
                    "slot": record.sequence_index,
                    "timestamp_seconds": record.source_timestamp.as_secs_f64(),
                    "frame_number": record.frame_number,
                    "scrubbed": self.overrides.contains_key(&record.sequence_index),
                    "width": record.width,
                    "height": record.height,
                    "tone_mapped": record.tone_mapped,
                    "hardware_decoded": record.hardware_decoded,
                    "shot": record.shot.map(|shot| json!({
                        "number": shot.number,
                        "start_seconds": shot.start.as_secs_f64(),
                        "end_seconds": shot.end.as_secs_f64(),
                    })),
                    "cell": cell.map(|cell| json!({
                        "x": cell.x,
                        "y": cell.y,
                        "width": cell.width,
                        "height": cell.height,
                    })),
                    "faces": record.face_boxes.as_ref().map(|faces| {
                        faces
                            .iter()
                            .map(|face| json!([face.x, face.y, face.width, face.height]))
                            .collect::<Vec<_>>()
                    }),
                    "error": record.error(),
                })
            })
            .collect();

        json!({
            "format_version": SIDECAR_FORMAT_VERSION,
            "source": {
                "path": self.source.path().display().to_string(),
                "duration_seconds": self.source.duration().as_secs_f64(),
                "frames_per_second": self.source.frames_per_second(),
                "width": width,
                "height": height,
                "dynamic_range": dynamic_range,
                "codec": self.source.info().codec,
            },
            "plan": plan_json(self.plan),
            "frames": frames,
            "layout": layout_json(self.layout_spec, self.layout),
            "styling": styling_json(self.styling),
            "output": self.encoded.map(|encoded| json!({
                "format": encoded.format.name(),
                "width": encoded.width,
                "height": encoded.height,
                "quality": encoded.quality,
                "size_bytes": encoded.bytes.len(),
                "size_target_met": encoded.size_target_met,
            })),
        })
    }

    /// Write the document as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Serialisation and I/O errors.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<(), MoviePrintError> {
        let text = serde_json::to_string_pretty(&self.to_json())?;
        fs::write(path.as_ref(), text)?;
        log::debug!("Wrote sidecar {}", path.as_ref().display());
        Ok(())
    }
}

fn plan_json(plan: &ExtractionPlan) -> Value {
    let mode = match &plan.mode {
        ExtractionMode::Interval {
            step,
            excluded_frames,
        } => {
            let (seconds, frames) = match step {
                IntervalStep::Seconds(step) => (Some(step.as_secs_f64()), None),
                IntervalStep::Frames(frames) => (None, Some(*frames)),
            };
            json!({
                "type": "interval",
                "interval_seconds": seconds,
                "interval_frames": frames,
                "excluded_frames": excluded_frames,
            })
        }
        ExtractionMode::Shot {
            sensitivity,
            excluded_shots,
            instant_policy,
        } => {
            let policy = match instant_policy {
                ShotInstantPolicy::Start => json!({ "rule": "start" }),
                ShotInstantPolicy::Midpoint => json!({ "rule": "midpoint" }),
                ShotInstantPolicy::MidpointUnlessShort { min_duration } => json!({
                    "rule": "midpoint-unless-short",
                    "min_duration_seconds": min_duration.as_secs_f64(),
                }),
            };
            json!({
                "type": "shot",
                "sensitivity": sensitivity,
                "excluded_shots": excluded_shots,
                "instant_policy": policy,
            })
        }
    };

    json!({
        "mode": mode,
        "start_seconds": plan.start.as_secs_f64(),
        "end_seconds": plan.end.map(|end| end.as_secs_f64()),
        "max_frames": plan.max_frames,
    })
}

fn layout_json(spec: &LayoutSpec, layout: &Layout) -> Value {
    let mode = match spec.mode {
        LayoutMode::Grid {
            shape,
            thumbnail_width,
        } => {
            let (columns, rows) = match shape {
                GridShape::Columns(columns) => (Some(columns), None),
                GridShape::Rows(rows) => (None, Some(rows)),
            };
            json!({
                "type": "grid",
                "columns": columns,
                "rows": rows,
                "thumbnail_width": thumbnail_width,
            })
        }
        LayoutMode::Timeline {
            row_height,
            output_width,
        } => json!({
            "type": "timeline",
            "row_height": row_height,
            "output_width": output_width,
        }),
    };

    json!({
        "mode": mode,
        "padding": spec.padding,
        "margin": spec.margin,
        "fit": spec.fit.map(|size| json!([size.width, size.height])),
        "header_height": spec.header_height,
        "canvas": [layout.width(), layout.height()],
        "scale": layout.scale(),
    })
}

fn styling_json(styling: &Styling) -> Value {
    let hex = |color: image::Rgb<u8>| format!("#{:02x}{:02x}{:02x}", color[0], color[1], color[2]);
    json!({
        "background": hex(styling.background),
        "corner_radius": styling.corner_radius,
        "rotation": styling.rotation.degrees(),
        "overlay": styling.overlay.map(|overlay| json!({
            "content": overlay.content.name(),
            "anchor": overlay.anchor.name(),
            "scale": overlay.scale,
        })),
        "header": styling.header.is_some(),
        "placeholder": hex(styling.placeholder_color),
    })
}
