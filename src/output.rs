//! Encoding the finished canvas, with optional file-size targeting.
//!
//! When a maximum size is set and the first encoding is too large, JPEG
//! quality is lowered in fixed steps until the target is met or the floor
//! is reached. PNG is lossless, so it gets one retry at best compression.
//! Pixel dimensions never change.

use std::{
    fs,
    io::Cursor,
    path::{Path, PathBuf},
};

use image::{
    ExtendedColorType, ImageEncoder, RgbImage,
    codecs::{
        jpeg::JpegEncoder,
        png::{CompressionType, FilterType as PngFilterType, PngEncoder},
    },
};

use crate::error::CompositionError;

/// Default JPEG quality for the first attempt.
pub const DEFAULT_QUALITY: u8 = 95;
/// Lowest JPEG quality size fitting will use.
pub const DEFAULT_QUALITY_FLOOR: u8 = 20;
/// Quality decrement between size-fitting attempts.
pub const DEFAULT_QUALITY_STEP: u8 = 5;

/// Output image format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OutputFormat {
    /// Lossy JPEG.
    #[default]
    Jpeg,
    /// Lossless PNG.
    Png,
}

impl OutputFormat {
    /// Guess the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?;
        Self::from_name(extension)
    }

    /// Parse `jpg`, `jpeg` or `png`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(OutputFormat::Jpeg),
            "png" => Some(OutputFormat::Png),
            _ => None,
        }
    }

    /// Lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
        }
    }
}

/// Encoding settings.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct OutputOptions {
    /// Image format.
    pub format: OutputFormat,
    /// Initial JPEG quality (1–100).
    pub quality: u8,
    /// Maximum encoded size in KiB.
    pub max_size_kb: Option<u64>,
    /// Lowest JPEG quality to try.
    pub quality_floor: u8,
    /// Quality decrement per attempt.
    pub quality_step: u8,
    /// Fail instead of warning when the target cannot be met.
    pub require_size_target: bool,
    /// Write a JSON sidecar next to the image on export.
    pub sidecar: Option<PathBuf>,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::Jpeg,
            quality: DEFAULT_QUALITY,
            max_size_kb: None,
            quality_floor: DEFAULT_QUALITY_FLOOR,
            quality_step: DEFAULT_QUALITY_STEP,
            require_size_target: false,
            sidecar: None,
        }
    }
}

impl OutputOptions {
    /// Default options for `format`.
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            ..Self::default()
        }
    }

    /// Set the initial JPEG quality.
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }

    /// Limit the encoded size.
    pub fn with_max_size_kb(mut self, max_size_kb: u64) -> Self {
        self.max_size_kb = (max_size_kb > 0).then_some(max_size_kb);
        self
    }

    /// Set the quality floor and step for size fitting.
    pub fn with_quality_search(mut self, floor: u8, step: u8) -> Self {
        self.quality_floor = floor.clamp(1, 100);
        self.quality_step = step.max(1);
        self
    }

    /// Treat an unmet size target as an error.
    pub fn with_required_size_target(mut self, required: bool) -> Self {
        self.require_size_target = required;
        self
    }

    /// Write a sidecar JSON file to `path` on export.
    pub fn with_sidecar<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.sidecar = Some(path.into());
        self
    }
}

/// An encoded print.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPrint {
    /// Encoded bytes.
    pub bytes: Vec<u8>,
    /// Format of `bytes`.
    pub format: OutputFormat,
    /// Pixel width (always the canvas width).
    pub width: u32,
    /// Pixel height (always the canvas height).
    pub height: u32,
    /// JPEG quality used; `None` for PNG.
    pub quality: Option<u8>,
    /// Number of encodings performed.
    pub attempts: u32,
    /// `false` when a size target was set and not met.
    pub size_target_met: bool,
}

impl EncodedPrint {
    /// Encoded size in KiB.
    pub fn size_kb(&self) -> f64 {
        self.bytes.len() as f64 / 1024.0
    }

    /// Write the bytes to `path`.
    ///
    /// # Errors
    ///
    /// Any I/O error from writing the file.
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<(), CompositionError> {
        fs::write(path.as_ref(), &self.bytes)?;
        log::info!(
            "Wrote {} ({}x{}, {:.1} KB)",
            path.as_ref().display(),
            self.width,
            self.height,
            self.size_kb()
        );
        Ok(())
    }
}

/// Encode `canvas`, fitting it under `options.max_size_kb` when set.
///
/// # Errors
///
/// [`CompositionError::Encode`] when the encoder fails, and
/// [`CompositionError::SizeTargetUnmet`] when the target is missed and
/// `require_size_target` is set.
pub fn encode_print(
    canvas: &RgbImage,
    options: &OutputOptions,
) -> Result<EncodedPrint, CompositionError> {
    let limit = options.max_size_kb.map(|kb| kb * 1024);
    let fits = |bytes: &[u8]| limit.is_none_or(|limit| bytes.len() as u64 <= limit);

    let mut print = match options.format {
        OutputFormat::Jpeg => {
            let floor = options.quality_floor.min(options.quality);
            let mut quality = options.quality;
            let mut attempts = 1;
            let mut bytes = encode_jpeg(canvas, quality)?;
            while !fits(&bytes) && quality > floor {
                quality = quality.saturating_sub(options.quality_step).max(floor);
                attempts += 1;
                bytes = encode_jpeg(canvas, quality)?;
                log::debug!(
                    "Size fitting: quality {quality} -> {:.1} KB",
                    bytes.len() as f64 / 1024.0
                );
            }
            EncodedPrint {
                bytes,
                format: OutputFormat::Jpeg,
                width: canvas.width(),
                height: canvas.height(),
                quality: Some(quality),
                attempts,
                size_target_met: true,
            }
        }
        OutputFormat::Png => {
            let mut attempts = 1;
            let mut bytes = encode_png(canvas, CompressionType::Default)?;
            if !fits(&bytes) {
                attempts += 1;
                bytes = encode_png(canvas, CompressionType::Best)?;
            }
            EncodedPrint {
                bytes,
                format: OutputFormat::Png,
                width: canvas.width(),
                height: canvas.height(),
                quality: None,
                attempts,
                size_target_met: true,
            }
        }
    };

    let unmet_target = options.max_size_kb.filter(|_| !fits(&print.bytes));
    if let Some(target_kb) = unmet_target {
        print.size_target_met = false;
        let floor = print.quality.unwrap_or(0);
        if options.require_size_target {
            return Err(CompositionError::SizeTargetUnmet {
                target_kb,
                achieved_kb: print.size_kb(),
                floor,
            });
        }
        log::warn!(
            "Could not reach {target_kb} KB: {:.1} KB after {} attempts",
            print.size_kb(),
            print.attempts
        );
    }
    Ok(print)
}

fn encode_jpeg(canvas: &RgbImage, quality: u8) -> Result<Vec<u8>, CompositionError> {
    let mut buffer = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buffer, quality).write_image(
        canvas.as_raw(),
        canvas.width(),
        canvas.height(),
        ExtendedColorType::Rgb8,
    )?;
    Ok(buffer.into_inner())
}

fn encode_png(canvas: &RgbImage, compression: CompressionType) -> Result<Vec<u8>, CompositionError> {
    let mut buffer = Cursor::new(Vec::new());
    PngEncoder::new_with_quality(&mut buffer, compression, PngFilterType::Adaptive).write_image(
        canvas.as_raw(),
        canvas.width(),
        canvas.height(),
        ExtendedColorType::Rgb8,
    )?;
    Ok(buffer.into_inner())
}
