//! HDR → SDR tone mapping.
//!
//! Decoded HDR frames arrive as 16-bit BT.2020 RGB carrying a PQ or HLG
//! signal. [`ToneMapper`] linearises the signal, compresses highlights with
//! one of the classic curves, converts the gamut to BT.709 and re-encodes to
//! 8-bit display gamma.
//!
//! The curve choice only changes per-pixel values, never which frames are
//! sampled.

use image::{Rgb, RgbImage};

use crate::source::TransferFunction;

/// Highlight-compression curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ToneMapAlgorithm {
    /// John Hable's filmic curve (Uncharted 2). Preserves dark and bright
    /// detail; slightly darker overall.
    #[default]
    Hable,
    /// Simple Reinhard `x / (x + offset)` curve.
    Reinhard,
    /// Möbius: linear up to a knee, then smoothly compressed. Keeps
    /// in-range colours accurate.
    Mobius,
}

impl ToneMapAlgorithm {
    /// Parse a lowercase algorithm name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "hable" => Some(ToneMapAlgorithm::Hable),
            "reinhard" => Some(ToneMapAlgorithm::Reinhard),
            "mobius" | "möbius" => Some(ToneMapAlgorithm::Mobius),
            _ => None,
        }
    }

    /// Lowercase name, as used in sidecar metadata.
    pub fn name(self) -> &'static str {
        match self {
            ToneMapAlgorithm::Hable => "hable",
            ToneMapAlgorithm::Reinhard => "reinhard",
            ToneMapAlgorithm::Mobius => "mobius",
        }
    }
}

/// Reference white in nits; signal value 1.0 after linearisation.
const REFERENCE_WHITE_NITS: f32 = 100.0;

/// Default peak used when the stream carries no mastering metadata
/// (1000-nit grade).
pub const DEFAULT_PEAK: f32 = 10.0;

const REINHARD_PARAM: f32 = 0.5;
const MOBIUS_KNEE: f32 = 0.3;

/// BT.2020 → BT.709 primaries, linear light.
const BT2020_TO_BT709: [[f32; 3]; 3] = [
    [1.6605, -0.5876, -0.0728],
    [-0.1246, 1.1329, -0.0083],
    [-0.0182, -0.1006, 1.1187],
];

/// Tone mapping settings plus the pixel transform.
#[derive(Debug, Clone, Copy, PartialEq)]
#[must_use]
pub struct ToneMapper {
    /// Curve to apply.
    pub algorithm: ToneMapAlgorithm,
    /// Source signal transfer function.
    pub transfer: TransferFunction,
    /// Signal peak relative to reference white (10.0 = 1000 nits).
    pub peak: f32,
}

impl ToneMapper {
    /// Create a mapper with the default peak.
    pub fn new(algorithm: ToneMapAlgorithm, transfer: TransferFunction) -> Self {
        Self {
            algorithm,
            transfer,
            peak: DEFAULT_PEAK,
        }
    }

    /// Override the signal peak (relative to 100-nit reference white).
    pub fn with_peak(mut self, peak: f32) -> Self {
        self.peak = peak.max(1.0);
        self
    }

    /// Tone-map a packed little-endian RGB48 buffer into an 8-bit image.
    ///
    /// Returns `None` when the buffer is shorter than `width × height × 6`.
    pub fn map_rgb48(&self, width: u32, height: u32, buffer: &[u8]) -> Option<RgbImage> {
        let pixel_count = width as usize * height as usize;
        if buffer.len() < pixel_count * 6 {
            return None;
        }
        let mut output = RgbImage::new(width, height);
        for (index, pixel) in output.pixels_mut().enumerate() {
            let offset = index * 6;
            let sample = |channel: usize| {
                let low = buffer[offset + channel * 2] as u16;
                let high = buffer[offset + channel * 2 + 1] as u16;
                ((high << 8) | low) as f32 / 65_535.0
            };
            *pixel = self.map_pixel([sample(0), sample(1), sample(2)]);
        }
        Some(output)
    }

    /// Map one non-linear BT.2020 pixel (components in `0.0..=1.0`).
    pub fn map_pixel(&self, signal: [f32; 3]) -> Rgb<u8> {
        let linear = signal.map(|value| self.linearise(value));

        // Compress on the brightest component so hue is preserved.
        let brightest = linear[0].max(linear[1]).max(linear[2]);
        let scaled = if brightest > 1e-6 {
            let mapped = self.curve(brightest);
            let ratio = mapped / brightest;
            linear.map(|value| value * ratio)
        } else {
            linear
        };

        let bt709 = convert_gamut(scaled);
        Rgb(bt709.map(encode_display))
    }

    /// Signal → linear light relative to reference white.
    fn linearise(&self, value: f32) -> f32 {
        let value = value.clamp(0.0, 1.0);
        match self.transfer {
            TransferFunction::Pq => pq_eotf(value) * (10_000.0 / REFERENCE_WHITE_NITS),
            TransferFunction::Hlg => hlg_inverse_oetf(value) * 12.0,
        }
    }

    /// Apply the highlight curve. Output is normalised so `peak → 1.0`.
    fn curve(&self, value: f32) -> f32 {
        let peak = self.peak;
        match self.algorithm {
            ToneMapAlgorithm::Hable => hable(value) / hable(peak),
            ToneMapAlgorithm::Reinhard => {
                let offset = (1.0 - REINHARD_PARAM) / REINHARD_PARAM;
                value / (value + offset) * (peak + offset) / peak
            }
            ToneMapAlgorithm::Mobius => mobius(value, peak),
        }
        .clamp(0.0, 1.0)
    }
}

fn hable(value: f32) -> f32 {
    let (a, b, c, d, e, f) = (0.15, 0.50, 0.10, 0.20, 0.02, 0.30);
    (value * (value * a + b * c) + d * e) / (value * (value * a + b) + d * f) - e / f
}

fn mobius(value: f32, peak: f32) -> f32 {
    let j = MOBIUS_KNEE;
    if value <= j {
        return value;
    }
    let a = -j * j * (peak - 1.0) / (j * j - 2.0 * j + peak);
    let b = (j * j - 2.0 * j * peak + peak) / (peak - 1.0).max(1e-6);
    (b * b + 2.0 * b * j + j * j) / (b - a) * (value + a) / (value + b)
}

/// SMPTE ST 2084 EOTF; returns `0.0..=1.0` of 10 000 nits.
fn pq_eotf(value: f32) -> f32 {
    const M1: f32 = 2610.0 / 16384.0;
    const M2: f32 = 2523.0 / 4096.0 * 128.0;
    const C1: f32 = 3424.0 / 4096.0;
    const C2: f32 = 2413.0 / 4096.0 * 32.0;
    const C3: f32 = 2392.0 / 4096.0 * 32.0;

    let power = value.powf(1.0 / M2);
    let numerator = (power - C1).max(0.0);
    let denominator = C2 - C3 * power;
    (numerator / denominator).powf(1.0 / M1)
}

/// ARIB STD-B67 inverse OETF; returns scene light in `0.0..=1.0`.
fn hlg_inverse_oetf(value: f32) -> f32 {
    const A: f32 = 0.178_832_77;
    const B: f32 = 0.284_668_92;
    const C: f32 = 0.559_910_73;

    if value <= 0.5 {
        value * value / 3.0
    } else {
        (((value - C) / A).exp() + B) / 12.0
    }
}

fn convert_gamut(rgb: [f32; 3]) -> [f32; 3] {
    let row = |coefficients: [f32; 3]| {
        coefficients[0] * rgb[0] + coefficients[1] * rgb[1] + coefficients[2] * rgb[2]
    };
    [
        row(BT2020_TO_BT709[0]),
        row(BT2020_TO_BT709[1]),
        row(BT2020_TO_BT709[2]),
    ]
}

/// Linear → BT.1886 display signal, quantised to 8 bits.
fn encode_display(value: f32) -> u8 {
    let encoded = value.clamp(0.0, 1.0).powf(1.0 / 2.4);
    (encoded * 255.0).round() as u8
}
