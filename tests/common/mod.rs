//! Shared helpers for integration tests.
//!
//! [`SyntheticDecoder`] stands in for FFmpeg: every decoded frame is a flat
//! colour derived from its timestamp, so tests can tell frames apart by
//! pixel value without any media files.

#![allow(dead_code)]

use std::{
    collections::BTreeSet,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use image::{DynamicImage, Rgb, RgbImage};
use movieprint::{
    DecodeAdapter, DecodeError, DecodeRequest, DecodedFrame, DynamicRange, FrameImage,
    FrameRecord, ProbeInfo, VideoSource,
};

pub const FIXTURE_PATH: &str = "tests/fixtures/sample_video.mp4";

/// Colour a synthetic frame at `timestamp` is filled with.
pub fn color_for(timestamp: Duration) -> Rgb<u8> {
    let millis = timestamp.as_millis() as u64;
    Rgb([
        (millis / 1000 % 256) as u8,
        (millis % 1000 / 4) as u8,
        ((millis / 256_000) % 256) as u8,
    ])
}

pub struct SyntheticDecoder {
    info: ProbeInfo,
    failing: BTreeSet<u128>,
    fatal: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl SyntheticDecoder {
    /// A 60 s, 24 fps, 64×36 SDR source.
    pub fn new() -> Self {
        Self {
            info: ProbeInfo {
                duration: Duration::from_secs(60),
                frames_per_second: 24.0,
                width: 64,
                height: 36,
                dynamic_range: DynamicRange::Sdr,
                hardware_decode_available: false,
                codec: "synthetic".to_string(),
            },
            failing: BTreeSet::new(),
            fatal: false,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_info(mut self, info: ProbeInfo) -> Self {
        self.info = info;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.info.duration = duration;
        self
    }

    pub fn with_dynamic_range(mut self, dynamic_range: DynamicRange) -> Self {
        self.info.dynamic_range = dynamic_range;
        self
    }

    /// Decoding at `timestamp` fails with a per-frame error.
    pub fn failing_at(mut self, timestamp: Duration) -> Self {
        self.failing.insert(timestamp.as_millis());
        self
    }

    /// Every decode fails with a fatal error.
    pub fn unavailable(mut self) -> Self {
        self.fatal = true;
        self
    }

    /// Sleep this long inside every decode.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn source(&self) -> VideoSource {
        VideoSource::from_probe("synthetic.mp4", self.info.clone())
    }
}

impl DecodeAdapter for SyntheticDecoder {
    fn probe(&self, path: &Path) -> Result<ProbeInfo, DecodeError> {
        if self.fatal {
            return Err(offline(path));
        }
        Ok(self.info.clone())
    }

    fn decode_at(
        &self,
        source: &VideoSource,
        timestamp: Duration,
        request: &DecodeRequest,
    ) -> Result<DecodedFrame, DecodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        if self.fatal {
            return Err(offline(source.path()));
        }
        if timestamp >= self.info.duration {
            return Err(DecodeError::InvalidTimestamp(timestamp));
        }
        if self.failing.contains(&timestamp.as_millis()) {
            return Err(DecodeError::Frame {
                timestamp,
                reason: "corrupt packet".to_string(),
            });
        }

        let image = RgbImage::from_pixel(self.info.width, self.info.height, color_for(timestamp));
        Ok(DecodedFrame {
            image: DynamicImage::ImageRgb8(image),
            timestamp,
            tone_mapped: request.tone_map.is_some() && self.info.dynamic_range.is_hdr(),
            hardware_used: false,
            hardware_fallback: request
                .use_hardware
                .then(|| "synthetic decoder has no hardware path".to_string()),
        })
    }
}

fn offline(path: &Path) -> DecodeError {
    DecodeError::Unavailable {
        path: path.to_path_buf(),
        reason: "synthetic backend offline".to_string(),
    }
}

/// Wrap a decoder for APIs that take a shared adapter.
pub fn shared(decoder: SyntheticDecoder) -> Arc<SyntheticDecoder> {
    Arc::new(decoder)
}

pub fn secs(value: u64) -> Duration {
    Duration::from_secs(value)
}

pub fn millis(value: u64) -> Duration {
    Duration::from_millis(value)
}

/// An in-memory record filled with `color`.
pub fn solid_record(slot: usize, color: Rgb<u8>, width: u32, height: u32) -> FrameRecord {
    let image = RgbImage::from_pixel(width, height, color);
    FrameRecord {
        sequence_index: slot,
        source_timestamp: Duration::from_secs(slot as u64),
        frame_number: slot as u64 * 24,
        image: FrameImage::Memory(Arc::new(DynamicImage::ImageRgb8(image))),
        width,
        height,
        tone_mapped: false,
        hardware_decoded: false,
        face_boxes: None,
        shot: None,
    }
}

/// Whether two colours differ by at most one step per channel.
pub fn close(a: Rgb<u8>, b: Rgb<u8>) -> bool {
    a.0.iter().zip(b.0).all(|(x, y)| x.abs_diff(y) <= 1)
}
