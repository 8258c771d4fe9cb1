//! FFmpeg-backed [`DecodeAdapter`].
//!
//! Each call opens a fresh demuxer and decoder, seeks to the nearest
//! keyframe before the target and decodes forward until the frame shown at
//! the target time. Calls are serialised through an internal lock, so one
//! `FfmpegDecoder` can be shared by every worker thread.

use std::{path::Path, sync::Mutex, time::Duration};

use ffmpeg_next::{
    codec::context::Context as CodecContext,
    color::TransferCharacteristic,
    format::{Pixel, context::Input},
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
};
use image::{DynamicImage, RgbImage};

use crate::conversion::{duration_to_seek_timestamp, frame_to_buffer, pts_to_duration};
use crate::decode::{DecodeAdapter, DecodeRequest, DecodedFrame};
use crate::error::DecodeError;
use crate::ffmpeg::ensure_initialized;
#[cfg(feature = "hardware")]
use crate::hardware_acceleration::HardwareDevice;
use crate::source::{DynamicRange, ProbeInfo, TransferFunction, VideoSource};
use crate::tonemap::ToneMapper;

/// [`DecodeAdapter`] over the FFmpeg libraries.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
///
/// use movieprint::{DecodeAdapter, DecodeRequest, FfmpegDecoder, VideoSource};
///
/// let decoder = FfmpegDecoder::new();
/// let source = VideoSource::open("input.mp4", &decoder)?;
/// let frame = decoder.decode_at(&source, Duration::from_secs(3), &DecodeRequest::new())?;
/// frame.image.save("frame.png").ok();
/// # Ok::<(), movieprint::DecodeError>(())
/// ```
#[derive(Debug, Default)]
pub struct FfmpegDecoder {
    lock: Mutex<()>,
    #[cfg(feature = "hardware")]
    device: Option<HardwareDevice>,
}

impl FfmpegDecoder {
    /// Create a decoder using software decoding unless a request asks for
    /// hardware.
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefer a specific hardware device when hardware is requested.
    #[cfg(feature = "hardware")]
    #[must_use]
    pub fn with_hardware_device(mut self, device: HardwareDevice) -> Self {
        self.device = Some(device);
        self
    }
}

/// An opened input with its best video stream.
struct OpenedInput {
    input: Input,
    stream_index: usize,
    codec_context: CodecContext,
    time_base: ffmpeg_next::Rational,
}

fn open_input(path: &Path) -> Result<OpenedInput, DecodeError> {
    ensure_initialized().map_err(|error| DecodeError::Unavailable {
        path: path.to_path_buf(),
        reason: error.to_string(),
    })?;

    let input = ffmpeg_next::format::input(&path).map_err(|error| DecodeError::Unavailable {
        path: path.to_path_buf(),
        reason: error.to_string(),
    })?;

    let stream = input
        .streams()
        .best(Type::Video)
        .ok_or_else(|| DecodeError::NoVideoStream(path.to_path_buf()))?;
    let stream_index = stream.index();
    let time_base = stream.time_base();
    let codec_context = CodecContext::from_parameters(stream.parameters())?;

    Ok(OpenedInput {
        input,
        stream_index,
        codec_context,
        time_base,
    })
}

fn classify_transfer(characteristic: TransferCharacteristic) -> DynamicRange {
    match characteristic {
        TransferCharacteristic::SMPTE2084 => DynamicRange::Hdr(TransferFunction::Pq),
        TransferCharacteristic::ARIB_STD_B67 => DynamicRange::Hdr(TransferFunction::Hlg),
        _ => DynamicRange::Sdr,
    }
}

/// Output size after the optional longest-edge limit.
fn scaled_dimensions(width: u32, height: u32, max_dimension: Option<u32>) -> (u32, u32) {
    match max_dimension {
        Some(limit) if width.max(height) > limit && limit > 0 => {
            let scale = limit as f64 / width.max(height) as f64;
            (
                ((width as f64 * scale).round() as u32).max(1),
                ((height as f64 * scale).round() as u32).max(1),
            )
        }
        _ => (width, height),
    }
}

impl DecodeAdapter for FfmpegDecoder {
    fn probe(&self, path: &Path) -> Result<ProbeInfo, DecodeError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| DecodeError::Backend("decoder lock poisoned".to_string()))?;
        let opened = open_input(path)?;
        let stream = opened
            .input
            .stream(opened.stream_index)
            .ok_or_else(|| DecodeError::NoVideoStream(path.to_path_buf()))?;

        let decoder = opened.codec_context.decoder().video()?;

        let frame_rate = stream.avg_frame_rate();
        let frames_per_second = if frame_rate.denominator() != 0 {
            frame_rate.numerator() as f64 / frame_rate.denominator() as f64
        } else {
            let rate = stream.rate();
            if rate.denominator() != 0 {
                rate.numerator() as f64 / rate.denominator() as f64
            } else {
                0.0
            }
        };

        let container_micros = opened.input.duration();
        let duration = if container_micros > 0 {
            Duration::from_micros(container_micros as u64)
        } else if stream.duration() > 0 {
            pts_to_duration(stream.duration(), opened.time_base)
        } else {
            Duration::ZERO
        };

        let codec = decoder
            .codec()
            .map(|codec| codec.name().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        #[cfg(feature = "hardware")]
        let hardware_decode_available =
            !crate::hardware_acceleration::available_hardware_devices().is_empty();
        #[cfg(not(feature = "hardware"))]
        let hardware_decode_available = false;

        let info = ProbeInfo {
            duration,
            frames_per_second,
            width: decoder.width(),
            height: decoder.height(),
            dynamic_range: classify_transfer(decoder.color_transfer_characteristic()),
            hardware_decode_available,
            codec,
        };
        log::debug!("Probed {}: {info:?}", path.display());
        Ok(info)
    }

    fn decode_at(
        &self,
        source: &VideoSource,
        timestamp: Duration,
        request: &DecodeRequest,
    ) -> Result<DecodedFrame, DecodeError> {
        if !source.duration().is_zero() && timestamp > source.duration() {
            return Err(DecodeError::InvalidTimestamp(timestamp));
        }

        let _guard = self
            .lock
            .lock()
            .map_err(|_| DecodeError::Backend("decoder lock poisoned".to_string()))?;
        let mut opened = open_input(source.path())?;

        let (mut decoder, hardware_used, hardware_fallback) =
            self.build_decoder(opened.codec_context, request.use_hardware)?;

        opened.input.seek(
            duration_to_seek_timestamp(timestamp),
            ..duration_to_seek_timestamp(timestamp),
        )?;

        // Accept the first frame within half a frame of the target.
        let tolerance = if source.frames_per_second() > 0.0 {
            Duration::from_secs_f64(0.5 / source.frames_per_second())
        } else {
            Duration::ZERO
        };
        let threshold = timestamp.saturating_sub(tolerance);

        let mut decoded_frame = VideoFrame::empty();
        let mut selected: Option<(VideoFrame, Duration)> = None;

        'packets: for (stream, packet) in opened.input.packets() {
            if stream.index() != opened.stream_index {
                continue;
            }
            if decoder.send_packet(&packet).is_err() {
                continue;
            }
            while decoder.receive_frame(&mut decoded_frame).is_ok() {
                let frame_time =
                    pts_to_duration(decoded_frame.pts().unwrap_or(0), opened.time_base);
                let reached = frame_time >= threshold;
                selected = Some((
                    std::mem::replace(&mut decoded_frame, VideoFrame::empty()),
                    frame_time,
                ));
                if reached {
                    break 'packets;
                }
            }
        }

        if selected
            .as_ref()
            .is_none_or(|(_, frame_time)| *frame_time < threshold)
        {
            decoder.send_eof()?;
            while decoder.receive_frame(&mut decoded_frame).is_ok() {
                let frame_time =
                    pts_to_duration(decoded_frame.pts().unwrap_or(0), opened.time_base);
                let reached = frame_time >= threshold;
                selected = Some((
                    std::mem::replace(&mut decoded_frame, VideoFrame::empty()),
                    frame_time,
                ));
                if reached {
                    break;
                }
            }
        }

        let (frame, frame_time) = selected.ok_or_else(|| DecodeError::Frame {
            timestamp,
            reason: "no frame decoded after seeking".to_string(),
        })?;

        let frame = if hardware_used {
            self.download(frame)
        } else {
            frame
        };

        let tone_mapper = match (request.tone_map, source.dynamic_range()) {
            (Some(algorithm), DynamicRange::Hdr(transfer)) => {
                Some(ToneMapper::new(algorithm, transfer))
            }
            _ => None,
        };

        let (width, height) =
            scaled_dimensions(frame.width(), frame.height(), request.max_dimension);
        let image = match tone_mapper {
            Some(mapper) => convert_tone_mapped(&frame, width, height, &mapper, timestamp)?,
            None => convert_rgb(&frame, width, height, timestamp)?,
        };

        Ok(DecodedFrame {
            image,
            timestamp: frame_time,
            tone_mapped: tone_mapper.is_some(),
            hardware_used,
            hardware_fallback,
        })
    }
}

impl FfmpegDecoder {
    #[cfg(feature = "hardware")]
    fn build_decoder(
        &self,
        codec_context: CodecContext,
        use_hardware: bool,
    ) -> Result<(ffmpeg_next::decoder::Video, bool, Option<String>), DecodeError> {
        if !use_hardware {
            return Ok((codec_context.decoder().video()?, false, None));
        }
        let setup =
            crate::hardware_acceleration::open_hardware_decoder(codec_context, self.device)?;
        let active = setup.fallback_reason.is_none();
        Ok((setup.decoder, active, setup.fallback_reason))
    }

    #[cfg(not(feature = "hardware"))]
    fn build_decoder(
        &self,
        codec_context: CodecContext,
        use_hardware: bool,
    ) -> Result<(ffmpeg_next::decoder::Video, bool, Option<String>), DecodeError> {
        let fallback = use_hardware
            .then(|| "built without the `hardware` feature".to_string());
        Ok((codec_context.decoder().video()?, false, fallback))
    }

    #[cfg(feature = "hardware")]
    fn download(&self, frame: VideoFrame) -> VideoFrame {
        crate::hardware_acceleration::transfer_to_system_memory(&frame).unwrap_or(frame)
    }

    #[cfg(not(feature = "hardware"))]
    fn download(&self, frame: VideoFrame) -> VideoFrame {
        frame
    }
}

fn convert_rgb(
    frame: &VideoFrame,
    width: u32,
    height: u32,
    timestamp: Duration,
) -> Result<DynamicImage, DecodeError> {
    let mut scaler = ScalingContext::get(
        frame.format(),
        frame.width(),
        frame.height(),
        Pixel::RGB24,
        width,
        height,
        ScalingFlags::BILINEAR,
    )?;
    let mut rgb_frame = VideoFrame::empty();
    scaler.run(frame, &mut rgb_frame)?;

    let buffer = frame_to_buffer(&rgb_frame, width, height, 3);
    RgbImage::from_raw(width, height, buffer)
        .map(DynamicImage::ImageRgb8)
        .ok_or_else(|| DecodeError::Frame {
            timestamp,
            reason: "RGB buffer has unexpected size".to_string(),
        })
}

fn convert_tone_mapped(
    frame: &VideoFrame,
    width: u32,
    height: u32,
    mapper: &ToneMapper,
    timestamp: Duration,
) -> Result<DynamicImage, DecodeError> {
    let mut scaler = ScalingContext::get(
        frame.format(),
        frame.width(),
        frame.height(),
        Pixel::RGB48LE,
        width,
        height,
        ScalingFlags::BILINEAR,
    )?;
    use_bt2020_coefficients(&mut scaler);
    let mut rgb_frame = VideoFrame::empty();
    scaler.run(frame, &mut rgb_frame)?;

    let buffer = frame_to_buffer(&rgb_frame, width, height, 6);
    mapper
        .map_rgb48(width, height, &buffer)
        .map(DynamicImage::ImageRgb8)
        .ok_or_else(|| DecodeError::Frame {
            timestamp,
            reason: "RGB48 buffer has unexpected size".to_string(),
        })
}

/// HDR streams are BT.2020; swscale assumes BT.601 unless told otherwise.
fn use_bt2020_coefficients(scaler: &mut ScalingContext) {
    unsafe {
        let coefficients =
            ffmpeg_sys_next::sws_getCoefficients(ffmpeg_sys_next::SWS_CS_BT2020 as i32);
        ffmpeg_sys_next::sws_setColorspaceDetails(
            scaler.as_mut_ptr(),
            coefficients,
            0,
            coefficients,
            1,
            0,
            1 << 16,
            1 << 16,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_classification() {
        assert_eq!(
            classify_transfer(TransferCharacteristic::SMPTE2084),
            DynamicRange::Hdr(TransferFunction::Pq)
        );
        assert_eq!(
            classify_transfer(TransferCharacteristic::ARIB_STD_B67),
            DynamicRange::Hdr(TransferFunction::Hlg)
        );
        assert_eq!(
            classify_transfer(TransferCharacteristic::BT709),
            DynamicRange::Sdr
        );
    }

    #[test]
    fn scaled_dimensions_keep_aspect() {
        assert_eq!(scaled_dimensions(1920, 1080, None), (1920, 1080));
        assert_eq!(scaled_dimensions(1920, 1080, Some(960)), (960, 540));
        assert_eq!(scaled_dimensions(640, 480, Some(1000)), (640, 480));
    }
}
