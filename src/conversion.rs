//! Internal conversion helpers.
//!
//! Pixel-plane copying and timestamp arithmetic shared by the decoder, the
//! planner and the layout engine.

use std::time::Duration;

use ffmpeg_next::{Rational, frame::Video as VideoFrame};

/// Copy one plane of an FFmpeg video frame into a tightly-packed buffer.
///
/// `bytes_per_pixel` is 3 for RGB24 and 6 for RGB48. FFmpeg rows often
/// carry padding past `width × bytes_per_pixel`; it is stripped here.
pub(crate) fn frame_to_buffer(
    video_frame: &VideoFrame,
    width: u32,
    height: u32,
    bytes_per_pixel: usize,
) -> Vec<u8> {
    let stride = video_frame.stride(0);
    let expected_stride = (width as usize) * bytes_per_pixel;
    let data = video_frame.data(0);

    if stride == expected_stride {
        data[..expected_stride * (height as usize)].to_vec()
    } else {
        let mut buffer = Vec::with_capacity(expected_stride * (height as usize));
        for row in 0..(height as usize) {
            let row_start = row * stride;
            buffer.extend_from_slice(&data[row_start..row_start + expected_stride]);
        }
        buffer
    }
}

/// Nearest frame index for a timestamp (`round(t × fps)`).
///
/// Returns 0 when the frame rate is unknown.
pub(crate) fn timestamp_to_frame_number(timestamp: Duration, frames_per_second: f64) -> u64 {
    if frames_per_second <= 0.0 {
        return 0;
    }
    (timestamp.as_secs_f64() * frames_per_second).round() as u64
}

/// Timestamp at which frame `frame_number` is displayed.
pub(crate) fn frame_number_to_timestamp(frame_number: u64, frames_per_second: f64) -> Duration {
    if frames_per_second <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(frame_number as f64 / frames_per_second)
}

/// Rescale a PTS value from stream time base to a [`Duration`].
pub(crate) fn pts_to_duration(pts: i64, time_base: Rational) -> Duration {
    let seconds =
        pts as f64 * time_base.numerator() as f64 / time_base.denominator().max(1) as f64;
    Duration::from_secs_f64(seconds.max(0.0))
}

/// Convert a [`Duration`] to a seek timestamp in AV_TIME_BASE (microseconds).
///
/// `input_context.seek()` with no stream index expects container time base.
pub(crate) fn duration_to_seek_timestamp(duration: Duration) -> i64 {
    duration.as_micros() as i64
}

/// Round to the nearest integer, ties to even, clamped at zero.
///
/// Used wherever fractional geometry becomes a pixel boundary so identical
/// inputs always land on identical pixels.
pub(crate) fn round_pixel(value: f64) -> u32 {
    if value <= 0.0 {
        0
    } else {
        value.round_ties_even() as u32
    }
}

/// Format a timestamp as `HH:MM:SS.mmm`.
pub(crate) fn format_timecode(timestamp: Duration) -> String {
    let total_millis = timestamp.as_millis();
    let hours = total_millis / 3_600_000;
    let minutes = (total_millis / 60_000) % 60;
    let seconds = (total_millis / 1_000) % 60;
    let millis = total_millis % 1_000;
    format!("{hours:02}:{minutes:02}:{seconds:02}.{millis:03}")
}
