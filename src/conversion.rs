//! Internal timestamp and pixel-buffer helpers shared by the FFmpeg source.

use std::time::Duration;

use ffmpeg_next::{Rational, frame::Video as VideoFrame};

/// Copy pixel data from an RGB24 FFmpeg frame into a tightly-packed buffer.
///
/// FFmpeg frames frequently carry per-row padding (stride > width × 3),
/// which [`image::RgbImage::from_raw`] does not accept.
pub(crate) fn frame_to_rgb_buffer(video_frame: &VideoFrame, width: u32, height: u32) -> Vec<u8> {
    let stride = video_frame.stride(0);
    let row_bytes = (width as usize) * 3;
    let data = video_frame.data(0);

    if stride == row_bytes {
        data[..row_bytes * (height as usize)].to_vec()
    } else {
        let mut buffer = Vec::with_capacity(row_bytes * (height as usize));
        for row in 0..(height as usize) {
            let row_start = row * stride;
            buffer.extend_from_slice(&data[row_start..row_start + row_bytes]);
        }
        buffer
    }
}

/// Rescale a PTS value from stream time base to seconds.
pub(crate) fn pts_to_seconds(pts: i64, time_base: Rational) -> f64 {
    pts as f64 * time_base.numerator() as f64 / time_base.denominator() as f64
}

/// Rescale a PTS value from stream time base to FFmpeg's microsecond base.
pub(crate) fn pts_to_micros(pts: i64, time_base: Rational) -> i64 {
    (pts_to_seconds(pts, time_base) * 1_000_000.0).round() as i64
}

/// Nearest frame number for a timestamp in seconds.
pub(crate) fn seconds_to_frame_number(seconds: f64, frames_per_second: f64) -> u64 {
    if frames_per_second <= 0.0 {
        return 0;
    }
    (seconds.max(0.0) * frames_per_second).round() as u64
}

/// Convert a [`Duration`] to FFmpeg's microsecond time base.
pub(crate) fn duration_to_micros(duration: Duration) -> i64 {
    i64::try_from(duration.as_micros()).unwrap_or(i64::MAX)
}
