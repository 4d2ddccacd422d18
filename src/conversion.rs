//! Internal conversions between FFmpeg units and the crate's types.

use std::time::Duration;

use ffmpeg_next::{Rational, frame::Video as VideoFrame};
use ffmpeg_sys_next::{AV_NOPTS_VALUE, AV_TIME_BASE};

/// Copy the first plane of a converted frame into a tightly-packed buffer.
///
/// FFmpeg rows frequently carry padding (stride > width × bpp); it is
/// stripped so the result can go straight into an `image` buffer.
pub(crate) fn frame_to_buffer(
    video_frame: &VideoFrame,
    width: u32,
    height: u32,
    bytes_per_pixel: usize,
) -> Vec<u8> {
    let stride = video_frame.stride(0);
    let row_length = (width as usize) * bytes_per_pixel;
    let data = video_frame.data(0);

    if stride == row_length {
        data[..row_length * (height as usize)].to_vec()
    } else {
        let mut buffer = Vec::with_capacity(row_length * (height as usize));
        for row in 0..(height as usize) {
            let row_start = row * stride;
            buffer.extend_from_slice(&data[row_start..row_start + row_length]);
        }
        buffer
    }
}

/// Container-level seek position (AV_TIME_BASE units) for a timestamp.
pub(crate) fn duration_to_seek_timestamp(timestamp: Duration) -> i64 {
    i64::try_from(timestamp.as_micros()).unwrap_or(i64::MAX)
}

/// Rescale a PTS value from the stream time base to seconds.
pub(crate) fn pts_to_seconds(pts: i64, time_base: Rational) -> f64 {
    pts as f64 * f64::from(time_base.numerator()) / f64::from(time_base.denominator())
}

/// Container duration in seconds, or `None` when FFmpeg does not know it.
pub(crate) fn container_duration_seconds(raw: i64) -> Option<f64> {
    (raw != AV_NOPTS_VALUE && raw >= 0).then(|| raw as f64 / AV_TIME_BASE as f64)
}

/// Container start offset in seconds. Unset or negative offsets count as zero.
pub(crate) fn container_start_seconds(raw: i64) -> f64 {
    container_duration_seconds(raw).unwrap_or(0.0)
}

/// Stream duration in seconds, or `None` when it is unset.
pub(crate) fn stream_duration_seconds(raw: i64, time_base: Rational) -> Option<f64> {
    if raw == AV_NOPTS_VALUE || raw < 0 || time_base.denominator() == 0 {
        return None;
    }
    Some(pts_to_seconds(raw, time_base))
}
