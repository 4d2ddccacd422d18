//! The seekable decoding surface the sampler drives.
//!
//! [`MediaSource`] opens a [`MediaBlob`] into a [`VideoHandle`]; the handle
//! exposes the video's duration and natural size and a single async
//! primitive, [`seek_and_capture`](VideoHandle::seek_and_capture), that
//! resolves once the decoder has settled on the requested position.
//!
//! The FFmpeg-backed implementation lives in [`crate::decoder`]. Tests and
//! embedders can plug in their own.
//!
//! Dropping a handle must release its decoding resources.

use std::time::Duration;

use image::DynamicImage;

use crate::{error::FilmstripError, selection::MediaBlob};

/// Facts about an opened video.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    /// Duration in seconds. NaN when the container does not report one.
    pub duration_seconds: f64,
    /// Width of a decoded picture in pixels.
    pub natural_width: u32,
    /// Height of a decoded picture in pixels.
    pub natural_height: u32,
    /// Codec name (e.g. `"h264"`, `"vp9"`).
    pub codec: String,
}

/// An opened video that can be seeked and captured.
///
/// Callers must await each capture before issuing the next one.
#[allow(async_fn_in_trait)]
pub trait VideoHandle {
    /// Metadata read when the video was opened.
    fn info(&self) -> &VideoInfo;

    /// Seek to `timestamp`, wait for the decoder to settle, and rasterize the
    /// visible picture.
    ///
    /// Implementations clamp `timestamp` to `[0, duration)` (see
    /// [`clamp_timestamp`]) and report decoder problems as
    /// [`FilmstripError::SeekFailed`].
    async fn seek_and_capture(&mut self, timestamp: Duration)
    -> Result<DynamicImage, FilmstripError>;
}

/// Opens blobs into [`VideoHandle`]s.
#[allow(async_fn_in_trait)]
pub trait MediaSource {
    /// The handle type produced by [`open`](MediaSource::open).
    type Handle: VideoHandle;

    /// Load the blob's metadata and prepare a decoder.
    ///
    /// # Errors
    ///
    /// - [`FilmstripError::UnsupportedMedia`] if the blob cannot be decoded.
    /// - [`FilmstripError::EmptyInput`] if it is empty or has zero duration.
    async fn open(&self, blob: MediaBlob) -> Result<Self::Handle, FilmstripError>;
}

/// Clamp a requested timestamp into `[0, duration)`.
///
/// Timestamps at or past the end land one microsecond before it. Unknown
/// durations leave the timestamp untouched.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use filmstrip::clamp_timestamp;
///
/// let clamped = clamp_timestamp(Duration::from_secs(9), 2.0);
/// assert!(clamped < Duration::from_secs(2));
/// ```
pub fn clamp_timestamp(timestamp: Duration, duration_seconds: f64) -> Duration {
    if !duration_seconds.is_finite() {
        return timestamp;
    }
    if duration_seconds <= 0.0 {
        return Duration::ZERO;
    }
    let end = Duration::from_secs_f64(duration_seconds);
    if timestamp < end {
        timestamp
    } else {
        end.saturating_sub(Duration::from_micros(1))
    }
}
