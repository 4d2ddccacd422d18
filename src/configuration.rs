//! Sampling and capture configuration.
//!
//! [`SamplerOptions`] controls a [`FrameSampler`](crate::FrameSampler): the
//! sampling rate, the per-seek timeout, how frames are encoded, and progress
//! reporting. [`FrameOutputOptions`] controls how the FFmpeg adapter
//! rasterizes a decoded picture.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use filmstrip::{FrameOutputOptions, ImageEncoding, PixelFormat, SamplerOptions};
//!
//! let options = SamplerOptions::new()
//!     .with_fps(10)
//!     .with_seek_timeout(Duration::from_secs(2))
//!     .with_image_encoding(ImageEncoding::Jpeg { quality: 80 });
//!
//! let output = FrameOutputOptions::default()
//!     .with_pixel_format(PixelFormat::Rgba8)
//!     .with_resolution(Some(320), None);
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;
use std::time::Duration;

use ffmpeg_next::format::Pixel;

use crate::frame::ImageEncoding;
use crate::progress::{NoOpProgress, ProgressCallback};

/// Samples per second used when nothing else is configured.
pub const DEFAULT_FPS: u32 = 25;

/// Longest time a single seek may take before it counts as failed.
pub const DEFAULT_SEEK_TIMEOUT: Duration = Duration::from_secs(5);

/// Pixel layout of captured frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    /// 8-bit RGB (24 bpp). This is the default.
    #[default]
    Rgb8,
    /// 8-bit RGBA with alpha pre-set to 255 (32 bpp).
    Rgba8,
    /// 8-bit grayscale (8 bpp).
    Gray8,
}

impl PixelFormat {
    pub(crate) fn to_ffmpeg_pixel(self) -> Pixel {
        match self {
            PixelFormat::Rgb8 => Pixel::RGB24,
            PixelFormat::Rgba8 => Pixel::RGBA,
            PixelFormat::Gray8 => Pixel::GRAY8,
        }
    }

    pub(crate) fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
            PixelFormat::Gray8 => 1,
        }
    }
}

/// Rasterization settings for the FFmpeg adapter.
///
/// With no dimensions set, frames are captured at the video's natural size.
/// Setting one dimension with
/// [`maintain_aspect_ratio`](FrameOutputOptions::maintain_aspect_ratio)
/// computes the other.
#[derive(Debug, Clone)]
pub struct FrameOutputOptions {
    /// Output pixel format.
    pub pixel_format: PixelFormat,
    /// Target width. `None` keeps the natural width.
    pub width: Option<u32>,
    /// Target height. `None` keeps the natural height.
    pub height: Option<u32>,
    /// Preserve the source aspect ratio when only one dimension is given.
    pub maintain_aspect_ratio: bool,
}

impl Default for FrameOutputOptions {
    fn default() -> Self {
        Self {
            pixel_format: PixelFormat::Rgb8,
            width: None,
            height: None,
            maintain_aspect_ratio: true,
        }
    }
}

impl FrameOutputOptions {
    /// Set the output pixel format.
    #[must_use]
    pub fn with_pixel_format(mut self, format: PixelFormat) -> Self {
        self.pixel_format = format;
        self
    }

    /// Set the output resolution. `None` keeps the natural value.
    #[must_use]
    pub fn with_resolution(mut self, width: Option<u32>, height: Option<u32>) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Control aspect-ratio preservation. Defaults to `true`.
    #[must_use]
    pub fn with_maintain_aspect_ratio(mut self, maintain: bool) -> Self {
        self.maintain_aspect_ratio = maintain;
        self
    }

    /// Resolve the capture size for a video of the given natural size.
    ///
    /// Returns `(width, height)`.
    pub fn resolve_dimensions(&self, natural_width: u32, natural_height: u32) -> (u32, u32) {
        match (self.width, self.height) {
            (Some(w), Some(h)) => (w.max(1), h.max(1)),
            (Some(w), None) if self.maintain_aspect_ratio && natural_width > 0 => {
                let ratio = w as f64 / natural_width as f64;
                let h = (natural_height as f64 * ratio).round() as u32;
                (w.max(1), h.max(1))
            }
            (Some(w), None) => (w.max(1), natural_height),
            (None, Some(h)) if self.maintain_aspect_ratio && natural_height > 0 => {
                let ratio = h as f64 / natural_height as f64;
                let w = (natural_width as f64 * ratio).round() as u32;
                (w.max(1), h.max(1))
            }
            (None, Some(h)) => (natural_width, h.max(1)),
            (None, None) => (natural_width, natural_height),
        }
    }
}

/// Configuration for a [`FrameSampler`](crate::FrameSampler).
///
/// A default-constructed value samples at 25 frames per second, waits at
/// most five seconds per seek, encodes PNG, and reports no progress.
#[derive(Clone)]
pub struct SamplerOptions {
    pub(crate) fps: u32,
    pub(crate) seek_timeout: Duration,
    pub(crate) image_encoding: ImageEncoding,
    pub(crate) progress: Arc<dyn ProgressCallback>,
    pub(crate) batch_size: u64,
}

impl Debug for SamplerOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("SamplerOptions")
            .field("fps", &self.fps)
            .field("seek_timeout", &self.seek_timeout)
            .field("image_encoding", &self.image_encoding)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl Default for SamplerOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl SamplerOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self {
            fps: DEFAULT_FPS,
            seek_timeout: DEFAULT_SEEK_TIMEOUT,
            image_encoding: ImageEncoding::Png,
            progress: Arc::new(NoOpProgress),
            batch_size: 1,
        }
    }

    /// Set the sampling rate in samples per second.
    ///
    /// Zero is accepted here and rejected when a run starts, with
    /// [`FilmstripError::InvalidSampleRate`](crate::FilmstripError::InvalidSampleRate).
    #[must_use]
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    /// Bound how long a single seek may wait for its completion.
    #[must_use]
    pub fn with_seek_timeout(mut self, timeout: Duration) -> Self {
        self.seek_timeout = timeout;
        self
    }

    /// Choose how captured frames are encoded.
    #[must_use]
    pub fn with_image_encoding(mut self, encoding: ImageEncoding) -> Self {
        self.image_encoding = encoding;
        self
    }

    /// Attach a progress callback.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Fire the progress callback every `size` timestamps. Clamped to 1.
    #[must_use]
    pub fn with_batch_size(mut self, size: u64) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// The configured sampling rate.
    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// The configured per-seek timeout.
    pub fn seek_timeout(&self) -> Duration {
        self.seek_timeout
    }

    /// The configured frame encoding.
    pub fn image_encoding(&self) -> ImageEncoding {
        self.image_encoding
    }
}
