//! Error types for the `filmstrip` crate.
//!
//! [`FilmstripError`] is returned by every fallible operation. Variants fall
//! into three groups:
//!
//! - **Run-level failures** abort an extraction run and are shown to the user
//!   as a single "could not process this video" message
//!   ([`UnsupportedMedia`](FilmstripError::UnsupportedMedia),
//!   [`EmptyInput`](FilmstripError::EmptyInput),
//!   [`DurationUnavailable`](FilmstripError::DurationUnavailable),
//!   [`AllSeeksFailed`](FilmstripError::AllSeeksFailed)).
//! - **Per-timestamp failures** are recovered locally by skipping the sample
//!   ([`SeekFailed`](FilmstripError::SeekFailed),
//!   [`ImageError`](FilmstripError::ImageError)).
//! - **Internal invariant violations** that a correct build never produces
//!   ([`OutOfOrder`](FilmstripError::OutOfOrder)).

use std::{io::Error as IoError, path::PathBuf, time::Duration};

use ffmpeg_next::Error as FfmpegError;
use image::ImageError;
use thiserror::Error;

/// The unified error type for all `filmstrip` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FilmstripError {
    /// The blob could not be decoded as a video.
    #[error("Unsupported media at {path}: {reason}")]
    UnsupportedMedia {
        /// Path of the rejected blob.
        path: PathBuf,
        /// Why the decoder rejected it.
        reason: String,
    },

    /// The blob is empty or reports a duration of zero.
    #[error("Media at {path} is empty or has zero duration")]
    EmptyInput {
        /// Path of the empty blob.
        path: PathBuf,
    },

    /// The duration is unknown or not finite, so no schedule can be built.
    #[error("Video duration is not available (reported {0} seconds)")]
    DurationUnavailable(f64),

    /// A single seek-and-capture step failed or timed out.
    #[error("Seek to {timestamp:?} failed: {reason}")]
    SeekFailed {
        /// The timestamp that was requested.
        timestamp: Duration,
        /// Decoder-provided reason.
        reason: String,
    },

    /// Every timestamp in the run failed to capture.
    #[error("Could not capture any frame ({attempted} timestamps attempted)")]
    AllSeeksFailed {
        /// Number of timestamps that were tried.
        attempted: u64,
    },

    /// A frame was appended with an index other than the store length.
    #[error("Frame {found} appended out of order (expected index {expected})")]
    OutOfOrder {
        /// The index the store expected next.
        expected: u64,
        /// The index carried by the rejected frame.
        found: u64,
    },

    /// The configured sampling rate is zero.
    #[error("Sampling rate must be greater than zero")]
    InvalidSampleRate,

    /// The selection contained no video.
    #[error("No video was selected")]
    NoSelection,

    /// More than one file was offered at once.
    #[error("Expected a single video, got {0} files")]
    MultipleSelection(usize),

    /// A newer selection replaced this run before it finished.
    #[error("Run {generation} was superseded by a newer selection")]
    Superseded {
        /// Generation identifier of the discarded run.
        generation: u64,
    },

    /// The run was cancelled through [`FrameSampler::cancel`](crate::FrameSampler::cancel).
    #[error("Operation cancelled")]
    Cancelled,

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),

    /// An I/O error occurred while inspecting the blob.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),

    /// Encoding or decoding a frame image failed.
    #[error("Image processing error: {0}")]
    ImageError(#[from] ImageError),
}

impl FilmstripError {
    /// Returns `true` for errors the sampler recovers from by skipping a
    /// single timestamp: a failed seek, or a picture that cannot be encoded.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FilmstripError::SeekFailed { .. } | FilmstripError::ImageError(_)
        )
    }

    /// Returns `true` when the error belongs to a run that was replaced or
    /// stopped on purpose rather than one that failed.
    pub fn is_interruption(&self) -> bool {
        matches!(
            self,
            FilmstripError::Superseded { .. } | FilmstripError::Cancelled
        )
    }
}

impl From<FfmpegError> for FilmstripError {
    fn from(error: FfmpegError) -> Self {
        FilmstripError::FfmpegError(error.to_string())
    }
}
