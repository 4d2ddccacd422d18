//! # filmstrip
//!
//! Sample a video at a fixed rate into an ordered, progressively growing
//! sequence of still frames, ready to be laid out as a horizontal filmstrip.
//!
//! The heart of the crate is [`FrameSampler`]: it opens one video through a
//! [`MediaSource`], computes the [`SampleSchedule`] (`ceil(duration × fps)`
//! timestamps spaced by `1/fps`), and performs one seek-and-capture per
//! timestamp, waiting for each seek to settle before issuing the next. Every
//! captured picture is encoded (PNG by default) and appended to the
//! [`FrameStore`], which a display layer can read at any time, even while
//! sampling is still in progress.
//!
//! ## Quick Start
//!
//! ```no_run
//! use filmstrip::{FfmpegSource, FrameSampler, MediaBlob, SamplerOptions, select_video};
//!
//! # async fn example() -> Result<(), filmstrip::FilmstripError> {
//! let blob = select_video([MediaBlob::from_path("input.mp4")])?;
//! let sampler = FrameSampler::new(FfmpegSource::new(), SamplerOptions::new().with_fps(25));
//!
//! let summary = sampler.start(blob).await?;
//! println!("{} frames, {} skipped", summary.captured, summary.skipped);
//!
//! for frame in sampler.frames() {
//!     let _png: &[u8] = frame.image_data();
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Fixed-rate sampling**: configurable samples per second (default 25),
//!   drift-free timestamps
//! - **Sequential seeking**: never more than one outstanding seek per video,
//!   with a per-seek timeout (default 5 seconds)
//! - **Skip and continue**: a single undecodable timestamp is skipped; the
//!   run only fails if every timestamp fails
//! - **Supersession**: selecting a new video discards the previous run's late
//!   results, tagged by a generation identifier
//! - **Progressive rendering**: [`FrameSampler::frames`] snapshots and a
//!   [`RunUpdates`] status stream
//! - **Configurable output**: PNG or JPEG, RGB8, RGBA8 or GRAY8, and an
//!   optional target resolution
//! - **Progress reporting**: [`ProgressCallback`] with batched updates
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed on your system.

mod conversion;

pub mod configuration;
pub mod decoder;
pub mod error;
pub mod ffmpeg;
pub mod frame;
pub mod progress;
pub mod sampler;
pub mod schedule;
pub mod selection;
pub mod source;
pub mod store;

pub use configuration::{
    DEFAULT_FPS, DEFAULT_SEEK_TIMEOUT, FrameOutputOptions, PixelFormat, SamplerOptions,
};
pub use decoder::{FfmpegSource, FfmpegVideo};
pub use error::FilmstripError;
pub use ffmpeg::{FfmpegLogLevel, get_ffmpeg_log_level, set_ffmpeg_log_level};
pub use frame::{Frame, ImageEncoding};
pub use progress::{CancellationToken, ProgressCallback, ProgressInfo};
pub use sampler::{FrameSampler, RunStatus, RunSummary, RunUpdates, SamplerState};
pub use schedule::SampleSchedule;
pub use selection::{MediaBlob, select_video};
pub use source::{MediaSource, VideoHandle, VideoInfo, clamp_timestamp};
pub use store::FrameStore;
