//! FFmpeg-backed [`MediaSource`].
//!
//! Each opened video gets its own decode worker, started with
//! `tokio::task::spawn_blocking`. The worker owns the demuxer, decoder and
//! scaler for the whole lifetime of the handle and serves seek requests one
//! at a time from a channel of capacity one. Every request carries a
//! `oneshot` reply, which is the seek-completion signal the sampler awaits.
//!
//! Dropping the [`FfmpegVideo`] closes the request channel; the worker then
//! returns and every FFmpeg resource it owns is released.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use filmstrip::{FfmpegSource, MediaBlob, MediaSource, VideoHandle};
//!
//! # async fn example() -> Result<(), filmstrip::FilmstripError> {
//! let source = FfmpegSource::new();
//! let mut video = source.open(MediaBlob::from_path("input.mp4")).await?;
//! println!("{:.2}s", video.info().duration_seconds);
//! let picture = video.seek_and_capture(Duration::from_millis(500)).await?;
//! # Ok(())
//! # }
//! ```

use std::{fs, mem, path::PathBuf, time::Duration};

use ffmpeg_next::{
    Rational,
    codec::context::Context as CodecContext,
    decoder::Video as VideoDecoder,
    format::context::Input,
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
};
use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

use crate::{
    configuration::{FrameOutputOptions, PixelFormat},
    conversion,
    error::FilmstripError,
    selection::MediaBlob,
    source::{MediaSource, VideoHandle, VideoInfo, clamp_timestamp},
};

/// Frames whose presentation time is this close to the target count as a hit.
const PTS_TOLERANCE_SECONDS: f64 = 0.001;

/// Opens videos with FFmpeg.
#[derive(Debug, Clone, Default)]
pub struct FfmpegSource {
    output: FrameOutputOptions,
}

impl FfmpegSource {
    /// Capture at natural size in RGB8.
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture with custom rasterization settings.
    pub fn with_output(output: FrameOutputOptions) -> Self {
        Self { output }
    }

    /// The rasterization settings in use.
    pub fn output(&self) -> &FrameOutputOptions {
        &self.output
    }
}

impl MediaSource for FfmpegSource {
    type Handle = FfmpegVideo;

    async fn open(&self, blob: MediaBlob) -> Result<FfmpegVideo, FilmstripError> {
        let path = blob.path().to_path_buf();
        let output = self.output.clone();
        let (request_sender, request_receiver) = mpsc::channel(1);
        let (ready_sender, ready_receiver) = oneshot::channel();

        let worker = tokio::task::spawn_blocking(move || {
            run_decode_worker(blob, output, ready_sender, request_receiver);
        });

        let info = ready_receiver
            .await
            .map_err(|_| FilmstripError::UnsupportedMedia {
                path,
                reason: "decode worker stopped before reporting metadata".to_string(),
            })??;

        Ok(FfmpegVideo {
            info,
            requests: request_sender,
            worker,
        })
    }
}

struct SeekRequest {
    timestamp: Duration,
    reply: oneshot::Sender<Result<DynamicImage, FilmstripError>>,
}

/// A video opened by [`FfmpegSource`].
pub struct FfmpegVideo {
    info: VideoInfo,
    requests: mpsc::Sender<SeekRequest>,
    #[allow(dead_code)]
    worker: JoinHandle<()>,
}

impl VideoHandle for FfmpegVideo {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    async fn seek_and_capture(
        &mut self,
        timestamp: Duration,
    ) -> Result<DynamicImage, FilmstripError> {
        let (reply, completion) = oneshot::channel();
        self.requests
            .send(SeekRequest { timestamp, reply })
            .await
            .map_err(|_| FilmstripError::SeekFailed {
                timestamp,
                reason: "decode worker is no longer running".to_string(),
            })?;

        completion.await.map_err(|_| FilmstripError::SeekFailed {
            timestamp,
            reason: "decode worker dropped the request".to_string(),
        })?
    }
}

/// Body of the blocking decode worker.
fn run_decode_worker(
    blob: MediaBlob,
    output: FrameOutputOptions,
    ready: oneshot::Sender<Result<VideoInfo, FilmstripError>>,
    mut requests: mpsc::Receiver<SeekRequest>,
) {
    let mut decoder = match SeekableDecoder::open(&blob, &output) {
        Ok(decoder) => decoder,
        Err(error) => {
            let _ = ready.send(Err(error));
            return;
        }
    };

    if ready.send(Ok(decoder.info.clone())).is_err() {
        return;
    }

    while let Some(request) = requests.blocking_recv() {
        let result = decoder.seek_and_capture(request.timestamp);
        // The sampler may have given up on this request after a timeout.
        let _ = request.reply.send(result);
    }

    log::debug!("Released decoder for {}", decoder.path.display());
}

/// Demuxer, decoder and scaler for one video. Lives on the worker thread.
struct SeekableDecoder {
    path: PathBuf,
    info: VideoInfo,
    input: Input,
    decoder: VideoDecoder,
    scaler: ScalingContext,
    stream_index: usize,
    time_base: Rational,
    /// Presentation time of the first frame. MPEG-TS files rarely start at zero.
    start_seconds: f64,
    pixel_format: PixelFormat,
    output_width: u32,
    output_height: u32,
}

impl SeekableDecoder {
    fn open(blob: &MediaBlob, output: &FrameOutputOptions) -> Result<Self, FilmstripError> {
        let path = blob.path().to_path_buf();
        let unsupported = |reason: String| FilmstripError::UnsupportedMedia {
            path: path.clone(),
            reason,
        };

        log::debug!("Opening video: {blob}");

        let size = fs::metadata(&path)
            .map_err(|error| unsupported(format!("unreadable file: {error}")))?
            .len();
        if size == 0 {
            return Err(FilmstripError::EmptyInput { path: path.clone() });
        }

        ffmpeg_next::init()
            .map_err(|error| unsupported(format!("FFmpeg initialisation failed: {error}")))?;

        let input =
            ffmpeg_next::format::input(&path).map_err(|error| unsupported(error.to_string()))?;

        let (stream_index, time_base, stream_duration, decoder) = {
            let stream = input
                .streams()
                .best(Type::Video)
                .ok_or_else(|| unsupported("no video stream found".to_string()))?;
            let context = CodecContext::from_parameters(stream.parameters())
                .map_err(|error| unsupported(format!("unreadable codec parameters: {error}")))?;
            let decoder = context
                .decoder()
                .video()
                .map_err(|error| unsupported(format!("no decoder available: {error}")))?;
            (stream.index(), stream.time_base(), stream.duration(), decoder)
        };

        let natural_width = decoder.width();
        let natural_height = decoder.height();
        if natural_width == 0 || natural_height == 0 {
            return Err(unsupported("video stream has no picture size".to_string()));
        }

        let raw_start = unsafe { (*input.as_ptr()).start_time };
        let start_seconds = conversion::container_start_seconds(raw_start);

        let duration_seconds = conversion::container_duration_seconds(input.duration())
            .or_else(|| conversion::stream_duration_seconds(stream_duration, time_base))
            .unwrap_or(f64::NAN);
        if duration_seconds == 0.0 {
            return Err(FilmstripError::EmptyInput { path: path.clone() });
        }

        let (output_width, output_height) =
            output.resolve_dimensions(natural_width, natural_height);
        let scaler = ScalingContext::get(
            decoder.format(),
            natural_width,
            natural_height,
            output.pixel_format.to_ffmpeg_pixel(),
            output_width,
            output_height,
            ScalingFlags::BILINEAR,
        )?;

        let codec = decoder
            .codec()
            .map(|codec| codec.name().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let info = VideoInfo {
            duration_seconds,
            natural_width,
            natural_height,
            codec,
        };

        log::info!(
            "Opened video: {} ({}x{}, {:.3}s, codec={})",
            path.display(),
            info.natural_width,
            info.natural_height,
            info.duration_seconds,
            info.codec,
        );

        Ok(Self {
            path,
            info,
            input,
            decoder,
            scaler,
            stream_index,
            time_base,
            start_seconds,
            pixel_format: output.pixel_format,
            output_width,
            output_height,
        })
    }

    /// Seek and rasterize the picture visible at `timestamp`.
    ///
    /// The visible picture is the last one whose PTS is not after the
    /// target. FFmpeg seeks land on the preceding keyframe, so decoding runs
    /// forward from there.
    fn seek_and_capture(&mut self, timestamp: Duration) -> Result<DynamicImage, FilmstripError> {
        let clamped = clamp_timestamp(timestamp, self.info.duration_seconds);
        // Seek positions and decoded PTS are both offset by the start time.
        let target = clamped.as_secs_f64() + self.start_seconds;
        let seek_failed = |reason: String| FilmstripError::SeekFailed { timestamp, reason };

        let seek_position =
            conversion::duration_to_seek_timestamp(Duration::from_secs_f64(target));
        self.input
            .seek(seek_position, ..seek_position)
            .map_err(|error| seek_failed(error.to_string()))?;
        self.decoder.flush();

        let Self {
            input,
            decoder,
            stream_index,
            time_base,
            ..
        } = self;

        let mut scratch = VideoFrame::empty();
        let mut visible: Option<VideoFrame> = None;
        let mut settled = false;

        'packets: for (stream, packet) in input.packets() {
            if stream.index() != *stream_index {
                continue;
            }
            decoder
                .send_packet(&packet)
                .map_err(|error| seek_failed(error.to_string()))?;

            while decoder.receive_frame(&mut scratch).is_ok() {
                if settle_on(&mut scratch, &mut visible, target, *time_base) {
                    settled = true;
                    break 'packets;
                }
            }
        }

        if !settled {
            // End of stream: the last decoded picture stays on screen.
            if decoder.send_eof().is_ok() {
                while decoder.receive_frame(&mut scratch).is_ok() {
                    if settle_on(&mut scratch, &mut visible, target, *time_base) {
                        break;
                    }
                }
            }
        }

        let picture = visible.ok_or_else(|| seek_failed("no picture decoded".to_string()))?;
        self.rasterize(&picture)
            .map_err(|error| seek_failed(error.to_string()))
    }

    fn rasterize(&mut self, picture: &VideoFrame) -> Result<DynamicImage, FilmstripError> {
        let mut converted = VideoFrame::empty();
        self.scaler.run(picture, &mut converted)?;

        let (width, height) = (self.output_width, self.output_height);
        let buffer = conversion::frame_to_buffer(
            &converted,
            width,
            height,
            self.pixel_format.bytes_per_pixel(),
        );

        let image = match self.pixel_format {
            PixelFormat::Rgb8 => {
                RgbImage::from_raw(width, height, buffer).map(DynamicImage::ImageRgb8)
            }
            PixelFormat::Rgba8 => {
                RgbaImage::from_raw(width, height, buffer).map(DynamicImage::ImageRgba8)
            }
            PixelFormat::Gray8 => {
                GrayImage::from_raw(width, height, buffer).map(DynamicImage::ImageLuma8)
            }
        };

        image.ok_or_else(|| {
            FilmstripError::FfmpegError("converted frame has an unexpected size".to_string())
        })
    }
}

/// Feed one decoded picture into the visible-frame search.
///
/// Returns `true` once `visible` holds the picture shown at `target`.
fn settle_on(
    scratch: &mut VideoFrame,
    visible: &mut Option<VideoFrame>,
    target: f64,
    time_base: Rational,
) -> bool {
    let seconds = scratch
        .timestamp()
        .or_else(|| scratch.pts())
        .map_or(target, |pts| conversion::pts_to_seconds(pts, time_base));

    if seconds > target + PTS_TOLERANCE_SECONDS && visible.is_some() {
        return true;
    }

    *visible = Some(mem::replace(scratch, VideoFrame::empty()));
    seconds + PTS_TOLERANCE_SECONDS >= target
}
