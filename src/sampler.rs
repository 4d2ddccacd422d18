//! The frame-sampling state machine.
//!
//! A [`FrameSampler`] owns the [`FrameStore`] of the active run and drives a
//! [`MediaSource`] through the run's [`SampleSchedule`] one seek at a time:
//!
//! ```text
//! Idle ──start──▶ Loading ──open ok──▶ Sampling ──last timestamp──▶ Done
//!                    │                     │
//!                    └──── failure ────────┴──▶ Aborted
//! ```
//!
//! Every call to [`start`](FrameSampler::start) begins a new run with a fresh
//! generation identifier, resets the store, and cancels the previous run.
//! A superseded run notices the generation change at its next suspension
//! point, drops whatever capture was in flight, releases its video handle and
//! resolves to [`FilmstripError::Superseded`] without touching shared state.
//!
//! The run future is meant for a single cooperative thread: await it
//! directly, or hand it to `tokio::task::spawn_local`. It never issues a seek
//! before the previous capture has been appended or skipped.
//!
//! # Example
//!
//! ```no_run
//! use filmstrip::{FfmpegSource, FrameSampler, MediaBlob, SamplerOptions};
//!
//! # async fn example() -> Result<(), filmstrip::FilmstripError> {
//! let sampler = FrameSampler::new(FfmpegSource::new(), SamplerOptions::new());
//! let summary = sampler.start(MediaBlob::from_path("input.mp4")).await?;
//! for frame in sampler.frames() {
//!     println!("#{} at {:?}: {} bytes", frame.index(), frame.timestamp(), frame.image_data().len());
//! }
//! println!("{} captured, {} skipped", summary.captured, summary.skipped);
//! # Ok(())
//! # }
//! ```

use std::{
    fmt,
    future::Future,
    mem,
    pin::Pin,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
        atomic::{AtomicU64, Ordering},
    },
    task::{Context, Poll},
    time::{Duration, Instant},
};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::{
    configuration::SamplerOptions,
    error::FilmstripError,
    frame::Frame,
    progress::{CancellationToken, ProgressTracker},
    schedule::SampleSchedule,
    selection::MediaBlob,
    source::{MediaSource, VideoHandle, VideoInfo},
    store::FrameStore,
};

/// Lifecycle of the sampler's current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SamplerState {
    /// No run has been started.
    #[default]
    Idle,
    /// The video is being opened.
    Loading,
    /// Timestamps are being captured.
    Sampling,
    /// Every timestamp has been visited.
    Done,
    /// The run failed or was cancelled.
    Aborted,
}

impl SamplerState {
    /// Returns `true` for [`Done`](SamplerState::Done) and
    /// [`Aborted`](SamplerState::Aborted).
    pub fn is_terminal(self) -> bool {
        matches!(self, SamplerState::Done | SamplerState::Aborted)
    }
}

impl fmt::Display for SamplerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SamplerState::Idle => "idle",
            SamplerState::Loading => "loading",
            SamplerState::Sampling => "sampling",
            SamplerState::Done => "done",
            SamplerState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// What the presentation layer sees of the current run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunStatus {
    /// Generation identifier of the run. Zero before the first run.
    pub generation: u64,
    /// Current state.
    pub state: SamplerState,
    /// Frames appended so far.
    pub frames: u64,
    /// Timestamps skipped after a failed seek.
    pub skipped: u64,
    /// Message of the run-level failure, once the run is aborted.
    pub failure: Option<String>,
}

/// Outcome of a run that reached [`SamplerState::Done`].
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Generation identifier of the run.
    pub generation: u64,
    /// Metadata of the sampled video.
    pub info: VideoInfo,
    /// Timestamps in the schedule.
    pub attempted: u64,
    /// Frames appended to the store.
    pub captured: u64,
    /// Timestamps skipped after a failed seek.
    pub skipped: u64,
    /// Time spent sampling, excluding the open.
    pub elapsed: Duration,
}

/// State shared between the sampler, its runs, and observers.
struct SharedRun {
    generation: AtomicU64,
    store: RwLock<FrameStore>,
    selection: RwLock<Option<MediaBlob>>,
    cancellation: Mutex<CancellationToken>,
    status: watch::Sender<RunStatus>,
}

impl SharedRun {
    fn new() -> Self {
        let (status, _) = watch::channel(RunStatus::default());
        Self {
            generation: AtomicU64::new(0),
            store: RwLock::new(FrameStore::new()),
            selection: RwLock::new(None),
            cancellation: Mutex::new(CancellationToken::new()),
            status,
        }
    }

    /// Enter `Loading` for a new selection and return its generation.
    fn begin(&self, blob: MediaBlob, token: CancellationToken) -> u64 {
        let mut store = write(&self.store);
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        store.reset();

        mem::replace(&mut *lock(&self.cancellation), token).cancel();
        *write(&self.selection) = Some(blob);
        self.status.send_replace(RunStatus {
            generation,
            state: SamplerState::Loading,
            ..RunStatus::default()
        });
        generation
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation
    }

    /// Append `frame` if `generation` is still current.
    ///
    /// Returns `Ok(false)` when the run has been superseded; the frame is
    /// dropped.
    fn append_if_current(&self, generation: u64, frame: Frame) -> Result<bool, FilmstripError> {
        let mut store = write(&self.store);
        if !self.is_current(generation) {
            return Ok(false);
        }
        store.append(frame)?;
        let frames = store.len() as u64;
        self.update_status(generation, |status| status.frames = frames);
        Ok(true)
    }

    /// Apply `change` to the published status if it belongs to `generation`.
    fn update_status(&self, generation: u64, change: impl FnOnce(&mut RunStatus)) {
        self.status.send_if_modified(|status| {
            if status.generation != generation {
                return false;
            }
            change(status);
            true
        });
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Samples one video at a time into a shared [`FrameStore`].
pub struct FrameSampler<S> {
    source: Arc<S>,
    options: SamplerOptions,
    shared: Arc<SharedRun>,
}

impl<S> Clone for FrameSampler<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            options: self.options.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: MediaSource> FrameSampler<S> {
    /// Create an idle sampler.
    pub fn new(source: S, options: SamplerOptions) -> Self {
        Self {
            source: Arc::new(source),
            options,
            shared: Arc::new(SharedRun::new()),
        }
    }

    /// The options every run uses.
    pub fn options(&self) -> &SamplerOptions {
        &self.options
    }

    /// Start a run for `blob`, superseding any run in progress.
    ///
    /// The store is reset and the state becomes
    /// [`Loading`](SamplerState::Loading) before this method returns; the
    /// returned future performs the actual open and sampling.
    ///
    /// # Errors
    ///
    /// The future resolves to:
    ///
    /// - [`FilmstripError::InvalidSampleRate`] if `fps` is zero.
    /// - [`FilmstripError::UnsupportedMedia`] or
    ///   [`FilmstripError::EmptyInput`] if the source cannot open the blob.
    /// - [`FilmstripError::DurationUnavailable`] if the duration is not
    ///   finite.
    /// - [`FilmstripError::AllSeeksFailed`] if no timestamp could be captured.
    /// - [`FilmstripError::Superseded`] if another run started meanwhile.
    /// - [`FilmstripError::Cancelled`] after [`cancel`](FrameSampler::cancel).
    pub fn start(
        &self,
        blob: MediaBlob,
    ) -> impl Future<Output = Result<RunSummary, FilmstripError>> + use<S> {
        let token = CancellationToken::new();
        let generation = self.shared.begin(blob.clone(), token.clone());
        log::debug!("Run {generation}: selected {blob}");

        let run = Run {
            source: Arc::clone(&self.source),
            shared: Arc::clone(&self.shared),
            options: self.options.clone(),
            generation,
            token,
        };
        run.execute(blob)
    }

    /// Cancel the current run. It stops before its next seek.
    pub fn cancel(&self) {
        lock(&self.shared.cancellation).cancel();
    }

    /// Ordered frames captured so far by the current run.
    pub fn frames(&self) -> Vec<Arc<Frame>> {
        read(&self.shared.store).snapshot()
    }

    /// Number of frames captured so far by the current run.
    pub fn frame_count(&self) -> usize {
        read(&self.shared.store).len()
    }

    /// The latest published status.
    pub fn status(&self) -> RunStatus {
        self.shared.status.borrow().clone()
    }

    /// The current run's state.
    pub fn state(&self) -> SamplerState {
        self.shared.status.borrow().state
    }

    /// Generation identifier of the current run.
    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::Acquire)
    }

    /// The most recent accepted selection, for preview playback.
    pub fn selection(&self) -> Option<MediaBlob> {
        read(&self.shared.selection).clone()
    }

    /// Stream of status changes, starting with the current status.
    pub fn updates(&self) -> RunUpdates {
        RunUpdates {
            inner: WatchStream::new(self.shared.status.subscribe()),
        }
    }
}

/// Status changes published by a [`FrameSampler`].
///
/// Intermediate values may be coalesced when the consumer falls behind; the
/// latest status is always delivered. The stream never ends on its own.
pub struct RunUpdates {
    inner: WatchStream<RunStatus>,
}

impl Stream for RunUpdates {
    type Item = RunStatus;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Everything one run needs, detached from the sampler's borrow.
struct Run<S> {
    source: Arc<S>,
    shared: Arc<SharedRun>,
    options: SamplerOptions,
    generation: u64,
    token: CancellationToken,
}

impl<S: MediaSource> Run<S> {
    async fn execute(self, blob: MediaBlob) -> Result<RunSummary, FilmstripError> {
        let result = self.sample(blob).await;

        match &result {
            Ok(summary) => {
                log::info!(
                    "Run {}: done, {} frames captured, {} skipped in {:.2}s",
                    self.generation,
                    summary.captured,
                    summary.skipped,
                    summary.elapsed.as_secs_f64(),
                );
                self.shared.update_status(self.generation, |status| {
                    status.state = SamplerState::Done;
                });
            }
            Err(FilmstripError::Superseded { .. }) => {
                log::debug!("Run {}: superseded, results discarded", self.generation);
            }
            Err(error) => {
                log::warn!("Run {}: aborted: {error}", self.generation);
                let failure = error.to_string();
                self.shared.update_status(self.generation, |status| {
                    status.state = SamplerState::Aborted;
                    status.failure = Some(failure);
                });
            }
        }

        result
    }

    async fn sample(&self, blob: MediaBlob) -> Result<RunSummary, FilmstripError> {
        if self.options.fps == 0 {
            return Err(FilmstripError::InvalidSampleRate);
        }

        let path = blob.path().to_path_buf();
        let opened = self.source.open(blob).await;
        // A stale run reports supersession even when its open failed.
        self.ensure_current()?;
        let mut video = opened?;

        let info = video.info().clone();
        if info.duration_seconds == 0.0 {
            return Err(FilmstripError::EmptyInput { path });
        }
        let schedule = SampleSchedule::new(info.duration_seconds, self.options.fps)?;
        log::debug!(
            "Run {}: sampling {} timestamps at {} fps over {:.3}s",
            self.generation,
            schedule.len(),
            schedule.fps(),
            info.duration_seconds,
        );
        self.shared.update_status(self.generation, |status| {
            status.state = SamplerState::Sampling;
        });

        let mut tracker = ProgressTracker::new(
            Arc::clone(&self.options.progress),
            self.generation,
            Some(schedule.len()),
            self.options.batch_size,
        );
        let started = Instant::now();
        let mut captured = 0_u64;
        let mut skipped = 0_u64;

        for timestamp in schedule.timestamps() {
            self.ensure_current()?;

            let outcome = self.capture(&mut video, timestamp).await;
            self.ensure_current()?;

            let encoded = outcome.and_then(|picture| {
                Frame::encode(captured, timestamp, &picture, self.options.image_encoding)
            });
            match encoded {
                Ok(frame) => {
                    if !self.shared.append_if_current(self.generation, frame)? {
                        return Err(self.superseded());
                    }
                    tracker.captured(captured, timestamp);
                    captured += 1;
                }
                Err(error) if error.is_recoverable() => {
                    log::warn!("Run {}: skipping {timestamp:?}: {error}", self.generation);
                    skipped += 1;
                    self.shared
                        .update_status(self.generation, |status| status.skipped = skipped);
                    tracker.skipped(timestamp);
                }
                Err(error) => return Err(error),
            }
        }

        tracker.finish();

        if captured == 0 {
            return Err(FilmstripError::AllSeeksFailed {
                attempted: schedule.len(),
            });
        }

        Ok(RunSummary {
            generation: self.generation,
            info,
            attempted: schedule.len(),
            captured,
            skipped,
            elapsed: started.elapsed(),
        })
    }

    /// One seek-and-capture, bounded by the configured timeout.
    async fn capture(
        &self,
        video: &mut S::Handle,
        timestamp: Duration,
    ) -> Result<image::DynamicImage, FilmstripError> {
        let limit = self.options.seek_timeout;
        tokio::time::timeout(limit, video.seek_and_capture(timestamp))
            .await
            .unwrap_or_else(|_| {
                Err(FilmstripError::SeekFailed {
                    timestamp,
                    reason: format!("no completion within {limit:?}"),
                })
            })
    }

    fn ensure_current(&self) -> Result<(), FilmstripError> {
        if !self.shared.is_current(self.generation) {
            return Err(self.superseded());
        }
        if self.token.is_cancelled() {
            return Err(FilmstripError::Cancelled);
        }
        Ok(())
    }

    fn superseded(&self) -> FilmstripError {
        FilmstripError::Superseded {
            generation: self.generation,
        }
    }
}
