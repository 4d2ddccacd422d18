//! Progress reporting and cancellation support.
//!
//! [`ProgressCallback`] observes a sampling run, [`ProgressInfo`] is the
//! snapshot it receives, and [`CancellationToken`] lets a run be stopped
//! cooperatively between two captures.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use filmstrip::{ProgressCallback, ProgressInfo, SamplerOptions};
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         if let Some(pct) = info.percentage {
//!             println!("{pct:.1}% sampled, {} skipped", info.skipped);
//!         }
//!     }
//! }
//!
//! let options = SamplerOptions::new().with_progress(Arc::new(PrintProgress));
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, Instant};

/// A snapshot of sampling progress.
///
/// Delivered to [`ProgressCallback::on_progress`] every
/// [`batch_size`](crate::SamplerOptions::with_batch_size) timestamps.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Generation identifier of the run being reported.
    pub generation: u64,
    /// Timestamps processed so far, captured or skipped.
    pub current: u64,
    /// Total timestamps in the schedule.
    pub total: Option<u64>,
    /// Completion percentage (0.0 – 100.0), if `total` is known.
    pub percentage: Option<f32>,
    /// Timestamps skipped after a failed seek.
    pub skipped: u64,
    /// Wall-clock time elapsed since sampling started.
    pub elapsed: Duration,
    /// Estimated time remaining, based on current throughput.
    pub estimated_remaining: Option<Duration>,
    /// Index of the frame most recently appended.
    pub current_frame: Option<u64>,
    /// Timestamp most recently processed.
    pub current_timestamp: Option<Duration>,
}

/// Trait for receiving progress updates during sampling.
///
/// Callbacks are infallible: they observe but cannot halt a run. Use
/// [`FrameSampler::cancel`](crate::FrameSampler::cancel) to stop one.
pub trait ProgressCallback: Send + Sync {
    /// Called at regular intervals while a run is sampling.
    fn on_progress(&self, info: &ProgressInfo);
}

/// Discards all notifications. The default when nothing is configured.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Cooperative cancellation token backed by an [`AtomicBool`].
///
/// Every run owns one. Starting a new run cancels the previous token, and
/// the sampling loop checks it before each seek.
///
/// # Example
///
/// ```
/// use filmstrip::CancellationToken;
///
/// let token = CancellationToken::new();
/// let observer = token.clone();
/// token.cancel();
/// assert!(observer.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new, non-cancelled token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation. All clones observe it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks timing for one run and emits callbacks in batches.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    generation: u64,
    total: Option<u64>,
    current: u64,
    skipped: u64,
    batch_size: u64,
    start_time: Instant,
    items_since_last_report: u64,
    last_frame: Option<u64>,
    last_timestamp: Option<Duration>,
}

impl ProgressTracker {
    pub(crate) fn new(
        callback: Arc<dyn ProgressCallback>,
        generation: u64,
        total: Option<u64>,
        batch_size: u64,
    ) -> Self {
        Self {
            callback,
            generation,
            total,
            current: 0,
            skipped: 0,
            batch_size: batch_size.max(1),
            start_time: Instant::now(),
            items_since_last_report: 0,
            last_frame: None,
            last_timestamp: None,
        }
    }

    /// Record a captured timestamp.
    pub(crate) fn captured(&mut self, frame_index: u64, timestamp: Duration) {
        self.last_frame = Some(frame_index);
        self.advance(timestamp);
    }

    /// Record a skipped timestamp.
    pub(crate) fn skipped(&mut self, timestamp: Duration) {
        self.skipped += 1;
        self.advance(timestamp);
    }

    /// Emit a final report unless the last batch already covered it.
    pub(crate) fn finish(&mut self) {
        if self.items_since_last_report > 0 {
            self.report();
            self.items_since_last_report = 0;
        }
    }

    fn advance(&mut self, timestamp: Duration) {
        self.current += 1;
        self.items_since_last_report += 1;
        self.last_timestamp = Some(timestamp);

        if self.items_since_last_report >= self.batch_size {
            self.report();
            self.items_since_last_report = 0;
        }
    }

    fn report(&self) {
        let elapsed = self.start_time.elapsed();

        let percentage = self
            .total
            .filter(|&t| t > 0)
            .map(|t| (self.current as f32 / t as f32) * 100.0);

        let estimated_remaining = if self.current > 0 {
            self.total.map(|t| {
                let remaining = t.saturating_sub(self.current);
                elapsed.mul_f64(remaining as f64 / self.current as f64)
            })
        } else {
            None
        };

        self.callback.on_progress(&ProgressInfo {
            generation: self.generation,
            current: self.current,
            total: self.total,
            percentage,
            skipped: self.skipped,
            elapsed,
            estimated_remaining,
            current_frame: self.last_frame,
            current_timestamp: self.last_timestamp,
        });
    }
}
