//! A scripted in-memory [`MediaSource`] for driving the sampler without FFmpeg.

#![allow(dead_code)]

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use filmstrip::{FilmstripError, MediaBlob, MediaSource, VideoHandle, VideoInfo};
use image::{DynamicImage, Rgb, RgbImage};
use tokio::sync::Notify;

/// How one scripted video behaves.
#[derive(Clone)]
pub struct Script {
    pub duration_seconds: f64,
    pub width: u32,
    pub height: u32,
    pub fail_at: Vec<Duration>,
    pub hang_at: Vec<Duration>,
    pub blank_at: Vec<Duration>,
    pub fail_everything: bool,
    pub unsupported: bool,
    pub capture_gate: Option<Arc<Notify>>,
    pub open_gate: Option<Arc<Notify>>,
}

impl Script {
    pub fn new(duration_seconds: f64) -> Self {
        Self {
            duration_seconds,
            width: 8,
            height: 6,
            fail_at: Vec::new(),
            hang_at: Vec::new(),
            blank_at: Vec::new(),
            fail_everything: false,
            unsupported: false,
            capture_gate: None,
            open_gate: None,
        }
    }

    pub fn failing_at(mut self, seconds: f64) -> Self {
        self.fail_at.push(Duration::from_secs_f64(seconds));
        self
    }

    pub fn hanging_at(mut self, seconds: f64) -> Self {
        self.hang_at.push(Duration::from_secs_f64(seconds));
        self
    }

    /// Capture a 0x0 picture at `seconds`, which no encoder accepts.
    pub fn blank_at(mut self, seconds: f64) -> Self {
        self.blank_at.push(Duration::from_secs_f64(seconds));
        self
    }

    pub fn failing_everywhere(mut self) -> Self {
        self.fail_everything = true;
        self
    }

    pub fn unsupported(mut self) -> Self {
        self.unsupported = true;
        self
    }

    /// `open` waits for one `notify_one` on `gate`.
    pub fn slow_to_open(mut self, gate: Arc<Notify>) -> Self {
        self.open_gate = Some(gate);
        self
    }

    /// Every capture waits for one `notify_one` on `gate`.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.capture_gate = Some(gate);
        self
    }
}

/// Shared record of what the sampler asked for.
#[derive(Default)]
pub struct SeekLog {
    pub seeks: Mutex<Vec<(PathBuf, Duration)>>,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub open_handles: AtomicUsize,
    pub open_attempts: AtomicUsize,
}

impl SeekLog {
    pub fn seeks_for(&self, path: &str) -> Vec<Duration> {
        self.seeks
            .lock()
            .unwrap()
            .iter()
            .filter(|(seek_path, _)| seek_path == Path::new(path))
            .map(|(_, timestamp)| *timestamp)
            .collect()
    }

    pub fn seek_count(&self) -> usize {
        self.seeks.lock().unwrap().len()
    }
}

pub struct ScriptedSource {
    scripts: HashMap<PathBuf, Script>,
    pub log: Arc<SeekLog>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self {
            scripts: HashMap::new(),
            log: Arc::new(SeekLog::default()),
        }
    }

    pub fn with_script(mut self, path: &str, script: Script) -> Self {
        self.scripts.insert(PathBuf::from(path), script);
        self
    }
}

pub struct ScriptedVideo {
    path: PathBuf,
    info: VideoInfo,
    script: Script,
    log: Arc<SeekLog>,
}

impl Drop for ScriptedVideo {
    fn drop(&mut self) {
        self.log.open_handles.fetch_sub(1, Ordering::SeqCst);
    }
}

fn same_instant(a: Duration, b: Duration) -> bool {
    a.abs_diff(b) < Duration::from_micros(500)
}

impl MediaSource for ScriptedSource {
    type Handle = ScriptedVideo;

    async fn open(&self, blob: MediaBlob) -> Result<ScriptedVideo, FilmstripError> {
        self.log.open_attempts.fetch_add(1, Ordering::SeqCst);
        let path = blob.path().to_path_buf();
        let Some(script) = self.scripts.get(&path).cloned() else {
            return Err(FilmstripError::UnsupportedMedia {
                path,
                reason: "no script".to_string(),
            });
        };
        if let Some(gate) = &script.open_gate {
            gate.notified().await;
        }
        if script.unsupported {
            return Err(FilmstripError::UnsupportedMedia {
                path,
                reason: "scripted as undecodable".to_string(),
            });
        }

        self.log.open_handles.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedVideo {
            path,
            info: VideoInfo {
                duration_seconds: script.duration_seconds,
                natural_width: script.width,
                natural_height: script.height,
                codec: "scripted".to_string(),
            },
            script,
            log: Arc::clone(&self.log),
        })
    }
}

impl VideoHandle for ScriptedVideo {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    async fn seek_and_capture(
        &mut self,
        timestamp: Duration,
    ) -> Result<DynamicImage, FilmstripError> {
        self.log
            .seeks
            .lock()
            .unwrap()
            .push((self.path.clone(), timestamp));
        let in_flight = self.log.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.log.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        // Timed-out captures are dropped mid-await.
        let _guard = InFlight(&self.log);

        self.settle(timestamp).await
    }
}

struct InFlight<'a>(&'a SeekLog);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedVideo {
    async fn settle(&self, timestamp: Duration) -> Result<DynamicImage, FilmstripError> {
        if let Some(gate) = &self.script.capture_gate {
            gate.notified().await;
        }
        if self.script.hang_at.iter().any(|&t| same_instant(t, timestamp)) {
            std::future::pending::<()>().await;
        }
        if self.script.fail_everything
            || self.script.fail_at.iter().any(|&t| same_instant(t, timestamp))
        {
            return Err(FilmstripError::SeekFailed {
                timestamp,
                reason: "scripted decode failure".to_string(),
            });
        }

        if self.script.blank_at.iter().any(|&t| same_instant(t, timestamp)) {
            return Ok(DynamicImage::ImageRgb8(RgbImage::new(0, 0)));
        }

        // Shade encodes the timestamp so frames are distinguishable.
        let shade = (timestamp.as_millis() % 256) as u8;
        Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            self.script.width,
            self.script.height,
            Rgb([shade, 0, 255 - shade]),
        )))
    }
}

pub fn secs(seconds: f64) -> Duration {
    Duration::from_secs_f64(seconds)
}

pub fn assert_close(actual: Duration, expected_seconds: f64) {
    let diff = (actual.as_secs_f64() - expected_seconds).abs();
    assert!(
        diff < 1e-6,
        "expected {expected_seconds}s, got {:?}",
        actual
    );
}
