//! FrameSampler state machine tests against a scripted source.

mod common;

use std::{
    sync::{Arc, Mutex, atomic::Ordering},
    time::Duration,
};

use common::{Script, ScriptedSource, assert_close, secs};
use filmstrip::{
    FilmstripError, FrameSampler, ImageEncoding, MediaBlob, ProgressCallback, ProgressInfo,
    SamplerOptions, SamplerState,
};
use tokio::{sync::Notify, task::LocalSet};
use tokio_stream::StreamExt;

fn blob(path: &str) -> MediaBlob {
    MediaBlob::from_path(path)
}

/// Yield until the scripted source has seen at least `count` seeks.
async fn wait_for_seeks(source_log: &common::SeekLog, count: usize) {
    for _ in 0..1_000 {
        if source_log.seek_count() >= count {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("sampler never reached seek #{count}");
}

/// Yield until the scripted source has been asked to open `count` blobs.
async fn wait_for_opens(source_log: &common::SeekLog, count: usize) {
    for _ in 0..1_000 {
        if source_log.open_attempts.load(Ordering::SeqCst) >= count {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("sampler never reached open #{count}");
}

// ── Happy path ───────────────────────────────────────────────────

#[tokio::test]
async fn two_second_video_yields_fifty_ordered_frames() {
    let source = ScriptedSource::new().with_script("clip.mp4", Script::new(2.0));
    let log = Arc::clone(&source.log);
    let sampler = FrameSampler::new(source, SamplerOptions::new().with_fps(25));

    let summary = sampler.start(blob("clip.mp4")).await.expect("run");

    assert_eq!(summary.attempted, 50);
    assert_eq!(summary.captured, 50);
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.generation, 1);

    let frames = sampler.frames();
    assert_eq!(frames.len(), 50);
    for (position, frame) in frames.iter().enumerate() {
        assert_eq!(frame.index(), position as u64);
        assert_close(frame.timestamp(), position as f64 * 0.04);
        assert_eq!(frame.width(), 8);
        assert_eq!(frame.height(), 6);
    }
    assert!(frames.last().unwrap().timestamp() < secs(2.0));

    assert_eq!(sampler.state(), SamplerState::Done);
    assert_eq!(log.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(log.open_handles.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn single_sample_video_yields_one_frame_at_zero() {
    let source = ScriptedSource::new().with_script("tiny.mp4", Script::new(0.04));
    let sampler = FrameSampler::new(source, SamplerOptions::new().with_fps(25));

    let summary = sampler.start(blob("tiny.mp4")).await.expect("run");

    assert_eq!(summary.captured, 1);
    let frames = sampler.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].timestamp(), Duration::ZERO);
}

#[tokio::test]
async fn frames_are_png_by_default_and_decode_back() {
    let source = ScriptedSource::new().with_script("clip.mp4", Script::new(0.1));
    let sampler = FrameSampler::new(source, SamplerOptions::new().with_fps(10));

    sampler.start(blob("clip.mp4")).await.expect("run");

    let frame = &sampler.frames()[0];
    assert_eq!(frame.encoding(), ImageEncoding::Png);
    assert!(frame.image_data().starts_with(&[0x89, b'P', b'N', b'G']));
    let decoded = frame.to_image().expect("decode");
    assert_eq!((decoded.width(), decoded.height()), (8, 6));
}

#[tokio::test]
async fn jpeg_encoding_is_honoured() {
    let source = ScriptedSource::new().with_script("clip.mp4", Script::new(0.1));
    let options = SamplerOptions::new()
        .with_fps(10)
        .with_image_encoding(ImageEncoding::Jpeg { quality: 70 });
    let sampler = FrameSampler::new(source, options);

    sampler.start(blob("clip.mp4")).await.expect("run");

    let frame = &sampler.frames()[0];
    assert_eq!(frame.encoding().media_type(), "image/jpeg");
    assert!(frame.image_data().starts_with(&[0xFF, 0xD8]));
}

// ── Skipped timestamps ───────────────────────────────────────────

#[tokio::test]
async fn failed_seek_is_skipped_and_indices_stay_contiguous() {
    let source =
        ScriptedSource::new().with_script("clip.mp4", Script::new(1.0).failing_at(0.5));
    let sampler = FrameSampler::new(source, SamplerOptions::new().with_fps(10));

    let summary = sampler.start(blob("clip.mp4")).await.expect("run");

    assert_eq!(summary.attempted, 10);
    assert_eq!(summary.captured, 9);
    assert_eq!(summary.skipped, 1);

    let frames = sampler.frames();
    assert_eq!(frames.len(), 9);
    for (position, frame) in frames.iter().enumerate() {
        assert_eq!(frame.index(), position as u64);
    }
    assert_close(frames[4].timestamp(), 0.4);
    assert_close(frames[5].timestamp(), 0.6);

    let status = sampler.status();
    assert_eq!(status.state, SamplerState::Done);
    assert_eq!(status.skipped, 1);
    assert_eq!(status.frames, 9);
}

#[tokio::test]
async fn unencodable_picture_is_skipped() {
    let source = ScriptedSource::new().with_script("clip.mp4", Script::new(0.5).blank_at(0.1));
    let sampler = FrameSampler::new(source, SamplerOptions::new().with_fps(10));

    let summary = sampler.start(blob("clip.mp4")).await.expect("run");

    assert_eq!(summary.captured, 4);
    assert_eq!(summary.skipped, 1);
    let frames = sampler.frames();
    let indices: Vec<u64> = frames.iter().map(|frame| frame.index()).collect();
    assert_eq!(indices, vec![0, 1, 2, 3]);
    assert_close(frames[1].timestamp(), 0.2);
    assert_eq!(sampler.state(), SamplerState::Done);
}

#[tokio::test]
async fn stalled_seek_times_out_and_is_skipped() {
    let source =
        ScriptedSource::new().with_script("clip.mp4", Script::new(0.3).hanging_at(0.1));
    let log = Arc::clone(&source.log);
    let options = SamplerOptions::new()
        .with_fps(10)
        .with_seek_timeout(Duration::from_millis(50));
    let sampler = FrameSampler::new(source, options);

    let summary = sampler.start(blob("clip.mp4")).await.expect("run");

    assert_eq!(summary.captured, 2);
    assert_eq!(summary.skipped, 1);
    let frames = sampler.frames();
    assert_close(frames[0].timestamp(), 0.0);
    assert_close(frames[1].timestamp(), 0.2);
    assert_eq!(frames[1].index(), 1);
    assert_eq!(log.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn every_seek_failing_aborts_the_run() {
    let source =
        ScriptedSource::new().with_script("broken.mp4", Script::new(0.5).failing_everywhere());
    let sampler = FrameSampler::new(source, SamplerOptions::new().with_fps(10));

    let error = sampler.start(blob("broken.mp4")).await.unwrap_err();

    assert!(matches!(error, FilmstripError::AllSeeksFailed { attempted: 5 }));
    assert!(sampler.frames().is_empty());
    let status = sampler.status();
    assert_eq!(status.state, SamplerState::Aborted);
    assert_eq!(status.skipped, 5);
    assert!(status.failure.is_some());
}

// ── Run-level failures ───────────────────────────────────────────

#[tokio::test]
async fn undecodable_blob_aborts_with_empty_store() {
    let source =
        ScriptedSource::new().with_script("notes.mp4", Script::new(1.0).unsupported());
    let log = Arc::clone(&source.log);
    let sampler = FrameSampler::new(source, SamplerOptions::new());

    let error = sampler.start(blob("notes.mp4")).await.unwrap_err();

    assert!(matches!(error, FilmstripError::UnsupportedMedia { .. }));
    assert!(!error.is_recoverable());
    assert_eq!(sampler.frame_count(), 0);
    assert_eq!(sampler.state(), SamplerState::Aborted);
    assert_eq!(log.seek_count(), 0);
}

#[tokio::test]
async fn unknown_duration_aborts_without_seeking() {
    let source = ScriptedSource::new().with_script("live.mp4", Script::new(f64::NAN));
    let log = Arc::clone(&source.log);
    let sampler = FrameSampler::new(source, SamplerOptions::new());

    let error = sampler.start(blob("live.mp4")).await.unwrap_err();

    assert!(matches!(error, FilmstripError::DurationUnavailable(_)));
    assert_eq!(sampler.state(), SamplerState::Aborted);
    assert_eq!(log.seek_count(), 0);
    assert_eq!(log.open_handles.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn zero_duration_is_empty_input() {
    let source = ScriptedSource::new().with_script("blank.mp4", Script::new(0.0));
    let log = Arc::clone(&source.log);
    let sampler = FrameSampler::new(source, SamplerOptions::new());

    let error = sampler.start(blob("blank.mp4")).await.unwrap_err();

    assert!(matches!(error, FilmstripError::EmptyInput { .. }));
    assert_eq!(sampler.state(), SamplerState::Aborted);
    assert_eq!(log.seek_count(), 0);
}

#[tokio::test]
async fn zero_fps_is_rejected() {
    let source = ScriptedSource::new().with_script("clip.mp4", Script::new(1.0));
    let sampler = FrameSampler::new(source, SamplerOptions::new().with_fps(0));

    let error = sampler.start(blob("clip.mp4")).await.unwrap_err();

    assert!(matches!(error, FilmstripError::InvalidSampleRate));
    assert_eq!(sampler.state(), SamplerState::Aborted);
}

// ── Selection and restart ────────────────────────────────────────

#[tokio::test]
async fn start_resets_store_and_enters_loading_immediately() {
    let source = ScriptedSource::new()
        .with_script("first.mp4", Script::new(0.4))
        .with_script("second.mp4", Script::new(0.2));
    let sampler = FrameSampler::new(source, SamplerOptions::new().with_fps(10));

    sampler.start(blob("first.mp4")).await.expect("first run");
    assert_eq!(sampler.frame_count(), 4);

    let second = sampler.start(blob("second.mp4"));
    assert_eq!(sampler.frame_count(), 0);
    assert_eq!(sampler.state(), SamplerState::Loading);
    assert_eq!(sampler.generation(), 2);
    assert_eq!(
        sampler.selection().map(|selected| selected.path().to_path_buf()),
        Some("second.mp4".into())
    );

    let summary = second.await.expect("second run");
    assert_eq!(summary.generation, 2);
    assert_eq!(sampler.frame_count(), 2);
}

#[tokio::test]
async fn newer_selection_supersedes_running_run() {
    let gate = Arc::new(Notify::new());
    let source = ScriptedSource::new()
        .with_script("first.mp4", Script::new(1.0).gated(Arc::clone(&gate)))
        .with_script("second.mp4", Script::new(0.2));
    let log = Arc::clone(&source.log);
    let sampler = FrameSampler::new(source, SamplerOptions::new().with_fps(10));

    LocalSet::new()
        .run_until(async {
            let first = tokio::task::spawn_local(sampler.start(blob("first.mp4")));
            wait_for_seeks(&log, 1).await;

            let summary = sampler.start(blob("second.mp4")).await.expect("second run");
            assert_eq!(summary.captured, 2);

            // Let the stale capture complete; its result must be discarded.
            gate.notify_one();
            let stale = first.await.expect("join");
            assert!(matches!(
                stale,
                Err(FilmstripError::Superseded { generation: 1 })
            ));
            assert!(stale.unwrap_err().is_interruption());
        })
        .await;

    let frames = sampler.frames();
    assert_eq!(frames.len(), 2);
    assert_close(frames[1].timestamp(), 0.1);
    assert_eq!(log.seeks_for("first.mp4").len(), 1);

    let status = sampler.status();
    assert_eq!(status.generation, 2);
    assert_eq!(status.state, SamplerState::Done);
    assert_eq!(log.open_handles.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn newer_selection_supersedes_loading_run() {
    let gate = Arc::new(Notify::new());
    let source = ScriptedSource::new()
        .with_script("first.mp4", Script::new(1.0).slow_to_open(Arc::clone(&gate)))
        .with_script("second.mp4", Script::new(0.3));
    let log = Arc::clone(&source.log);
    let sampler = FrameSampler::new(source, SamplerOptions::new().with_fps(10));

    LocalSet::new()
        .run_until(async {
            let first = tokio::task::spawn_local(sampler.start(blob("first.mp4")));
            wait_for_opens(&log, 1).await;
            assert_eq!(sampler.state(), SamplerState::Loading);

            sampler.start(blob("second.mp4")).await.expect("second run");

            gate.notify_one();
            let stale = first.await.expect("join");
            assert!(matches!(
                stale,
                Err(FilmstripError::Superseded { generation: 1 })
            ));
        })
        .await;

    assert!(log.seeks_for("first.mp4").is_empty());
    assert_eq!(sampler.frame_count(), 3);
    assert_eq!(sampler.state(), SamplerState::Done);
    assert_eq!(log.open_handles.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_open_of_replaced_run_reports_supersession() {
    let gate = Arc::new(Notify::new());
    let source = ScriptedSource::new()
        .with_script(
            "slow_bad.mp4",
            Script::new(1.0).unsupported().slow_to_open(Arc::clone(&gate)),
        )
        .with_script("good.mp4", Script::new(0.2));
    let log = Arc::clone(&source.log);
    let sampler = FrameSampler::new(source, SamplerOptions::new().with_fps(10));

    LocalSet::new()
        .run_until(async {
            let first = tokio::task::spawn_local(sampler.start(blob("slow_bad.mp4")));
            wait_for_opens(&log, 1).await;

            sampler.start(blob("good.mp4")).await.expect("second run");

            gate.notify_one();
            let stale = first.await.expect("join");
            assert!(matches!(
                stale,
                Err(FilmstripError::Superseded { generation: 1 })
            ));
        })
        .await;

    let status = sampler.status();
    assert_eq!(status.generation, 2);
    assert_eq!(status.state, SamplerState::Done);
    assert!(status.failure.is_none());
}

#[tokio::test]
async fn cancel_stops_before_the_next_seek() {
    let gate = Arc::new(Notify::new());
    let source = ScriptedSource::new()
        .with_script("clip.mp4", Script::new(1.0).gated(Arc::clone(&gate)));
    let log = Arc::clone(&source.log);
    let sampler = FrameSampler::new(source, SamplerOptions::new().with_fps(10));

    LocalSet::new()
        .run_until(async {
            let run = tokio::task::spawn_local(sampler.start(blob("clip.mp4")));
            wait_for_seeks(&log, 1).await;

            sampler.cancel();
            gate.notify_one();

            let result = run.await.expect("join");
            assert!(matches!(result, Err(FilmstripError::Cancelled)));
        })
        .await;

    assert_eq!(log.seek_count(), 1);
    let status = sampler.status();
    assert_eq!(status.state, SamplerState::Aborted);
    assert_eq!(status.failure.as_deref(), Some("Operation cancelled"));
}

// ── Observation ──────────────────────────────────────────────────

#[tokio::test]
async fn updates_stream_reaches_terminal_state() {
    let source = ScriptedSource::new().with_script("clip.mp4", Script::new(0.5));
    let sampler = FrameSampler::new(source, SamplerOptions::new().with_fps(10));
    let mut updates = sampler.updates();

    let initial = updates.next().await.expect("initial status");
    assert_eq!(initial.state, SamplerState::Idle);
    assert_eq!(initial.generation, 0);

    let (result, terminal) = tokio::join!(sampler.start(blob("clip.mp4")), async {
        while let Some(status) = updates.next().await {
            if status.state.is_terminal() {
                return Some(status);
            }
        }
        None
    });

    let summary = result.expect("run");
    let terminal = terminal.expect("terminal status");
    assert_eq!(terminal.state, SamplerState::Done);
    assert_eq!(terminal.frames, 5);
    assert_eq!(terminal.frames, summary.captured);
    assert_eq!(terminal.generation, 1);
}

#[tokio::test]
async fn frames_are_visible_while_sampling() {
    let gate = Arc::new(Notify::new());
    let source = ScriptedSource::new()
        .with_script("clip.mp4", Script::new(0.3).gated(Arc::clone(&gate)));
    let log = Arc::clone(&source.log);
    let sampler = FrameSampler::new(source, SamplerOptions::new().with_fps(10));

    LocalSet::new()
        .run_until(async {
            let run = tokio::task::spawn_local(sampler.start(blob("clip.mp4")));

            wait_for_seeks(&log, 1).await;
            assert_eq!(sampler.state(), SamplerState::Sampling);
            assert_eq!(sampler.frame_count(), 0);

            gate.notify_one();
            wait_for_seeks(&log, 2).await;
            let partial = sampler.frames();
            assert_eq!(partial.len(), 1);
            assert_eq!(partial[0].index(), 0);

            gate.notify_one();
            wait_for_seeks(&log, 3).await;
            gate.notify_one();

            run.await.expect("join").expect("run");
        })
        .await;

    assert_eq!(sampler.frame_count(), 3);
}

#[derive(Default)]
struct RecordingProgress {
    reports: Mutex<Vec<ProgressInfo>>,
}

impl ProgressCallback for RecordingProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        self.reports.lock().unwrap().push(info.clone());
    }
}

#[tokio::test]
async fn progress_reports_count_skips() {
    let recorder = Arc::new(RecordingProgress::default());
    let source =
        ScriptedSource::new().with_script("clip.mp4", Script::new(0.4).failing_at(0.2));
    let options = SamplerOptions::new()
        .with_fps(10)
        .with_progress(Arc::clone(&recorder) as Arc<dyn ProgressCallback>);
    let sampler = FrameSampler::new(source, options);

    sampler.start(blob("clip.mp4")).await.expect("run");

    let reports = recorder.reports.lock().unwrap();
    // One per timestamp; the last batch already covers the final state.
    assert_eq!(reports.len(), 4);
    let last = reports.last().unwrap();
    assert_eq!(last.generation, 1);
    assert_eq!(last.current, 4);
    assert_eq!(last.total, Some(4));
    assert_eq!(last.skipped, 1);
    assert_eq!(last.current_frame, Some(2));
    assert!((last.percentage.unwrap() - 100.0).abs() < f32::EPSILON);
}
