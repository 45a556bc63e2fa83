//! Capture loop tests against a bare request channel.

mod common;

use std::time::{Duration, Instant};

use common::{RecordingObserver, ScriptedSource};
use frameflow::{
    CancellationToken, ExtractionSettings, FrameFlowError, PipelineOptions, RunState,
    StageRequest, run_capture,
};
use tokio::sync::mpsc;

fn drain(receiver: &mut mpsc::Receiver<StageRequest>) -> Vec<StageRequest> {
    let mut requests = Vec::new();
    while let Ok(request) = receiver.try_recv() {
        requests.push(request);
    }
    requests
}

fn frame_ids(requests: &[StageRequest]) -> Vec<u64> {
    requests
        .iter()
        .filter_map(|request| match request {
            StageRequest::ProcessFrame { snapshot, .. } => Some(snapshot.id()),
            _ => None,
        })
        .collect()
}

// ── Dispatch ───────────────────────────────────────────────────────

#[tokio::test]
async fn dispatches_every_planned_frame_then_flushes() {
    let options = PipelineOptions::new();
    let run = RunState::new(options.cancellation().clone());
    let (sender, mut receiver) = mpsc::channel(64);
    let status = RecordingObserver::default();
    let mut source = ScriptedSource::seconds(5);
    let settings = ExtractionSettings::for_duration(Duration::from_secs(5)).with_rate(2.0);

    let summary = run_capture(&mut source, &settings, &options, &run, &sender, &status)
        .await
        .unwrap();

    assert_eq!(summary.planned, 11);
    assert_eq!(summary.dispatched, 11);
    let requests = drain(&mut receiver);
    assert_eq!(frame_ids(&requests), (1..=11).collect::<Vec<_>>());
    assert_eq!(requests.last().map(StageRequest::kind), Some("flush-request"));
    assert_eq!(run.total_planned(), 11);
    assert!(!run.is_running());
    assert!(status.saw_status("Processing: 1 / 11"));
    assert!(status.saw_status("Processing: 11 / 11"));
}

#[tokio::test]
async fn snapshots_carry_quality_and_format() {
    let options = PipelineOptions::new();
    let run = RunState::default();
    let (sender, mut receiver) = mpsc::channel(8);
    let status = RecordingObserver::default();
    let mut source = ScriptedSource::seconds(1);
    let settings = ExtractionSettings::for_duration(Duration::from_secs(1))
        .with_quality(0.3)
        .with_format(frameflow::ImageFormat::Png);

    run_capture(&mut source, &settings, &options, &run, &sender, &status)
        .await
        .unwrap();

    match drain(&mut receiver).remove(1) {
        StageRequest::ProcessFrame {
            snapshot,
            quality,
            format,
        } => {
            assert_eq!(snapshot.id(), 2);
            assert_eq!(snapshot.timestamp(), Duration::from_secs(1));
            assert_eq!(snapshot.dimensions(), (8, 6));
            assert_eq!(quality, 0.3);
            assert_eq!(format, frameflow::ImageFormat::Png);
        }
        other => panic!("unexpected request {}", other.kind()),
    }
}

#[tokio::test]
async fn empty_range_captures_only_the_end() {
    let options = PipelineOptions::new();
    let run = RunState::default();
    let (sender, mut receiver) = mpsc::channel(8);
    let status = RecordingObserver::default();
    let mut source = ScriptedSource::seconds(10);
    let settings = ExtractionSettings::for_duration(Duration::from_secs(10))
        .with_range(Duration::from_secs(4), Duration::from_secs(4));

    let summary = run_capture(&mut source, &settings, &options, &run, &sender, &status)
        .await
        .unwrap();

    assert_eq!(summary.planned, 1);
    assert_eq!(source.seeks, vec![Duration::from_secs(4)]);
    assert_eq!(frame_ids(&drain(&mut receiver)), vec![1]);
}

// ── Seeking ────────────────────────────────────────────────────────

#[tokio::test]
async fn unsettled_seek_is_captured_after_timeout() {
    let options = PipelineOptions::new().with_seek_timeout(Duration::from_millis(20));
    let run = RunState::default();
    let (sender, mut receiver) = mpsc::channel(8);
    let status = RecordingObserver::default();
    let mut source = ScriptedSource::seconds(1);
    source.silent_seeks = true;
    let settings = ExtractionSettings::for_duration(Duration::from_secs(1));

    let started = Instant::now();
    let summary = run_capture(&mut source, &settings, &options, &run, &sender, &status)
        .await
        .unwrap();

    assert_eq!(summary.dispatched, 2);
    assert_eq!(summary.skipped, 0);
    assert!(started.elapsed() >= Duration::from_millis(40));
    assert_eq!(frame_ids(&drain(&mut receiver)), vec![1, 2]);
}

#[tokio::test]
async fn failed_captures_are_skipped() {
    let options = PipelineOptions::new();
    let run = RunState::default();
    let (sender, mut receiver) = mpsc::channel(16);
    let status = RecordingObserver::default();
    let mut source = ScriptedSource::seconds(5);
    source.failing_captures.extend([1, 6]);
    let settings = ExtractionSettings::for_duration(Duration::from_secs(5));

    let summary = run_capture(&mut source, &settings, &options, &run, &sender, &status)
        .await
        .unwrap();

    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.dispatched, 4);
    assert_eq!(frame_ids(&drain(&mut receiver)), vec![2, 3, 4, 5]);
}

// ── Cancellation ───────────────────────────────────────────────────

#[tokio::test]
async fn cancellation_stops_before_next_capture() {
    let token = CancellationToken::new();
    let options = PipelineOptions::new().with_cancellation(token.clone());
    let run = RunState::new(token.clone());
    let (sender, mut receiver) = mpsc::channel(16);
    let status = RecordingObserver::default();
    let mut source = ScriptedSource::seconds(10);
    source.cancel_after = Some((2, token));
    let settings = ExtractionSettings::for_duration(Duration::from_secs(10));

    let summary = run_capture(&mut source, &settings, &options, &run, &sender, &status)
        .await
        .unwrap();

    assert!(summary.cancelled);
    assert_eq!(source.captures, 2);
    let requests = drain(&mut receiver);
    assert_eq!(frame_ids(&requests), vec![1, 2]);
    assert!(
        requests
            .iter()
            .all(|request| !matches!(request, StageRequest::FlushRequest))
    );
    assert!(status.saw_status("Extraction stopped"));
    assert!(!run.is_running());
}

#[tokio::test]
async fn pending_cancellation_stops_run_before_first_capture() {
    let token = CancellationToken::new();
    token.cancel();
    let options = PipelineOptions::new().with_cancellation(token.clone());
    let run = RunState::new(token);
    let (sender, mut receiver) = mpsc::channel(16);
    let status = RecordingObserver::default();
    let mut source = ScriptedSource::seconds(2);
    let settings = ExtractionSettings::for_duration(Duration::from_secs(2));

    let summary = run_capture(&mut source, &settings, &options, &run, &sender, &status)
        .await
        .unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.dispatched, 0);
    assert!(source.seeks.is_empty());
    assert!(drain(&mut receiver).is_empty());
}

#[tokio::test]
async fn closed_stage_is_reported() {
    let options = PipelineOptions::new();
    let run = RunState::default();
    let (sender, receiver) = mpsc::channel(1);
    drop(receiver);
    let status = RecordingObserver::default();
    let mut source = ScriptedSource::seconds(2);
    let settings = ExtractionSettings::for_duration(Duration::from_secs(2));

    let result = run_capture(&mut source, &settings, &options, &run, &sender, &status).await;
    assert!(matches!(result, Err(FrameFlowError::StageClosed)));
}
