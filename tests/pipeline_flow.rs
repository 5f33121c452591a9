use std::sync::Arc;
use std::time::Duration;

use snapsight::capture::{ChromaLayout, SyntheticCamera};
use snapsight::detect::{DetectionBox, DetectorClient, ScriptedBackend};
use snapsight::error::LoadError;
use snapsight::pipeline::{latest_frame_queue, AnalysisShared, AnalysisWorker, FrameOutcome, ViewSize};
use snapsight::session::CaptureSession;
use snapsight::{CameraConfig, Config, DetectorConfig, PipelineConfig};

fn config(layout: ChromaLayout, padding: usize) -> Config {
    Config {
        camera: CameraConfig {
            width: 64,
            height: 48,
            row_padding: padding,
            chroma_layout: layout,
            ..CameraConfig::default()
        },
        pipeline: PipelineConfig {
            min_frame_interval_ms: 100,
            poll_interval_ms: 10,
            ..PipelineConfig::default()
        },
        ..Config::default()
    }
}

fn view() -> ViewSize {
    ViewSize {
        width: 1080.0,
        height: 1920.0,
    }
}

fn detector() -> DetectorClient {
    let backend = ScriptedBackend::new(vec![
        DetectionBox::new(0.3, 0.3, 0.4, 0.4, 0.9).with_label("bottle"),
        DetectionBox::new(0.0, 0.0, 0.1, 0.1, 0.3).with_label("cup"),
    ]);
    DetectorClient::load(Box::new(backend), &DetectorConfig::default()).unwrap()
}

#[test]
fn outstanding_rasters_stay_bounded_between_frames() {
    for (layout, padding) in [(ChromaLayout::Interleaved, 0), (ChromaLayout::Planar, 5)] {
        let config = config(layout, padding);
        let session = Arc::new(CaptureSession::new());
        let shared = AnalysisShared::new(view());
        let mut worker = AnalysisWorker::new(
            &config,
            Some(detector()),
            Arc::clone(&session),
            Arc::clone(&shared),
        );
        let mut camera = SyntheticCamera::new(config.camera.clone()).unwrap();

        for i in 0..40u64 {
            let outcome = worker.process(camera.frame_at(i * 100));
            assert_eq!(outcome, FrameOutcome::Analysed { detections: 2 });
            assert!(shared.ledger.live() <= 1, "live rasters after frame {i}");
        }

        let stats = shared.stats();
        assert_eq!(stats.analysed, 40);
        assert_eq!(stats.live_rasters, 1);
        assert_eq!(shared.ledger.allocated(), shared.ledger.released() + 1);
    }
}

#[test]
fn hint_tracks_most_confident_label() {
    let config = config(ChromaLayout::Interleaved, 0);
    let shared = AnalysisShared::new(view());
    let mut worker = AnalysisWorker::new(
        &config,
        Some(detector()),
        Arc::new(CaptureSession::new()),
        Arc::clone(&shared),
    );
    let mut camera = SyntheticCamera::new(config.camera.clone()).unwrap();
    worker.process(camera.frame_at(0));

    let hint = shared.hint.latest().expect("hint");
    assert_eq!(hint.label, "bottle");
    assert_eq!(hint.sequence, 1);

    // Portrait raster (48x64) is still wider than a 1080x1920 view:
    // height-fit, scale 30, sides cropped by 180 each.
    let overlay = shared.overlay.latest();
    let first = &overlay.boxes[0];
    assert!((first.rect.left - 252.0).abs() < 1e-2);
    assert!((first.rect.right - 828.0).abs() < 1e-2);
    assert_eq!(first.label.as_deref(), Some("bottle"));
}

#[test]
fn failed_detector_load_keeps_capture_path_alive() {
    let config = config(ChromaLayout::Planar, 0);
    let backend = ScriptedBackend::new(vec![]).failing_load("yolo26n.bin");
    let detector = match DetectorClient::load(Box::new(backend), &config.detector) {
        Ok(_) => panic!("load should fail"),
        Err(e) => {
            assert!(matches!(e, LoadError::ModelNotFound(_)));
            None
        }
    };

    let shared = AnalysisShared::new(view());
    let mut worker = AnalysisWorker::new(
        &config,
        detector,
        Arc::new(CaptureSession::new()),
        Arc::clone(&shared),
    );
    let mut camera = SyntheticCamera::new(config.camera.clone()).unwrap();

    assert_eq!(
        worker.process(camera.frame_at(0)),
        FrameOutcome::Analysed { detections: 0 }
    );
    assert!(shared.raster.snapshot().is_some());
    assert!(shared.hint.latest().is_none());
    assert!(!shared.overlay.latest().detector_ready);
}

#[test]
fn threaded_worker_drains_queue_and_stops() {
    let config = config(ChromaLayout::Interleaved, 3);
    let shared = AnalysisShared::new(view());
    let (producer, consumer) = latest_frame_queue();
    let handle = AnalysisWorker::new(
        &config,
        Some(detector()),
        Arc::new(CaptureSession::new()),
        Arc::clone(&shared),
    )
    .spawn(consumer)
    .unwrap();

    let mut camera = SyntheticCamera::new(config.camera.clone()).unwrap();
    for i in 0..30u64 {
        producer.offer(camera.frame_at(i * 40)).unwrap();
        std::thread::sleep(Duration::from_millis(2));
    }
    let queue = producer.stats();
    drop(producer);
    handle.join().unwrap();

    // Every frame that was not evicted reaches the worker, including one
    // still queued when the producer went away.
    assert_eq!(queue.offered, 30);
    let stats = shared.stats();
    assert_eq!(stats.received as usize, queue.offered - queue.dropped);
    assert!(stats.analysed >= 1);
    assert!(stats.throttled + stats.analysed == stats.received);
    assert_eq!(stats.live_rasters, 1);
}
