//! The single analysis worker: throttle, convert, transform, detect, project.
//!
//! Runs on its own thread and processes one frame at a time, so at most one
//! frame is ever being converted. It never performs network I/O.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use crate::capture::{pack_frame, FrameTransformer, LatestRaster, RasterLedger, RawFrame};
use crate::detect::DetectorClient;
use crate::display::project;
use crate::pipeline::handoff::{
    DetectionHint, LatestHint, OverlayBox, OverlayFrame, OverlayHandoff, ViewSize,
};
use crate::pipeline::queue::{FrameConsumer, QueueClosed};
use crate::pipeline::throttle::FrameThrottler;
use crate::session::CaptureSession;
use crate::utils::LogThrottle;
use crate::{Config, PipelineStats, StatsSnapshot};

/// State the worker publishes for the UI and the capture flow.
pub struct AnalysisShared {
    pub raster: LatestRaster,
    pub overlay: OverlayHandoff,
    pub hint: LatestHint,
    pub stats: PipelineStats,
    pub ledger: Arc<RasterLedger>,
}

impl AnalysisShared {
    pub fn new(view: ViewSize) -> Arc<Self> {
        Arc::new(Self {
            raster: LatestRaster::new(),
            overlay: OverlayHandoff::new(view),
            hint: LatestHint::new(),
            stats: PipelineStats::default(),
            ledger: RasterLedger::new(),
        })
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot(&self.ledger)
    }
}

/// What happened to one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A capture is in progress.
    Paused,
    Throttled,
    ConversionFailed,
    TransformFailed,
    Analysed { detections: usize },
}

pub struct AnalysisWorker {
    throttle: FrameThrottler,
    transformer: FrameTransformer,
    detector: Option<DetectorClient>,
    session: Arc<CaptureSession>,
    shared: Arc<AnalysisShared>,
    min_hint_confidence: f32,
    mirror_overlay: bool,
    poll_interval: Duration,
    failures: LogThrottle,
    stats_log: LogThrottle,
}

impl AnalysisWorker {
    /// `detector` is `None` when the model failed to load; frames are then
    /// still converted for capture but no boxes are produced.
    pub fn new(
        config: &Config,
        detector: Option<DetectorClient>,
        session: Arc<CaptureSession>,
        shared: Arc<AnalysisShared>,
    ) -> Self {
        if detector.is_none() {
            warn!("Detector unavailable, live overlay disabled");
        }
        Self {
            throttle: FrameThrottler::new(config.pipeline.min_frame_interval_ms),
            transformer: FrameTransformer::new(Arc::clone(&shared.ledger)),
            detector,
            session,
            shared,
            min_hint_confidence: config.detector.min_hint_confidence,
            mirror_overlay: config.overlay.mirror,
            poll_interval: Duration::from_millis(config.pipeline.poll_interval_ms.max(1)),
            failures: LogThrottle::new(config.pipeline.failure_log_every),
            stats_log: LogThrottle::new(config.pipeline.stats_log_every),
        }
    }

    /// Run one frame through the pipeline. The frame is released on return
    /// whatever the outcome.
    #[instrument(level = "trace", skip_all, fields(seq = frame.sequence))]
    pub fn process(&mut self, frame: RawFrame) -> FrameOutcome {
        let stats = &self.shared.stats;
        PipelineStats::bump(&stats.received);

        if self.session.is_detection_paused() {
            PipelineStats::bump(&stats.paused);
            metrics::counter!("pipeline.frames_paused").increment(1);
            return FrameOutcome::Paused;
        }
        if !self.throttle.should_process(frame.timestamp_ms) {
            PipelineStats::bump(&stats.throttled);
            metrics::counter!("pipeline.frames_throttled").increment(1);
            return FrameOutcome::Throttled;
        }
        metrics::counter!("pipeline.frames_accepted").increment(1);

        let started = Instant::now();
        let packed = match pack_frame(&frame) {
            Ok(packed) => packed,
            Err(e) => {
                PipelineStats::bump(&stats.conversion_failures);
                metrics::counter!("pipeline.conversion_failures").increment(1);
                if self.failures.should_log() {
                    warn!(
                        "Skipping frame {}: {} ({} failures so far)",
                        frame.sequence,
                        e,
                        self.failures.seen()
                    );
                }
                return FrameOutcome::ConversionFailed;
            }
        };
        let image = match self
            .transformer
            .transform(&packed, frame.rotation, frame.mirror)
        {
            Ok(image) => image,
            Err(e) => {
                PipelineStats::bump(&stats.transform_failures);
                metrics::counter!("pipeline.transform_failures").increment(1);
                if self.failures.should_log() {
                    warn!("Skipping frame {}: {}", frame.sequence, e);
                }
                return FrameOutcome::TransformFailed;
            }
        };
        drop(packed);
        PipelineStats::bump(&stats.converted);
        metrics::histogram!("pipeline.convert_ms").record(started.elapsed().as_secs_f64() * 1e3);

        let boxes = match self.detector.as_mut() {
            Some(detector) => detector.detect(&image).unwrap_or_else(|e| {
                PipelineStats::bump(&stats.detect_failures);
                debug!("No detections for frame {}: {}", frame.sequence, e);
                Vec::new()
            }),
            None => Vec::new(),
        };

        self.shared.hint.update(DetectionHint::from_boxes(
            &boxes,
            self.min_hint_confidence,
            frame.sequence,
        ));

        let view = self.shared.overlay.view_size();
        let rects = project(
            &boxes,
            image.width(),
            image.height(),
            view.width,
            view.height,
            self.mirror_overlay,
        );
        let detections = boxes.len();
        self.shared.overlay.publish(OverlayFrame {
            sequence: frame.sequence,
            timestamp_ms: frame.timestamp_ms,
            boxes: rects
                .into_iter()
                .zip(boxes)
                .map(|(rect, b)| OverlayBox {
                    rect,
                    label: b.label,
                    confidence: b.confidence,
                })
                .collect(),
            detector_ready: self.detector.is_some(),
        });

        // Replace, then release the previous raster.
        self.shared.raster.replace(image);

        PipelineStats::bump(&stats.analysed);
        stats
            .detections
            .fetch_add(detections as u64, Ordering::Relaxed);
        metrics::histogram!("pipeline.frame_latency_ms")
            .record(frame.received.elapsed().as_secs_f64() * 1e3);

        if self.stats_log.should_log() {
            info!("Pipeline stats: {:?}", self.shared.stats());
        }
        FrameOutcome::Analysed { detections }
    }

    /// Consume frames until every producer is gone.
    pub fn run(mut self, frames: FrameConsumer) {
        info!(
            "Analysis worker started (interval {} ms)",
            self.throttle.min_interval_ms()
        );
        loop {
            match frames.recv_timeout(self.poll_interval) {
                Ok(Some(frame)) => {
                    self.process(frame);
                }
                Ok(None) => continue,
                Err(QueueClosed) => break,
            }
        }
        info!("Analysis worker stopped: {:?}", self.shared.stats());
    }

    pub fn spawn(self, frames: FrameConsumer) -> std::io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("snapsight-analysis".into())
            .spawn(move || self.run(frames))
    }
}
