//! Bounded, fail-closed access to the local detector.

use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use crate::capture::DecodedImage;
use crate::detect::backend::{DetectionBox, DetectorBackend};
use crate::error::{DetectError, LoadError};
use crate::DetectorConfig;

/// A loaded detector. Only obtainable through [`DetectorClient::load`], so a
/// detector that failed to load can never be invoked.
pub struct DetectorClient {
    backend: Box<dyn DetectorBackend>,
    budget: Duration,
    min_score: f32,
}

impl std::fmt::Debug for DetectorClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectorClient")
            .field("backend", &self.backend.name())
            .field("budget", &self.budget)
            .field("min_score", &self.min_score)
            .finish()
    }
}

impl DetectorClient {
    #[instrument(skip(backend, config), fields(backend = backend.name(), model = %config.model))]
    pub fn load(
        mut backend: Box<dyn DetectorBackend>,
        config: &DetectorConfig,
    ) -> Result<Self, LoadError> {
        let started = Instant::now();
        backend.load(config)?;
        if let Err(e) = backend.warm_up() {
            warn!("Detector warm-up failed: {}", e);
        }
        metrics::histogram!("detector.load_time_ms").record(started.elapsed().as_secs_f64() * 1e3);
        info!(
            "Detector '{}' ready on {} (budget {} ms)",
            backend.name(),
            config.device,
            config.inference_budget_ms
        );

        Ok(Self {
            backend,
            budget: Duration::from_millis(config.inference_budget_ms),
            min_score: config.min_score,
        })
    }

    pub fn name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Detect objects in `image`. Results from a call that overran the
    /// inference budget are discarded.
    #[instrument(level = "trace", skip(self, image))]
    pub fn detect(&mut self, image: &DecodedImage) -> Result<Vec<DetectionBox>, DetectError> {
        let started = Instant::now();
        let deadline = started + self.budget;
        let boxes = self.backend.detect(image, deadline)?;
        let elapsed = started.elapsed();
        metrics::histogram!("detector.inference_ms").record(elapsed.as_secs_f64() * 1e3);

        if elapsed > self.budget {
            metrics::counter!("detector.timeouts").increment(1);
            return Err(DetectError::Timeout {
                budget: self.budget,
                elapsed,
            });
        }

        let boxes: Vec<DetectionBox> = boxes
            .into_iter()
            .filter(|b| b.w > 0.0 && b.h > 0.0 && b.confidence >= self.min_score)
            .map(|mut b| {
                b.confidence = b.confidence.clamp(0.0, 1.0);
                b
            })
            .collect();
        debug!("{} detections in {:?}", boxes.len(), elapsed);
        Ok(boxes)
    }
}
