//! A detector that replays a fixed set of boxes.
//!
//! Boxes are given in normalized `[0, 1]` coordinates and scaled to each
//! image, so the same script works for any frame size or rotation.

use std::time::{Duration, Instant};

use crate::capture::DecodedImage;
use crate::detect::backend::{DetectionBox, DetectorBackend};
use crate::error::{DetectError, LoadError};
use crate::DetectorConfig;

#[derive(Debug, Clone, Default)]
pub struct ScriptedBackend {
    script: Vec<DetectionBox>,
    latency: Duration,
    missing_model: Option<String>,
    loaded: bool,
}

impl ScriptedBackend {
    pub fn new(script: Vec<DetectionBox>) -> Self {
        Self {
            script,
            ..Self::default()
        }
    }

    /// Simulated inference time per call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make `load` report the model as missing.
    pub fn failing_load(mut self, model: impl Into<String>) -> Self {
        self.missing_model = Some(model.into());
        self
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn load(&mut self, _config: &DetectorConfig) -> Result<(), LoadError> {
        if let Some(model) = &self.missing_model {
            return Err(LoadError::ModelNotFound(model.clone()));
        }
        self.loaded = true;
        Ok(())
    }

    fn detect(
        &mut self,
        image: &DecodedImage,
        _deadline: Instant,
    ) -> Result<Vec<DetectionBox>, DetectError> {
        if !self.loaded {
            return Err(DetectError::NotReady);
        }
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }

        let (iw, ih) = (image.width() as f32, image.height() as f32);
        Ok(self
            .script
            .iter()
            .map(|b| DetectionBox {
                x: b.x * iw,
                y: b.y * ih,
                w: b.w * iw,
                h: b.h * ih,
                label: b.label.clone(),
                confidence: b.confidence,
            })
            .collect())
    }
}
