use std::time::Instant;

use crate::capture::DecodedImage;
use crate::error::{DetectError, LoadError};
use crate::DetectorConfig;

/// An axis-aligned box in image pixels, top-left origin.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub label: Option<String>,
    /// In `[0, 1]`.
    pub confidence: f32,
}

impl DetectionBox {
    pub fn new(x: f32, y: f32, w: f32, h: f32, confidence: f32) -> Self {
        Self {
            x,
            y,
            w,
            h,
            label: None,
            confidence,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn right(&self) -> f32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.h
    }
}

/// A local bounding-box detector.
///
/// Implementations own the model and whatever compute device it runs on. The
/// image is borrowed for the duration of the call only.
pub trait DetectorBackend: Send {
    fn name(&self) -> &'static str;

    /// Prepare the model. Called once before any detection.
    fn load(&mut self, config: &DetectorConfig) -> Result<(), LoadError>;

    /// Run detection. Backends that can abort early should give up once
    /// `deadline` has passed.
    fn detect(
        &mut self,
        image: &DecodedImage,
        deadline: Instant,
    ) -> Result<Vec<DetectionBox>, DetectError>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<(), DetectError> {
        Ok(())
    }
}
