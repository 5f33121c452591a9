//! Latest-wins slots written by the analysis worker and read by the UI and
//! the capture flow. Readers never see a queue of stale results, only the
//! newest value.

use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};
use serde::Serialize;

use crate::detect::DetectionBox;
use crate::display::ViewRect;

/// On-screen size of the preview, owned by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ViewSize {
    pub width: f32,
    pub height: f32,
}

/// One projected detection ready to draw.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayBox {
    pub rect: ViewRect,
    pub label: Option<String>,
    pub confidence: f32,
}

/// Everything the UI needs to draw one analysed frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OverlayFrame {
    pub sequence: u64,
    pub timestamp_ms: u64,
    pub boxes: Vec<OverlayBox>,
    /// False when the detector is unavailable and boxes will never appear.
    pub detector_ready: bool,
}

pub struct OverlayHandoff {
    latest: ArcSwap<OverlayFrame>,
    view: ArcSwap<ViewSize>,
}

impl OverlayHandoff {
    pub fn new(view: ViewSize) -> Self {
        Self {
            latest: ArcSwap::from_pointee(OverlayFrame::default()),
            view: ArcSwap::from_pointee(view),
        }
    }

    pub fn publish(&self, frame: OverlayFrame) {
        self.latest.store(Arc::new(frame));
    }

    pub fn latest(&self) -> Arc<OverlayFrame> {
        self.latest.load_full()
    }

    /// Drop any boxes on screen, e.g. when the preview freezes.
    pub fn clear(&self) {
        let sequence = self.latest.load().sequence;
        self.publish(OverlayFrame {
            sequence,
            ..OverlayFrame::default()
        });
    }

    pub fn set_view_size(&self, width: f32, height: f32) {
        self.view.store(Arc::new(ViewSize { width, height }));
    }

    pub fn view_size(&self) -> ViewSize {
        **self.view.load()
    }
}

/// Best local guess about the object in view, taken from the detector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionHint {
    pub label: String,
    pub confidence: f32,
    pub sequence: u64,
}

impl DetectionHint {
    /// Highest-confidence labelled box at or above `min_confidence`.
    pub fn from_boxes(boxes: &[DetectionBox], min_confidence: f32, sequence: u64) -> Option<Self> {
        boxes
            .iter()
            .filter(|b| b.confidence >= min_confidence)
            .filter_map(|b| {
                let label = b.label.as_deref()?.trim();
                (!label.is_empty()).then_some((label, b.confidence))
            })
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(label, confidence)| Self {
                label: label.to_owned(),
                confidence,
                sequence,
            })
    }
}

#[derive(Default)]
pub struct LatestHint {
    slot: ArcSwapOption<DetectionHint>,
}

impl LatestHint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the hint. Frames without a confident labelled box clear it,
    /// so the hint always describes the most recent analysed frame.
    pub fn update(&self, hint: Option<DetectionHint>) {
        self.slot.store(hint.map(Arc::new));
    }

    pub fn latest(&self) -> Option<Arc<DetectionHint>> {
        self.slot.load_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hint_picks_most_confident_labelled_box() {
        let boxes = vec![
            DetectionBox::new(0.0, 0.0, 1.0, 1.0, 0.95),
            DetectionBox::new(0.0, 0.0, 1.0, 1.0, 0.7).with_label("cup"),
            DetectionBox::new(0.0, 0.0, 1.0, 1.0, 0.8).with_label("cell phone"),
            DetectionBox::new(0.0, 0.0, 1.0, 1.0, 0.4).with_label("laptop"),
        ];
        let hint = DetectionHint::from_boxes(&boxes, 0.5, 7).unwrap();
        assert_eq!(hint.label, "cell phone");
        assert_eq!(hint.sequence, 7);

        assert!(DetectionHint::from_boxes(&boxes[3..], 0.5, 8).is_none());
    }

    #[test]
    fn newest_overlay_wins() {
        let handoff = OverlayHandoff::new(ViewSize {
            width: 1080.0,
            height: 1920.0,
        });
        for sequence in 1..=3 {
            handoff.publish(OverlayFrame {
                sequence,
                ..OverlayFrame::default()
            });
        }
        assert_eq!(handoff.latest().sequence, 3);

        handoff.set_view_size(720.0, 1280.0);
        assert_eq!(handoff.view_size().width, 720.0);
    }
}
