//! Detection-space to view-space projection for the preview overlay.
//!
//! The preview fills the view ("cover" fit), so one image axis is cropped.
//! Boxes go through scale, offset, mirror and clamp in that order.

use serde::{Deserialize, Serialize};

use crate::detect::DetectionBox;

/// A rectangle in view pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewRect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl ViewRect {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    /// Horizontal flip about the view's vertical center line.
    pub fn mirrored(self, view_width: f32) -> Self {
        Self {
            left: view_width - self.right,
            right: view_width - self.left,
            ..self
        }
    }

    pub fn clamped(self, view_width: f32, view_height: f32) -> Self {
        Self {
            left: self.left.clamp(0.0, view_width),
            top: self.top.clamp(0.0, view_height),
            right: self.right.clamp(0.0, view_width),
            bottom: self.bottom.clamp(0.0, view_height),
        }
    }
}

/// Uniform scale plus centering offset that makes the image cover the view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverFit {
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl CoverFit {
    /// `None` when either size is degenerate.
    pub fn new(image_width: f32, image_height: f32, view_width: f32, view_height: f32) -> Option<Self> {
        if image_width <= 0.0 || image_height <= 0.0 || view_width <= 0.0 || view_height <= 0.0 {
            return None;
        }

        let fit = if image_width / image_height > view_width / view_height {
            // Image is wider than the view: match heights, crop the sides.
            let scale = view_height / image_height;
            CoverFit {
                scale,
                offset_x: (view_width - image_width * scale) / 2.0,
                offset_y: 0.0,
            }
        } else {
            let scale = view_width / image_width;
            CoverFit {
                scale,
                offset_x: 0.0,
                offset_y: (view_height - image_height * scale) / 2.0,
            }
        };
        Some(fit)
    }

    pub fn apply(&self, b: &DetectionBox) -> ViewRect {
        ViewRect {
            left: b.x * self.scale + self.offset_x,
            top: b.y * self.scale + self.offset_y,
            right: b.right() * self.scale + self.offset_x,
            bottom: b.bottom() * self.scale + self.offset_y,
        }
    }
}

/// Map detector boxes into view coordinates.
pub fn project(
    boxes: &[DetectionBox],
    image_width: u32,
    image_height: u32,
    view_width: f32,
    view_height: f32,
    mirror: bool,
) -> Vec<ViewRect> {
    let Some(fit) = CoverFit::new(
        image_width as f32,
        image_height as f32,
        view_width,
        view_height,
    ) else {
        return Vec::new();
    };

    boxes
        .iter()
        .map(|b| {
            let rect = fit.apply(b);
            let rect = if mirror { rect.mirrored(view_width) } else { rect };
            rect.clamped(view_width, view_height)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_image_in_tall_view_fits_height() {
        let fit = CoverFit::new(640.0, 480.0, 1080.0, 1920.0).unwrap();
        assert_eq!(fit.scale, 4.0);
        assert_eq!(fit.offset_x, -740.0);
        assert_eq!(fit.offset_y, 0.0);

        let full = DetectionBox::new(0.0, 0.0, 640.0, 480.0, 0.9);
        assert_eq!(fit.apply(&full), ViewRect::new(-740.0, 0.0, 1820.0, 1920.0));

        let rects = project(&[full], 640, 480, 1080.0, 1920.0, false);
        assert_eq!(rects, vec![ViewRect::new(0.0, 0.0, 1080.0, 1920.0)]);
    }

    #[test]
    fn tall_image_in_wide_view_fits_width() {
        let fit = CoverFit::new(480.0, 640.0, 1000.0, 500.0).unwrap();
        assert_eq!(fit.offset_x, 0.0);
        assert!((fit.scale - 1000.0 / 480.0).abs() < 1e-6);
        assert!(fit.offset_y < 0.0);
    }

    #[test]
    fn mirror_flips_about_view_center() {
        let rect = ViewRect::new(100.0, 0.0, 300.0, 50.0).mirrored(1000.0);
        assert_eq!(rect, ViewRect::new(700.0, 0.0, 900.0, 50.0));

        let b = DetectionBox::new(100.0, 0.0, 200.0, 50.0, 0.5);
        let rects = project(&[b], 1000, 1000, 1000.0, 1000.0, true);
        assert_eq!(rects, vec![ViewRect::new(700.0, 0.0, 900.0, 50.0)]);
    }

    #[test]
    fn mirror_composes_with_offset_and_clamp() {
        let b = DetectionBox::new(100.0, 0.0, 200.0, 480.0, 0.5);
        let rects = project(&[b], 640, 480, 1080.0, 1920.0, true);
        // Offset: -340..460. Mirrored: 620..1420, clamped to the right edge.
        assert_eq!(rects, vec![ViewRect::new(620.0, 0.0, 1080.0, 1920.0)]);
    }

    #[test]
    fn degenerate_sizes_project_nothing() {
        let b = DetectionBox::new(0.0, 0.0, 10.0, 10.0, 0.5);
        assert!(project(&[b.clone()], 0, 480, 1080.0, 1920.0, false).is_empty());
        assert!(project(&[b], 640, 480, 0.0, 1920.0, false).is_empty());
    }
}
