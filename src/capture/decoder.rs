//! Packed NV21 to oriented RGB raster.
//!
//! Normalization is a direct BT.601 full-range decode; rotation and mirror are
//! then applied as one inverse-mapped pass over the raster.

use std::sync::Arc;

use image::RgbImage;
use tracing::instrument;

use crate::capture::frame::{PackedFrame, Rotation};
use crate::capture::raster::{DecodedImage, RasterLedger};
use crate::error::TransformError;

/// Turns packed frames into upright rasters for the detector and the overlay.
#[derive(Debug, Clone)]
pub struct FrameTransformer {
    ledger: Arc<RasterLedger>,
}

impl FrameTransformer {
    pub fn new(ledger: Arc<RasterLedger>) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &Arc<RasterLedger> {
        &self.ledger
    }

    #[instrument(level = "trace", skip(self, packed), fields(w = packed.width(), h = packed.height()))]
    pub fn transform(
        &self,
        packed: &PackedFrame,
        rotation: Rotation,
        mirror: bool,
    ) -> Result<DecodedImage, TransformError> {
        let upright = nv21_to_rgb(packed)?;
        let oriented = orient(upright, rotation, mirror);
        Ok(DecodedImage::tracked(oriented, &self.ledger))
    }
}

/// Decode a packed NV21 frame.
pub fn nv21_to_rgb(packed: &PackedFrame) -> Result<RgbImage, TransformError> {
    let width = packed.width();
    let height = packed.height();
    let w = width as usize;
    let h = height as usize;

    let rgb_len = w
        .checked_mul(h)
        .and_then(|v| v.checked_mul(3))
        .ok_or(TransformError::DimensionsOverflow { width, height })?;
    let expected = PackedFrame::expected_len(width, height);
    let data = packed.as_bytes();
    if data.len() != expected || w % 2 != 0 || h % 2 != 0 {
        return Err(TransformError::LengthMismatch {
            expected,
            actual: data.len(),
        });
    }

    let (luma, chroma) = data.split_at(w * h);
    let mut rgb = vec![0u8; rgb_len];
    for (j, out_row) in rgb.chunks_exact_mut(w * 3).enumerate() {
        let y_row = &luma[j * w..(j + 1) * w];
        let c_start = (j / 2) * w;
        let c_row = &chroma[c_start..c_start + w];
        for (i, px) in out_row.chunks_exact_mut(3).enumerate() {
            let pair = i & !1;
            let y = y_row[i] as f32;
            let v = c_row[pair] as f32 - 128.0;
            let u = c_row[pair + 1] as f32 - 128.0;

            px[0] = clamp_to_u8(y + 1.402 * v);
            px[1] = clamp_to_u8(y - 0.344_136 * u - 0.714_136 * v);
            px[2] = clamp_to_u8(y + 1.772 * u);
        }
    }

    RgbImage::from_raw(width, height, rgb).ok_or(TransformError::RasterMismatch { width, height })
}

/// Rotate clockwise by `rotation`, then flip horizontally if `mirror`.
///
/// Identity returns the input untouched.
pub fn orient(image: RgbImage, rotation: Rotation, mirror: bool) -> RgbImage {
    if rotation == Rotation::Deg0 && !mirror {
        return image;
    }

    let (sw, sh) = image.dimensions();
    let (dw, dh) = if rotation.is_transposed() {
        (sh, sw)
    } else {
        (sw, sh)
    };

    RgbImage::from_fn(dw, dh, |dx, dy| {
        let mx = if mirror { dw - 1 - dx } else { dx };
        let (sx, sy) = match rotation {
            Rotation::Deg0 => (mx, dy),
            Rotation::Deg90 => (dy, sh - 1 - mx),
            Rotation::Deg180 => (sw - 1 - mx, sh - 1 - dy),
            Rotation::Deg270 => (sw - 1 - dy, mx),
        };
        *image.get_pixel(sx, sy)
    })
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use image::Rgb;

    fn gray_frame(w: u32, h: u32, luma: u8) -> PackedFrame {
        let mut data = vec![luma; (w * h) as usize];
        data.extend(std::iter::repeat(128u8).take((w * h / 2) as usize));
        PackedFrame::from_parts(w, h, Bytes::from(data))
    }

    /// Each pixel encodes its own coordinates.
    fn coords(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| Rgb([x as u8, y as u8, 0]))
    }

    #[test]
    fn neutral_chroma_decodes_to_gray() {
        let rgb = nv21_to_rgb(&gray_frame(2, 2, 128)).unwrap();
        assert_eq!(rgb.as_raw(), &vec![128u8; 12]);
    }

    #[test]
    fn malformed_packed_frame_yields_no_image() {
        let short = PackedFrame::from_parts(4, 4, Bytes::from(vec![0u8; 10]));
        let transformer = FrameTransformer::new(RasterLedger::new());
        let err = transformer
            .transform(&short, Rotation::Deg0, false)
            .unwrap_err();
        assert_eq!(
            err,
            TransformError::LengthMismatch {
                expected: 24,
                actual: 10
            }
        );
        assert_eq!(transformer.ledger().live(), 0);
    }

    #[test]
    fn identity_keeps_the_buffer() {
        let image = coords(3, 2);
        let ptr = image.as_raw().as_ptr();
        let out = orient(image, Rotation::Deg0, false);
        assert_eq!(out.as_raw().as_ptr(), ptr);
    }

    #[test]
    fn quarter_turn_is_clockwise() {
        let out = orient(coords(3, 2), Rotation::Deg90, false);
        assert_eq!(out.dimensions(), (2, 3));
        // Source bottom-left lands top-left, source top-left lands top-right.
        assert_eq!(out.get_pixel(0, 0), &Rgb([0, 1, 0]));
        assert_eq!(out.get_pixel(1, 0), &Rgb([0, 0, 0]));
        assert_eq!(out.get_pixel(1, 2), &Rgb([2, 0, 0]));
    }

    #[test]
    fn half_and_three_quarter_turns() {
        let half = orient(coords(3, 2), Rotation::Deg180, false);
        assert_eq!(half.dimensions(), (3, 2));
        assert_eq!(half.get_pixel(0, 0), &Rgb([2, 1, 0]));

        let three = orient(coords(3, 2), Rotation::Deg270, false);
        assert_eq!(three.dimensions(), (2, 3));
        // Source top-left lands bottom-left.
        assert_eq!(three.get_pixel(0, 2), &Rgb([0, 0, 0]));
        assert_eq!(three.get_pixel(0, 0), &Rgb([2, 0, 0]));
    }

    #[test]
    fn mirror_applies_after_rotation() {
        let mirrored = orient(coords(3, 2), Rotation::Deg0, true);
        assert_eq!(mirrored.get_pixel(0, 0), &Rgb([2, 0, 0]));

        // Rotate then flip: the clockwise turn's top-right pixel moves to top-left.
        let both = orient(coords(3, 2), Rotation::Deg90, true);
        assert_eq!(both.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(both.get_pixel(1, 0), &Rgb([0, 1, 0]));
    }

    #[test]
    fn transform_rotates_dimensions_and_tracks_raster() {
        let transformer = FrameTransformer::new(RasterLedger::new());
        let image = transformer
            .transform(&gray_frame(4, 2, 90), Rotation::Deg270, false)
            .unwrap();
        assert_eq!((image.width(), image.height()), (2, 4));
        assert_eq!(transformer.ledger().live(), 1);
        drop(image);
        assert_eq!(transformer.ledger().live(), 0);
    }
}
