//! Shrink and compress a frozen frame before it leaves the device.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::RgbImage;
use tracing::debug;

use crate::error::RemoteError;
use crate::identify::IdentifyRequest;

#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub jpeg: Bytes,
    pub width: u32,
    pub height: u32,
}

impl EncodedImage {
    pub fn to_request(&self, max_dimension: u32) -> IdentifyRequest {
        IdentifyRequest {
            image: self.jpeg.clone(),
            width: self.width,
            height: self.height,
            max_dimension: Some(max_dimension),
        }
    }
}

/// Size after fitting `(width, height)` inside `max_dimension` on both sides,
/// keeping the aspect ratio. Images already small enough are left alone.
pub fn fit_within(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    if width <= max_dimension && height <= max_dimension {
        return (width, height);
    }
    let longest = u64::from(width.max(height));
    let scaled = |side: u32| (u64::from(side) * u64::from(max_dimension) / longest).max(1) as u32;
    (scaled(width), scaled(height))
}

pub fn prepare_image(
    image: &RgbImage,
    max_dimension: u32,
    quality: u8,
) -> Result<EncodedImage, RemoteError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(RemoteError::Encode(format!("empty image {width}x{height}")));
    }

    let (w, h) = fit_within(width, height, max_dimension);
    let resized;
    let source = if (w, h) == (width, height) {
        image
    } else {
        debug!("Resizing capture {}x{} -> {}x{}", width, height, w, h);
        resized = imageops::resize(image, w, h, FilterType::Triangle);
        &resized
    };

    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100))
        .encode_image(source)
        .map_err(|e| RemoteError::Encode(e.to_string()))?;

    Ok(EncodedImage {
        jpeg: Bytes::from(buf),
        width: w,
        height: h,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_keeps_aspect_and_small_images() {
        assert_eq!(fit_within(1280, 960, 384), (384, 288));
        assert_eq!(fit_within(480, 640, 384), (288, 384));
        assert_eq!(fit_within(300, 200, 384), (300, 200));
        assert_eq!(fit_within(4000, 2, 384), (384, 1));
    }

    #[test]
    fn encodes_downscaled_jpeg() {
        let image = RgbImage::from_pixel(640, 480, image::Rgb([200, 40, 40]));
        let encoded = prepare_image(&image, 384, 80).unwrap();
        assert_eq!((encoded.width, encoded.height), (384, 288));
        assert_eq!(&encoded.jpeg[..2], &[0xFF, 0xD8]);
    }
}
