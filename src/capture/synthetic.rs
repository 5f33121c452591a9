//! Deterministic 4:2:0 frame source.
//!
//! Stands in for the camera sensor: frames carry the same stride quirks real
//! sensors report (padded rows, semi-planar chroma exposed as two overlapping
//! views, or fully separate chroma planes).

use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::capture::frame::{Plane, RawFrame, Rotation};
use crate::error::ConversionError;
use crate::CameraConfig;

/// How the two chroma channels are laid out in memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChromaLayout {
    /// One V,U,V,U buffer; U and V planes are views offset by one byte.
    #[default]
    Interleaved,
    /// Separate U and V buffers, one sample per byte.
    Planar,
}

pub struct SyntheticCamera {
    config: CameraConfig,
    rotation: Rotation,
    sequence: u64,
    started: Instant,
    next_due: tokio::time::Instant,
}

impl SyntheticCamera {
    pub fn new(config: CameraConfig) -> Result<Self, ConversionError> {
        if config.width == 0 || config.height == 0 || config.width % 2 != 0 || config.height % 2 != 0
        {
            return Err(ConversionError::InvalidDimensions {
                width: config.width,
                height: config.height,
            });
        }
        let rotation = Rotation::from_degrees(config.rotation_degrees).unwrap_or_default();

        info!(
            "Synthetic camera {}x{} @ {} fps ({:?} chroma, padding {})",
            config.width, config.height, config.fps, config.chroma_layout, config.row_padding
        );

        Ok(Self {
            config,
            rotation,
            sequence: 0,
            started: Instant::now(),
            next_due: tokio::time::Instant::now(),
        })
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.config.fps.max(1) as f64)
    }

    /// Wait for the next frame slot, then produce a frame stamped with the
    /// elapsed camera time.
    #[instrument(level = "trace", skip(self))]
    pub async fn capture_frame(&mut self) -> RawFrame {
        tokio::time::sleep_until(self.next_due).await;
        self.next_due += self.frame_interval();
        let timestamp_ms = self.started.elapsed().as_millis() as u64;
        self.frame_at(timestamp_ms)
    }

    /// Produce the next frame with an explicit timestamp.
    pub fn frame_at(&mut self, timestamp_ms: u64) -> RawFrame {
        self.sequence += 1;
        let w = self.config.width as usize;
        let h = self.config.height as usize;
        let pad = self.config.row_padding;
        let phase = self.sequence as usize * 3;

        // Luma: diagonal gradient that drifts with the sequence number.
        let y_stride = w + pad;
        let mut luma = vec![0u8; y_stride * h];
        for (row, line) in luma.chunks_exact_mut(y_stride).enumerate() {
            for (col, px) in line[..w].iter_mut().enumerate() {
                *px = ((row + col + phase) & 0xff) as u8;
            }
        }

        let (cw, ch) = (w / 2, h / 2);
        let sample = |row: usize, col: usize| -> (u8, u8) {
            // A warm block in the middle third so the frame has an "object".
            let inside = row >= ch / 3 && row < ch * 2 / 3 && col >= cw / 3 && col < cw * 2 / 3;
            if inside {
                (200, 90)
            } else {
                (128, 128)
            }
        };

        let (u, v) = match self.config.chroma_layout {
            ChromaLayout::Interleaved => {
                let c_stride = cw * 2 + pad;
                let mut vu = vec![0u8; c_stride * ch];
                for (row, line) in vu.chunks_exact_mut(c_stride).enumerate() {
                    for (col, pair) in line[..cw * 2].chunks_exact_mut(2).enumerate() {
                        let (v, u) = sample(row, col);
                        pair[0] = v;
                        pair[1] = u;
                    }
                }
                let shared = Bytes::from(vu);
                let end = shared.len();
                let v = Plane::new(shared.slice(0..end - 1), c_stride, 2);
                let u = Plane::new(shared.slice(1..end), c_stride, 2);
                (u, v)
            }
            ChromaLayout::Planar => {
                let c_stride = cw + pad;
                let mut u = vec![0u8; c_stride * ch];
                let mut v = vec![0u8; c_stride * ch];
                for row in 0..ch {
                    for col in 0..cw {
                        let (sv, su) = sample(row, col);
                        v[row * c_stride + col] = sv;
                        u[row * c_stride + col] = su;
                    }
                }
                (Plane::new(u, c_stride, 1), Plane::new(v, c_stride, 1))
            }
        };

        RawFrame {
            width: self.config.width,
            height: self.config.height,
            y: Plane::new(luma, y_stride, 1),
            u,
            v,
            rotation: self.rotation,
            mirror: self.config.mirror,
            sequence: self.sequence,
            timestamp_ms,
            received: Instant::now(),
        }
    }
}
