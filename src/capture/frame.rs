use std::time::Instant;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// One channel of a subsampled image with its own strides.
///
/// `data` is shared and immutable: conversion reads by index and never
/// advances a cursor, so the same plane can be converted again on retry.
#[derive(Debug, Clone)]
pub struct Plane {
    pub data: Bytes,
    pub row_stride: usize,
    pub pixel_stride: usize,
}

impl Plane {
    pub fn new(data: impl Into<Bytes>, row_stride: usize, pixel_stride: usize) -> Self {
        Self {
            data: data.into(),
            row_stride,
            pixel_stride,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Clockwise sensor-to-display rotation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Map a degree value reported by the camera. Values are normalized into
    /// `[0, 360)`; anything that is not a right angle is rejected.
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Rotation::Deg0),
            90 => Some(Rotation::Deg90),
            180 => Some(Rotation::Deg180),
            270 => Some(Rotation::Deg270),
            _ => None,
        }
    }

    pub fn degrees(self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// True when the rotation swaps width and height.
    pub fn is_transposed(self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

/// A sensor frame in YUV 4:2:0 with sensor-specific strides.
///
/// Owned by the analysis worker for the duration of one conversion.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub y: Plane,
    pub u: Plane,
    pub v: Plane,
    pub rotation: Rotation,
    pub mirror: bool,
    pub sequence: u64,
    /// Capture time in milliseconds on the camera clock.
    pub timestamp_ms: u64,
    /// Local arrival instant for latency tracking
    pub received: Instant,
}

/// Canonical packed frame: luma followed by interleaved V/U pairs (NV21).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedFrame {
    width: u32,
    height: u32,
    data: Bytes,
}

impl PackedFrame {
    /// Exact packed length for the given dimensions.
    pub fn expected_len(width: u32, height: u32) -> usize {
        let luma = width as usize * height as usize;
        luma + luma / 2
    }

    pub(crate) fn from_parts(width: u32, height: u32, data: Bytes) -> Self {
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn luma(&self) -> &[u8] {
        let end = (self.width as usize * self.height as usize).min(self.data.len());
        &self.data[..end]
    }

    /// Interleaved V,U pairs.
    pub fn chroma(&self) -> &[u8] {
        let start = (self.width as usize * self.height as usize).min(self.data.len());
        &self.data[start..]
    }
}
