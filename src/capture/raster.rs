//! Decoded rasters and their ownership bookkeeping.
//!
//! A [`DecodedImage`] is released exactly once, when it is dropped. Images
//! produced by the pipeline carry a lease on a [`RasterLedger`] so the number of
//! outstanding rasters can be observed between frames.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use image::RgbImage;

/// Counts rasters allocated and released by one pipeline.
#[derive(Debug, Default)]
pub struct RasterLedger {
    live: AtomicUsize,
    allocated: AtomicU64,
    released: AtomicU64,
}

impl RasterLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Rasters currently alive.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    pub fn allocated(&self) -> u64 {
        self.allocated.load(Ordering::Relaxed)
    }

    pub fn released(&self) -> u64 {
        self.released.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
struct RasterLease {
    ledger: Option<Arc<RasterLedger>>,
}

impl RasterLease {
    fn acquire(ledger: Option<Arc<RasterLedger>>) -> Self {
        if let Some(ledger) = &ledger {
            ledger.live.fetch_add(1, Ordering::AcqRel);
            ledger.allocated.fetch_add(1, Ordering::Relaxed);
        }
        Self { ledger }
    }
}

impl Drop for RasterLease {
    fn drop(&mut self) {
        if let Some(ledger) = &self.ledger {
            ledger.live.fetch_sub(1, Ordering::AcqRel);
            ledger.released.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// An upright RGB raster, post rotation and mirror.
#[derive(Debug)]
pub struct DecodedImage {
    pixels: RgbImage,
    lease: RasterLease,
}

impl DecodedImage {
    /// Wrap a raster that is not tracked by any ledger.
    pub fn new(pixels: RgbImage) -> Self {
        Self {
            pixels,
            lease: RasterLease::acquire(None),
        }
    }

    pub(crate) fn tracked(pixels: RgbImage, ledger: &Arc<RasterLedger>) -> Self {
        Self {
            pixels,
            lease: RasterLease::acquire(Some(Arc::clone(ledger))),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn rgb(&self) -> &RgbImage {
        &self.pixels
    }

    /// Release the lease and hand the raw raster to the caller.
    pub fn into_rgb(self) -> RgbImage {
        let DecodedImage { pixels, lease } = self;
        drop(lease);
        pixels
    }
}

impl Clone for DecodedImage {
    /// A deep copy that holds its own lease.
    fn clone(&self) -> Self {
        Self {
            pixels: self.pixels.clone(),
            lease: RasterLease::acquire(self.lease.ledger.clone()),
        }
    }
}

/// The most recent live-path raster, shared with the capture flow.
///
/// The worker swaps a new raster in; the previous one is released after the
/// swap and outside the lock. Readers copy out under the lock and never hold a
/// reference into the slot.
#[derive(Debug, Default)]
pub struct LatestRaster {
    slot: Mutex<Option<DecodedImage>>,
}

impl LatestRaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&self, image: DecodedImage) {
        let previous = {
            let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
            slot.replace(image)
        };
        drop(previous);
    }

    /// Private copy of the current raster.
    pub fn snapshot(&self) -> Option<DecodedImage> {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.as_ref().cloned()
    }

    pub fn clear(&self) {
        let previous = {
            let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
            slot.take()
        };
        drop(previous);
    }
}
