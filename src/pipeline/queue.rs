//! Keep-only-latest frame queue between the camera and the analysis worker.
//!
//! Depth one. When the worker has not picked up the previous frame yet, the
//! producer evicts it and the new frame takes its place. Evicted frames are
//! dropped on the producer side.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::utils::CachePadded;
use flume::{Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::capture::RawFrame;

#[derive(Debug, Default)]
struct Stats {
    frames_offered: AtomicUsize,
    frames_delivered: AtomicUsize,
    frames_dropped: AtomicUsize,
}

/// Point-in-time copy of the queue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub offered: usize,
    pub delivered: usize,
    pub dropped: usize,
}

/// The worker has gone away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("frame queue closed")]
pub struct QueueClosed;

pub fn latest_frame_queue() -> (FrameProducer, FrameConsumer) {
    let (tx, rx) = flume::bounded(1);
    let stats = Arc::new(CachePadded::new(Stats::default()));
    (
        FrameProducer {
            tx,
            evict: rx.clone(),
            stats: Arc::clone(&stats),
        },
        FrameConsumer { rx, stats },
    )
}

/// Camera side. Single producer: the closed check counts receivers.
pub struct FrameProducer {
    tx: Sender<RawFrame>,
    // Held only to evict a stale frame.
    evict: Receiver<RawFrame>,
    stats: Arc<CachePadded<Stats>>,
}

impl FrameProducer {
    /// Offer a frame, replacing any frame the worker has not taken yet.
    pub fn offer(&self, frame: RawFrame) -> Result<(), QueueClosed> {
        // Our own eviction handle keeps the channel open; count the others.
        if self.tx.receiver_count() <= 1 {
            return Err(QueueClosed);
        }
        self.stats.frames_offered.fetch_add(1, Ordering::Relaxed);

        let mut frame = frame;
        loop {
            match self.tx.try_send(frame) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(rejected)) => {
                    if let Ok(stale) = self.evict.try_recv() {
                        self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
                        metrics::counter!("pipeline.frames_dropped").increment(1);
                        drop(stale);
                    }
                    frame = rejected;
                }
                Err(TrySendError::Disconnected(_)) => return Err(QueueClosed),
            }
        }
    }

    pub fn stats(&self) -> QueueStats {
        snapshot(&self.stats)
    }
}

/// Worker side. Not cloneable: there is exactly one consumer.
pub struct FrameConsumer {
    rx: Receiver<RawFrame>,
    stats: Arc<CachePadded<Stats>>,
}

impl FrameConsumer {
    /// Wait up to `timeout` for the next frame. `Ok(None)` on timeout,
    /// `Err` once every producer is gone.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<RawFrame>, QueueClosed> {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => {
                self.stats.frames_delivered.fetch_add(1, Ordering::Relaxed);
                Ok(Some(frame))
            }
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(QueueClosed),
        }
    }

    pub fn try_recv(&self) -> Option<RawFrame> {
        let frame = self.rx.try_recv().ok()?;
        self.stats.frames_delivered.fetch_add(1, Ordering::Relaxed);
        Some(frame)
    }

    pub fn stats(&self) -> QueueStats {
        snapshot(&self.stats)
    }
}

fn snapshot(stats: &Stats) -> QueueStats {
    QueueStats {
        offered: stats.frames_offered.load(Ordering::Relaxed),
        delivered: stats.frames_delivered.load(Ordering::Relaxed),
        dropped: stats.frames_dropped.load(Ordering::Relaxed),
    }
}
