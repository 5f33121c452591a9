//! Capture trigger handling: freeze, snapshot, identify off the frame path,
//! hand the query to the consumer.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::capture::DecodedImage;
use crate::error::CascadeExhausted;
use crate::identify::{IdentificationCascade, IdentificationResult};
use crate::pipeline::{AnalysisShared, DetectionHint};
use crate::session::state::{CaptureSession, SessionEvent};

/// Receives the outcome of a capture.
pub trait QuerySink: Send + Sync {
    /// A search query is ready. Its provenance is on the result.
    fn deliver(&self, result: &IdentificationResult);

    /// Nothing could be identified; the user should retry.
    fn exhausted(&self, error: &CascadeExhausted);
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    Resolved(Arc<IdentificationResult>),
    Exhausted(CascadeExhausted),
}

pub struct CaptureController {
    session: Arc<CaptureSession>,
    shared: Arc<AnalysisShared>,
    cascade: Arc<IdentificationCascade>,
    sink: Arc<dyn QuerySink>,
}

impl CaptureController {
    pub fn new(
        session: Arc<CaptureSession>,
        shared: Arc<AnalysisShared>,
        cascade: Arc<IdentificationCascade>,
        sink: Arc<dyn QuerySink>,
    ) -> Self {
        Self {
            session,
            shared,
            cascade,
            sink,
        }
    }

    pub fn session(&self) -> &Arc<CaptureSession> {
        &self.session
    }

    /// Start a capture on the current tokio runtime.
    ///
    /// Returns `None` when the trigger is ignored: a capture is already in
    /// flight, or no frame has been analysed yet.
    pub fn trigger(&self) -> Option<JoinHandle<CaptureOutcome>> {
        if !self.session.try_freeze() {
            return None;
        }

        let hint = self.shared.hint.latest();
        let Some(snapshot) = self.shared.raster.snapshot() else {
            warn!("Capture requested before any frame was analysed");
            self.session.apply(SessionEvent::Abort);
            return None;
        };
        // The frozen preview shows no live boxes.
        self.shared.overlay.clear();
        metrics::counter!("session.captures").increment(1);
        info!(
            "Captured {}x{} frame (hint: {:?})",
            snapshot.width(),
            snapshot.height(),
            hint.as_ref().map(|h| h.label.as_str())
        );

        // Created before spawning so an abort ahead of the first poll still
        // returns the session to Idle.
        let guard = CaptureGuard::new(Arc::clone(&self.session));
        let cascade = Arc::clone(&self.cascade);
        let sink = Arc::clone(&self.sink);
        Some(tokio::spawn(async move {
            run_capture(guard, cascade, sink, snapshot, hint).await
        }))
    }

    /// Hand the resolved result to the caller and resume live detection.
    pub fn acknowledge(&self) -> Option<Arc<IdentificationResult>> {
        self.session.consume()
    }
}

/// Returns the session to Idle if the capture task is dropped before it
/// applies its final event.
struct CaptureGuard {
    session: Arc<CaptureSession>,
    armed: bool,
}

impl CaptureGuard {
    fn new(session: Arc<CaptureSession>) -> Self {
        Self {
            session,
            armed: true,
        }
    }

    fn disarm(&mut self) -> Arc<CaptureSession> {
        self.armed = false;
        Arc::clone(&self.session)
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        if self.armed && self.session.apply(SessionEvent::Cancel) {
            metrics::counter!("session.captures_cancelled").increment(1);
            warn!("Capture ended without a result, resuming live detection");
        }
    }
}

#[instrument(skip_all)]
async fn run_capture(
    mut guard: CaptureGuard,
    cascade: Arc<IdentificationCascade>,
    sink: Arc<dyn QuerySink>,
    snapshot: DecodedImage,
    hint: Option<Arc<DetectionHint>>,
) -> CaptureOutcome {
    let outcome = cascade
        .identify(&snapshot, hint.as_deref(), guard.session.as_ref())
        .await;
    drop(snapshot);
    let session = guard.disarm();

    match outcome {
        Ok(result) => {
            let result = Arc::new(result);
            session.apply(SessionEvent::Resolve(Arc::clone(&result)));
            info!(
                "Search query '{}' ({})",
                result.query(),
                result.provenance
            );
            sink.deliver(&result);
            CaptureOutcome::Resolved(result)
        }
        Err(err) => {
            session.apply(SessionEvent::NoHint);
            warn!("Capture failed: {}", err);
            sink.exhausted(&err);
            CaptureOutcome::Exhausted(err)
        }
    }
}
