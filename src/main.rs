//! snapsight demo: synthetic camera, live analysis, one capture.
//!
//! Usage: `snapsight [config.toml]`. Remote identification needs an API key
//! (`SNAPSIGHT__IDENTIFY__API_KEY` or `OPENROUTER_API_KEY`); without one the
//! capture resolves from the local detector hint.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use snapsight::capture::SyntheticCamera;
use snapsight::detect::{DetectionBox, DetectorClient, ScriptedBackend};
use snapsight::error::{CascadeExhausted, RemoteError};
use snapsight::identify::{IdentificationCascade, IdentificationResult, IdentifyRequest, RemoteResponse, RemoteTier};
use snapsight::pipeline::{latest_frame_queue, AnalysisShared, AnalysisWorker, ViewSize};
use snapsight::session::{CaptureController, CaptureOutcome, CaptureSession, QuerySink};
use snapsight::{Config, IdentifyConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    init_tracing();

    info!("snapsight launching...");

    // Load configuration
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;
    snapsight::CONFIG.store(Arc::new(config.clone()));

    let session = Arc::new(CaptureSession::new());
    let shared = AnalysisShared::new(ViewSize {
        width: config.overlay.view_width,
        height: config.overlay.view_height,
    });

    // The synthetic camera draws an object in the middle third of the frame.
    let backend = ScriptedBackend::new(vec![DetectionBox::new(
        1.0 / 3.0,
        1.0 / 3.0,
        1.0 / 3.0,
        1.0 / 3.0,
        0.82,
    )
    .with_label("cell phone")]);
    let detector = match DetectorClient::load(Box::new(backend), &config.detector) {
        Ok(detector) => Some(detector),
        Err(e) => {
            error!("Detector failed to load: {}", e);
            None
        }
    };

    // Camera -> keep-latest queue -> analysis thread
    let (producer, consumer) = latest_frame_queue();
    let worker = AnalysisWorker::new(&config, detector, Arc::clone(&session), Arc::clone(&shared))
        .spawn(consumer)?;

    let mut camera = SyntheticCamera::new(config.camera.clone())?;
    let capture_handle = tokio::spawn(async move {
        loop {
            let frame = camera.capture_frame().await;
            if producer.offer(frame).is_err() {
                warn!("Analysis worker gone, stopping camera");
                break;
            }
        }
    });

    let controller = CaptureController::new(
        Arc::clone(&session),
        Arc::clone(&shared),
        Arc::new(build_cascade(&config.identify)),
        Arc::new(LogSink),
    );

    tokio::select! {
        result = run_demo(&controller, &shared) => result?,
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    // Dropping the producer stops the worker.
    capture_handle.abort();
    let _ = capture_handle.await;
    worker
        .join()
        .map_err(|_| eyre!("analysis worker panicked"))?;

    info!("Final stats: {:?}", shared.stats());
    info!("snapsight shutting down");
    Ok(())
}

async fn run_demo(controller: &CaptureController, shared: &AnalysisShared) -> Result<()> {
    // Let the live path warm up.
    tokio::time::sleep(Duration::from_secs(1)).await;
    let overlay = shared.overlay.latest();
    info!(
        "Live overlay: frame {} with {} boxes",
        overlay.sequence,
        overlay.boxes.len()
    );

    let handle = controller
        .trigger()
        .ok_or_else(|| eyre!("capture trigger was ignored"))?;
    // Repeated taps while the capture runs are dropped.
    if controller.trigger().is_some() {
        warn!("Second trigger unexpectedly accepted");
    }

    match handle.await? {
        CaptureOutcome::Resolved(_) => {
            controller.acknowledge();
        }
        CaptureOutcome::Exhausted(_) => {}
    }

    tokio::time::sleep(Duration::from_millis(500)).await;
    Ok(())
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("snapsight=debug"));

    #[cfg(feature = "profiling")]
    {
        use tracing_subscriber::layer::SubscriberExt;
        use tracing_subscriber::util::SubscriberInitExt;

        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_timer(tracing_subscriber::fmt::time::uptime()))
            .with(tracing_tracy::TracyLayer::default())
            .init();
    }

    #[cfg(not(feature = "profiling"))]
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();
}

fn build_cascade(config: &IdentifyConfig) -> IdentificationCascade {
    #[cfg(feature = "remote-http")]
    match IdentificationCascade::from_config(config) {
        Ok(cascade) => return cascade,
        Err(e) => warn!("Remote identification disabled: {}", e),
    }
    IdentificationCascade::new(Arc::new(OfflineTier), None, config)
}

/// Stand-in tier when no remote service is configured.
struct OfflineTier;

#[async_trait]
impl RemoteTier for OfflineTier {
    fn name(&self) -> &str {
        "offline"
    }

    async fn identify(&self, _request: &IdentifyRequest) -> Result<RemoteResponse, RemoteError> {
        Err(RemoteError::NotConfigured("no remote tier".into()))
    }
}

struct LogSink;

impl QuerySink for LogSink {
    fn deliver(&self, result: &IdentificationResult) {
        info!(
            "Search for '{}' (from {}, confidence {:.2})",
            result.query(),
            result.provenance,
            result.confidence
        );
    }

    fn exhausted(&self, error: &CascadeExhausted) {
        warn!("{}", error);
    }
}
