pub mod capture;
pub mod detect;
pub mod display;
pub mod error;
pub mod identify;
pub mod pipeline;
pub mod session;
pub mod utils;

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::capture::{ChromaLayout, RasterLedger, Rotation};
use crate::error::ConfigError;

/// Global configuration that can be atomically swapped at runtime
pub static CONFIG: once_cell::sync::Lazy<ArcSwap<Config>> =
    once_cell::sync::Lazy::new(|| ArcSwap::from_pointee(Config::default()));

/// Environment variable prefix; nested keys use `__`,
/// e.g. `SNAPSIGHT__IDENTIFY__API_KEY`.
pub const ENV_PREFIX: &str = "SNAPSIGHT";

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub camera: CameraConfig,
    pub pipeline: PipelineConfig,
    pub detector: DetectorConfig,
    pub identify: IdentifyConfig,
    pub overlay: OverlayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Extra bytes at the end of every plane row.
    pub row_padding: usize,
    pub chroma_layout: ChromaLayout,
    /// Clockwise sensor-to-display rotation.
    pub rotation_degrees: i32,
    /// Front camera: mirror horizontally after rotation.
    pub mirror: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Minimum spacing between analysed frames.
    pub min_frame_interval_ms: u64,
    /// How long the worker waits for a frame before re-checking the queue.
    pub poll_interval_ms: u64,
    /// Log every n-th repeated per-frame failure.
    pub failure_log_every: u64,
    /// Emit a stats line every n analysed frames.
    pub stats_log_every: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub model: String,
    /// Compute device, e.g. `cpu` or `gpu`.
    pub device: String,
    pub inference_budget_ms: u64,
    /// Boxes below this score are discarded.
    pub min_score: f32,
    /// Minimum confidence for a box to become the capture hint.
    pub min_hint_confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentifyConfig {
    /// OpenAI-compatible chat-completions URL.
    pub endpoint: String,
    pub api_key: Option<String>,
    /// Consulted when `api_key` is unset.
    pub api_key_env: String,
    pub tier1_model: String,
    /// Stronger model used when tier 1 is unsure. Unset disables tier 2.
    pub tier2_model: Option<String>,
    pub confidence_threshold: f32,
    pub max_image_dimension: u32,
    pub jpeg_quality: u8,
    pub request_timeout_ms: u64,
    pub max_tokens: u32,
    pub temperature: f32,
    pub referer: Option<String>,
    pub app_title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub view_width: f32,
    pub view_height: f32,
    /// Flip boxes in view space. Leave off when frames are already mirrored
    /// before detection.
    pub mirror: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
            row_padding: 0,
            chroma_layout: ChromaLayout::Interleaved,
            rotation_degrees: 90, // Portrait phone, back camera
            mirror: false,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_frame_interval_ms: 150,
            poll_interval_ms: 250,
            failure_log_every: 100,
            stats_log_every: 100,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model: "yolo26n".into(),
            device: "cpu".into(),
            inference_budget_ms: 120,
            min_score: 0.25,
            min_hint_confidence: 0.5,
        }
    }
}

impl Default for IdentifyConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://openrouter.ai/api/v1/chat/completions".into(),
            api_key: None,
            api_key_env: "OPENROUTER_API_KEY".into(),
            tier1_model: "google/gemini-2.5-flash-lite".into(),
            tier2_model: Some("google/gemini-2.5-flash".into()),
            confidence_threshold: 0.6,
            max_image_dimension: 384,
            jpeg_quality: 80,
            request_timeout_ms: 30_000,
            max_tokens: 500,
            temperature: 0.1,
            referer: None,
            app_title: "snapsight".into(),
        }
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            view_width: 1080.0,
            view_height: 1920.0,
            mirror: false,
        }
    }
}

impl IdentifyConfig {
    /// The configured key, else the one in `api_key_env`.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|k| !k.trim().is_empty())
    }
}

impl Config {
    /// Load defaults, then the optional TOML file, then `SNAPSIGHT__*`
    /// environment overrides, and validate the result.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        let cam = &self.camera;

        if cam.width == 0 || cam.height == 0 || cam.width % 2 != 0 || cam.height % 2 != 0 {
            return invalid(format!(
                "camera size {}x{} must be even and non-zero",
                cam.width, cam.height
            ));
        }
        if cam.fps == 0 {
            return invalid("camera.fps must be positive".into());
        }
        if Rotation::from_degrees(cam.rotation_degrees).is_none() {
            return invalid(format!(
                "camera.rotation_degrees {} is not a right angle",
                cam.rotation_degrees
            ));
        }
        if self.detector.inference_budget_ms == 0 {
            return invalid("detector.inference_budget_ms must be positive".into());
        }
        for (name, value) in [
            ("detector.min_score", self.detector.min_score),
            ("detector.min_hint_confidence", self.detector.min_hint_confidence),
            ("identify.confidence_threshold", self.identify.confidence_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return invalid(format!("{name} {value} is outside [0, 1]"));
            }
        }

        let id = &self.identify;
        if id.tier1_model.trim().is_empty() {
            return invalid("identify.tier1_model must be set".into());
        }
        if id.max_image_dimension == 0 {
            return invalid("identify.max_image_dimension must be positive".into());
        }
        if !(1..=100).contains(&id.jpeg_quality) {
            return invalid(format!("identify.jpeg_quality {} is outside 1..=100", id.jpeg_quality));
        }
        if id.request_timeout_ms == 0 {
            return invalid("identify.request_timeout_ms must be positive".into());
        }
        if self.overlay.view_width <= 0.0 || self.overlay.view_height <= 0.0 {
            return invalid("overlay view size must be positive".into());
        }
        Ok(())
    }
}

/// Counters collected by the analysis worker
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub received: AtomicU64,
    pub paused: AtomicU64,
    pub throttled: AtomicU64,
    pub converted: AtomicU64,
    pub conversion_failures: AtomicU64,
    pub transform_failures: AtomicU64,
    pub detect_failures: AtomicU64,
    pub analysed: AtomicU64,
    pub detections: AtomicU64,
}

/// Point-in-time view of [`PipelineStats`] plus raster bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub received: u64,
    pub paused: u64,
    pub throttled: u64,
    pub converted: u64,
    pub conversion_failures: u64,
    pub transform_failures: u64,
    pub detect_failures: u64,
    pub analysed: u64,
    pub detections: u64,
    pub live_rasters: usize,
}

impl PipelineStats {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, ledger: &RasterLedger) -> StatsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            received: get(&self.received),
            paused: get(&self.paused),
            throttled: get(&self.throttled),
            converted: get(&self.converted),
            conversion_failures: get(&self.conversion_failures),
            transform_failures: get(&self.transform_failures),
            detect_failures: get(&self.detect_failures),
            analysed: get(&self.analysed),
            detections: get(&self.detections),
            live_rasters: ledger.live(),
        }
    }
}
