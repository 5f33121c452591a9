//! Error taxonomy for the frame pipeline and the identification cascade.
//!
//! Every per-frame error has a "skip this frame" continuation and every remote
//! error has an "escalate or fall back" continuation. Only [`CascadeExhausted`]
//! is meant to reach the user.

use std::time::Duration;

use thiserror::Error;

/// Which plane of a 4:2:0 frame an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaneKind {
    Luma,
    ChromaU,
    ChromaV,
}

impl std::fmt::Display for PlaneKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PlaneKind::Luma => "Y",
            PlaneKind::ChromaU => "U",
            PlaneKind::ChromaV => "V",
        };
        f.write_str(name)
    }
}

/// Malformed or truncated plane data. The frame is skipped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConversionError {
    #[error("invalid frame dimensions {width}x{height} (must be even and non-zero)")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("invalid {plane} plane strides: row {row_stride}, pixel {pixel_stride}")]
    InvalidStride {
        plane: PlaneKind,
        row_stride: usize,
        pixel_stride: usize,
    },

    #[error("{plane} plane truncated: needs {needed} bytes, has {available}")]
    Truncated {
        plane: PlaneKind,
        needed: usize,
        available: usize,
    },
}

/// Failure while normalizing a packed frame into a raster.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransformError {
    #[error("packed frame length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("packed frame dimensions overflow: {width}x{height}")]
    DimensionsOverflow { width: u32, height: u32 },

    #[error("raster buffer does not match {width}x{height}")]
    RasterMismatch { width: u32, height: u32 },
}

/// The detector could not be made ready. Detection is disabled afterwards.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("compute device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("detector backend failed to initialize: {0}")]
    Backend(String),
}

/// A single detection call failed. Treated as zero detections for the frame.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("detector not loaded")]
    NotReady,

    #[error("inference exceeded budget of {budget:?} (took {elapsed:?})")]
    Timeout { budget: Duration, elapsed: Duration },

    #[error("inference failed: {0}")]
    Inference(String),
}

/// Failure of one remote identification tier.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote call timed out after {0:?}")]
    Timeout(Duration),

    #[error("remote service unavailable: {0}")]
    Unavailable(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("response carried no usable search terms")]
    EmptyResult,

    #[error("image encoding failed: {0}")]
    Encode(String),

    #[error("remote tier not configured: {0}")]
    NotConfigured(String),
}

impl RemoteError {
    /// Retryable errors are transient (timeouts, network, overload); the rest
    /// are explicit rejections or unusable answers. Both escalate, but they are
    /// logged differently.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RemoteError::Timeout(_) | RemoteError::Unavailable(_) | RemoteError::Transport(_)
        )
    }
}

impl From<serde_json::Error> for RemoteError {
    fn from(err: serde_json::Error) -> Self {
        RemoteError::Malformed(err.to_string())
    }
}

/// Both remote tiers and the local hint failed. Surfaced to the user.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("could not identify the object; try again with better lighting or move closer")]
pub struct CascadeExhausted {
    /// Short description of the last remote failure, if any.
    pub last_failure: Option<String>,
}

/// Invalid or unreadable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_split_matches_taxonomy() {
        assert!(RemoteError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(RemoteError::Unavailable("503".into()).is_retryable());
        assert!(RemoteError::Transport("reset".into()).is_retryable());

        assert!(!RemoteError::Rejected {
            status: 401,
            message: "bad key".into()
        }
        .is_retryable());
        assert!(!RemoteError::Malformed("not json".into()).is_retryable());
        assert!(!RemoteError::EmptyResult.is_retryable());
    }

    #[test]
    fn conversion_error_names_plane() {
        let err = ConversionError::Truncated {
            plane: PlaneKind::ChromaV,
            needed: 10,
            available: 4,
        };
        assert_eq!(err.to_string(), "V plane truncated: needs 10 bytes, has 4");
    }
}
