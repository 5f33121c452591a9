//! Tiered remote identification with a local fallback.

pub mod cascade;
pub mod encode;
#[cfg(feature = "remote-http")]
pub mod openrouter;
pub mod remote;
pub mod terms;

use serde::Serialize;

pub use cascade::IdentificationCascade;
pub use encode::{prepare_image, EncodedImage};
#[cfg(feature = "remote-http")]
pub use openrouter::OpenRouterTier;
pub use remote::{IdentifyRequest, RemoteResponse, RemoteTier};

/// Where a search query came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Tier1,
    Tier2,
    LocalFallback,
}

impl Provenance {
    pub fn as_str(self) -> &'static str {
        match self {
            Provenance::Tier1 => "tier1",
            Provenance::Tier2 => "tier2",
            Provenance::LocalFallback => "local_fallback",
        }
    }

    /// Remote tier number; `None` for the local fallback.
    pub fn tier(self) -> Option<u8> {
        match self {
            Provenance::Tier1 => Some(1),
            Provenance::Tier2 => Some(2),
            Provenance::LocalFallback => None,
        }
    }
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentificationResult {
    pub brand: String,
    pub model: String,
    pub category: String,
    /// Free-form label the remote tier suggested as a query.
    pub raw_label: String,
    pub confidence: f32,
    pub provenance: Provenance,
    /// Ordered, never empty.
    pub search_terms: Vec<String>,
}

impl IdentificationResult {
    /// The terms as a single query string.
    pub fn query(&self) -> String {
        self.search_terms.join(" ")
    }
}

/// Receives cascade progress, e.g. to drive the capture session.
pub trait CascadeProgress: Send + Sync {
    fn tier_started(&self, tier: u8);
    fn falling_back(&self);
}

/// Progress sink that ignores everything.
impl CascadeProgress for () {
    fn tier_started(&self, _tier: u8) {}
    fn falling_back(&self) {}
}
