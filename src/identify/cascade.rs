//! Cheap remote pass, optional stronger pass, then the local hint.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use crate::capture::DecodedImage;
use crate::error::{CascadeExhausted, RemoteError};
use crate::identify::encode::prepare_image;
use crate::identify::remote::{IdentifyRequest, RemoteResponse, RemoteTier};
use crate::identify::terms::shopping_term;
use crate::identify::{CascadeProgress, IdentificationResult, Provenance};
use crate::pipeline::DetectionHint;
use crate::IdentifyConfig;

/// A tier answer that produced usable search terms.
#[derive(Debug, Clone)]
struct Candidate {
    response: RemoteResponse,
    confidence: f32,
    terms: Vec<String>,
}

impl Candidate {
    fn from_response(response: RemoteResponse) -> Result<Self, RemoteError> {
        let terms = response.search_terms();
        if terms.is_empty() {
            return Err(RemoteError::EmptyResult);
        }
        let confidence = if response.confidence.is_finite() {
            response.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Ok(Self {
            response,
            confidence,
            terms,
        })
    }

    fn has_model(&self) -> bool {
        !self.response.model.trim().is_empty()
    }

    fn into_result(self, provenance: Provenance) -> IdentificationResult {
        IdentificationResult {
            brand: self.response.brand.trim().to_owned(),
            model: self.response.model.trim().to_owned(),
            category: self.response.category.trim().to_owned(),
            raw_label: self.response.raw_label.trim().to_owned(),
            confidence: self.confidence,
            provenance,
            search_terms: self.terms,
        }
    }
}

/// Tier 2 replaces a low-confidence tier-1 answer only when it is more
/// confident or names a model tier 1 could not.
fn prefers_tier2(tier1: &Candidate, tier2: &Candidate) -> bool {
    tier2.confidence > tier1.confidence || (tier2.has_model() && !tier1.has_model())
}

fn hint_result(hint: &DetectionHint) -> Option<IdentificationResult> {
    let term = shopping_term(&hint.label);
    if term.is_empty() {
        return None;
    }
    Some(IdentificationResult {
        brand: String::new(),
        model: String::new(),
        category: String::new(),
        raw_label: hint.label.clone(),
        confidence: hint.confidence,
        provenance: Provenance::LocalFallback,
        search_terms: vec![term],
    })
}

pub struct IdentificationCascade {
    tier1: Arc<dyn RemoteTier>,
    tier2: Option<Arc<dyn RemoteTier>>,
    confidence_threshold: f32,
    timeout: Duration,
    max_image_dimension: u32,
    jpeg_quality: u8,
}

impl IdentificationCascade {
    pub fn new(
        tier1: Arc<dyn RemoteTier>,
        tier2: Option<Arc<dyn RemoteTier>>,
        config: &IdentifyConfig,
    ) -> Self {
        Self {
            tier1,
            tier2,
            confidence_threshold: config.confidence_threshold,
            timeout: Duration::from_millis(config.request_timeout_ms),
            max_image_dimension: config.max_image_dimension,
            jpeg_quality: config.jpeg_quality,
        }
    }

    /// Both tiers over the OpenAI-compatible endpoint in `config`.
    #[cfg(feature = "remote-http")]
    pub fn from_config(config: &IdentifyConfig) -> Result<Self, RemoteError> {
        use crate::identify::OpenRouterTier;

        let client = OpenRouterTier::http_client(config)?;
        let tier1: Arc<dyn RemoteTier> = Arc::new(OpenRouterTier::new(
            client.clone(),
            config,
            &config.tier1_model,
        )?);
        let tier2 = match config.tier2_model.as_deref().map(str::trim) {
            Some(model) if !model.is_empty() => {
                let tier: Arc<dyn RemoteTier> =
                    Arc::new(OpenRouterTier::new(client, config, model)?);
                Some(tier)
            }
            _ => None,
        };
        Ok(Self::new(tier1, tier2, config))
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    /// Identify the object in `image`.
    ///
    /// Tier 1 always runs first. Tier 2 runs only when tier 1 failed or fell
    /// below the confidence threshold. When both remote tiers fail, the
    /// detector `hint` becomes the query.
    #[instrument(skip_all, fields(w = image.width(), h = image.height()))]
    pub async fn identify(
        &self,
        image: &DecodedImage,
        hint: Option<&DetectionHint>,
        progress: &dyn CascadeProgress,
    ) -> Result<IdentificationResult, CascadeExhausted> {
        let started = Instant::now();
        let mut last_failure: Option<String> = None;
        progress.tier_started(1);

        match prepare_image(image.rgb(), self.max_image_dimension, self.jpeg_quality) {
            Ok(encoded) => {
                let request = encoded.to_request(self.max_image_dimension);
                match self.remote_pass(&request, progress, &mut last_failure).await {
                    Some(result) => {
                        record_outcome(result.provenance, started);
                        return Ok(result);
                    }
                    None => debug!("Remote tiers exhausted"),
                }
            }
            Err(e) => {
                warn!("Could not prepare capture for upload: {}", e);
                last_failure = Some(e.to_string());
            }
        }

        progress.falling_back();
        match hint.and_then(hint_result) {
            Some(result) => {
                info!(
                    "Using local hint '{}' as query '{}'",
                    result.raw_label,
                    result.query()
                );
                record_outcome(result.provenance, started);
                Ok(result)
            }
            None => {
                metrics::counter!("cascade.exhausted").increment(1);
                warn!("Identification failed with no local hint");
                Err(CascadeExhausted { last_failure })
            }
        }
    }

    async fn remote_pass(
        &self,
        request: &IdentifyRequest,
        progress: &dyn CascadeProgress,
        last_failure: &mut Option<String>,
    ) -> Option<IdentificationResult> {
        let mut low_confidence = None;
        match self.call_tier(self.tier1.as_ref(), 1, request).await {
            Ok(candidate) if candidate.confidence >= self.confidence_threshold => {
                return Some(candidate.into_result(Provenance::Tier1));
            }
            Ok(candidate) => {
                debug!(
                    "Tier 1 confidence {:.2} below {:.2}, escalating",
                    candidate.confidence, self.confidence_threshold
                );
                low_confidence = Some(candidate);
            }
            Err(e) => *last_failure = Some(e.to_string()),
        }

        if let Some(tier2) = &self.tier2 {
            progress.tier_started(2);
            match self.call_tier(tier2.as_ref(), 2, request).await {
                Ok(upgraded) => {
                    return Some(match low_confidence {
                        Some(kept) if !prefers_tier2(&kept, &upgraded) => {
                            debug!("Keeping tier 1 answer, tier 2 was not better");
                            kept.into_result(Provenance::Tier1)
                        }
                        _ => upgraded.into_result(Provenance::Tier2),
                    });
                }
                Err(e) => *last_failure = Some(e.to_string()),
            }
        }

        let kept = low_confidence?;
        if self.tier2.is_none() {
            // Below threshold with nothing to escalate to: leave the tier-1
            // state through the fallback step.
            progress.falling_back();
        }
        debug!("Tier 2 unavailable, keeping low-confidence tier 1 answer");
        Some(kept.into_result(Provenance::Tier1))
    }

    async fn call_tier(
        &self,
        tier: &dyn RemoteTier,
        number: u8,
        request: &IdentifyRequest,
    ) -> Result<Candidate, RemoteError> {
        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.timeout, tier.identify(request)).await {
            Ok(response) => response.and_then(Candidate::from_response),
            Err(_) => Err(RemoteError::Timeout(self.timeout)),
        };

        let label = if number == 1 { "1" } else { "2" };
        metrics::histogram!("cascade.tier_latency_ms", "tier" => label)
            .record(started.elapsed().as_secs_f64() * 1e3);

        match &outcome {
            Ok(c) => {
                metrics::counter!("cascade.tier_outcomes", "tier" => label, "outcome" => "ok")
                    .increment(1);
                info!(
                    "Tier {} ({}) answered '{}' with confidence {:.2}",
                    number,
                    tier.name(),
                    c.terms.join(" "),
                    c.confidence
                );
            }
            Err(e) if e.is_retryable() => {
                metrics::counter!("cascade.tier_outcomes", "tier" => label, "outcome" => "retryable")
                    .increment(1);
                warn!("Tier {} ({}) failed, retryable: {}", number, tier.name(), e);
            }
            Err(e) => {
                metrics::counter!("cascade.tier_outcomes", "tier" => label, "outcome" => "rejected")
                    .increment(1);
                warn!("Tier {} ({}) failed, not retryable: {}", number, tier.name(), e);
            }
        }
        outcome
    }
}

fn record_outcome(provenance: Provenance, started: Instant) {
    metrics::counter!("cascade.resolved", "provenance" => provenance.as_str()).increment(1);
    metrics::histogram!("cascade.total_ms").record(started.elapsed().as_secs_f64() * 1e3);
}
