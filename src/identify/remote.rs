use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;

use crate::error::RemoteError;

/// What a remote tier receives: an already compressed image.
#[derive(Debug, Clone)]
pub struct IdentifyRequest {
    /// JPEG bytes.
    pub image: Bytes,
    pub width: u32,
    pub height: u32,
    /// The longest side the sender downscaled to, if any.
    pub max_dimension: Option<u32>,
}

/// A tier's answer. Field names follow the JSON the vision models are asked
/// to produce.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RemoteResponse {
    pub brand: String,
    pub model: String,
    pub category: String,
    pub key_attributes: Vec<String>,
    #[serde(rename = "searchQuery", alias = "search_query", alias = "raw_label")]
    pub raw_label: String,
    pub confidence: f32,
    pub notes: String,
}

impl RemoteResponse {
    /// Ordered search terms: brand and model when both are known, else the
    /// suggested query, else whatever of brand or model is known.
    pub fn search_terms(&self) -> Vec<String> {
        let brand = self.brand.trim();
        let model = self.model.trim();
        let raw = self.raw_label.trim();

        if !brand.is_empty() && !model.is_empty() {
            vec![brand.to_owned(), model.to_owned()]
        } else if !raw.is_empty() {
            vec![raw.to_owned()]
        } else {
            [brand, model]
                .into_iter()
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect()
        }
    }
}

/// One remote identification service.
#[async_trait]
pub trait RemoteTier: Send + Sync {
    fn name(&self) -> &str;

    async fn identify(&self, request: &IdentifyRequest) -> Result<RemoteResponse, RemoteError>;
}
