//! Remote tier backed by an OpenAI-compatible chat-completions endpoint
//! (OpenRouter by default) with a vision model.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::RemoteError;
use crate::identify::remote::{IdentifyRequest, RemoteResponse, RemoteTier};
use crate::IdentifyConfig;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ChatResponse {
    choices: Vec<Choice>,
    error: Option<ApiError>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

pub struct OpenRouterTier {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    referer: Option<String>,
    title: String,
    timeout: Duration,
}

impl OpenRouterTier {
    /// Shared HTTP client honoring the configured request timeout.
    pub fn http_client(config: &IdentifyConfig) -> Result<Client, RemoteError> {
        let timeout = Duration::from_millis(config.request_timeout_ms);
        Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| RemoteError::NotConfigured(format!("http client: {e}")))
    }

    pub fn new(client: Client, config: &IdentifyConfig, model: &str) -> Result<Self, RemoteError> {
        let api_key = config.resolve_api_key().ok_or_else(|| {
            RemoteError::NotConfigured(format!(
                "no API key (set identify.api_key or {})",
                config.api_key_env
            ))
        })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
            model: model.to_owned(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            referer: config.referer.clone(),
            title: config.app_title.clone(),
            timeout: Duration::from_millis(config.request_timeout_ms),
        })
    }

    fn build_request<'a>(&'a self, request: &IdentifyRequest) -> ChatRequest<'a> {
        let data_url = format!("data:image/jpeg;base64,{}", BASE64.encode(&request.image));
        ChatRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            messages: vec![Message {
                role: "user",
                content: vec![
                    ContentPart::Text {
                        text: identification_prompt(&chrono::Utc::now().format("%Y-%m-%d").to_string()),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: data_url },
                    },
                ],
            }],
        }
    }
}

#[async_trait]
impl RemoteTier for OpenRouterTier {
    fn name(&self) -> &str {
        &self.model
    }

    #[instrument(skip_all, fields(model = %self.model, bytes = request.image.len()))]
    async fn identify(&self, request: &IdentifyRequest) -> Result<RemoteResponse, RemoteError> {
        let body = self.build_request(request);

        let mut http = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header("X-Title", &self.title)
            .json(&body);
        if let Some(referer) = &self.referer {
            http = http.header("HTTP-Referer", referer);
        }

        let to_remote = |e| request_error(e, self.timeout);
        let response = http.send().await.map_err(to_remote)?;
        let status = response.status();
        let text = response.text().await.map_err(to_remote)?;

        if !status.is_success() {
            return Err(status_error(status, &text));
        }
        parse_completion(status, &text)
    }
}

/// Map a client failure, reporting timeouts with the configured limit.
fn request_error(err: reqwest::Error, timeout: Duration) -> RemoteError {
    if err.is_timeout() {
        RemoteError::Timeout(timeout)
    } else if err.is_decode() {
        RemoteError::Malformed(err.to_string())
    } else {
        RemoteError::Transport(err.to_string())
    }
}

fn status_error(status: StatusCode, body: &str) -> RemoteError {
    let message = snippet(body);
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        RemoteError::Unavailable(format!("HTTP {}: {}", status.as_u16(), message))
    } else {
        RemoteError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}

fn parse_completion(status: StatusCode, text: &str) -> Result<RemoteResponse, RemoteError> {
    let completion: ChatResponse = serde_json::from_str(text)?;

    if let Some(error) = completion.error {
        let code = error
            .code
            .as_ref()
            .and_then(serde_json::Value::as_u64)
            .and_then(|c| u16::try_from(c).ok())
            .unwrap_or(status.as_u16());
        return Err(RemoteError::Rejected {
            status: code,
            message: error.message,
        });
    }

    if let Some(usage) = &completion.usage {
        debug!(
            "Token usage: prompt={}, completion={}, total={}",
            usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
        );
    }

    let content = completion
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| RemoteError::Malformed("no choices in response".into()))?;

    let json = strip_code_fences(&content);
    serde_json::from_str(json).map_err(|e| {
        RemoteError::Malformed(format!("{e}; content starts with {:?}", snippet(json)))
    })
}

/// Remove a surrounding markdown code fence, with or without a language tag.
pub(crate) fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip an info string such as `json`.
    let rest = match rest.find('\n') {
        Some(nl) if !rest[..nl].trim_start().starts_with('{') => &rest[nl + 1..],
        _ => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn snippet(text: &str) -> String {
    text.chars().take(200).collect()
}

fn identification_prompt(today: &str) -> String {
    format!(
        r#"You identify consumer products in photos. Today's date is {today}.
Products newer than your training data may exist, so describe what you observe rather than guessing model numbers.

Reply with a single JSON object and nothing else:
{{
  "brand": "manufacturer, or empty if unknown",
  "model": "exact model, only if certain; otherwise empty",
  "category": "product category, e.g. headphones",
  "key_attributes": ["color", "material", "form factor", "visible markings"],
  "searchQuery": "shopping search query built from brand, product line and observed attributes",
  "confidence": 0.0,
  "notes": "what made identification uncertain"
}}

Confidence: 0.9 or more when brand and exact model are certain, 0.7 to 0.9 for brand and product line, 0.5 to 0.7 for brand and product type, below 0.5 when guessing.
A wrong model is worse than an empty one."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fences_with_and_without_language() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```{\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn status_classification() {
        assert!(status_error(StatusCode::TOO_MANY_REQUESTS, "slow down").is_retryable());
        assert!(status_error(StatusCode::BAD_GATEWAY, "").is_retryable());
        let err = status_error(StatusCode::UNAUTHORIZED, "bad key");
        assert!(!err.is_retryable());
        assert!(matches!(err, RemoteError::Rejected { status: 401, .. }));
    }

    #[test]
    fn body_error_object_is_rejected() {
        let err = parse_completion(
            StatusCode::OK,
            r#"{"error":{"message":"model not found","code":404}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, RemoteError::Rejected { status: 404, .. }));
    }

    #[test]
    fn parses_fenced_content() {
        let body = serde_json::json!({
            "choices": [{"message": {"content":
                "```json\n{\"brand\":\"Nike\",\"model\":\"Air Max 90\",\"confidence\":0.91}\n```"}}]
        })
        .to_string();
        let resp = parse_completion(StatusCode::OK, &body).unwrap();
        assert_eq!(resp.brand, "Nike");
        assert_eq!(resp.model, "Air Max 90");
    }

    #[test]
    fn missing_choices_is_malformed() {
        let err = parse_completion(StatusCode::OK, r#"{"choices":[]}"#).unwrap_err();
        assert!(matches!(err, RemoteError::Malformed(_)));
        assert!(!err.is_retryable());
    }
}
