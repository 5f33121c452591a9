#![cfg(feature = "remote-http")]

use std::time::Duration;

use bytes::Bytes;
use image::RgbImage;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use snapsight::capture::DecodedImage;
use snapsight::error::RemoteError;
use snapsight::identify::{IdentificationCascade, IdentifyRequest, OpenRouterTier, Provenance, RemoteTier};
use snapsight::IdentifyConfig;

const ROUTE: &str = "/api/v1/chat/completions";

fn config(server: &MockServer) -> IdentifyConfig {
    IdentifyConfig {
        endpoint: format!("{}{}", server.uri(), ROUTE),
        api_key: Some("test-key".into()),
        tier1_model: "vendor/lite-vision".into(),
        tier2_model: Some("vendor/pro-vision".into()),
        request_timeout_ms: 2_000,
        referer: Some("https://example.test".into()),
        ..IdentifyConfig::default()
    }
}

fn tier(config: &IdentifyConfig, model: &str) -> OpenRouterTier {
    let client = OpenRouterTier::http_client(config).unwrap();
    OpenRouterTier::new(client, config, model).unwrap()
}

fn request() -> IdentifyRequest {
    IdentifyRequest {
        image: Bytes::from_static(&[0xff, 0xd8, 0xff, 0xd9]),
        width: 2,
        height: 2,
        max_dimension: Some(384),
    }
}

fn completion(content: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "gen-1",
        "choices": [{"message": {"role": "assistant", "content": content.to_string()}}],
        "usage": {"prompt_tokens": 812, "completion_tokens": 64, "total_tokens": 876}
    }))
}

#[tokio::test]
async fn sends_image_and_parses_answer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ROUTE))
        .and(header("authorization", "Bearer test-key"))
        .and(header("HTTP-Referer", "https://example.test"))
        .and(body_partial_json(json!({"model": "vendor/lite-vision"})))
        .respond_with(completion(json!({
            "brand": "Logitech",
            "model": "MX Master 3S",
            "category": "computer mouse",
            "searchQuery": "logitech mx master 3s mouse",
            "confidence": 0.93
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = config(&server);
    let response = tier(&config, "vendor/lite-vision")
        .identify(&request())
        .await
        .unwrap();

    assert_eq!(response.brand, "Logitech");
    assert_eq!(response.search_terms(), vec!["Logitech", "MX Master 3S"]);
    assert!((response.confidence - 0.93).abs() < 1e-6);

    let received = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    let url = body["messages"][0]["content"][1]["image_url"]["url"]
        .as_str()
        .unwrap();
    assert!(url.starts_with("data:image/jpeg;base64,"));
    assert_eq!(body["messages"][0]["content"][0]["type"], "text");
}

#[tokio::test]
async fn overload_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream overloaded"))
        .mount(&server)
        .await;

    let config = config(&server);
    let err = tier(&config, "vendor/lite-vision")
        .identify(&request())
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Unavailable(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn bad_key_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "No auth credentials found", "code": 401}
        })))
        .mount(&server)
        .await;

    let config = config(&server);
    let err = tier(&config, "vendor/lite-vision")
        .identify(&request())
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Rejected { status: 401, .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn slow_server_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(completion(json!({"searchQuery": "mug"})).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let config = IdentifyConfig {
        request_timeout_ms: 200,
        ..config(&server)
    };
    let err = tier(&config, "vendor/lite-vision")
        .identify(&request())
        .await
        .unwrap_err();
    assert!(
        matches!(err, RemoteError::Timeout(limit) if limit == Duration::from_millis(200)),
        "{err}"
    );
    assert!(err.is_retryable());
}

#[test]
fn missing_key_is_not_configured() {
    let config = IdentifyConfig {
        api_key: None,
        api_key_env: "SNAPSIGHT_TEST_UNSET_ROUTER_KEY".into(),
        ..IdentifyConfig::default()
    };
    let client = OpenRouterTier::http_client(&config).unwrap();
    let err = OpenRouterTier::new(client, &config, "vendor/lite-vision")
        .err()
        .unwrap();
    assert!(matches!(err, RemoteError::NotConfigured(_)));
}

#[tokio::test]
async fn cascade_escalates_between_models() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"model": "vendor/lite-vision"})))
        .respond_with(completion(json!({
            "brand": "Nike",
            "category": "sneakers",
            "searchQuery": "nike white running shoes",
            "confidence": 0.45
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"model": "vendor/pro-vision"})))
        .respond_with(completion(json!({
            "brand": "Nike",
            "model": "Pegasus 41",
            "searchQuery": "nike pegasus 41",
            "confidence": 0.88
        })))
        .expect(1)
        .mount(&server)
        .await;

    let cascade = IdentificationCascade::from_config(&config(&server)).unwrap();
    let image = DecodedImage::new(RgbImage::from_pixel(1280, 960, image::Rgb([200, 200, 200])));
    let result = cascade.identify(&image, None, &()).await.unwrap();

    assert_eq!(result.provenance, Provenance::Tier2);
    assert_eq!(result.query(), "Nike Pegasus 41");
}
