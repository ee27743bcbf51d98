//! Gemini wire-format tests against a local mock server.

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::{api_key_credentials, bmp_bytes, png_bytes, TEST_API_KEY};
use secrecy::Secret;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use xray_service::error::AnalyzeError;
use xray_service::models::{AnalyzeRequest, ImageUpload, DEFAULT_PROMPT};
use xray_service::services::credentials::{AccessToken, Authorization};
use xray_service::services::decode_image;
use xray_service::services::providers::gemini::{GeminiConfig, GeminiVisionProvider};
use xray_service::services::providers::{FinishReason, ProviderError, VisionProvider};
use xray_service::services::Analyzer;

const MODEL: &str = "gemini-test";
const GENERATE_PATH: &str = "/models/gemini-test:generateContent";

fn provider(server: &MockServer) -> GeminiVisionProvider {
    GeminiVisionProvider::new(GeminiConfig {
        model: MODEL.to_string(),
        api_base: server.uri(),
        timeout: Duration::from_secs(5),
    })
    .unwrap()
}

fn api_key() -> Authorization {
    Authorization::ApiKey(Secret::new(TEST_API_KEY.to_string()))
}

fn success_body(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP"
        }],
        "usageMetadata": {"promptTokenCount": 270, "candidatesTokenCount": 12}
    })
}

async fn last_request_body(server: &MockServer) -> Value {
    let requests = server.received_requests().await.unwrap();
    let request = requests.last().expect("no request received");
    serde_json::from_slice(&request.body).unwrap()
}

#[tokio::test]
async fn api_key_request_carries_prompt_and_inline_image() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(header("x-goog-api-key", TEST_API_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body("No fracture detected.")))
        .expect(1)
        .mount(&server)
        .await;

    let image = decode_image(&png_bytes(6, 4)).unwrap();
    let response = provider(&server)
        .generate(&api_key(), "Check the femur.", &image)
        .await
        .unwrap();

    assert_eq!(response.text, "No fracture detected.");
    assert_eq!(response.input_tokens, 270);
    assert_eq!(response.output_tokens, 12);
    assert_eq!(response.finish_reason, FinishReason::Complete);

    let body = last_request_body(&server).await;
    let parts = &body["contents"][0]["parts"];
    assert_eq!(parts[0]["text"], "Check the femur.");
    assert_eq!(parts[1]["inlineData"]["mimeType"], "image/png");
    assert!(!parts[1]["inlineData"]["data"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn bearer_token_is_sent_as_authorization_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(header("authorization", "Bearer ya29.test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body("ok")))
        .expect(1)
        .mount(&server)
        .await;

    let token = AccessToken::new(
        "ya29.test-token".to_string(),
        Utc::now() + ChronoDuration::hours(1),
    );
    let image = decode_image(&png_bytes(2, 2)).unwrap();

    let response = provider(&server)
        .generate(&Authorization::Bearer(token), "prompt", &image)
        .await
        .unwrap();
    assert_eq!(response.text, "ok");

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0]
        .headers
        .iter()
        .all(|(name, _)| name.as_str() != "x-goog-api-key"));
}

#[tokio::test]
async fn text_parts_are_joined() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {"parts": [{"text": "Mild "}, {"text": "osteoarthritis."}]},
                "finishReason": "STOP"
            }]
        })))
        .mount(&server)
        .await;

    let image = decode_image(&png_bytes(2, 2)).unwrap();
    let response = provider(&server).generate(&api_key(), "p", &image).await.unwrap();

    assert_eq!(response.text, "Mild osteoarthritis.");
    assert_eq!(response.input_tokens, 0);
}

#[tokio::test]
async fn server_error_is_reported_with_upstream_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": {"code": 500, "message": "An internal error has occurred.", "status": "INTERNAL"}
        })))
        .mount(&server)
        .await;

    let image = decode_image(&png_bytes(2, 2)).unwrap();
    let err = provider(&server).generate(&api_key(), "p", &image).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Gemini API error 500 Internal Server Error: An internal error has occurred."
    );

    match err {
        ProviderError::ApiError(message) => {
            assert!(message.contains("500"), "{}", message);
            assert!(message.contains("An internal error has occurred."), "{}", message);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn too_many_requests_is_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"code": 429, "message": "Resource has been exhausted", "status": "RESOURCE_EXHAUSTED"}
        })))
        .mount(&server)
        .await;

    let image = decode_image(&png_bytes(2, 2)).unwrap();
    let err = provider(&server).generate(&api_key(), "p", &image).await.unwrap_err();

    assert!(matches!(err, ProviderError::RateLimited(ref m) if m == "Resource has been exhausted"));
}

#[tokio::test]
async fn forbidden_is_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {"code": 403, "message": "Request had insufficient authentication scopes.", "status": "PERMISSION_DENIED"}
        })))
        .mount(&server)
        .await;

    let image = decode_image(&png_bytes(2, 2)).unwrap();
    let err = provider(&server).generate(&api_key(), "p", &image).await.unwrap_err();

    assert!(matches!(err, ProviderError::Unauthorized(_)));
}

#[tokio::test]
async fn invalid_api_key_reason_is_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {
                "code": 400,
                "message": "API key not valid. Please pass a valid API key.",
                "status": "INVALID_ARGUMENT",
                "details": [{"@type": "type.googleapis.com/google.rpc.ErrorInfo", "reason": "API_KEY_INVALID"}]
            }
        })))
        .mount(&server)
        .await;

    let image = decode_image(&png_bytes(2, 2)).unwrap();
    let err = provider(&server).generate(&api_key(), "p", &image).await.unwrap_err();

    assert!(matches!(err, ProviderError::Unauthorized(ref m) if m.starts_with("API key not valid")));
}

#[tokio::test]
async fn blocked_prompt_is_content_filtered() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        })))
        .mount(&server)
        .await;

    let image = decode_image(&png_bytes(2, 2)).unwrap();
    let err = provider(&server).generate(&api_key(), "p", &image).await.unwrap_err();

    assert!(matches!(err, ProviderError::ContentFiltered(ref m) if m.contains("SAFETY")));
}

#[tokio::test]
async fn safety_stop_without_text_is_content_filtered() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"finishReason": "SAFETY"}]
        })))
        .mount(&server)
        .await;

    let image = decode_image(&png_bytes(2, 2)).unwrap();
    let err = provider(&server).generate(&api_key(), "p", &image).await.unwrap_err();

    assert!(matches!(err, ProviderError::ContentFiltered(_)));
}

#[tokio::test]
async fn analyzer_relays_transcoded_upload_to_gemini() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(header("x-goog-api-key", TEST_API_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body("Normal chest film.")))
        .expect(1)
        .mount(&server)
        .await;

    let analyzer = Analyzer::new(
        api_key_credentials(),
        Arc::new(provider(&server)),
        DEFAULT_PROMPT,
        1024 * 1024,
    );

    let result = analyzer
        .analyze(AnalyzeRequest {
            file: Some(ImageUpload {
                file_name: Some("chest.bmp".to_string()),
                content_type: Some("image/bmp".to_string()),
                data: bmp_bytes(4, 4).into(),
            }),
            text: None,
        })
        .await
        .unwrap();

    assert_eq!(result.generated_text, "Normal chest film.");

    let body = last_request_body(&server).await;
    let parts = &body["contents"][0]["parts"];
    assert_eq!(parts[0]["text"], DEFAULT_PROMPT);
    assert_eq!(parts[1]["inlineData"]["mimeType"], "image/png");
}

#[tokio::test]
async fn analyzer_maps_rejected_key_to_configuration_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {"code": 403, "message": "Permission denied.", "status": "PERMISSION_DENIED"}
        })))
        .mount(&server)
        .await;

    let analyzer = Analyzer::new(
        api_key_credentials(),
        Arc::new(provider(&server)),
        DEFAULT_PROMPT,
        1024 * 1024,
    );

    let err = analyzer
        .analyze(AnalyzeRequest {
            file: Some(ImageUpload {
                file_name: None,
                content_type: None,
                data: png_bytes(2, 2).into(),
            }),
            text: Some("Any issues?".to_string()),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, AnalyzeError::Configuration(_)));
    assert_eq!(err.to_string(), "Failed to configure Gemini API: Permission denied.");
}
