//! Shared helpers for xray-service integration tests.

#![allow(dead_code)]

use axum::Router;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use secrecy::Secret;
use service_core::config::Config;
use service_core::observability::init_metrics;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use xray_service::config::{
    CredentialSettings, CredentialSource, ModelSettings, UploadSettings, XrayConfig,
};
use xray_service::models::DEFAULT_PROMPT;
use xray_service::services::credentials::{ApiKeyCredentials, CredentialProvider};
use xray_service::services::providers::VisionProvider;
use xray_service::services::Analyzer;
use xray_service::startup::{build_router, AppState};

pub const BOUNDARY: &str = "xray-test-boundary";
pub const TEST_API_KEY: &str = "test-api-key";
pub const DEFAULT_MAX_BYTES: usize = 20 * 1024 * 1024;

pub fn encoded_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        let shade = ((x + y) % 256) as u8;
        Rgb([shade, shade, shade])
    });
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, format)
        .expect("Failed to encode test image");
    out.into_inner()
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encoded_image(width, height, ImageFormat::Png)
}

pub fn bmp_bytes(width: u32, height: u32) -> Vec<u8> {
    encoded_image(width, height, ImageFormat::Bmp)
}

/// One part of a hand-built multipart body.
pub enum Part<'a> {
    File {
        name: &'a str,
        file_name: &'a str,
        content_type: &'a str,
        data: &'a [u8],
    },
    Text {
        name: &'a str,
        value: &'a str,
    },
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::File {
                name,
                file_name,
                content_type,
                data,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                         Content-Type: {}\r\n\r\n",
                        name, file_name, content_type
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
            Part::Text { name, value } => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={}", BOUNDARY)
}

pub fn api_key_credentials() -> Arc<dyn CredentialProvider> {
    Arc::new(
        ApiKeyCredentials::new(Secret::new(TEST_API_KEY.to_string()))
            .expect("Failed to build API key credentials"),
    )
}

pub fn test_state(
    credentials: Arc<dyn CredentialProvider>,
    provider: Arc<dyn VisionProvider>,
    max_bytes: usize,
) -> AppState {
    let analyzer = Analyzer::new(credentials, provider, DEFAULT_PROMPT, max_bytes);
    AppState::new(
        Arc::new(analyzer),
        init_metrics().expect("Failed to install metrics recorder"),
    )
}

/// Router backed by API key credentials and the given provider.
pub fn test_router(provider: Arc<dyn VisionProvider>, max_bytes: usize) -> Router {
    build_router(test_state(api_key_credentials(), provider, max_bytes))
}

pub fn test_config() -> XrayConfig {
    XrayConfig {
        common: Config {
            host: "127.0.0.1".to_string(),
            port: 0,
            log_level: "info".to_string(),
            otlp_endpoint: None,
        },
        credentials: CredentialSettings {
            source: CredentialSource::ApiKey,
            credentials_file: PathBuf::from("/nonexistent/service_account.json"),
            api_key: Some(Secret::new(TEST_API_KEY.to_string())),
            oauth_scope: "https://www.googleapis.com/auth/generative-language.tuning".to_string(),
            cache_tokens: true,
        },
        model: ModelSettings {
            name: "gemini-test".to_string(),
            api_base: "http://127.0.0.1:9".to_string(),
            timeout_secs: 5,
            default_prompt: DEFAULT_PROMPT.to_string(),
        },
        upload: UploadSettings {
            max_bytes: DEFAULT_MAX_BYTES,
        },
    }
}
