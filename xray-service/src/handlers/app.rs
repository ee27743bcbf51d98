use crate::startup::AppState;
use askama::Template;
use axum::{
    extract::State,
    http::{header, StatusCode, Uri},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use service_core::error::AppError;

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub default_prompt: String,
    pub max_upload_mb: usize,
}

pub async fn index(State(state): State<AppState>) -> impl IntoResponse {
    IndexTemplate {
        default_prompt: state.analyzer.default_prompt().to_string(),
        max_upload_mb: state.analyzer.max_upload_bytes().div_ceil(1024 * 1024),
    }
}

/// Liveness check.
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "xray-service",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Readiness check: credentials readable and provider configured.
pub async fn readiness_check(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state.analyzer.check_ready().await.map_err(|reason| {
        tracing::warn!(%reason, "Readiness check failed");
        AppError::ServiceUnavailable(reason)
    })?;
    Ok(StatusCode::OK)
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

pub async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(anyhow::anyhow!("No route for {}", uri.path()))
}
