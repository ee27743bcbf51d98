//! Application startup and lifecycle management.

use crate::config::{CredentialSettings, CredentialSource, XrayConfig};
use crate::handlers::{
    analyze::analyze_image,
    app::{health_check, index, metrics, not_found, readiness_check},
};
use crate::services::credentials::{
    ApiKeyCredentials, CredentialProvider, OAuthCredentials, OAuthSettings,
};
use crate::services::providers::gemini::{GeminiConfig, GeminiVisionProvider};
use crate::services::providers::VisionProvider;
use crate::services::Analyzer;
use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use service_core::error::AppError;
use service_core::middleware::{
    make_request_span, metrics_middleware, request_id_middleware, security_headers_middleware,
};
use service_core::observability::init_metrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;

/// Room for multipart framing and the `text` field on top of the file limit.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub analyzer: Arc<Analyzer>,
    pub metrics: PrometheusHandle,
}

impl AppState {
    pub fn new(analyzer: Arc<Analyzer>, metrics: PrometheusHandle) -> Self {
        Self { analyzer, metrics }
    }
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = state
        .analyzer
        .max_upload_bytes()
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    Router::new()
        .route("/", get(index))
        .route("/analyze", post(analyze_image))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(from_fn(security_headers_middleware))
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span::<Body>))
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

/// Build the credential provider for the configured source.
pub fn build_credentials(
    settings: &CredentialSettings,
    timeout: Duration,
) -> Result<Arc<dyn CredentialProvider>, AppError> {
    match settings.source {
        CredentialSource::ApiKey => {
            let key = settings.api_key.clone().ok_or_else(|| {
                AppError::ConfigError(anyhow::anyhow!(
                    "GOOGLE_API_KEY is required when GENAI_CREDENTIAL_SOURCE=api_key"
                ))
            })?;
            let credentials = ApiKeyCredentials::new(key)
                .map_err(|e| AppError::ConfigError(anyhow::Error::new(e)))?;
            Ok(Arc::new(credentials))
        }
        CredentialSource::ServiceAccount => {
            let credentials = OAuthCredentials::new(OAuthSettings {
                credentials_file: settings.credentials_file.clone(),
                scope: settings.oauth_scope.clone(),
                cache_tokens: settings.cache_tokens,
                timeout,
            })
            .map_err(|e| AppError::ConfigError(anyhow::Error::new(e)))?;
            Ok(Arc::new(credentials))
        }
    }
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: XrayConfig) -> Result<Self, AppError> {
        let timeout = Duration::from_secs(config.model.timeout_secs);

        let credentials = build_credentials(&config.credentials, timeout)?;
        if let Err(e) = credentials.check().await {
            // The file may be mounted after startup; /ready reports it until then.
            tracing::warn!(error = %e, "Credentials are not usable yet");
        }

        let provider: Arc<dyn VisionProvider> = Arc::new(
            GeminiVisionProvider::new(GeminiConfig {
                model: config.model.name.clone(),
                api_base: config.model.api_base.clone(),
                timeout,
            })
            .map_err(|e| AppError::ConfigError(anyhow::Error::new(e)))?,
        );

        tracing::info!(
            credential_source = ?config.credentials.source,
            credentials_file = %config.credentials.credentials_file.display(),
            cache_tokens = config.credentials.cache_tokens,
            model = %config.model.name,
            "Initialized Gemini vision provider"
        );

        let analyzer = Analyzer::new(
            credentials,
            provider,
            config.model.default_prompt.clone(),
            config.upload.max_bytes,
        );

        let state = AppState::new(Arc::new(analyzer), init_metrics()?);

        Self::build_with_state(&config, state).await
    }

    /// Bind a listener for an already assembled state.
    pub async fn build_with_state(config: &XrayConfig, state: AppState) -> Result<Self, AppError> {
        let address = config.common.bind_address();
        let listener = TcpListener::bind(&address).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", address, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("xray-service listening on port {}", port);

        Ok(Self {
            port,
            listener,
            router: build_router(state),
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
