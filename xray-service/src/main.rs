use service_core::observability::{init_tracing, shutdown_tracing};
use xray_service::config::XrayConfig;
use xray_service::startup::Application;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = XrayConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    init_tracing(
        "xray-service",
        &config.common.log_level,
        config.common.otlp_endpoint.as_deref(),
    )?;

    let application = Application::build(config).await.map_err(|e| {
        tracing::error!("Failed to build application: {}", e);
        anyhow::anyhow!("Startup error: {}", e)
    })?;

    let result = application.run_until_stopped().await;
    if let Err(e) = &result {
        tracing::error!("HTTP server error: {}", e);
    }

    shutdown_tracing();
    result.map_err(Into::into)
}
