//! Prometheus recorder for the `metrics` facade.

use crate::error::AppError;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::sync::Mutex;

static HANDLE: Mutex<Option<PrometheusHandle>> = Mutex::new(None);

const HTTP_DURATION_BUCKETS: &[f64] = &[0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];
const PROVIDER_LATENCY_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0];

/// Install the global recorder, or return the existing handle if one is
/// already installed in this process.
pub fn init_metrics() -> Result<PrometheusHandle, AppError> {
    let mut guard = HANDLE
        .lock()
        .map_err(|_| AppError::InternalError(anyhow::anyhow!("metrics handle lock poisoned")))?;

    if let Some(handle) = guard.as_ref() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("http_request_duration_seconds".to_string()),
            HTTP_DURATION_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Suffix("provider_latency_seconds".to_string()),
            PROVIDER_LATENCY_BUCKETS,
        )?
        .install_recorder()?;

    *guard = Some(handle.clone());
    tracing::info!("Prometheus metrics initialized");

    Ok(handle)
}
