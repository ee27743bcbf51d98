//! Service-specific metrics, recorded through the `metrics` facade.

use metrics::{counter, histogram};

/// Record upstream model latency.
pub fn record_provider_latency(provider: &'static str, model: &str, duration_secs: f64) {
    histogram!(
        "genai_provider_latency_seconds",
        "provider" => provider,
        "model" => model.to_string()
    )
    .record(duration_secs);
}

/// Record an upstream model error.
pub fn record_provider_error(provider: &'static str, error_type: &'static str) {
    counter!(
        "genai_provider_errors_total",
        "provider" => provider,
        "error_type" => error_type
    )
    .increment(1);
}

/// Record tokens reported by the provider.
pub fn record_tokens(model: &str, input_tokens: i32, output_tokens: i32) {
    counter!("genai_tokens_total", "model" => model.to_string(), "type" => "input")
        .increment(input_tokens.max(0) as u64);
    counter!("genai_tokens_total", "model" => model.to_string(), "type" => "output")
        .increment(output_tokens.max(0) as u64);
}

/// Record the outcome of one analyze request (`ok` or an error kind).
pub fn record_analysis(outcome: &'static str) {
    counter!("xray_analyses_total", "outcome" => outcome).increment(1);
}
