//! Prometheus metrics for docsum-service.
//!
//! HTTP request metrics come from `service_core::middleware::metrics`; the
//! helpers here record document and billing events.

use metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder. Must be called once at startup.
pub fn init_metrics() -> anyhow::Result<()> {
    if METRICS_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    if METRICS_HANDLE.set(handle).is_err() {
        tracing::warn!("Metrics handle already initialized");
    }

    tracing::info!("Prometheus metrics initialized");
    Ok(())
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}

/// `format` is the extractor name, never the client-supplied MIME type.
pub fn record_document_uploaded(format: &'static str) {
    counter!("documents_uploaded_total", "format" => format).increment(1);
}

pub fn record_extraction_failure(reason: &str) {
    counter!("extraction_failures_total", "reason" => reason.to_string()).increment(1);
}

pub fn record_summary_created(provider: &str) {
    counter!("summaries_created_total", "provider" => provider.to_string()).increment(1);
}

pub fn record_summarization_failure(provider: &str, error_type: &str) {
    counter!(
        "summarization_failures_total",
        "provider" => provider.to_string(),
        "error_type" => error_type.to_string()
    )
    .increment(1);
}

pub fn record_webhook_event(event_type: &str, outcome: &str) {
    counter!(
        "webhook_events_total",
        "event_type" => event_type.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}
