use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Register descriptions for every metric the pipeline emits.
pub fn describe_metrics() {
    metrics::describe_counter!("media_verify_jobs_total", "Cases accepted for analysis");
    metrics::describe_counter!("media_verify_jobs_completed", "Cases that completed analysis");
    metrics::describe_counter!("media_verify_jobs_failed", "Cases that ended in failure");
    metrics::describe_histogram!(
        "media_verify_processing_seconds",
        "Time from queue registration to a committed verdict"
    );
    metrics::describe_gauge!("media_verify_queue_depth", "Cases currently in the live queue");
    metrics::describe_gauge!(
        "media_verify_queue_subscribers",
        "Observers attached to the live queue"
    );
}

/// GET /metrics: Prometheus text exposition.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}
