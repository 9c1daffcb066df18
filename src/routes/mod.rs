use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::app_state::AppState;

pub mod detect;
pub mod error;
pub mod health;
pub mod metrics;
pub mod queue;

/// API routes without middleware layers.
pub fn router(state: AppState, prometheus: Option<Arc<PrometheusHandle>>) -> Router {
    let app = Router::new()
        .route("/", get(health::service_info))
        .route("/health", get(health::health_check))
        .route("/api/detect/image", post(detect::detect_image))
        .route("/api/detect/video", post(detect::detect_video))
        .route("/api/detect/audio", post(detect::detect_audio))
        .route("/ws/queue", get(queue::queue_ws))
        .with_state(state);

    match prometheus {
        Some(handle) => app.route(
            "/metrics",
            get(metrics::prometheus_metrics).with_state(handle),
        ),
        None => app,
    }
}
