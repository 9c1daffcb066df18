use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub inference_backend: String,
    pub checks: HealthChecks,
    pub queue: QueueStatus,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub database: ComponentHealth,
    pub inference: ComponentHealth,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub status: String,
    pub backend: String,
    pub latency_ms: Option<u64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub in_flight: usize,
    pub subscribers: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    pub message: String,
    pub version: String,
    pub inference_backend: String,
}

/// GET /: service banner.
pub async fn service_info(State(state): State<AppState>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        message: "media-verify API is running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        inference_backend: state.orchestrator.backend().name().to_string(),
    })
}

/// GET /health: dependency status plus live queue counters.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let store = state.orchestrator.store();
    let start = std::time::Instant::now();
    let db_check = match store.health_check().await {
        Ok(_) => ComponentHealth {
            status: "ok".to_string(),
            backend: store.kind().to_string(),
            latency_ms: Some(start.elapsed().as_millis() as u64),
        },
        Err(e) => {
            tracing::warn!(error = %e, "Database health check failed");
            ComponentHealth {
                status: "error".to_string(),
                backend: store.kind().to_string(),
                latency_ms: None,
            }
        }
    };

    let backend = state.orchestrator.backend();
    let inference_start = std::time::Instant::now();
    let inference_check = match backend.health_check().await {
        Ok(_) => ComponentHealth {
            status: "ok".to_string(),
            backend: backend.name().to_string(),
            latency_ms: Some(inference_start.elapsed().as_millis() as u64),
        },
        Err(e) => {
            tracing::warn!(error = %e, "Inference health check failed");
            ComponentHealth {
                status: "error".to_string(),
                backend: backend.name().to_string(),
                latency_ms: None,
            }
        }
    };

    let db_healthy = db_check.status == "ok";
    let all_healthy = db_healthy && inference_check.status == "ok";
    // Only the record store gates readiness.
    let status_code = if db_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let hub = state.hub();
    let response = HealthResponse {
        status: if all_healthy {
            "healthy".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        inference_backend: backend.name().to_string(),
        checks: HealthChecks {
            database: db_check,
            inference: inference_check,
        },
        queue: QueueStatus {
            in_flight: hub.len(),
            subscribers: hub.subscriber_count(),
        },
    };

    (status_code, Json(response))
}
