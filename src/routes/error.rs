use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::models::case::MediaKind;
use crate::services::orchestrator::PipelineError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub code: &'static str,
    pub message: String,
}

/// Error returned by route handlers.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "BAD_REQUEST",
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "ANALYSIS_FAILED",
            message: message.into(),
        }
    }

    /// Map a pipeline failure for a given media kind.
    pub fn from_pipeline(kind: MediaKind, err: PipelineError) -> Self {
        if err.is_client_error() {
            return Self::bad_request(err.to_string());
        }
        let title = match kind {
            MediaKind::Image => "Image analysis",
            MediaKind::Audio => "Audio analysis",
            MediaKind::Video => "Video processing",
        };
        Self::internal(format!("{title} failed: {err}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            code: self.code,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}
