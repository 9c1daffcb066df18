use axum::extract::{Multipart, State};
use axum::Json;

use crate::app_state::AppState;
use crate::models::case::MediaKind;
use crate::models::detection::{AnalysisReport, Submission, UploadedFile};
use crate::routes::error::ApiError;

/// POST /api/detect/image: multipart field `image`.
pub async fn detect_image(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<AnalysisReport>, ApiError> {
    analyze(&state, MediaKind::Image, "image", multipart).await
}

/// POST /api/detect/video: multipart field `video`.
pub async fn detect_video(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<AnalysisReport>, ApiError> {
    analyze(&state, MediaKind::Video, "video", multipart).await
}

/// POST /api/detect/audio: two multipart fields named `audio_files`.
pub async fn detect_audio(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<AnalysisReport>, ApiError> {
    analyze(&state, MediaKind::Audio, "audio_files", multipart).await
}

async fn analyze(
    state: &AppState,
    kind: MediaKind,
    field_name: &str,
    multipart: Multipart,
) -> Result<Json<AnalysisReport>, ApiError> {
    let files = read_files(multipart, field_name).await?;
    let report = state
        .orchestrator
        .submit(Submission::new(kind, files))
        .await
        .map_err(|e| ApiError::from_pipeline(kind, e))?;
    Ok(Json(report))
}

/// Collect every file uploaded under `field_name`, ignoring other fields.
async fn read_files(
    mut multipart: Multipart,
    field_name: &str,
) -> Result<Vec<UploadedFile>, ApiError> {
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed upload: {e}")))?
    {
        if field.name() != Some(field_name) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read {filename}: {e}")))?;
        files.push(UploadedFile::new(filename, data.to_vec()));
    }

    Ok(files)
}
