use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::{
    clamp_score, explain_visual, likelihood_verdict, round_to, ProgressReporter, StageExecutor,
    StageOutcome,
};
use crate::models::case::{MediaKind, SubScores};
use crate::models::detection::{FrameClassification, ImageDetails, MediaDetails, UploadedFile};
use crate::models::queue::StageLabel;
use crate::services::inference::{InferenceBackend, InferenceError};

/// Fake-class confidence above which a single image is reported manipulated.
pub const IMAGE_FAKE_THRESHOLD: f64 = 50.0;

/// preprocessing → analyzing (30) → llm_explaining (70) → sending_result (90)
pub struct ImageExecutor {
    backend: Arc<dyn InferenceBackend>,
}

/// Decision for one classified image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageVerdict {
    pub is_fake: bool,
    /// Confidence in the reported label.
    pub confidence: f64,
}

/// Apply the single-frame threshold to a classification.
pub fn decide(classification: &FrameClassification) -> ImageVerdict {
    let confidence = classification.confidence.clamp(0.0, 100.0);
    let fake_confidence = if classification.is_fake_label() {
        confidence
    } else {
        100.0 - confidence
    };

    let is_fake = fake_confidence > IMAGE_FAKE_THRESHOLD;
    ImageVerdict {
        is_fake,
        confidence: if is_fake {
            fake_confidence
        } else {
            100.0 - fake_confidence
        },
    }
}

impl ImageExecutor {
    pub fn new(backend: Arc<dyn InferenceBackend>) -> Self {
        Self { backend }
    }

    fn preprocess(file: &UploadedFile) -> Result<(), InferenceError> {
        ::image::guess_format(&file.bytes)
            .map(|_| ())
            .map_err(|e| InferenceError::Decode(format!("{}: {e}", file.filename)))
    }
}

#[async_trait]
impl StageExecutor for ImageExecutor {
    fn media_kind(&self) -> MediaKind {
        MediaKind::Image
    }

    async fn run(
        &self,
        files: &[UploadedFile],
        progress: &ProgressReporter,
    ) -> Result<StageOutcome, InferenceError> {
        let file = files
            .first()
            .ok_or_else(|| InferenceError::Decode("no image supplied".to_string()))?;

        progress.advance(0, StageLabel::Preprocessing);
        Self::preprocess(file)?;

        progress.advance(30, StageLabel::Analyzing);
        let classification = self.backend.classify(&file.bytes).await?;
        let verdict = decide(&classification);
        info!(
            case_id = %progress.case_id(),
            label = %classification.label,
            is_fake = verdict.is_fake,
            confidence = verdict.confidence,
            "Image classified"
        );

        progress.advance(70, StageLabel::LlmExplaining);
        let explanation = explain_visual(MediaKind::Image, verdict.is_fake, verdict.confidence);

        progress.advance(90, StageLabel::SendingResult);
        let confidence = round_to(verdict.confidence, 1);
        Ok(StageOutcome {
            confidence,
            verdict: likelihood_verdict(verdict.is_fake, verdict.confidence),
            scores: SubScores {
                face: Some(clamp_score(verdict.confidence)),
                ..Default::default()
            },
            explanation,
            details: MediaDetails::Image(ImageDetails {
                filename: file.filename.clone(),
                predicted_label: classification.label,
                is_fake: verdict.is_fake,
            }),
        })
    }
}
