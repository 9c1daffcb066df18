//! Per-media-kind analysis pipelines.
//!
//! Each executor runs its stages in a fixed order and reports progress to the
//! live queue after every stage. A report is applied to the hub before the
//! next stage starts.

use std::sync::Arc;

use async_trait::async_trait;

use crate::models::case::{MediaKind, SubScores};
use crate::models::detection::{MediaDetails, UploadedFile};
use crate::models::queue::StageLabel;
use crate::services::hub::QueueHub;
use crate::services::inference::{InferenceBackend, InferenceError};

pub mod audio;
pub mod image;
pub mod video;

pub use self::audio::AudioExecutor;
pub use self::image::ImageExecutor;
pub use self::video::VideoExecutor;

/// Verdict and supporting data produced by a completed stage sequence.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    /// Confidence in the reported label, 0–100.
    pub confidence: f64,
    pub verdict: String,
    pub scores: SubScores,
    pub explanation: String,
    pub details: MediaDetails,
}

#[async_trait]
pub trait StageExecutor: Send + Sync {
    fn media_kind(&self) -> MediaKind;

    async fn run(
        &self,
        files: &[UploadedFile],
        progress: &ProgressReporter,
    ) -> Result<StageOutcome, InferenceError>;
}

/// Build the executor for a media kind.
pub fn executor_for(kind: MediaKind, backend: Arc<dyn InferenceBackend>) -> Box<dyn StageExecutor> {
    match kind {
        MediaKind::Image => Box::new(ImageExecutor::new(backend)),
        MediaKind::Audio => Box::new(AudioExecutor::new(backend)),
        MediaKind::Video => Box::new(VideoExecutor::new(backend)),
    }
}

/// Writes one case's stage progress into the live queue.
pub struct ProgressReporter {
    hub: Arc<QueueHub>,
    case_id: String,
}

impl ProgressReporter {
    pub fn new(hub: Arc<QueueHub>, case_id: impl Into<String>) -> Self {
        Self {
            hub,
            case_id: case_id.into(),
        }
    }

    pub fn case_id(&self) -> &str {
        &self.case_id
    }

    /// Record a stage checkpoint. Returns once the hub has applied and
    /// broadcast it.
    pub fn advance(&self, progress: u8, stage: StageLabel) {
        tracing::debug!(case_id = %self.case_id, progress, stage = %stage, "Stage checkpoint");
        self.hub.update_progress(&self.case_id, progress, stage);
    }

    /// Final checkpoint once every stage has succeeded.
    pub fn finish(&self) {
        self.advance(100, StageLabel::SendingResult);
    }
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

pub(crate) fn clamp_score(value: f64) -> f64 {
    round_to(value.clamp(0.0, 100.0), 1)
}

/// "NN% Likely Manipulated" / "NN% Likely Authentic".
pub(crate) fn likelihood_verdict(is_fake: bool, confidence: f64) -> String {
    format!(
        "{confidence:.0}% Likely {}",
        if is_fake { "Manipulated" } else { "Authentic" }
    )
}

/// Human-readable explanation for a visual verdict.
pub(crate) fn explain_visual(kind: MediaKind, is_fake: bool, confidence: f64) -> String {
    match (kind, is_fake) {
        (MediaKind::Video, true) => format!(
            "Multi-frame analysis detected deepfake indicators with {confidence:.1}% confidence. \
             Inconsistencies were found in facial movements, temporal coherence, and lipsync \
             patterns across analyzed frames."
        ),
        (_, true) => format!(
            "Analysis detected manipulation artifacts with {confidence:.1}% confidence. Visual \
             inconsistencies were found in facial features, lighting patterns, and texture \
             details that are characteristic of AI-generated or manipulated content."
        ),
        (_, false) => format!(
            "Analysis found no significant manipulation indicators. The content appears \
             authentic with {confidence:.1}% confidence."
        ),
    }
}
