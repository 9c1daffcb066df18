use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::{clamp_score, round_to, ProgressReporter, StageExecutor, StageOutcome};
use crate::models::case::{MediaKind, SubScores};
use crate::models::detection::{AudioDetails, MediaDetails, UploadedFile};
use crate::models::queue::StageLabel;
use crate::services::inference::{InferenceBackend, InferenceError};

/// Cosine similarity at or above which two recordings share a speaker.
pub const SAME_SPEAKER_THRESHOLD: f64 = 0.86;

/// preprocessing (20, 35 per file) → analyzing (50) → llm_explaining (80)
pub struct AudioExecutor {
    backend: Arc<dyn InferenceBackend>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeakerVerdict {
    pub is_same_speaker: bool,
    pub similarity: f64,
    pub confidence: f64,
}

pub fn decide(similarity: f64) -> SpeakerVerdict {
    SpeakerVerdict {
        is_same_speaker: similarity >= SAME_SPEAKER_THRESHOLD,
        similarity,
        confidence: (similarity * 100.0).clamp(0.0, 100.0),
    }
}

fn verdict_text(verdict: &SpeakerVerdict) -> String {
    format!(
        "{} ({:.0}% similarity)",
        if verdict.is_same_speaker {
            "Same Speaker"
        } else {
            "Different Speakers"
        },
        verdict.confidence
    )
}

fn explain(verdict: &SpeakerVerdict) -> String {
    if verdict.is_same_speaker {
        format!(
            "Speaker verification found the two recordings consistent with a single speaker \
             ({:.1}% similarity, threshold {:.0}%). No voice cloning indicators were detected.",
            verdict.confidence,
            SAME_SPEAKER_THRESHOLD * 100.0
        )
    } else {
        format!(
            "Speaker verification found the voice characteristics differ between the two \
             recordings ({:.1}% similarity, threshold {:.0}%). This is consistent with \
             different speakers or with voice cloning or synthesis technology.",
            verdict.confidence,
            SAME_SPEAKER_THRESHOLD * 100.0
        )
    }
}

impl AudioExecutor {
    pub fn new(backend: Arc<dyn InferenceBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl StageExecutor for AudioExecutor {
    fn media_kind(&self) -> MediaKind {
        MediaKind::Audio
    }

    async fn run(
        &self,
        files: &[UploadedFile],
        progress: &ProgressReporter,
    ) -> Result<StageOutcome, InferenceError> {
        let [first, second] = files else {
            return Err(InferenceError::Decode(format!(
                "speaker comparison needs 2 recordings, got {}",
                files.len()
            )));
        };

        let mut embeddings = Vec::with_capacity(2);
        for (i, file) in [first, second].into_iter().enumerate() {
            progress.advance(20 + (i as u8) * 15, StageLabel::Preprocessing);
            let embedding = self.backend.embed(&file.bytes).await.map_err(|e| match e {
                InferenceError::Decode(reason) => {
                    InferenceError::Decode(format!("{}: {reason}", file.filename))
                }
                other => other,
            })?;
            embeddings.push(embedding);
        }

        progress.advance(50, StageLabel::Analyzing);
        let similarity = self.backend.compare(&embeddings[0], &embeddings[1]).await?;
        let verdict = decide(similarity);
        info!(
            case_id = %progress.case_id(),
            similarity,
            same_speaker = verdict.is_same_speaker,
            "Speaker embeddings compared"
        );

        progress.advance(80, StageLabel::LlmExplaining);
        let explanation = explain(&verdict);

        Ok(StageOutcome {
            confidence: round_to(verdict.confidence, 1),
            verdict: verdict_text(&verdict),
            scores: SubScores {
                voice: Some(clamp_score(verdict.confidence)),
                ..Default::default()
            },
            explanation,
            details: MediaDetails::Audio(AudioDetails {
                similarity_score: round_to(similarity, 4),
                is_same_speaker: verdict.is_same_speaker,
                threshold: SAME_SPEAKER_THRESHOLD,
            }),
        })
    }
}
