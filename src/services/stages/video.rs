use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::{
    clamp_score, explain_visual, likelihood_verdict, round_to, ProgressReporter, StageExecutor,
    StageOutcome,
};
use crate::models::case::{MediaKind, SubScores};
use crate::models::detection::{FrameClassification, MediaDetails, UploadedFile, VideoDetails};
use crate::models::queue::StageLabel;
use crate::services::inference::{InferenceBackend, InferenceError};

/// Frames sampled from each video.
pub const SAMPLE_FRAMES: usize = 8;

/// Mean fake-frame confidence above which a video is reported manipulated.
pub const VIDEO_FAKE_THRESHOLD: f64 = 60.0;

const ANALYZE_START: u8 = 30;
const ANALYZE_END: u8 = 70;

/// preprocessing (15) → analyzing (30..70, per frame) → llm_explaining (80)
pub struct VideoExecutor {
    backend: Arc<dyn InferenceBackend>,
}

/// `count` frame positions evenly spaced over `[0, total - 1]`.
///
/// Videos with zero or one frame yield position 0 for every sample.
pub fn sample_indices(total_frames: u64, count: usize) -> Vec<u64> {
    let last = total_frames.saturating_sub(1);
    match count {
        0 => Vec::new(),
        1 => vec![0],
        _ => {
            let steps = (count - 1) as u128;
            (0..count as u128)
                .map(|k| (k * u128::from(last) / steps) as u64)
                .collect()
        }
    }
}

/// Progress after classifying frame `index` (0-based) of `total`.
fn frame_progress(index: usize, total: usize) -> u8 {
    let span = u64::from(ANALYZE_END - ANALYZE_START);
    let done = (index as u64 + 1).min(total as u64);
    ANALYZE_START + (done * span / total.max(1) as u64) as u8
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoVerdict {
    pub is_fake: bool,
    pub confidence: f64,
    pub mean_fake_confidence: f64,
    /// Share of frames whose label agrees with the verdict, 0–100.
    pub agreement: f64,
}

/// Aggregate frame classifications into one verdict.
pub fn decide(frames: &[FrameClassification]) -> VideoVerdict {
    let fake: Vec<f64> = frames
        .iter()
        .filter(|f| f.is_fake_label())
        .map(|f| f.confidence)
        .collect();

    let mean_fake_confidence = if fake.is_empty() {
        0.0
    } else {
        fake.iter().sum::<f64>() / fake.len() as f64
    };

    let is_fake = mean_fake_confidence > VIDEO_FAKE_THRESHOLD;
    let confidence = if is_fake {
        mean_fake_confidence
    } else {
        100.0 - mean_fake_confidence
    };

    let agreeing = if is_fake {
        fake.len()
    } else {
        frames.len() - fake.len()
    };
    let agreement = if frames.is_empty() {
        0.0
    } else {
        agreeing as f64 * 100.0 / frames.len() as f64
    };

    VideoVerdict {
        is_fake,
        confidence: confidence.clamp(0.0, 100.0),
        mean_fake_confidence,
        agreement,
    }
}

impl VideoExecutor {
    pub fn new(backend: Arc<dyn InferenceBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl StageExecutor for VideoExecutor {
    fn media_kind(&self) -> MediaKind {
        MediaKind::Video
    }

    async fn run(
        &self,
        files: &[UploadedFile],
        progress: &ProgressReporter,
    ) -> Result<StageOutcome, InferenceError> {
        let file = files
            .first()
            .ok_or_else(|| InferenceError::Decode("no video supplied".to_string()))?;

        progress.advance(15, StageLabel::Preprocessing);
        let probe = self.backend.probe_video(&file.bytes).await?;
        let indices = sample_indices(probe.total_frames, SAMPLE_FRAMES);
        let frames: Vec<Vec<u8>> = self
            .backend
            .extract_frames(&file.bytes, &indices)
            .await?
            .into_iter()
            .flatten()
            .collect();

        if frames.len() < indices.len() {
            warn!(
                case_id = %progress.case_id(),
                requested = indices.len(),
                decoded = frames.len(),
                total_frames = probe.total_frames,
                "Some sampled frames could not be decoded"
            );
        }
        if frames.is_empty() {
            return Err(InferenceError::NoDecodableFrames);
        }

        progress.advance(ANALYZE_START, StageLabel::Analyzing);
        let mut results = Vec::with_capacity(frames.len());
        for (i, frame) in frames.iter().enumerate() {
            results.push(self.backend.classify(frame).await?);
            progress.advance(frame_progress(i, frames.len()), StageLabel::Analyzing);
        }

        let verdict = decide(&results);
        info!(
            case_id = %progress.case_id(),
            frames = results.len(),
            mean_fake_confidence = verdict.mean_fake_confidence,
            is_fake = verdict.is_fake,
            "Video frames classified"
        );

        progress.advance(80, StageLabel::LlmExplaining);
        let explanation = explain_visual(MediaKind::Video, verdict.is_fake, verdict.confidence);

        Ok(StageOutcome {
            confidence: round_to(verdict.confidence, 1),
            verdict: likelihood_verdict(verdict.is_fake, verdict.confidence),
            scores: SubScores {
                face: Some(clamp_score(verdict.confidence)),
                voice: None,
                lipsync: Some(clamp_score(verdict.agreement)),
            },
            explanation,
            details: MediaDetails::Video(VideoDetails {
                filename: file.filename.clone(),
                duration_sec: round_to(probe.duration_secs(), 2),
                frames_analyzed: results.len(),
                is_fake: verdict.is_fake,
                frame_details: results,
            }),
        })
    }
}
