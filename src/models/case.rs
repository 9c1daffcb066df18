use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Kind of media a case was submitted with.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    /// A pair of voice recordings compared for speaker identity.
    Audio,
}

/// Lifecycle status of a case.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CaseStatus {
    Analyzing,
    Completed,
    Failed,
}

impl CaseStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, CaseStatus::Analyzing)
    }
}

pub const PROCESSING_VERDICT: &str = "Processing...";
pub const FAILED_VERDICT: &str = "Analysis Failed";

/// Optional per-modality sub-scores, each in [0, 100].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubScores {
    pub face: Option<f64>,
    pub voice: Option<f64>,
    pub lipsync: Option<f64>,
}

/// Terminal success payload written by `commit_success`.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseOutcome {
    pub confidence: f64,
    pub verdict: String,
    pub scores: SubScores,
    pub explanation: String,
    pub duration_ms: i64,
}

/// Durable record of one submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: String,
    pub media_type: MediaKind,
    pub status: CaseStatus,
    pub confidence: f64,
    pub submitted_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub verdict: String,
    pub scores: SubScores,
    pub explanation: Option<String>,
    pub worker_id: String,
    pub processing_time_ms: Option<i64>,
    pub filename: String,
}

impl JobRecord {
    /// New record in `analyzing` with a fresh case id.
    ///
    /// Multiple filenames are joined with `" vs "`, the way audio pairs are
    /// displayed.
    pub fn create(media_type: MediaKind, filenames: &[String], worker_id: impl Into<String>) -> Self {
        Self {
            id: new_case_id(),
            media_type,
            status: CaseStatus::Analyzing,
            confidence: 0.0,
            submitted_at: Utc::now(),
            completed_at: None,
            verdict: PROCESSING_VERDICT.to_string(),
            scores: SubScores::default(),
            explanation: None,
            worker_id: worker_id.into(),
            processing_time_ms: None,
            filename: filenames.join(" vs "),
        }
    }

    /// Apply a successful terminal transition.
    pub fn complete(&mut self, outcome: CaseOutcome) -> Result<(), TransitionError> {
        self.ensure_analyzing()?;
        self.status = CaseStatus::Completed;
        self.confidence = outcome.confidence;
        self.verdict = outcome.verdict;
        self.scores = outcome.scores;
        self.explanation = Some(outcome.explanation);
        self.processing_time_ms = Some(outcome.duration_ms);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Apply a failed terminal transition.
    pub fn fail(&mut self, reason: &str) -> Result<(), TransitionError> {
        self.ensure_analyzing()?;
        self.status = CaseStatus::Failed;
        self.verdict = FAILED_VERDICT.to_string();
        self.explanation = Some(reason.to_string());
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    fn ensure_analyzing(&self) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError {
                case_id: self.id.clone(),
                status: self.status,
            });
        }
        Ok(())
    }
}

/// Attempted a second terminal write on a case.
#[derive(Debug, Clone, thiserror::Error)]
#[error("case {case_id} is already {status}")]
pub struct TransitionError {
    pub case_id: String,
    pub status: CaseStatus,
}

fn new_case_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("case-{}", &hex[..12])
}
