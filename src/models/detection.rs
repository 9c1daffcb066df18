use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::models::case::MediaKind;
use crate::services::validation;

/// One uploaded file as received from the caller.
#[derive(Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

impl std::fmt::Debug for UploadedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadedFile")
            .field("filename", &self.filename)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// A request to analyse media, validated against the rules for its kind.
#[derive(Debug, Clone, Validate)]
#[garde(context(MediaKind))]
pub struct Submission {
    #[garde(skip)]
    pub media_kind: MediaKind,

    #[garde(custom(validation::check_uploads))]
    pub files: Vec<UploadedFile>,
}

impl Submission {
    pub fn new(media_kind: MediaKind, files: Vec<UploadedFile>) -> Self {
        Self { media_kind, files }
    }

    pub fn filenames(&self) -> Vec<String> {
        self.files.iter().map(|f| f.filename.clone()).collect()
    }
}

/// Result returned to the submitter once a case completes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub case_id: String,
    pub verdict: String,
    pub confidence: f64,
    pub explanation: String,
    #[serde(flatten)]
    pub details: MediaDetails,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MediaDetails {
    Image(ImageDetails),
    Video(VideoDetails),
    Audio(AudioDetails),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageDetails {
    pub filename: String,
    pub predicted_label: String,
    pub is_fake: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoDetails {
    pub filename: String,
    pub duration_sec: f64,
    pub frames_analyzed: usize,
    pub is_fake: bool,
    pub frame_details: Vec<FrameClassification>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioDetails {
    pub similarity_score: f64,
    pub is_same_speaker: bool,
    pub threshold: f64,
}

/// Label and confidence (0–100) assigned to one image or video frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameClassification {
    pub label: String,
    pub confidence: f64,
}

impl FrameClassification {
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }

    /// Whether the label names a manipulated class.
    pub fn is_fake_label(&self) -> bool {
        matches!(
            self.label.to_lowercase().as_str(),
            "fake" | "deepfake" | "manipulated"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_flattens_details() {
        let report = AnalysisReport {
            case_id: "case-abc".to_string(),
            verdict: "Same Speaker (90% similarity)".to_string(),
            confidence: 90.0,
            explanation: "ok".to_string(),
            details: MediaDetails::Audio(AudioDetails {
                similarity_score: 0.9,
                is_same_speaker: true,
                threshold: 0.86,
            }),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["caseId"], "case-abc");
        assert_eq!(json["isSameSpeaker"], true);
        assert_eq!(json["threshold"], 0.86);
    }

    #[test]
    fn test_fake_labels() {
        assert!(FrameClassification::new("Deepfake", 80.0).is_fake_label());
        assert!(FrameClassification::new("FAKE", 80.0).is_fake_label());
        assert!(!FrameClassification::new("Realism", 80.0).is_fake_label());
    }
}
