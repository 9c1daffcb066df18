//! Model capabilities consumed by the stage executors.
//!
//! The pipeline only sees [`InferenceBackend`]. Which implementation backs it
//! is decided once at startup by [`select_backend`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::models::detection::FrameClassification;

pub mod remote;
pub mod simulated;

pub use remote::RemoteInferenceBackend;
pub use simulated::SimulatedInferenceBackend;

/// Frame count and rate reported for a video asset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoProbe {
    pub total_frames: u64,
    /// Zero when the container does not report a rate.
    pub fps: f64,
}

impl VideoProbe {
    pub fn duration_secs(&self) -> f64 {
        if self.fps > 0.0 {
            self.total_frames as f64 / self.fps
        } else {
            0.0
        }
    }
}

#[async_trait]
pub trait InferenceBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Classify one image as real or manipulated.
    async fn classify(&self, image: &[u8]) -> Result<FrameClassification, InferenceError>;

    /// Speaker embedding for one voice recording.
    async fn embed(&self, audio: &[u8]) -> Result<Vec<f32>, InferenceError>;

    /// Similarity of two speaker embeddings.
    async fn compare(&self, a: &[f32], b: &[f32]) -> Result<f64, InferenceError> {
        cosine_similarity(a, b)
    }

    async fn probe_video(&self, video: &[u8]) -> Result<VideoProbe, InferenceError>;

    /// Decode the frames at `indices`. Frames that cannot be decoded come
    /// back as `None` in the same position.
    async fn extract_frames(
        &self,
        video: &[u8],
        indices: &[u64],
    ) -> Result<Vec<Option<Vec<u8>>>, InferenceError>;

    async fn health_check(&self) -> Result<(), InferenceError>;
}

/// Cosine similarity in [-1, 1].
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f64, InferenceError> {
    if a.len() != b.len() || a.is_empty() {
        return Err(InferenceError::Malformed(format!(
            "embedding dimensions differ or are empty ({} vs {})",
            a.len(),
            b.len()
        )));
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Err(InferenceError::Malformed("zero-length embedding".to_string()));
    }
    Ok(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

/// Pick the backend for this process: the remote service when configured and
/// reachable, the simulated one otherwise.
pub async fn select_backend(config: &AppConfig) -> Arc<dyn InferenceBackend> {
    let Some(url) = config.inference_url.as_deref() else {
        warn!("INFERENCE_URL not set, using simulated inference backend");
        return Arc::new(SimulatedInferenceBackend::new());
    };

    let remote = match RemoteInferenceBackend::new(
        url,
        config.inference_api_token.clone(),
        config.inference_timeout_secs,
    ) {
        Ok(remote) => remote,
        Err(e) => {
            warn!(error = %e, "Failed to build inference client, using simulated backend");
            return Arc::new(SimulatedInferenceBackend::new());
        }
    };

    match remote.health_check().await {
        Ok(()) => {
            info!(url, "Using remote inference backend");
            Arc::new(remote)
        }
        Err(e) => {
            warn!(url, error = %e, "Inference service unreachable, using simulated backend");
            Arc::new(SimulatedInferenceBackend::new())
        }
    }
}

/// Failure of a model capability, as opposed to bad input or pipeline faults.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Failed to decode input: {0}")]
    Decode(String),

    #[error("No decodable frames in video")]
    NoDecodableFrames,

    #[error("Inference request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Inference service returned {status}: {message}")]
    Service { status: u16, message: String },

    #[error("Malformed inference result: {0}")]
    Malformed(String),
}

impl InferenceError {
    /// Whether the input itself could not be decoded.
    pub fn is_decode(&self) -> bool {
        matches!(self, InferenceError::Decode(_) | InferenceError::NoDecodableFrames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let sim = cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]).unwrap();
        assert!((sim - 1.0).abs() < 1e-9);

        let sim = cosine_similarity(&[1.0, 0.0], &[0.0, 2.0]).unwrap();
        assert!(sim.abs() < 1e-9);

        let sim = cosine_similarity(&[1.0, 1.0], &[-1.0, -1.0]).unwrap();
        assert!((sim + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_similarity_rejects_bad_shapes() {
        assert!(cosine_similarity(&[1.0], &[1.0, 2.0]).is_err());
        assert!(cosine_similarity(&[], &[]).is_err());
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_duration_without_frame_rate() {
        let probe = VideoProbe {
            total_frames: 300,
            fps: 0.0,
        };
        assert_eq!(probe.duration_secs(), 0.0);

        let probe = VideoProbe {
            total_frames: 300,
            fps: 30.0,
        };
        assert_eq!(probe.duration_secs(), 10.0);
    }
}
