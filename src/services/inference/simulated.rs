use async_trait::async_trait;
use rand::Rng;

use super::{InferenceBackend, InferenceError, VideoProbe};
use crate::models::detection::FrameClassification;

/// Rough bytes-per-frame used to invent a frame count for uploaded video.
const BYTES_PER_FRAME: usize = 4096;
const EMBEDDING_DIM: usize = 192;

/// Stand-in backend that produces plausible random results, for development
/// and demos without a model server.
#[derive(Debug, Default)]
pub struct SimulatedInferenceBackend;

impl SimulatedInferenceBackend {
    pub fn new() -> Self {
        Self
    }
}

fn random_classification() -> FrameClassification {
    let mut rng = rand::thread_rng();
    let is_fake = rng.gen_bool(0.6);
    let confidence = rng.gen_range(60.0..95.0);
    FrameClassification::new(if is_fake { "Fake" } else { "Real" }, confidence)
}

fn random_embedding() -> Vec<f32> {
    let mut rng = rand::thread_rng();
    (0..EMBEDDING_DIM).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

#[async_trait]
impl InferenceBackend for SimulatedInferenceBackend {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn classify(&self, _image: &[u8]) -> Result<FrameClassification, InferenceError> {
        Ok(random_classification())
    }

    async fn embed(&self, audio: &[u8]) -> Result<Vec<f32>, InferenceError> {
        if audio.is_empty() {
            return Err(InferenceError::Decode("empty audio".to_string()));
        }
        Ok(random_embedding())
    }

    async fn compare(&self, a: &[f32], b: &[f32]) -> Result<f64, InferenceError> {
        if a.len() != b.len() {
            return Err(InferenceError::Malformed("embedding dimensions differ".to_string()));
        }
        Ok(rand::thread_rng().gen_range(0.5..0.98))
    }

    async fn probe_video(&self, video: &[u8]) -> Result<VideoProbe, InferenceError> {
        Ok(VideoProbe {
            total_frames: (video.len() / BYTES_PER_FRAME) as u64,
            fps: 30.0,
        })
    }

    async fn extract_frames(
        &self,
        video: &[u8],
        indices: &[u64],
    ) -> Result<Vec<Option<Vec<u8>>>, InferenceError> {
        let total = (video.len() / BYTES_PER_FRAME) as u64;
        Ok(indices
            .iter()
            .map(|&i| (i < total).then(Vec::new))
            .collect())
    }

    async fn health_check(&self) -> Result<(), InferenceError> {
        Ok(())
    }
}
