//! Shared doubles for pipeline and hub tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use media_verify::app_state::AppState;
use media_verify::models::case::{CaseOutcome, JobRecord, MediaKind};
use media_verify::models::detection::{FrameClassification, Submission, UploadedFile};
use media_verify::models::queue::{QueueEntry, QueueSnapshot};
use media_verify::services::hub::QueueHub;
use media_verify::services::inference::{InferenceBackend, InferenceError, VideoProbe};
use media_verify::services::orchestrator::Orchestrator;
use media_verify::services::records::{MemoryRecordStore, RecordError, RecordStore};
use media_verify::services::subscription::{DeliveryError, SnapshotSink};

/// PNG signature followed by padding; enough for format sniffing.
pub fn png_bytes() -> Vec<u8> {
    let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
    bytes.extend_from_slice(&[0u8; 64]);
    bytes
}

pub fn image_submission(name: &str) -> Submission {
    Submission::new(MediaKind::Image, vec![UploadedFile::new(name, png_bytes())])
}

pub fn audio_submission() -> Submission {
    Submission::new(
        MediaKind::Audio,
        vec![
            UploadedFile::new("reference.wav", vec![1u8; 256]),
            UploadedFile::new("sample.wav", vec![2u8; 256]),
        ],
    )
}

pub fn video_submission() -> Submission {
    Submission::new(
        MediaKind::Video,
        vec![UploadedFile::new("clip.mp4", vec![0u8; 4096])],
    )
}

/// What the scripted backend should do when asked to classify.
#[derive(Clone)]
pub enum ClassifyBehaviour {
    Return(FrameClassification),
    Fail,
    Panic,
}

/// Deterministic backend driven by fixed answers.
pub struct ScriptedBackend {
    pub classify: ClassifyBehaviour,
    pub similarity: f64,
    pub total_frames: u64,
    pub fps: f64,
    /// Frames at these positions fail to decode.
    pub undecodable: Vec<usize>,
    pub delay: Duration,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self {
            classify: ClassifyBehaviour::Return(FrameClassification::new("Fake", 80.0)),
            similarity: 0.9,
            total_frames: 240,
            fps: 24.0,
            undecodable: Vec::new(),
            delay: Duration::ZERO,
        }
    }
}

impl ScriptedBackend {
    pub fn classifying(label: &str, confidence: f64) -> Self {
        Self {
            classify: ClassifyBehaviour::Return(FrameClassification::new(label, confidence)),
            ..Default::default()
        }
    }

    pub fn with_similarity(similarity: f64) -> Self {
        Self {
            similarity,
            ..Default::default()
        }
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl InferenceBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn classify(&self, _image: &[u8]) -> Result<FrameClassification, InferenceError> {
        self.pause().await;
        match &self.classify {
            ClassifyBehaviour::Return(c) => Ok(c.clone()),
            ClassifyBehaviour::Fail => Err(InferenceError::Service {
                status: 503,
                message: "model unavailable".to_string(),
            }),
            ClassifyBehaviour::Panic => panic!("classifier crashed"),
        }
    }

    async fn embed(&self, audio: &[u8]) -> Result<Vec<f32>, InferenceError> {
        self.pause().await;
        Ok(vec![audio.len() as f32, 1.0, 0.5])
    }

    async fn compare(&self, _a: &[f32], _b: &[f32]) -> Result<f64, InferenceError> {
        Ok(self.similarity)
    }

    async fn probe_video(&self, _video: &[u8]) -> Result<VideoProbe, InferenceError> {
        Ok(VideoProbe {
            total_frames: self.total_frames,
            fps: self.fps,
        })
    }

    async fn extract_frames(
        &self,
        _video: &[u8],
        indices: &[u64],
    ) -> Result<Vec<Option<Vec<u8>>>, InferenceError> {
        if self.total_frames == 0 {
            return Ok(vec![None; indices.len()]);
        }
        Ok(indices
            .iter()
            .enumerate()
            .map(|(i, _)| (!self.undecodable.contains(&i)).then(png_bytes))
            .collect())
    }

    async fn health_check(&self) -> Result<(), InferenceError> {
        Ok(())
    }
}

/// Sink that keeps every snapshot it is handed.
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub received: Arc<Mutex<Vec<Arc<QueueSnapshot>>>>,
}

impl RecordingSink {
    pub fn snapshots(&self) -> Vec<Arc<QueueSnapshot>> {
        self.received.lock().clone()
    }
}

impl SnapshotSink for RecordingSink {
    fn deliver(&self, snapshot: Arc<QueueSnapshot>) -> Result<(), DeliveryError> {
        self.received.lock().push(snapshot);
        Ok(())
    }
}

/// Sink that accepts the attach-time snapshot and rejects everything after.
#[derive(Default)]
pub struct BrokenSink {
    deliveries: Mutex<usize>,
}

impl SnapshotSink for BrokenSink {
    fn deliver(&self, _snapshot: Arc<QueueSnapshot>) -> Result<(), DeliveryError> {
        let mut deliveries = self.deliveries.lock();
        *deliveries += 1;
        if *deliveries > 1 {
            return Err(DeliveryError::Rejected("peer gone".to_string()));
        }
        Ok(())
    }
}

/// App state over an in-memory store, returning the store for inspection.
pub fn test_state(backend: ScriptedBackend, pool: u32) -> (AppState, Arc<MemoryRecordStore>) {
    let store = Arc::new(MemoryRecordStore::new());
    let state = AppState::new(store.clone(), Arc::new(backend), pool);
    (state, store)
}

/// In-memory store with injectable faults.
#[derive(Default)]
pub struct FaultyStore {
    pub inner: Arc<MemoryRecordStore>,
    /// Sleep after the row is written, before `create` returns.
    pub create_delay: Duration,
    /// Queue an entry under the new case's id as soon as it is created.
    pub collide_into: Option<Arc<QueueHub>>,
    pub fail_success_commit: bool,
}

#[async_trait]
impl RecordStore for FaultyStore {
    async fn create(&self, record: &JobRecord) -> Result<(), RecordError> {
        self.inner.create(record).await?;
        if let Some(hub) = &self.collide_into {
            hub.register(QueueEntry::for_record(record)).unwrap();
        }
        if !self.create_delay.is_zero() {
            tokio::time::sleep(self.create_delay).await;
        }
        Ok(())
    }

    async fn commit_success(&self, case_id: &str, outcome: &CaseOutcome) -> Result<(), RecordError> {
        if self.fail_success_commit {
            return Err(RecordError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.commit_success(case_id, outcome).await
    }

    async fn commit_failure(&self, case_id: &str, reason: &str) -> Result<(), RecordError> {
        self.inner.commit_failure(case_id, reason).await
    }

    async fn get(&self, case_id: &str) -> Result<Option<JobRecord>, RecordError> {
        self.inner.get(case_id).await
    }

    async fn health_check(&self) -> Result<(), RecordError> {
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "faulty"
    }
}

/// Orchestrator over a shared hub and a faulty store.
pub fn faulty_orchestrator(hub: Arc<QueueHub>, store: FaultyStore) -> Orchestrator {
    Orchestrator::new(hub, Arc::new(store), Arc::new(ScriptedBackend::default()), 1)
}
