//! Orchestrator behaviour end to end, over the in-memory store and a
//! scripted inference backend.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use helpers::*;
use media_verify::models::case::{CaseStatus, MediaKind, FAILED_VERDICT};
use media_verify::models::detection::{MediaDetails, Submission, UploadedFile};
use media_verify::models::queue::StageLabel;
use media_verify::services::hub::QueueHub;
use media_verify::services::inference::InferenceError;
use media_verify::services::orchestrator::PipelineError;
use media_verify::services::records::{MemoryRecordStore, RecordStore};
use tokio_test::{assert_err, assert_ok};

#[tokio::test]
async fn test_audio_same_speaker_verdict() {
    let (state, store) = test_state(ScriptedBackend::with_similarity(0.90), 2);

    let report = assert_ok!(state.orchestrator.submit(audio_submission()).await);

    assert_eq!(report.verdict, "Same Speaker (90% similarity)");
    assert_eq!(report.confidence, 90.0);
    match &report.details {
        MediaDetails::Audio(details) => {
            assert!(details.is_same_speaker);
            assert_eq!(details.threshold, 0.86);
            assert_eq!(details.similarity_score, 0.9);
        }
        other => panic!("expected audio details, got {other:?}"),
    }

    let record = store.get(&report.case_id).await.unwrap().unwrap();
    assert_eq!(record.status, CaseStatus::Completed);
    assert_eq!(record.filename, "reference.wav vs sample.wav");
    assert_eq!(record.scores.voice, Some(90.0));
    assert!(record.processing_time_ms.is_some());
    assert!(state.hub().is_empty());
}

#[tokio::test]
async fn test_audio_below_threshold_is_different_speaker() {
    let (state, _store) = test_state(ScriptedBackend::with_similarity(0.42), 1);

    let report = state.orchestrator.submit(audio_submission()).await.unwrap();

    assert_eq!(report.verdict, "Different Speakers (42% similarity)");
    match report.details {
        MediaDetails::Audio(details) => assert!(!details.is_same_speaker),
        other => panic!("expected audio details, got {other:?}"),
    }
}

#[tokio::test]
async fn test_single_audio_file_rejected_before_recording() {
    let (state, store) = test_state(ScriptedBackend::default(), 1);
    let sink = RecordingSink::default();
    state.hub().attach(Box::new(sink.clone())).unwrap();

    let submission = Submission::new(
        MediaKind::Audio,
        vec![UploadedFile::new("only.wav", vec![1u8; 16])],
    );
    let err = assert_err!(state.orchestrator.submit(submission).await);

    assert!(err.is_client_error());
    assert_eq!(
        err.to_string(),
        "Exactly 2 audio files required for speaker verification"
    );
    assert!(store.is_empty());
    assert!(state.hub().is_empty());
    // Only the attach-time snapshot; nothing was broadcast.
    assert_eq!(sink.snapshots().len(), 1);
}

#[tokio::test]
async fn test_unsupported_extension_rejected() {
    let (state, store) = test_state(ScriptedBackend::default(), 1);

    let submission = Submission::new(
        MediaKind::Image,
        vec![UploadedFile::new("notes.txt", b"hello".to_vec())],
    );
    let err = state.orchestrator.submit(submission).await.unwrap_err();

    assert!(matches!(err, PipelineError::Validation(_)));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_image_fake_verdict() {
    let (state, store) = test_state(ScriptedBackend::classifying("Fake", 87.0), 1);

    let report = state
        .orchestrator
        .submit(image_submission("face.png"))
        .await
        .unwrap();

    assert_eq!(report.verdict, "87% Likely Manipulated");
    assert_eq!(report.confidence, 87.0);
    match &report.details {
        MediaDetails::Image(details) => {
            assert!(details.is_fake);
            assert_eq!(details.filename, "face.png");
            assert_eq!(details.predicted_label, "Fake");
        }
        other => panic!("expected image details, got {other:?}"),
    }

    let record = store.get(&report.case_id).await.unwrap().unwrap();
    assert_eq!(record.status, CaseStatus::Completed);
    assert_eq!(record.scores.face, Some(87.0));
    assert!(record.explanation.is_some());
}

#[tokio::test]
async fn test_undecodable_image_fails_case() {
    let (state, store) = test_state(ScriptedBackend::default(), 1);

    let submission = Submission::new(
        MediaKind::Image,
        vec![UploadedFile::new("broken.png", b"not an image at all".to_vec())],
    );
    let err = state.orchestrator.submit(submission).await.unwrap_err();

    assert!(!err.is_client_error());
    let records = store.all();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, CaseStatus::Failed);
    assert!(state.hub().is_empty());
}

#[tokio::test]
async fn test_video_without_decodable_frames_fails() {
    let backend = ScriptedBackend {
        total_frames: 0,
        ..Default::default()
    };
    let (state, store) = test_state(backend, 1);

    let err = state
        .orchestrator
        .submit(video_submission())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Inference(InferenceError::NoDecodableFrames)
    ));
    let records = store.all();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, CaseStatus::Failed);
    assert_eq!(records[0].verdict, FAILED_VERDICT);
    assert!(state.hub().is_empty());
}

#[tokio::test]
async fn test_video_skips_undecodable_frames() {
    let backend = ScriptedBackend {
        undecodable: vec![1, 4],
        ..ScriptedBackend::classifying("Fake", 90.0)
    };
    let (state, _store) = test_state(backend, 1);

    let report = state.orchestrator.submit(video_submission()).await.unwrap();

    match report.details {
        MediaDetails::Video(details) => {
            assert_eq!(details.frames_analyzed, 6);
            assert_eq!(details.frame_details.len(), 6);
            assert!(details.is_fake);
            assert_eq!(details.duration_sec, 10.0);
        }
        other => panic!("expected video details, got {other:?}"),
    }
}

#[tokio::test]
async fn test_inference_failure_records_failed_case() {
    let backend = ScriptedBackend {
        classify: ClassifyBehaviour::Fail,
        ..Default::default()
    };
    let (state, store) = test_state(backend, 1);

    let err = state
        .orchestrator
        .submit(image_submission("face.jpg"))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Inference(_)));
    let records = store.all();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, CaseStatus::Failed);
    assert_eq!(records[0].verdict, "Analysis Failed");
    assert!(records[0].completed_at.is_some());
    assert!(state.hub().is_empty());
}

#[tokio::test]
async fn test_stage_panic_becomes_failed_case() {
    let backend = ScriptedBackend {
        classify: ClassifyBehaviour::Panic,
        ..Default::default()
    };
    let (state, store) = test_state(backend, 1);

    let err = state
        .orchestrator
        .submit(image_submission("face.png"))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("classifier crashed"));
    let records = store.all();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, CaseStatus::Failed);
    assert!(state.hub().is_empty());

    // The orchestrator keeps serving after a crashed stage.
    let err = state
        .orchestrator
        .submit(image_submission("again.png"))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Inference(_)));
}

#[tokio::test]
async fn test_progress_is_monotonic_and_reaches_100() {
    let (state, _store) = test_state(ScriptedBackend::classifying("Real", 75.0), 1);
    let sink = RecordingSink::default();
    state.hub().attach(Box::new(sink.clone())).unwrap();

    let report = state.orchestrator.submit(video_submission()).await.unwrap();

    let snapshots = sink.snapshots();
    let progress: Vec<u8> = snapshots
        .iter()
        .filter_map(|s| s.get(&report.case_id).map(|e| e.progress))
        .collect();
    assert!(!progress.is_empty());
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(progress.last(), Some(&100));

    let final_entry = snapshots
        .iter()
        .rev()
        .find_map(|s| s.get(&report.case_id))
        .unwrap();
    assert_eq!(final_entry.stage, StageLabel::SendingResult);

    // Sequence numbers increase and the last snapshot no longer holds the case.
    assert!(snapshots.windows(2).all(|w| w[0].seq < w[1].seq));
    assert!(snapshots.last().unwrap().is_empty());
}

#[tokio::test]
async fn test_many_concurrent_cases_settle() {
    const CASES: usize = 60;
    let backend = ScriptedBackend {
        delay: Duration::from_millis(2),
        ..Default::default()
    };
    let (state, store) = test_state(backend, 4);

    let mut handles = Vec::with_capacity(CASES);
    for i in 0..CASES {
        let orchestrator = state.orchestrator.clone();
        let submission = match i % 3 {
            0 => image_submission(&format!("img-{i}.png")),
            1 => audio_submission(),
            _ => video_submission(),
        };
        handles.push(tokio::spawn(async move { orchestrator.submit(submission).await }));
    }

    for handle in handles {
        assert_ok!(handle.await.unwrap());
    }

    assert!(state.hub().is_empty());
    let records = store.all();
    assert_eq!(records.len(), CASES);
    assert!(records.iter().all(|r| r.status == CaseStatus::Completed));

    let mut ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), CASES);

    let workers: std::collections::HashSet<&str> =
        records.iter().map(|r| r.worker_id.as_str()).collect();
    assert_eq!(workers.len(), 4);
}

#[tokio::test]
async fn test_dropped_caller_does_not_cancel_case() {
    let backend = ScriptedBackend {
        delay: Duration::from_millis(50),
        ..Default::default()
    };
    let (state, store) = test_state(backend, 1);

    let orchestrator = state.orchestrator.clone();
    let caller = tokio::spawn(async move { orchestrator.submit(audio_submission()).await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    caller.abort();

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let records = store.all();
            if records.len() == 1 && records[0].status.is_terminal() && state.hub().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(store.all()[0].status, CaseStatus::Completed);
}

#[tokio::test]
async fn test_caller_dropped_during_record_creation() {
    let hub = Arc::new(QueueHub::new());
    let inner = Arc::new(MemoryRecordStore::new());
    let store = FaultyStore {
        inner: inner.clone(),
        create_delay: Duration::from_millis(100),
        ..Default::default()
    };
    let orchestrator = faulty_orchestrator(hub.clone(), store);

    let caller = tokio::spawn(async move { orchestrator.submit(image_submission("a.png")).await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    caller.abort();

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let records = inner.all();
            if records.len() == 1 && records[0].status.is_terminal() && hub.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(inner.all()[0].status, CaseStatus::Completed);
}

#[tokio::test]
async fn test_duplicate_registration_fails_case_and_keeps_other_entry() {
    let hub = Arc::new(QueueHub::new());
    let inner = Arc::new(MemoryRecordStore::new());
    let store = FaultyStore {
        inner: inner.clone(),
        collide_into: Some(hub.clone()),
        ..Default::default()
    };
    let orchestrator = faulty_orchestrator(hub.clone(), store);

    let err = assert_err!(orchestrator.submit(image_submission("a.png")).await);

    assert!(matches!(err, PipelineError::Hub(_)));
    assert!(!err.is_client_error());
    let records = inner.all();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, CaseStatus::Failed);
    // The colliding entry is not this case's to remove.
    assert!(hub.contains(&records[0].id));
    assert_eq!(hub.len(), 1);
}

#[tokio::test]
async fn test_failed_success_commit_falls_back_to_failure() {
    let hub = Arc::new(QueueHub::new());
    let inner = Arc::new(MemoryRecordStore::new());
    let store = FaultyStore {
        inner: inner.clone(),
        fail_success_commit: true,
        ..Default::default()
    };
    let orchestrator = faulty_orchestrator(hub.clone(), store);

    let err = assert_err!(orchestrator.submit(audio_submission()).await);

    assert!(matches!(err, PipelineError::Record(_)));
    let records = inner.all();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, CaseStatus::Failed);
    assert_eq!(records[0].verdict, FAILED_VERDICT);
    assert!(hub.is_empty());
}
