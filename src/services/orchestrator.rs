//! Entry point for analysis submissions.
//!
//! Each accepted submission runs in its own tokio task so that a caller
//! going away never cancels analysis: the case still reaches a terminal
//! record and leaves the live queue.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tracing::{error, info, warn};

use crate::models::case::{CaseOutcome, JobRecord, MediaKind};
use crate::models::detection::{AnalysisReport, Submission, UploadedFile};
use crate::models::queue::QueueEntry;
use crate::services::hub::{HubError, QueueHub};
use crate::services::inference::{InferenceBackend, InferenceError};
use crate::services::records::{RecordError, RecordStore};
use crate::services::stages::{executor_for, ProgressReporter};
use crate::services::validation::{self, ValidationError};

#[derive(Clone)]
pub struct Orchestrator {
    hub: Arc<QueueHub>,
    store: Arc<dyn RecordStore>,
    backend: Arc<dyn InferenceBackend>,
    worker_pool_size: u32,
    next_worker: Arc<AtomicU32>,
}

impl Orchestrator {
    pub fn new(
        hub: Arc<QueueHub>,
        store: Arc<dyn RecordStore>,
        backend: Arc<dyn InferenceBackend>,
        worker_pool_size: u32,
    ) -> Self {
        Self {
            hub,
            store,
            backend,
            worker_pool_size: worker_pool_size.max(1),
            next_worker: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn hub(&self) -> &Arc<QueueHub> {
        &self.hub
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn backend(&self) -> &Arc<dyn InferenceBackend> {
        &self.backend
    }

    /// Validate, record and analyse one submission, returning its verdict.
    ///
    /// Validation failures return before anything is recorded or queued.
    /// Everything after validation runs on a spawned task, so a caller that
    /// goes away cannot leave a record behind in `analyzing`.
    pub async fn submit(&self, submission: Submission) -> Result<AnalysisReport, PipelineError> {
        validation::validate_submission(&submission)?;

        let record = JobRecord::create(
            submission.media_kind,
            &submission.filenames(),
            self.assign_worker(),
        );
        let case_id = record.id.clone();
        let this = self.clone();
        let task = tokio::spawn(async move {
            this.create_case(&record).await?;
            this.run_case(record, submission.files).await
        });

        match task.await {
            Ok(result) => result,
            Err(e) => {
                error!(case_id = %case_id, error = %e, "Analysis task did not complete");
                Err(PipelineError::Aborted(e.to_string()))
            }
        }
    }

    async fn create_case(&self, record: &JobRecord) -> Result<(), PipelineError> {
        self.store.create(record).await?;

        let kind = record.media_type;
        metrics::counter!("media_verify_jobs_total", "media_type" => kind.to_string()).increment(1);
        info!(
            case_id = %record.id,
            media_type = %kind,
            worker_id = %record.worker_id,
            filename = %record.filename,
            "Case created"
        );
        Ok(())
    }

    fn assign_worker(&self) -> String {
        let n = self.next_worker.fetch_add(1, Ordering::Relaxed) % self.worker_pool_size;
        format!("worker-{}", n + 1)
    }

    async fn run_case(
        &self,
        record: JobRecord,
        files: Vec<UploadedFile>,
    ) -> Result<AnalysisReport, PipelineError> {
        let kind = record.media_type;

        if let Err(e) = self.hub.register(QueueEntry::for_record(&record)) {
            // The queued entry with this id belongs to another case, so it
            // must not be removed here.
            error!(case_id = %record.id, error = %e, "Queue registration failed");
            if let Err(commit_err) = self.store.commit_failure(&record.id, &e.to_string()).await {
                error!(case_id = %record.id, error = %commit_err, "Failed to record failure");
            }
            metrics::counter!("media_verify_jobs_failed", "media_type" => kind.to_string())
                .increment(1);
            return Err(e.into());
        }

        let guard = CaseGuard::new(Arc::clone(&self.hub), Arc::clone(&self.store), &record.id);
        let started = Instant::now();
        let reporter = ProgressReporter::new(Arc::clone(&self.hub), &record.id);
        let executor = executor_for(kind, Arc::clone(&self.backend));

        let staged = AssertUnwindSafe(executor.run(&files, &reporter))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(InferenceError::Malformed(format!(
                    "stage panicked: {}",
                    panic_message(panic.as_ref())
                )))
            });

        let outcome = match staged {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(case_id = %record.id, media_type = %kind, error = %e, "Analysis failed");
                self.fail_case(&record.id, kind, &e.to_string()).await;
                guard.settle();
                return Err(e.into());
            }
        };

        reporter.finish();
        let elapsed = started.elapsed();
        let case_outcome = CaseOutcome {
            confidence: outcome.confidence,
            verdict: outcome.verdict.clone(),
            scores: outcome.scores.clone(),
            explanation: outcome.explanation.clone(),
            duration_ms: elapsed.as_millis() as i64,
        };

        if let Err(e) = self.store.commit_success(&record.id, &case_outcome).await {
            error!(case_id = %record.id, error = %e, "Failed to record completed case");
            if !matches!(e, RecordError::AlreadyTerminal(_)) {
                self.fail_case(&record.id, kind, &e.to_string()).await;
            }
            guard.settle();
            return Err(e.into());
        }
        guard.settle();

        metrics::counter!("media_verify_jobs_completed", "media_type" => kind.to_string())
            .increment(1);
        metrics::histogram!("media_verify_processing_seconds", "media_type" => kind.to_string())
            .record(elapsed.as_secs_f64());
        info!(
            case_id = %record.id,
            media_type = %kind,
            verdict = %outcome.verdict,
            confidence = outcome.confidence,
            duration_ms = case_outcome.duration_ms,
            "Case completed"
        );

        Ok(AnalysisReport {
            case_id: record.id,
            verdict: outcome.verdict,
            confidence: outcome.confidence,
            explanation: outcome.explanation,
            details: outcome.details,
        })
    }

    async fn fail_case(&self, case_id: &str, kind: MediaKind, reason: &str) {
        if let Err(e) = self.store.commit_failure(case_id, reason).await {
            error!(case_id, error = %e, "Failed to record failed case");
        }
        metrics::counter!("media_verify_jobs_failed", "media_type" => kind.to_string()).increment(1);
    }
}

/// Removes a case from the live queue exactly once.
///
/// `settle` is the normal path, called after the terminal commit. If the
/// task is dropped before that, the guard removes the entry itself and
/// records the case as failed in the background.
struct CaseGuard {
    hub: Arc<QueueHub>,
    store: Arc<dyn RecordStore>,
    case_id: String,
    settled: bool,
}

impl CaseGuard {
    fn new(hub: Arc<QueueHub>, store: Arc<dyn RecordStore>, case_id: &str) -> Self {
        Self {
            hub,
            store,
            case_id: case_id.to_string(),
            settled: false,
        }
    }

    fn settle(mut self) {
        self.hub.unregister(&self.case_id);
        self.settled = true;
    }
}

impl Drop for CaseGuard {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        warn!(case_id = %self.case_id, "Analysis cancelled before completion");
        self.hub.unregister(&self.case_id);

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let store = Arc::clone(&self.store);
            let case_id = std::mem::take(&mut self.case_id);
            handle.spawn(async move {
                if let Err(e) = store.commit_failure(&case_id, "analysis cancelled").await {
                    error!(case_id = %case_id, error = %e, "Failed to record cancelled case");
                }
            });
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    Hub(#[from] HubError),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error("Analysis task aborted: {0}")]
    Aborted(String),
}

impl PipelineError {
    /// Bad input from the caller, as opposed to a processing failure.
    pub fn is_client_error(&self) -> bool {
        matches!(self, PipelineError::Validation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::inference::SimulatedInferenceBackend;
    use crate::services::records::MemoryRecordStore;

    fn orchestrator(pool: u32) -> Orchestrator {
        Orchestrator::new(
            Arc::new(QueueHub::new()),
            Arc::new(MemoryRecordStore::new()),
            Arc::new(SimulatedInferenceBackend::new()),
            pool,
        )
    }

    #[test]
    fn test_workers_assigned_round_robin() {
        let o = orchestrator(3);
        let ids: Vec<String> = (0..4).map(|_| o.assign_worker()).collect();
        assert_eq!(ids, vec!["worker-1", "worker-2", "worker-3", "worker-1"]);
    }

    #[test]
    fn test_zero_pool_size_is_clamped() {
        let o = orchestrator(0);
        assert_eq!(o.assign_worker(), "worker-1");
    }

    #[test]
    fn test_guard_drop_unregisters() {
        let o = orchestrator(1);
        let record = JobRecord::create(MediaKind::Image, &["a.png".to_string()], "worker-1");
        o.hub.register(QueueEntry::for_record(&record)).unwrap();

        drop(CaseGuard::new(Arc::clone(&o.hub), Arc::clone(&o.store), &record.id));
        assert!(o.hub.is_empty());
    }

    #[tokio::test]
    async fn test_guard_drop_records_cancelled_case() {
        let o = orchestrator(1);
        let record = JobRecord::create(MediaKind::Video, &["a.mp4".to_string()], "worker-1");
        o.store.create(&record).await.unwrap();
        o.hub.register(QueueEntry::for_record(&record)).unwrap();

        drop(CaseGuard::new(Arc::clone(&o.hub), Arc::clone(&o.store), &record.id));
        assert!(o.hub.is_empty());

        let stored = tokio::time::timeout(std::time::Duration::from_secs(2), async {
            loop {
                if let Some(r) = o.store.get(&record.id).await.unwrap() {
                    if r.status.is_terminal() {
                        return r;
                    }
                }
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(stored.status, crate::models::case::CaseStatus::Failed);
        assert_eq!(stored.explanation.as_deref(), Some("analysis cancelled"));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
    }
}
