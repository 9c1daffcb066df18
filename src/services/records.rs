use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use sqlx::PgPool;
use tracing::error;

use crate::db::queries;
use crate::models::case::{CaseOutcome, JobRecord};

/// Persistence for case records.
///
/// `commit_success` and `commit_failure` are the only terminal writers and
/// each case accepts exactly one of them; a second call returns
/// [`RecordError::AlreadyTerminal`] and leaves the stored record untouched.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create(&self, record: &JobRecord) -> Result<(), RecordError>;

    async fn commit_success(&self, case_id: &str, outcome: &CaseOutcome) -> Result<(), RecordError>;

    async fn commit_failure(&self, case_id: &str, reason: &str) -> Result<(), RecordError>;

    async fn get(&self, case_id: &str) -> Result<Option<JobRecord>, RecordError>;

    async fn health_check(&self) -> Result<(), RecordError>;

    fn kind(&self) -> &'static str;
}

/// PostgreSQL-backed store.
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Explain why a conditional terminal update touched no rows.
    async fn terminal_miss(&self, case_id: &str) -> RecordError {
        match queries::get_case(&self.pool, case_id).await {
            Ok(Some(record)) => {
                error!(case_id, status = %record.status, "Second terminal commit rejected");
                RecordError::AlreadyTerminal(case_id.to_string())
            }
            Ok(None) => RecordError::NotFound(case_id.to_string()),
            Err(e) => RecordError::Database(e),
        }
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn create(&self, record: &JobRecord) -> Result<(), RecordError> {
        queries::insert_case(&self.pool, record).await?;
        Ok(())
    }

    async fn commit_success(&self, case_id: &str, outcome: &CaseOutcome) -> Result<(), RecordError> {
        if queries::complete_case(&self.pool, case_id, outcome).await? == 0 {
            return Err(self.terminal_miss(case_id).await);
        }
        Ok(())
    }

    async fn commit_failure(&self, case_id: &str, reason: &str) -> Result<(), RecordError> {
        if queries::fail_case(&self.pool, case_id, reason).await? == 0 {
            return Err(self.terminal_miss(case_id).await);
        }
        Ok(())
    }

    async fn get(&self, case_id: &str) -> Result<Option<JobRecord>, RecordError> {
        Ok(queries::get_case(&self.pool, case_id).await?)
    }

    async fn health_check(&self) -> Result<(), RecordError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "postgres"
    }
}

/// In-process store used when no database is configured.
#[derive(Default)]
pub struct MemoryRecordStore {
    records: Mutex<HashMap<String, JobRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<JobRecord> {
        self.records.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn create(&self, record: &JobRecord) -> Result<(), RecordError> {
        let mut records = self.records.lock();
        if records.contains_key(&record.id) {
            return Err(RecordError::Conflict(record.id.clone()));
        }
        records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn commit_success(&self, case_id: &str, outcome: &CaseOutcome) -> Result<(), RecordError> {
        let mut records = self.records.lock();
        let record = records
            .get_mut(case_id)
            .ok_or_else(|| RecordError::NotFound(case_id.to_string()))?;
        record.complete(outcome.clone()).map_err(|e| {
            error!(case_id, error = %e, "Second terminal commit rejected");
            RecordError::AlreadyTerminal(case_id.to_string())
        })
    }

    async fn commit_failure(&self, case_id: &str, reason: &str) -> Result<(), RecordError> {
        let mut records = self.records.lock();
        let record = records
            .get_mut(case_id)
            .ok_or_else(|| RecordError::NotFound(case_id.to_string()))?;
        record.fail(reason).map_err(|e| {
            error!(case_id, error = %e, "Second terminal commit rejected");
            RecordError::AlreadyTerminal(case_id.to_string())
        })
    }

    async fn get(&self, case_id: &str) -> Result<Option<JobRecord>, RecordError> {
        Ok(self.records.lock().get(case_id).cloned())
    }

    async fn health_check(&self) -> Result<(), RecordError> {
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Case {0} not found")]
    NotFound(String),

    #[error("Case {0} already exists")]
    Conflict(String),

    #[error("Case {0} already has a terminal status")]
    AlreadyTerminal(String),
}
