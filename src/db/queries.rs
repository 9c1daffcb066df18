use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::models::case::{CaseOutcome, CaseStatus, JobRecord, MediaKind, SubScores, FAILED_VERDICT};

/// Insert a freshly created case
pub async fn insert_case(pool: &PgPool, record: &JobRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO cases (id, media_type, status, confidence, submitted_at, verdict,
                           worker_id, filename)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(&record.id)
    .bind(record.media_type.to_string())
    .bind(record.status.to_string())
    .bind(record.confidence)
    .bind(record.submitted_at)
    .bind(&record.verdict)
    .bind(&record.worker_id)
    .bind(&record.filename)
    .execute(pool)
    .await?;

    Ok(())
}

/// Mark an analyzing case completed. Returns the number of rows changed,
/// which is zero if the case is missing or already terminal.
pub async fn complete_case(
    pool: &PgPool,
    case_id: &str,
    outcome: &CaseOutcome,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE cases
        SET status = 'completed',
            confidence = $1,
            verdict = $2,
            face_score = $3,
            voice_score = $4,
            lipsync_score = $5,
            explanation = $6,
            processing_time_ms = $7,
            completed_at = NOW()
        WHERE id = $8 AND status = 'analyzing'
        "#,
    )
    .bind(outcome.confidence)
    .bind(&outcome.verdict)
    .bind(outcome.scores.face)
    .bind(outcome.scores.voice)
    .bind(outcome.scores.lipsync)
    .bind(&outcome.explanation)
    .bind(outcome.duration_ms)
    .bind(case_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Mark an analyzing case failed. Same return contract as [`complete_case`].
pub async fn fail_case(pool: &PgPool, case_id: &str, reason: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE cases
        SET status = 'failed',
            verdict = $1,
            explanation = $2,
            completed_at = NOW()
        WHERE id = $3 AND status = 'analyzing'
        "#,
    )
    .bind(FAILED_VERDICT)
    .bind(reason)
    .bind(case_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Get a case by ID
pub async fn get_case(pool: &PgPool, case_id: &str) -> Result<Option<JobRecord>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT id, media_type, status, confidence, submitted_at, completed_at, verdict,
               face_score, voice_score, lipsync_score, explanation, worker_id,
               processing_time_ms, filename
        FROM cases
        WHERE id = $1
        "#,
    )
    .bind(case_id)
    .fetch_optional(pool)
    .await?;

    row.map(|r| record_from_row(&r)).transpose()
}

fn record_from_row(r: &PgRow) -> Result<JobRecord, sqlx::Error> {
    let media_type: String = r.try_get("media_type")?;
    let status: String = r.try_get("status")?;

    Ok(JobRecord {
        id: r.try_get("id")?,
        media_type: media_type
            .parse::<MediaKind>()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        status: status
            .parse::<CaseStatus>()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        confidence: r.try_get("confidence")?,
        submitted_at: r.try_get("submitted_at")?,
        completed_at: r.try_get("completed_at")?,
        verdict: r.try_get("verdict")?,
        scores: SubScores {
            face: r.try_get("face_score")?,
            voice: r.try_get("voice_score")?,
            lipsync: r.try_get("lipsync_score")?,
        },
        explanation: r.try_get("explanation")?,
        worker_id: r.try_get("worker_id")?,
        processing_time_ms: r.try_get("processing_time_ms")?,
        filename: r.try_get("filename")?,
    })
}
