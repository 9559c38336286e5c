use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::db::models::{Attempt, AttemptSubmission};
use crate::db::types::AttemptStatus;

use super::{AttemptStore, FinalizedAttempt, StoreError, SubmissionRecord};

const ATTEMPT_COLUMNS: &str = "\
    id, user_id, activity_id, started_at, submitted_at, status, score, \
    metadata, created_at, updated_at";

const SUBMISSION_COLUMNS: &str = "\
    id, attempt_id, question_id, chosen_ids, answer_text, is_correct, score, \
    created_at, updated_at";

#[derive(Clone)]
pub struct PgAttemptStore {
    pool: PgPool,
}

impl PgAttemptStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AttemptStore for PgAttemptStore {
    async fn find_attempt(&self, attempt_id: &str) -> Result<Option<Attempt>, StoreError> {
        let attempt = sqlx::query_as::<_, Attempt>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE id = $1"
        ))
        .bind(attempt_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(attempt)
    }

    async fn find_in_flight(
        &self,
        user_id: &str,
        activity_id: &str,
    ) -> Result<Option<Attempt>, StoreError> {
        // Oldest first so racing begin calls converge on the same attempt.
        let attempt = sqlx::query_as::<_, Attempt>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts \
             WHERE user_id = $1 AND activity_id = $2 AND status <> $3 \
             ORDER BY created_at ASC LIMIT 1"
        ))
        .bind(user_id)
        .bind(activity_id)
        .bind(AttemptStatus::Graded)
        .fetch_optional(&self.pool)
        .await?;

        Ok(attempt)
    }

    async fn insert_attempt(&self, attempt: &Attempt) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO attempts (
                id, user_id, activity_id, started_at, submitted_at, status, score,
                metadata, created_at, updated_at
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)
            ON CONFLICT DO NOTHING",
        )
        .bind(&attempt.id)
        .bind(&attempt.user_id)
        .bind(&attempt.activity_id)
        .bind(attempt.started_at)
        .bind(attempt.submitted_at)
        .bind(attempt.status)
        .bind(attempt.score)
        .bind(&attempt.metadata)
        .bind(attempt.created_at)
        .bind(attempt.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn upsert_submissions(
        &self,
        attempt_id: &str,
        records: &[SubmissionRecord],
        now: PrimitiveDateTime,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let status: Option<AttemptStatus> =
            sqlx::query_scalar("SELECT status FROM attempts WHERE id = $1 FOR UPDATE")
                .bind(attempt_id)
                .fetch_optional(&mut *tx)
                .await?;

        match status {
            None => return Err(StoreError::AttemptNotFound(attempt_id.to_string())),
            Some(AttemptStatus::Graded) => {
                return Err(StoreError::AttemptGraded(attempt_id.to_string()))
            }
            Some(_) => {}
        }

        for record in records {
            sqlx::query(
                "INSERT INTO attempt_submissions (
                    id, attempt_id, question_id, chosen_ids, answer_text, is_correct, score,
                    created_at, updated_at
                ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)
                ON CONFLICT (attempt_id, question_id) DO UPDATE SET
                    chosen_ids = EXCLUDED.chosen_ids,
                    answer_text = EXCLUDED.answer_text,
                    is_correct = EXCLUDED.is_correct,
                    score = EXCLUDED.score,
                    updated_at = EXCLUDED.updated_at",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(attempt_id)
            .bind(&record.question_id)
            .bind(Json(&record.chosen_ids))
            .bind(&record.answer_text)
            .bind(record.is_correct)
            .bind(record.score)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await.map_err(conflict_or_db)?;
        Ok(())
    }

    async fn list_submissions(
        &self,
        attempt_id: &str,
    ) -> Result<Vec<AttemptSubmission>, StoreError> {
        let submissions = sqlx::query_as::<_, AttemptSubmission>(&format!(
            "SELECT {SUBMISSION_COLUMNS} FROM attempt_submissions \
             WHERE attempt_id = $1 ORDER BY created_at ASC"
        ))
        .bind(attempt_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(submissions)
    }

    async fn finalize_attempt(
        &self,
        attempt_id: &str,
        total_score: i32,
        now: PrimitiveDateTime,
    ) -> Result<FinalizedAttempt, StoreError> {
        // Single-statement compare-and-set: the graded transition happens at
        // most once no matter how many callers race here.
        let graded = sqlx::query_as::<_, Attempt>(&format!(
            "UPDATE attempts
             SET status = $1,
                 score = $2,
                 submitted_at = COALESCE(submitted_at, $3),
                 updated_at = $3
             WHERE id = $4 AND status <> $1
             RETURNING {ATTEMPT_COLUMNS}"
        ))
        .bind(AttemptStatus::Graded)
        .bind(total_score)
        .bind(now)
        .bind(attempt_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(conflict_or_db)?;

        if let Some(attempt) = graded {
            return Ok(FinalizedAttempt { attempt, newly_graded: true });
        }

        let existing = self
            .find_attempt(attempt_id)
            .await?
            .ok_or_else(|| StoreError::AttemptNotFound(attempt_id.to_string()))?;

        Ok(FinalizedAttempt { attempt: existing, newly_graded: false })
    }
}

fn conflict_or_db(err: sqlx::Error) -> StoreError {
    let retryable = err
        .as_database_error()
        .and_then(|db| db.code())
        .map(|code| code == "40001" || code == "40P01")
        .unwrap_or(false);

    if retryable {
        StoreError::Conflict(err.to_string())
    } else {
        StoreError::Database(err)
    }
}
