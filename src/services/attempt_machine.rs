use std::sync::Arc;

use sqlx::types::Json;
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::core::time::primitive_now_utc;
use crate::db::models::{Attempt, AttemptMetadata};
use crate::db::types::AttemptStatus;
use crate::repositories::{AttemptStore, FinalizedAttempt, StoreError, SubmissionRecord};
use crate::services::GradingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded,
    /// The attempt was graded by a concurrent call; the stored result is
    /// authoritative and nothing was written.
    AlreadyGraded,
}

/// Owns the started → submitted → graded lifecycle of one attempt. Every
/// transition is safe to retry: `begin` reuses the in-flight attempt and
/// `finalize` converges on the first graded state.
pub struct AttemptStateMachine {
    store: Arc<dyn AttemptStore>,
    finalize_retry_attempts: u32,
}

impl AttemptStateMachine {
    pub fn new(store: Arc<dyn AttemptStore>, finalize_retry_attempts: u32) -> Self {
        Self { store, finalize_retry_attempts }
    }

    pub async fn begin(
        &self,
        user_id: &str,
        activity_id: &str,
        started_at: PrimitiveDateTime,
        metadata: AttemptMetadata,
    ) -> Result<Attempt, GradingError> {
        if let Some(existing) = self.store.find_in_flight(user_id, activity_id).await? {
            tracing::debug!(
                attempt_id = %existing.id,
                user_id = %user_id,
                activity_id = %activity_id,
                "Reusing in-flight attempt"
            );
            return Ok(existing);
        }

        let now = primitive_now_utc();
        let attempt = Attempt {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            activity_id: activity_id.to_string(),
            started_at,
            submitted_at: None,
            status: AttemptStatus::Started,
            score: None,
            metadata: Json(metadata),
            created_at: now,
            updated_at: now,
        };
        self.store.insert_attempt(&attempt).await?;

        // Re-read so two racing begin calls both land on the same attempt.
        Ok(self.store.find_in_flight(user_id, activity_id).await?.unwrap_or(attempt))
    }

    pub async fn record_answers(
        &self,
        attempt_id: &str,
        records: &[SubmissionRecord],
        now: PrimitiveDateTime,
    ) -> Result<RecordOutcome, GradingError> {
        match self.store.upsert_submissions(attempt_id, records, now).await {
            Ok(()) => Ok(RecordOutcome::Recorded),
            Err(StoreError::AttemptGraded(_)) => Ok(RecordOutcome::AlreadyGraded),
            Err(err) => Err(err.into()),
        }
    }

    /// Idempotent: finalizing an already-graded attempt returns the stored
    /// attempt with `newly_graded = false` instead of re-grading. A missing
    /// attempt is the one fatal case.
    pub async fn finalize(
        &self,
        attempt_id: &str,
        total_score: i32,
        now: PrimitiveDateTime,
    ) -> Result<FinalizedAttempt, GradingError> {
        let mut retries_left = self.finalize_retry_attempts;
        loop {
            match self.store.finalize_attempt(attempt_id, total_score, now).await {
                Ok(outcome) => return Ok(outcome),
                Err(StoreError::Conflict(message)) if retries_left > 0 => {
                    retries_left -= 1;
                    tracing::warn!(
                        attempt_id = %attempt_id,
                        error = %message,
                        "Finalize conflict, retrying with fresh state"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}
