use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::types::Json;
use time::PrimitiveDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::models::{Activity, Attempt, AttemptSubmission};
use crate::db::types::AttemptStatus;

use super::{
    ActivityRepository, AttemptStore, FinalizedAttempt, StoreError, SubmissionRecord,
};

/// Activity lookup backed by a map, for hosts that resolve content from
/// another service and for the test suite.
#[derive(Default)]
pub struct InMemoryActivityRepository {
    activities: RwLock<HashMap<String, Activity>>,
}

impl InMemoryActivityRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, activity: Activity) {
        self.activities.write().await.insert(activity.id.clone(), activity);
    }
}

#[async_trait]
impl ActivityRepository for InMemoryActivityRepository {
    async fn load_activity(&self, activity_id: &str) -> Result<Option<Activity>, StoreError> {
        Ok(self.activities.read().await.get(activity_id).cloned())
    }
}

/// Attempt persistence held in process memory. Write-lock scoping gives the
/// same at-most-once graded transition the Postgres store gets from its CAS
/// update.
#[derive(Default)]
pub struct InMemoryAttemptStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    attempts: Vec<Attempt>,
    submissions: HashMap<String, Vec<AttemptSubmission>>,
}

impl InMemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn attempt_count(&self) -> usize {
        self.inner.read().await.attempts.len()
    }
}

#[async_trait]
impl AttemptStore for InMemoryAttemptStore {
    async fn find_attempt(&self, attempt_id: &str) -> Result<Option<Attempt>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.attempts.iter().find(|attempt| attempt.id == attempt_id).cloned())
    }

    async fn find_in_flight(
        &self,
        user_id: &str,
        activity_id: &str,
    ) -> Result<Option<Attempt>, StoreError> {
        let inner = self.inner.read().await;
        // Insertion order stands in for created_at ordering.
        Ok(inner
            .attempts
            .iter()
            .find(|attempt| {
                attempt.user_id == user_id
                    && attempt.activity_id == activity_id
                    && attempt.status != AttemptStatus::Graded
            })
            .cloned())
    }

    async fn insert_attempt(&self, attempt: &Attempt) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.attempts.iter().any(|existing| existing.id == attempt.id) {
            return Ok(());
        }
        inner.attempts.push(attempt.clone());
        Ok(())
    }

    async fn upsert_submissions(
        &self,
        attempt_id: &str,
        records: &[SubmissionRecord],
        now: PrimitiveDateTime,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;

        let status = inner
            .attempts
            .iter()
            .find(|attempt| attempt.id == attempt_id)
            .map(|attempt| attempt.status)
            .ok_or_else(|| StoreError::AttemptNotFound(attempt_id.to_string()))?;
        if status == AttemptStatus::Graded {
            return Err(StoreError::AttemptGraded(attempt_id.to_string()));
        }

        let rows = inner.submissions.entry(attempt_id.to_string()).or_default();
        for record in records {
            if let Some(row) = rows.iter_mut().find(|row| row.question_id == record.question_id) {
                row.chosen_ids = Json(record.chosen_ids.clone());
                row.answer_text = record.answer_text.clone();
                row.is_correct = record.is_correct;
                row.score = record.score;
                row.updated_at = now;
            } else {
                rows.push(AttemptSubmission {
                    id: Uuid::new_v4().to_string(),
                    attempt_id: attempt_id.to_string(),
                    question_id: record.question_id.clone(),
                    chosen_ids: Json(record.chosen_ids.clone()),
                    answer_text: record.answer_text.clone(),
                    is_correct: record.is_correct,
                    score: record.score,
                    created_at: now,
                    updated_at: now,
                });
            }
        }

        Ok(())
    }

    async fn list_submissions(
        &self,
        attempt_id: &str,
    ) -> Result<Vec<AttemptSubmission>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.submissions.get(attempt_id).cloned().unwrap_or_default())
    }

    async fn finalize_attempt(
        &self,
        attempt_id: &str,
        total_score: i32,
        now: PrimitiveDateTime,
    ) -> Result<FinalizedAttempt, StoreError> {
        let mut inner = self.inner.write().await;

        let attempt = inner
            .attempts
            .iter_mut()
            .find(|attempt| attempt.id == attempt_id)
            .ok_or_else(|| StoreError::AttemptNotFound(attempt_id.to_string()))?;

        if attempt.status == AttemptStatus::Graded {
            return Ok(FinalizedAttempt { attempt: attempt.clone(), newly_graded: false });
        }

        attempt.status = AttemptStatus::Graded;
        attempt.score = Some(total_score);
        if attempt.submitted_at.is_none() {
            attempt.submitted_at = Some(now);
        }
        attempt.updated_at = now;

        Ok(FinalizedAttempt { attempt: attempt.clone(), newly_graded: true })
    }
}
