pub mod attempts_pg;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;
use time::PrimitiveDateTime;

use crate::db::models::{Activity, Attempt, AttemptSubmission};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("attempt not found: {0}")]
    AttemptNotFound(String),
    #[error("attempt already graded: {0}")]
    AttemptGraded(String),
    #[error("persistence conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Answer row as the state machine records it, keyed by question within the
/// attempt. `is_correct`/`score` are `None` for open-response answers.
#[derive(Debug, Clone)]
pub struct SubmissionRecord {
    pub question_id: String,
    pub chosen_ids: Vec<String>,
    pub answer_text: Option<String>,
    pub is_correct: Option<bool>,
    pub score: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct FinalizedAttempt {
    pub attempt: Attempt,
    /// False when a racing or repeated finalize already moved the attempt to
    /// graded; callers must not re-fire completion side effects then.
    pub newly_graded: bool,
}

/// Read-only lookup into externally authored content.
#[async_trait]
pub trait ActivityRepository: Send + Sync {
    async fn load_activity(&self, activity_id: &str) -> Result<Option<Activity>, StoreError>;
}

/// Persistence owned by the engine: attempts and their submissions.
///
/// Implementations must make `finalize_attempt` transition to graded at most
/// once (compare-and-set or equivalent) and `upsert_submissions` refuse writes
/// once the attempt is graded.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    async fn find_attempt(&self, attempt_id: &str) -> Result<Option<Attempt>, StoreError>;

    async fn find_in_flight(
        &self,
        user_id: &str,
        activity_id: &str,
    ) -> Result<Option<Attempt>, StoreError>;

    async fn insert_attempt(&self, attempt: &Attempt) -> Result<(), StoreError>;

    async fn upsert_submissions(
        &self,
        attempt_id: &str,
        records: &[SubmissionRecord],
        now: PrimitiveDateTime,
    ) -> Result<(), StoreError>;

    async fn list_submissions(&self, attempt_id: &str)
        -> Result<Vec<AttemptSubmission>, StoreError>;

    async fn finalize_attempt(
        &self,
        attempt_id: &str,
        total_score: i32,
        now: PrimitiveDateTime,
    ) -> Result<FinalizedAttempt, StoreError>;
}
