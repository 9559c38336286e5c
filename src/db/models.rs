use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{AttemptStatus, QuestionType, Skill};

/// Gradable unit of learning content. Authored outside the engine and loaded
/// read-only through an `ActivityRepository`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub skill: Skill,
    /// Declared ceiling; when absent the sum of question scores is used.
    pub max_score: Option<i32>,
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub order: i32,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    pub prompt: String,
    /// Points awarded when the question is fully correct.
    pub score: i32,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub answer_keys: Vec<String>,
    #[serde(default)]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub id: String,
    pub order: i32,
    pub text: String,
    pub is_correct: bool,
    #[serde(default)]
    pub value: Option<String>,
}

/// Narrow, typed replacement for the free-form metadata blob attempts used to
/// carry. Unknown keys from clients are dropped at the boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptMetadata {
    #[serde(default)]
    pub client: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub time_spent_seconds: Option<i64>,
}

/// One learner's pass at an activity. Engine-owned; mutated only through the
/// attempt state machine and immutable once graded.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Attempt {
    pub id: String,
    pub user_id: String,
    pub activity_id: String,
    pub started_at: PrimitiveDateTime,
    pub submitted_at: Option<PrimitiveDateTime>,
    pub status: AttemptStatus,
    pub score: Option<i32>,
    pub metadata: Json<AttemptMetadata>,
    pub created_at: PrimitiveDateTime,
    pub updated_at: PrimitiveDateTime,
}

/// One learner's answer to one question within an attempt. Upserted by
/// `(attempt_id, question_id)`; `is_correct`/`score` stay NULL for
/// open-response answers awaiting external scoring.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AttemptSubmission {
    pub id: String,
    pub attempt_id: String,
    pub question_id: String,
    pub chosen_ids: Json<Vec<String>>,
    pub answer_text: Option<String>,
    pub is_correct: Option<bool>,
    pub score: Option<i32>,
    pub created_at: PrimitiveDateTime,
    pub updated_at: PrimitiveDateTime,
}
