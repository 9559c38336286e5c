use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use validator::Validate;

use crate::db::models::AttemptMetadata;

/// Inbound submit call: one learner, one activity, the answers as entered.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubmitRequest {
    #[validate(length(min = 1, max = 64))]
    pub activity_id: String,
    #[validate(length(min = 1, max = 64))]
    pub user_id: String,
    #[validate(nested)]
    pub answers: Vec<SubmittedAnswer>,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(default)]
    pub metadata: Option<AttemptMetadata>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubmittedAnswer {
    #[validate(length(min = 1, max = 64))]
    pub question_id: String,
    #[serde(default)]
    pub chosen_ids: Vec<String>,
    #[serde(default)]
    pub answer_text: Option<String>,
}

/// Stable wire contract returned to every skill's submit surface. Field names
/// are camelCase on the wire; do not rename without versioning the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingResult {
    pub attempt_id: String,
    pub total_score: i32,
    pub max_score: i32,
    pub percentage: i32,
    pub answers: Vec<AnswerResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResult {
    pub question_id: String,
    /// `None` means pending external grading (open-response types).
    pub is_correct: Option<bool>,
    pub score: Option<i32>,
    pub max_score: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}
