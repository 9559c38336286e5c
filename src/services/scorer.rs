use std::collections::HashMap;

use crate::db::models::Activity;
use crate::db::types::QuestionType;
use crate::schemas::grading::SubmittedAnswer;
use crate::services::answer_matcher::{match_answer, MatchOutcome};

#[derive(Debug, Clone)]
pub struct QuestionOutcome {
    pub question_id: String,
    pub kind: QuestionType,
    pub is_correct: Option<bool>,
    pub score_earned: i32,
    pub max_score: i32,
    pub chosen_ids: Vec<String>,
    pub answer_text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ScoreReport {
    /// One entry per activity question, in question order.
    pub outcomes: Vec<QuestionOutcome>,
    pub total_score: i32,
    pub max_score: i32,
    pub percentage: i32,
}

/// Grade a full answer batch against an activity. Pure and deterministic:
/// every activity question yields exactly one outcome, answers for unknown
/// questions are skipped, and unanswered questions score zero.
pub fn grade_all(activity: &Activity, answers: &[SubmittedAnswer]) -> ScoreReport {
    // Later duplicates win, mirroring upsert-on-resubmit semantics.
    let mut by_question: HashMap<&str, &SubmittedAnswer> = HashMap::new();
    for answer in answers {
        if !activity.questions.iter().any(|question| question.id == answer.question_id) {
            tracing::warn!(
                activity_id = %activity.id,
                question_id = %answer.question_id,
                "Skipping answer for question not on activity"
            );
            metrics::counter!("submitted_answers_skipped_total").increment(1);
            continue;
        }
        by_question.insert(answer.question_id.as_str(), answer);
    }

    let mut questions: Vec<_> = activity.questions.iter().collect();
    questions.sort_by_key(|question| question.order);

    let mut outcomes = Vec::with_capacity(questions.len());
    let mut total_score = 0;

    for question in questions {
        let answer = by_question.get(question.id.as_str());
        let chosen_ids = answer.map(|a| a.chosen_ids.clone()).unwrap_or_default();
        let answer_text = answer.and_then(|a| a.answer_text.clone());

        let outcome = match answer {
            Some(answer) => {
                match_answer(question, &answer.chosen_ids, answer.answer_text.as_deref())
            }
            // Unanswered: wrong for objective types, pending for open ones.
            None if question.kind.is_open_response() => {
                MatchOutcome { is_correct: None, score_earned: 0 }
            }
            None => MatchOutcome { is_correct: Some(false), score_earned: 0 },
        };

        total_score += outcome.score_earned;
        outcomes.push(QuestionOutcome {
            question_id: question.id.clone(),
            kind: question.kind,
            is_correct: outcome.is_correct,
            score_earned: outcome.score_earned,
            max_score: question.score,
            chosen_ids,
            answer_text,
        });
    }

    let max_score = activity
        .max_score
        .unwrap_or_else(|| activity.questions.iter().map(|question| question.score).sum());

    ScoreReport { outcomes, total_score, max_score, percentage: percentage(total_score, max_score) }
}

pub fn percentage(total_score: i32, max_score: i32) -> i32 {
    if max_score <= 0 {
        return 0;
    }
    ((f64::from(total_score) / f64::from(max_score)) * 100.0).round() as i32
}
