use std::collections::HashMap;
use std::sync::Arc;

use validator::Validate;

use crate::core::config::Settings;
use crate::core::time::{format_primitive, primitive_now_utc, to_primitive_utc};
use crate::db::models::{Activity, Attempt, Question};
use crate::db::types::QuestionType;
use crate::repositories::{ActivityRepository, AttemptStore, SubmissionRecord};
use crate::schemas::grading::{AnswerResult, GradingResult, SubmitRequest};
use crate::services::attempt_machine::{AttemptStateMachine, RecordOutcome};
use crate::services::hooks::{
    AttemptGradedEvent, EngagementHooks, NoopHooks, NoopOpenResponseQueue, OpenResponseQueue,
    PendingOpenResponse, OPEN_RESPONSE_FEATURE,
};
use crate::services::scorer::{self, ScoreReport};
use crate::services::GradingError;

/// Entry point for every skill's submit surface: validates the batch, drives
/// the attempt state machine and scorer, persists submissions, and notifies
/// the engagement hooks after a successful grade.
pub struct GradingService {
    activities: Arc<dyn ActivityRepository>,
    store: Arc<dyn AttemptStore>,
    machine: AttemptStateMachine,
    hooks: Arc<dyn EngagementHooks>,
    open_responses: Arc<dyn OpenResponseQueue>,
    max_answers: usize,
}

impl GradingService {
    pub fn new(
        activities: Arc<dyn ActivityRepository>,
        store: Arc<dyn AttemptStore>,
        settings: &Settings,
    ) -> Self {
        let machine =
            AttemptStateMachine::new(store.clone(), settings.engine().finalize_retry_attempts);
        Self {
            activities,
            store,
            machine,
            hooks: Arc::new(NoopHooks),
            open_responses: Arc::new(NoopOpenResponseQueue),
            max_answers: settings.engine().max_answers_per_submit,
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn EngagementHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_open_response_queue(mut self, queue: Arc<dyn OpenResponseQueue>) -> Self {
        self.open_responses = queue;
        self
    }

    pub async fn submit(&self, request: SubmitRequest) -> Result<GradingResult, GradingError> {
        request.validate().map_err(|err| GradingError::InvalidRequest(err.to_string()))?;
        if request.answers.len() > self.max_answers {
            return Err(GradingError::InvalidRequest(format!(
                "answer batch of {} exceeds the limit of {}",
                request.answers.len(),
                self.max_answers
            )));
        }

        let activity = self
            .activities
            .load_activity(&request.activity_id)
            .await?
            .ok_or_else(|| GradingError::ActivityNotFound(request.activity_id.clone()))?;

        let metadata = request.metadata.clone().unwrap_or_default();
        let attempt = self
            .machine
            .begin(
                &request.user_id,
                &request.activity_id,
                to_primitive_utc(request.started_at),
                metadata,
            )
            .await?;

        let report = scorer::grade_all(&activity, &request.answers);
        let records = submission_records(&report);

        let now = primitive_now_utc();
        match self.machine.record_answers(&attempt.id, &records, now).await? {
            RecordOutcome::Recorded => {}
            // A concurrent retry graded this attempt first; its result stands.
            RecordOutcome::AlreadyGraded => return self.stored_result(&activity, &attempt.id).await,
        }

        let outcome = self.machine.finalize(&attempt.id, report.total_score, now).await?;
        if !outcome.newly_graded {
            return self.stored_result(&activity, &attempt.id).await;
        }

        tracing::info!(
            attempt_id = %outcome.attempt.id,
            user_id = %request.user_id,
            activity_id = %activity.id,
            total_score = report.total_score,
            max_score = report.max_score,
            graded_at = %format_primitive(outcome.attempt.updated_at),
            "Attempt graded"
        );
        metrics::counter!("attempts_graded_total", "skill" => activity.skill.as_str())
            .increment(1);

        self.notify_graded(&activity, &outcome.attempt, &report).await;

        Ok(build_result(&outcome.attempt, &activity, &report))
    }

    /// Rebuild the grading result from what is persisted, for submit calls
    /// that lost the race to an identical retry.
    async fn stored_result(
        &self,
        activity: &Activity,
        attempt_id: &str,
    ) -> Result<GradingResult, GradingError> {
        let attempt = self
            .store
            .find_attempt(attempt_id)
            .await?
            .ok_or_else(|| GradingError::AttemptNotFound(attempt_id.to_string()))?;
        let rows = self.store.list_submissions(attempt_id).await?;
        let by_question: HashMap<&str, _> =
            rows.iter().map(|row| (row.question_id.as_str(), row)).collect();

        let mut questions: Vec<&Question> = activity.questions.iter().collect();
        questions.sort_by_key(|question| question.order);

        let answers = questions
            .iter()
            .map(|question| {
                let row = by_question.get(question.id.as_str());
                AnswerResult {
                    question_id: question.id.clone(),
                    is_correct: row.and_then(|row| row.is_correct),
                    score: row.and_then(|row| row.score),
                    max_score: question.score,
                    correct_answer: correct_answer(question),
                    explanation: question.explanation.clone(),
                }
            })
            .collect();

        let total_score = attempt.score.unwrap_or(0);
        let max_score = activity
            .max_score
            .unwrap_or_else(|| activity.questions.iter().map(|question| question.score).sum());

        Ok(GradingResult {
            attempt_id: attempt.id,
            total_score,
            max_score,
            percentage: scorer::percentage(total_score, max_score),
            answers,
        })
    }

    async fn notify_graded(&self, activity: &Activity, attempt: &Attempt, report: &ScoreReport) {
        let graded_at = attempt.submitted_at.unwrap_or(attempt.updated_at);
        let event = AttemptGradedEvent {
            attempt_id: attempt.id.clone(),
            user_id: attempt.user_id.clone(),
            activity_id: activity.id.clone(),
            score: report.total_score,
            graded_at,
        };
        if let Err(err) = self.hooks.on_attempt_graded(&event).await {
            tracing::warn!(attempt_id = %attempt.id, error = %err, "Streak hook failed");
            metrics::counter!("hook_failures_total", "hook" => "attempt_graded").increment(1);
        }

        let pending: Vec<PendingOpenResponse> = report
            .outcomes
            .iter()
            .filter(|outcome| outcome.kind.is_open_response())
            .filter_map(|outcome| {
                outcome.answer_text.as_ref().map(|text| PendingOpenResponse {
                    attempt_id: attempt.id.clone(),
                    question_id: outcome.question_id.clone(),
                    user_id: attempt.user_id.clone(),
                    answer_text: text.clone(),
                })
            })
            .collect();
        if pending.is_empty() {
            return;
        }

        if let Err(err) = self
            .hooks
            .on_feature_used(&attempt.user_id, OPEN_RESPONSE_FEATURE, &activity.id)
            .await
        {
            tracing::warn!(attempt_id = %attempt.id, error = %err, "Quota hook failed");
            metrics::counter!("hook_failures_total", "hook" => "feature_used").increment(1);
        }

        for item in &pending {
            if let Err(err) = self.open_responses.enqueue(item).await {
                tracing::warn!(
                    attempt_id = %item.attempt_id,
                    question_id = %item.question_id,
                    error = %err,
                    "Open-response enqueue failed"
                );
                metrics::counter!("hook_failures_total", "hook" => "open_response").increment(1);
            }
        }
    }
}

fn submission_records(report: &ScoreReport) -> Vec<SubmissionRecord> {
    report
        .outcomes
        .iter()
        .map(|outcome| SubmissionRecord {
            question_id: outcome.question_id.clone(),
            chosen_ids: outcome.chosen_ids.clone(),
            answer_text: outcome.answer_text.clone(),
            is_correct: outcome.is_correct,
            // Pending answers keep a NULL score until externally graded.
            score: outcome.is_correct.map(|_| outcome.score_earned),
        })
        .collect()
}

fn build_result(attempt: &Attempt, activity: &Activity, report: &ScoreReport) -> GradingResult {
    let questions: HashMap<&str, &Question> =
        activity.questions.iter().map(|question| (question.id.as_str(), question)).collect();

    let answers = report
        .outcomes
        .iter()
        .map(|outcome| {
            let question = questions.get(outcome.question_id.as_str());
            AnswerResult {
                question_id: outcome.question_id.clone(),
                is_correct: outcome.is_correct,
                score: outcome.is_correct.map(|_| outcome.score_earned),
                max_score: outcome.max_score,
                correct_answer: question.and_then(|question| correct_answer(question)),
                explanation: question.and_then(|question| question.explanation.clone()),
            }
        })
        .collect();

    GradingResult {
        attempt_id: attempt.id.clone(),
        total_score: report.total_score,
        max_score: report.max_score,
        percentage: report.percentage,
        answers,
    }
}

/// What the platform shows as the expected answer. Open-response questions
/// have none.
fn correct_answer(question: &Question) -> Option<Vec<String>> {
    match question.kind {
        QuestionType::SingleChoice | QuestionType::TrueFalse | QuestionType::MultiChoice => Some(
            question
                .choices
                .iter()
                .filter(|choice| choice.is_correct)
                .map(|choice| choice.text.clone())
                .collect(),
        ),
        QuestionType::ShortText | QuestionType::GapFill => Some(question.answer_keys.clone()),
        QuestionType::LongText | QuestionType::OpenAudio => None,
    }
}
