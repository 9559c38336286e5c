use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use linguara_grading::db::models::{Activity, Attempt, AttemptSubmission, Choice, Question};
use linguara_grading::db::types::{QuestionType, Skill};
use linguara_grading::repositories::{
    AttemptStore, FinalizedAttempt, StoreError, SubmissionRecord,
};
use linguara_grading::services::hooks::{AttemptGradedEvent, PendingOpenResponse};
use linguara_grading::{
    EngagementHooks, GradingError, GradingService, InMemoryActivityRepository,
    InMemoryAttemptStore, OpenResponseQueue, Settings, SubmitRequest, SubmittedAnswer,
};

fn choice(id: &str, order: i32, text: &str, is_correct: bool) -> Choice {
    Choice { id: id.to_string(), order, text: text.to_string(), is_correct, value: None }
}

fn single_choice(id: &str, order: i32, score: i32, correct_id: &str) -> Question {
    Question {
        id: id.to_string(),
        order,
        kind: QuestionType::SingleChoice,
        prompt: format!("prompt {id}"),
        score,
        choices: vec![choice(correct_id, 1, "the right one", true), choice("other", 2, "no", false)],
        answer_keys: vec![],
        explanation: None,
    }
}

fn reading_activity() -> Activity {
    Activity {
        id: "act-reading".to_string(),
        skill: Skill::Reading,
        max_score: None,
        questions: vec![
            single_choice("q1", 1, 5, "c2"),
            Question {
                id: "q2".to_string(),
                order: 2,
                kind: QuestionType::MultiChoice,
                prompt: "pick both".to_string(),
                score: 5,
                choices: vec![
                    choice("x", 1, "first", true),
                    choice("y", 2, "second", true),
                    choice("z", 3, "third", false),
                ],
                answer_keys: vec![],
                explanation: Some("x and y are both required".to_string()),
            },
        ],
    }
}

fn answer(question_id: &str, chosen: &[&str], text: Option<&str>) -> SubmittedAnswer {
    SubmittedAnswer {
        question_id: question_id.to_string(),
        chosen_ids: chosen.iter().map(|id| id.to_string()).collect(),
        answer_text: text.map(|value| value.to_string()),
    }
}

fn request(activity_id: &str, user_id: &str, answers: Vec<SubmittedAnswer>) -> SubmitRequest {
    SubmitRequest {
        activity_id: activity_id.to_string(),
        user_id: user_id.to_string(),
        answers,
        started_at: OffsetDateTime::now_utc(),
        metadata: None,
    }
}

#[derive(Default)]
struct RecordingHooks {
    graded: Mutex<Vec<AttemptGradedEvent>>,
    features: Mutex<Vec<(String, String, String)>>,
}

#[async_trait]
impl EngagementHooks for RecordingHooks {
    async fn on_attempt_graded(&self, event: &AttemptGradedEvent) -> anyhow::Result<()> {
        self.graded.lock().await.push(event.clone());
        Ok(())
    }

    async fn on_feature_used(
        &self,
        user_id: &str,
        feature: &str,
        activity_id: &str,
    ) -> anyhow::Result<()> {
        self.features.lock().await.push((
            user_id.to_string(),
            feature.to_string(),
            activity_id.to_string(),
        ));
        Ok(())
    }
}

struct FailingHooks;

#[async_trait]
impl EngagementHooks for FailingHooks {
    async fn on_attempt_graded(&self, _event: &AttemptGradedEvent) -> anyhow::Result<()> {
        anyhow::bail!("streak service down")
    }

    async fn on_feature_used(
        &self,
        _user_id: &str,
        _feature: &str,
        _activity_id: &str,
    ) -> anyhow::Result<()> {
        anyhow::bail!("quota service down")
    }
}

#[derive(Default)]
struct RecordingQueue {
    items: Mutex<Vec<PendingOpenResponse>>,
}

#[async_trait]
impl OpenResponseQueue for RecordingQueue {
    async fn enqueue(&self, pending: &PendingOpenResponse) -> anyhow::Result<()> {
        self.items.lock().await.push(pending.clone());
        Ok(())
    }
}

async fn service_with(
    activity: Activity,
    store: Arc<dyn AttemptStore>,
) -> (GradingService, Arc<RecordingHooks>, Arc<RecordingQueue>) {
    let activities = Arc::new(InMemoryActivityRepository::new());
    activities.insert(activity).await;
    let hooks = Arc::new(RecordingHooks::default());
    let queue = Arc::new(RecordingQueue::default());
    let settings = Settings::load().expect("settings");
    let service = GradingService::new(activities, store, &settings)
        .with_hooks(hooks.clone())
        .with_open_response_queue(queue.clone());
    (service, hooks, queue)
}

#[tokio::test]
async fn grades_a_reading_activity_end_to_end() {
    let store = Arc::new(InMemoryAttemptStore::new());
    let (service, hooks, _) = service_with(reading_activity(), store.clone()).await;

    let result = service
        .submit(request(
            "act-reading",
            "user-1",
            vec![answer("q1", &["c2"], None), answer("q2", &["x"], None)],
        ))
        .await
        .expect("graded");

    assert_eq!(result.total_score, 5);
    assert_eq!(result.max_score, 10);
    assert_eq!(result.percentage, 50);
    assert_eq!(result.answers.len(), 2);

    let q1 = &result.answers[0];
    assert_eq!(q1.question_id, "q1");
    assert_eq!(q1.is_correct, Some(true));
    assert_eq!(q1.score, Some(5));
    assert_eq!(q1.max_score, 5);
    assert_eq!(q1.correct_answer.as_deref(), Some(&["the right one".to_string()][..]));

    let q2 = &result.answers[1];
    assert_eq!(q2.is_correct, Some(false));
    assert_eq!(q2.score, Some(0));
    assert_eq!(q2.explanation.as_deref(), Some("x and y are both required"));

    let graded = hooks.graded.lock().await;
    assert_eq!(graded.len(), 1);
    assert_eq!(graded[0].score, 5);
    assert_eq!(graded[0].user_id, "user-1");
}

#[tokio::test]
async fn missing_answers_still_yield_a_complete_result() {
    let activity = Activity {
        id: "act-gaps".to_string(),
        skill: Skill::Grammar,
        max_score: None,
        questions: (1..=5).map(|n| single_choice(&format!("q{n}"), n, 2, "ok")).collect(),
    };
    let store = Arc::new(InMemoryAttemptStore::new());
    let (service, _, _) = service_with(activity, store).await;

    let result = service
        .submit(request(
            "act-gaps",
            "user-1",
            vec![
                answer("q1", &["ok"], None),
                answer("q4", &["ok"], None),
                // Not part of the activity: skipped, never fatal.
                answer("ghost", &["ok"], None),
            ],
        ))
        .await
        .expect("graded");

    assert_eq!(result.answers.len(), 5);
    assert_eq!(result.total_score, 4);
    let unanswered: Vec<_> =
        result.answers.iter().filter(|a| a.is_correct == Some(false)).collect();
    assert_eq!(unanswered.len(), 3);
}

#[tokio::test]
async fn invalid_choice_id_scores_zero_without_rejecting_the_batch() {
    let store = Arc::new(InMemoryAttemptStore::new());
    let (service, _, _) = service_with(reading_activity(), store).await;

    let result = service
        .submit(request(
            "act-reading",
            "user-1",
            vec![answer("q1", &["not-a-choice"], None), answer("q2", &["x", "y"], None)],
        ))
        .await
        .expect("graded");

    assert_eq!(result.answers[0].is_correct, Some(false));
    assert_eq!(result.answers[1].is_correct, Some(true));
    assert_eq!(result.total_score, 5);
}

#[tokio::test]
async fn open_response_answers_stay_pending_and_are_enqueued() {
    let activity = Activity {
        id: "act-writing".to_string(),
        skill: Skill::Writing,
        max_score: Some(20),
        questions: vec![
            single_choice("q1", 1, 5, "a"),
            Question {
                id: "q2".to_string(),
                order: 2,
                kind: QuestionType::LongText,
                prompt: "write an essay".to_string(),
                score: 15,
                choices: vec![],
                answer_keys: vec![],
                explanation: None,
            },
        ],
    };
    let store = Arc::new(InMemoryAttemptStore::new());
    let (service, hooks, queue) = service_with(activity, store.clone()).await;

    let result = service
        .submit(request(
            "act-writing",
            "user-7",
            vec![answer("q1", &["a"], None), answer("q2", &[], Some("Mein Aufsatz ..."))],
        ))
        .await
        .expect("graded");

    let essay = &result.answers[1];
    assert_eq!(essay.is_correct, None);
    assert_eq!(essay.score, None);
    assert_eq!(essay.max_score, 15);
    assert!(essay.correct_answer.is_none());
    // Only the objective part counts at engine level.
    assert_eq!(result.total_score, 5);
    assert_eq!(result.max_score, 20);
    assert_eq!(result.percentage, 25);

    let items = queue.items.lock().await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].question_id, "q2");
    assert_eq!(items[0].answer_text, "Mein Aufsatz ...");

    let features = hooks.features.lock().await;
    assert_eq!(features.len(), 1);
    assert_eq!(features[0].1, "open_response_scoring");
}

#[tokio::test]
async fn hook_failures_never_fail_the_grading_result() {
    let store = Arc::new(InMemoryAttemptStore::new());
    let activities = Arc::new(InMemoryActivityRepository::new());
    activities.insert(reading_activity()).await;
    let settings = Settings::load().expect("settings");
    let service = GradingService::new(activities, store, &settings)
        .with_hooks(Arc::new(FailingHooks));

    let result = service
        .submit(request("act-reading", "user-1", vec![answer("q1", &["c2"], None)]))
        .await
        .expect("grading succeeds despite hook failures");

    assert_eq!(result.total_score, 5);
}

#[tokio::test]
async fn unknown_activity_is_a_fatal_not_found() {
    let store = Arc::new(InMemoryAttemptStore::new());
    let (service, _, _) = service_with(reading_activity(), store).await;

    let err = service
        .submit(request("act-missing", "user-1", vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, GradingError::ActivityNotFound(_)));
}

#[tokio::test]
async fn blank_user_id_is_rejected_before_any_state_changes() {
    let store = Arc::new(InMemoryAttemptStore::new());
    let (service, _, _) = service_with(reading_activity(), store.clone()).await;

    let err = service.submit(request("act-reading", "", vec![])).await.unwrap_err();
    assert!(matches!(err, GradingError::InvalidRequest(_)));
    assert_eq!(store.attempt_count().await, 0);
}

#[tokio::test]
async fn resubmitting_after_grading_creates_a_new_historical_attempt() {
    let store = Arc::new(InMemoryAttemptStore::new());
    let (service, hooks, _) = service_with(reading_activity(), store.clone()).await;

    let first = service
        .submit(request("act-reading", "user-1", vec![answer("q1", &["c2"], None)]))
        .await
        .expect("first");
    let second = service
        .submit(request("act-reading", "user-1", vec![answer("q1", &["other"], None)]))
        .await
        .expect("second");

    assert_ne!(first.attempt_id, second.attempt_id);
    assert_eq!(store.attempt_count().await, 2);
    assert_eq!(first.total_score, 5);
    assert_eq!(second.total_score, 0);
    assert_eq!(hooks.graded.lock().await.len(), 2);
}

/// Delegating store that reports in-flight lookups even for graded attempts,
/// reproducing the window where a duplicate retry reaches the engine after a
/// racing call already graded the shared attempt.
struct RacedStore {
    inner: InMemoryAttemptStore,
    last_inserted: Mutex<Option<String>>,
}

#[async_trait]
impl AttemptStore for RacedStore {
    async fn find_attempt(&self, attempt_id: &str) -> Result<Option<Attempt>, StoreError> {
        self.inner.find_attempt(attempt_id).await
    }

    async fn find_in_flight(
        &self,
        user_id: &str,
        activity_id: &str,
    ) -> Result<Option<Attempt>, StoreError> {
        if let Some(existing) = self.inner.find_in_flight(user_id, activity_id).await? {
            return Ok(Some(existing));
        }
        // Hand back the graded attempt as if it were still in flight.
        let last = self.last_inserted.lock().await.clone();
        match last {
            Some(id) => self.inner.find_attempt(&id).await,
            None => Ok(None),
        }
    }

    async fn insert_attempt(&self, attempt: &Attempt) -> Result<(), StoreError> {
        *self.last_inserted.lock().await = Some(attempt.id.clone());
        self.inner.insert_attempt(attempt).await
    }

    async fn upsert_submissions(
        &self,
        attempt_id: &str,
        records: &[SubmissionRecord],
        now: time::PrimitiveDateTime,
    ) -> Result<(), StoreError> {
        self.inner.upsert_submissions(attempt_id, records, now).await
    }

    async fn list_submissions(
        &self,
        attempt_id: &str,
    ) -> Result<Vec<AttemptSubmission>, StoreError> {
        self.inner.list_submissions(attempt_id).await
    }

    async fn finalize_attempt(
        &self,
        attempt_id: &str,
        total_score: i32,
        now: time::PrimitiveDateTime,
    ) -> Result<FinalizedAttempt, StoreError> {
        self.inner.finalize_attempt(attempt_id, total_score, now).await
    }
}

#[tokio::test]
async fn duplicate_retry_gets_the_stored_result_without_regrading() {
    let store = Arc::new(RacedStore {
        inner: InMemoryAttemptStore::new(),
        last_inserted: Mutex::new(None),
    });
    let (service, hooks, _) = service_with(reading_activity(), store.clone()).await;

    let answers = vec![answer("q1", &["c2"], None), answer("q2", &["x"], None)];
    let first = service
        .submit(request("act-reading", "user-1", answers.clone()))
        .await
        .expect("first");
    // The retry reuses the now-graded attempt instead of opening a new one.
    let retry = service
        .submit(request("act-reading", "user-1", answers))
        .await
        .expect("retry");

    assert_eq!(retry.attempt_id, first.attempt_id);
    assert_eq!(retry.total_score, first.total_score);
    assert_eq!(retry.percentage, first.percentage);
    assert_eq!(retry.answers.len(), first.answers.len());
    assert_eq!(store.inner.attempt_count().await, 1);
    // The completion side effects fired exactly once.
    assert_eq!(hooks.graded.lock().await.len(), 1);
}
