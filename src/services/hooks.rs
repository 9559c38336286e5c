use async_trait::async_trait;
use time::PrimitiveDateTime;

/// Feature label reported through `on_feature_used` when a submission defers
/// answers to the external open-response scorer.
pub const OPEN_RESPONSE_FEATURE: &str = "open_response_scoring";

#[derive(Debug, Clone)]
pub struct AttemptGradedEvent {
    pub attempt_id: String,
    pub user_id: String,
    pub activity_id: String,
    pub score: i32,
    pub graded_at: PrimitiveDateTime,
}

/// One open-response answer awaiting external scoring.
#[derive(Debug, Clone)]
pub struct PendingOpenResponse {
    pub attempt_id: String,
    pub question_id: String,
    pub user_id: String,
    pub answer_text: String,
}

/// Streak and quota subsystems. Every call is best-effort: failures are
/// logged by the orchestrator and never fail the grading result.
#[async_trait]
pub trait EngagementHooks: Send + Sync {
    async fn on_attempt_graded(&self, event: &AttemptGradedEvent) -> anyhow::Result<()>;

    async fn on_feature_used(
        &self,
        user_id: &str,
        feature: &str,
        activity_id: &str,
    ) -> anyhow::Result<()>;
}

/// Extension point for pluggable open-response scorers. The engine records
/// the raw answer and hands it off here; scoring happens out-of-band.
#[async_trait]
pub trait OpenResponseQueue: Send + Sync {
    async fn enqueue(&self, pending: &PendingOpenResponse) -> anyhow::Result<()>;
}

pub struct NoopHooks;

#[async_trait]
impl EngagementHooks for NoopHooks {
    async fn on_attempt_graded(&self, _event: &AttemptGradedEvent) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_feature_used(
        &self,
        _user_id: &str,
        _feature: &str,
        _activity_id: &str,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

pub struct NoopOpenResponseQueue;

#[async_trait]
impl OpenResponseQueue for NoopOpenResponseQueue {
    async fn enqueue(&self, _pending: &PendingOpenResponse) -> anyhow::Result<()> {
        Ok(())
    }
}
