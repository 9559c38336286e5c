pub mod core;
pub mod db;
pub mod repositories;
pub mod schemas;
pub mod services;

pub use crate::core::config::Settings;
pub use crate::repositories::memory::{InMemoryActivityRepository, InMemoryAttemptStore};
pub use crate::repositories::{ActivityRepository, AttemptStore};
pub use crate::schemas::grading::{AnswerResult, GradingResult, SubmitRequest, SubmittedAnswer};
pub use crate::services::grading::GradingService;
pub use crate::services::hooks::{EngagementHooks, OpenResponseQueue};
pub use crate::services::GradingError;
