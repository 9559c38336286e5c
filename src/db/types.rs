use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "attemptstatus", rename_all = "lowercase")]
pub enum AttemptStatus {
    Started,
    Submitted,
    Graded,
}

/// Skill an activity trains. Owned by content authoring; carried here so the
/// engine can log and report per skill without re-reading content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Skill {
    Reading,
    Listening,
    Speaking,
    Writing,
    Mediation,
    Grammar,
    Vocabulary,
    Culture,
}

impl Skill {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reading => "reading",
            Self::Listening => "listening",
            Self::Speaking => "speaking",
            Self::Writing => "writing",
            Self::Mediation => "mediation",
            Self::Grammar => "grammar",
            Self::Vocabulary => "vocabulary",
            Self::Culture => "culture",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    SingleChoice,
    MultiChoice,
    TrueFalse,
    ShortText,
    GapFill,
    LongText,
    OpenAudio,
}

impl QuestionType {
    /// Open-response types cannot be matched against a stored key; their
    /// correctness stays pending until an external scorer fills it in.
    pub fn is_open_response(self) -> bool {
        matches!(self, Self::LongText | Self::OpenAudio)
    }
}
