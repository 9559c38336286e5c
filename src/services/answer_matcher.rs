use std::collections::BTreeSet;

use crate::db::models::Question;
use crate::db::types::QuestionType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchOutcome {
    /// `None` for open-response types: correctness is decided externally.
    pub is_correct: Option<bool>,
    pub score_earned: i32,
}

impl MatchOutcome {
    fn wrong() -> Self {
        Self { is_correct: Some(false), score_earned: 0 }
    }

    fn right(score: i32) -> Self {
        Self { is_correct: Some(true), score_earned: score }
    }

    fn pending() -> Self {
        Self { is_correct: None, score_earned: 0 }
    }
}

/// Decide correctness of one submitted answer against the question's stored
/// key. Pure; malformed input is scored wrong, never an error.
pub fn match_answer(
    question: &Question,
    chosen_ids: &[String],
    answer_text: Option<&str>,
) -> MatchOutcome {
    match question.kind {
        QuestionType::SingleChoice | QuestionType::TrueFalse => {
            match_single_choice(question, chosen_ids)
        }
        QuestionType::MultiChoice => match_multi_choice(question, chosen_ids),
        QuestionType::ShortText | QuestionType::GapFill => match_text(question, answer_text),
        QuestionType::LongText | QuestionType::OpenAudio => MatchOutcome::pending(),
    }
}

pub fn normalize_answer(text: &str) -> String {
    text.trim().to_lowercase()
}

fn match_single_choice(question: &Question, chosen_ids: &[String]) -> MatchOutcome {
    // Zero or multiple ids on a single-choice question is an unanswered or
    // malformed item: wrong, not fatal.
    let [chosen] = chosen_ids else {
        return MatchOutcome::wrong();
    };

    let hit = question.choices.iter().any(|choice| choice.id == *chosen && choice.is_correct);
    if hit {
        MatchOutcome::right(question.score)
    } else {
        MatchOutcome::wrong()
    }
}

fn match_multi_choice(question: &Question, chosen_ids: &[String]) -> MatchOutcome {
    let correct: BTreeSet<&str> = question
        .choices
        .iter()
        .filter(|choice| choice.is_correct)
        .map(|choice| choice.id.as_str())
        .collect();
    let chosen: BTreeSet<&str> = chosen_ids.iter().map(String::as_str).collect();

    // All-or-nothing: extras and omissions (including ids that are not on the
    // question at all) both break set equality.
    if !correct.is_empty() && chosen == correct {
        MatchOutcome::right(question.score)
    } else {
        MatchOutcome::wrong()
    }
}

fn match_text(question: &Question, answer_text: Option<&str>) -> MatchOutcome {
    let Some(text) = answer_text else {
        return MatchOutcome::wrong();
    };

    let normalized = normalize_answer(text);
    if normalized.is_empty() {
        return MatchOutcome::wrong();
    }

    let hit = question.answer_keys.iter().any(|key| normalize_answer(key) == normalized);
    if hit {
        MatchOutcome::right(question.score)
    } else {
        MatchOutcome::wrong()
    }
}
