//! The 15-question personality questionnaire.

use pe_assessment::{ResultField, ANSWER_COUNT, MAX_ANSWER, MIN_ANSWER};

use crate::RuntimeError;

/// One statement rated on the 1..=5 agreement scale.
#[derive(Clone, Copy, Debug)]
pub struct Question {
    /// Result field the answer contributes to.
    pub category: ResultField,
    /// Statement shown to the respondent.
    pub text: &'static str,
}

const fn q(category: ResultField, text: &'static str) -> Question {
    Question { category, text }
}

/// Questions in submission order: five per result field.
pub const QUESTIONS: [Question; ANSWER_COUNT] = [
    q(ResultField::Stress, "I feel overwhelmed by my daily responsibilities"),
    q(ResultField::Stress, "I have trouble sleeping due to stress"),
    q(ResultField::Stress, "I feel anxious about the future"),
    q(ResultField::Stress, "I experience physical tension or headaches"),
    q(ResultField::Stress, "I find it hard to relax"),
    q(ResultField::Extroversion, "I enjoy being around large groups of people"),
    q(ResultField::Extroversion, "I feel energized after social interactions"),
    q(ResultField::Extroversion, "I prefer to think out loud rather than silently"),
    q(ResultField::Extroversion, "I am comfortable being the center of attention"),
    q(ResultField::Extroversion, "I make friends easily"),
    q(ResultField::Intuition, "I focus on possibilities and potential"),
    q(ResultField::Intuition, "I prefer abstract concepts over concrete details"),
    q(ResultField::Intuition, "I trust my gut feelings"),
    q(ResultField::Intuition, "I enjoy brainstorming and generating ideas"),
    q(ResultField::Intuition, "I see patterns and connections others might miss"),
];

/// Labels for answer values 1..=5.
pub const SCALE_LABELS: [&str; 5] = [
    "Strongly Disagree",
    "Disagree",
    "Neutral",
    "Agree",
    "Strongly Agree",
];

/// All-neutral answers.
pub fn default_answers() -> Vec<u32> {
    vec![3; ANSWER_COUNT]
}

/// Label of an answer value, if on the scale.
pub fn scale_label(value: u32) -> Option<&'static str> {
    if (MIN_ANSWER..=MAX_ANSWER).contains(&value) {
        SCALE_LABELS.get((value - MIN_ANSWER) as usize).copied()
    } else {
        None
    }
}

/// Heading under which a result field is shown.
pub fn field_title(field: ResultField) -> &'static str {
    match field {
        ResultField::Stress => "Stress Level",
        ResultField::Extroversion => "Extroversion Score",
        ResultField::Intuition => "Intuition Score",
    }
}

/// Parse comma-separated answers such as `3,3,4,...`.
///
/// Range and count are left to the orchestrator's validation.
pub fn parse_answers(raw: &str) -> Result<Vec<u32>, RuntimeError> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<u32>()
                .map_err(|_| RuntimeError::Answers(format!("not a number: {part:?}")))
        })
        .collect()
}
