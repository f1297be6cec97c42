// src/models/question.rs

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::config::DEFAULT_TIME_LIMIT_SECS;

/// Every duel question is multiple choice with exactly this many options.
pub const OPTION_COUNT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

/// A question as held by the server for the lifetime of a room.
///
/// Intentionally not `Serialize`: the correct answer must never reach a
/// client, so anything that goes on the wire is a [`PublicQuestion`].
#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    pub id: String,

    /// The text content of the question.
    pub text: String,

    /// Exactly [`OPTION_COUNT`] options.
    pub options: Vec<String>,

    /// Index into `options`.
    pub correct_answer: usize,

    /// Explanation of the correct answer, kept server-side.
    pub explanation: Option<String>,

    pub difficulty: Difficulty,

    pub time_limit_secs: u32,
}

impl Question {
    pub fn is_correct(&self, answer: usize) -> bool {
        answer == self.correct_answer
    }
}

/// DTO for sending a question to clients (excludes answer and explanation).
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuestion {
    pub id: String,
    pub text: String,
    pub options: Vec<String>,
    pub difficulty: Difficulty,
    pub time_limit: u32,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id.clone(),
            text: q.text.clone(),
            options: q.options.clone(),
            difficulty: q.difficulty,
            time_limit: q.time_limit_secs,
        }
    }
}

/// A question as produced by the generation service or a question bank file.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedQuestion {
    #[validate(length(min = 1, max = 100))]
    pub id: Option<String>,
    #[validate(length(min = 1, max = 1000))]
    pub question: String,
    #[validate(custom(function = validate_options))]
    pub options: Vec<String>,
    #[validate(range(max = 3))]
    pub correct_answer: usize,
    #[validate(length(max = 2000))]
    pub explanation: Option<String>,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[validate(range(min = 5, max = 120))]
    pub time_limit: Option<u32>,
}

impl GeneratedQuestion {
    /// Validates and converts into the server-side representation.
    /// `fallback_id` is used when the generator did not assign one.
    pub fn into_question(self, fallback_id: String) -> Result<Question, validator::ValidationErrors> {
        self.validate()?;
        Ok(Question {
            id: self.id.unwrap_or(fallback_id),
            text: self.question,
            options: self.options,
            correct_answer: self.correct_answer,
            explanation: self.explanation,
            difficulty: self.difficulty,
            time_limit_secs: self.time_limit.unwrap_or(DEFAULT_TIME_LIMIT_SECS),
        })
    }
}

fn validate_options(options: &[String]) -> Result<(), validator::ValidationError> {
    if options.len() != OPTION_COUNT {
        return Err(validator::ValidationError::new("options_must_have_four_entries"));
    }
    for opt in options {
        if opt.trim().is_empty() {
            return Err(validator::ValidationError::new("option_cannot_be_empty"));
        }
        if opt.len() > 500 {
            return Err(validator::ValidationError::new("option_too_long"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generated(options: &[&str], correct_answer: usize) -> GeneratedQuestion {
        GeneratedQuestion {
            id: None,
            question: "What does `?` do?".to_string(),
            options: options.iter().map(|o| o.to_string()).collect(),
            correct_answer,
            explanation: Some("It propagates errors".to_string()),
            difficulty: Difficulty::Easy,
            time_limit: None,
        }
    }

    #[test]
    fn converts_with_fallback_id_and_default_limit() {
        let q = generated(&["a", "b", "c", "d"], 2)
            .into_question("q-1".to_string())
            .unwrap();
        assert_eq!(q.id, "q-1");
        assert_eq!(q.time_limit_secs, DEFAULT_TIME_LIMIT_SECS);
        assert!(q.is_correct(2));
        assert!(!q.is_correct(0));
    }

    #[test]
    fn rejects_wrong_option_count() {
        assert!(generated(&["a", "b", "c"], 0).into_question("x".into()).is_err());
    }

    #[test]
    fn rejects_out_of_range_answer() {
        assert!(generated(&["a", "b", "c", "d"], 4).into_question("x".into()).is_err());
    }

    #[test]
    fn public_question_has_no_answer_field() {
        let q = generated(&["a", "b", "c", "d"], 1).into_question("q".into()).unwrap();
        let json = serde_json::to_value(PublicQuestion::from(&q)).unwrap();
        assert!(json.get("correctAnswer").is_none());
        assert!(json.get("explanation").is_none());
        assert_eq!(json["timeLimit"], DEFAULT_TIME_LIMIT_SECS);
    }
}
