// src/models/question.rs

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    models::{status::EntityStatus, user::UserRef},
    utils::{html::clean_text, time::deserialize_optional_timestamp},
};

/// Question kind as stored by the backend.
/// Only `MultipleChoice` is exercised by the attempt flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QuestionType {
    #[default]
    #[serde(rename = "Multiple Choice")]
    MultipleChoice,
    #[serde(rename = "True/False")]
    TrueFalse,
    #[serde(rename = "Short Answer")]
    ShortAnswer,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::MultipleChoice => "Multiple Choice",
            QuestionType::TrueFalse => "True/False",
            QuestionType::ShortAnswer => "Short Answer",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        [
            QuestionType::MultipleChoice,
            QuestionType::TrueFalse,
            QuestionType::ShortAnswer,
        ]
        .into_iter()
        .find(|t| t.as_str().eq_ignore_ascii_case(raw.trim()))
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Difficulty level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Level {
    #[default]
    Easy,
    Medium,
    Hard,
}

impl Level {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "easy" => Some(Level::Easy),
            "medium" => Some(Level::Medium),
            "hard" => Some(Level::Hard),
            _ => None,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Level::Easy => "Easy",
            Level::Medium => "Medium",
            Level::Hard => "Hard",
        };
        f.write_str(label)
    }
}

/// Entry of the OData `Question` collection, options embedded in order.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Question {
    pub question_id: i64,
    pub quiz_id: i64,
    pub content: String,
    #[serde(default)]
    pub question_type: QuestionType,
    #[serde(default)]
    pub level: Level,
    #[serde(default)]
    pub options: Vec<QuestionOption>,
    #[serde(default)]
    pub status: EntityStatus,
    #[serde(default)]
    pub created_by_user: Option<UserRef>,
    #[serde(default, deserialize_with = "deserialize_optional_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

/// A selectable answer. `is_correct` is only ever shown in the teacher views.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QuestionOption {
    pub option_id: i64,
    #[serde(default)]
    pub question_id: i64,
    pub content: String,
    #[serde(default)]
    pub is_correct: bool,
    #[serde(default)]
    pub status: EntityStatus,
}

/// Question as presented during an attempt: correctness stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptQuestion {
    pub question_id: i64,
    pub content: String,
    pub options: Vec<AttemptOption>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptOption {
    pub option_id: i64,
    pub content: String,
}

impl AttemptQuestion {
    pub fn option(&self, option_id: i64) -> Option<&AttemptOption> {
        self.options.iter().find(|o| o.option_id == option_id)
    }
}

impl Question {
    /// Student-facing copy. Inactive options are dropped.
    pub fn for_attempt(&self) -> AttemptQuestion {
        AttemptQuestion {
            question_id: self.question_id,
            content: self.content.clone(),
            options: self
                .options
                .iter()
                .filter(|o| o.status == EntityStatus::Active)
                .map(|o| AttemptOption {
                    option_id: o.option_id,
                    content: o.content.clone(),
                })
                .collect(),
        }
    }

    pub fn author_name(&self) -> &str {
        self.created_by_user
            .as_ref()
            .map(|u| u.full_name.as_str())
            .unwrap_or("N/A")
    }

    pub fn has_option_content(&self, content: &str) -> bool {
        self.options.iter().any(|o| o.content == content)
    }

    pub fn to_form(&self) -> QuestionForm {
        QuestionForm {
            content: self.content.clone(),
            question_type: self.question_type,
            level: self.level,
            quiz_id: self.quiz_id,
            status: self.status,
        }
    }

    pub fn deactivated(&self) -> QuestionForm {
        QuestionForm {
            status: EntityStatus::Inactive,
            ..self.to_form()
        }
    }
}

impl QuestionOption {
    pub fn deactivated(&self) -> OptionForm {
        OptionForm {
            question_id: self.question_id,
            content: self.content.clone(),
            is_correct: self.is_correct,
            status: EntityStatus::Inactive,
        }
    }
}

/// DTO for creating or updating a question.
#[derive(Debug, Clone, Default, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct QuestionForm {
    #[validate(length(min = 1, max = 1000, message = "Question content is required."))]
    pub content: String,
    pub question_type: QuestionType,
    pub level: Level,
    #[validate(range(min = 1, message = "Quiz is required."))]
    pub quiz_id: i64,
    pub status: EntityStatus,
}

impl QuestionForm {
    pub fn sanitized(self) -> Self {
        Self {
            content: clean_text(&self.content),
            ..self
        }
    }
}

/// DTO for creating or updating an option.
#[derive(Debug, Clone, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OptionForm {
    #[validate(range(min = 1, message = "Question is required."))]
    pub question_id: i64,
    #[validate(length(min = 1, max = 500, message = "Option content is required."))]
    pub content: String,
    pub is_correct: bool,
    pub status: EntityStatus,
}

impl OptionForm {
    pub fn sanitized(self) -> Self {
        Self {
            content: clean_text(&self.content),
            ..self
        }
    }
}
