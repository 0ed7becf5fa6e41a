// src/models/quiz.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    models::{status::EntityStatus, user::UserRef},
    utils::{html::clean_text, time::deserialize_optional_timestamp},
};

/// Entry of the OData `Quiz` collection.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Quiz {
    #[serde(alias = "quizId")]
    pub quiz_id: i64,
    #[serde(alias = "title")]
    pub title: String,
    #[serde(default, alias = "description")]
    pub description: String,

    /// Time limit in minutes.
    #[serde(default, alias = "timeLimit")]
    pub time_limit: u32,

    #[serde(default, alias = "subjectId")]
    pub subject_id: i64,
    #[serde(default)]
    pub subject: Option<SubjectRef>,
    #[serde(default)]
    pub teacher: Option<UserRef>,

    #[serde(default, alias = "status")]
    pub status: EntityStatus,
    #[serde(default, deserialize_with = "deserialize_optional_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_optional_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Quiz {
    pub fn duration_secs(&self) -> u64 {
        u64::from(self.time_limit) * 60
    }

    pub fn subject_name(&self) -> &str {
        self.subject
            .as_ref()
            .map(|s| s.subject_name.as_str())
            .unwrap_or("N/A")
    }

    pub fn teacher_name(&self) -> &str {
        self.teacher
            .as_ref()
            .map(|t| t.full_name.as_str())
            .unwrap_or("N/A")
    }

    /// Editable fields, as currently stored.
    pub fn to_form(&self) -> QuizForm {
        QuizForm {
            title: self.title.clone(),
            description: self.description.clone(),
            subject_id: self.subject_id,
            time_limit: self.time_limit,
            status: self.status,
        }
    }

    pub fn deactivated(&self) -> QuizForm {
        QuizForm {
            status: EntityStatus::Inactive,
            ..self.to_form()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubjectRef {
    #[serde(rename = "SubjectName", alias = "subjectName")]
    pub subject_name: String,
}

/// Compact quiz reference embedded in results.
#[derive(Debug, Clone, Deserialize)]
pub struct QuizRef {
    #[serde(rename = "QuizId", alias = "quizId", default)]
    pub quiz_id: Option<i64>,
    #[serde(rename = "Title", alias = "title")]
    pub title: String,
}

/// DTO for creating or updating a quiz.
#[derive(Debug, Clone, Default, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct QuizForm {
    #[validate(length(min = 1, max = 200, message = "Title is required."))]
    pub title: String,
    #[validate(length(max = 2000))]
    pub description: String,
    #[validate(range(min = 1, message = "Subject is required."))]
    pub subject_id: i64,
    #[validate(range(min = 1, max = 600, message = "Time limit must be between 1 and 600 minutes."))]
    pub time_limit: u32,
    pub status: EntityStatus,
}

impl QuizForm {
    pub fn sanitized(self) -> Self {
        Self {
            title: clean_text(&self.title),
            description: clean_text(&self.description),
            ..self
        }
    }
}

/// Response of `GET api/Quiz/quiz-code/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct QuizCode {
    #[serde(alias = "Code", alias = "quizCode")]
    pub code: String,
}
