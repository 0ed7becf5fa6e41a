// src/models/result.rs

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    config::{HIGH_SCORE_THRESHOLD, MEDIUM_SCORE_THRESHOLD},
    models::{quiz::QuizRef, user::UserRef},
    utils::time::{deserialize_optional_timestamp, deserialize_timestamp, minutes_between},
};

/// A scored attempt. Produced by the server, never computed locally.
///
/// `api/Result` and the submit endpoint answer in camelCase while
/// `odata/Result` uses PascalCase, so every field accepts both.
#[derive(Debug, Clone, Deserialize)]
pub struct QuizResult {
    #[serde(rename = "resultId", alias = "ResultId", default)]
    pub result_id: i64,
    #[serde(rename = "score", alias = "Score", default)]
    pub score: f64,
    #[serde(
        rename = "startTime",
        alias = "StartTime",
        deserialize_with = "deserialize_timestamp"
    )]
    pub start_time: DateTime<Utc>,
    #[serde(
        rename = "endTime",
        alias = "EndTime",
        deserialize_with = "deserialize_timestamp"
    )]
    pub end_time: DateTime<Utc>,
    #[serde(rename = "quizId", alias = "QuizId", default)]
    pub quiz_id: Option<i64>,
    #[serde(rename = "quiz", alias = "Quiz", default)]
    pub quiz: Option<QuizRef>,
    #[serde(rename = "studentId", alias = "StudentId", default)]
    pub student_id: Option<i64>,
    #[serde(rename = "student", alias = "Student", default)]
    pub student: Option<UserRef>,
    #[serde(rename = "quizCode", alias = "QuizCode", default)]
    pub quiz_code: Option<String>,
    #[serde(rename = "answers", alias = "Answers", default)]
    pub answers: Vec<ResultAnswer>,
    #[serde(
        rename = "createdAt",
        alias = "CreatedAt",
        default,
        deserialize_with = "deserialize_optional_timestamp"
    )]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResultAnswer {
    #[serde(rename = "questionId", alias = "QuestionId", default)]
    pub question_id: Option<i64>,
    #[serde(rename = "answerContent", alias = "AnswerContent", default)]
    pub answer_content: String,
    #[serde(rename = "isCorrect", alias = "IsCorrect", default)]
    pub is_correct: bool,
}

/// Score band used by the result management filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreBand {
    High,
    Medium,
    Low,
}

impl ScoreBand {
    pub fn of(score: f64) -> Self {
        if score >= HIGH_SCORE_THRESHOLD {
            ScoreBand::High
        } else if score >= MEDIUM_SCORE_THRESHOLD {
            ScoreBand::Medium
        } else {
            ScoreBand::Low
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "high" => Some(ScoreBand::High),
            "medium" => Some(ScoreBand::Medium),
            "low" => Some(ScoreBand::Low),
            _ => None,
        }
    }
}

impl fmt::Display for ScoreBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ScoreBand::High => "high",
            ScoreBand::Medium => "medium",
            ScoreBand::Low => "low",
        };
        f.write_str(label)
    }
}

impl QuizResult {
    pub fn band(&self) -> ScoreBand {
        ScoreBand::of(self.score)
    }

    pub fn duration_minutes(&self) -> i64 {
        minutes_between(self.start_time, self.end_time)
    }

    pub fn correct_count(&self) -> usize {
        self.answers.iter().filter(|a| a.is_correct).count()
    }

    pub fn quiz_title(&self) -> &str {
        self.quiz.as_ref().map(|q| q.title.as_str()).unwrap_or("N/A")
    }

    pub fn student_name(&self) -> &str {
        self.student
            .as_ref()
            .map(|s| s.full_name.as_str())
            .unwrap_or("N/A")
    }

    /// Quiz id from the flat field or the embedded reference.
    pub fn resolved_quiz_id(&self) -> Option<i64> {
        self.quiz_id
            .or_else(|| self.quiz.as_ref().and_then(|q| q.quiz_id))
    }
}

/// Body of `POST api/Result/submit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionPayload {
    pub student_id: i64,
    pub quiz_id: i64,
    pub answers: Vec<SubmissionAnswer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionAnswer {
    pub question_id: i64,
    /// Text of the selected option, not its id.
    pub answer_content: String,
    pub created_by: i64,
}
