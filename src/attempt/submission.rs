// src/attempt/submission.rs

use async_trait::async_trait;

use crate::{
    api::{ApiClient, Collection, ODataQuery},
    attempt::tracker::AnswerTracker,
    error::AppError,
    models::{
        question::{AttemptQuestion, Question},
        result::{QuizResult, SubmissionAnswer, SubmissionPayload},
    },
};

/// The two network operations of an attempt.
#[async_trait]
pub trait QuizApi: Send + Sync {
    /// Questions of `quiz_id`, options embedded in display order.
    async fn fetch_questions(&self, quiz_id: i64) -> Result<Vec<Question>, AppError>;

    async fn submit_attempt(&self, payload: &SubmissionPayload) -> Result<QuizResult, AppError>;
}

#[async_trait]
impl QuizApi for ApiClient {
    async fn fetch_questions(&self, quiz_id: i64) -> Result<Vec<Question>, AppError> {
        let query = ODataQuery::new().eq("QuizId", quiz_id);
        let page = self.get_collection::<Question>("Question", &query).await?;
        Ok(page.value)
    }

    async fn submit_attempt(&self, payload: &SubmissionPayload) -> Result<QuizResult, AppError> {
        let url = self.api_url("Result/submit", &[])?;
        self.post_json(url, payload, Some(Collection::Results)).await
    }
}

/// Turns the recorded answers into the submission body.
///
/// Answers follow question order; each carries the selected option's text.
/// A selection whose option cannot be resolved is dropped with a warning.
pub fn build_payload(
    quiz_id: i64,
    student_id: i64,
    questions: &[AttemptQuestion],
    tracker: &AnswerTracker,
) -> SubmissionPayload {
    let answers = tracker
        .answered_in_order()
        .filter_map(|(question_id, option_id)| {
            let content = questions
                .iter()
                .find(|q| q.question_id == question_id)
                .and_then(|q| q.option(option_id))
                .map(|o| o.content.clone());

            if content.is_none() {
                tracing::warn!(
                    "Dropping answer for question {}: option {} not found",
                    question_id,
                    option_id
                );
            }

            content.map(|answer_content| SubmissionAnswer {
                question_id,
                answer_content,
                created_by: student_id,
            })
        })
        .collect();

    SubmissionPayload {
        student_id,
        quiz_id,
        answers,
    }
}
