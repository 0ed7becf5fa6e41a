// src/handlers/history.rs

//! The student's scored history and the per-answer review of one result.

use chrono::{DateTime, Utc};

use crate::{
    api::{Collection, ODataQuery, SortDirection, Subscription},
    config::HISTORY_PAGE_SIZE,
    error::AppError,
    handlers::listing::ServerPaging,
    models::{question::Question, result::QuizResult},
    state::AppState,
};

pub struct HistoryScreen {
    paging: ServerPaging,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    results: Vec<QuizResult>,
    subscription: Subscription,
}

impl HistoryScreen {
    pub fn new(state: &AppState) -> Self {
        Self {
            paging: ServerPaging::new(HISTORY_PAGE_SIZE),
            from: None,
            to: None,
            results: Vec::new(),
            subscription: state.bus.subscribe(Collection::Results),
        }
    }

    pub fn query(&self, student_id: i64) -> ODataQuery {
        let mut query = ODataQuery::new()
            .with_count()
            .page(self.paging.page, self.paging.page_size)
            .eq("StudentId", student_id);
        if let Some(from) = self.from {
            query = query.ge("EndTime", from);
        }
        if let Some(to) = self.to {
            query = query.le("EndTime", to);
        }
        query.order_by("CreatedAt", SortDirection::Desc)
    }

    pub async fn refresh(&mut self, state: &AppState) -> Result<(), AppError> {
        let student_id = state.session.user_id().ok_or_else(|| {
            AppError::AuthError("Please login to view your history".to_string())
        })?;

        let page = state
            .api
            .get_collection::<QuizResult>("Result", &self.query(student_id))
            .await
            .map_err(|e| {
                tracing::error!("Failed to load quiz history: {:?}", e);
                e
            })?;
        self.paging.total = page.total();
        self.results = page.value;
        Ok(())
    }

    pub async fn refresh_if_stale(&mut self, state: &AppState) -> Result<bool, AppError> {
        if self.subscription.take_stale() {
            self.refresh(state).await?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Restricts to results that ended within `[from, to]`. Either bound may
    /// be open. Goes back to the first page.
    pub fn set_range(&mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) {
        self.from = from;
        self.to = to;
        self.paging.reset();
    }

    pub fn set_page(&mut self, page: u32) -> bool {
        self.paging.set_page(page)
    }

    pub fn paging(&self) -> ServerPaging {
        self.paging
    }

    pub fn results(&self) -> &[QuizResult] {
        &self.results
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// One row of the answer breakdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewLine {
    pub number: usize,
    pub question: String,
    pub answer: String,
    pub is_correct: bool,
}

/// Score, timing and answer breakdown of a result.
#[derive(Debug, Clone)]
pub struct ResultReview {
    pub quiz_title: String,
    pub quiz_code: Option<String>,
    pub score: f64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: i64,
    pub correct: usize,
    pub lines: Vec<ReviewLine>,
}

pub const QUESTION_NOT_FOUND: &str = "Question not found";

impl ResultReview {
    /// Resolves each answer's question text by question id when the result
    /// carries one, otherwise by finding the question owning an option with
    /// the same text.
    pub fn build(result: &QuizResult, questions: &[Question]) -> Self {
        let lines = result
            .answers
            .iter()
            .enumerate()
            .map(|(i, answer)| {
                let by_id = answer
                    .question_id
                    .and_then(|id| questions.iter().find(|q| q.question_id == id));
                let question = by_id.or_else(|| {
                    questions
                        .iter()
                        .find(|q| q.has_option_content(&answer.answer_content))
                });
                ReviewLine {
                    number: i + 1,
                    question: question
                        .map(|q| q.content.clone())
                        .unwrap_or_else(|| QUESTION_NOT_FOUND.to_string()),
                    answer: answer.answer_content.clone(),
                    is_correct: answer.is_correct,
                }
            })
            .collect();

        Self {
            quiz_title: result.quiz_title().to_string(),
            quiz_code: result.quiz_code.clone(),
            score: result.score,
            start_time: result.start_time,
            end_time: result.end_time,
            duration_minutes: result.duration_minutes(),
            correct: result.correct_count(),
            lines,
        }
    }
}

/// Loads the questions of the result's quiz and builds the review.
/// A failed question fetch still yields a review, with unresolved texts.
pub async fn review_result(state: &AppState, result: &QuizResult) -> ResultReview {
    let questions = match result.resolved_quiz_id() {
        Some(quiz_id) => {
            let query = ODataQuery::new().eq("QuizId", quiz_id);
            match state.api.get_collection::<Question>("Question", &query).await {
                Ok(page) => page.value,
                Err(e) => {
                    tracing::warn!("Could not load questions for review: {:?}", e);
                    Vec::new()
                }
            }
        }
        None => Vec::new(),
    };
    ResultReview::build(result, &questions)
}
