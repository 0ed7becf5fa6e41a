// src/handlers/admin/quizzes.rs

use validator::Validate;

use crate::{
    api::{Collection, ODataQuery, Subscription},
    config::MANAGEMENT_PAGE_SIZE,
    error::AppError,
    handlers::{
        admin::require_teacher,
        listing::{ClientTable, RowFilter, contains_ci},
    },
    models::{
        quiz::{Quiz, QuizCode, QuizForm},
        status::EntityStatus,
        subject::Subject,
    },
    state::AppState,
};

#[derive(Debug, Clone, Default)]
pub struct QuizFilter {
    pub title: String,
    pub description: String,
    pub subject_id: Option<i64>,
    pub status: Option<EntityStatus>,
}

impl RowFilter<Quiz> for QuizFilter {
    fn matches(&self, q: &Quiz) -> bool {
        contains_ci(&q.title, &self.title)
            && contains_ci(&q.description, &self.description)
            && self.subject_id.is_none_or(|id| q.subject_id == id)
            && self.status.is_none_or(|status| q.status == status)
    }
}

pub struct QuizManager {
    table: ClientTable<Quiz, QuizFilter>,
    /// Choices for the subject picker and filter.
    subjects: Vec<Subject>,
    subjects_changed: Subscription,
}

impl QuizManager {
    pub fn new(state: &AppState) -> Self {
        Self {
            table: ClientTable::new(
                QuizFilter::default(),
                MANAGEMENT_PAGE_SIZE,
                state.bus.subscribe(Collection::Quizzes),
            ),
            subjects: Vec::new(),
            subjects_changed: state.bus.subscribe(Collection::Subjects),
        }
    }

    pub fn table(&self) -> &ClientTable<Quiz, QuizFilter> {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut ClientTable<Quiz, QuizFilter> {
        &mut self.table
    }

    pub fn subjects(&self) -> &[Subject] {
        &self.subjects
    }

    pub async fn refresh(&mut self, state: &AppState) -> Result<(), AppError> {
        require_teacher(state)?;
        let quizzes = state
            .api
            .get_collection::<Quiz>("Quiz", &ODataQuery::new())
            .await
            .map_err(|e| {
                tracing::error!("Failed to fetch quizzes: {:?}", e);
                e
            })?;
        self.table.set_rows(quizzes.value);
        self.refresh_subjects(state).await
    }

    async fn refresh_subjects(&mut self, state: &AppState) -> Result<(), AppError> {
        let subjects = state
            .api
            .get_collection::<Subject>("Subject", &ODataQuery::new())
            .await?;
        self.subjects = subjects.value;
        Ok(())
    }

    pub async fn refresh_if_stale(&mut self, state: &AppState) -> Result<bool, AppError> {
        if self.table.is_stale() {
            self.subjects_changed.take_stale();
            self.refresh(state).await?;
            return Ok(true);
        }
        if self.subjects_changed.take_stale() {
            self.refresh_subjects(state).await?;
        }
        Ok(false)
    }

    fn check(state: &AppState, form: &QuizForm) -> Result<(), AppError> {
        require_teacher(state)?;
        if let Err(validation_errors) = form.validate() {
            return Err(AppError::BadRequest(validation_errors.to_string()));
        }
        Ok(())
    }

    pub async fn create(&self, state: &AppState, form: QuizForm) -> Result<(), AppError> {
        Self::check(state, &form)?;
        let url = state.api.api_url("Quiz", &[])?;
        state
            .api
            .post(url, &form.sanitized(), Collection::Quizzes)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create quiz: {:?}", e);
                e
            })
    }

    pub async fn update(&self, state: &AppState, quiz_id: i64, form: QuizForm) -> Result<(), AppError> {
        Self::check(state, &form)?;
        let url = state.api.api_url("Quiz", &[("quizId", quiz_id.to_string())])?;
        state
            .api
            .put(url, &form.sanitized(), Collection::Quizzes)
            .await
            .map_err(|e| {
                tracing::error!("Failed to update quiz {}: {:?}", quiz_id, e);
                e
            })
    }

    pub async fn deactivate(&self, state: &AppState, quiz_id: i64) -> Result<(), AppError> {
        let quiz = self
            .table
            .find(|q| q.quiz_id == quiz_id)
            .ok_or_else(|| AppError::NotFound(format!("Quiz {} not found", quiz_id)))?;
        self.update(state, quiz_id, quiz.deactivated()).await
    }

    /// Access code students use for the quiz.
    pub async fn quiz_code(&self, state: &AppState, quiz_id: i64) -> Result<QuizCode, AppError> {
        require_teacher(state)?;
        let url = state.api.api_url(&format!("Quiz/quiz-code/{}", quiz_id), &[])?;
        state.api.get_json(url).await.map_err(|e| {
            tracing::error!("Failed to fetch quiz code of {}: {:?}", quiz_id, e);
            e
        })
    }
}
