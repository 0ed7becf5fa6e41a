// src/handlers/admin/questions.rs

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
        question::{Level, OptionForm, Question, QuestionForm, QuestionType},
        quiz::Quiz,
        status::EntityStatus,
    },
    state::AppState,
};

#[derive(Debug, Clone, Default)]
pub struct QuestionFilter {
    pub content: String,
    pub question_type: Option<QuestionType>,
    pub level: Option<Level>,
    pub status: Option<EntityStatus>,
}

impl RowFilter<Question> for QuestionFilter {
    fn matches(&self, q: &Question) -> bool {
        contains_ci(&q.content, &self.content)
            && self.question_type.is_none_or(|t| q.question_type == t)
            && self.level.is_none_or(|l| q.level == l)
            && self.status.is_none_or(|s| q.status == s)
    }
}

/// Teacher view of a question: options with their correctness flag.
#[derive(Debug, Clone)]
pub struct QuestionDetails {
    pub question: Question,
    pub quiz_title: Option<String>,
}

pub struct QuestionManager {
    table: ClientTable<Question, QuestionFilter>,
    quizzes: Vec<Quiz>,
    options_changed: Subscription,
}

impl QuestionManager {
    pub fn new(state: &AppState) -> Self {
        Self {
            table: ClientTable::new(
                QuestionFilter::default(),
                MANAGEMENT_PAGE_SIZE,
                state.bus.subscribe(Collection::Questions),
            ),
            quizzes: Vec::new(),
            options_changed: state.bus.subscribe(Collection::Options),
        }
    }

    pub fn table(&self) -> &ClientTable<Question, QuestionFilter> {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut ClientTable<Question, QuestionFilter> {
        &mut self.table
    }

    pub fn quizzes(&self) -> &[Quiz] {
        &self.quizzes
    }

    pub async fn refresh(&mut self, state: &AppState) -> Result<(), AppError> {
        require_teacher(state)?;
        let questions = state
            .api
            .get_collection::<Question>("Question", &ODataQuery::new())
            .await
            .map_err(|e| {
                tracing::error!("Failed to fetch questions: {:?}", e);
                e
            })?;
        self.table.set_rows(questions.value);

        let quizzes = state
            .api
            .get_collection::<Quiz>("Quiz", &ODataQuery::new())
            .await?;
        self.quizzes = quizzes.value;
        Ok(())
    }

    /// Options are embedded in questions, so either collection changing
    /// means a refetch.
    pub async fn refresh_if_stale(&mut self, state: &AppState) -> Result<bool, AppError> {
        let questions = self.table.is_stale();
        let options = self.options_changed.take_stale();
        if questions || options {
            self.refresh(state).await?;
            return Ok(true);
        }
        Ok(false)
    }

    pub fn details(&self, question_id: i64) -> Result<QuestionDetails, AppError> {
        let question = self
            .table
            .find(|q| q.question_id == question_id)
            .ok_or_else(|| AppError::NotFound(format!("Question {} not found", question_id)))?;
        let quiz_title = self
            .quizzes
            .iter()
            .find(|z| z.quiz_id == question.quiz_id)
            .map(|z| z.title.clone());
        Ok(QuestionDetails {
            question: question.clone(),
            quiz_title,
        })
    }

    pub async fn create(&self, state: &AppState, form: QuestionForm) -> Result<(), AppError> {
        require_teacher(state)?;
        if let Err(validation_errors) = form.validate() {
            return Err(AppError::BadRequest(validation_errors.to_string()));
        }
        let url = state.api.api_url("Question", &[])?;
        state
            .api
            .post(url, &form.sanitized(), Collection::Questions)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create question: {:?}", e);
                e
            })
    }

    pub async fn update(
        &self,
        state: &AppState,
        question_id: i64,
        form: QuestionForm,
    ) -> Result<(), AppError> {
        require_teacher(state)?;
        if let Err(validation_errors) = form.validate() {
            return Err(AppError::BadRequest(validation_errors.to_string()));
        }
        let url = state
            .api
            .api_url("Question", &[("questionId", question_id.to_string())])?;
        state
            .api
            .put(url, &form.sanitized(), Collection::Questions)
            .await
            .map_err(|e| {
                tracing::error!("Failed to update question {}: {:?}", question_id, e);
                e
            })
    }

    pub async fn deactivate(&self, state: &AppState, question_id: i64) -> Result<(), AppError> {
        let question = self
            .table
            .find(|q| q.question_id == question_id)
            .ok_or_else(|| AppError::NotFound(format!("Question {} not found", question_id)))?;
        self.update(state, question_id, question.deactivated()).await
    }

    pub async fn add_option(&self, state: &AppState, form: OptionForm) -> Result<(), AppError> {
        require_teacher(state)?;
        if let Err(validation_errors) = form.validate() {
            return Err(AppError::BadRequest(validation_errors.to_string()));
        }
        let url = state.api.api_url("Option", &[])?;
        state
            .api
            .post(url, &form.sanitized(), Collection::Options)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create option: {:?}", e);
                e
            })
    }

    pub async fn update_option(
        &self,
        state: &AppState,
        option_id: i64,
        form: OptionForm,
    ) -> Result<(), AppError> {
        require_teacher(state)?;
        if let Err(validation_errors) = form.validate() {
            return Err(AppError::BadRequest(validation_errors.to_string()));
        }
        let url = state
            .api
            .api_url("Option", &[("optionId", option_id.to_string())])?;
        state
            .api
            .put(url, &form.sanitized(), Collection::Options)
            .await
            .map_err(|e| {
                tracing::error!("Failed to update option {}: {:?}", option_id, e);
                e
            })
    }

    pub async fn deactivate_option(&self, state: &AppState, option_id: i64) -> Result<(), AppError> {
        let (question_id, option) = self
            .table
            .rows()
            .iter()
            .flat_map(|q| q.options.iter().map(move |o| (q.question_id, o)))
            .find(|(_, o)| o.option_id == option_id)
            .ok_or_else(|| AppError::NotFound(format!("Option {} not found", option_id)))?;
        // Embedded options may omit their parent id.
        let form = OptionForm {
            question_id,
            ..option.deactivated()
        };
        self.update_option(state, option_id, form).await
    }
}
