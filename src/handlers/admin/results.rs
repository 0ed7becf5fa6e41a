// src/handlers/admin/results.rs

use crate::{
    api::{Collection, ODataQuery},
    config::MANAGEMENT_PAGE_SIZE,
    error::AppError,
    handlers::{
        admin::require_teacher,
        history::ResultReview,
        listing::{ClientTable, RowFilter, contains_ci},
    },
    models::{
        question::Question,
        result::{QuizResult, ScoreBand},
    },
    state::AppState,
};

#[derive(Debug, Clone, Default)]
pub struct ResultFilter {
    pub student_name: String,
    /// Exact quiz title; `None` shows every quiz.
    pub quiz_title: Option<String>,
    pub band: Option<ScoreBand>,
}

impl RowFilter<QuizResult> for ResultFilter {
    fn matches(&self, r: &QuizResult) -> bool {
        contains_ci(r.student_name(), &self.student_name)
            && self.quiz_title.as_deref().is_none_or(|t| r.quiz_title() == t)
            && self.band.is_none_or(|b| r.band() == b)
    }
}

/// Every submitted result, newest end time first.
pub struct ResultManager {
    table: ClientTable<QuizResult, ResultFilter>,
    questions: Vec<Question>,
}

impl ResultManager {
    pub fn new(state: &AppState) -> Self {
        Self {
            table: ClientTable::new(
                ResultFilter::default(),
                MANAGEMENT_PAGE_SIZE,
                state.bus.subscribe(Collection::Results),
            ),
            questions: Vec::new(),
        }
    }

    pub fn table(&self) -> &ClientTable<QuizResult, ResultFilter> {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut ClientTable<QuizResult, ResultFilter> {
        &mut self.table
    }

    pub async fn refresh(&mut self, state: &AppState) -> Result<(), AppError> {
        require_teacher(state)?;
        let url = state.api.api_url("Result", &[])?;
        let mut results: Vec<QuizResult> = state.api.get_json(url).await.map_err(|e| {
            tracing::error!("Failed to fetch results: {:?}", e);
            e
        })?;
        results.sort_by(|a, b| b.end_time.cmp(&a.end_time));
        self.table.set_rows(results);

        // Question texts are only needed for the details view.
        match state
            .api
            .get_collection::<Question>("Question", &ODataQuery::new())
            .await
        {
            Ok(page) => self.questions = page.value,
            Err(e) => tracing::warn!("Failed to fetch questions for result details: {:?}", e),
        }
        Ok(())
    }

    pub async fn refresh_if_stale(&mut self, state: &AppState) -> Result<bool, AppError> {
        if self.table.is_stale() {
            self.refresh(state).await?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Distinct quiz titles for the quiz filter.
    pub fn quiz_titles(&self) -> Vec<String> {
        let mut titles: Vec<String> = self
            .table
            .rows()
            .iter()
            .map(|r| r.quiz_title().to_string())
            .collect();
        titles.sort();
        titles.dedup();
        titles
    }

    pub fn details(&self, result_id: i64) -> Result<ResultReview, AppError> {
        let result = self
            .table
            .find(|r| r.result_id == result_id)
            .ok_or_else(|| AppError::NotFound(format!("Result {} not found", result_id)))?;
        Ok(ResultReview::build(result, &self.questions))
    }
}
