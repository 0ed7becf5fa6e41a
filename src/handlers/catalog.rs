// src/handlers/catalog.rs

//! Student-facing browsing: subjects on the home screen and the quizzes of
//! one subject.

use crate::{
    api::{Collection, ODataQuery, SortDirection, Subscription},
    config::{HOME_PAGE_SIZE, QUIZ_LIST_PAGE_SIZE},
    error::AppError,
    handlers::listing::ServerPaging,
    models::{quiz::Quiz, subject::Subject},
    state::AppState,
};

/// Home screen: server-paged subjects with name search and date sort.
pub struct SubjectBrowser {
    paging: ServerPaging,
    search: String,
    sort: SortDirection,
    subjects: Vec<Subject>,
    subscription: Subscription,
}

impl SubjectBrowser {
    pub fn new(state: &AppState) -> Self {
        Self {
            paging: ServerPaging::new(HOME_PAGE_SIZE),
            search: String::new(),
            sort: SortDirection::Desc,
            subjects: Vec::new(),
            subscription: state.bus.subscribe(Collection::Subjects),
        }
    }

    pub fn query(&self) -> ODataQuery {
        ODataQuery::new()
            .with_count()
            .page(self.paging.page, self.paging.page_size)
            .contains("SubjectName", &self.search)
            .order_by("CreatedAt", self.sort)
    }

    pub async fn refresh(&mut self, state: &AppState) -> Result<(), AppError> {
        let page = state
            .api
            .get_collection::<Subject>("Subject", &self.query())
            .await
            .map_err(|e| {
                tracing::error!("Failed to fetch subjects: {:?}", e);
                e
            })?;
        self.paging.total = page.total();
        self.subjects = page.value;
        Ok(())
    }

    /// Refetches when the subjects collection was invalidated.
    pub async fn refresh_if_stale(&mut self, state: &AppState) -> Result<bool, AppError> {
        if self.subscription.take_stale() {
            self.refresh(state).await?;
            return Ok(true);
        }
        Ok(false)
    }

    /// New search text; goes back to the first page.
    pub fn set_search(&mut self, search: &str) {
        self.search = search.trim().to_string();
        self.paging.reset();
    }

    /// `Desc` is newest first. Goes back to the first page.
    pub fn set_sort(&mut self, sort: SortDirection) {
        self.sort = sort;
        self.paging.reset();
    }

    pub fn set_page(&mut self, page: u32) -> bool {
        self.paging.set_page(page)
    }

    pub fn paging(&self) -> ServerPaging {
        self.paging
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn sort(&self) -> SortDirection {
        self.sort
    }

    pub fn subjects(&self) -> &[Subject] {
        &self.subjects
    }
}

/// Quizzes of one subject, newest first.
pub struct QuizBrowser {
    subject_id: i64,
    paging: ServerPaging,
    quizzes: Vec<Quiz>,
}

impl QuizBrowser {
    pub fn new(subject_id: i64) -> Self {
        Self {
            subject_id,
            paging: ServerPaging::new(QUIZ_LIST_PAGE_SIZE),
            quizzes: Vec::new(),
        }
    }

    pub fn subject_id(&self) -> i64 {
        self.subject_id
    }

    pub fn query(&self) -> ODataQuery {
        ODataQuery::new()
            .with_count()
            .page(self.paging.page, self.paging.page_size)
            .eq("SubjectId", self.subject_id)
            .order_by("CreatedAt", SortDirection::Desc)
    }

    pub async fn refresh(&mut self, state: &AppState) -> Result<(), AppError> {
        let page = state
            .api
            .get_collection::<Quiz>("Quiz", &self.query())
            .await
            .map_err(|e| {
                tracing::error!("Failed to fetch quizzes of subject {}: {:?}", self.subject_id, e);
                e
            })?;
        self.paging.total = page.total();
        self.quizzes = page.value;
        Ok(())
    }

    pub fn set_page(&mut self, page: u32) -> bool {
        self.paging.set_page(page)
    }

    pub fn paging(&self) -> ServerPaging {
        self.paging
    }

    pub fn quizzes(&self) -> &[Quiz] {
        &self.quizzes
    }

    /// The quiz to attempt. Requires a signed-in user; otherwise the caller
    /// sends the user to login and comes back afterwards.
    pub fn start(&self, state: &AppState, index: usize) -> Result<Quiz, AppError> {
        let quiz = self
            .quizzes
            .get(index)
            .ok_or_else(|| AppError::NotFound(format!("No quiz at position {}", index + 1)))?;
        if !state.session.is_authenticated() {
            return Err(AppError::AuthError(
                "Please login to take the quiz".to_string(),
            ));
        }
        Ok(quiz.clone())
    }
}

/// Looks up one quiz by id, for opening `/quiz/{id}` directly.
pub async fn fetch_quiz(state: &AppState, quiz_id: i64) -> Result<Quiz, AppError> {
    let page = state
        .api
        .get_collection::<Quiz>("Quiz", &ODataQuery::new().eq("QuizId", quiz_id))
        .await?;
    page.value
        .into_iter()
        .find(|q| q.quiz_id == quiz_id)
        .ok_or_else(|| AppError::NotFound(format!("Quiz {} not found", quiz_id)))
}
