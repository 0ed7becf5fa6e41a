// src/handlers/admin/subjects.rs

use validator::Validate;

use crate::{
    api::{Collection, ODataQuery},
    config::MANAGEMENT_PAGE_SIZE,
    error::AppError,
    handlers::{
        admin::require_teacher,
        listing::{ClientTable, RowFilter, contains_ci},
    },
    models::{
        status::EntityStatus,
        subject::{Subject, SubjectForm},
    },
    state::AppState,
};

#[derive(Debug, Clone, Default)]
pub struct SubjectFilter {
    pub name: String,
    pub description: String,
    /// `None` shows every status.
    pub status: Option<EntityStatus>,
}

impl RowFilter<Subject> for SubjectFilter {
    fn matches(&self, s: &Subject) -> bool {
        contains_ci(&s.subject_name, &self.name)
            && contains_ci(&s.description, &self.description)
            && self.status.is_none_or(|status| s.status == status)
    }
}

pub struct SubjectManager {
    table: ClientTable<Subject, SubjectFilter>,
}

impl SubjectManager {
    pub fn new(state: &AppState) -> Self {
        Self {
            table: ClientTable::new(
                SubjectFilter::default(),
                MANAGEMENT_PAGE_SIZE,
                state.bus.subscribe(Collection::Subjects),
            ),
        }
    }

    pub fn table(&self) -> &ClientTable<Subject, SubjectFilter> {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut ClientTable<Subject, SubjectFilter> {
        &mut self.table
    }

    /// Loads every subject, active or not.
    pub async fn refresh(&mut self, state: &AppState) -> Result<(), AppError> {
        require_teacher(state)?;
        let page = state
            .api
            .get_collection::<Subject>("Subject", &ODataQuery::new())
            .await
            .map_err(|e| {
                tracing::error!("Failed to fetch subjects: {:?}", e);
                e
            })?;
        self.table.set_rows(page.value);
        Ok(())
    }

    pub async fn refresh_if_stale(&mut self, state: &AppState) -> Result<bool, AppError> {
        if self.table.is_stale() {
            self.refresh(state).await?;
            return Ok(true);
        }
        Ok(false)
    }

    pub async fn create(&self, state: &AppState, form: SubjectForm) -> Result<(), AppError> {
        require_teacher(state)?;
        if let Err(validation_errors) = form.validate() {
            return Err(AppError::BadRequest(validation_errors.to_string()));
        }
        let url = state.api.api_url("Subject", &[])?;
        state
            .api
            .post(url, &form.sanitized(), Collection::Subjects)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create subject: {:?}", e);
                e
            })
    }

    pub async fn update(
        &self,
        state: &AppState,
        subject_id: i64,
        form: SubjectForm,
    ) -> Result<(), AppError> {
        require_teacher(state)?;
        if let Err(validation_errors) = form.validate() {
            return Err(AppError::BadRequest(validation_errors.to_string()));
        }
        let url = state
            .api
            .api_url("Subject", &[("subjectId", subject_id.to_string())])?;
        state
            .api
            .put(url, &form.sanitized(), Collection::Subjects)
            .await
            .map_err(|e| {
                tracing::error!("Failed to update subject {}: {:?}", subject_id, e);
                e
            })
    }

    /// Soft delete: the same record with status `inactive`.
    pub async fn deactivate(&self, state: &AppState, subject_id: i64) -> Result<(), AppError> {
        let subject = self
            .table
            .find(|s| s.subject_id == subject_id)
            .ok_or_else(|| AppError::NotFound(format!("Subject {} not found", subject_id)))?;
        self.update(state, subject_id, subject.deactivated()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject(name: &str, description: &str, status: EntityStatus) -> Subject {
        Subject {
            subject_id: 1,
            subject_name: name.into(),
            description: description.into(),
            status,
            created_by_user: None,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn test_filter_combines_fields() {
        let filter = SubjectFilter {
            name: "phys".into(),
            description: String::new(),
            status: Some(EntityStatus::Active),
        };
        assert!(filter.matches(&subject("Physics", "", EntityStatus::Active)));
        assert!(!filter.matches(&subject("Physics", "", EntityStatus::Inactive)));
        assert!(!filter.matches(&subject("Chemistry", "", EntityStatus::Active)));
    }
}
