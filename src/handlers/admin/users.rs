// src/handlers/admin/users.rs

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
        status::{EntityStatus, Role},
        user::{RegisterRequest, User, UserUpdate},
    },
    state::AppState,
};

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub username: String,
    pub full_name: String,
    pub role: Option<Role>,
    pub status: Option<EntityStatus>,
}

impl RowFilter<User> for UserFilter {
    fn matches(&self, u: &User) -> bool {
        contains_ci(&u.username, &self.username)
            && contains_ci(&u.full_name, &self.full_name)
            && self.role.is_none_or(|r| u.role == r)
            && self.status.is_none_or(|s| u.status == s)
    }
}

pub struct UserManager {
    table: ClientTable<User, UserFilter>,
}

impl UserManager {
    pub fn new(state: &AppState) -> Self {
        Self {
            table: ClientTable::new(
                UserFilter::default(),
                MANAGEMENT_PAGE_SIZE,
                state.bus.subscribe(Collection::Users),
            ),
        }
    }

    pub fn table(&self) -> &ClientTable<User, UserFilter> {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut ClientTable<User, UserFilter> {
        &mut self.table
    }

    pub async fn refresh(&mut self, state: &AppState) -> Result<(), AppError> {
        require_teacher(state)?;
        let page = state
            .api
            .get_collection::<User>("User", &ODataQuery::new())
            .await
            .map_err(|e| {
                tracing::error!("Failed to fetch users: {:?}", e);
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

    /// Accounts are created through the public registration endpoint.
    pub async fn create(&self, state: &AppState, payload: RegisterRequest) -> Result<(), AppError> {
        require_teacher(state)?;
        crate::handlers::auth::register(state, payload).await
    }

    pub async fn update(&self, state: &AppState, user_id: i64, payload: UserUpdate) -> Result<(), AppError> {
        require_teacher(state)?;
        if let Err(validation_errors) = payload.validate() {
            return Err(AppError::BadRequest(validation_errors.to_string()));
        }
        let url = state.api.api_url(&format!("User/{}", user_id), &[])?;
        state
            .api
            .put(url, &payload.sanitized(), Collection::Users)
            .await
            .map_err(|e| {
                tracing::error!("Failed to update user {}: {:?}", user_id, e);
                e
            })
    }

    pub async fn deactivate(&self, state: &AppState, user_id: i64) -> Result<(), AppError> {
        let user = self
            .table
            .find(|u| u.user_id == user_id)
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;
        let payload = UserUpdate {
            status: EntityStatus::Inactive,
            ..user.to_update()
        };
        self.update(state, user_id, payload).await
    }
}
