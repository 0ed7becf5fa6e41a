// src/handlers/profile.rs

use validator::Validate;

use crate::{
    api::Collection,
    error::AppError,
    models::user::{User, UserUpdate},
    state::AppState,
};

fn current_user_id(state: &AppState) -> Result<i64, AppError> {
    state
        .session
        .user_id()
        .ok_or_else(|| AppError::AuthError("Please login to view your profile".to_string()))
}

/// Get the signed-in user's profile (`GET api/User/{id}`).
pub async fn get_profile(state: &AppState) -> Result<User, AppError> {
    let user_id = current_user_id(state)?;
    let url = state.api.api_url(&format!("User/{}", user_id), &[])?;
    state.api.get_json(url).await
}

/// Updates name and email. Role and status are sent unchanged from the
/// session. The session's display name follows the saved value.
pub async fn update_profile(
    state: &AppState,
    full_name: &str,
    email: &str,
) -> Result<User, AppError> {
    let user_id = current_user_id(state)?;
    let role = state.session.role().unwrap_or_default();

    let payload = UserUpdate {
        username: None,
        full_name: full_name.to_string(),
        email: email.to_string(),
        role,
        status: Default::default(),
    };
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    let payload = payload.sanitized();

    let url = state.api.api_url(&format!("User/{}", user_id), &[])?;
    let updated: User = state
        .api
        .put_json(url, &payload, Collection::Users)
        .await
        .map_err(|e| {
            tracing::error!("Failed to update profile of user {}: {:?}", user_id, e);
            e
        })?;

    state.session.update_display_name(&updated.full_name).await?;
    Ok(updated)
}
