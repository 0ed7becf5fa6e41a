// src/handlers/auth.rs

use validator::Validate;

use crate::{
    api::Collection,
    error::AppError,
    models::user::{LoginRequest, LoginResponse, RegisterRequest},
    session::Session,
    state::AppState,
};

/// Registers a new account (`POST api/User/register`).
///
/// Validates locally first; the backend reports duplicates as 400/409 with a
/// message that is passed through unchanged.
pub async fn register(state: &AppState, payload: RegisterRequest) -> Result<(), AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    let payload = payload.sanitized();

    let url = state.api.api_url("User/register", &[])?;
    state
        .api
        .post(url, &payload, Collection::Users)
        .await
        .map_err(|e| {
            tracing::error!("Failed to register user {}: {:?}", payload.username, e);
            e
        })?;

    tracing::info!("Registered user {}", payload.username);
    Ok(())
}

/// Authenticates and creates the session.
pub async fn login(state: &AppState, payload: LoginRequest) -> Result<Session, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let url = state.api.api_url("User/login", &[])?;
    let response: LoginResponse = state
        .api
        .post_json(url, &payload, None)
        .await
        .map_err(|e| match e {
            AppError::AuthError(_) | AppError::BadRequest(_) | AppError::NotFound(_) => {
                AppError::AuthError("Invalid username or password".to_string())
            }
            other => {
                tracing::error!("Login request failed: {:?}", other);
                other
            }
        })?;

    let session = Session::from_login(response);
    state.session.establish(session.clone()).await?;
    Ok(session)
}

/// Destroys the session. Attempt deadlines are kept so an unfinished
/// attempt resumes after signing in again.
pub async fn logout(state: &AppState) -> Result<(), AppError> {
    state.session.destroy().await
}
