// src/models/user.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    models::status::{EntityStatus, Role},
    utils::{html::clean_text, time::deserialize_optional_timestamp},
};

/// Account as returned by `odata/User` (PascalCase) or `api/User/{id}` (camelCase).
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    #[serde(rename = "UserId", alias = "userId")]
    pub user_id: i64,
    #[serde(rename = "Username", alias = "username", default)]
    pub username: String,
    #[serde(rename = "FullName", alias = "fullName", default)]
    pub full_name: String,
    #[serde(rename = "Email", alias = "email", default)]
    pub email: String,
    #[serde(rename = "Role", alias = "role", default)]
    pub role: Role,
    #[serde(rename = "Status", alias = "status", default)]
    pub status: EntityStatus,
    #[serde(
        rename = "CreatedAt",
        alias = "createdAt",
        default,
        deserialize_with = "deserialize_optional_timestamp"
    )]
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn to_update(&self) -> UserUpdate {
        UserUpdate {
            username: Some(self.username.clone()),
            full_name: self.full_name.clone(),
            email: self.email.clone(),
            role: self.role,
            status: self.status,
        }
    }
}

/// Display-only reference to another user (author, teacher, student).
#[derive(Debug, Clone, Deserialize)]
pub struct UserRef {
    #[serde(rename = "FullName", alias = "fullName")]
    pub full_name: String,
}

/// DTO for user login.
#[derive(Debug, Clone, Serialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 50, message = "Username is required."))]
    pub username: String,
    #[validate(length(min = 1, max = 128, message = "Password is required."))]
    pub password: String,
}

/// DTO for registration, also used by teachers to create accounts.
#[derive(Debug, Clone, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(length(
        min = 3,
        max = 50,
        message = "Username length must be between 3 and 50 characters."
    ))]
    pub username: String,
    #[validate(length(
        min = 6,
        max = 128,
        message = "Password length must be between 6 and 128 characters."
    ))]
    pub password: String,
    #[validate(length(min = 1, max = 100, message = "Full name is required."))]
    pub full_name: String,
    #[validate(email(message = "Email is not valid."))]
    pub email: String,
}

impl RegisterRequest {
    pub fn sanitized(self) -> Self {
        Self {
            full_name: clean_text(&self.full_name),
            ..self
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    #[serde(alias = "Token")]
    pub token: String,
    #[serde(alias = "User")]
    pub user: LoginUser,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginUser {
    #[serde(rename = "userId", alias = "UserId")]
    pub user_id: i64,
    #[serde(rename = "fullName", alias = "FullName", default)]
    pub full_name: String,
    #[serde(alias = "Role", default)]
    pub role: Option<Role>,
}

/// Body of `PUT api/User/{id}`, for profile edits and management updates.
#[derive(Debug, Clone, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[validate(length(min = 1, max = 100, message = "Full name is required."))]
    pub full_name: String,
    #[validate(email(message = "Email is not valid."))]
    pub email: String,
    pub role: Role,
    pub status: EntityStatus,
}

impl UserUpdate {
    pub fn sanitized(self) -> Self {
        Self {
            full_name: clean_text(&self.full_name),
            ..self
        }
    }
}
