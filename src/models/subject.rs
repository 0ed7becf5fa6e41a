// src/models/subject.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    models::{status::EntityStatus, user::UserRef},
    utils::{html::clean_text, time::deserialize_optional_timestamp},
};

/// Entry of the OData `Subject` collection.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Subject {
    pub subject_id: i64,
    pub subject_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: EntityStatus,

    /// Author of the subject, expanded by the backend when available.
    #[serde(default)]
    pub created_by_user: Option<UserRef>,

    #[serde(default, deserialize_with = "deserialize_optional_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_optional_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Subject {
    pub fn author_name(&self) -> &str {
        self.created_by_user
            .as_ref()
            .map(|u| u.full_name.as_str())
            .unwrap_or("N/A")
    }

    pub fn to_form(&self) -> SubjectForm {
        SubjectForm {
            subject_name: self.subject_name.clone(),
            description: self.description.clone(),
            status: self.status,
        }
    }

    /// Body of the soft-delete request: same fields, status flipped.
    pub fn deactivated(&self) -> SubjectForm {
        SubjectForm {
            status: EntityStatus::Inactive,
            ..self.to_form()
        }
    }
}

/// DTO for creating or updating a subject.
#[derive(Debug, Clone, Default, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubjectForm {
    #[validate(length(min = 1, max = 200, message = "Subject name is required."))]
    pub subject_name: String,
    #[validate(length(max = 2000))]
    pub description: String,
    pub status: EntityStatus,
}

impl SubjectForm {
    pub fn sanitized(self) -> Self {
        Self {
            subject_name: clean_text(&self.subject_name),
            description: clean_text(&self.description),
            status: self.status,
        }
    }
}
