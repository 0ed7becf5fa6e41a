// src/handlers/admin/mod.rs

//! Teacher dashboard and the management screens behind it.

pub mod questions;
pub mod quizzes;
pub mod results;
pub mod subjects;
pub mod users;

use crate::{error::AppError, models::status::Role, routes::Route, state::AppState};

/// One entry of the teacher dashboard.
#[derive(Debug, Clone, Copy)]
pub struct DashboardEntry {
    pub title: &'static str,
    pub collection: &'static str,
    pub route: Route,
}

pub const DASHBOARD: [DashboardEntry; 5] = [
    DashboardEntry {
        title: "User Management",
        collection: "Users",
        route: Route::ManageUsers,
    },
    DashboardEntry {
        title: "Subject Management",
        collection: "Subjects",
        route: Route::ManageSubjects,
    },
    DashboardEntry {
        title: "Quiz Management",
        collection: "Quizzes",
        route: Route::ManageQuizzes,
    },
    DashboardEntry {
        title: "Question Management",
        collection: "Questions",
        route: Route::ManageQuestions,
    },
    DashboardEntry {
        title: "Result Management",
        collection: "Results",
        route: Route::ManageResults,
    },
];

/// Management operations are teacher only.
/// The backend enforces this too; the check saves a round trip.
pub fn require_teacher(state: &AppState) -> Result<(), AppError> {
    match state.session.role() {
        Some(Role::Teacher) => Ok(()),
        Some(_) => Err(AppError::Forbidden("Teacher access required".to_string())),
        None => Err(AppError::AuthError("Please login to continue".to_string())),
    }
}
