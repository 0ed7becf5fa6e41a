// src/routes.rs

use std::fmt;

use chrono::{DateTime, Utc};

use crate::{models::status::Role, session::SessionContext};

/// Every screen of the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Login,
    Register,
    Home,
    QuizList { subject_id: i64 },
    QuizAttempt { quiz_id: i64 },
    QuizResult { quiz_id: i64 },
    History,
    Profile,
    Dashboard,
    ManageSubjects,
    ManageQuizzes,
    ManageQuestions,
    ManageUsers,
    ManageResults,
}

/// Who may open a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Authenticated,
    Role(Role),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    Allow,
    Redirect(Route),
}

impl Route {
    pub fn access(&self) -> Access {
        match self {
            Route::Login | Route::Register | Route::Home | Route::QuizList { .. } => Access::Public,
            Route::QuizAttempt { .. } | Route::QuizResult { .. } | Route::History | Route::Profile => {
                Access::Authenticated
            }
            Route::Dashboard
            | Route::ManageSubjects
            | Route::ManageQuizzes
            | Route::ManageQuestions
            | Route::ManageUsers
            | Route::ManageResults => Access::Role(Role::Teacher),
        }
    }

    /// Parses a path such as `/quiz/7` or `/dashboard/users`.
    pub fn parse(path: &str) -> Option<Self> {
        let segments: Vec<&str> = path
            .trim()
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        match segments.as_slice() {
            [] | ["home"] => Some(Route::Home),
            ["login"] => Some(Route::Login),
            ["register"] => Some(Route::Register),
            ["history"] => Some(Route::History),
            ["profile"] => Some(Route::Profile),
            ["subject", raw] => parse_id(raw).map(|subject_id| Route::QuizList { subject_id }),
            ["quiz", raw] => parse_id(raw).map(|quiz_id| Route::QuizAttempt { quiz_id }),
            ["quiz", raw, "result"] => parse_id(raw).map(|quiz_id| Route::QuizResult { quiz_id }),
            ["dashboard"] => Some(Route::Dashboard),
            ["dashboard", "subjects"] => Some(Route::ManageSubjects),
            ["dashboard", "quizzes"] => Some(Route::ManageQuizzes),
            ["dashboard", "questions"] => Some(Route::ManageQuestions),
            ["dashboard", "users"] => Some(Route::ManageUsers),
            ["dashboard", "results"] => Some(Route::ManageResults),
            _ => None,
        }
    }
}

fn parse_id(raw: &str) -> Option<i64> {
    raw.parse().ok()
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Login => write!(f, "/login"),
            Route::Register => write!(f, "/register"),
            Route::Home => write!(f, "/home"),
            Route::QuizList { subject_id } => write!(f, "/subject/{}", subject_id),
            Route::QuizAttempt { quiz_id } => write!(f, "/quiz/{}", quiz_id),
            Route::QuizResult { quiz_id } => write!(f, "/quiz/{}/result", quiz_id),
            Route::History => write!(f, "/history"),
            Route::Profile => write!(f, "/profile"),
            Route::Dashboard => write!(f, "/dashboard"),
            Route::ManageSubjects => write!(f, "/dashboard/subjects"),
            Route::ManageQuizzes => write!(f, "/dashboard/quizzes"),
            Route::ManageQuestions => write!(f, "/dashboard/questions"),
            Route::ManageUsers => write!(f, "/dashboard/users"),
            Route::ManageResults => write!(f, "/dashboard/results"),
        }
    }
}

/// Decides whether navigation to `route` may proceed.
///
/// * No session, or a session whose token has expired: redirect to login.
/// * Wrong role: redirect to home.
pub fn guard(route: Route, session: &SessionContext, now: DateTime<Utc>) -> Guard {
    let access = route.access();
    if access == Access::Public {
        return Guard::Allow;
    }

    let current = match session.current() {
        Some(s) if !s.is_expired_at(now) => s,
        Some(_) => {
            tracing::info!("Token expired, redirecting {} to login", route);
            return Guard::Redirect(Route::Login);
        }
        None => return Guard::Redirect(Route::Login),
    };

    match access {
        Access::Role(required) if current.role != required => {
            tracing::info!(
                "User {} ({}) denied {}",
                current.user_id,
                current.role,
                route
            );
            Guard::Redirect(Route::Home)
        }
        _ => Guard::Allow,
    }
}
