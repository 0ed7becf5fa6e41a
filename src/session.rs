// src/session.rs

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, TimeZone, Utc};
use sqlx::{FromRow, SqlitePool};

use crate::{
    error::AppError,
    models::{status::Role, user::LoginResponse},
    utils::jwt::inspect_token,
};

/// The signed-in user as seen by the client.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub token: String,
    pub user_id: i64,
    pub full_name: String,
    pub role: Role,
    /// `exp` claim of the token, when it has one.
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Builds a session from a login response.
    /// Role precedence: explicit `user.role`, then the token's role claim, then student.
    pub fn from_login(resp: LoginResponse) -> Self {
        let claims = match inspect_token(&resp.token) {
            Ok(claims) => Some(claims),
            Err(e) => {
                tracing::warn!("Could not read token claims: {}", e);
                None
            }
        };

        let role = resp
            .user
            .role
            .or_else(|| claims.as_ref().and_then(|c| c.role()))
            .unwrap_or_default();

        let expires_at = claims
            .as_ref()
            .and_then(|c| c.exp)
            .and_then(|exp| i64::try_from(exp).ok())
            .and_then(|exp| Utc.timestamp_opt(exp, 0).single());

        Self {
            token: resp.token,
            user_id: resp.user.user_id,
            full_name: resp.user.full_name,
            role,
            expires_at,
            created_at: Utc::now(),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

#[derive(Debug, FromRow)]
struct SessionRow {
    token: String,
    user_id: i64,
    full_name: String,
    role: String,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

/// Explicit session context. Created at login, destroyed at logout or when
/// the backend answers 401; everything else only reads it.
///
/// Clones share the same session.
#[derive(Debug, Clone)]
pub struct SessionContext {
    current: Arc<RwLock<Option<Session>>>,
    pool: SqlitePool,
}

impl SessionContext {
    /// Loads the persisted session, if any.
    pub async fn restore(pool: SqlitePool) -> Result<Self, AppError> {
        let row: Option<SessionRow> = sqlx::query_as(
            "SELECT token, user_id, full_name, role, expires_at, created_at FROM session_state WHERE id = 1",
        )
        .fetch_optional(&pool)
        .await?;

        let session = row.map(|r| Session {
            token: r.token,
            user_id: r.user_id,
            full_name: r.full_name,
            role: Role::parse(&r.role).unwrap_or_default(),
            expires_at: r.expires_at,
            created_at: r.created_at,
        });

        if let Some(s) = &session {
            tracing::info!("Restored session for user {}", s.user_id);
        }

        Ok(Self {
            current: Arc::new(RwLock::new(session)),
            pool,
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<Session>> {
        self.current.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<Session>> {
        self.current.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn current(&self) -> Option<Session> {
        self.read().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.read().as_ref().map(|s| s.token.clone())
    }

    pub fn user_id(&self) -> Option<i64> {
        self.read().as_ref().map(|s| s.user_id)
    }

    pub fn role(&self) -> Option<Role> {
        self.read().as_ref().map(|s| s.role)
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().is_some()
    }

    /// Replaces any existing session and persists it.
    pub async fn establish(&self, session: Session) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO session_state (id, token, user_id, full_name, role, expires_at, created_at)
            VALUES (1, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                token = excluded.token,
                user_id = excluded.user_id,
                full_name = excluded.full_name,
                role = excluded.role,
                expires_at = excluded.expires_at,
                created_at = excluded.created_at
            "#,
        )
        .bind(&session.token)
        .bind(session.user_id)
        .bind(&session.full_name)
        .bind(session.role.as_str())
        .bind(session.expires_at)
        .bind(session.created_at)
        .execute(&self.pool)
        .await?;

        tracing::info!("Session established for user {} ({})", session.user_id, session.role);
        *self.write() = Some(session);
        Ok(())
    }

    /// Clears the in-memory session first, so a failing store still logs the user out.
    pub async fn destroy(&self) -> Result<(), AppError> {
        let previous = self.write().take();
        sqlx::query("DELETE FROM session_state WHERE id = 1")
            .execute(&self.pool)
            .await?;
        if let Some(s) = previous {
            tracing::info!("Session destroyed for user {}", s.user_id);
        }
        Ok(())
    }

    /// Keeps the header name in sync after a profile edit.
    pub async fn update_display_name(&self, full_name: &str) -> Result<(), AppError> {
        if !self.is_authenticated() {
            return Err(AppError::AuthError("No active session".to_string()));
        }
        sqlx::query("UPDATE session_state SET full_name = ? WHERE id = 1")
            .bind(full_name)
            .execute(&self.pool)
            .await?;
        if let Some(s) = self.write().as_mut() {
            s.full_name = full_name.to_string();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Config, models::user::LoginUser, store};
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::json;

    async fn context() -> SessionContext {
        let pool = store::connect(&Config::for_base_url("http://unused")).await.unwrap();
        SessionContext::restore(pool).await.unwrap()
    }

    fn login(role: Option<Role>, claims: serde_json::Value) -> LoginResponse {
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(b"k")).unwrap();
        LoginResponse {
            token,
            user: LoginUser {
                user_id: 5,
                full_name: "Bo Student".into(),
                role,
            },
        }
    }

    #[test]
    fn test_role_falls_back_to_token_claim() {
        let session = Session::from_login(login(None, json!({ "role": "teacher", "exp": 10 })));
        assert_eq!(session.role, Role::Teacher);
        assert!(session.is_expired_at(Utc.timestamp_opt(11, 0).unwrap()));

        let explicit = Session::from_login(login(Some(Role::Student), json!({ "role": "teacher" })));
        assert_eq!(explicit.role, Role::Student);
        assert!(explicit.expires_at.is_none());
    }

    #[tokio::test]
    async fn test_session_survives_restore() {
        let ctx = context().await;
        let session = Session::from_login(login(None, json!({})));
        ctx.establish(session).await.unwrap();

        let reloaded = SessionContext::restore(ctx.pool.clone()).await.unwrap();
        let restored = reloaded.current().unwrap();
        assert_eq!(restored.user_id, 5);
        assert_eq!(restored.role, Role::Student);
    }

    #[tokio::test]
    async fn test_destroy_and_rename() {
        let ctx = context().await;
        assert!(ctx.update_display_name("x").await.is_err());

        ctx.establish(Session::from_login(login(None, json!({})))).await.unwrap();
        ctx.update_display_name("Bo S.").await.unwrap();
        assert_eq!(ctx.current().unwrap().full_name, "Bo S.");

        ctx.destroy().await.unwrap();
        assert!(!ctx.is_authenticated());
        assert!(SessionContext::restore(ctx.pool.clone()).await.unwrap().current().is_none());
    }
}
