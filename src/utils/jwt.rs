// src/utils/jwt.rs

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;

use crate::{error::AppError, models::status::Role};

/// Claims the client reads from the bearer token.
///
/// The backend issues the token and is the only party that verifies it, so
/// every claim is optional and the signature is not checked here.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Claims {
    /// Subject - the user id, when the issuer sets it.
    #[serde(
        default,
        alias = "nameid",
        alias = "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/nameidentifier"
    )]
    pub sub: Option<String>,

    #[serde(
        default,
        alias = "http://schemas.microsoft.com/ws/2008/06/identity/claims/role"
    )]
    pub role: Option<String>,

    /// Expiration time as Unix timestamp.
    #[serde(default)]
    pub exp: Option<u64>,
}

impl Claims {
    pub fn role(&self) -> Option<Role> {
        self.role.as_deref().and_then(Role::parse)
    }

    /// Tokens without an `exp` claim never expire on the client side.
    pub fn is_expired_at(&self, now_secs: u64) -> bool {
        self.exp.is_some_and(|exp| exp <= now_secs)
    }
}

/// Decodes the token payload without verifying its signature.
pub fn inspect_token(token: &str) -> Result<Claims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let token_data = decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map_err(|e| AppError::AuthError(format!("Invalid token: {}", e)))?;

    Ok(token_data.claims)
}
