//! Bearer-token authentication.
//!
//! Tokens are HS256 JWTs carrying the user id. The user is looked up on
//! every request so that deleted users and role changes take effect
//! immediately.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AppState;
use crate::domain::aggregates::Role;
use crate::error::AppError;
use crate::services::Caller;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub exp: usize,
}

/// Signs a token for `user_id`. Login lives elsewhere; this is for tests and
/// local tooling.
pub fn issue_token(secret: &str, user_id: Uuid, role: Role, ttl: Duration) -> Result<String, jsonwebtoken::errors::Error> {
    let exp = (Utc::now() + ttl).timestamp().max(0) as usize;
    encode(&Header::new(Algorithm::HS256), &Claims { sub: user_id, role, exp }, &EncodingKey::from_secret(secret.as_bytes()))
}

#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Caller);

impl AuthUser {
    /// Fails with 403 unless the user has one of `roles`.
    pub fn require(self, roles: &[Role]) -> Result<Caller, AppError> {
        if roles.contains(&self.0.role) {
            Ok(self.0)
        } else {
            Err(AppError::Forbidden)
        }
    }
}

fn bearer(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    value.strip_prefix("Bearer ").map(str::trim).filter(|t| !t.is_empty())
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer(parts).ok_or(AppError::Unauthorized)?;
        let key = DecodingKey::from_secret(state.config.jwt_secret.as_bytes());
        let claims = decode::<Claims>(token, &key, &Validation::new(Algorithm::HS256))
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AppError::InvalidToken("Your token has expired. Please login again.".into()),
                _ => AppError::InvalidToken("Invalid token. Please login again.".into()),
            })?
            .claims;

        let user = state
            .store
            .get_user(claims.sub)
            .await?
            .ok_or_else(|| AppError::InvalidToken("The user that belongs to this token no longer exists.".into()))?;
        Ok(Self(Caller { id: user.id, role: user.role }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-that-is-long-enough-for-hs256";

    #[test]
    fn issued_token_decodes() {
        let id = Uuid::now_v7();
        let token = issue_token(SECRET, id, Role::Admin, Duration::hours(1)).unwrap();
        let data = decode::<Claims>(&token, &DecodingKey::from_secret(SECRET.as_bytes()), &Validation::new(Algorithm::HS256)).unwrap();
        assert_eq!(data.claims.sub, id);
        assert_eq!(data.claims.role, Role::Admin);
    }

    #[test]
    fn role_gate() {
        let user = AuthUser(Caller { id: Uuid::now_v7(), role: Role::User });
        assert!(user.require(&[Role::User, Role::Admin]).is_ok());
        assert!(matches!(user.require(&[Role::Admin]), Err(AppError::Forbidden)));
    }
}
