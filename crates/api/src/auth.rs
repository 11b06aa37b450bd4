//! Bearer-token authentication for REST and WebSocket callers

use crate::error::ApiError;
use crate::server::AppState;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tasklane_common::UserId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Authenticated user, canonical string form
    pub sub: UserId,
    /// Expiry, seconds since the epoch
    pub exp: usize,
}

/// The authenticated principal. Extraction fails with 401 when the token is
/// absent, expired, or signed with the wrong key.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub UserId);

/// Pull the raw token from `Authorization: Bearer ...` or, for WebSocket
/// handshakes where headers are awkward, from a `token` query parameter.
fn raw_token(parts: &Parts) -> Option<String> {
    if let Some(value) = parts.headers.get(axum::http::header::AUTHORIZATION) {
        if let Ok(value) = value.to_str() {
            if let Some(token) = value.strip_prefix("Bearer ") {
                return Some(token.trim().to_string());
            }
        }
    }

    parts.uri.query().and_then(|query| {
        query.split('&').find_map(|pair| {
            pair.strip_prefix("token=").map(|token| token.to_string())
        })
    })
}

pub fn verify_token(token: &str, signing_key: &str) -> Result<Claims, ApiError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(signing_key.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| ApiError::unauthorized(format!("invalid bearer token: {e}")))?;
    Ok(data.claims)
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token =
            raw_token(parts).ok_or_else(|| ApiError::unauthorized("missing bearer token"))?;
        let claims = verify_token(&token, &state.config.jwt_signing_key)?;
        Ok(AuthUser(claims.sub))
    }
}
