//! Bearer-token extraction for REST handlers.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use crate::auth::tokens;
use crate::error::ApiError;
use crate::AppState;

/// Authenticated user extracted from the `Authorization: Bearer <token>`
/// header. Rejections share the REST error body, so an expired token looks
/// the same whether it fails here or deeper in a handler.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("Missing Authorization header"))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::unauthorized("Invalid Authorization header format"))?;

        let claims = tokens::decode_access_token(&state.config.token_secret, token)?;

        Ok(AuthUser {
            user_id: claims.sub,
        })
    }
}
