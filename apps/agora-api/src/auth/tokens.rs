//! HS256 access-token validation.
//!
//! Token issuance lives with the identity service; this API only validates.
//! The mint helper exists for operator tooling and test setups that need a
//! token signed with the same shared secret.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Access-token TTL in seconds applied by `mint_access_token`.
pub const ACCESS_TOKEN_TTL_SECS: i64 = 3600;

/// Claims carried by an access token.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject: the user's prefixed ULID.
    pub sub: String,
    /// Expiration (unix timestamp).
    pub exp: i64,
    /// Issued-at (unix timestamp).
    pub iat: i64,
}

/// Validate a token and return its claims. Expired or malformed tokens are
/// rejected.
pub fn decode_access_token(secret: &str, token: &str) -> Result<AccessClaims, ApiError> {
    let validation = Validation::new(Algorithm::HS256);
    jsonwebtoken::decode::<AccessClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|_| ApiError::unauthorized("Invalid or expired token"))
}

/// Mint a signed access token for a user.
pub fn mint_access_token(secret: &str, user_id: &str) -> Result<String, ApiError> {
    let now = Utc::now();
    let claims = AccessClaims {
        sub: user_id.to_string(),
        exp: (now + Duration::seconds(ACCESS_TOKEN_TTL_SECS)).timestamp(),
        iat: now.timestamp(),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| {
        tracing::error!(?e, "failed to sign access token");
        ApiError::internal("Token signing failed")
    })
}
