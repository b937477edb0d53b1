//! Bearer token authentication for buyer and vendor routes

use crate::config::AuthConfig;
use crate::error::{AppError, AppErrorKind, AuthError};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::error::get_request_id_from_headers;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Account id of the caller
    pub sub: String,
    pub exp: usize,
}

/// The caller behind a verified bearer token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: String,
}

pub fn validate_token(secret: &str, token: &str) -> Result<Claims, AuthError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::InvalidToken {
            reason: "token expired".to_string(),
        },
        _ => AuthError::InvalidToken {
            reason: "token could not be verified".to_string(),
        },
    })
}

/// Sign a token for `sub` valid for `ttl_secs`
pub fn issue_token(secret: &str, sub: &str, ttl_secs: i64) -> Result<String, AuthError> {
    let exp = (chrono::Utc::now() + chrono::Duration::seconds(ttl_secs)).timestamp();
    let claims = Claims {
        sub: sub.to_string(),
        exp: exp.max(0) as usize,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AuthError::InvalidToken {
        reason: e.to_string(),
    })
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
    AuthConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = AuthConfig::from_ref(state);
        let reject = |err: AuthError| {
            let error = AppError::new(AppErrorKind::Auth(err));
            match get_request_id_from_headers(&parts.headers) {
                Some(id) => error.with_request_id(id),
                None => error,
            }
        };

        let token = bearer_token(parts).ok_or_else(|| reject(AuthError::MissingToken))?;
        let claims = validate_token(&config.jwt_secret, token).map_err(reject)?;

        Ok(AuthenticatedUser {
            user_id: claims.sub,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-at-least-16";

    #[test]
    fn test_issued_token_validates() {
        let token = issue_token(SECRET, "buyer-1", 300).unwrap();
        let claims = validate_token(SECRET, &token).unwrap();
        assert_eq!(claims.sub, "buyer-1");
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = issue_token(SECRET, "buyer-1", 300).unwrap();
        assert!(matches!(
            validate_token("another-secret-value", &token),
            Err(AuthError::InvalidToken { .. })
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = issue_token(SECRET, "buyer-1", -3600).unwrap();
        assert!(validate_token(SECRET, &token).is_err());
    }
}
