//! Session management: JWT bearer tokens

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

/// JWT claims for access tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id as string
    pub exp: i64,    // expiry timestamp
    pub iat: i64,    // issued at
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    Expired,
}

/// Create a JWT access token valid for `ttl`
pub fn create_access_token(
    user_id: i64,
    secret: &[u8],
    ttl: Duration,
) -> Result<String, SessionError> {
    let now = Utc::now();
    let exp = now + ttl;

    let claims = Claims {
        sub: user_id.to_string(),
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|_| SessionError::InvalidToken)
}

/// Validate a JWT access token and return the user_id
pub fn validate_access_token(token: &str, secret: &[u8]) -> Result<i64, SessionError> {
    // HS256 only, so a token cannot pick its own algorithm
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_required_spec_claims(&["exp", "sub", "iat"]);
    validation.leeway = 0;

    let token_data = decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)
        .map_err(|e| {
            tracing::debug!(error = ?e, "JWT decode error");
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => SessionError::Expired,
                _ => SessionError::InvalidToken,
            }
        })?;

    token_data
        .claims
        .sub
        .parse::<i64>()
        .map_err(|_| SessionError::InvalidToken)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-secret";

    #[test]
    fn test_token_round_trip() {
        let token = create_access_token(42, SECRET, Duration::minutes(5)).unwrap();
        assert_eq!(validate_access_token(&token, SECRET), Ok(42));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = create_access_token(42, SECRET, Duration::minutes(5)).unwrap();
        assert_eq!(
            validate_access_token(&token, b"other-secret"),
            Err(SessionError::InvalidToken)
        );
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = create_access_token(42, SECRET, Duration::minutes(-5)).unwrap();
        assert_eq!(
            validate_access_token(&token, SECRET),
            Err(SessionError::Expired)
        );
    }

    #[test]
    fn test_garbage_token_rejected() {
        assert_eq!(
            validate_access_token("not.a.jwt", SECRET),
            Err(SessionError::InvalidToken)
        );
    }
}
