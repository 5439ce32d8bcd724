//! JWT-backed token parser.
//!
//! Tokens are HS256 JWTs issued elsewhere. The gateway only verifies them:
//! `sub` is the user UUID and `device_id` the device the token was issued to.

use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use murmur_core::{AuthError, Identity, TokenParser, UserId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AuthConfig;

/// Claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User UUID.
    pub sub: String,
    /// Device the token was issued to.
    pub device_id: String,
    /// Expiry, seconds since the Unix epoch.
    pub exp: u64,
}

/// Verifies HS256 access tokens.
pub struct JwtTokenParser {
    key: DecodingKey,
    validation: Validation,
}

impl JwtTokenParser {
    /// Create a parser for tokens signed with `secret`.
    #[must_use]
    pub fn new(secret: &[u8], leeway_secs: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = leeway_secs;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Create a parser from configuration.
    #[must_use]
    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.jwt_secret.as_bytes(), config.leeway_secs)
    }
}

#[async_trait]
impl TokenParser for JwtTokenParser {
    async fn parse(&self, token: &str) -> Result<Identity, AuthError> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            debug!(error = %e, "Token rejected");
            AuthError::invalid(e.to_string())
        })?;

        let user: UserId = data
            .claims
            .sub
            .parse()
            .map_err(|e: murmur_core::IdError| AuthError::invalid(e.to_string()))?;

        if data.claims.device_id.is_empty() {
            return Err(AuthError::invalid("token has no device_id"));
        }

        Ok(Identity::new(user, data.claims.device_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use std::time::{SystemTime, UNIX_EPOCH};

    const SECRET: &[u8] = b"test-secret";

    fn now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    fn token(sub: &str, device: &str, exp: u64, secret: &[u8]) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            device_id: device.to_string(),
            exp,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret)).unwrap()
    }

    #[tokio::test]
    async fn test_valid_token() {
        let parser = JwtTokenParser::new(SECRET, 0);
        let user = UserId::generate();

        let identity = parser
            .parse(&token(&user.to_string(), "d1", now() + 60, SECRET))
            .await
            .unwrap();

        assert_eq!(identity.user, user);
        assert_eq!(identity.device.as_str(), "d1");
    }

    #[tokio::test]
    async fn test_expired_token() {
        let parser = JwtTokenParser::new(SECRET, 0);
        let user = UserId::generate().to_string();

        let result = parser.parse(&token(&user, "d1", now() - 120, SECRET)).await;
        assert!(matches!(result, Err(AuthError::InvalidCredential(_))));
    }

    #[tokio::test]
    async fn test_wrong_signature() {
        let parser = JwtTokenParser::new(SECRET, 0);
        let user = UserId::generate().to_string();

        let result = parser
            .parse(&token(&user, "d1", now() + 60, b"other-secret"))
            .await;
        assert!(matches!(result, Err(AuthError::InvalidCredential(_))));
    }

    #[tokio::test]
    async fn test_malformed_claims() {
        let parser = JwtTokenParser::new(SECRET, 0);

        let not_a_uuid = token("alice", "d1", now() + 60, SECRET);
        assert!(parser.parse(&not_a_uuid).await.is_err());

        let no_device = token(&UserId::generate().to_string(), "", now() + 60, SECRET);
        assert!(parser.parse(&no_device).await.is_err());

        assert!(parser.parse("not.a.jwt").await.is_err());
    }
}
