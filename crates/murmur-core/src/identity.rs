//! Caller identity and the authentication/authorization ports.
//!
//! Token verification and the room access policy live outside the gateway.
//! The gateway only consumes their results through [`TokenParser`] and
//! [`RoomAuthorizer`].

use async_trait::async_trait;
use murmur_protocol::DeviceId;
use thiserror::Error;

use crate::ids::{RoomId, UserId};

/// Authentication errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No usable bearer credential in the request.
    #[error("Missing bearer credential")]
    MissingCredential,

    /// The credential was present but could not be verified.
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),
}

impl AuthError {
    /// Create an invalid credential error.
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidCredential(reason.into())
    }
}

/// The verified caller behind a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Authenticated user.
    pub user: UserId,
    /// Device the credential was issued to.
    pub device: DeviceId,
}

impl Identity {
    /// Create a new identity.
    #[must_use]
    pub fn new(user: UserId, device: impl Into<DeviceId>) -> Self {
        Self {
            user,
            device: device.into(),
        }
    }
}

/// Extract the token from an `Authorization` header value.
///
/// Accepts `Bearer <token>` with a case-insensitive scheme.
///
/// # Errors
///
/// Returns [`AuthError::MissingCredential`] if the header is absent, uses a
/// different scheme, or carries an empty token.
pub fn extract_bearer(authorization: Option<&str>) -> Result<&str, AuthError> {
    let value = authorization.ok_or(AuthError::MissingCredential)?;
    let (scheme, token) = value
        .trim()
        .split_once(' ')
        .ok_or(AuthError::MissingCredential)?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::MissingCredential);
    }

    let token = token.trim();
    if token.is_empty() || token.contains(char::is_whitespace) {
        return Err(AuthError::MissingCredential);
    }

    Ok(token)
}

/// Resolves bearer credentials to caller identities.
#[async_trait]
pub trait TokenParser: Send + Sync {
    /// Pull the bearer token out of an `Authorization` header value.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MissingCredential`] if no token is present.
    fn token_from_header<'a>(&self, authorization: Option<&'a str>) -> Result<&'a str, AuthError> {
        extract_bearer(authorization)
    }

    /// Verify a token and resolve it to an identity.
    ///
    /// Dropping the returned future cancels the verification.
    async fn parse(&self, token: &str) -> Result<Identity, AuthError>;
}

/// Decides whether a user may join a room.
///
/// Implementations must return `false` both when the room does not exist and
/// when the user lacks access; callers never learn which.
#[async_trait]
pub trait RoomAuthorizer: Send + Sync {
    /// Check room access.
    async fn authorize(&self, user: &UserId, room: &RoomId) -> bool;
}
