//! Admission gate.
//!
//! Runs the pre-upgrade half of a connection: credential, room identifier and
//! room access. Nothing here touches the socket, so every rejection is a plain
//! HTTP response and no channel byte is ever sent.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use murmur_core::{AuthError, Identity, RoomAuthorizer, RoomId, SessionBinding, TokenParser};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::metrics;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Authenticating,
    Authorizing,
    Upgrading,
    Streaming,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Authenticating => "authenticating",
            Self::Authorizing => "authorizing",
            Self::Upgrading => "upgrading",
            Self::Streaming => "streaming",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Reasons a connection is refused before streaming starts.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Missing bearer credential")]
    MissingCredential,

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Invalid room identifier: {0}")]
    InvalidRoomIdentifier(String),

    #[error("Access denied")]
    AccessDenied,

    #[error("Origin not allowed: {0}")]
    OriginNotAllowed(String),

    #[error("Upgrade failed: {0}")]
    UpgradeFailure(String),
}

impl GatewayError {
    /// HTTP status for this rejection.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingCredential | Self::InvalidCredential(_) | Self::InvalidRoomIdentifier(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::AccessDenied | Self::OriginNotAllowed(_) => StatusCode::FORBIDDEN,
            Self::UpgradeFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// State the connection was in when it was refused.
    #[must_use]
    pub fn state(&self) -> SessionState {
        match self {
            Self::MissingCredential | Self::InvalidCredential(_) => SessionState::Authenticating,
            Self::InvalidRoomIdentifier(_) | Self::AccessDenied => SessionState::Authorizing,
            Self::OriginNotAllowed(_) | Self::UpgradeFailure(_) => SessionState::Upgrading,
        }
    }

    /// Metric label for this rejection.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingCredential => "missing_credential",
            Self::InvalidCredential(_) => "invalid_credential",
            Self::InvalidRoomIdentifier(_) => "invalid_room",
            Self::AccessDenied => "access_denied",
            Self::OriginNotAllowed(_) => "origin_not_allowed",
            Self::UpgradeFailure(_) => "upgrade_failure",
        }
    }
}

impl From<AuthError> for GatewayError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingCredential => Self::MissingCredential,
            AuthError::InvalidCredential(reason) => Self::InvalidCredential(reason),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        metrics::record_rejection(self.reason());
        debug!(
            reason = self.reason(),
            state = %self.state(),
            error = %self,
            "Connection refused"
        );

        // Denials carry no detail so callers cannot probe which rooms exist
        let body = match &self {
            Self::AccessDenied => "Forbidden".to_string(),
            Self::UpgradeFailure(_) => "Upgrade failed".to_string(),
            other => other.to_string(),
        };
        (self.status(), body).into_response()
    }
}

/// A caller cleared to open a channel.
#[derive(Debug, Clone)]
pub struct Admission {
    pub identity: Identity,
    pub binding: SessionBinding,
}

/// Authenticates callers and checks room access.
#[derive(Clone)]
pub struct Gateway {
    token_parser: Arc<dyn TokenParser>,
    authorizer: Arc<dyn RoomAuthorizer>,
}

impl Gateway {
    /// Create a gateway from its collaborators.
    #[must_use]
    pub fn new(token_parser: Arc<dyn TokenParser>, authorizer: Arc<dyn RoomAuthorizer>) -> Self {
        Self {
            token_parser,
            authorizer,
        }
    }

    /// Run authentication and authorization for one upgrade request.
    ///
    /// `authorization` is the raw `Authorization` header value and `room` the
    /// unparsed path segment.
    ///
    /// # Errors
    ///
    /// Returns the first check that failed, in this order: credential present,
    /// credential valid, room identifier valid, access granted.
    pub async fn admit(
        &self,
        authorization: Option<&str>,
        room: &str,
    ) -> Result<Admission, GatewayError> {
        debug!(state = %SessionState::Authenticating, "Admission started");

        let token = self.token_parser.token_from_header(authorization)?;
        let identity = self.token_parser.parse(token).await?;

        debug!(state = %SessionState::Authorizing, user = %identity.user, "Authenticated");

        let room: RoomId = room
            .parse()
            .map_err(|e: murmur_core::IdError| GatewayError::InvalidRoomIdentifier(e.to_string()))?;

        if !self.authorizer.authorize(&identity.user, &room).await {
            info!(user = %identity.user, room = %room, "Room access denied");
            return Err(GatewayError::AccessDenied);
        }

        Ok(Admission {
            binding: SessionBinding::new(room, identity.user),
            identity,
        })
    }
}
