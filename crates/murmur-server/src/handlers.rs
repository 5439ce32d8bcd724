//! HTTP handlers for the Murmur server.
//!
//! This module wires the admission gate, the WebSocket upgrade and the session
//! loop into an axum router.

use crate::access;
use crate::auth::JwtTokenParser;
use crate::bus;
use crate::config::Config;
use crate::gateway::{Gateway, GatewayError, SessionState};
use crate::metrics;
use crate::session::{Session, SessionConfig};
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, WebSocketUpgrade},
        ConnectInfo, Path, State,
    },
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use murmur_core::Publisher;
use murmur_protocol::FrameCodec;
use murmur_transport::{UpgradeConfig, WebSocketConnection};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// Admission checks run before every upgrade.
    pub gateway: Gateway,
    /// Bus every session publishes to.
    pub publisher: Arc<dyn Publisher>,
    /// Upgrade policy.
    pub upgrade: UpgradeConfig,
    /// Settings handed to each session.
    pub session: SessionConfig,
    /// Flips to `true` when the server shuts down.
    pub shutdown: watch::Receiver<bool>,
}

impl AppState {
    /// Build state and collaborators from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured bus cannot be reached.
    pub async fn from_config(config: &Config, shutdown: watch::Receiver<bool>) -> Result<Self> {
        let token_parser = Arc::new(JwtTokenParser::from_config(&config.auth));
        let authorizer = access::from_config(&config.access);
        let publisher = bus::from_config(&config.bus).await?;

        let session = SessionConfig {
            codec: FrameCodec::new().with_max_frame_size(config.transport.max_message_size),
            idle_timeout: config.session.idle_timeout(),
        };

        Ok(Self {
            gateway: Gateway::new(token_parser, authorizer),
            publisher,
            upgrade: config.transport.upgrade_config(),
            session,
            shutdown,
        })
    }
}

/// Build the HTTP router.
pub fn router(websocket_path: &str, state: Arc<AppState>) -> Router {
    Router::new()
        .route(websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Serve `app` on `listener` until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the listener fails.
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .context("Server error")
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let state = Arc::new(AppState::from_config(&config, shutdown_rx).await?);
    info!(bus = state.publisher.name(), "Bus ready");

    let app = router(&config.transport.websocket_path, state);

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Murmur server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    serve(listener, app, shutdown_signal(shutdown_tx)).await?;

    info!("Murmur server stopped");
    Ok(())
}

/// Resolve on Ctrl-C and tell every session to close.
async fn shutdown_signal(shutdown: watch::Sender<bool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }

    info!("Shutdown requested, closing sessions");
    shutdown.send_replace(true);
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// WebSocket upgrade handler.
///
/// Admission runs before the upgrade request itself is validated, so a bad
/// credential is a 400 even when the upgrade headers are also wrong.
async fn ws_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path(room): Path<String>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let admission = match state.gateway.admit(authorization, &room).await {
        Ok(admission) => admission,
        Err(e) => return e.into_response(),
    };

    let origin = headers.get(header::ORIGIN).and_then(|value| value.to_str().ok());
    if !state.upgrade.origin_allowed(origin) {
        let origin = origin.unwrap_or_default().to_string();
        return GatewayError::OriginNotAllowed(origin).into_response();
    }

    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => return GatewayError::UpgradeFailure(rejection.body_text()).into_response(),
    };

    debug!(
        peer = %peer,
        room = %admission.binding.room,
        user = %admission.identity.user,
        device = %admission.identity.device,
        state = %SessionState::Upgrading,
        "Upgrading connection"
    );

    let session = Session::new(admission.binding, state.publisher.clone())
        .with_config(state.session.clone())
        .with_shutdown(state.shutdown.clone());

    state
        .upgrade
        .apply(upgrade)
        .on_failed_upgrade(move |e| {
            warn!(peer = %peer, error = %e, "WebSocket upgrade failed");
            metrics::record_rejection("upgrade_failure");
        })
        .on_upgrade(move |socket| async move {
            let conn = WebSocketConnection::new(socket).with_remote_addr(peer.to_string());
            session.run(conn).await;
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::MembershipAuthorizer;
    use crate::auth::Claims;
    use axum::body::Body;
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::{Request, StatusCode};
    use jsonwebtoken::{encode, EncodingKey, Header};
    use murmur_core::{MemoryBus, RoomId, UserId};
    use std::time::{SystemTime, UNIX_EPOCH};
    use tower::ServiceExt;

    const SECRET: &[u8] = b"handler-secret";
    const PATH: &str = "/websocket/{room_uuid}";

    struct Fixture {
        bus: Arc<MemoryBus>,
        member: UserId,
        room: RoomId,
        app: Router,
    }

    fn fixture(allowed_origins: Vec<String>) -> Fixture {
        let bus = Arc::new(MemoryBus::new());
        let member = UserId::generate();
        let room = RoomId::generate();
        let authorizer = MembershipAuthorizer::new().with_members(room, [member]);

        let state = Arc::new(AppState {
            gateway: Gateway::new(Arc::new(JwtTokenParser::new(SECRET, 0)), Arc::new(authorizer)),
            publisher: bus.clone(),
            upgrade: UpgradeConfig {
                allowed_origins,
                ..UpgradeConfig::default()
            },
            session: SessionConfig::default(),
            shutdown: watch::channel(false).1,
        });

        let app = router(PATH, state).layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))));
        Fixture {
            bus,
            member,
            room,
            app,
        }
    }

    fn token(user: UserId) -> String {
        let exp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
            + 300;
        let claims = Claims {
            sub: user.to_string(),
            device_id: "d1".to_string(),
            exp,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET)).unwrap()
    }

    fn upgrade_request(room: &str, authorization: Option<String>) -> Request<Body> {
        let mut builder = Request::builder().uri(format!("/websocket/{}", room));
        if let Some(value) = authorization {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let fx = fixture(Vec::new());
        let response = fx
            .app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_credential_is_bad_request() {
        let fx = fixture(Vec::new());
        let response = fx
            .app
            .oneshot(upgrade_request(&fx.room.to_string(), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_invalid_credential_is_bad_request() {
        let fx = fixture(Vec::new());
        let response = fx
            .app
            .oneshot(upgrade_request(
                &fx.room.to_string(),
                Some("Bearer not.a.token".to_string()),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_invalid_room_is_bad_request() {
        let fx = fixture(Vec::new());
        let bearer = format!("Bearer {}", token(fx.member));
        let response = fx
            .app
            .oneshot(upgrade_request("not-a-uuid", Some(bearer)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_denied_is_forbidden_and_publishes_nothing() {
        let fx = fixture(Vec::new());
        let bearer = format!("Bearer {}", token(UserId::generate()));
        let response = fx
            .app
            .oneshot(upgrade_request(&fx.room.to_string(), Some(bearer)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(fx.bus.stats().topic_count, 0);
    }

    #[tokio::test]
    async fn test_disallowed_origin_is_forbidden() {
        let fx = fixture(vec!["https://chat.example".to_string()]);
        let request = Request::builder()
            .uri(format!("/websocket/{}", fx.room))
            .header(header::AUTHORIZATION, format!("Bearer {}", token(fx.member)))
            .header(header::ORIGIN, "https://evil.example")
            .body(Body::empty())
            .unwrap();

        let response = fx.app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_admitted_without_upgrade_is_server_error() {
        let fx = fixture(Vec::new());
        let bearer = format!("Bearer {}", token(fx.member));
        let response = fx
            .app
            .oneshot(upgrade_request(&fx.room.to_string(), Some(bearer)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(fx.bus.stats().topic_count, 0);
    }
}
