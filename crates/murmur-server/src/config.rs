//! Server configuration.
//!
//! Configuration can be loaded from:
//! - TOML configuration file (`murmur.toml`, `/etc/murmur/murmur.toml`,
//!   `~/.config/murmur/murmur.toml`, or `--config <path>`)
//! - Environment variables (`MURMUR__SECTION__KEY`, e.g. `MURMUR__BUS__KIND=redis`)

use anyhow::{ensure, Context, Result};
use murmur_core::{RoomId, UserId};
use murmur_transport::UpgradeConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Default config file locations, in priority order.
const CONFIG_PATHS: [&str; 3] = [
    "murmur.toml",
    "/etc/murmur/murmur.toml",
    "~/.config/murmur/murmur.toml",
];

/// Placeholder the WebSocket route must contain.
pub const ROOM_PLACEHOLDER: &str = "{room_uuid}";

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Token verification.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Room access policy.
    #[serde(default)]
    pub access: AccessConfig,

    /// Event bus.
    #[serde(default)]
    pub bus: BusConfig,

    /// Per-connection session settings.
    #[serde(default)]
    pub session: SessionSettings,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Route of the WebSocket endpoint; must contain `{room_uuid}`.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,

    /// WebSocket read buffer size in bytes.
    #[serde(default = "default_buffer_size")]
    pub read_buffer_size: usize,

    /// WebSocket write buffer size in bytes.
    #[serde(default = "default_buffer_size")]
    pub write_buffer_size: usize,

    /// Maximum inbound frame size in bytes. Larger frames are discarded.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Messages above this size break the connection.
    #[serde(default = "default_socket_message_limit")]
    pub socket_message_limit: usize,

    /// Origins allowed to connect. Empty accepts every origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

/// Token verification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret used to verify HS256 tokens.
    #[serde(default)]
    pub jwt_secret: String,

    /// Clock skew tolerance for `exp`, in seconds.
    #[serde(default = "default_leeway")]
    pub leeway_secs: u64,
}

/// How room access is decided.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    /// Only listed members may join listed rooms.
    #[default]
    Membership,
    /// Every authenticated user may join every room.
    AllowAll,
}

/// Members of one room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomAccess {
    pub room: RoomId,
    #[serde(default)]
    pub members: Vec<UserId>,
}

/// Room access configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessConfig {
    #[serde(default)]
    pub mode: AccessMode,

    #[serde(default)]
    pub rooms: Vec<RoomAccess>,
}

/// Which bus records are published on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusKind {
    /// In-process bus.
    #[default]
    Memory,
    /// Redis pub/sub.
    Redis,
}

/// Event bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    #[serde(default)]
    pub kind: BusKind,

    /// Redis connection URL (`redis://` or `rediss://`).
    #[serde(default)]
    pub redis_url: String,

    /// Payloads buffered between sessions and the broker before publishes fail.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

/// Per-connection session settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Close connections idle for this long, in milliseconds. 0 disables.
    #[serde(default)]
    pub idle_timeout_ms: u64,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_ws_path() -> String {
    format!("/websocket/{}", ROOM_PLACEHOLDER)
}

fn default_buffer_size() -> usize {
    1024
}

fn default_max_message_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_socket_message_limit() -> usize {
    16 * 1024 * 1024 // 16 MB
}

fn default_leeway() -> u64 {
    30
}

fn default_queue_capacity() -> usize {
    4096
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            transport: TransportConfig::default(),
            auth: AuthConfig::default(),
            access: AccessConfig::default(),
            bus: BusConfig::default(),
            session: SessionSettings::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            websocket_path: default_ws_path(),
            read_buffer_size: default_buffer_size(),
            write_buffer_size: default_buffer_size(),
            max_message_size: default_max_message_size(),
            socket_message_limit: default_socket_message_limit(),
            allowed_origins: Vec::new(),
        }
    }
}

impl TransportConfig {
    /// Build the upgrade policy for the WebSocket endpoint.
    #[must_use]
    pub fn upgrade_config(&self) -> UpgradeConfig {
        UpgradeConfig {
            read_buffer_size: self.read_buffer_size,
            write_buffer_size: self.write_buffer_size,
            max_message_size: self.max_message_size,
            socket_message_limit: self.socket_message_limit,
            allowed_origins: self.allowed_origins.clone(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            leeway_secs: default_leeway(),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            kind: BusKind::default(),
            redis_url: String::new(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl SessionSettings {
    /// Idle timeout, if enabled.
    #[must_use]
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_ms > 0).then(|| Duration::from_millis(self.idle_timeout_ms))
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from the first default file found, overlaid with
    /// `MURMUR__*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a config source exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let file = CONFIG_PATHS
            .iter()
            .map(|path| shellexpand::tilde(path).into_owned())
            .find(|path| Path::new(path).exists());

        Self::build(file.as_deref().map(Path::new))
    }

    /// Load configuration from a specific file, overlaid with `MURMUR__*`
    /// environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        ensure!(path.exists(), "Config file not found: {}", path.display());
        Self::build(Some(path))
            .with_context(|| format!("Failed to load config file: {}", path.display()))
    }

    fn build(file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::new(
                &path.to_string_lossy(),
                config::FileFormat::Toml,
            ));
        }

        let config: Config = builder
            .add_source(
                config::Environment::with_prefix("MURMUR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to assemble configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(config)
    }

    /// Check values that would otherwise fail at runtime.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.auth.jwt_secret.is_empty(), "auth.jwt_secret must be set");
        ensure!(
            self.transport.websocket_path.starts_with('/')
                && self.transport.websocket_path.contains(ROOM_PLACEHOLDER),
            "transport.websocket_path must start with '/' and contain {}",
            ROOM_PLACEHOLDER
        );
        ensure!(
            self.transport.read_buffer_size > 0 && self.transport.write_buffer_size > 0,
            "transport buffer sizes must be non-zero"
        );
        ensure!(
            self.transport.max_message_size > 0,
            "transport.max_message_size must be non-zero"
        );
        ensure!(
            self.transport.socket_message_limit >= self.transport.max_message_size,
            "transport.socket_message_limit must not be below transport.max_message_size"
        );
        if self.bus.kind == BusKind::Redis {
            ensure!(
                self.bus.redis_url.starts_with("redis://")
                    || self.bus.redis_url.starts_with("rediss://"),
                "bus.redis_url must be a redis:// or rediss:// URL"
            );
            ensure!(self.bus.queue_capacity > 0, "bus.queue_capacity must be non-zero");
        }
        Ok(())
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid host:port {}:{}", self.host, self.port))
    }
}
