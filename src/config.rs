//! Configuration loading and management.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Server identity and logging.
    #[serde(default)]
    pub server: ServerConfig,
    /// Network listen configuration.
    #[serde(default)]
    pub listen: ListenConfig,
    /// Protocol and hub policy knobs.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Flood-protection rates.
    #[serde(default)]
    pub rate_limits: RateLimitConfig,
    /// Static token table for the built-in auth provider (dev mode).
    #[serde(default)]
    pub tokens: Vec<TokenBlock>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Structured JSON lines.
    Json,
    /// Human-readable output.
    #[default]
    Pretty,
}

/// Server identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server name announced in the handshake.
    #[serde(default = "default_server_name")]
    pub name: String,
    /// Log output format.
    #[serde(default)]
    pub log_format: LogFormat,
    /// Prometheus metrics port. 0 disables the exporter.
    #[serde(default)]
    pub metrics_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            log_format: LogFormat::default(),
            metrics_port: 0,
        }
    }
}

fn default_server_name() -> String {
    "palaver.local".to_string()
}

/// Network listen configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    /// TCP listen address.
    #[serde(default = "default_listen_addr")]
    pub address: SocketAddr,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            address: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    "127.0.0.1:7400".parse().expect("valid default address")
}

/// Protocol and hub policy knobs.
///
/// Every value has a production default; deployments override the few
/// they care about.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Maximum wire frame payload in bytes.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
    /// Unauthenticated connections older than this cannot authenticate.
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,
    /// Authenticated connections idle longer than this may be closed.
    /// 0 disables the idle sweep.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    /// Ringing 1:1 calls time out to Missed after this.
    #[serde(default = "default_ring_timeout")]
    pub ring_timeout_secs: u64,
    /// Window after sending within which the author may edit a message.
    #[serde(default = "default_edit_window")]
    pub edit_window_secs: u64,
    /// Per-sender screen-frame upload ceiling, bytes per second.
    #[serde(default = "default_upload_ceiling")]
    pub upload_bytes_per_sec: u64,
    /// Per-viewer screen-frame download ceiling, bytes per second.
    /// Advisory: excess fan-out frames to that viewer are dropped.
    #[serde(default = "default_download_ceiling")]
    pub download_bytes_per_sec: u64,
    /// Hard cap on voice-room size; creation requests are clamped to
    /// `2..=max_room_participants`.
    #[serde(default = "default_max_room_participants")]
    pub max_room_participants: u32,
    /// Maximum simultaneous screen shares per voice channel.
    #[serde(default = "default_max_streams")]
    pub max_streams_per_channel: usize,
    /// Bounded depth of each connection's outbound event queue.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue_frames: usize,
    /// Number of recent messages pushed on channel join.
    #[serde(default = "default_history_limit")]
    pub chat_history_limit: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        // serde defaults and Default must agree; route through an empty
        // TOML document so there is a single source of truth.
        toml::from_str("").expect("empty limits config deserializes")
    }
}

impl LimitsConfig {
    /// Handshake window as a `Duration`.
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    /// Ring timeout as a `Duration`.
    pub fn ring_timeout(&self) -> Duration {
        Duration::from_secs(self.ring_timeout_secs)
    }

    /// Edit window as a `Duration`.
    pub fn edit_window(&self) -> Duration {
        Duration::from_secs(self.edit_window_secs)
    }
}

fn default_max_frame_bytes() -> usize {
    1024 * 1024
}
fn default_handshake_timeout() -> u64 {
    300
}
fn default_idle_timeout() -> u64 {
    600
}
fn default_ring_timeout() -> u64 {
    30
}
fn default_edit_window() -> u64 {
    300
}
fn default_upload_ceiling() -> u64 {
    30 * 1024 * 1024
}
fn default_download_ceiling() -> u64 {
    50 * 1024 * 1024
}
fn default_max_room_participants() -> u32 {
    50
}
fn default_max_streams() -> usize {
    10
}
fn default_outbound_queue() -> usize {
    256
}
fn default_history_limit() -> usize {
    50
}

/// Flood-protection rates (text paths only; media paths use the byte
/// buckets in the screen-share state).
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Chat/DM sends per second per connection.
    #[serde(default = "default_message_rate")]
    pub message_rate_per_second: u32,
    /// Typing notifications per second per connection.
    #[serde(default = "default_typing_rate")]
    pub typing_rate_per_second: u32,
    /// New connections per second per IP.
    #[serde(default = "default_connection_burst")]
    pub connection_burst_per_ip: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        toml::from_str("").expect("empty rate-limit config deserializes")
    }
}

fn default_message_rate() -> u32 {
    20
}
fn default_typing_rate() -> u32 {
    2
}
fn default_connection_burst() -> u32 {
    30
}

/// A static bearer token accepted by the built-in auth provider.
///
/// Production deployments inject their own `AuthProvider`; these blocks
/// exist for dev mode and smoke tests.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenBlock {
    /// The opaque bearer token.
    pub token: String,
    /// User id bound to the token.
    pub user_id: String,
    /// Display name.
    pub username: String,
    /// Moderation role: "user", "moderator" or "admin".
    #[serde(default)]
    pub role: String,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

/// Validate a loaded configuration, returning every problem found.
pub fn validate(config: &Config) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    if config.server.name.is_empty() {
        errors.push("server.name must not be empty".to_string());
    }
    if config.limits.max_frame_bytes < 4 * 1024 {
        errors.push("limits.max_frame_bytes must be at least 4096".to_string());
    }
    if config.limits.handshake_timeout_secs == 0 {
        errors.push("limits.handshake_timeout_secs must be positive".to_string());
    }
    if config.limits.ring_timeout_secs == 0 {
        errors.push("limits.ring_timeout_secs must be positive".to_string());
    }
    if config.limits.max_room_participants < 2 {
        errors.push("limits.max_room_participants must be at least 2".to_string());
    }
    if config.limits.outbound_queue_frames < 16 {
        errors.push("limits.outbound_queue_frames must be at least 16".to_string());
    }
    if config.limits.upload_bytes_per_sec == 0 {
        errors.push("limits.upload_bytes_per_sec must be positive".to_string());
    }
    if config.rate_limits.message_rate_per_second == 0 {
        errors.push("rate_limits.message_rate_per_second must be positive".to_string());
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}
