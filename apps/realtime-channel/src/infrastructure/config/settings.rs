//! Channel Configuration Settings
//!
//! Configuration types for the realtime channel, loaded from environment
//! variables.

use std::time::Duration;

use crate::domain::quote::{Symbol, normalize_symbols};
use crate::infrastructure::realtime::auth::SessionToken;

/// WebSocket connection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct WebSocketSettings {
    /// Time allowed for the transport handshake.
    pub connect_timeout: Duration,
    /// Heartbeat ping interval.
    pub heartbeat_interval: Duration,
    /// Silence after a ping before the connection is considered dead.
    pub heartbeat_timeout: Duration,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier (1.0 = fixed delay).
    pub reconnect_delay_multiplier: f64,
    /// Reconnection jitter as a fraction of the delay.
    pub reconnect_jitter: f64,
    /// Maximum reconnection attempts before giving up. Must be at least 1.
    pub max_reconnect_attempts: u32,
    /// Forget known prices when a dropped connection is re-established.
    pub clear_prices_on_reconnect: bool,
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(20),
            heartbeat_timeout: Duration::from_secs(40),
            reconnect_delay_initial: Duration::from_millis(1000),
            reconnect_delay_max: Duration::from_secs(30),
            reconnect_delay_multiplier: 1.0,
            reconnect_jitter: 0.0,
            max_reconnect_attempts: 5,
            clear_prices_on_reconnect: true,
        }
    }
}

/// Server port settings for the binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Health check and metrics HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8082 }
    }
}

/// Complete channel configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    /// Realtime endpoint (`ws://` or `wss://`).
    pub url: String,
    /// Session credential presented after connecting.
    pub auth_token: Option<SessionToken>,
    /// Symbols the binary subscribes to at startup.
    pub symbols: Vec<Symbol>,
    /// How long a price flash stays visible.
    pub flash_window: Duration,
    /// WebSocket connection settings.
    pub websocket: WebSocketSettings,
    /// Server port settings.
    pub server: ServerSettings,
}

impl ChannelConfig {
    /// Configuration with defaults for everything but the endpoint.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_token: None,
            symbols: Vec::new(),
            flash_window: Duration::from_millis(500),
            websocket: WebSocketSettings::default(),
            server: ServerSettings::default(),
        }
    }

    /// Set the session credential.
    #[must_use]
    pub fn with_auth_token(mut self, token: SessionToken) -> Self {
        self.auth_token = Some(token);
        self
    }

    /// Set the WebSocket settings.
    #[must_use]
    pub fn with_websocket(mut self, websocket: WebSocketSettings) -> Self {
        self.websocket = websocket;
        self
    }

    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `REALTIME_WS_URL` is missing, empty, or not a
    /// WebSocket URL, or if `REALTIME_RECONNECT_MAX_ATTEMPTS` is zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// Unparseable optional values fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Same as [`ChannelConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("REALTIME_WS_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("REALTIME_WS_URL".to_string()))?;
        let url = url.trim().to_string();
        if url.is_empty() {
            return Err(ConfigError::EmptyValue("REALTIME_WS_URL".to_string()));
        }
        validate_ws_url(&url)?;

        let auth_token = lookup("REALTIME_AUTH_TOKEN").and_then(|t| SessionToken::new(t).ok());

        let symbols = lookup("REALTIME_SYMBOLS")
            .map(|raw| normalize_symbols(&raw.split(',').collect::<Vec<_>>()))
            .unwrap_or_default();

        let defaults = WebSocketSettings::default();
        let websocket = WebSocketSettings {
            connect_timeout: parse_duration_secs(
                &lookup,
                "REALTIME_CONNECT_TIMEOUT_SECS",
                defaults.connect_timeout,
            ),
            heartbeat_interval: parse_duration_secs(
                &lookup,
                "REALTIME_HEARTBEAT_INTERVAL_SECS",
                defaults.heartbeat_interval,
            ),
            heartbeat_timeout: parse_duration_secs(
                &lookup,
                "REALTIME_HEARTBEAT_TIMEOUT_SECS",
                defaults.heartbeat_timeout,
            ),
            reconnect_delay_initial: parse_duration_millis(
                &lookup,
                "REALTIME_RECONNECT_DELAY_MS",
                defaults.reconnect_delay_initial,
            ),
            reconnect_delay_max: parse_duration_secs(
                &lookup,
                "REALTIME_RECONNECT_DELAY_MAX_SECS",
                defaults.reconnect_delay_max,
            ),
            reconnect_delay_multiplier: parse_or(
                &lookup,
                "REALTIME_RECONNECT_MULTIPLIER",
                defaults.reconnect_delay_multiplier,
            ),
            reconnect_jitter: parse_or(&lookup, "REALTIME_RECONNECT_JITTER", defaults.reconnect_jitter),
            max_reconnect_attempts: parse_max_attempts(&lookup, defaults.max_reconnect_attempts)?,
            clear_prices_on_reconnect: parse_bool(
                &lookup,
                "REALTIME_CLEAR_PRICES_ON_RECONNECT",
                defaults.clear_prices_on_reconnect,
            ),
        };

        let server = ServerSettings {
            health_port: parse_or(
                &lookup,
                "REALTIME_HEALTH_PORT",
                ServerSettings::default().health_port,
            ),
        };

        Ok(Self {
            url,
            auth_token,
            symbols,
            flash_window: parse_duration_millis(
                &lookup,
                "REALTIME_FLASH_WINDOW_MS",
                Duration::from_millis(500),
            ),
            websocket,
            server,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable has an unusable value.
    #[error("environment variable {key} is invalid: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// What is wrong with it.
        reason: String,
    },
}

fn validate_ws_url(url: &str) -> Result<(), ConfigError> {
    let lower = url.to_ascii_lowercase();
    let rest = lower
        .strip_prefix("wss://")
        .or_else(|| lower.strip_prefix("ws://"));
    match rest {
        Some(host) if !host.is_empty() && !host.starts_with('/') => Ok(()),
        Some(_) => Err(ConfigError::InvalidValue {
            key: "REALTIME_WS_URL".to_string(),
            reason: "missing host".to_string(),
        }),
        None => Err(ConfigError::InvalidValue {
            key: "REALTIME_WS_URL".to_string(),
            reason: format!("expected ws:// or wss:// URL, got {url}"),
        }),
    }
}

fn parse_max_attempts<F>(lookup: &F, default: u32) -> Result<u32, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    const KEY: &str = "REALTIME_RECONNECT_MAX_ATTEMPTS";
    match parse_or(lookup, KEY, default) {
        0 => Err(ConfigError::InvalidValue {
            key: KEY.to_string(),
            reason: "must be at least 1".to_string(),
        }),
        attempts => Ok(attempts),
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_bool<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).map_or(default, |v| match v.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    })
}

fn parse_duration_secs<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_duration_millis<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
