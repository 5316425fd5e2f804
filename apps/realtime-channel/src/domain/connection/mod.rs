//! Connection Lifecycle State
//!
//! The realtime channel moves through four states:
//!
//! ```text
//! Disconnected ──start──► Connecting ──open──► Connected ──auth ack──► Authenticated
//!      ▲                      │                    │                        │
//!      └──────── drop / stop / budget exhausted ───┴────────────────────────┘
//! ```
//!
//! Only the connection manager mutates the state. Everything else observes it.

use serde::Serialize;

/// Current state of the realtime connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No transport, and no connection attempt in progress.
    #[default]
    Disconnected,
    /// Transport connect (or reconnect) in progress.
    Connecting,
    /// Transport open; public streams usable, personalized streams not.
    Connected,
    /// Transport open and the session credential accepted.
    Authenticated,
}

impl ConnectionState {
    /// Whether the transport is open (with or without authentication).
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected | Self::Authenticated)
    }

    /// Whether personalized channels (trades, challenge events) are available.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated)
    }

    /// Get the state name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Authenticated => "authenticated",
        }
    }

    /// Numeric encoding used for the connection state gauge.
    #[must_use]
    pub const fn as_gauge(&self) -> f64 {
        match self {
            Self::Disconnected => 0.0,
            Self::Connecting => 1.0,
            Self::Connected => 2.0,
            Self::Authenticated => 3.0,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }

    #[test]
    fn connected_includes_authenticated() {
        assert!(!ConnectionState::Disconnected.is_connected());
        assert!(!ConnectionState::Connecting.is_connected());
        assert!(ConnectionState::Connected.is_connected());
        assert!(ConnectionState::Authenticated.is_connected());
    }

    #[test]
    fn only_authenticated_is_authenticated() {
        assert!(!ConnectionState::Connected.is_authenticated());
        assert!(ConnectionState::Authenticated.is_authenticated());
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ConnectionState::Authenticated).unwrap(),
            "\"authenticated\""
        );
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
    }
}
