//! Realtime Session Authentication
//!
//! The realtime endpoint streams public prices to any connection. Trade and
//! challenge events additionally require the user's session token.
//!
//! # Authentication Flow
//!
//! 1. Connect to the WebSocket endpoint (state `Connected`)
//! 2. If a session token is present, send
//!    `{"type":"authenticate","data":{"token":"..."}}`
//! 3. Receive `authenticated` (state `Authenticated`) or `auth_error`
//!    (state stays `Connected`)
//!
//! Price subscriptions are sent without waiting for step 3.

use thiserror::Error;

use super::messages::{AuthErrorMessage, ClientMessage};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during authentication.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The session token is empty.
    #[error("session token cannot be empty")]
    EmptyToken,

    /// The server rejected the session token.
    #[error("authentication rejected: {0}")]
    Rejected(String),

    /// An acknowledgement arrived without a pending request.
    #[error("unexpected authentication response")]
    Unexpected,
}

impl From<&AuthErrorMessage> for AuthError {
    fn from(msg: &AuthErrorMessage) -> Self {
        if msg.message.trim().is_empty() {
            Self::Rejected("no reason given".to_string())
        } else {
            Self::Rejected(msg.message.clone())
        }
    }
}

// =============================================================================
// Session Token
// =============================================================================

/// Session credential presented to the realtime endpoint.
///
/// The `Debug` implementation redacts the token for safe logging.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    /// Create a token.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::EmptyToken`] if the token is blank.
    pub fn new(token: impl Into<String>) -> Result<Self, AuthError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(AuthError::EmptyToken);
        }
        Ok(Self(token))
    }

    /// Get the raw token.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Build the `authenticate` request carrying this token.
    #[must_use]
    pub fn to_request(&self) -> ClientMessage {
        ClientMessage::Authenticate {
            token: self.0.clone(),
        }
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionToken([REDACTED])")
    }
}

// =============================================================================
// Authentication State
// =============================================================================

/// Authentication progress on the current connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthState {
    /// No request sent on this connection.
    #[default]
    Unauthenticated,

    /// Request sent, awaiting response.
    Authenticating,

    /// Token accepted.
    Authenticated,

    /// Token rejected; a new token is needed.
    Rejected,
}

impl AuthState {
    /// Check if currently authenticated.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated)
    }

    /// Check if authentication is in progress.
    #[must_use]
    pub const fn is_authenticating(&self) -> bool {
        matches!(self, Self::Authenticating)
    }
}

// =============================================================================
// Authentication Handler
// =============================================================================

/// Per-connection authentication state machine.
///
/// # Example
///
/// ```rust
/// use realtime_channel::infrastructure::realtime::auth::{AuthHandler, SessionToken};
///
/// let token = SessionToken::new("session-token").unwrap();
/// let mut handler = AuthHandler::new();
///
/// let _request = handler.begin(&token);
/// assert!(handler.state().is_authenticating());
///
/// handler.on_authenticated().unwrap();
/// assert!(handler.is_authenticated());
/// ```
#[derive(Debug, Default)]
pub struct AuthHandler {
    state: AuthState,
}

impl AuthHandler {
    /// Create a handler for a fresh connection.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AuthState::Unauthenticated,
        }
    }

    /// Get the current state.
    #[must_use]
    pub const fn state(&self) -> AuthState {
        self.state
    }

    /// Check if currently authenticated.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.state.is_authenticated()
    }

    /// Start an authentication attempt and return the request to send.
    pub fn begin(&mut self, token: &SessionToken) -> ClientMessage {
        self.state = AuthState::Authenticating;
        token.to_request()
    }

    /// Process an `authenticated` acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unexpected`] if no request was pending. The
    /// state still becomes `Authenticated`, since the server is the
    /// authority on the session.
    pub const fn on_authenticated(&mut self) -> Result<(), AuthError> {
        let was_pending = self.state.is_authenticating();
        self.state = AuthState::Authenticated;
        if was_pending {
            Ok(())
        } else {
            Err(AuthError::Unexpected)
        }
    }

    /// Process an `auth_error` rejection.
    pub fn on_auth_error(&mut self, msg: &AuthErrorMessage) -> AuthError {
        self.state = AuthState::Rejected;
        AuthError::from(msg)
    }

    /// Reset for a new connection.
    pub const fn reset(&mut self) {
        self.state = AuthState::Unauthenticated;
    }
}
