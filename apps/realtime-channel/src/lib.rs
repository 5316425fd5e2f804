#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Realtime Channel - Price, Trade and Challenge Update Multiplexer
//!
//! Maintains one WebSocket connection to the platform's realtime endpoint
//! and fans its updates out to in-process listeners. Consumers ask for
//! price symbols independently; the channel keeps the server-side
//! subscription set equal to the union of what they want.
//!
//! # Layers (inside -> outside)
//!
//! - **Domain**: Core channel types and rules
//!   - `connection`: Connection lifecycle state
//!   - `quote`: Price quotes, price book, flash direction
//!   - `subscription`: Reference-counted symbol subscriptions
//!   - `challenge`: Challenge payloads and notification rules
//!   - `event`: Listener categories and delivered events
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: `Notifier` for user-visible notifications
//!   - `services`: `RealtimeChannel`, `PriceFlashTracker`
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `realtime`: WebSocket client (codec, auth, heartbeat, reconnect)
//!   - `listeners`: Category-keyed listener fan-out
//!   - `notify`: Notifier adapters
//!   - `config`: Configuration loading
//!   - `health`: Health check HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//!                        +----------------+      +-------------+
//! Realtime WS  <-------> | RealtimeClient | ---> | ListenerHub | ---> price listeners
//!                        +----------------+      +-------------+ ---> trade listeners
//!                           ^        |                           ---> challenge listeners
//!      subscribe/unsubscribe|        v
//!                   SubscriptionRegistry   PriceBook   Notifier
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core channel types with no transport dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::challenge::{Notification, NotificationLevel};
pub use domain::connection::ConnectionState;
pub use domain::event::{ChallengeEvent, ChannelEvent, ListenerCategory, PriceEvent};
pub use domain::quote::{FlashDirection, PriceQuote, Symbol};
pub use domain::subscription::{ConsumerId, SubscriptionChanges, SubscriptionStats};

// Application
pub use application::ports::Notifier;
pub use application::services::{PriceFlashTracker, RealtimeChannel};

// Infrastructure config
pub use infrastructure::config::{ChannelConfig, ConfigError, ServerSettings, WebSocketSettings};

// Listener handles
pub use infrastructure::listeners::{ListenerHandle, ListenerStats};

// Session credential
pub use infrastructure::realtime::SessionToken;

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::{MessageType as MetricsMessageType, init_metrics};

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
