//! Prometheus Metrics Module
//!
//! Exposes channel metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Messages**: inbound frames by message type, outbound frames, malformed frames
//! - **Connection**: lifecycle state gauge, reconnect attempts, transport errors
//! - **Subscriptions**: desired symbol count
//! - **Listeners**: listener panics by category
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. Recording
//! functions are no-ops until a recorder is installed, so library users who
//! never call [`init_metrics`] pay nothing.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::connection::ConnectionState;
use crate::domain::event::ListenerCategory;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Subsequent calls return the handle installed by the first one.
///
/// # Errors
///
/// Returns an error if another global recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();

    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "realtime_messages_received_total",
        "Total frames received from the realtime server by message type"
    );
    describe_counter!(
        "realtime_messages_sent_total",
        "Total frames sent to the realtime server by message type"
    );
    describe_counter!(
        "realtime_malformed_frames_total",
        "Total inbound frames that could not be decoded"
    );

    describe_gauge!(
        "realtime_connection_state",
        "Connection state (0 disconnected, 1 connecting, 2 connected, 3 authenticated)"
    );
    describe_counter!(
        "realtime_reconnects_total",
        "Total reconnection attempts"
    );
    describe_counter!(
        "realtime_transport_errors_total",
        "Total transport errors by type"
    );

    describe_gauge!(
        "realtime_desired_symbols",
        "Number of symbols any consumer currently wants"
    );

    describe_counter!(
        "realtime_listener_panics_total",
        "Total listener callbacks that panicked during dispatch"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Metric labels for wire message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// `connected` greeting.
    Connected,
    /// `authenticated` acknowledgement.
    Authenticated,
    /// `auth_error` rejection.
    AuthError,
    /// `subscribed` acknowledgement.
    Subscribed,
    /// Single price tick.
    PriceUpdate,
    /// Batched price ticks.
    PricesBatch,
    /// Trade state change.
    TradeUpdate,
    /// Challenge status change.
    ChallengeStatus,
    /// Challenge risk warning.
    ChallengeWarning,
    /// Any type this client does not handle.
    Unknown,
    /// Outbound `authenticate`.
    Authenticate,
    /// Outbound `subscribe_prices`.
    SubscribePrices,
    /// Outbound `unsubscribe_prices`.
    UnsubscribePrices,
}

impl MessageType {
    /// Get the label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Authenticated => "authenticated",
            Self::AuthError => "auth_error",
            Self::Subscribed => "subscribed",
            Self::PriceUpdate => "price_update",
            Self::PricesBatch => "prices_batch",
            Self::TradeUpdate => "trade_update",
            Self::ChallengeStatus => "challenge_status",
            Self::ChallengeWarning => "challenge_warning",
            Self::Unknown => "unknown",
            Self::Authenticate => "authenticate",
            Self::SubscribePrices => "subscribe_prices",
            Self::UnsubscribePrices => "unsubscribe_prices",
        }
    }
}

/// Record a frame received from the server.
pub fn record_message_received(msg_type: MessageType) {
    counter!(
        "realtime_messages_received_total",
        "message_type" => msg_type.as_str()
    )
    .increment(1);
}

/// Record a frame sent to the server.
pub fn record_message_sent(msg_type: MessageType) {
    counter!(
        "realtime_messages_sent_total",
        "message_type" => msg_type.as_str()
    )
    .increment(1);
}

/// Record an inbound frame that failed to decode.
pub fn record_malformed_frame() {
    counter!("realtime_malformed_frames_total").increment(1);
}

/// Update the connection state gauge.
pub fn set_connection_state(state: ConnectionState) {
    gauge!("realtime_connection_state").set(state.as_gauge());
}

/// Record a reconnection attempt.
pub fn record_reconnect() {
    counter!("realtime_reconnects_total").increment(1);
}

/// Record a transport error.
pub fn record_transport_error(error_type: &'static str) {
    counter!(
        "realtime_transport_errors_total",
        "error_type" => error_type
    )
    .increment(1);
}

/// Update the desired symbol gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_desired_symbols(count: usize) {
    gauge!("realtime_desired_symbols").set(count as f64);
}

/// Record a listener panic.
pub fn record_listener_panic(category: ListenerCategory) {
    counter!(
        "realtime_listener_panics_total",
        "category" => category.as_str()
    )
    .increment(1);
}

// =============================================================================
// Tests
// =============================================================================
