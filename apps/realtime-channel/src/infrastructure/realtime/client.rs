//! Realtime WebSocket Client
//!
//! Owns the single transport connection to the realtime endpoint.
//!
//! # Lifecycle
//!
//! - Connect (state `Connecting`), then `Connected` once the transport opens
//! - Send `authenticate` when a session credential is present
//! - Send the full desired symbol set on every new connection
//! - Dispatch inbound frames to the price book, notifier and listeners
//! - On any transport failure: `Disconnected`, then retry per the
//!   reconnect policy until the budget is spent
//!
//! The task exclusively owns the socket write half. Everyone else talks to
//! it through [`ClientCommand`]s.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::auth::{AuthError, AuthHandler};
use super::codec::{CodecError, JsonCodec};
use super::context::ChannelContext;
use super::heartbeat::{
    HeartbeatConfig, HeartbeatEvent, HeartbeatEvents, HeartbeatManager, HeartbeatState,
};
use super::messages::ClientMessage;
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::domain::connection::ConnectionState;
use crate::domain::quote::Symbol;
use crate::infrastructure::config::ChannelConfig;
use crate::infrastructure::metrics;

// =============================================================================
// Error Type
// =============================================================================

/// Errors that can occur in the realtime client.
#[derive(Debug, thiserror::Error)]
pub enum RealtimeClientError {
    /// Transport handshake did not finish in time.
    #[error("connection timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Sending a frame failed.
    #[error("failed to send frame: {0}")]
    Send(String),

    /// Authentication failed.
    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthError),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// No sign of life within the heartbeat timeout.
    #[error("heartbeat timeout")]
    HeartbeatTimeout,

    /// Connection closed by the server.
    #[error("connection closed")]
    ConnectionClosed,

    /// Maximum reconnection attempts exceeded.
    #[error("maximum reconnection attempts ({0}) exceeded")]
    MaxReconnectAttemptsExceeded(u32),
}

impl RealtimeClientError {
    /// Metric label for this error.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ConnectTimeout(_) => "connect_timeout",
            Self::WebSocket(_) => "websocket",
            Self::Send(_) => "send",
            Self::Authentication(_) => "authentication",
            Self::Codec(_) => "codec",
            Self::HeartbeatTimeout => "heartbeat_timeout",
            Self::ConnectionClosed => "connection_closed",
            Self::MaxReconnectAttemptsExceeded(_) => "reconnect_exhausted",
        }
    }
}

// =============================================================================
// Commands
// =============================================================================

/// Requests from the channel handle to the connection task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCommand {
    /// The desired symbol set changed; bring the server in line.
    Reconcile,
    /// The credential changed; authenticate again.
    Authenticate,
}

// =============================================================================
// Wire Subscriptions
// =============================================================================

/// Symbols already sent to the server on the current socket.
///
/// A fresh instance per connection makes the first reconcile send the full
/// desired set.
#[derive(Debug, Default)]
pub struct WireSubscriptions {
    sent: HashSet<Symbol>,
}

impl WireSubscriptions {
    /// Create an empty set for a new connection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests that bring the server from the sent set to `desired`,
    /// unsubscribe first. Marks them as sent.
    pub fn reconcile(&mut self, desired: &[Symbol]) -> Vec<ClientMessage> {
        let desired: HashSet<&Symbol> = desired.iter().collect();

        let mut removed: Vec<Symbol> = self
            .sent
            .iter()
            .filter(|s| !desired.contains(s))
            .cloned()
            .collect();
        let mut added: Vec<Symbol> = desired
            .iter()
            .filter(|s| !self.sent.contains(**s))
            .map(|s| (*s).clone())
            .collect();

        let mut requests = Vec::with_capacity(2);
        if !removed.is_empty() {
            removed.sort();
            for symbol in &removed {
                self.sent.remove(symbol);
            }
            requests.push(ClientMessage::UnsubscribePrices { symbols: removed });
        }
        if !added.is_empty() {
            added.sort();
            self.sent.extend(added.iter().cloned());
            requests.push(ClientMessage::SubscribePrices { symbols: added });
        }
        requests
    }

    /// Number of symbols sent on this socket.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sent.len()
    }

    /// Whether nothing has been sent on this socket.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sent.is_empty()
    }
}

// =============================================================================
// Realtime Client
// =============================================================================

/// Connection task for the realtime endpoint.
///
/// Manages the connection lifecycle including:
/// - Session authentication
/// - Heartbeat monitoring
/// - Bounded automatic reconnection
/// - Server-side subscription sync
pub struct RealtimeClient {
    url: String,
    connect_timeout: Duration,
    clear_prices_on_reconnect: bool,
    reconnect: ReconnectConfig,
    heartbeat: HeartbeatConfig,
    context: Arc<ChannelContext>,
    codec: JsonCodec,
    cancel: CancellationToken,
}

impl RealtimeClient {
    /// Create a new client.
    #[must_use]
    pub fn new(config: &ChannelConfig, context: Arc<ChannelContext>, cancel: CancellationToken) -> Self {
        Self {
            url: config.url.clone(),
            connect_timeout: config.websocket.connect_timeout,
            clear_prices_on_reconnect: config.websocket.clear_prices_on_reconnect,
            reconnect: ReconnectConfig::from_websocket_settings(&config.websocket),
            heartbeat: HeartbeatConfig::from_websocket_settings(&config.websocket),
            context,
            codec: JsonCodec::new(),
            cancel,
        }
    }

    /// Run the connection loop.
    ///
    /// Returns `Ok(())` when cancelled or when every command sender is gone.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeClientError::MaxReconnectAttemptsExceeded`] once the
    /// reconnect budget is spent. The state is `Disconnected` by then.
    pub async fn run(
        self,
        mut commands: mpsc::UnboundedReceiver<ClientCommand>,
    ) -> Result<(), RealtimeClientError> {
        let mut policy = ReconnectPolicy::new(self.reconnect.clone());
        let mut has_connected = false;

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("Realtime client cancelled");
                self.context.set_state(ConnectionState::Disconnected);
                return Ok(());
            }

            self.context.set_state(ConnectionState::Connecting);

            match self
                .connect_and_run(&mut commands, &mut policy, &mut has_connected)
                .await
            {
                Ok(()) => {
                    tracing::info!("Realtime connection closed");
                    self.context.set_state(ConnectionState::Disconnected);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Realtime connection error");
                    metrics::record_transport_error(e.kind());
                    self.context.set_state(ConnectionState::Disconnected);

                    let Some(delay) = policy.next_delay() else {
                        let attempts = policy.config().max_attempts;
                        tracing::error!(attempts, "Reconnect budget exhausted, giving up");
                        return Err(RealtimeClientError::MaxReconnectAttemptsExceeded(attempts));
                    };

                    let attempt = policy.attempt_count();
                    metrics::record_reconnect();
                    tracing::info!(
                        attempt,
                        delay_ms = delay.as_millis(),
                        "Reconnecting to realtime endpoint"
                    );

                    tokio::select! {
                        () = self.cancel.cancelled() => {
                            tracing::info!("Realtime client cancelled during reconnect delay");
                            return Ok(());
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Connect and run until error, cancellation, or command channel close.
    async fn connect_and_run(
        &self,
        commands: &mut mpsc::UnboundedReceiver<ClientCommand>,
        policy: &mut ReconnectPolicy,
        has_connected: &mut bool,
    ) -> Result<(), RealtimeClientError> {
        tracing::info!(url = %self.url, "Connecting to realtime endpoint");

        let handshake = tokio::time::timeout(
            self.connect_timeout,
            tokio_tungstenite::connect_async(self.url.as_str()),
        );
        let (ws_stream, _response) = tokio::select! {
            () = self.cancel.cancelled() => return Ok(()),
            result = handshake => result
                .map_err(|_| RealtimeClientError::ConnectTimeout(self.connect_timeout))??,
        };

        policy.reset();
        // Everything queued so far is covered by the full sync below.
        while commands.try_recv().is_ok() {}

        if *has_connected && self.clear_prices_on_reconnect {
            self.context.clear_prices();
        }
        *has_connected = true;
        self.context.set_state(ConnectionState::Connected);

        let (mut write, mut read) = ws_stream.split();
        let mut auth = AuthHandler::new();
        let mut wire = WireSubscriptions::new();

        self.authenticate(&mut write, &mut auth).await?;
        self.reconcile(&mut write, &mut wire).await?;

        let heartbeat_state = Arc::new(HeartbeatState::new());
        let (heartbeat_tx, heartbeat_rx) = mpsc::channel::<HeartbeatEvent>(10);
        let mut heartbeat_events = HeartbeatEvents::new(heartbeat_rx);
        let heartbeat_cancel = self.cancel.child_token();
        let _heartbeat_guard = heartbeat_cancel.clone().drop_guard();
        tokio::spawn(
            HeartbeatManager::new(
                self.heartbeat.clone(),
                Arc::clone(&heartbeat_state),
                heartbeat_tx,
                heartbeat_cancel,
            )
            .run(),
        );

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                command = commands.recv() => {
                    match command {
                        Some(ClientCommand::Reconcile) => {
                            self.reconcile(&mut write, &mut wire).await?;
                        }
                        Some(ClientCommand::Authenticate) => {
                            self.authenticate(&mut write, &mut auth).await?;
                        }
                        None => {
                            tracing::debug!("Command channel closed");
                            let _ = write.send(Message::Close(None)).await;
                            return Ok(());
                        }
                    }
                }
                heartbeat_event = heartbeat_events.next() => {
                    match heartbeat_event {
                        HeartbeatEvent::SendPing => {
                            heartbeat_state.mark_ping_sent();
                            write.send(Message::Ping(vec![].into())).await?;
                        }
                        HeartbeatEvent::Timeout => {
                            return Err(RealtimeClientError::HeartbeatTimeout);
                        }
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            heartbeat_state.record_activity();
                            self.handle_text_message(&text, &mut auth);
                        }
                        Some(Ok(Message::Pong(_))) => {
                            heartbeat_state.record_activity();
                        }
                        Some(Ok(Message::Ping(data))) => {
                            heartbeat_state.record_activity();
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(?frame, "Server sent close frame");
                            return Err(RealtimeClientError::ConnectionClosed);
                        }
                        Some(Ok(_)) => {
                            heartbeat_state.record_activity();
                        }
                        Some(Err(e)) => {
                            return Err(e.into());
                        }
                        None => {
                            tracing::info!("WebSocket stream ended");
                            return Err(RealtimeClientError::ConnectionClosed);
                        }
                    }
                }
            }
        }
    }

    /// Decode a text frame and dispatch its messages. Malformed frames are
    /// skipped.
    fn handle_text_message(&self, text: &str, auth: &mut AuthHandler) {
        match self.codec.decode(text) {
            Ok(messages) => {
                for message in messages {
                    self.context.apply_inbound(message, auth);
                }
            }
            Err(e) => {
                metrics::record_malformed_frame();
                tracing::warn!(error = %e, "Skipping malformed frame");
            }
        }
    }

    /// Send `authenticate` if a credential is present.
    async fn authenticate<W>(
        &self,
        write: &mut W,
        auth: &mut AuthHandler,
    ) -> Result<(), RealtimeClientError>
    where
        W: SinkExt<Message> + Unpin,
        W::Error: std::fmt::Display,
    {
        let Some(token) = self.context.credential() else {
            tracing::debug!("No session credential, streaming public data only");
            return Ok(());
        };

        let request = auth.begin(&token);
        self.send(write, &request).await
    }

    /// Bring the server-side subscription in line with the desired set.
    async fn reconcile<W>(
        &self,
        write: &mut W,
        wire: &mut WireSubscriptions,
    ) -> Result<(), RealtimeClientError>
    where
        W: SinkExt<Message> + Unpin,
        W::Error: std::fmt::Display,
    {
        let desired = self.context.registry().desired_symbols();
        metrics::set_desired_symbols(desired.len());

        for request in wire.reconcile(&desired) {
            self.send(write, &request).await?;
        }
        Ok(())
    }

    async fn send<W>(&self, write: &mut W, message: &ClientMessage) -> Result<(), RealtimeClientError>
    where
        W: SinkExt<Message> + Unpin,
        W::Error: std::fmt::Display,
    {
        let json = self.codec.encode(message)?;
        write
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| RealtimeClientError::Send(e.to_string()))?;

        metrics::record_message_sent(message.message_type());
        tracing::debug!(?message, "Sent request");
        Ok(())
    }
}
