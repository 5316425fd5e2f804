//! Channel Context
//!
//! State shared between the channel handle and its connection task: the
//! lifecycle state, the subscription registry, the listener hub, the price
//! book, the notifier and the session credential.
//!
//! Inbound dispatch lives here rather than in the socket loop so that it
//! can be exercised without a transport.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;

use super::auth::{AuthError, AuthHandler, SessionToken};
use super::messages::InboundMessage;
use crate::application::ports::Notifier;
use crate::domain::challenge::{notification_for_status, notification_for_warning};
use crate::domain::connection::ConnectionState;
use crate::domain::event::{ChallengeEvent, ChannelEvent, PriceEvent};
use crate::domain::quote::PriceBook;
use crate::domain::subscription::SubscriptionRegistry;
use crate::infrastructure::listeners::ListenerHub;
use crate::infrastructure::metrics;

/// Shared channel state.
pub struct ChannelContext {
    state_tx: watch::Sender<ConnectionState>,
    registry: Arc<SubscriptionRegistry>,
    listeners: Arc<ListenerHub>,
    prices: Arc<PriceBook>,
    notifier: Arc<dyn Notifier>,
    credential: RwLock<Option<SessionToken>>,
}

impl std::fmt::Debug for ChannelContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelContext")
            .field("state", &self.state())
            .field("registry", &self.registry)
            .field("listeners", &self.listeners)
            .field("prices", &self.prices.len())
            .field("has_credential", &self.credential.read().is_some())
            .finish_non_exhaustive()
    }
}

impl ChannelContext {
    /// Create an empty context in the `Disconnected` state.
    #[must_use]
    pub fn new(notifier: Arc<dyn Notifier>, credential: Option<SessionToken>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            state_tx,
            registry: Arc::new(SubscriptionRegistry::new()),
            listeners: Arc::new(ListenerHub::new()),
            prices: Arc::new(PriceBook::new()),
            notifier,
            credential: RwLock::new(credential),
        }
    }

    // =========================================================================
    // Connection State
    // =========================================================================

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Receiver that observes every state change.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Move to a new state. Only the connection task and `stop` call this.
    pub fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            metrics::set_connection_state(state);
            tracing::info!(from = %previous, to = %state, "Connection state changed");
        }
    }

    // =========================================================================
    // Shared Components
    // =========================================================================

    /// Subscription registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Listener hub.
    #[must_use]
    pub const fn listeners(&self) -> &Arc<ListenerHub> {
        &self.listeners
    }

    /// Latest price per symbol.
    #[must_use]
    pub const fn prices(&self) -> &Arc<PriceBook> {
        &self.prices
    }

    /// Current session credential.
    #[must_use]
    pub fn credential(&self) -> Option<SessionToken> {
        self.credential.read().clone()
    }

    /// Replace the session credential.
    pub fn set_credential(&self, credential: Option<SessionToken>) {
        *self.credential.write() = credential;
    }

    /// Empty the price book and tell price listeners their baselines are stale.
    pub fn clear_prices(&self) {
        tracing::debug!(cleared = self.prices.len(), "Clearing stale prices");
        self.prices.clear();
        self.listeners
            .dispatch(&ChannelEvent::Price(PriceEvent::Cleared));
    }

    // =========================================================================
    // Inbound Dispatch
    // =========================================================================

    /// Apply one inbound message: update state and the price book, raise
    /// notifications, and fan the event out to listeners.
    pub fn apply_inbound(&self, message: InboundMessage, auth: &mut AuthHandler) {
        metrics::record_message_received(message.message_type());

        match message {
            InboundMessage::Connected(greeting) => {
                tracing::debug!(message = ?greeting.message, "Server greeting received");
            }
            InboundMessage::Authenticated(ack) => {
                if let Err(AuthError::Unexpected) = auth.on_authenticated() {
                    tracing::debug!("Authentication acknowledged without a pending request");
                }
                if self.state().is_connected() {
                    self.set_state(ConnectionState::Authenticated);
                }
                tracing::info!(user_id = ?ack.user_id, "Realtime session authenticated");
            }
            InboundMessage::AuthError(rejection) => {
                let error = auth.on_auth_error(&rejection);
                tracing::warn!(error = %error, "Realtime authentication rejected");
                if self.state().is_authenticated() {
                    self.set_state(ConnectionState::Connected);
                }
            }
            InboundMessage::Subscribed(ack) => {
                tracing::debug!(symbols = ?ack.symbols, "Subscription confirmed");
            }
            InboundMessage::PriceUpdate(update) => {
                let Some(quote) = update.into_quote() else {
                    tracing::warn!("Skipping price update with blank symbol");
                    return;
                };
                self.prices.apply(quote.clone());
                self.listeners
                    .dispatch(&ChannelEvent::Price(PriceEvent::Update(quote)));
            }
            InboundMessage::PricesBatch(batch) => {
                let timestamp = batch.timestamp;
                let quotes = batch.into_quotes();
                if quotes.is_empty() {
                    return;
                }
                for quote in &quotes {
                    self.prices.apply(quote.clone());
                }
                self.listeners
                    .dispatch(&ChannelEvent::Price(PriceEvent::Batch { quotes, timestamp }));
            }
            InboundMessage::TradeUpdate(payload) => {
                self.listeners.dispatch(&ChannelEvent::Trade { payload });
            }
            InboundMessage::ChallengeStatus(update) => {
                if let Some(notification) = notification_for_status(&update) {
                    self.notifier.notify(notification);
                }
                self.listeners
                    .dispatch(&ChannelEvent::Challenge(ChallengeEvent::Status(update)));
            }
            InboundMessage::ChallengeWarning(warning) => {
                self.notifier.notify(notification_for_warning(&warning));
                self.listeners
                    .dispatch(&ChannelEvent::Challenge(ChallengeEvent::Warning(warning)));
            }
            InboundMessage::Unknown(kind) => {
                tracing::trace!(kind = %kind, "Ignoring unknown message type");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rust_decimal::Decimal;

    use super::*;
    use crate::application::ports::MockNotifier;
    use crate::domain::challenge::NotificationLevel;
    use crate::domain::event::ListenerCategory;
    use crate::infrastructure::realtime::codec::JsonCodec;

    fn context_with(notifier: MockNotifier) -> ChannelContext {
        ChannelContext::new(Arc::new(notifier), None)
    }

    fn apply(context: &ChannelContext, auth: &mut AuthHandler, frame: &str) {
        for message in JsonCodec::new().decode(frame).unwrap() {
            context.apply_inbound(message, auth);
        }
    }

    #[test]
    fn price_update_updates_book_and_dispatches() {
        let context = context_with(MockNotifier::new());
        let mut auth = AuthHandler::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let _handle = context
            .listeners()
            .add_listener(ListenerCategory::Price, move |event| {
                let quote = &event.as_price().unwrap().quotes()[0];
                assert_eq!(quote.symbol, "BTC-USD");
                counter.fetch_add(1, Ordering::SeqCst);
            });

        apply(
            &context,
            &mut auth,
            r#"{"type":"price_update","data":{"symbol":"btc-usd","price":45230.00}}"#,
        );

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(
            context.prices().get("BTC-USD").map(|q| q.price),
            Some(Decimal::from(45230))
        );
    }

    #[test]
    fn batch_updates_every_symbol() {
        let context = context_with(MockNotifier::new());
        let mut auth = AuthHandler::new();

        apply(
            &context,
            &mut auth,
            r#"{"type":"prices_batch","data":{"prices":{"BTC-USD":{"price":45230},"EURUSD":{"price":"1.0842"}}}}"#,
        );

        assert_eq!(context.prices().len(), 2);
    }

    #[test]
    fn failed_challenge_notifies_once_and_forwards_payload() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .withf(|n| n.level == NotificationLevel::Error && n.title == "Challenge failed")
            .times(1)
            .return_const(());
        let context = context_with(notifier);
        let mut auth = AuthHandler::new();

        let payloads = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&payloads);
        let _handle = context
            .listeners()
            .add_listener(ListenerCategory::Challenge, move |event| {
                sink.lock().push(event.clone());
            });

        apply(
            &context,
            &mut auth,
            r#"{"type":"challenge_status","data":{"challenge":{"id":9,"status":"failed","failure_reason":"max_daily_loss"}}}"#,
        );

        let payloads = payloads.lock();
        assert_eq!(payloads.len(), 1);
        let Some(ChallengeEvent::Status(update)) = payloads[0].as_challenge() else {
            panic!("expected status event");
        };
        assert_eq!(update.challenge.extra.get("id"), Some(&serde_json::json!(9)));
    }

    #[test]
    fn unrecognised_challenge_payloads_reach_listeners_intact() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .withf(|n| n.level == NotificationLevel::Warning && n.title == "Risk warning")
            .times(1)
            .return_const(());
        let context = context_with(notifier);
        let mut auth = AuthHandler::new();

        let payloads = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&payloads);
        let _handle = context
            .listeners()
            .add_listener(ListenerCategory::Challenge, move |event| {
                sink.lock().push(serde_json::to_value(event.as_challenge()).unwrap());
            });

        apply(
            &context,
            &mut auth,
            r#"{"type":"challenge_status","data":{"account_id":42,"challenge":{"status":"pending_review","id":9}}}"#,
        );
        apply(
            &context,
            &mut auth,
            r#"{"type":"challenge_warning","data":{"type":"margin_call","message":"Margin below 50%","account_id":42}}"#,
        );

        let payloads = payloads.lock();
        assert_eq!(payloads.len(), 2);
        assert_eq!(
            payloads[0],
            serde_json::json!({
                "kind": "status",
                "account_id": 42,
                "challenge": {"status": "pending_review", "id": 9}
            })
        );
        assert_eq!(payloads[1]["kind"], "warning");
        assert_eq!(payloads[1]["type"], "margin_call");
        assert_eq!(payloads[1]["message"], "Margin below 50%");
        assert_eq!(payloads[1]["account_id"], 42);
    }

    #[test]
    fn active_challenge_does_not_notify() {
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().times(0);
        let context = context_with(notifier);
        let mut auth = AuthHandler::new();

        apply(
            &context,
            &mut auth,
            r#"{"type":"challenge_status","data":{"challenge":{"status":"active"}}}"#,
        );
    }

    #[test]
    fn warning_notifies() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .withf(|n| n.level == NotificationLevel::Warning)
            .times(1)
            .return_const(());
        let context = context_with(notifier);
        let mut auth = AuthHandler::new();

        apply(
            &context,
            &mut auth,
            r#"{"type":"challenge_warning","data":{"type":"total_loss","current":900,"limit":1000}}"#,
        );
    }

    #[test]
    fn clear_prices_empties_book_and_signals_listeners() {
        let context = context_with(MockNotifier::new());
        let mut auth = AuthHandler::new();
        let events = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let _handle = context
            .listeners()
            .add_listener(ListenerCategory::Price, move |event| {
                sink.lock().push(event.clone());
            });
        apply(
            &context,
            &mut auth,
            r#"{"type":"price_update","data":{"symbol":"BTC-USD","price":45230}}"#,
        );

        context.clear_prices();

        assert!(context.prices().is_empty());
        let events = events.lock();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], ChannelEvent::Price(PriceEvent::Cleared));
    }

    #[test]
    fn authenticated_only_when_connected() {
        let context = context_with(MockNotifier::new());
        let mut auth = AuthHandler::new();

        apply(&context, &mut auth, r#"{"type":"authenticated","data":{}}"#);
        assert_eq!(context.state(), ConnectionState::Disconnected);

        context.set_state(ConnectionState::Connected);
        apply(&context, &mut auth, r#"{"type":"authenticated","data":{"user_id":7}}"#);
        assert_eq!(context.state(), ConnectionState::Authenticated);
    }

    #[test]
    fn auth_error_keeps_connected() {
        let context = context_with(MockNotifier::new());
        let mut auth = AuthHandler::new();
        context.set_state(ConnectionState::Connected);

        apply(
            &context,
            &mut auth,
            r#"{"type":"auth_error","data":{"message":"Invalid token"}}"#,
        );

        assert_eq!(context.state(), ConnectionState::Connected);
    }

    #[test]
    fn unknown_message_is_ignored() {
        let context = context_with(MockNotifier::new());
        let mut auth = AuthHandler::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = ListenerCategory::all()
            .iter()
            .map(|category| {
                let counter = Arc::clone(&seen);
                context.listeners().add_listener(*category, move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        apply(&context, &mut auth, r#"{"type":"maintenance_notice","data":{}}"#);

        assert_eq!(seen.load(Ordering::SeqCst), 0);
        drop(handles);
    }

    #[test]
    fn state_changes_are_observable() {
        let context = context_with(MockNotifier::new());
        let mut rx = context.watch_state();

        context.set_state(ConnectionState::Connecting);

        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), ConnectionState::Connecting);
    }
}
