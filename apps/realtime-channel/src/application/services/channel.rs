//! Realtime Channel Service
//!
//! The process-wide handle consumers use to reach the realtime endpoint.
//! It is constructed once and shared by `Arc`; nothing else touches the
//! transport.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::Notifier;
use crate::domain::connection::ConnectionState;
use crate::domain::event::{ChannelEvent, ListenerCategory};
use crate::domain::quote::{PriceBook, PriceQuote, Symbol};
use crate::domain::subscription::{ConsumerId, SubscriptionChanges, SubscriptionStats};
use crate::infrastructure::config::ChannelConfig;
use crate::infrastructure::listeners::{ListenerHandle, ListenerStats};
use crate::infrastructure::realtime::{
    ChannelContext, ClientCommand, RealtimeClient, SessionToken,
};

struct Running {
    cancel: CancellationToken,
    commands: mpsc::UnboundedSender<ClientCommand>,
    task: JoinHandle<()>,
}

/// Handle to the single realtime connection.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use realtime_channel::application::services::RealtimeChannel;
/// use realtime_channel::domain::event::ListenerCategory;
/// use realtime_channel::infrastructure::config::ChannelConfig;
/// use realtime_channel::infrastructure::notify::TracingNotifier;
///
/// # async fn example() {
/// let channel = Arc::new(RealtimeChannel::new(
///     ChannelConfig::new("wss://rt.example.com/ws"),
///     Arc::new(TracingNotifier),
/// ));
///
/// let ticker = channel.register_consumer();
/// let _ = channel.subscribe(ticker, &["BTC-USD", "EURUSD"]);
/// let _prices = channel.add_listener(ListenerCategory::Price, |event| {
///     println!("{event:?}");
/// });
///
/// channel.start();
/// // ...
/// channel.stop().await;
/// # }
/// ```
pub struct RealtimeChannel {
    config: ChannelConfig,
    context: Arc<ChannelContext>,
    running: Mutex<Option<Running>>,
    next_consumer: AtomicU64,
}

impl std::fmt::Debug for RealtimeChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeChannel")
            .field("url", &self.config.url)
            .field("context", &self.context)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl RealtimeChannel {
    /// Create a stopped channel. The configured auth token becomes the
    /// initial session credential.
    #[must_use]
    pub fn new(config: ChannelConfig, notifier: Arc<dyn Notifier>) -> Self {
        let context = Arc::new(ChannelContext::new(notifier, config.auth_token.clone()));
        Self {
            config,
            context,
            running: Mutex::new(None),
            next_consumer: AtomicU64::new(1),
        }
    }

    /// The configuration this channel was built with.
    #[must_use]
    pub const fn config(&self) -> &ChannelConfig {
        &self.config
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Start the connection task.
    ///
    /// A no-op while a task is alive (connecting, connected, or waiting to
    /// retry). After the reconnect budget is spent, calling this again
    /// starts a fresh task with a fresh budget.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut running = self.running.lock();
        if running.as_ref().is_some_and(|r| !r.task.is_finished()) {
            tracing::debug!("Realtime channel already running");
            return;
        }

        let cancel = CancellationToken::new();
        let (commands, command_rx) = mpsc::unbounded_channel();
        let client = RealtimeClient::new(&self.config, Arc::clone(&self.context), cancel.clone());

        self.context.set_state(ConnectionState::Connecting);
        let task = tokio::spawn(async move {
            if let Err(e) = client.run(command_rx).await {
                tracing::error!(error = %e, "Realtime connection task stopped");
            }
        });

        *running = Some(Running {
            cancel,
            commands,
            task,
        });
    }

    /// Stop the connection task, including any pending reconnect delay.
    ///
    /// Waits for the task to finish. The state is `Disconnected` afterwards.
    pub async fn stop(&self) {
        let running = self.running.lock().take();

        if let Some(Running { cancel, task, .. }) = running {
            cancel.cancel();
            if let Err(e) = task.await
                && e.is_panic()
            {
                tracing::error!(error = %e, "Realtime connection task panicked");
            }
            tracing::info!("Realtime channel stopped");
        }

        self.context.set_state(ConnectionState::Disconnected);
    }

    /// Whether a connection task is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|r| !r.task.is_finished())
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.context.state()
    }

    /// Receiver that observes every state change.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.context.watch_state()
    }

    /// Replace the session credential.
    ///
    /// With a token and a live connection this triggers a fresh
    /// authentication attempt. `None` takes effect on the next connection.
    pub fn set_credential(&self, credential: Option<SessionToken>) {
        let authenticate = credential.is_some();
        self.context.set_credential(credential);
        if authenticate {
            self.send_command(ClientCommand::Authenticate);
        }
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Allocate an identifier for a new consumer (a view, a widget, a job).
    pub fn register_consumer(&self) -> ConsumerId {
        self.next_consumer.fetch_add(1, Ordering::Relaxed)
    }

    /// Ask for price updates on `symbols`.
    ///
    /// Safe to call before `start()` and to repeat; symbols already wanted
    /// by anyone cause no network traffic.
    pub fn subscribe<S: AsRef<str>>(&self, consumer: ConsumerId, symbols: &[S]) -> SubscriptionChanges {
        let changes = self.context.registry().subscribe(consumer, symbols);
        if !changes.is_empty() {
            self.send_command(ClientCommand::Reconcile);
        }
        changes
    }

    /// Release `symbols` for a consumer. The server stops streaming a symbol
    /// only once no consumer wants it.
    pub fn unsubscribe<S: AsRef<str>>(
        &self,
        consumer: ConsumerId,
        symbols: &[S],
    ) -> SubscriptionChanges {
        let changes = self.context.registry().unsubscribe(consumer, symbols);
        if !changes.is_empty() {
            self.send_command(ClientCommand::Reconcile);
        }
        changes
    }

    /// Release every symbol a consumer holds.
    pub fn release_consumer(&self, consumer: ConsumerId) -> SubscriptionChanges {
        let changes = self.context.registry().release_consumer(consumer);
        if !changes.is_empty() {
            self.send_command(ClientCommand::Reconcile);
        }
        changes
    }

    /// Symbols any consumer wants, sorted.
    #[must_use]
    pub fn desired_symbols(&self) -> Vec<Symbol> {
        self.context.registry().desired_symbols()
    }

    /// Subscription counts.
    #[must_use]
    pub fn subscription_stats(&self) -> SubscriptionStats {
        self.context.registry().stats()
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    /// Register a callback for one event category.
    #[must_use = "dropping the handle unregisters the listener"]
    pub fn add_listener<F>(&self, category: ListenerCategory, callback: F) -> ListenerHandle
    where
        F: Fn(&ChannelEvent) + Send + Sync + 'static,
    {
        self.context.listeners().add_listener(category, callback)
    }

    /// Listener counts per category.
    #[must_use]
    pub fn listener_stats(&self) -> ListenerStats {
        self.context.listeners().stats()
    }

    // =========================================================================
    // Prices
    // =========================================================================

    /// Latest known quote for a symbol.
    #[must_use]
    pub fn price(&self, symbol: &str) -> Option<PriceQuote> {
        self.context.prices().get(symbol)
    }

    /// All known quotes, sorted by symbol.
    #[must_use]
    pub fn prices(&self) -> Vec<PriceQuote> {
        self.context.prices().snapshot()
    }

    /// The underlying price book.
    #[must_use]
    pub fn price_book(&self) -> &Arc<PriceBook> {
        self.context.prices()
    }

    fn send_command(&self, command: ClientCommand) {
        if let Some(running) = self.running.lock().as_ref() {
            // A closed receiver means the task ended; the next start() syncs.
            let _ = running.commands.send(command);
        }
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::MockNotifier;

    fn channel() -> RealtimeChannel {
        RealtimeChannel::new(
            ChannelConfig::new("ws://127.0.0.1:9/ws"),
            Arc::new(MockNotifier::new()),
        )
    }

    #[test]
    fn new_channel_is_idle() {
        let channel = channel();

        assert_eq!(channel.state(), ConnectionState::Disconnected);
        assert!(!channel.is_running());
        assert!(channel.prices().is_empty());
    }

    #[test]
    fn subscribe_before_start_is_recorded() {
        let channel = channel();
        let consumer = channel.register_consumer();

        let changes = channel.subscribe(consumer, &["btc-usd", "EURUSD"]);

        assert_eq!(changes.subscribe.len(), 2);
        assert_eq!(channel.desired_symbols(), vec!["BTC-USD", "EURUSD"]);
    }

    #[test]
    fn consumers_get_distinct_ids() {
        let channel = channel();

        let a = channel.register_consumer();
        let b = channel.register_consumer();

        assert_ne!(a, b);
    }

    #[test]
    fn release_consumer_drops_its_symbols() {
        let channel = channel();
        let a = channel.register_consumer();
        let b = channel.register_consumer();
        let _ = channel.subscribe(a, &["BTC-USD", "EURUSD"]);
        let _ = channel.subscribe(b, &["EURUSD"]);

        let changes = channel.release_consumer(a);

        assert!(changes.unsubscribe.contains("BTC-USD"));
        assert_eq!(channel.desired_symbols(), vec!["EURUSD"]);
    }

    #[test]
    fn listener_registration_counts() {
        let channel = channel();

        let handle = channel.add_listener(ListenerCategory::Trade, |_| {});
        assert_eq!(channel.listener_stats().trade, 1);

        handle.unregister();
        assert_eq!(channel.listener_stats().trade, 0);
    }

    #[tokio::test]
    async fn stop_without_start_is_harmless() {
        let channel = channel();

        channel.stop().await;

        assert_eq!(channel.state(), ConnectionState::Disconnected);
    }
}
