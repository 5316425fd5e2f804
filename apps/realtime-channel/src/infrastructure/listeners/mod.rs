//! Listener Fan-out
//!
//! Delivers channel events to any number of independent listeners without
//! the connection manager knowing who they are.
//!
//! # Architecture
//!
//! The `ListenerHub` keeps one listener set per `ListenerCategory`:
//! - Price ticks
//! - Trade updates
//! - Challenge status changes and warnings
//!
//! Registration returns a `ListenerHandle`. Unregistering (explicitly or by
//! dropping the handle) removes exactly that registration. Dispatch works on
//! a snapshot of the set, so an unregistration is effective from the next
//! dispatch on. A panicking listener is isolated: it is logged and counted,
//! and the remaining listeners still run.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::domain::event::{ChannelEvent, ListenerCategory};
use crate::infrastructure::metrics;

// =============================================================================
// Types
// =============================================================================

/// Identifier of a single registration.
pub type ListenerId = u64;

/// A registered callback.
pub type Listener = Arc<dyn Fn(&ChannelEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    listeners: RwLock<HashMap<ListenerCategory, HashMap<ListenerId, Listener>>>,
}

impl Registry {
    fn remove(&self, category: ListenerCategory, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let Some(set) = listeners.get_mut(&category) else {
            return false;
        };
        let removed = set.remove(&id).is_some();
        if set.is_empty() {
            listeners.remove(&category);
        }
        removed
    }
}

// =============================================================================
// Listener Hub
// =============================================================================

/// Category-keyed registry of event listeners.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// use realtime_channel::domain::event::{ChannelEvent, ListenerCategory};
/// use realtime_channel::infrastructure::listeners::ListenerHub;
///
/// let hub = ListenerHub::new();
/// let seen = Arc::new(AtomicUsize::new(0));
///
/// let counter = Arc::clone(&seen);
/// let handle = hub.add_listener(ListenerCategory::Trade, move |_| {
///     counter.fetch_add(1, Ordering::SeqCst);
/// });
///
/// hub.dispatch(&ChannelEvent::Trade { payload: serde_json::json!({"id": 7}) });
/// handle.unregister();
/// hub.dispatch(&ChannelEvent::Trade { payload: serde_json::json!({"id": 8}) });
///
/// assert_eq!(seen.load(Ordering::SeqCst), 1);
/// ```
#[derive(Default)]
pub struct ListenerHub {
    registry: Arc<Registry>,
}

impl std::fmt::Debug for ListenerHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerHub")
            .field("stats", &self.stats())
            .finish()
    }
}

impl ListenerHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for one category.
    ///
    /// The registration lives until the returned handle is unregistered or
    /// dropped; call [`ListenerHandle::detach`] to keep it for the life of
    /// the hub.
    #[must_use = "dropping the handle unregisters the listener"]
    pub fn add_listener<F>(&self, category: ListenerCategory, callback: F) -> ListenerHandle
    where
        F: Fn(&ChannelEvent) + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);

        self.registry
            .listeners
            .write()
            .entry(category)
            .or_default()
            .insert(id, Arc::new(callback));

        tracing::trace!(category = category.as_str(), id, "Listener registered");

        ListenerHandle {
            registry: Arc::downgrade(&self.registry),
            category,
            id,
            detached: false,
        }
    }

    /// Deliver an event to every listener of its category.
    ///
    /// Returns the number of listeners that completed without panicking.
    pub fn dispatch(&self, event: &ChannelEvent) -> usize {
        let category = event.category();

        let snapshot: Vec<(ListenerId, Listener)> = self
            .registry
            .listeners
            .read()
            .get(&category)
            .map(|set| set.iter().map(|(id, l)| (*id, Arc::clone(l))).collect())
            .unwrap_or_default();

        let mut delivered = 0;
        for (id, listener) in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_ok() {
                delivered += 1;
            } else {
                tracing::error!(
                    category = category.as_str(),
                    listener_id = id,
                    "Listener panicked during dispatch"
                );
                metrics::record_listener_panic(category);
            }
        }

        delivered
    }

    /// Number of listeners registered for a category.
    #[must_use]
    pub fn listener_count(&self, category: ListenerCategory) -> usize {
        self.registry
            .listeners
            .read()
            .get(&category)
            .map_or(0, HashMap::len)
    }

    /// Listener counts for every category.
    #[must_use]
    pub fn stats(&self) -> ListenerStats {
        ListenerStats {
            price: self.listener_count(ListenerCategory::Price),
            trade: self.listener_count(ListenerCategory::Trade),
            challenge: self.listener_count(ListenerCategory::Challenge),
        }
    }
}

// =============================================================================
// Listener Handle
// =============================================================================

/// De-registration capability returned by [`ListenerHub::add_listener`].
///
/// Dropping the handle unregisters the listener.
#[derive(Debug)]
pub struct ListenerHandle {
    registry: Weak<Registry>,
    category: ListenerCategory,
    id: ListenerId,
    detached: bool,
}

impl ListenerHandle {
    /// Remove this registration. Safe to call more than once.
    ///
    /// Returns `true` only for the call that actually removed it.
    pub fn unregister(&self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let removed = registry.remove(self.category, self.id);
        if removed {
            tracing::trace!(category = self.category.as_str(), id = self.id, "Listener removed");
        }
        removed
    }

    /// Keep the registration for the life of the hub.
    pub fn detach(mut self) {
        self.detached = true;
    }

    /// The category this listener is registered for.
    #[must_use]
    pub const fn category(&self) -> ListenerCategory {
        self.category
    }

    /// The registration identifier.
    #[must_use]
    pub const fn id(&self) -> ListenerId {
        self.id
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if !self.detached {
            self.unregister();
        }
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Listener counts per category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ListenerStats {
    /// Price listeners.
    pub price: usize,
    /// Trade listeners.
    pub trade: usize,
    /// Challenge listeners.
    pub challenge: usize,
}

impl ListenerStats {
    /// Total listeners across categories.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.price + self.trade + self.challenge
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::event::PriceEvent;
    use crate::domain::quote::PriceQuote;

    fn price_event() -> ChannelEvent {
        ChannelEvent::Price(PriceEvent::Update(PriceQuote::new("BTC-USD", Decimal::ONE_HUNDRED)))
    }

    fn trade_event() -> ChannelEvent {
        ChannelEvent::Trade {
            payload: serde_json::json!({"trade_id": 1, "status": "closed"}),
        }
    }

    fn counting_listener(counter: &Arc<AtomicUsize>) -> impl Fn(&ChannelEvent) + Send + Sync + 'static {
        let counter = Arc::clone(counter);
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn dispatch_reaches_all_listeners_in_category() {
        let hub = ListenerHub::new();
        let count = Arc::new(AtomicUsize::new(0));

        let _a = hub.add_listener(ListenerCategory::Price, counting_listener(&count));
        let _b = hub.add_listener(ListenerCategory::Price, counting_listener(&count));

        assert_eq!(hub.dispatch(&price_event()), 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn categories_are_independent() {
        let hub = ListenerHub::new();
        let prices = Arc::new(AtomicUsize::new(0));
        let trades = Arc::new(AtomicUsize::new(0));

        let _p = hub.add_listener(ListenerCategory::Price, counting_listener(&prices));
        let _t = hub.add_listener(ListenerCategory::Trade, counting_listener(&trades));

        hub.dispatch(&trade_event());

        assert_eq!(prices.load(Ordering::SeqCst), 0);
        assert_eq!(trades.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unregistered_listener_not_invoked() {
        let hub = ListenerHub::new();
        let count = Arc::new(AtomicUsize::new(0));

        let handle = hub.add_listener(ListenerCategory::Price, counting_listener(&count));
        hub.dispatch(&price_event());
        handle.unregister();
        hub.dispatch(&price_event());
        hub.dispatch(&price_event());

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unregister_is_idempotent() {
        let hub = ListenerHub::new();
        let handle = hub.add_listener(ListenerCategory::Trade, |_| {});

        assert!(handle.unregister());
        assert!(!handle.unregister());
        assert!(!handle.unregister());
        assert_eq!(hub.listener_count(ListenerCategory::Trade), 0);
    }

    #[test]
    fn unregister_removes_only_that_registration() {
        let hub = ListenerHub::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let a = hub.add_listener(ListenerCategory::Price, counting_listener(&first));
        let _b = hub.add_listener(ListenerCategory::Price, counting_listener(&second));

        a.unregister();
        hub.dispatch(&price_event());

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_handle_unregisters() {
        let hub = ListenerHub::new();
        let count = Arc::new(AtomicUsize::new(0));

        {
            let _handle = hub.add_listener(ListenerCategory::Price, counting_listener(&count));
            assert_eq!(hub.listener_count(ListenerCategory::Price), 1);
        }

        hub.dispatch(&price_event());
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(hub.listener_count(ListenerCategory::Price), 0);
    }

    #[test]
    fn detached_listener_survives_handle() {
        let hub = ListenerHub::new();
        let count = Arc::new(AtomicUsize::new(0));

        hub.add_listener(ListenerCategory::Price, counting_listener(&count))
            .detach();
        hub.dispatch(&price_event());

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_listener_is_isolated() {
        let hub = ListenerHub::new();
        let count = Arc::new(AtomicUsize::new(0));

        let _bad = hub.add_listener(ListenerCategory::Price, |_| panic!("render failed"));
        let _good = hub.add_listener(ListenerCategory::Price, counting_listener(&count));

        let delivered = hub.dispatch(&price_event());

        assert_eq!(delivered, 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listener_may_unregister_itself_during_dispatch() {
        let hub = ListenerHub::new();
        let count = Arc::new(AtomicUsize::new(0));
        let slot: Arc<parking_lot::Mutex<Option<ListenerHandle>>> =
            Arc::new(parking_lot::Mutex::new(None));

        let inner_slot = Arc::clone(&slot);
        let inner_count = Arc::clone(&count);
        let handle = hub.add_listener(ListenerCategory::Price, move |_| {
            inner_count.fetch_add(1, Ordering::SeqCst);
            if let Some(handle) = inner_slot.lock().as_ref() {
                handle.unregister();
            }
        });
        *slot.lock() = Some(handle);

        hub.dispatch(&price_event());
        hub.dispatch(&price_event());

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handle_outliving_hub_is_harmless() {
        let hub = ListenerHub::new();
        let handle = hub.add_listener(ListenerCategory::Challenge, |_| {});
        drop(hub);

        assert!(!handle.unregister());
    }

    #[test]
    fn stats_count_per_category() {
        let hub = ListenerHub::new();
        let _a = hub.add_listener(ListenerCategory::Price, |_| {});
        let _b = hub.add_listener(ListenerCategory::Price, |_| {});
        let _c = hub.add_listener(ListenerCategory::Challenge, |_| {});

        let stats = hub.stats();
        assert_eq!(stats.price, 2);
        assert_eq!(stats.trade, 0);
        assert_eq!(stats.challenge, 1);
        assert_eq!(stats.total(), 3);
    }
}
