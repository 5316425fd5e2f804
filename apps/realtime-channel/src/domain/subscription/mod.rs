//! Price Subscription Registry
//!
//! Tracks which symbols each consumer (a view, a widget, a background task)
//! currently needs, and derives the client-wide desired set that the server
//! should stream.
//!
//! # Design
//!
//! Symbols are reference counted across consumers:
//! - A symbol enters the desired set when its first consumer subscribes
//! - A symbol leaves the desired set only when its last consumer releases it
//!
//! One consumer releasing a symbol therefore never starves another consumer
//! that still needs it, and repeated subscribes from the same consumer are
//! no-ops.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;

use super::quote::{Symbol, normalize_symbols};

// =============================================================================
// Types
// =============================================================================

/// Unique identifier for a subscription consumer.
pub type ConsumerId = u64;

// =============================================================================
// Subscription Changes
// =============================================================================

/// Changes to the desired (server-side) subscription set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionChanges {
    /// Symbols that entered the desired set.
    pub subscribe: HashSet<Symbol>,
    /// Symbols that left the desired set.
    pub unsubscribe: HashSet<Symbol>,
}

impl SubscriptionChanges {
    /// Check if there are any changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribe.is_empty() && self.unsubscribe.is_empty()
    }

    /// Create changes with only subscribes.
    #[must_use]
    pub fn subscribe_only(symbols: impl IntoIterator<Item = Symbol>) -> Self {
        Self {
            subscribe: symbols.into_iter().collect(),
            unsubscribe: HashSet::new(),
        }
    }

    /// Create changes with only unsubscribes.
    #[must_use]
    pub fn unsubscribe_only(symbols: impl IntoIterator<Item = Symbol>) -> Self {
        Self {
            subscribe: HashSet::new(),
            unsubscribe: symbols.into_iter().collect(),
        }
    }
}

// =============================================================================
// Registry State
// =============================================================================

#[derive(Debug, Default)]
struct RegistryState {
    /// Map from consumer ID to the symbols it holds.
    consumer_symbols: HashMap<ConsumerId, HashSet<Symbol>>,
    /// Map from symbol to the number of consumers holding it.
    symbol_refcount: HashMap<Symbol, usize>,
}

impl RegistryState {
    /// Returns symbols whose refcount went 0→1.
    fn add(&mut self, consumer: ConsumerId, symbols: &[Symbol]) -> Vec<Symbol> {
        let consumer_set = self.consumer_symbols.entry(consumer).or_default();
        let mut added = Vec::new();

        for symbol in symbols {
            if !consumer_set.insert(symbol.clone()) {
                continue;
            }

            let refcount = self.symbol_refcount.entry(symbol.clone()).or_insert(0);
            *refcount += 1;

            if *refcount == 1 {
                added.push(symbol.clone());
            }
        }

        if consumer_set.is_empty() {
            self.consumer_symbols.remove(&consumer);
        }

        added
    }

    /// Returns symbols whose refcount went 1→0.
    fn remove(&mut self, consumer: ConsumerId, symbols: &[Symbol]) -> Vec<Symbol> {
        let Some(consumer_set) = self.consumer_symbols.get_mut(&consumer) else {
            return vec![];
        };

        let released: Vec<Symbol> = symbols
            .iter()
            .filter(|symbol| consumer_set.remove(*symbol))
            .cloned()
            .collect();

        if consumer_set.is_empty() {
            self.consumer_symbols.remove(&consumer);
        }

        self.release(released)
    }

    fn remove_consumer(&mut self, consumer: ConsumerId) -> Vec<Symbol> {
        let Some(consumer_set) = self.consumer_symbols.remove(&consumer) else {
            return vec![];
        };

        self.release(consumer_set)
    }

    fn release(&mut self, symbols: impl IntoIterator<Item = Symbol>) -> Vec<Symbol> {
        let mut removed = Vec::new();

        for symbol in symbols {
            if let Some(refcount) = self.symbol_refcount.get_mut(&symbol) {
                *refcount = refcount.saturating_sub(1);

                if *refcount == 0 {
                    self.symbol_refcount.remove(&symbol);
                    removed.push(symbol);
                }
            }
        }

        removed
    }
}

// =============================================================================
// Subscription Registry
// =============================================================================

/// Reference-counted registry of desired price symbols.
///
/// # Example
///
/// ```rust
/// use realtime_channel::domain::subscription::SubscriptionRegistry;
///
/// let registry = SubscriptionRegistry::new();
///
/// // First view needs BTC-USD: the server must start streaming it
/// let changes = registry.subscribe(1, &["btc-usd"]);
/// assert!(changes.subscribe.contains("BTC-USD"));
///
/// // Second view needs it too: nothing new to request
/// let changes = registry.subscribe(2, &["BTC-USD"]);
/// assert!(changes.is_empty());
///
/// // First view unmounts: still needed by the second
/// let changes = registry.unsubscribe(1, &["BTC-USD"]);
/// assert!(changes.is_empty());
///
/// // Second view unmounts: the server can stop streaming it
/// let changes = registry.unsubscribe(2, &["BTC-USD"]);
/// assert!(changes.unsubscribe.contains("BTC-USD"));
/// ```
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    state: RwLock<RegistryState>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add symbols for a consumer.
    ///
    /// Symbols are normalised (trimmed, uppercased); blank entries are
    /// ignored. Returns the symbols that entered the desired set.
    pub fn subscribe<S: AsRef<str>>(
        &self,
        consumer: ConsumerId,
        symbols: &[S],
    ) -> SubscriptionChanges {
        let symbols = normalize_symbols(symbols);
        let added = self.state.write().add(consumer, &symbols);

        SubscriptionChanges::subscribe_only(added)
    }

    /// Remove symbols for a consumer.
    ///
    /// Returns the symbols that left the desired set.
    pub fn unsubscribe<S: AsRef<str>>(
        &self,
        consumer: ConsumerId,
        symbols: &[S],
    ) -> SubscriptionChanges {
        let symbols = normalize_symbols(symbols);
        let removed = self.state.write().remove(consumer, &symbols);

        SubscriptionChanges::unsubscribe_only(removed)
    }

    /// Drop every symbol held by a consumer.
    pub fn release_consumer(&self, consumer: ConsumerId) -> SubscriptionChanges {
        let removed = self.state.write().remove_consumer(consumer);

        SubscriptionChanges::unsubscribe_only(removed)
    }

    /// The client-wide desired set, sorted.
    #[must_use]
    pub fn desired_symbols(&self) -> Vec<Symbol> {
        let mut symbols: Vec<_> = self.state.read().symbol_refcount.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Whether any consumer currently needs the symbol.
    #[must_use]
    pub fn is_desired(&self, symbol: &str) -> bool {
        self.state
            .read()
            .symbol_refcount
            .contains_key(&symbol.trim().to_uppercase())
    }

    /// Symbols held by a specific consumer, sorted.
    #[must_use]
    pub fn consumer_symbols(&self, consumer: ConsumerId) -> Vec<Symbol> {
        let mut symbols: Vec<_> = self
            .state
            .read()
            .consumer_symbols
            .get(&consumer)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default();
        symbols.sort();
        symbols
    }

    /// Registry statistics.
    #[must_use]
    pub fn stats(&self) -> SubscriptionStats {
        let state = self.state.read();
        SubscriptionStats {
            symbol_count: state.symbol_refcount.len(),
            consumer_count: state.consumer_symbols.len(),
        }
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Subscription registry statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct SubscriptionStats {
    /// Number of distinct desired symbols.
    pub symbol_count: usize,
    /// Number of consumers holding at least one symbol.
    pub consumer_count: usize,
}

// =============================================================================
// Tests
// =============================================================================
