//! Price Flash Tracking
//!
//! Marks a symbol as briefly "flashing" up or down when a new quote moves
//! its price. Views poll `current()` to decide how to highlight a cell.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::time::Instant;

use crate::application::services::RealtimeChannel;
use crate::domain::event::{ListenerCategory, PriceEvent};
use crate::domain::quote::{FlashDirection, PriceQuote, Symbol, normalize_symbol};
use crate::infrastructure::listeners::ListenerHandle;

/// Default flash duration.
pub const DEFAULT_FLASH_WINDOW: Duration = Duration::from_millis(500);

#[derive(Debug)]
struct SymbolFlash {
    last_price: Decimal,
    active: Option<(FlashDirection, Instant)>,
}

/// Tracks the most recent price move per symbol.
#[derive(Debug)]
pub struct PriceFlashTracker {
    window: Duration,
    symbols: Mutex<HashMap<Symbol, SymbolFlash>>,
}

impl Default for PriceFlashTracker {
    fn default() -> Self {
        Self::new(DEFAULT_FLASH_WINDOW)
    }
}

impl PriceFlashTracker {
    /// Create a tracker whose flashes last `window`.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            symbols: Mutex::new(HashMap::new()),
        }
    }

    /// How long a flash stays active.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Record a quote. Returns the direction when the price moved.
    ///
    /// The first quote for a symbol only establishes a baseline. Quotes with
    /// a blank symbol are ignored.
    pub fn observe(&self, quote: &PriceQuote) -> Option<FlashDirection> {
        let symbol = normalize_symbol(&quote.symbol)?;
        let mut symbols = self.symbols.lock();

        let Some(entry) = symbols.get_mut(&symbol) else {
            symbols.insert(
                symbol,
                SymbolFlash {
                    last_price: quote.price,
                    active: None,
                },
            );
            return None;
        };

        let direction = FlashDirection::between(entry.last_price, quote.price);
        entry.last_price = quote.price;
        if let Some(direction) = direction {
            entry.active = Some((direction, Instant::now() + self.window));
        }
        direction
    }

    /// The active flash for a symbol, if it has not expired.
    #[must_use]
    pub fn current(&self, symbol: &str) -> Option<FlashDirection> {
        let symbol = normalize_symbol(symbol)?;
        let mut symbols = self.symbols.lock();
        let entry = symbols.get_mut(&symbol)?;

        match entry.active {
            Some((direction, until)) if Instant::now() < until => Some(direction),
            Some(_) => {
                entry.active = None;
                None
            }
            None => None,
        }
    }

    /// Forget every baseline and flash.
    pub fn clear(&self) {
        self.symbols.lock().clear();
    }

    /// Apply a price event: observe its quotes, or forget every baseline
    /// when the price book was cleared.
    pub fn apply(&self, event: &PriceEvent) {
        match event {
            PriceEvent::Cleared => self.clear(),
            prices => {
                for quote in prices.quotes() {
                    self.observe(quote);
                }
            }
        }
    }

    /// Feed every price event from `channel` into this tracker.
    ///
    /// The tracker stays attached for as long as the handle lives.
    #[must_use = "dropping the handle detaches the tracker"]
    pub fn attach(self: &Arc<Self>, channel: &RealtimeChannel) -> ListenerHandle {
        let tracker = Arc::clone(self);
        channel.add_listener(ListenerCategory::Price, move |event| {
            if let Some(prices) = event.as_price() {
                tracker.apply(prices);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn quote(symbol: &str, price: &str) -> PriceQuote {
        PriceQuote::new(symbol, Decimal::from_str(price).unwrap())
    }

    #[test]
    fn first_quote_sets_baseline_only() {
        let tracker = PriceFlashTracker::default();

        assert_eq!(tracker.observe(&quote("BTC-USD", "100")), None);
        assert_eq!(tracker.current("BTC-USD"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn increase_flashes_up_then_clears() {
        let tracker = PriceFlashTracker::default();
        tracker.observe(&quote("BTC-USD", "100"));

        assert_eq!(
            tracker.observe(&quote("BTC-USD", "101")),
            Some(FlashDirection::Up)
        );
        assert_eq!(tracker.current("btc-usd"), Some(FlashDirection::Up));

        tokio::time::advance(Duration::from_millis(499)).await;
        assert_eq!(tracker.current("BTC-USD"), Some(FlashDirection::Up));

        tokio::time::advance(Duration::from_millis(2)).await;
        assert_eq!(tracker.current("BTC-USD"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn decrease_flashes_down() {
        let tracker = PriceFlashTracker::default();
        tracker.observe(&quote("EURUSD", "1.0850"));

        assert_eq!(
            tracker.observe(&quote("EURUSD", "1.0849")),
            Some(FlashDirection::Down)
        );
        assert_eq!(tracker.current("EURUSD"), Some(FlashDirection::Down));
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_price_keeps_existing_flash() {
        let tracker = PriceFlashTracker::new(Duration::from_millis(100));
        tracker.observe(&quote("BTC-USD", "100"));
        tracker.observe(&quote("BTC-USD", "99"));

        assert_eq!(tracker.observe(&quote("BTC-USD", "99")), None);
        assert_eq!(tracker.current("BTC-USD"), Some(FlashDirection::Down));

        tokio::time::advance(Duration::from_millis(150)).await;
        assert_eq!(tracker.current("BTC-USD"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn new_move_restarts_window() {
        let tracker = PriceFlashTracker::new(Duration::from_millis(100));
        tracker.observe(&quote("BTC-USD", "100"));
        tracker.observe(&quote("BTC-USD", "101"));

        tokio::time::advance(Duration::from_millis(80)).await;
        tracker.observe(&quote("BTC-USD", "100.5"));

        tokio::time::advance(Duration::from_millis(80)).await;
        assert_eq!(tracker.current("BTC-USD"), Some(FlashDirection::Down));
    }

    #[test]
    fn unknown_or_blank_symbol_has_no_flash() {
        let tracker = PriceFlashTracker::default();

        assert_eq!(tracker.current("NOPE"), None);
        assert_eq!(tracker.current("  "), None);
    }

    #[tokio::test(start_paused = true)]
    async fn observe_normalizes_symbol() {
        let tracker = PriceFlashTracker::default();
        tracker.observe(&quote(" btc-usd", "100"));

        assert_eq!(
            tracker.observe(&quote("BTC-USD", "101")),
            Some(FlashDirection::Up)
        );
        assert_eq!(tracker.current("BTC-USD"), Some(FlashDirection::Up));
        assert_eq!(tracker.observe(&quote("  ", "5")), None);
    }

    #[tokio::test(start_paused = true)]
    async fn cleared_event_resets_baselines() {
        let tracker = PriceFlashTracker::default();
        tracker.apply(&PriceEvent::Update(quote("BTC-USD", "100")));
        tracker.apply(&PriceEvent::Update(quote("BTC-USD", "90")));
        assert_eq!(tracker.current("BTC-USD"), Some(FlashDirection::Down));

        tracker.apply(&PriceEvent::Cleared);

        assert_eq!(tracker.current("BTC-USD"), None);
        tracker.apply(&PriceEvent::Update(quote("BTC-USD", "120")));
        assert_eq!(tracker.current("BTC-USD"), None);
    }

    #[test]
    fn clear_forgets_baselines() {
        let tracker = PriceFlashTracker::default();
        tracker.observe(&quote("BTC-USD", "100"));

        tracker.clear();

        assert_eq!(tracker.observe(&quote("BTC-USD", "101")), None);
    }
}
