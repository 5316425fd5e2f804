//! Price Quotes
//!
//! Canonical in-memory representation of instrument prices, independent of
//! the wire format they arrived in.
//!
//! - `PriceQuote`: last price plus absolute and percent change for one symbol
//! - `PriceBook`: latest quote per symbol, replaced wholesale on each update
//! - `FlashDirection`: up/down tick classification used by price displays

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Symbols
// =============================================================================

/// An instrument symbol (e.g. `BTC-USD`, `EURUSD`), uppercase-normalised.
pub type Symbol = String;

/// Normalise a symbol: trim surrounding whitespace and uppercase it.
///
/// Returns `None` for symbols that are empty after trimming.
#[must_use]
pub fn normalize_symbol(raw: &str) -> Option<Symbol> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_uppercase())
    }
}

/// Normalise a list of symbols, dropping empty entries.
#[must_use]
pub fn normalize_symbols<S: AsRef<str>>(raw: &[S]) -> Vec<Symbol> {
    raw.iter()
        .filter_map(|s| normalize_symbol(s.as_ref()))
        .collect()
}

// =============================================================================
// Price Quote
// =============================================================================

/// Latest known price for an instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    /// Instrument symbol (uppercase).
    pub symbol: Symbol,
    /// Last traded price.
    pub price: Decimal,
    /// Absolute change over the server's reference period.
    pub change: Decimal,
    /// Percent change over the server's reference period.
    pub change_percent: Decimal,
    /// Server timestamp, when provided.
    pub timestamp: Option<DateTime<Utc>>,
}

impl PriceQuote {
    /// Create a quote with no change information.
    #[must_use]
    pub fn new(symbol: impl Into<Symbol>, price: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            change: Decimal::ZERO,
            change_percent: Decimal::ZERO,
            timestamp: None,
        }
    }
}

// =============================================================================
// Flash Direction
// =============================================================================

/// Direction of a price move relative to the previous tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashDirection {
    /// Price increased.
    Up,
    /// Price decreased.
    Down,
}

impl FlashDirection {
    /// Classify a move from `previous` to `current`.
    ///
    /// Returns `None` when the price did not change.
    #[must_use]
    pub fn between(previous: Decimal, current: Decimal) -> Option<Self> {
        match current.cmp(&previous) {
            std::cmp::Ordering::Greater => Some(Self::Up),
            std::cmp::Ordering::Less => Some(Self::Down),
            std::cmp::Ordering::Equal => None,
        }
    }
}

// =============================================================================
// Price Book
// =============================================================================

/// Latest quote per symbol.
///
/// Each update overwrites the symbol's previous quote; there is no merge.
#[derive(Debug, Default)]
pub struct PriceBook {
    quotes: RwLock<HashMap<Symbol, PriceQuote>>,
}

impl PriceBook {
    /// Create an empty price book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a quote, returning the quote it replaced.
    pub fn apply(&self, quote: PriceQuote) -> Option<PriceQuote> {
        self.quotes.write().insert(quote.symbol.clone(), quote)
    }

    /// Get the latest quote for a symbol (case-insensitive).
    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<PriceQuote> {
        let symbol = normalize_symbol(symbol)?;
        self.quotes.read().get(&symbol).cloned()
    }

    /// All quotes, sorted by symbol.
    #[must_use]
    pub fn snapshot(&self) -> Vec<PriceQuote> {
        let mut quotes: Vec<_> = self.quotes.read().values().cloned().collect();
        quotes.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        quotes
    }

    /// Number of symbols with a known price.
    #[must_use]
    pub fn len(&self) -> usize {
        self.quotes.read().len()
    }

    /// Whether no prices are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.quotes.read().is_empty()
    }

    /// Forget all prices.
    pub fn clear(&self) {
        self.quotes.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn normalize_uppercases_and_trims() {
        assert_eq!(normalize_symbol(" btc-usd "), Some("BTC-USD".to_string()));
        assert_eq!(normalize_symbol("   "), None);
        assert_eq!(
            normalize_symbols(&["eurusd", "", "Xauusd"]),
            vec!["EURUSD".to_string(), "XAUUSD".to_string()]
        );
    }

    #[test]
    fn flash_direction_between() {
        assert_eq!(
            FlashDirection::between(dec("100.0"), dec("100.5")),
            Some(FlashDirection::Up)
        );
        assert_eq!(
            FlashDirection::between(dec("100.5"), dec("100.0")),
            Some(FlashDirection::Down)
        );
        assert_eq!(FlashDirection::between(dec("100.0"), dec("100.00")), None);
    }

    #[test]
    fn price_book_replaces_per_symbol() {
        let book = PriceBook::new();

        assert!(book.apply(PriceQuote::new("BTC-USD", dec("45000"))).is_none());
        let previous = book.apply(PriceQuote::new("BTC-USD", dec("45230.00")));

        assert_eq!(previous.map(|q| q.price), Some(dec("45000")));
        assert_eq!(book.len(), 1);
        assert_eq!(book.get("btc-usd").map(|q| q.price), Some(dec("45230.00")));
    }

    #[test]
    fn price_book_snapshot_sorted() {
        let book = PriceBook::new();
        book.apply(PriceQuote::new("XAUUSD", dec("2010.5")));
        book.apply(PriceQuote::new("BTC-USD", dec("45230")));
        book.apply(PriceQuote::new("EURUSD", dec("1.0842")));

        let symbols: Vec<_> = book.snapshot().into_iter().map(|q| q.symbol).collect();
        assert_eq!(symbols, vec!["BTC-USD", "EURUSD", "XAUUSD"]);
    }

    #[test]
    fn price_book_clear() {
        let book = PriceBook::new();
        book.apply(PriceQuote::new("BTC-USD", dec("45230")));
        book.clear();

        assert!(book.is_empty());
        assert!(book.get("BTC-USD").is_none());
    }

    #[test]
    fn get_unknown_or_blank_symbol() {
        let book = PriceBook::new();
        assert!(book.get("ETH-USD").is_none());
        assert!(book.get("  ").is_none());
    }
}
