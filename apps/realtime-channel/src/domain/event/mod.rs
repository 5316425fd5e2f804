//! Channel Events
//!
//! Typed events the channel delivers to listeners. Every event belongs to
//! exactly one `ListenerCategory`; listeners register per category.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::challenge::{ChallengeStatusUpdate, ChallengeWarning};
use super::quote::PriceQuote;

/// Category a listener registers against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenerCategory {
    /// Price ticks (single and batched).
    Price,
    /// Trade state changes.
    Trade,
    /// Challenge status changes and risk warnings.
    Challenge,
}

impl ListenerCategory {
    /// Get all categories.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Price, Self::Trade, Self::Challenge]
    }

    /// Get the category name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Price => "price",
            Self::Trade => "trade",
            Self::Challenge => "challenge",
        }
    }
}

/// Price category events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PriceEvent {
    /// A single `price_update`.
    Update(PriceQuote),
    /// A `prices_batch`, one quote per symbol, sorted by symbol.
    Batch {
        /// Quotes in the batch.
        quotes: Vec<PriceQuote>,
        /// Batch timestamp, when provided.
        timestamp: Option<DateTime<Utc>>,
    },
    /// The price book was emptied after a reconnect. Earlier quotes are
    /// stale and should not be used as a baseline.
    Cleared,
}

impl PriceEvent {
    /// Quotes carried by this event.
    #[must_use]
    pub fn quotes(&self) -> &[PriceQuote] {
        match self {
            Self::Update(quote) => std::slice::from_ref(quote),
            Self::Batch { quotes, .. } => quotes,
            Self::Cleared => &[],
        }
    }
}

/// Challenge category events.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChallengeEvent {
    /// A `challenge_status` message.
    Status(ChallengeStatusUpdate),
    /// A `challenge_warning` message.
    Warning(ChallengeWarning),
}

/// An event delivered to listeners.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "category", rename_all = "lowercase")]
pub enum ChannelEvent {
    /// Price tick(s).
    Price(PriceEvent),
    /// Opaque trade payload, forwarded verbatim.
    Trade {
        /// Payload as received.
        payload: Value,
    },
    /// Challenge status or warning.
    Challenge(ChallengeEvent),
}

impl ChannelEvent {
    /// The category this event is dispatched to.
    #[must_use]
    pub const fn category(&self) -> ListenerCategory {
        match self {
            Self::Price(_) => ListenerCategory::Price,
            Self::Trade { .. } => ListenerCategory::Trade,
            Self::Challenge(_) => ListenerCategory::Challenge,
        }
    }

    /// The price event, if this is one.
    #[must_use]
    pub const fn as_price(&self) -> Option<&PriceEvent> {
        match self {
            Self::Price(event) => Some(event),
            _ => None,
        }
    }

    /// The challenge event, if this is one.
    #[must_use]
    pub const fn as_challenge(&self) -> Option<&ChallengeEvent> {
        match self {
            Self::Challenge(event) => Some(event),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn category_of_each_event() {
        let price = ChannelEvent::Price(PriceEvent::Update(PriceQuote::new(
            "BTC-USD",
            Decimal::ONE,
        )));
        let trade = ChannelEvent::Trade {
            payload: serde_json::json!({"id": 1}),
        };

        assert_eq!(price.category(), ListenerCategory::Price);
        assert_eq!(trade.category(), ListenerCategory::Trade);
        assert!(trade.as_price().is_none());
        assert!(price.as_challenge().is_none());
    }

    #[test]
    fn price_event_quotes() {
        let single = PriceEvent::Update(PriceQuote::new("BTC-USD", Decimal::ONE));
        let batch = PriceEvent::Batch {
            quotes: vec![
                PriceQuote::new("BTC-USD", Decimal::ONE),
                PriceQuote::new("ETH-USD", Decimal::TWO),
            ],
            timestamp: None,
        };

        assert_eq!(single.quotes().len(), 1);
        assert_eq!(batch.quotes().len(), 2);
    }

    #[test]
    fn all_categories() {
        assert_eq!(ListenerCategory::all().len(), 3);
        assert_eq!(ListenerCategory::Challenge.as_str(), "challenge");
    }
}
