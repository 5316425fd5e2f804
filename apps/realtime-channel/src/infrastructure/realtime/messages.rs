//! Realtime Wire Message Types
//!
//! Wire format types for the realtime endpoint. Every frame is a JSON text
//! frame wrapped in an envelope:
//!
//! ```json
//! {"type": "price_update", "data": {"symbol": "BTC-USD", "price": 45230.00}}
//! ```
//!
//! # Message Types
//!
//! ## Control Messages (server → client)
//! - `connected`: greeting after the transport opens
//! - `authenticated`: session credential accepted
//! - `auth_error`: session credential rejected
//! - `subscribed`: symbols acknowledged
//!
//! ## Data Messages (server → client)
//! - `price_update`: one symbol's latest price
//! - `prices_batch`: many symbols at once
//! - `trade_update`: opaque trade payload
//! - `challenge_status`: challenge lifecycle change
//! - `challenge_warning`: risk limit approaching
//!
//! ## Requests (client → server)
//! - `authenticate`, `subscribe_prices`, `unsubscribe_prices`

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::challenge::{ChallengeStatusUpdate, ChallengeWarning};
use crate::domain::quote::{PriceQuote, Symbol, normalize_symbol};
use crate::infrastructure::metrics::MessageType;

// =============================================================================
// Envelope
// =============================================================================

/// Outer frame shared by every message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Envelope {
    /// Message type discriminator.
    #[serde(rename = "type")]
    pub kind: String,
    /// Message payload; `{}` when absent.
    #[serde(default)]
    pub data: Value,
}

// =============================================================================
// Control Messages
// =============================================================================

/// `connected` greeting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedMessage {
    /// Optional server banner.
    #[serde(default)]
    pub message: Option<String>,
}

/// `authenticated` acknowledgement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedMessage {
    /// Authenticated user, when the server reports it.
    #[serde(default)]
    pub user_id: Option<Value>,
}

/// `auth_error` rejection.
///
/// # Wire Format (JSON)
/// ```json
/// {"type": "auth_error", "data": {"message": "Invalid token"}}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthErrorMessage {
    /// Rejection reason.
    #[serde(default)]
    pub message: String,
}

/// `subscribed` acknowledgement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribedMessage {
    /// Symbols the server now streams to this connection.
    #[serde(default)]
    pub symbols: Vec<String>,
}

// =============================================================================
// Price Messages
// =============================================================================

/// `price_update` for one symbol.
///
/// # Wire Format (JSON)
/// ```json
/// {"type": "price_update",
///  "data": {"symbol": "BTC-USD", "price": 45230.00, "change": 120.5,
///           "change_percent": 0.27, "timestamp": "2024-03-15T14:30:00Z"}}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceUpdateMessage {
    /// Instrument symbol.
    pub symbol: String,
    /// Last price.
    pub price: Decimal,
    /// Absolute change.
    #[serde(default)]
    pub change: Option<Decimal>,
    /// Percent change.
    #[serde(default)]
    pub change_percent: Option<Decimal>,
    /// Server timestamp (RFC 3339 or epoch milliseconds).
    #[serde(default, deserialize_with = "timestamp::deserialize")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl PriceUpdateMessage {
    /// Convert to the domain quote.
    ///
    /// Returns `None` if the symbol is blank.
    #[must_use]
    pub fn into_quote(self) -> Option<PriceQuote> {
        Some(PriceQuote {
            symbol: normalize_symbol(&self.symbol)?,
            price: self.price,
            change: self.change.unwrap_or_default(),
            change_percent: self.change_percent.unwrap_or_default(),
            timestamp: self.timestamp,
        })
    }
}

/// One entry of a `prices_batch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPrice {
    /// Last price.
    pub price: Decimal,
    /// Absolute change.
    #[serde(default)]
    pub change: Option<Decimal>,
    /// Percent change.
    #[serde(default)]
    pub change_percent: Option<Decimal>,
}

/// `prices_batch` covering many symbols.
///
/// # Wire Format (JSON)
/// ```json
/// {"type": "prices_batch",
///  "data": {"prices": {"BTC-USD": {"price": 45230.0}, "EURUSD": {"price": "1.0842"}},
///           "timestamp": 1710513000000}}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricesBatchMessage {
    /// Prices keyed by symbol.
    #[serde(default)]
    pub prices: BTreeMap<String, BatchPrice>,
    /// Batch timestamp, applied to every quote.
    #[serde(default, deserialize_with = "timestamp::deserialize")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl PricesBatchMessage {
    /// Convert to domain quotes, sorted by normalised symbol.
    ///
    /// Blank symbols are dropped. If two keys normalise to the same symbol
    /// the later one (in key order) wins.
    #[must_use]
    pub fn into_quotes(self) -> Vec<PriceQuote> {
        let timestamp = self.timestamp;
        let quotes: BTreeMap<Symbol, PriceQuote> = self
            .prices
            .into_iter()
            .filter_map(|(raw, entry)| {
                let symbol = normalize_symbol(&raw)?;
                Some((
                    symbol.clone(),
                    PriceQuote {
                        symbol,
                        price: entry.price,
                        change: entry.change.unwrap_or_default(),
                        change_percent: entry.change_percent.unwrap_or_default(),
                        timestamp,
                    },
                ))
            })
            .collect();
        quotes.into_values().collect()
    }
}

// =============================================================================
// Inbound Message
// =============================================================================

/// A decoded server → client message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Transport greeting.
    Connected(ConnectedMessage),
    /// Credential accepted.
    Authenticated(AuthenticatedMessage),
    /// Credential rejected.
    AuthError(AuthErrorMessage),
    /// Subscription acknowledged.
    Subscribed(SubscribedMessage),
    /// Single price tick.
    PriceUpdate(PriceUpdateMessage),
    /// Batched price ticks.
    PricesBatch(PricesBatchMessage),
    /// Opaque trade payload.
    TradeUpdate(Value),
    /// Challenge status change.
    ChallengeStatus(ChallengeStatusUpdate),
    /// Challenge risk warning.
    ChallengeWarning(ChallengeWarning),
    /// A type this client does not handle.
    Unknown(String),
}

impl InboundMessage {
    /// Metric label for this message.
    #[must_use]
    pub const fn message_type(&self) -> MessageType {
        match self {
            Self::Connected(_) => MessageType::Connected,
            Self::Authenticated(_) => MessageType::Authenticated,
            Self::AuthError(_) => MessageType::AuthError,
            Self::Subscribed(_) => MessageType::Subscribed,
            Self::PriceUpdate(_) => MessageType::PriceUpdate,
            Self::PricesBatch(_) => MessageType::PricesBatch,
            Self::TradeUpdate(_) => MessageType::TradeUpdate,
            Self::ChallengeStatus(_) => MessageType::ChallengeStatus,
            Self::ChallengeWarning(_) => MessageType::ChallengeWarning,
            Self::Unknown(_) => MessageType::Unknown,
        }
    }
}

// =============================================================================
// Outbound Requests
// =============================================================================

/// A client → server request.
///
/// # Wire Format (JSON)
/// ```json
/// {"type": "authenticate", "data": {"token": "..."}}
/// {"type": "subscribe_prices", "data": {"symbols": ["BTC-USD"]}}
/// {"type": "unsubscribe_prices", "data": {"symbols": ["BTC-USD"]}}
/// ```
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Present the session credential.
    Authenticate {
        /// Session token.
        token: String,
    },
    /// Start streaming prices for symbols.
    SubscribePrices {
        /// Symbols to add.
        symbols: Vec<Symbol>,
    },
    /// Stop streaming prices for symbols.
    UnsubscribePrices {
        /// Symbols to remove.
        symbols: Vec<Symbol>,
    },
}

impl ClientMessage {
    /// Metric label for this request.
    #[must_use]
    pub const fn message_type(&self) -> MessageType {
        match self {
            Self::Authenticate { .. } => MessageType::Authenticate,
            Self::SubscribePrices { .. } => MessageType::SubscribePrices,
            Self::UnsubscribePrices { .. } => MessageType::UnsubscribePrices,
        }
    }
}

impl std::fmt::Debug for ClientMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Authenticate { .. } => f
                .debug_struct("Authenticate")
                .field("token", &"[REDACTED]")
                .finish(),
            Self::SubscribePrices { symbols } => f
                .debug_struct("SubscribePrices")
                .field("symbols", symbols)
                .finish(),
            Self::UnsubscribePrices { symbols } => f
                .debug_struct("UnsubscribePrices")
                .field("symbols", symbols)
                .finish(),
        }
    }
}

// =============================================================================
// Timestamp Parsing
// =============================================================================

/// Lenient timestamp deserializer: RFC 3339 strings, epoch milliseconds, or
/// numeric strings holding epoch milliseconds. Unparseable values become
/// `None` rather than failing the whole frame.
mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(i64),
        Float(f64),
        Text(String),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<Raw> = Option::deserialize(deserializer)?;
        Ok(raw.and_then(|raw| match raw {
            Raw::Millis(ms) => DateTime::from_timestamp_millis(ms),
            #[allow(clippy::cast_possible_truncation)]
            Raw::Float(ms) if ms.is_finite() => DateTime::from_timestamp_millis(ms as i64),
            Raw::Float(_) => None,
            Raw::Text(text) => DateTime::parse_from_rfc3339(&text)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    text.parse::<i64>()
                        .ok()
                        .and_then(DateTime::from_timestamp_millis)
                }),
        }))
    }
}
