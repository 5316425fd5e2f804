//! Realtime Codec
//!
//! Decodes envelope frames into typed [`InboundMessage`]s and encodes
//! [`ClientMessage`] requests.
//!
//! The server normally sends one envelope per text frame. A JSON array of
//! envelopes is also accepted and decoded in order; a malformed element is
//! skipped without discarding the rest of the array.

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::messages::{ClientMessage, Envelope, InboundMessage};
use crate::infrastructure::metrics;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// A known message type carried a payload that does not match its schema.
    #[error("invalid `{kind}` payload: {source}")]
    InvalidPayload {
        /// Message type.
        kind: String,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// Invalid message format.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

/// JSON codec for the realtime endpoint.
#[derive(Debug, Default, Clone)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a text frame.
    ///
    /// Unknown message types decode to [`InboundMessage::Unknown`] and are
    /// not errors.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not JSON, is not an envelope (or an
    /// array), or a single envelope's known-type payload is malformed.
    /// Malformed elements of an array are logged and skipped.
    pub fn decode(&self, text: &str) -> Result<Vec<InboundMessage>, CodecError> {
        let trimmed = text.trim();

        if trimmed.starts_with('[') {
            let elements: Vec<Value> = serde_json::from_str(trimmed)?;
            Ok(elements
                .into_iter()
                .enumerate()
                .filter_map(|(index, element)| match Self::decode_element(element) {
                    Ok(message) => Some(message),
                    Err(e) => {
                        metrics::record_malformed_frame();
                        tracing::warn!(index, error = %e, "Skipping malformed envelope in batch frame");
                        None
                    }
                })
                .collect())
        } else if trimmed.starts_with('{') {
            let envelope: Envelope = serde_json::from_str(trimmed)?;
            Ok(vec![Self::decode_envelope(envelope)?])
        } else {
            let preview: String = trimmed.chars().take(50).collect();
            Err(CodecError::InvalidFormat(format!(
                "expected JSON object or array, got: {preview}..."
            )))
        }
    }

    /// Encode a request as a text frame payload.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self, message: &ClientMessage) -> Result<String, CodecError> {
        Ok(serde_json::to_string(message)?)
    }

    fn decode_element(element: Value) -> Result<InboundMessage, CodecError> {
        let envelope: Envelope = serde_json::from_value(element)?;
        Self::decode_envelope(envelope)
    }

    fn decode_envelope(envelope: Envelope) -> Result<InboundMessage, CodecError> {
        let Envelope { kind, data } = envelope;
        let data = if data.is_null() {
            Value::Object(serde_json::Map::new())
        } else {
            data
        };

        let message = match kind.as_str() {
            "connected" => InboundMessage::Connected(payload(&kind, data)?),
            "authenticated" => InboundMessage::Authenticated(payload(&kind, data)?),
            "auth_error" => InboundMessage::AuthError(payload(&kind, data)?),
            "subscribed" => InboundMessage::Subscribed(payload(&kind, data)?),
            "price_update" => InboundMessage::PriceUpdate(payload(&kind, data)?),
            "prices_batch" => InboundMessage::PricesBatch(payload(&kind, data)?),
            "trade_update" => InboundMessage::TradeUpdate(data),
            "challenge_status" => InboundMessage::ChallengeStatus(payload(&kind, data)?),
            "challenge_warning" => InboundMessage::ChallengeWarning(payload(&kind, data)?),
            _ => InboundMessage::Unknown(kind),
        };

        Ok(message)
    }
}

fn payload<T: DeserializeOwned>(kind: &str, data: Value) -> Result<T, CodecError> {
    serde_json::from_value(data).map_err(|source| CodecError::InvalidPayload {
        kind: kind.to_string(),
        source,
    })
}
