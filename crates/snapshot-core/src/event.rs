//! Inbound stream events and the response channel contract.
//!
//! Messages arrive as an envelope carrying an event name, batch coordinates
//! used for commit ordering, and the payload. The payload is modelled as a
//! tagged union with a dedicated [`EventPayload::Unsupported`] variant so the
//! handler performs exhaustive case analysis instead of dispatching on raw
//! name strings.

use serde::Deserialize;

use crate::error::SnapshotError;
use crate::transfer::{BatchTransferMessage, SingleTransferMessage};

pub const EVENT_TOKEN_TRANSFERRED: &str = "TOKEN_TRANSFERRED";
pub const EVENT_TOKEN_TRANSFER_1155_SINGLE: &str = "TOKEN_TRANSFER_1155_SINGLE";
pub const EVENT_TOKEN_TRANSFER_BATCH: &str = "TOKEN_TRANSFER_BATCH";

/// One delivered stream message.
#[derive(Debug, Clone)]
pub struct StreamMessage {
    pub batch_id: i64,
    pub batch_index: i64,
    pub payload: EventPayload,
}

/// The supported event kinds, plus a dedicated variant for everything else.
#[derive(Debug, Clone)]
pub enum EventPayload {
    TokenTransferred(SingleTransferMessage),
    TokenTransfer1155Single(SingleTransferMessage),
    TokenTransferBatch(BatchTransferMessage),
    Unsupported { event_name: String },
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    event: String,
    batch_id: Option<i64>,
    batch_index: Option<i64>,
    #[serde(default)]
    value: serde_json::Value,
}

impl StreamMessage {
    /// Parse a raw JSON envelope.
    ///
    /// `fallback_index` is used as the batch index when the envelope does not
    /// carry one, so a file-backed source can use its own offset. Unknown
    /// event names parse into [`EventPayload::Unsupported`]; a known event
    /// with an undecodable payload is a `MalformedEvent` error.
    pub fn parse(raw: &str, fallback_index: i64) -> Result<Self, SnapshotError> {
        let envelope: RawEnvelope = serde_json::from_str(raw)
            .map_err(|e| SnapshotError::MalformedEvent(e.to_string()))?;

        let payload = match envelope.event.as_str() {
            EVENT_TOKEN_TRANSFERRED => EventPayload::TokenTransferred(
                serde_json::from_value(envelope.value)
                    .map_err(|e| SnapshotError::MalformedEvent(e.to_string()))?,
            ),
            EVENT_TOKEN_TRANSFER_1155_SINGLE => EventPayload::TokenTransfer1155Single(
                serde_json::from_value(envelope.value)
                    .map_err(|e| SnapshotError::MalformedEvent(e.to_string()))?,
            ),
            EVENT_TOKEN_TRANSFER_BATCH => EventPayload::TokenTransferBatch(
                serde_json::from_value(envelope.value)
                    .map_err(|e| SnapshotError::MalformedEvent(e.to_string()))?,
            ),
            other => EventPayload::Unsupported {
                event_name: other.to_string(),
            },
        };

        Ok(StreamMessage {
            batch_id: envelope.batch_id.unwrap_or(0),
            batch_index: envelope.batch_index.unwrap_or(fallback_index),
            payload,
        })
    }
}

/// The handler's response for one delivered message. Exactly one ack is sent
/// per message; `error: None` means "commit this offset".
#[derive(Debug)]
pub struct Ack {
    pub batch_id: i64,
    pub batch_index: i64,
    pub error: Option<SnapshotError>,
}
