//! Messages arriving on the game's event socket.
//!
//! Every text frame is an envelope `{"event": ..., "payload": ...}`. Only
//! two events matter to the bridge; everything else is ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::EventSummary;
use crate::ids::WorldId;

/// Event name announcing that a save was loaded.
pub const SAVE_LOADED: &str = "SAVE_LOADED";

/// Event name carrying an [`EventSummary`].
pub const TIME_PERIOD_SUMMARY: &str = "TimePeriodSummary";

/// Raw envelope of one socket frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEnvelope {
    /// Event name.
    pub event: String,
    /// Event payload.
    #[serde(default)]
    pub payload: Value,
}

/// Payload of a [`SAVE_LOADED`] event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveLoaded {
    /// World whose save was loaded.
    pub world_id: WorldId,
    /// Tick the save was taken at.
    #[serde(default)]
    pub tick: u64,
}

/// A decoded stream message the bridge acts on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum StreamMessage {
    /// A save was loaded.
    #[serde(rename = "SAVE_LOADED")]
    SaveLoaded(SaveLoaded),
    /// A batch of events for a tick window.
    #[serde(rename = "TimePeriodSummary")]
    TimePeriodSummary(EventSummary),
}

/// Error decoding a stream frame.
#[derive(Debug, thiserror::Error)]
pub enum StreamDecodeError {
    /// The frame is not a valid envelope.
    #[error("invalid stream envelope: {0}")]
    Envelope(#[source] serde_json::Error),
    /// The payload does not match the event's shape.
    #[error("invalid {event} payload: {source}")]
    Payload {
        /// Event name of the offending frame.
        event: String,
        /// Underlying decode error.
        source: serde_json::Error,
    },
}

impl StreamMessage {
    /// Decode a text frame.
    ///
    /// Returns `Ok(None)` for well-formed envelopes carrying events the
    /// bridge does not handle.
    pub fn parse(frame: &str) -> Result<Option<Self>, StreamDecodeError> {
        let envelope: StreamEnvelope =
            serde_json::from_str(frame).map_err(StreamDecodeError::Envelope)?;
        Self::from_envelope(envelope)
    }

    /// Decode an already-parsed envelope.
    pub fn from_envelope(envelope: StreamEnvelope) -> Result<Option<Self>, StreamDecodeError> {
        let StreamEnvelope { event, payload } = envelope;
        let decoded = match event.as_str() {
            SAVE_LOADED => serde_json::from_value(payload).map(Self::SaveLoaded),
            TIME_PERIOD_SUMMARY => serde_json::from_value(payload).map(Self::TimePeriodSummary),
            _ => return Ok(None),
        };
        decoded
            .map(Some)
            .map_err(|source| StreamDecodeError::Payload { event, source })
    }
}
