//! Simulation events as they arrive from the game's event stream.
//!
//! The game batches events into [`EventSummary`] records covering a tick
//! window. Individual [`GameEvent`]s that cannot be decoded are dropped
//! while the rest of the summary is kept; the number of dropped events is
//! recorded on the summary so callers can report it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::WorldId;

// ---------------------------------------------------------------------------
// Event kinds
// ---------------------------------------------------------------------------

/// The closed set of event kinds the bridge knows how to narrate.
///
/// Anything else maps to [`EventKind::Unrecognized`], which still gets a
/// generic rendering so no event is silently lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A pawn finished a job.
    JobCompleted,
    /// Two pawns interacted socially.
    SocialInteraction,
    /// The player received a letter or message.
    NotificationReceived,
    /// A pawn died.
    PawnDied,
    /// A pawn was born.
    PawnBorn,
    /// Two pawns crossed a relationship threshold.
    PawnRelationThresholdChanged,
    /// A pawn gained or lost a health condition.
    PawnHealthChanged,
    /// A trade with a caravan or orbital trader finished.
    TradeCompleted,
    /// A pawn was drafted or undrafted.
    PawnDraftStatusChanged,
    /// Two pawns finished an intimate interaction.
    SexActFinished,
    /// A pawn became pregnant.
    PawnImpregnated,
    /// Fallback for every other event type.
    Unrecognized,
}

impl EventKind {
    /// Map the game's event type name onto a kind.
    pub fn from_type_name(name: &str) -> Self {
        match name {
            "JobCompleted" => Self::JobCompleted,
            "SocialInteraction" => Self::SocialInteraction,
            "NotificationReceived" => Self::NotificationReceived,
            "PawnDied" => Self::PawnDied,
            "PawnBorn" => Self::PawnBorn,
            "PawnRelationThresholdChanged" => Self::PawnRelationThresholdChanged,
            "PawnHealthChanged" => Self::PawnHealthChanged,
            "TradeCompleted" => Self::TradeCompleted,
            "PawnDraftStatusChanged" => Self::PawnDraftStatusChanged,
            "SexActFinished" => Self::SexActFinished,
            "PawnImpregnated" => Self::PawnImpregnated,
            _ => Self::Unrecognized,
        }
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// A pawn taking part in an event, tagged with its role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Participant {
    /// Role of the participant (`executor`, `victim`, `Negotiator`, ...).
    #[serde(default)]
    pub role: String,
    /// Display name of the pawn, if the game resolved one.
    #[serde(default)]
    pub pawn_name: Option<String>,
}

/// One simulation event inside an [`EventSummary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GameEvent {
    /// The game's event type name.
    #[serde(rename = "Type", default)]
    pub event_type: Option<String>,
    /// Tick at which the event happened.
    #[serde(default)]
    pub tick: Option<u64>,
    /// Pre-formatted time of day, when the game supplies one.
    #[serde(default)]
    pub time_of_day: Option<String>,
    /// Pawns involved in the event.
    #[serde(default)]
    pub participants: Vec<Participant>,
    /// Free-form event details.
    #[serde(default)]
    pub details: Value,
}

impl GameEvent {
    /// Kind of this event, or `None` when the event carries no type.
    pub fn kind(&self) -> Option<EventKind> {
        self.event_type
            .as_deref()
            .filter(|name| !name.is_empty())
            .map(EventKind::from_type_name)
    }

    /// Name of the first participant with the given role.
    pub fn participant(&self, role: &str) -> Option<&str> {
        self.participants
            .iter()
            .find(|p| p.role == role)
            .and_then(|p| p.pawn_name.as_deref())
    }

    /// Look up a detail field.
    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.details.get(key).filter(|v| !v.is_null())
    }

    /// Look up a detail field as a string.
    pub fn detail_str(&self, key: &str) -> Option<&str> {
        self.detail(key).and_then(Value::as_str)
    }
}

// ---------------------------------------------------------------------------
// Summaries
// ---------------------------------------------------------------------------

/// An immutable, time-windowed batch of simulation events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawEventSummary")]
pub struct EventSummary {
    /// World the summary belongs to; absent when the game leaves routing
    /// to the bridge's active world.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub world_id: Option<WorldId>,
    /// First tick covered by the summary.
    #[serde(rename = "startTime")]
    pub start_tick: u64,
    /// Last tick covered by the summary.
    #[serde(rename = "endTime")]
    pub end_tick: u64,
    /// In-game date at the start of the window.
    pub start_date_string: Option<String>,
    /// In-game date at the end of the window.
    pub end_date_string: Option<String>,
    /// Time of day at the start of the window.
    pub start_time_of_day: Option<String>,
    /// Time of day at the end of the window.
    pub end_time_of_day: Option<String>,
    /// Events in the order the game recorded them.
    pub events: Vec<GameEvent>,
    /// Number of events dropped because they could not be decoded.
    #[serde(skip)]
    pub malformed_events: usize,
}

impl EventSummary {
    /// Build a summary covering `[start_tick, end_tick]`.
    pub const fn new(start_tick: u64, end_tick: u64, events: Vec<GameEvent>) -> Self {
        Self {
            world_id: None,
            start_tick,
            end_tick,
            start_date_string: None,
            end_date_string: None,
            start_time_of_day: None,
            end_time_of_day: None,
            events,
            malformed_events: 0,
        }
    }

    /// Whether the tick window is well-formed.
    pub const fn is_well_formed(&self) -> bool {
        self.end_tick >= self.start_tick
    }
}

/// Wire shape of an [`EventSummary`] before per-event validation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEventSummary {
    #[serde(default)]
    world_id: Option<WorldId>,
    start_time: u64,
    end_time: u64,
    #[serde(default)]
    start_date_string: Option<String>,
    #[serde(default)]
    end_date_string: Option<String>,
    #[serde(default)]
    start_time_of_day: Option<String>,
    #[serde(default)]
    end_time_of_day: Option<String>,
    #[serde(default)]
    events: Vec<Value>,
}

impl From<RawEventSummary> for EventSummary {
    fn from(raw: RawEventSummary) -> Self {
        let total = raw.events.len();
        let events: Vec<GameEvent> = raw
            .events
            .into_iter()
            .filter_map(|value| serde_json::from_value(value).ok())
            .collect();
        Self {
            world_id: raw.world_id,
            start_tick: raw.start_time,
            end_tick: raw.end_time,
            start_date_string: raw.start_date_string,
            end_date_string: raw.end_date_string,
            start_time_of_day: raw.start_time_of_day,
            end_time_of_day: raw.end_time_of_day,
            malformed_events: total.saturating_sub(events.len()),
            events,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn summary_decodes_wire_names() {
        let json = serde_json::json!({
            "worldId": "Alpha",
            "startTime": 1000,
            "endTime": 3500,
            "startDateString": "5th of Aprimay, 5500",
            "endDateString": "5th of Aprimay, 5500",
            "startTimeOfDay": "06:00",
            "endTimeOfDay": "07:00",
            "events": [
                {
                    "Type": "PawnDied",
                    "Tick": 1200,
                    "Participants": [{"Role": "victim", "PawnName": "Jane"}],
                    "Details": {"Weapon": "knife"}
                }
            ]
        });
        let summary: EventSummary = serde_json::from_value(json).unwrap();
        assert_eq!(summary.world_id, Some(WorldId::from("Alpha")));
        assert_eq!(summary.start_tick, 1000);
        assert_eq!(summary.end_tick, 3500);
        assert_eq!(summary.events.len(), 1);
        let event = &summary.events[0];
        assert_eq!(event.kind(), Some(EventKind::PawnDied));
        assert_eq!(event.participant("victim"), Some("Jane"));
        assert_eq!(event.detail_str("Weapon"), Some("knife"));
    }

    #[test]
    fn malformed_events_are_dropped_and_counted() {
        let json = serde_json::json!({
            "startTime": 0,
            "endTime": 100,
            "events": [
                {"Type": "JobCompleted", "Tick": 5},
                {"Type": "JobCompleted", "Tick": "not a tick"},
                "garbage"
            ]
        });
        let summary: EventSummary = serde_json::from_value(json).unwrap();
        assert_eq!(summary.events.len(), 1);
        assert_eq!(summary.malformed_events, 2);
    }

    #[test]
    fn missing_window_fails_the_whole_summary() {
        let json = serde_json::json!({"events": []});
        assert!(serde_json::from_value::<EventSummary>(json).is_err());
    }

    #[test]
    fn unknown_types_fall_back() {
        assert_eq!(EventKind::from_type_name("RaidStarted"), EventKind::Unrecognized);
        assert_eq!(EventKind::from_type_name("PawnImpregnated"), EventKind::PawnImpregnated);
        assert_eq!(EventKind::from_type_name("SexActFinished"), EventKind::SexActFinished);
        let untyped = GameEvent {
            event_type: None,
            tick: None,
            time_of_day: None,
            participants: Vec::new(),
            details: Value::Null,
        };
        assert_eq!(untyped.kind(), None);
    }

    #[test]
    fn inverted_window_is_not_well_formed() {
        assert!(EventSummary::new(0, 10, Vec::new()).is_well_formed());
        assert!(!EventSummary::new(10, 0, Vec::new()).is_well_formed());
    }
}
