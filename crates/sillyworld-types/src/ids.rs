//! Identifier types for worlds, timelines, and the chat sessions they bind to.
//!
//! World identifiers are opaque strings chosen by the game; timeline
//! identifiers are generated here using UUID v7 so that their natural
//! ordering follows creation order.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix of the chat group every world's sessions live under.
pub const SESSION_GROUP_PREFIX: &str = "sillyworld_";

/// Opaque identifier of a world (one save-game identity) as reported by
/// the game process.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorldId(String);

impl WorldId {
    /// Wrap a raw world identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for WorldId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorldId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for WorldId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Unique identifier for one causal branch of a world's history.
///
/// Ordering is meaningful: a lower id was created earlier, which the
/// resolver relies on for its tie-break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimelineId(pub Uuid);

impl TimelineId {
    /// Create a new identifier using UUID v7 (time-ordered).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Return the inner [`Uuid`] value.
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for TimelineId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for TimelineId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for TimelineId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl From<TimelineId> for Uuid {
    fn from(id: TimelineId) -> Self {
        id.0
    }
}

/// Coordinates of the chat session a timeline is bound to.
///
/// Every world owns one chat group; each of its timelines is a separate
/// chat inside that group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    /// Chat group identifier, shared by all timelines of a world.
    pub group_id: String,
    /// Chat identifier, unique per timeline.
    pub chat_id: String,
}

impl SessionKey {
    /// Derive the session key for a timeline of a world.
    pub fn new(world_id: &WorldId, timeline_id: TimelineId) -> Self {
        Self {
            group_id: format!("{SESSION_GROUP_PREFIX}{world_id}"),
            chat_id: timeline_id.to_string(),
        }
    }

    /// File name of the chat log backing this session.
    pub fn chat_file(&self) -> String {
        let world = self
            .group_id
            .strip_prefix(SESSION_GROUP_PREFIX)
            .unwrap_or(&self.group_id);
        format!("{world}-{}.jsonl", self.chat_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_id_is_transparent_in_json() {
        let id = WorldId::from("Alpha");
        let json = serde_json::to_string(&id).ok();
        assert_eq!(json.as_deref(), Some("\"Alpha\""));
    }

    #[test]
    fn session_key_derives_from_world_and_timeline() {
        let timeline = TimelineId::from(Uuid::from_u128(7));
        let key = SessionKey::new(&WorldId::from("Alpha"), timeline);
        assert_eq!(key.group_id, "sillyworld_Alpha");
        assert_eq!(key.chat_id, timeline.to_string());
        assert_eq!(key.chat_file(), format!("Alpha-{timeline}.jsonl"));
    }

    #[test]
    fn timeline_ids_order_by_inner_uuid() {
        let low = TimelineId::from(Uuid::from_u128(1));
        let high = TimelineId::from(Uuid::from_u128(2));
        assert!(low < high);
    }
}
