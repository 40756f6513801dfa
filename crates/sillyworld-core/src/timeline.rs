//! Worlds, timelines, and the continuity resolver.
//!
//! A [`World`] is an arena of [`Timeline`]s keyed by [`TimelineId`]. When
//! the game reports that a save was loaded at some tick, [`World::resolve`]
//! decides which causal history that save belongs to:
//!
//! - the timeline whose watermark is closest to (and not after) the tick
//!   is the candidate;
//! - a candidate whose watermark equals the tick is continued unchanged;
//! - any other candidate is forked, keeping only the summaries that ended
//!   at or before the tick;
//! - with no candidate a fresh timeline is created.
//!
//! Candidates with equal distance are broken in favour of the lowest
//! [`TimelineId`], i.e. the earliest-created timeline.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sillyworld_types::{EventSummary, SessionKey, TimelineId, WorldId};
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Timeline
// ---------------------------------------------------------------------------

/// One causal branch of a world's history.
///
/// Invariant: every buffered summary ends strictly after the watermark.
#[derive(Debug, Clone)]
pub struct Timeline {
    id: TimelineId,
    world_id: WorldId,
    session: SessionKey,
    buffer: Vec<EventSummary>,
    watermark: u64,
    forked_from: Option<TimelineId>,
    created_at: DateTime<Utc>,
    /// Last snapshot fetched for this timeline.
    pub last_snapshot: Option<Value>,
    /// Narrative produced by the most recent flush.
    pub last_narrative: Option<String>,
    /// Narrative waiting to be dispatched.
    pub pending_narrative: Option<String>,
}

impl Timeline {
    /// Create a fresh timeline with an empty buffer and watermark 0.
    pub fn fresh(world_id: WorldId) -> Self {
        Self::with_history(world_id, Vec::new(), 0, None)
    }

    fn with_history(
        world_id: WorldId,
        buffer: Vec<EventSummary>,
        watermark: u64,
        forked_from: Option<TimelineId>,
    ) -> Self {
        let id = TimelineId::new();
        Self {
            id,
            session: SessionKey::new(&world_id, id),
            world_id,
            buffer,
            watermark,
            forked_from,
            created_at: Utc::now(),
            last_snapshot: None,
            last_narrative: None,
            pending_narrative: None,
        }
    }

    /// Fork this timeline at `tick`.
    ///
    /// The new timeline keeps the buffered summaries that ended at or
    /// before `tick`; its watermark is the end tick of the last kept
    /// summary, or 0 when nothing is kept.
    pub fn fork(&self, tick: u64) -> Self {
        let retained: Vec<EventSummary> = self
            .buffer
            .iter()
            .filter(|s| s.end_tick <= tick)
            .cloned()
            .collect();
        let watermark = retained.last().map_or(0, |s| s.end_tick);
        Self::with_history(self.world_id.clone(), retained, watermark, Some(self.id))
    }

    /// Identifier of this timeline.
    pub const fn id(&self) -> TimelineId {
        self.id
    }

    /// World this timeline belongs to.
    pub const fn world_id(&self) -> &WorldId {
        &self.world_id
    }

    /// Chat session this timeline is bound to.
    pub const fn session(&self) -> &SessionKey {
        &self.session
    }

    /// Highest tick already flushed or accounted for.
    pub const fn watermark(&self) -> u64 {
        self.watermark
    }

    /// Buffered summaries in arrival order.
    pub fn buffer(&self) -> &[EventSummary] {
        &self.buffer
    }

    /// Timeline this one was forked from, if any.
    pub const fn forked_from(&self) -> Option<TimelineId> {
        self.forked_from
    }

    /// When this timeline was created.
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub(crate) const fn buffer_mut(&mut self) -> &mut Vec<EventSummary> {
        &mut self.buffer
    }

    pub(crate) const fn set_watermark(&mut self, watermark: u64) {
        self.watermark = watermark;
    }

    /// Read-only summary for display.
    pub fn summary(&self, active: bool) -> TimelineSummary {
        TimelineSummary {
            id: self.id,
            world_id: self.world_id.clone(),
            chat_file: self.session.chat_file(),
            watermark: self.watermark,
            buffered: self.buffer.len(),
            forked_from: self.forked_from,
            has_pending_narrative: self.pending_narrative.is_some(),
            active,
            created_at: self.created_at,
        }
    }
}

/// Serializable view of a [`Timeline`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineSummary {
    /// Timeline identifier.
    pub id: TimelineId,
    /// Owning world.
    pub world_id: WorldId,
    /// Chat file backing the timeline's session.
    pub chat_file: String,
    /// Current watermark.
    pub watermark: u64,
    /// Number of buffered summaries.
    pub buffered: usize,
    /// Parent timeline for forks.
    pub forked_from: Option<TimelineId>,
    /// Whether a narrative is waiting to be dispatched.
    pub has_pending_narrative: bool,
    /// Whether this is the world's active timeline.
    pub active: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// How a timeline was chosen by [`World::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
    /// No candidate existed; a fresh timeline was created.
    Created,
    /// The candidate's watermark equalled the tick; it was reused.
    Continued,
    /// A new timeline was forked from the candidate.
    Forked {
        /// The timeline the fork was taken from.
        parent: TimelineId,
        /// Number of summaries carried over.
        retained: usize,
    },
}

/// Outcome of resolving a world at a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Resolved {
    /// The timeline that is now active.
    pub timeline_id: TimelineId,
    /// How it was chosen.
    pub resolution: Resolution,
    /// Whether the active timeline id changed, which requires a session
    /// rebind.
    pub active_changed: bool,
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// A world: every timeline observed for one save-game identity.
#[derive(Debug, Clone)]
pub struct World {
    id: WorldId,
    timelines: BTreeMap<TimelineId, Timeline>,
    active: Option<TimelineId>,
}

impl World {
    /// Create an empty world.
    pub const fn new(id: WorldId) -> Self {
        Self {
            id,
            timelines: BTreeMap::new(),
            active: None,
        }
    }

    /// Identifier of this world.
    pub const fn id(&self) -> &WorldId {
        &self.id
    }

    /// Resolve the timeline a save loaded at `tick` belongs to and make it
    /// active.
    pub fn resolve(&mut self, tick: u64) -> Resolved {
        let (timeline_id, resolution) = match self.best_candidate(tick) {
            None => {
                let fresh = Timeline::fresh(self.id.clone());
                let id = fresh.id();
                info!(world_id = %self.id, timeline_id = %id, tick, "created fresh timeline");
                self.timelines.insert(id, fresh);
                (id, Resolution::Created)
            }
            Some(candidate) if candidate.watermark() == tick => {
                debug!(world_id = %self.id, timeline_id = %candidate.id(), tick, "continuing timeline");
                (candidate.id(), Resolution::Continued)
            }
            Some(candidate) => {
                let fork = candidate.fork(tick);
                let parent = candidate.id();
                let id = fork.id();
                let retained = fork.buffer().len();
                info!(
                    world_id = %self.id,
                    parent = %parent,
                    timeline_id = %id,
                    tick,
                    retained,
                    watermark = fork.watermark(),
                    "forked timeline"
                );
                self.timelines.insert(id, fork);
                (id, Resolution::Forked { parent, retained })
            }
        };
        let active_changed = self.active != Some(timeline_id);
        self.active = Some(timeline_id);
        Resolved {
            timeline_id,
            resolution,
            active_changed,
        }
    }

    /// The candidate with watermark <= `tick` minimizing `tick - watermark`.
    fn best_candidate(&self, tick: u64) -> Option<&Timeline> {
        let mut best: Option<(u64, &Timeline)> = None;
        // Ascending id order plus strict `<` keeps the lowest id on ties.
        for timeline in self.timelines.values() {
            let Some(diff) = tick.checked_sub(timeline.watermark()) else {
                continue;
            };
            if best.is_none_or(|(best_diff, _)| diff < best_diff) {
                best = Some((diff, timeline));
            }
        }
        best.map(|(_, timeline)| timeline)
    }

    /// Make an existing timeline active.
    ///
    /// Returns `Some(true)` when the active id changed, `Some(false)` when
    /// it was already active, and `None` for an unknown id.
    pub fn activate(&mut self, timeline_id: TimelineId) -> Option<bool> {
        if !self.timelines.contains_key(&timeline_id) {
            return None;
        }
        let changed = self.active != Some(timeline_id);
        self.active = Some(timeline_id);
        Some(changed)
    }

    /// The active timeline's id.
    ///
    /// An id that points at no registered timeline is reported as absent.
    pub fn active_id(&self) -> Option<TimelineId> {
        match self.active {
            Some(id) if self.timelines.contains_key(&id) => Some(id),
            Some(id) => {
                warn!(world_id = %self.id, timeline_id = %id, "active timeline missing from arena");
                None
            }
            None => None,
        }
    }

    /// The active timeline.
    pub fn active(&self) -> Option<&Timeline> {
        self.active_id().and_then(|id| self.timelines.get(&id))
    }

    /// The active timeline, mutably.
    pub fn active_mut(&mut self) -> Option<&mut Timeline> {
        let id = self.active_id()?;
        self.timelines.get_mut(&id)
    }

    /// Look up a timeline.
    pub fn timeline(&self, id: TimelineId) -> Option<&Timeline> {
        self.timelines.get(&id)
    }

    /// Look up a timeline mutably.
    pub fn timeline_mut(&mut self, id: TimelineId) -> Option<&mut Timeline> {
        self.timelines.get_mut(&id)
    }

    /// All timelines in id order.
    pub fn timelines(&self) -> impl Iterator<Item = &Timeline> {
        self.timelines.values()
    }

    /// Number of registered timelines.
    pub fn len(&self) -> usize {
        self.timelines.len()
    }

    /// Whether no timeline has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.timelines.is_empty()
    }

    /// Register a timeline directly. Used when restoring state.
    pub fn insert(&mut self, timeline: Timeline) -> TimelineId {
        let id = timeline.id();
        self.timelines.insert(id, timeline);
        id
    }

    /// Read-only summary for display.
    pub fn summary(&self) -> WorldSummary {
        let active = self.active_id();
        WorldSummary {
            id: self.id.clone(),
            timelines: self.timelines.len(),
            active_timeline: active,
            active_watermark: self.active().map(Timeline::watermark),
        }
    }

    /// Summaries of every timeline, in id order.
    pub fn timeline_summaries(&self) -> Vec<TimelineSummary> {
        let active = self.active_id();
        self.timelines
            .values()
            .map(|t| t.summary(active == Some(t.id())))
            .collect()
    }
}

/// Serializable view of a [`World`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorldSummary {
    /// World identifier.
    pub id: WorldId,
    /// Number of timelines.
    pub timelines: usize,
    /// Active timeline, if any.
    pub active_timeline: Option<TimelineId>,
    /// Watermark of the active timeline.
    pub active_watermark: Option<u64>,
}
