//! The bridge context: every world seen this process lifetime, which one
//! is active, and the collaborators the core drives.
//!
//! [`Bridge`] is the explicit session object the resolver, flush scheduler
//! and reconciliation engine run against. It is shared behind an [`Arc`]
//! between the event-stream task, the poller and the control API.
//!
//! # Locking
//!
//! Each world has its own mutex around its timeline arena, held for the
//! whole of an append-and-flush or a resolution, so messages for one world
//! are applied strictly in order. Reconciliation runs through the world's
//! [`ReconcileGate`] and never takes the world mutex, which lets a flush
//! wait for the pass it triggered without deadlocking.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sillyworld_types::{EventSummary, Locale, SessionKey, StreamMessage, TimelineId, WorldId};
use tokio::sync::{Mutex, RwLock, broadcast};
use tracing::{debug, info, warn};

use crate::collab::{ChatSession, CollaboratorError, EntryStore, GameStateSource};
use crate::config::BridgeConfig;
use crate::flush::{self, AppendOutcome};
use crate::gate::{GateOutcome, ReconcileGate};
use crate::lore::{LoreError, LoreFormatter};
use crate::reconcile::{ReconcileError, ReconcileReport, ReconciliationEngine, book_name};
use crate::timeline::{Resolution, Resolved, TimelineSummary, World, WorldSummary};
use crate::translate::EventTranslator;

/// Capacity of the notice broadcast channel.
const NOTICE_CAPACITY: usize = 256;

/// Errors surfaced by bridge operations.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// No world with this id has been seen.
    #[error("unknown world {0}")]
    UnknownWorld(WorldId),

    /// The world has no timeline with this id.
    #[error("world {world_id} has no timeline {timeline_id}")]
    UnknownTimeline {
        /// The world that was searched.
        world_id: WorldId,
        /// The missing timeline.
        timeline_id: TimelineId,
    },

    /// The world has no active timeline yet.
    #[error("world {0} has no active timeline")]
    NoActiveTimeline(WorldId),

    /// There is no pending narrative to send.
    #[error("world {0} has no pending narrative")]
    NothingToSend(WorldId),

    /// Neither a fresh nor a cached snapshot is available.
    #[error("no snapshot available for world {0}")]
    NoSnapshot(WorldId),

    /// A collaborator call failed.
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    /// A reconciliation pass could not start.
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    /// Lore rendering failed.
    #[error(transparent)]
    Lore(#[from] LoreError),
}

impl BridgeError {
    /// Whether the same request may succeed later without intervention.
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Collaborator(e) | Self::Reconcile(ReconcileError::List { source: e, .. }) => {
                e.is_transient()
            }
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Construction-time settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeSettings {
    /// Narrative and snapshot language.
    pub locale: Locale,
    /// Dispatch narratives as soon as they are produced.
    pub auto_dispatch: bool,
    /// Prefix of per-world book names.
    pub worldbook_prefix: String,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self::from(&BridgeConfig::default())
    }
}

impl From<&BridgeConfig> for BridgeSettings {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            locale: config.narrative.language,
            auto_dispatch: config.narrative.auto_send,
            worldbook_prefix: config.tavern.worldbook_prefix.clone(),
        }
    }
}

/// Settings an operator can change at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeSettings {
    /// Narrative and snapshot language.
    pub locale: Locale,
    /// Dispatch narratives as soon as they are produced.
    pub auto_dispatch: bool,
}

// ---------------------------------------------------------------------------
// Notices and receipts
// ---------------------------------------------------------------------------

/// Something operators should hear about.
#[derive(Debug, Clone, Serialize)]
pub struct Notice {
    /// When it happened.
    pub at: DateTime<Utc>,
    /// The world it concerns, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub world_id: Option<WorldId>,
    /// What happened.
    #[serde(flatten)]
    pub kind: NoticeKind,
}

/// The kinds of [`Notice`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NoticeKind {
    /// A reload resolved to a timeline.
    WorldResolved {
        /// The now-active timeline.
        timeline_id: TimelineId,
        /// How it was chosen.
        resolution: Resolution,
        /// The save's tick.
        tick: u64,
    },
    /// The operator switched timelines by hand.
    TimelineActivated {
        /// The now-active timeline.
        timeline_id: TimelineId,
    },
    /// A flush produced narrative text.
    NarrativeReady {
        /// Timeline that was flushed.
        timeline_id: TimelineId,
        /// Its new watermark.
        watermark: u64,
        /// The narrative.
        text: String,
    },
    /// A narrative was sent to the chat.
    NarrativeDispatched {
        /// Timeline the narrative came from.
        timeline_id: TimelineId,
    },
    /// A reconciliation pass finished.
    Reconciled {
        /// What it wrote.
        report: ReconcileReport,
    },
    /// A collaborator call failed.
    Failure {
        /// The operation that failed.
        operation: &'static str,
        /// Error text.
        message: String,
    },
}

/// Result of a flush.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    /// Timeline that was flushed.
    pub timeline_id: TimelineId,
    /// Number of summaries drained.
    pub summaries: usize,
    /// Watermark before the flush.
    pub previous_watermark: u64,
    /// Watermark after the flush.
    pub watermark: u64,
    /// The narrative produced; empty when no summary carried events.
    pub narrative: String,
    /// Whether the narrative was dispatched.
    pub dispatched: bool,
}

/// Result of receiving one event summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryReceipt {
    /// Timeline the summary was routed to.
    pub timeline_id: TimelineId,
    /// Whether it was buffered (stale and inverted windows are dropped).
    pub accepted: bool,
    /// The flush it triggered, if any.
    pub flushed: Option<FlushReport>,
}

/// Result of [`Bridge::ingest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IngestReceipt {
    /// A reload was resolved.
    Resolved(Resolved),
    /// A summary was received.
    Summary(SummaryReceipt),
    /// A summary arrived with no world to route it to.
    Unrouted,
}

/// Narrative state of a world's active timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NarrativeView {
    /// The active timeline.
    pub timeline_id: TimelineId,
    /// Narrative awaiting dispatch.
    pub pending: Option<String>,
    /// Most recent narrative produced.
    pub last: Option<String>,
}

// ---------------------------------------------------------------------------
// Bridge
// ---------------------------------------------------------------------------

struct WorldSlot {
    world: Mutex<World>,
    gate: ReconcileGate,
}

impl WorldSlot {
    fn new(id: WorldId) -> Self {
        Self {
            world: Mutex::new(World::new(id)),
            gate: ReconcileGate::new(),
        }
    }
}

/// The core's session context.
pub struct Bridge {
    game: Arc<dyn GameStateSource>,
    store: Arc<dyn EntryStore>,
    chat: Arc<dyn ChatSession>,
    worlds: RwLock<BTreeMap<WorldId, Arc<WorldSlot>>>,
    active_world: RwLock<Option<WorldId>>,
    locale: RwLock<Locale>,
    auto_dispatch: AtomicBool,
    worldbook_prefix: String,
    translator: EventTranslator,
    engine: ReconciliationEngine,
    lore: LoreFormatter,
    notices: broadcast::Sender<Notice>,
}

impl Bridge {
    /// Create a bridge over the given collaborators.
    pub fn new(
        game: Arc<dyn GameStateSource>,
        store: Arc<dyn EntryStore>,
        chat: Arc<dyn ChatSession>,
        settings: BridgeSettings,
        lore: LoreFormatter,
    ) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            game,
            store,
            chat,
            worlds: RwLock::new(BTreeMap::new()),
            active_world: RwLock::new(None),
            locale: RwLock::new(settings.locale),
            auto_dispatch: AtomicBool::new(settings.auto_dispatch),
            worldbook_prefix: settings.worldbook_prefix,
            translator: EventTranslator::new(),
            engine: ReconciliationEngine::default(),
            lore,
            notices,
        }
    }

    /// Replace the reconciliation engine (and with it the snapshot
    /// transform rules).
    #[must_use]
    pub fn with_engine(mut self, engine: ReconciliationEngine) -> Self {
        self.engine = engine;
        self
    }

    // -----------------------------------------------------------------------
    // Settings and notices
    // -----------------------------------------------------------------------

    /// Subscribe to operator notices.
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// Broadcast a notice; returns the number of subscribers reached.
    fn notify(&self, world_id: Option<&WorldId>, kind: NoticeKind) -> usize {
        let notice = Notice {
            at: Utc::now(),
            world_id: world_id.cloned(),
            kind,
        };
        self.notices.send(notice).unwrap_or(0)
    }

    /// Current output language.
    pub async fn locale(&self) -> Locale {
        *self.locale.read().await
    }

    /// Change the output language for subsequent flushes and fetches.
    pub async fn set_locale(&self, locale: Locale) {
        *self.locale.write().await = locale;
        info!(locale = %locale, "locale changed");
    }

    /// Whether narratives are dispatched automatically.
    pub fn auto_dispatch(&self) -> bool {
        self.auto_dispatch.load(Ordering::Acquire)
    }

    /// Turn automatic dispatch on or off.
    pub fn set_auto_dispatch(&self, enabled: bool) {
        self.auto_dispatch.store(enabled, Ordering::Release);
        info!(enabled, "auto dispatch changed");
    }

    /// Snapshot of the runtime settings.
    pub async fn settings(&self) -> RuntimeSettings {
        RuntimeSettings {
            locale: self.locale().await,
            auto_dispatch: self.auto_dispatch(),
        }
    }

    /// Apply runtime settings.
    pub async fn apply_settings(&self, settings: RuntimeSettings) {
        self.set_locale(settings.locale).await;
        self.set_auto_dispatch(settings.auto_dispatch);
    }

    // -----------------------------------------------------------------------
    // Read-only views
    // -----------------------------------------------------------------------

    /// The world whose save is currently loaded.
    pub async fn active_world(&self) -> Option<WorldId> {
        self.active_world.read().await.clone()
    }

    /// Summaries of every known world.
    pub async fn worlds(&self) -> Vec<WorldSummary> {
        let slots: Vec<_> = self.worlds.read().await.values().cloned().collect();
        let mut summaries = Vec::with_capacity(slots.len());
        for slot in slots {
            summaries.push(slot.world.lock().await.summary());
        }
        summaries
    }

    /// Summaries of one world's timelines.
    pub async fn timelines(&self, world_id: &WorldId) -> Result<Vec<TimelineSummary>, BridgeError> {
        let slot = self.existing_slot(world_id).await?;
        let world = slot.world.lock().await;
        Ok(world.timeline_summaries())
    }

    /// Narrative state of a world's active timeline.
    pub async fn narrative(&self, world_id: &WorldId) -> Result<NarrativeView, BridgeError> {
        let slot = self.existing_slot(world_id).await?;
        let world = slot.world.lock().await;
        let timeline = world
            .active()
            .ok_or_else(|| BridgeError::NoActiveTimeline(world_id.clone()))?;
        Ok(NarrativeView {
            timeline_id: timeline.id(),
            pending: timeline.pending_narrative.clone(),
            last: timeline.last_narrative.clone(),
        })
    }

    /// Fetch the lore document and render it as markdown.
    pub async fn lore(&self) -> Result<String, BridgeError> {
        let locale = self.locale().await;
        let document = self.game.fetch_lore(locale).await?;
        Ok(self.lore.render(&document, locale)?)
    }

    // -----------------------------------------------------------------------
    // Inbound signals
    // -----------------------------------------------------------------------

    /// Route one decoded stream message.
    pub async fn ingest(&self, message: StreamMessage) -> Result<IngestReceipt, BridgeError> {
        match message {
            StreamMessage::SaveLoaded(loaded) => {
                let resolved = self.on_world_reloaded(&loaded.world_id, loaded.tick).await;
                Ok(IngestReceipt::Resolved(resolved))
            }
            StreamMessage::TimePeriodSummary(summary) => {
                let world_id = match summary.world_id.clone() {
                    Some(id) => id,
                    None => match self.active_world().await {
                        Some(id) => id,
                        None => {
                            warn!(
                                start = summary.start_tick,
                                end = summary.end_tick,
                                "summary arrived before any save was loaded; dropping"
                            );
                            return Ok(IngestReceipt::Unrouted);
                        }
                    },
                };
                let receipt = self.on_event_summary_received(&world_id, summary).await?;
                Ok(IngestReceipt::Summary(receipt))
            }
        }
    }

    /// A save of `world_id` taken at `tick` was loaded.
    ///
    /// Resolves the timeline, rebinds the chat session when the active
    /// timeline changed, then refreshes and reconciles the snapshot. A
    /// failed refresh is reported but does not undo the resolution.
    pub async fn on_world_reloaded(&self, world_id: &WorldId, tick: u64) -> Resolved {
        let slot = self.slot(world_id).await;
        let previous = self.active_world.write().await.replace(world_id.clone());
        let world_switched = previous.as_ref() != Some(world_id);

        let resolved = {
            let mut world = slot.world.lock().await;
            let resolved = world.resolve(tick);
            if resolved.active_changed || world_switched {
                let session = SessionKey::new(world_id, resolved.timeline_id);
                self.rebind(world_id, resolved.timeline_id, &session).await;
            }
            resolved
        };
        self.notify(
            Some(world_id),
            NoticeKind::WorldResolved {
                timeline_id: resolved.timeline_id,
                resolution: resolved.resolution,
                tick,
            },
        );

        if let Err(e) = self.refresh(world_id, &slot, true).await {
            warn!(world_id = %world_id, error = %e, "post-load refresh failed");
        }
        resolved
    }

    /// A summary for `world_id` arrived.
    ///
    /// The summary is appended to the active timeline's buffer and, when
    /// the flush window is crossed, the buffer is flushed at the summary's
    /// end tick before this returns.
    pub async fn on_event_summary_received(
        &self,
        world_id: &WorldId,
        summary: EventSummary,
    ) -> Result<SummaryReceipt, BridgeError> {
        let slot = self.slot(world_id).await;
        let mut world = slot.world.lock().await;

        let timeline_id = match world.active_id() {
            Some(id) => id,
            None => {
                warn!(world_id = %world_id, "summary for a world with no active timeline; treating as fresh");
                let resolved = world.resolve(0);
                let mut active = self.active_world.write().await;
                if active.is_none() {
                    *active = Some(world_id.clone());
                }
                drop(active);
                let session = SessionKey::new(world_id, resolved.timeline_id);
                self.rebind(world_id, resolved.timeline_id, &session).await;
                resolved.timeline_id
            }
        };
        let timeline = world
            .timeline_mut(timeline_id)
            .ok_or_else(|| BridgeError::NoActiveTimeline(world_id.clone()))?;

        let end_tick = summary.end_tick;
        let outcome = flush::append(timeline, summary);
        let flushed = match outcome {
            AppendOutcome::Buffered { should_flush: true } => {
                self.flush_locked(world_id, &slot.gate, &mut world, end_tick).await
            }
            _ => None,
        };
        Ok(SummaryReceipt {
            timeline_id,
            accepted: matches!(outcome, AppendOutcome::Buffered { .. }),
            flushed,
        })
    }

    /// Flush the active timeline now, up to its largest buffered end tick.
    ///
    /// Returns `Ok(None)` when the buffer is empty.
    pub async fn request_manual_flush(&self, world_id: &WorldId) -> Result<Option<FlushReport>, BridgeError> {
        let slot = self.existing_slot(world_id).await?;
        let mut world = slot.world.lock().await;
        let timeline = world
            .active()
            .ok_or_else(|| BridgeError::NoActiveTimeline(world_id.clone()))?;
        let Some(tick) = flush::manual_flush_tick(timeline) else {
            debug!(world_id = %world_id, "manual flush with empty buffer");
            return Ok(None);
        };
        Ok(self.flush_locked(world_id, &slot.gate, &mut world, tick).await)
    }

    /// Reconcile the world's entries.
    ///
    /// For the loaded world a fresh snapshot is fetched, falling back to
    /// the cached one when the fetch fails; other worlds use their cached
    /// snapshot. Returns `Ok(None)` when the request was coalesced into a
    /// pass already in flight.
    pub async fn request_reconciliation(
        &self,
        world_id: &WorldId,
    ) -> Result<Option<ReconcileReport>, BridgeError> {
        let slot = self.existing_slot(world_id).await?;
        let fresh = if self.is_active_world(world_id).await {
            match self.fetch_snapshot(world_id).await {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    warn!(world_id = %world_id, error = %e, "using cached snapshot");
                    None
                }
            }
        } else {
            None
        };

        let snapshot = {
            let mut world = slot.world.lock().await;
            let timeline = world
                .active_mut()
                .ok_or_else(|| BridgeError::NoActiveTimeline(world_id.clone()))?;
            if let Some(snapshot) = fresh {
                timeline.last_snapshot = Some(snapshot);
            }
            timeline
                .last_snapshot
                .clone()
                .ok_or_else(|| BridgeError::NoSnapshot(world_id.clone()))?
        };
        self.reconcile_snapshot(world_id, &slot.gate, snapshot).await
    }

    /// Periodic refresh of the loaded world's snapshot.
    ///
    /// Unchanged documents are not reconciled again.
    pub async fn poll_snapshot(&self) -> Result<Option<ReconcileReport>, BridgeError> {
        let Some(world_id) = self.active_world().await else {
            debug!("no save loaded; skipping poll");
            return Ok(None);
        };
        let slot = self.slot(&world_id).await;
        self.refresh(&world_id, &slot, false).await
    }

    /// Make an existing timeline active, rebinding the chat session if the
    /// active id changed.
    pub async fn switch_timeline(
        &self,
        world_id: &WorldId,
        timeline_id: TimelineId,
    ) -> Result<bool, BridgeError> {
        let slot = self.existing_slot(world_id).await?;
        let mut world = slot.world.lock().await;
        let changed = world
            .activate(timeline_id)
            .ok_or_else(|| BridgeError::UnknownTimeline {
                world_id: world_id.clone(),
                timeline_id,
            })?;
        if changed {
            info!(world_id = %world_id, timeline_id = %timeline_id, "timeline activated");
            let session = SessionKey::new(world_id, timeline_id);
            self.rebind(world_id, timeline_id, &session).await;
            self.notify(Some(world_id), NoticeKind::TimelineActivated { timeline_id });
        }
        Ok(changed)
    }

    /// Dispatch the active timeline's pending narrative.
    ///
    /// The pending text is cleared only when dispatch succeeds.
    pub async fn send_narrative(&self, world_id: &WorldId) -> Result<(), BridgeError> {
        let slot = self.existing_slot(world_id).await?;
        let mut world = slot.world.lock().await;
        let timeline = world
            .active_mut()
            .ok_or_else(|| BridgeError::NoActiveTimeline(world_id.clone()))?;
        let text = timeline
            .pending_narrative
            .clone()
            .ok_or_else(|| BridgeError::NothingToSend(world_id.clone()))?;
        let timeline_id = timeline.id();
        self.dispatch(world_id, timeline_id, &text).await?;
        timeline.pending_narrative = None;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// The slot for `world_id`, created on first sighting.
    async fn slot(&self, world_id: &WorldId) -> Arc<WorldSlot> {
        if let Some(slot) = self.worlds.read().await.get(world_id) {
            return Arc::clone(slot);
        }
        let mut worlds = self.worlds.write().await;
        let slot = worlds.entry(world_id.clone()).or_insert_with(|| {
            info!(world_id = %world_id, "new world");
            Arc::new(WorldSlot::new(world_id.clone()))
        });
        Arc::clone(slot)
    }

    async fn existing_slot(&self, world_id: &WorldId) -> Result<Arc<WorldSlot>, BridgeError> {
        self.worlds
            .read()
            .await
            .get(world_id)
            .cloned()
            .ok_or_else(|| BridgeError::UnknownWorld(world_id.clone()))
    }

    async fn is_active_world(&self, world_id: &WorldId) -> bool {
        self.active_world.read().await.as_ref() == Some(world_id)
    }

    async fn rebind(&self, world_id: &WorldId, timeline_id: TimelineId, session: &SessionKey) {
        match self.chat.rebind_session(world_id, timeline_id, session).await {
            Ok(()) => {
                info!(world_id = %world_id, timeline_id = %timeline_id, chat_file = %session.chat_file(), "session rebound");
            }
            Err(e) => {
                warn!(world_id = %world_id, timeline_id = %timeline_id, error = %e, "session rebind failed");
                self.notify(
                    Some(world_id),
                    NoticeKind::Failure {
                        operation: "rebind_session",
                        message: e.to_string(),
                    },
                );
            }
        }
    }

    async fn dispatch(&self, world_id: &WorldId, timeline_id: TimelineId, text: &str) -> Result<(), BridgeError> {
        match self.chat.dispatch_narrative(text).await {
            Ok(()) => {
                info!(world_id = %world_id, timeline_id = %timeline_id, chars = text.chars().count(), "narrative dispatched");
                self.notify(Some(world_id), NoticeKind::NarrativeDispatched { timeline_id });
                Ok(())
            }
            Err(e) => {
                warn!(world_id = %world_id, timeline_id = %timeline_id, error = %e, "narrative dispatch failed");
                self.notify(
                    Some(world_id),
                    NoticeKind::Failure {
                        operation: "dispatch_narrative",
                        message: e.to_string(),
                    },
                );
                Err(e.into())
            }
        }
    }

    async fn fetch_snapshot(&self, world_id: &WorldId) -> Result<Value, CollaboratorError> {
        let locale = self.locale().await;
        self.game.fetch_snapshot(locale).await.inspect_err(|e| {
            self.notify(
                Some(world_id),
                NoticeKind::Failure {
                    operation: "fetch_snapshot",
                    message: e.to_string(),
                },
            );
        })
    }

    /// Fetch the loaded world's snapshot, cache it on the active timeline
    /// and reconcile it. Without `force`, an unchanged document stops here.
    async fn refresh(
        &self,
        world_id: &WorldId,
        slot: &WorldSlot,
        force: bool,
    ) -> Result<Option<ReconcileReport>, BridgeError> {
        let snapshot = self.fetch_snapshot(world_id).await?;
        {
            let mut world = slot.world.lock().await;
            let Some(timeline) = world.active_mut() else {
                debug!(world_id = %world_id, "no active timeline to cache snapshot on");
                return Ok(None);
            };
            if !force && timeline.last_snapshot.as_ref() == Some(&snapshot) {
                debug!(world_id = %world_id, "snapshot unchanged");
                return Ok(None);
            }
            timeline.last_snapshot = Some(snapshot.clone());
        }
        self.reconcile_snapshot(world_id, &slot.gate, snapshot).await
    }

    async fn reconcile_snapshot(
        &self,
        world_id: &WorldId,
        gate: &ReconcileGate,
        snapshot: Value,
    ) -> Result<Option<ReconcileReport>, BridgeError> {
        let book = book_name(&self.worldbook_prefix, world_id);
        let engine = &self.engine;
        let store = self.store.as_ref();
        let book_ref = book.as_str();
        let outcome = gate
            .submit(snapshot, move |snapshot| async move {
                engine.run(store, book_ref, &snapshot).await
            })
            .await;
        match outcome {
            GateOutcome::Coalesced => Ok(None),
            GateOutcome::Ran(Ok(report)) => {
                self.notify(
                    Some(world_id),
                    NoticeKind::Reconciled {
                        report: report.clone(),
                    },
                );
                Ok(Some(report))
            }
            GateOutcome::Ran(Err(e)) => {
                warn!(world_id = %world_id, error = %e, "reconciliation pass failed");
                self.notify(
                    Some(world_id),
                    NoticeKind::Failure {
                        operation: "reconcile",
                        message: e.to_string(),
                    },
                );
                Err(e.into())
            }
        }
    }

    /// Flush the active timeline of a locked world at `flush_tick`.
    ///
    /// The snapshot is refreshed and reconciled first so entries reflect
    /// state at or after the flush point; a failed refresh only costs
    /// freshness. Dispatch failures leave the narrative pending.
    async fn flush_locked(
        &self,
        world_id: &WorldId,
        gate: &ReconcileGate,
        world: &mut World,
        flush_tick: u64,
    ) -> Option<FlushReport> {
        let timeline_id = world.active_id()?;
        if world.timeline(timeline_id)?.buffer().is_empty() {
            return None;
        }

        if self.is_active_world(world_id).await {
            match self.fetch_snapshot(world_id).await {
                Ok(snapshot) => {
                    if let Some(timeline) = world.timeline_mut(timeline_id) {
                        timeline.last_snapshot = Some(snapshot.clone());
                    }
                    if let Err(e) = self.reconcile_snapshot(world_id, gate, snapshot).await {
                        warn!(world_id = %world_id, error = %e, "pre-flush reconciliation failed; flushing anyway");
                    }
                }
                Err(e) => {
                    warn!(world_id = %world_id, error = %e, "snapshot refresh failed; flushing with cached state");
                }
            }
        }

        let locale = self.locale().await;
        let timeline = world.timeline_mut(timeline_id)?;
        let batch = flush::drain(timeline, flush_tick)?;
        let narrative = batch.render(&self.translator, locale);
        info!(
            world_id = %world_id,
            timeline_id = %timeline_id,
            summaries = batch.summaries.len(),
            previous_watermark = batch.previous_watermark,
            watermark = batch.watermark,
            "buffer flushed"
        );

        let mut dispatched = false;
        if narrative.is_empty() {
            debug!(world_id = %world_id, timeline_id = %timeline_id, "flush produced no narrative");
        } else {
            timeline.pending_narrative = Some(narrative.clone());
            timeline.last_narrative = Some(narrative.clone());
            self.notify(
                Some(world_id),
                NoticeKind::NarrativeReady {
                    timeline_id,
                    watermark: batch.watermark,
                    text: narrative.clone(),
                },
            );
            if self.auto_dispatch() && self.dispatch(world_id, timeline_id, &narrative).await.is_ok() {
                timeline.pending_narrative = None;
                dispatched = true;
            }
        }

        Some(FlushReport {
            timeline_id,
            summaries: batch.summaries.len(),
            previous_watermark: batch.previous_watermark,
            watermark: batch.watermark,
            narrative,
            dispatched,
        })
    }
}
