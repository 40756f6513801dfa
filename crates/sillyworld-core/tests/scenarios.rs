//! End-to-end scenarios for the bridge core.
//!
//! Each test drives a [`Bridge`] over in-memory collaborators the way the
//! event stream and the control API would, then inspects timelines, the
//! entry store and the chat.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use sillyworld_core::bridge::{Bridge, BridgeSettings, IngestReceipt};
use sillyworld_core::collab::{
    ChatSession, CollaboratorError, EntryStore, GameStateSource, MemoryEntryStore, RecordingChat,
    StaticGameState,
};
use sillyworld_core::flush::FLUSH_WINDOW;
use sillyworld_core::lore::LoreFormatter;
use sillyworld_core::timeline::Resolution;
use sillyworld_types::{
    ActivationStrategy, DerivedEntry, EventSummary, GameEvent, SessionKey, StreamMessage, TimelineId,
    WorldId,
};
use tokio::sync::Mutex;

const BOOK: &str = "[Sillyworld] Data - Alpha";

struct Rig {
    bridge: Bridge,
    game: Arc<StaticGameState>,
    store: Arc<MemoryEntryStore>,
    chat: Arc<RecordingChat>,
}

fn rig(snapshot: Value) -> Rig {
    let game = Arc::new(StaticGameState::new(snapshot));
    let store = Arc::new(MemoryEntryStore::new());
    let chat = Arc::new(RecordingChat::new());
    let bridge = Bridge::new(
        Arc::clone(&game) as Arc<dyn GameStateSource>,
        Arc::clone(&store) as Arc<dyn EntryStore>,
        Arc::clone(&chat) as Arc<dyn ChatSession>,
        BridgeSettings::default(),
        LoreFormatter::embedded().unwrap(),
    );
    Rig {
        bridge,
        game,
        store,
        chat,
    }
}

fn death(victim: &str, tick: u64) -> GameEvent {
    serde_json::from_value(json!({
        "Type": "PawnDied",
        "Tick": tick,
        "Participants": [{"Role": "victim", "PawnName": victim}]
    }))
    .unwrap()
}

fn summary(start: u64, end: u64, victim: &str) -> EventSummary {
    EventSummary::new(start, end, vec![death(victim, start)])
}

fn entry(name: &str, enabled: bool) -> DerivedEntry {
    DerivedEntry {
        name: name.to_owned(),
        content: "{}".to_owned(),
        keywords: Vec::new(),
        strategy: ActivationStrategy::KeywordTriggered,
        enabled,
    }
}

fn alpha() -> WorldId {
    WorldId::new("Alpha")
}

#[tokio::test]
async fn alpha_flushes_after_four_summaries() {
    let r = rig(json!({}));
    let world = alpha();

    let resolved = r.bridge.on_world_reloaded(&world, 0).await;
    assert_eq!(resolved.resolution, Resolution::Created);

    for (start, end, who) in [(0, 3000, "Ann"), (3000, 6000, "Bob"), (6000, 9000, "Cid")] {
        let receipt = r
            .bridge
            .on_event_summary_received(&world, summary(start, end, who))
            .await
            .unwrap();
        assert!(receipt.accepted);
        assert!(receipt.flushed.is_none());
    }

    let receipt = r
        .bridge
        .on_event_summary_received(&world, summary(9000, 10_200, "Dee"))
        .await
        .unwrap();
    let flushed = receipt.flushed.unwrap();
    assert_eq!(flushed.summaries, 4);
    assert_eq!(flushed.previous_watermark, 0);
    assert_eq!(flushed.watermark, 10_200);

    let positions: Vec<usize> = ["Ann", "Bob", "Cid", "Dee"]
        .iter()
        .map(|who| flushed.narrative.find(who).unwrap())
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(flushed.narrative.matches("\n\n【").count(), 3);

    let timelines = r.bridge.timelines(&world).await.unwrap();
    assert_eq!(timelines.len(), 1);
    assert_eq!(timelines[0].buffered, 0);
    assert_eq!(timelines[0].watermark, 10_200);
    assert!(timelines[0].has_pending_narrative);
}

#[tokio::test]
async fn reload_behind_flushed_watermark_starts_new_timeline() {
    let r = rig(json!({}));
    let world = alpha();
    let first = r.bridge.on_world_reloaded(&world, 0).await;
    r.bridge
        .on_event_summary_received(&world, summary(0, 10_200, "Ann"))
        .await
        .unwrap();

    let second = r.bridge.on_world_reloaded(&world, 5000).await;
    assert_ne!(second.timeline_id, first.timeline_id);
    assert_eq!(second.resolution, Resolution::Created);

    let timelines = r.bridge.timelines(&world).await.unwrap();
    let active = timelines.iter().find(|t| t.active).unwrap();
    assert_eq!(active.id, second.timeline_id);
    assert_eq!(active.watermark, 0);
    assert_eq!(active.buffered, 0);
    assert_eq!(r.chat.rebinds().await.len(), 2);
}

#[tokio::test]
async fn reload_inside_unflushed_window_forks_prefix() {
    let r = rig(json!({}));
    let world = alpha();
    let first = r.bridge.on_world_reloaded(&world, 0).await;
    for (start, end, who) in [(0, 2000, "Ann"), (2000, 4000, "Bob"), (4000, 6000, "Cid")] {
        r.bridge
            .on_event_summary_received(&world, summary(start, end, who))
            .await
            .unwrap();
    }

    let forked = r.bridge.on_world_reloaded(&world, 5000).await;
    assert_eq!(
        forked.resolution,
        Resolution::Forked {
            parent: first.timeline_id,
            retained: 2
        }
    );

    let timelines = r.bridge.timelines(&world).await.unwrap();
    let child = timelines.iter().find(|t| t.id == forked.timeline_id).unwrap();
    assert_eq!(child.buffered, 2);
    assert_eq!(child.watermark, 4000);
    assert_eq!(child.forked_from, Some(first.timeline_id));
    let parent = timelines.iter().find(|t| t.id == first.timeline_id).unwrap();
    assert_eq!(parent.buffered, 3);
}

#[tokio::test]
async fn flush_threshold_boundary() {
    let r = rig(json!({}));
    let world = alpha();
    r.bridge.on_world_reloaded(&world, 1000).await;

    let below = r
        .bridge
        .on_event_summary_received(&world, summary(1000, 1000 + FLUSH_WINDOW - 1, "Ann"))
        .await
        .unwrap();
    assert!(below.flushed.is_none());

    let at = r
        .bridge
        .on_event_summary_received(&world, summary(1000 + FLUSH_WINDOW - 1, 1000 + FLUSH_WINDOW, "Bob"))
        .await
        .unwrap();
    assert!(at.flushed.is_none());

    let above = r
        .bridge
        .on_event_summary_received(&world, summary(1000 + FLUSH_WINDOW, 1000 + FLUSH_WINDOW + 1, "Cid"))
        .await
        .unwrap();
    assert_eq!(above.flushed.unwrap().watermark, 1000 + FLUSH_WINDOW + 1);
}

#[tokio::test]
async fn watermark_never_decreases_across_flushes() {
    let r = rig(json!({}));
    let world = alpha();
    r.bridge.on_world_reloaded(&world, 0).await;

    let mut watermarks = Vec::new();
    for (start, end) in [(0, 500), (500, 11_000), (11_000, 11_500), (11_500, 30_000)] {
        let receipt = r
            .bridge
            .on_event_summary_received(&world, summary(start, end, "Ann"))
            .await
            .unwrap();
        if let Some(flushed) = receipt.flushed {
            watermarks.push(flushed.watermark);
        }
    }
    if let Some(flushed) = r.bridge.request_manual_flush(&world).await.unwrap() {
        watermarks.push(flushed.watermark);
    }
    assert!(watermarks.len() >= 2);
    assert!(watermarks.windows(2).all(|w| w[0] <= w[1]));

    // A stale summary cannot pull the watermark back.
    let stale = r
        .bridge
        .on_event_summary_received(&world, summary(100, 200, "Bob"))
        .await
        .unwrap();
    assert!(!stale.accepted);
    let timelines = r.bridge.timelines(&world).await.unwrap();
    assert_eq!(timelines[0].watermark, *watermarks.last().unwrap());
}

/// Chat that records which entry names the store held at each dispatch.
struct StoreWatchingChat {
    store: Arc<MemoryEntryStore>,
    seen: Mutex<Vec<Vec<String>>>,
}

#[async_trait]
impl ChatSession for StoreWatchingChat {
    async fn rebind_session(
        &self,
        _world_id: &WorldId,
        _timeline_id: TimelineId,
        _session: &SessionKey,
    ) -> Result<(), CollaboratorError> {
        Ok(())
    }

    async fn dispatch_narrative(&self, _text: &str) -> Result<(), CollaboratorError> {
        let names = self.store.entries(BOOK).await.into_iter().map(|e| e.name).collect();
        self.seen.lock().await.push(names);
        Ok(())
    }
}

#[tokio::test]
async fn automatic_flush_reconciles_fresh_state_before_dispatch() {
    let game = Arc::new(StaticGameState::new(json!({})));
    let store = Arc::new(MemoryEntryStore::new());
    let chat = Arc::new(StoreWatchingChat {
        store: Arc::clone(&store),
        seen: Mutex::new(Vec::new()),
    });
    let bridge = Bridge::new(
        Arc::clone(&game) as Arc<dyn GameStateSource>,
        Arc::clone(&store) as Arc<dyn EntryStore>,
        Arc::clone(&chat) as Arc<dyn ChatSession>,
        BridgeSettings::default(),
        LoreFormatter::embedded().unwrap(),
    );
    bridge.set_auto_dispatch(true);
    let world = alpha();
    bridge.on_world_reloaded(&world, 0).await;
    assert!(store.entry(BOOK, "[Pawn] Bob").await.is_none());

    // Bob joins between the reload and the flush.
    game.set_snapshot(Some(json!({"PlayerPawns": [{"FullName": "Bob"}]}))).await;
    let fetches = game.snapshot_fetches();
    let receipt = bridge
        .on_event_summary_received(&world, summary(0, FLUSH_WINDOW + 1, "Ann"))
        .await
        .unwrap();
    let flushed = receipt.flushed.unwrap();
    assert!(flushed.dispatched);

    assert_eq!(game.snapshot_fetches(), fetches.saturating_add(1));
    let seen = chat.seen.lock().await;
    assert_eq!(seen.len(), 1);
    assert!(seen[0].iter().any(|name| name == "[Pawn] Bob"));
}

#[tokio::test]
async fn flush_survives_snapshot_fetch_failure() {
    let r = rig(json!({}));
    r.bridge.set_auto_dispatch(true);
    let world = alpha();
    r.bridge.on_world_reloaded(&world, 0).await;
    r.store.clear_writes().await;

    r.game.set_snapshot(None).await;
    let fetches = r.game.snapshot_fetches();
    let receipt = r
        .bridge
        .on_event_summary_received(&world, summary(0, FLUSH_WINDOW + 1, "Ann"))
        .await
        .unwrap();
    let flushed = receipt.flushed.unwrap();

    assert_eq!(r.game.snapshot_fetches(), fetches.saturating_add(1));
    assert!(r.store.writes().await.is_empty());
    assert_eq!(flushed.watermark, FLUSH_WINDOW + 1);
    assert!(flushed.dispatched);
    assert!(r.chat.dispatched().await[0].contains("Ann"));
    let timelines = r.bridge.timelines(&world).await.unwrap();
    assert_eq!(timelines[0].buffered, 0);
    assert!(!timelines[0].has_pending_narrative);
}

#[tokio::test]
async fn second_reconciliation_writes_nothing() {
    let r = rig(json!({
        "Colony": {"Name": "Haven"},
        "PlayerPawns": [{"FullName": "Jane Doe", "Traits": [{"Label": "Kind"}]}],
        "Factions": [{"Name": "Pirates", "LeaderName": "Vex"}]
    }));
    let world = alpha();
    r.bridge.on_world_reloaded(&world, 0).await;
    let written = r.store.writes().await.len();
    assert!(written > 0);
    assert!(r.store.entry(BOOK, "[Pawn] Jane Doe").await.is_some());

    let report = r.bridge.request_reconciliation(&world).await.unwrap().unwrap();
    assert_eq!(report.writes(), 0);
    assert_eq!(r.store.writes().await.len(), written);
}

#[tokio::test]
async fn category_transition_leaves_one_enabled_entry() {
    let r = rig(json!({"PlayerPawns": [{"FullName": "Bob"}]}));
    let world = alpha();
    r.bridge.on_world_reloaded(&world, 0).await;
    assert!(r.store.entry(BOOK, "[Pawn] Bob").await.is_some());

    r.game
        .set_snapshot(Some(json!({
            "Map": {"PawnGroups": [
                {"GroupName": "Raider", "Members": [{"FullName": "Bob", "RelationToPlayer": "Hostile"}]}
            ]}
        })))
        .await;
    r.bridge.request_reconciliation(&world).await.unwrap();

    let bobs: Vec<DerivedEntry> = r
        .store
        .entries(BOOK)
        .await
        .into_iter()
        .filter(|e| e.parsed_name().is_some_and(|n| n.subject == "Bob"))
        .collect();
    assert_eq!(bobs.len(), 1);
    assert_eq!(bobs[0].name, "[Hostile] Bob");
    assert!(bobs[0].enabled);
}

#[tokio::test]
async fn departed_hostile_is_removed_and_colonist_disabled() {
    let r = rig(json!({"PlayerPawns": [{"FullName": "Bob"}]}));
    r.store.seed(BOOK, entry("[Hostile] Jane", true)).await;
    r.store.seed(BOOK, entry("[Pawn] Ann", true)).await;

    r.bridge.on_world_reloaded(&alpha(), 0).await;

    assert!(r.store.entry(BOOK, "[Hostile] Jane").await.is_none());
    let ann = r.store.entry(BOOK, "[Pawn] Ann").await.unwrap();
    assert!(!ann.enabled);
    assert_eq!(ann.content, "{}");
}

#[tokio::test]
async fn stream_messages_drive_the_same_paths() {
    let r = rig(json!({}));
    let loaded = StreamMessage::parse(r#"{"event":"SAVE_LOADED","payload":{"worldId":"Alpha","tick":0}}"#)
        .unwrap()
        .unwrap();
    let receipt = r.bridge.ingest(loaded).await.unwrap();
    assert!(matches!(receipt, IngestReceipt::Resolved(_)));
    assert_eq!(r.bridge.active_world().await, Some(alpha()));

    let frame = json!({
        "event": "TimePeriodSummary",
        "payload": {
            "startTime": 0,
            "endTime": 2500,
            "events": [{"Type": "PawnDied", "Participants": [{"Role": "victim", "PawnName": "Ann"}]}]
        }
    })
    .to_string();
    let message = StreamMessage::parse(&frame).unwrap().unwrap();
    let receipt = r.bridge.ingest(message).await.unwrap();
    assert!(matches!(receipt, IngestReceipt::Summary(ref s) if s.accepted));

    let timelines = r.bridge.timelines(&alpha()).await.unwrap();
    assert_eq!(timelines[0].buffered, 1);
}
