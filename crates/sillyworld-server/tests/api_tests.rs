//! Integration tests for the control API endpoints.
//!
//! Tests use Axum's `Router` directly via `tower::ServiceExt` without
//! starting a TCP server, over a bridge wired to in-memory collaborators.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use sillyworld_core::collab::{
    ChatSession, EntryStore, GameStateSource, MemoryEntryStore, RecordingChat, StaticGameState,
};
use sillyworld_core::lore::LoreFormatter;
use sillyworld_core::{Bridge, BridgeSettings};
use sillyworld_server::build_router;
use sillyworld_server::state::AppState;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    game: Arc<StaticGameState>,
    chat: Arc<RecordingChat>,
}

fn make_app() -> TestApp {
    let game = Arc::new(StaticGameState::new(json!({
        "Colony": {"Name": "Haven"},
        "PlayerPawns": [{"FullName": "Jane Doe"}]
    })));
    let store = Arc::new(MemoryEntryStore::new());
    let chat = Arc::new(RecordingChat::new());
    let bridge = Bridge::new(
        Arc::clone(&game) as Arc<dyn GameStateSource>,
        Arc::clone(&store) as Arc<dyn EntryStore>,
        Arc::clone(&chat) as Arc<dyn ChatSession>,
        BridgeSettings::default(),
        LoreFormatter::embedded().unwrap(),
    );
    let state = Arc::new(AppState::new(Arc::new(bridge)));
    TestApp {
        router: build_router(state),
        game,
        chat,
    }
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn get(router: &Router, uri: &str) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    (status, body_to_json(response.into_body()).await)
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    let request = match body {
        Some(body) => request.body(Body::from(body.to_string())).unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    (status, body_to_json(response.into_body()).await)
}

async fn load_alpha(router: &Router) -> Value {
    let (status, body) = send(
        router,
        "POST",
        "/api/events",
        Some(json!({"event": "SAVE_LOADED", "payload": {"worldId": "Alpha", "tick": 0}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body
}

async fn post_summary(router: &Router, start: u64, end: u64) -> Value {
    let (status, body) = send(
        router,
        "POST",
        "/api/events",
        Some(json!({
            "event": "TimePeriodSummary",
            "payload": {
                "worldId": "Alpha",
                "startTime": start,
                "endTime": end,
                "events": [{"Type": "PawnDied", "Participants": [{"Role": "victim", "PawnName": "Ann"}]}]
            }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body
}

#[tokio::test]
async fn test_index_returns_html() {
    let app = make_app();
    let response = app
        .router
        .clone()
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let html = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(html.contains("Sillyworld Bridge"));
}

#[tokio::test]
async fn test_save_loaded_creates_world() {
    let app = make_app();
    let body = load_alpha(&app.router).await;
    assert_eq!(body["status"], "accepted");
    assert_eq!(body["receipt"]["kind"], "resolved");

    let (status, worlds) = get(&app.router, "/api/worlds").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(worlds.as_array().unwrap().len(), 1);
    assert_eq!(worlds[0]["id"], "Alpha");
    assert_eq!(worlds[0]["active_watermark"], 0);
}

#[tokio::test]
async fn test_unhandled_event_is_ignored() {
    let app = make_app();
    let (status, body) = send(
        &app.router,
        "POST",
        "/api/events",
        Some(json!({"event": "PAWN_SELECTED", "payload": {}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ignored");
    assert_eq!(body["event"], "PAWN_SELECTED");
}

#[tokio::test]
async fn test_malformed_payload_is_bad_request() {
    let app = make_app();
    let (status, body) = send(
        &app.router,
        "POST",
        "/api/events",
        Some(json!({"event": "TimePeriodSummary", "payload": {"startTime": "soon"}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);
}

#[tokio::test]
async fn test_manual_flush_and_send() {
    let app = make_app();
    load_alpha(&app.router).await;
    let receipt = post_summary(&app.router, 0, 2500).await;
    assert_eq!(receipt["receipt"]["accepted"], true);

    let (status, body) = send(&app.router, "POST", "/api/worlds/Alpha/flush", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["flushed"], true);
    assert_eq!(body["report"]["watermark"], 2500);

    let (_, narrative) = get(&app.router, "/api/worlds/Alpha/narrative").await;
    assert!(narrative["pending"].as_str().unwrap().contains("Ann"));

    let (status, _) = send(&app.router, "POST", "/api/worlds/Alpha/narrative/send", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.chat.dispatched().await.len(), 1);

    let (status, body) = send(&app.router, "POST", "/api/worlds/Alpha/narrative/send", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["status"], 409);
}

#[tokio::test]
async fn test_flush_with_empty_buffer() {
    let app = make_app();
    load_alpha(&app.router).await;
    let (status, body) = send(&app.router, "POST", "/api/worlds/Alpha/flush", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["flushed"], false);
}

#[tokio::test]
async fn test_unknown_world_is_not_found() {
    let app = make_app();
    let (status, body) = get(&app.router, "/api/worlds/Nowhere/timelines").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
}

#[tokio::test]
async fn test_reconcile_is_idempotent() {
    let app = make_app();
    load_alpha(&app.router).await;
    let (status, body) = send(&app.router, "POST", "/api/worlds/Alpha/reconcile", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ran"], true);
    assert_eq!(body["report"]["created"], 0);
    assert_eq!(body["report"]["updated"], 0);
}

#[tokio::test]
async fn test_reconcile_without_any_snapshot_conflicts() {
    let app = make_app();
    app.game.set_snapshot(None).await;
    load_alpha(&app.router).await;
    let (status, _) = send(&app.router, "POST", "/api/worlds/Alpha/reconcile", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_activate_timeline() {
    let app = make_app();
    load_alpha(&app.router).await;
    let (_, timelines) = get(&app.router, "/api/worlds/Alpha/timelines").await;
    let id = timelines[0]["id"].as_str().unwrap().to_owned();

    let uri = format!("/api/worlds/Alpha/timelines/{id}/activate");
    let (status, body) = send(&app.router, "POST", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changed"], false);

    let (status, _) = send(&app.router, "POST", "/api/worlds/Alpha/timelines/not-a-uuid/activate", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let missing = "/api/worlds/Alpha/timelines/00000000-0000-7000-8000-000000000000/activate";
    let (status, _) = send(&app.router, "POST", missing, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_settings_round_trip() {
    let app = make_app();
    let (status, body) = get(&app.router, "/api/settings").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["locale"], "zh");
    assert_eq!(body["auto_dispatch"], false);

    let (status, body) = send(&app.router, "PUT", "/api/settings", Some(json!({"locale": "en"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["locale"], "en");
    assert_eq!(body["auto_dispatch"], false);
}

#[tokio::test]
async fn test_lore_renders_markdown() {
    let app = make_app();
    app.game
        .set_lore(Some(json!({"Scenario": {"Name": "Crashlanded", "Summary": "Three survivors."}})))
        .await;
    let response = app
        .router
        .clone()
        .oneshot(Request::get("/api/lore").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let markdown = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(markdown.starts_with("# Crashlanded"));
}

#[tokio::test]
async fn test_lore_unavailable_is_bad_gateway() {
    let app = make_app();
    let (status, body) = get(&app.router, "/api/lore").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["status"], 502);
}
