//! REST endpoint handlers for the control API.
//!
//! Handlers that mutate bridge state run on a detached task so a client
//! disconnecting mid-request never cancels a flush or reconciliation
//! halfway through.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | Minimal HTML status page |
//! | `POST` | `/api/events` | Ingest one stream envelope |
//! | `GET` | `/api/worlds` | World summaries |
//! | `GET` | `/api/worlds/{world}/timelines` | Timeline summaries |
//! | `POST` | `/api/worlds/{world}/timelines/{id}/activate` | Switch timeline |
//! | `POST` | `/api/worlds/{world}/flush` | Manual flush |
//! | `POST` | `/api/worlds/{world}/reconcile` | Reconciliation pass |
//! | `GET` | `/api/worlds/{world}/narrative` | Pending and last narrative |
//! | `POST` | `/api/worlds/{world}/narrative/send` | Dispatch pending narrative |
//! | `GET`/`PUT` | `/api/settings` | Locale and auto-dispatch |
//! | `GET` | `/api/lore` | Lore as markdown |

use std::future::Future;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{Html, IntoResponse};
use serde::{Deserialize, Serialize};
use sillyworld_core::RuntimeSettings;
use sillyworld_core::bridge::{FlushReport, IngestReceipt, NarrativeView};
use sillyworld_core::reconcile::ReconcileReport;
use sillyworld_core::timeline::{TimelineSummary, WorldSummary};
use sillyworld_types::{Locale, StreamEnvelope, StreamMessage, TimelineId, WorldId};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

/// Body of `PUT /api/settings`; absent fields are left unchanged.
#[derive(Debug, Default, Deserialize)]
pub struct SettingsUpdate {
    /// New output language.
    pub locale: Option<Locale>,
    /// New auto-dispatch flag.
    pub auto_dispatch: Option<bool>,
}

/// Response of `POST /api/events`.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngestResponse {
    /// The message was handled.
    Accepted {
        /// What the bridge did with it.
        receipt: IngestReceipt,
    },
    /// The envelope carried an event the bridge does not act on.
    Ignored {
        /// The ignored event name.
        event: String,
    },
}

/// Response of the flush endpoint.
#[derive(Debug, Serialize)]
pub struct FlushResponse {
    /// Whether anything was flushed.
    pub flushed: bool,
    /// The flush, when one happened.
    pub report: Option<FlushReport>,
}

/// Response of the reconcile endpoint.
#[derive(Debug, Serialize)]
pub struct ReconcileResponse {
    /// `false` when the request was folded into a pass already running.
    pub ran: bool,
    /// The pass report, when this request ran one.
    pub report: Option<ReconcileReport>,
}

/// Response of the activate endpoint.
#[derive(Debug, Serialize)]
pub struct ActivateResponse {
    /// The now-active timeline.
    pub timeline_id: TimelineId,
    /// Whether the active timeline changed.
    pub changed: bool,
}

/// Acknowledgement for actions without a richer result.
#[derive(Debug, Serialize)]
pub struct Ack {
    /// Always `true`.
    pub ok: bool,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Run a bridge operation on its own task so it completes even if the
/// request is dropped.
async fn detached<F, T>(operation: F) -> Result<T, ApiError>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(operation)
        .await
        .map_err(|e| ApiError::Internal(format!("operation task failed: {e}")))
}

fn parse_timeline_id(raw: &str) -> Result<TimelineId, ApiError> {
    Uuid::parse_str(raw)
        .map(TimelineId::from)
        .map_err(|e| ApiError::BadRequest(format!("invalid timeline id {raw:?}: {e}")))
}

// ---------------------------------------------------------------------------
// GET / -- minimal HTML status page
// ---------------------------------------------------------------------------

/// Serve a minimal HTML page showing bridge status and API links.
pub async fn index(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let settings = state.bridge.settings().await;
    let worlds = state.bridge.worlds().await;
    let active = state
        .bridge
        .active_world()
        .await
        .map_or_else(|| String::from("none"), |id| id.to_string());
    let world_count = worlds.len();
    let timeline_count: usize = worlds.iter().map(|w| w.timelines).sum();
    let uptime = chrono::Utc::now()
        .signed_duration_since(state.started_at)
        .num_seconds();
    let locale = settings.locale;
    let auto = if settings.auto_dispatch { "on" } else { "off" };

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <title>Sillyworld Bridge</title>
    <style>
        body {{
            background: #0d1117;
            color: #c9d1d9;
            font-family: 'Cascadia Code', 'Fira Code', 'Consolas', monospace;
            padding: 2rem;
            max-width: 800px;
            margin: 0 auto;
        }}
        h1 {{ color: #58a6ff; margin-bottom: 0.25rem; }}
        .metric {{
            display: inline-block;
            background: #161b22;
            border: 1px solid #30363d;
            border-radius: 6px;
            padding: 1rem 1.5rem;
            margin: 0.5rem 0.5rem 0.5rem 0;
        }}
        .metric .label {{ color: #8b949e; font-size: 0.85rem; }}
        .metric .value {{ color: #58a6ff; font-size: 1.5rem; font-weight: bold; }}
        a {{ color: #58a6ff; text-decoration: none; }}
        ul {{ list-style: none; padding: 0; }}
        li {{ padding: 0.3rem 0; }}
    </style>
</head>
<body>
    <h1>Sillyworld Bridge</h1>
    <div>
        <div class="metric"><div class="label">Active world</div><div class="value">{active}</div></div>
        <div class="metric"><div class="label">Worlds</div><div class="value">{world_count}</div></div>
        <div class="metric"><div class="label">Timelines</div><div class="value">{timeline_count}</div></div>
        <div class="metric"><div class="label">Locale</div><div class="value">{locale}</div></div>
        <div class="metric"><div class="label">Auto send</div><div class="value">{auto}</div></div>
        <div class="metric"><div class="label">Uptime (s)</div><div class="value">{uptime}</div></div>
    </div>
    <h2>API</h2>
    <ul>
        <li>GET <a href="/api/worlds">/api/worlds</a></li>
        <li>GET <a href="/api/settings">/api/settings</a></li>
        <li>GET <a href="/api/lore">/api/lore</a></li>
        <li>WS /ws/notices</li>
    </ul>
</body>
</html>"#
    ))
}

// ---------------------------------------------------------------------------
// Inbound events
// ---------------------------------------------------------------------------

/// Ingest one stream envelope, as if it had arrived on the event socket.
pub async fn ingest_event(
    State(state): State<Arc<AppState>>,
    Json(envelope): Json<StreamEnvelope>,
) -> Result<Json<IngestResponse>, ApiError> {
    let event = envelope.event.clone();
    let Some(message) =
        StreamMessage::from_envelope(envelope).map_err(|e| ApiError::BadRequest(e.to_string()))?
    else {
        return Ok(Json(IngestResponse::Ignored { event }));
    };
    let bridge = Arc::clone(&state.bridge);
    let receipt = detached(async move { bridge.ingest(message).await }).await??;
    Ok(Json(IngestResponse::Accepted { receipt }))
}

// ---------------------------------------------------------------------------
// Worlds and timelines
// ---------------------------------------------------------------------------

/// List every world seen since startup.
pub async fn list_worlds(State(state): State<Arc<AppState>>) -> Json<Vec<WorldSummary>> {
    Json(state.bridge.worlds().await)
}

/// List one world's timelines.
pub async fn list_timelines(
    State(state): State<Arc<AppState>>,
    Path(world): Path<String>,
) -> Result<Json<Vec<TimelineSummary>>, ApiError> {
    let timelines = state.bridge.timelines(&WorldId::new(world)).await?;
    Ok(Json(timelines))
}

/// Make a timeline active.
pub async fn activate_timeline(
    State(state): State<Arc<AppState>>,
    Path((world, timeline)): Path<(String, String)>,
) -> Result<Json<ActivateResponse>, ApiError> {
    let timeline_id = parse_timeline_id(&timeline)?;
    let world_id = WorldId::new(world);
    let bridge = Arc::clone(&state.bridge);
    let changed = detached(async move { bridge.switch_timeline(&world_id, timeline_id).await }).await??;
    Ok(Json(ActivateResponse { timeline_id, changed }))
}

/// Flush the active timeline's buffer now.
pub async fn flush(
    State(state): State<Arc<AppState>>,
    Path(world): Path<String>,
) -> Result<Json<FlushResponse>, ApiError> {
    let world_id = WorldId::new(world);
    let bridge = Arc::clone(&state.bridge);
    let report = detached(async move { bridge.request_manual_flush(&world_id).await }).await??;
    Ok(Json(FlushResponse {
        flushed: report.is_some(),
        report,
    }))
}

/// Reconcile the world's entries now.
pub async fn reconcile(
    State(state): State<Arc<AppState>>,
    Path(world): Path<String>,
) -> Result<Json<ReconcileResponse>, ApiError> {
    let world_id = WorldId::new(world);
    let bridge = Arc::clone(&state.bridge);
    let report = detached(async move { bridge.request_reconciliation(&world_id).await }).await??;
    Ok(Json(ReconcileResponse {
        ran: report.is_some(),
        report,
    }))
}

// ---------------------------------------------------------------------------
// Narrative
// ---------------------------------------------------------------------------

/// Pending and most recent narrative of the active timeline.
pub async fn get_narrative(
    State(state): State<Arc<AppState>>,
    Path(world): Path<String>,
) -> Result<Json<NarrativeView>, ApiError> {
    let view = state.bridge.narrative(&WorldId::new(world)).await?;
    Ok(Json(view))
}

/// Dispatch the pending narrative.
pub async fn send_narrative(
    State(state): State<Arc<AppState>>,
    Path(world): Path<String>,
) -> Result<Json<Ack>, ApiError> {
    let world_id = WorldId::new(world);
    let bridge = Arc::clone(&state.bridge);
    detached(async move { bridge.send_narrative(&world_id).await }).await??;
    Ok(Json(Ack { ok: true }))
}

// ---------------------------------------------------------------------------
// Settings and lore
// ---------------------------------------------------------------------------

/// Current runtime settings.
pub async fn get_settings(State(state): State<Arc<AppState>>) -> Json<RuntimeSettings> {
    Json(state.bridge.settings().await)
}

/// Change runtime settings.
pub async fn put_settings(
    State(state): State<Arc<AppState>>,
    Json(update): Json<SettingsUpdate>,
) -> Json<RuntimeSettings> {
    if let Some(locale) = update.locale {
        state.bridge.set_locale(locale).await;
    }
    if let Some(enabled) = update.auto_dispatch {
        state.bridge.set_auto_dispatch(enabled);
    }
    Json(state.bridge.settings().await)
}

/// The lore document rendered as markdown.
pub async fn get_lore(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let markdown = state.bridge.lore().await?;
    Ok(([(header::CONTENT_TYPE, "text/markdown; charset=utf-8")], markdown))
}
