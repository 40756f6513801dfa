//! Notice stream over `WebSocket`.
//!
//! `GET /ws/notices` sends one JSON [`Notice`] per text frame. Adding
//! `?world=<id>` narrows the stream to that world; notices that concern no
//! world in particular are always sent. A client that falls behind the
//! broadcast buffer gets a `{"kind":"notices_dropped","count":n}` frame and
//! resumes at the oldest notice still buffered, so it knows to re-read
//! state through the REST endpoints.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::json;
use sillyworld_core::Notice;
use sillyworld_types::WorldId;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use crate::state::AppState;

/// Query parameters of the notice stream.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct NoticeQuery {
    /// Only forward notices about this world.
    pub world: Option<WorldId>,
}

impl NoticeQuery {
    fn admits(&self, notice: &Notice) -> bool {
        match (&self.world, &notice.world_id) {
            (Some(wanted), Some(world)) => wanted == world,
            _ => true,
        }
    }
}

/// Upgrade to a `WebSocket` and forward notices.
///
/// # Route
///
/// `GET /ws/notices[?world=<id>]`
pub async fn ws_notices(
    ws: WebSocketUpgrade,
    Query(query): Query<NoticeQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let notices = state.subscribe();
    ws.on_upgrade(move |socket| forward_notices(socket, notices, query))
}

/// Wait for the next frame this client should receive, or `None` once the
/// bridge is gone.
async fn next_frame(notices: &mut broadcast::Receiver<Notice>, query: &NoticeQuery) -> Option<String> {
    loop {
        match notices.recv().await {
            Ok(notice) if query.admits(&notice) => match serde_json::to_string(&notice) {
                Ok(frame) => return Some(frame),
                Err(e) => warn!(error = %e, "failed to serialize notice"),
            },
            Ok(_) => {}
            Err(RecvError::Lagged(count)) => {
                debug!(count, "notice client fell behind");
                return Some(json!({"kind": "notices_dropped", "count": count}).to_string());
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

async fn forward_notices(mut socket: WebSocket, mut notices: broadcast::Receiver<Notice>, query: NoticeQuery) {
    debug!(world = ?query.world, "notice client connected");
    loop {
        tokio::select! {
            frame = next_frame(&mut notices, &query) => {
                let Some(frame) = frame else {
                    debug!("notice channel closed");
                    break;
                };
                if socket.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => match incoming {
                // Pings are answered by the socket itself; clients have
                // nothing else to say on this stream.
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    debug!(world = ?query.world, "notice client disconnected");
}
