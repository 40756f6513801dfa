//! Axum router construction for the control API.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the complete Axum router.
///
/// See [`handlers`] for the endpoint table. CORS allows any origin so the
/// chat front-end's browser extension can call the API directly.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handlers::index))
        .route("/ws/notices", get(ws::ws_notices))
        .route("/api/events", post(handlers::ingest_event))
        .route("/api/worlds", get(handlers::list_worlds))
        .route("/api/worlds/{world}/timelines", get(handlers::list_timelines))
        .route(
            "/api/worlds/{world}/timelines/{timeline}/activate",
            post(handlers::activate_timeline),
        )
        .route("/api/worlds/{world}/flush", post(handlers::flush))
        .route("/api/worlds/{world}/reconcile", post(handlers::reconcile))
        .route("/api/worlds/{world}/narrative", get(handlers::get_narrative))
        .route("/api/worlds/{world}/narrative/send", post(handlers::send_narrative))
        .route("/api/settings", get(handlers::get_settings).put(handlers::put_settings))
        .route("/api/lore", get(handlers::get_lore))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
