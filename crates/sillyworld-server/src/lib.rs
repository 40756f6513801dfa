//! Control API server for the Sillyworld bridge.
//!
//! This crate provides an Axum HTTP server over a shared
//! [`Bridge`](sillyworld_core::Bridge) that exposes:
//!
//! - **`WebSocket` endpoint** (`/ws/notices`) streaming operator notices
//!   (timeline resolutions, narratives, reconciliation reports, failures)
//! - **REST endpoints** for inspecting worlds, timelines and narratives
//! - **Control endpoints** for manual flush, reconciliation, timeline
//!   switching, narrative dispatch, settings and lore
//! - **Minimal HTML status page** (`GET /`)

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use router::build_router;
pub use server::{ServerError, start_server};
pub use state::AppState;
