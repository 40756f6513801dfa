//! Shared application state for the control API.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sillyworld_core::{Bridge, Notice};
use tokio::sync::broadcast;

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor. The
/// bridge is shared with the event-stream task and the poller.
#[derive(Clone)]
pub struct AppState {
    /// The bridge every handler operates on.
    pub bridge: Arc<Bridge>,
    /// When the server started.
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Create application state over a bridge.
    pub fn new(bridge: Arc<Bridge>) -> Self {
        Self {
            bridge,
            started_at: Utc::now(),
        }
    }

    /// Subscribe to bridge notices.
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.bridge.subscribe()
    }
}
