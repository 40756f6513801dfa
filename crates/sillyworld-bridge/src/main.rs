//! Bridge process entry point.
//!
//! Connects a running colony game to a `SillyTavern` chat: game events arrive
//! over a WebSocket, state snapshots are polled over HTTP, and the chat side
//! is reached through a REST shim running inside `SillyTavern`.
//!
//! # Architecture
//!
//! ```text
//! game WS  --> stream client --+
//!                              +--> Bridge --> tavern shim (world books, chat)
//! game HTTP <-- poller --------+      ^
//!                                     |
//!                 control API --------+
//! ```

mod error;
mod game;
mod http;
mod poller;
mod stream;
mod tavern;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use sillyworld_core::collab::{ChatSession, EntryStore, GameStateSource};
use sillyworld_core::config::{BridgeConfig, CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH, LogFormat, LoggingConfig};
use sillyworld_core::lore::LoreFormatter;
use sillyworld_core::{Bridge, BridgeSettings};
use sillyworld_server::{AppState, start_server};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::error::AppError;
use crate::game::HttpGameClient;
use crate::tavern::TavernClient;

/// Application entry point.
///
/// Loads configuration, initializes logging, wires the HTTP collaborators
/// into a [`Bridge`], then runs the event-stream client, the snapshot
/// poller and the control API until Ctrl-C.
#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config_path = std::env::var(CONFIG_PATH_ENV).map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let config = BridgeConfig::load_or_default(&config_path)?;

    init_logging(&config.logging)?;
    info!(config = %config_path.display(), "sillyworld-bridge starting");
    info!(
        gamestate_url = config.game.gamestate_url,
        event_socket_url = config.game.event_socket_url,
        tavern_url = config.tavern.base_url,
        poll_interval_ms = config.game.poll_interval_ms,
        language = %config.narrative.language,
        auto_send = config.narrative.auto_send,
        "configuration loaded"
    );

    let game: Arc<dyn GameStateSource> = Arc::new(HttpGameClient::new(&config.game)?);
    let tavern = Arc::new(TavernClient::new(&config.tavern)?);
    let lore = match config.narrative.templates_dir.as_deref() {
        Some(dir) => {
            info!(templates_dir = dir, "loading lore template overrides");
            LoreFormatter::with_overrides(Path::new(dir))?
        }
        None => LoreFormatter::embedded()?,
    };

    let bridge = Arc::new(Bridge::new(
        game,
        Arc::clone(&tavern) as Arc<dyn EntryStore>,
        tavern as Arc<dyn ChatSession>,
        BridgeSettings::from(&config),
        lore,
    ));

    let (stop, shutdown) = watch::channel(false);
    let stream_task = tokio::spawn(stream::run_event_stream(
        Arc::clone(&bridge),
        config.game.event_socket_url.clone(),
        Duration::from_millis(config.game.reconnect_delay_ms),
        shutdown.clone(),
    ));
    let poller_task = tokio::spawn(poller::run_poller(
        Arc::clone(&bridge),
        Duration::from_millis(config.game.poll_interval_ms),
        shutdown,
    ));

    let state = Arc::new(AppState::new(bridge));
    let served = start_server(&config.server, state, shutdown_signal()).await;

    stop.send_replace(true);
    for (name, task) in [("event stream", stream_task), ("poller", poller_task)] {
        if let Err(e) = task.await {
            warn!(task = name, error = %e, "background task ended abnormally");
        }
    }

    served?;
    info!("sillyworld-bridge stopped");
    Ok(())
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the configured level when set.
fn init_logging(config: &LoggingConfig) -> Result<(), AppError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| AppError::Logging(format!("invalid log level {:?}: {e}", config.level)))?;

    let registry = tracing_subscriber::registry().with(filter);
    match config.format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init(),
    }
    Ok(())
}

/// Resolve on Ctrl-C.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl-C, shutting down"),
        Err(e) => warn!(error = %e, "failed to listen for Ctrl-C, shutting down"),
    }
}
