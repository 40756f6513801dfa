//! Event-stream client.
//!
//! Connects to the game's WebSocket, decodes each text frame as a
//! `{event, payload}` envelope and hands it to the bridge. Frames are
//! processed one at a time in arrival order. On close or error the client
//! waits `reconnect_delay` and connects again, until shutdown.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use sillyworld_core::Bridge;
use sillyworld_core::bridge::IngestReceipt;
use sillyworld_types::StreamMessage;
use tokio::sync::watch;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// What happened to one text frame.
#[derive(Debug)]
pub enum FrameOutcome {
    /// The bridge handled the message.
    Applied(IngestReceipt),
    /// The envelope named an event the bridge does not act on.
    Ignored,
    /// The frame could not be decoded.
    Malformed,
    /// The bridge rejected the message.
    Failed,
}

/// Decode one text frame and feed it to the bridge.
pub async fn handle_frame(bridge: &Bridge, frame: &str) -> FrameOutcome {
    let message = match StreamMessage::parse(frame) {
        Ok(Some(message)) => message,
        Ok(None) => {
            debug!("ignoring unhandled stream event");
            return FrameOutcome::Ignored;
        }
        Err(e) => {
            warn!(error = %e, "malformed stream frame, skipping");
            return FrameOutcome::Malformed;
        }
    };
    match bridge.ingest(message).await {
        Ok(receipt) => FrameOutcome::Applied(receipt),
        Err(e) => {
            warn!(error = %e, "stream message rejected");
            FrameOutcome::Failed
        }
    }
}

/// Run the reconnecting client until `shutdown` flips to `true`.
pub async fn run_event_stream(
    bridge: Arc<Bridge>,
    url: String,
    reconnect_delay: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            () = read_connection(&bridge, &url) => {}
            _ = shutdown.changed() => break,
        }
        debug!(delay_ms = reconnect_delay.as_millis(), "waiting before reconnecting");
        tokio::select! {
            () = tokio::time::sleep(reconnect_delay) => {}
            _ = shutdown.changed() => break,
        }
    }
    info!("event stream client stopped");
}

async fn process(bridge: &Bridge, frame: &str) {
    if let FrameOutcome::Applied(receipt) = handle_frame(bridge, frame).await {
        debug!(?receipt, "stream message applied");
    }
}

/// Connect once and process frames until the connection ends.
async fn read_connection(bridge: &Bridge, url: &str) {
    let (mut socket, _) = match connect_async(url).await {
        Ok(connected) => connected,
        Err(e) => {
            warn!(url, error = %e, "event socket connection failed");
            return;
        }
    };
    info!(url, "event socket connected");

    while let Some(frame) = socket.next().await {
        match frame {
            Ok(Message::Text(text)) => process(bridge, &text).await,
            Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => process(bridge, text).await,
                Err(e) => warn!(error = %e, "non-UTF-8 binary frame, skipping"),
            },
            Ok(Message::Close(reason)) => {
                info!(?reason, "event socket closed by peer");
                return;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "event socket error");
                return;
            }
        }
    }
    info!("event socket stream ended");
}
