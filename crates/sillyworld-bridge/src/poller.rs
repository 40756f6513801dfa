//! Periodic snapshot refresh.

use std::sync::Arc;
use std::time::Duration;

use sillyworld_core::{Bridge, BridgeError};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Consecutive transient poll failures.
///
/// A game that is not running fails every poll; only the first failure of
/// a run is logged as a warning.
#[derive(Debug, Default)]
struct FailureStreak {
    transient: u32,
}

impl FailureStreak {
    fn succeeded(&mut self) {
        if self.transient > 0 {
            info!(failed_polls = self.transient, "snapshot polling recovered");
        }
        self.transient = 0;
    }

    /// Record a failure. Returns whether it deserves a warning.
    fn failed(&mut self, error: &BridgeError) -> bool {
        if !error.is_transient() {
            return true;
        }
        self.transient = self.transient.saturating_add(1);
        self.transient == 1
    }
}

/// Refresh the loaded world's snapshot every `period` until shutdown.
pub async fn run_poller(bridge: Arc<Bridge>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut streak = FailureStreak::default();
    info!(period_ms = period.as_millis(), "snapshot poller started");

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => break,
        }
        if *shutdown.borrow() {
            break;
        }
        match bridge.poll_snapshot().await {
            Ok(report) => {
                streak.succeeded();
                if let Some(report) = report {
                    debug!(writes = report.writes(), "poll reconciled entries");
                }
            }
            Err(e) if streak.failed(&e) => warn!(error = %e, "snapshot poll failed"),
            Err(e) => debug!(error = %e, "snapshot poll still failing"),
        }
    }
    info!("snapshot poller stopped");
}
