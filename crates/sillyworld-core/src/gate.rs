//! Single-flight reconciliation per world.
//!
//! The poller, flushes, reloads and operator requests can all ask for a
//! reconciliation pass. Only one pass per world runs at a time. A request
//! arriving while a pass is in flight replaces any snapshot still waiting,
//! and the running caller picks it up once its current pass ends. Waiting
//! callers return as soon as a pass covering their request completes, so
//! intermediate snapshots are coalesced away and only the freshest one is
//! written.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::sync::watch;
use tracing::debug;

use crate::reconcile::{ReconcileError, ReconcileReport};

/// How a submitted request was served.
#[derive(Debug)]
pub enum GateOutcome {
    /// This caller ran the pass (possibly several, for requests that queued
    /// behind it); the result is that of the last pass.
    Ran(Result<ReconcileReport, ReconcileError>),
    /// Another caller's pass covered this request.
    Coalesced,
}

#[derive(Debug, Default)]
struct GateState {
    pending: Option<Value>,
    requested: u64,
    running: bool,
    abandoned: u64,
}

/// What waiters watch for.
#[derive(Debug, Clone, Copy, Default)]
struct Progress {
    /// Highest request generation a finished pass covered.
    completed: u64,
    /// Bumped each time a running caller is dropped mid-pass.
    abandoned: u64,
}

/// Serializes reconciliation passes for one world.
#[derive(Debug)]
pub struct ReconcileGate {
    state: Mutex<GateState>,
    progress: watch::Sender<Progress>,
}

impl Default for ReconcileGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconcileGate {
    /// A gate with nothing in flight.
    pub fn new() -> Self {
        let (progress, _) = watch::channel(Progress::default());
        Self {
            state: Mutex::new(GateState::default()),
            progress,
        }
    }

    /// Whether a pass is currently running.
    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// Submit a snapshot and either run passes with `pass` or wait for the
    /// in-flight caller to cover it.
    ///
    /// If the running caller is dropped before covering this request, one
    /// waiter takes over and runs the snapshot still pending.
    pub async fn submit<F, Fut>(&self, snapshot: Value, pass: F) -> GateOutcome
    where
        F: Fn(Value) -> Fut,
        Fut: Future<Output = Result<ReconcileReport, ReconcileError>>,
    {
        let (ticket, mut lead, mut seen_abandoned) = {
            let mut state = self.lock();
            state.pending = Some(snapshot);
            state.requested = state.requested.saturating_add(1);
            let lead = !state.running;
            state.running = true;
            (state.requested, lead, state.abandoned)
        };

        let mut rx = self.progress.subscribe();
        while !lead {
            debug!(ticket, "reconciliation in flight; coalescing request");
            let woke = rx
                .wait_for(|p| p.completed >= ticket || p.abandoned != seen_abandoned)
                .await
                .map(|p| *p);
            let Ok(progress) = woke else {
                debug!(ticket, "reconcile gate closed while waiting");
                return GateOutcome::Coalesced;
            };
            if progress.completed >= ticket {
                return GateOutcome::Coalesced;
            }
            let mut state = self.lock();
            if state.running {
                seen_abandoned = state.abandoned;
            } else {
                debug!(ticket, "previous runner dropped; taking over");
                state.running = true;
                lead = true;
            }
        }

        let mut guard = RunningGuard { gate: self, armed: true };
        let mut last = None;
        loop {
            let next = {
                let mut state = self.lock();
                match state.pending.take() {
                    Some(snapshot) => Some((snapshot, state.requested)),
                    None => {
                        state.running = false;
                        None
                    }
                }
            };
            let Some((snapshot, generation)) = next else {
                break;
            };
            let result = pass(snapshot).await;
            self.progress.send_modify(|p| p.completed = p.completed.max(generation));
            last = Some(result);
        }
        guard.armed = false;

        // A lead always finds a pending snapshot on its first iteration.
        last.map_or(GateOutcome::Coalesced, GateOutcome::Ran)
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases the gate if the running caller is dropped mid-pass. The
/// snapshot waiting in `pending` stays there for a waiter to pick up.
struct RunningGuard<'a> {
    gate: &'a ReconcileGate,
    armed: bool,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let abandoned = {
            let mut state = self.gate.lock();
            state.running = false;
            state.abandoned = state.abandoned.wrapping_add(1);
            state.abandoned
        };
        self.gate.progress.send_modify(|p| p.abandoned = abandoned);
    }
}
