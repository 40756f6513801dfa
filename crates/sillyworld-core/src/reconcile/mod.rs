//! Derived-state reconciliation.
//!
//! A pass turns a slimmed snapshot into the desired set of entries,
//! compares it against what the store already holds, and issues the
//! minimum writes to converge:
//!
//! 1. [`plan`] is pure: it sorts the difference into creates, updates,
//!    disables and removals. Entries whose content, enabled flag and
//!    strategy are unchanged produce no write, so a second pass over the
//!    same snapshot is a no-op.
//! 2. [`apply`] performs the plan: the removal batch first, then updates
//!    and disables, then creates. A failed write is logged and the pass
//!    moves on; creates and updates that would replace an entry the failed
//!    removal left behind are skipped so a subject never ends up with two
//!    enabled entries.
//!
//! [`ReconciliationEngine`] glues transform, listing, planning and
//! applying together for one book.

pub mod general;
pub mod pawn;

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::Value;
use sillyworld_types::{DerivedEntry, EntryName, EntryUpsert, UpsertOptions, WorldId};
use tracing::{debug, info, warn};

use crate::collab::{CollaboratorError, EntryStore};
use crate::transform::{SnapshotTransform, TransformedSnapshot};

use self::general::{GENERAL_PREFIXES, desired_general};
use self::pawn::{HOSTILE_PREFIX, PAWN_PREFIXES, desired_pawns};

/// Errors that abort a reconciliation pass.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// The existing entries could not be listed.
    #[error("failed to list entries of {book}: {source}")]
    List {
        /// Book being reconciled.
        book: String,
        /// Underlying collaborator failure.
        source: CollaboratorError,
    },
}

/// Name of the book holding a world's entries.
pub fn book_name(prefix: &str, world_id: &WorldId) -> String {
    format!("{prefix} {world_id}")
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// A create or update, with the entries it supersedes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedWrite {
    /// The entry to write.
    pub entry: EntryUpsert,
    /// Entries under another prefix that this write replaces. They are
    /// in the plan's removals.
    pub replaces: Vec<String>,
}

/// The writes needed to converge the store on a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// New entries.
    pub creates: Vec<PlannedWrite>,
    /// Changed entries.
    pub updates: Vec<PlannedWrite>,
    /// Entries to keep but switch off.
    pub disables: Vec<EntryUpsert>,
    /// Entries to delete.
    pub removes: Vec<String>,
}

impl ReconcilePlan {
    /// Whether the plan issues no writes.
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty()
            && self.updates.is_empty()
            && self.disables.is_empty()
            && self.removes.is_empty()
    }
}

fn prefix_of(entry: &DerivedEntry) -> Option<&str> {
    entry.parsed_name().map(|n| n.prefix)
}

fn disable(entry: &DerivedEntry) -> EntryUpsert {
    EntryUpsert::new(
        entry.name.clone(),
        entry.content.clone(),
        UpsertOptions {
            keywords: entry.keywords.clone(),
            enabled: false,
            strategy: entry.strategy,
            ..UpsertOptions::default()
        },
    )
}

/// Compute the writes that take `existing` to the state `snapshot` calls
/// for.
pub fn plan(snapshot: &TransformedSnapshot, existing: &[DerivedEntry]) -> ReconcilePlan {
    let by_name: BTreeMap<&str, &DerivedEntry> =
        existing.iter().map(|e| (e.name.as_str(), e)).collect();
    let mut out = ReconcilePlan::default();
    plan_pawns(snapshot, existing, &by_name, &mut out);
    plan_general(snapshot, existing, &by_name, &mut out);
    out
}

fn upsert_or_create(
    write: EntryUpsert,
    replaces: Vec<String>,
    by_name: &BTreeMap<&str, &DerivedEntry>,
    out: &mut ReconcilePlan,
) {
    let planned = PlannedWrite {
        entry: write,
        replaces,
    };
    match by_name.get(planned.entry.name.as_str()) {
        Some(current) if planned.entry.matches(current) => {}
        Some(_) => out.updates.push(planned),
        None => out.creates.push(planned),
    }
}

fn plan_pawns(
    snapshot: &TransformedSnapshot,
    existing: &[DerivedEntry],
    by_name: &BTreeMap<&str, &DerivedEntry>,
    out: &mut ReconcilePlan,
) {
    let pawn_entries: Vec<(&DerivedEntry, EntryName<'_>)> = existing
        .iter()
        .filter_map(|e| e.parsed_name().map(|n| (e, n)))
        .filter(|(_, n)| PAWN_PREFIXES.contains(&n.prefix))
        .collect();
    let mut handled: BTreeSet<&str> = BTreeSet::new();

    for (subject, pawn) in desired_pawns(&snapshot.slimmed) {
        let write = pawn.upsert();
        let stale: Vec<String> = pawn_entries
            .iter()
            .filter(|(e, n)| n.subject == subject && e.name != write.name)
            .map(|(e, _)| e.name.clone())
            .collect();
        for name in &stale {
            debug!(entry = %name, desired = %write.name, "pawn changed category");
        }
        for (entry, name) in &pawn_entries {
            if name.subject == subject {
                handled.insert(entry.name.as_str());
            }
        }
        out.removes.extend(stale.iter().cloned());
        upsert_or_create(write, stale, by_name, out);
    }

    for (entry, name) in pawn_entries {
        if handled.contains(entry.name.as_str()) {
            continue;
        }
        if name.prefix == HOSTILE_PREFIX {
            out.removes.push(entry.name.clone());
        } else if entry.enabled {
            out.disables.push(disable(entry));
        }
    }
}

fn plan_general(
    snapshot: &TransformedSnapshot,
    existing: &[DerivedEntry],
    by_name: &BTreeMap<&str, &DerivedEntry>,
    out: &mut ReconcilePlan,
) {
    let mut desired_names: BTreeSet<String> = BTreeSet::new();
    for write in desired_general(snapshot) {
        if !desired_names.insert(write.name.clone()) {
            continue;
        }
        upsert_or_create(write, Vec::new(), by_name, out);
    }
    for entry in existing {
        let managed = prefix_of(entry).is_some_and(|p| GENERAL_PREFIXES.contains(&p));
        if managed && entry.enabled && !desired_names.contains(&entry.name) {
            out.disables.push(disable(entry));
        }
    }
}

// ---------------------------------------------------------------------------
// Apply
// ---------------------------------------------------------------------------

/// Counts from one applied pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Entries created.
    pub created: usize,
    /// Entries updated.
    pub updated: usize,
    /// Entries disabled.
    pub disabled: usize,
    /// Entries removed.
    pub removed: usize,
    /// Creates and updates skipped because the entries they replace could
    /// not be removed.
    pub skipped: usize,
    /// Failed writes, one message each.
    pub failures: Vec<String>,
}

impl ReconcileReport {
    /// Total successful writes.
    pub const fn writes(&self) -> usize {
        self.created
            .saturating_add(self.updated)
            .saturating_add(self.disabled)
            .saturating_add(self.removed)
    }
}

async fn write_one(
    store: &dyn EntryStore,
    book: &str,
    entry: &EntryUpsert,
    report: &mut ReconcileReport,
) -> bool {
    match store.upsert(book, entry).await {
        Ok(()) => true,
        Err(e) => {
            warn!(book, entry = %entry.name, error = %e, "entry write failed");
            report.failures.push(format!("{}: {e}", entry.name));
            false
        }
    }
}

/// Perform a plan against the store.
pub async fn apply(store: &dyn EntryStore, book: &str, plan: ReconcilePlan) -> ReconcileReport {
    let mut report = ReconcileReport::default();
    let mut removal_failed = false;

    if !plan.removes.is_empty() {
        match store.remove_batch(book, &plan.removes).await {
            Ok(()) => report.removed = plan.removes.len(),
            Err(e) => {
                warn!(book, count = plan.removes.len(), error = %e, "entry removal failed");
                report.failures.push(format!("remove {} entries: {e}", plan.removes.len()));
                removal_failed = true;
            }
        }
    }
    for update in &plan.updates {
        if removal_failed && !update.replaces.is_empty() {
            warn!(book, entry = %update.entry.name, "skipping update; superseded entry still present");
            report.skipped = report.skipped.saturating_add(1);
            continue;
        }
        if write_one(store, book, &update.entry, &mut report).await {
            report.updated = report.updated.saturating_add(1);
        }
    }
    for entry in &plan.disables {
        if write_one(store, book, entry, &mut report).await {
            report.disabled = report.disabled.saturating_add(1);
        }
    }
    for create in &plan.creates {
        if removal_failed && !create.replaces.is_empty() {
            warn!(book, entry = %create.entry.name, "skipping create; superseded entry still present");
            report.skipped = report.skipped.saturating_add(1);
            continue;
        }
        if write_one(store, book, &create.entry, &mut report).await {
            report.created = report.created.saturating_add(1);
        }
    }
    report
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Runs full reconciliation passes for raw snapshots.
#[derive(Debug, Clone, Default)]
pub struct ReconciliationEngine {
    transform: SnapshotTransform,
}

impl ReconciliationEngine {
    /// Create an engine using the given transform.
    pub const fn new(transform: SnapshotTransform) -> Self {
        Self { transform }
    }

    /// The transform applied to raw snapshots.
    pub const fn transform(&self) -> &SnapshotTransform {
        &self.transform
    }

    /// Reconcile `book` against a raw snapshot.
    ///
    /// A failure to list existing entries aborts the pass; every other
    /// failure is contained to the write that caused it.
    pub async fn run(
        &self,
        store: &dyn EntryStore,
        book: &str,
        raw: &Value,
    ) -> Result<ReconcileReport, ReconcileError> {
        if let Err(e) = store.ensure_book(book).await {
            warn!(book, error = %e, "failed to ensure book");
        }
        let existing = store.list(book).await.map_err(|source| ReconcileError::List {
            book: book.to_owned(),
            source,
        })?;
        let transformed = self.transform.apply(raw);
        let plan = plan(&transformed, &existing);
        if plan.is_empty() {
            debug!(book, "entries already up to date");
            return Ok(ReconcileReport::default());
        }
        let report = apply(store, book, plan).await;
        info!(
            book,
            created = report.created,
            updated = report.updated,
            disabled = report.disabled,
            removed = report.removed,
            skipped = report.skipped,
            failures = report.failures.len(),
            "reconciliation pass complete"
        );
        Ok(report)
    }
}
