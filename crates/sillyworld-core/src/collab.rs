//! Collaborator traits and in-memory implementations.
//!
//! The bridge talks to three external systems: the game (snapshots and
//! lore), the entry store (a worldbook of [`DerivedEntry`] values), and the
//! chat front-end (session binding and narrative dispatch). Each is a
//! narrow async trait so the binary can plug in HTTP clients while tests
//! and embedders use the in-memory versions below.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use sillyworld_types::{DerivedEntry, EntryUpsert, Locale, SessionKey, TimelineId, WorldId};
use tokio::sync::RwLock;

/// Errors reported by collaborators.
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    /// The remote side could not be reached.
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote side answered with an error status.
    #[error("unexpected status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The response could not be decoded.
    #[error("invalid response: {0}")]
    Decode(String),

    /// The addressed resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The remote side refused the request.
    #[error("rejected: {0}")]
    Rejected(String),
}

impl CollaboratorError {
    /// Whether retrying later may succeed.
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Decode(_) | Self::NotFound(_) | Self::Rejected(_) => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Source of state snapshots and lore documents.
#[async_trait]
pub trait GameStateSource: Send + Sync {
    /// Fetch the current raw state document.
    async fn fetch_snapshot(&self, locale: Locale) -> Result<Value, CollaboratorError>;

    /// Fetch the lore document used for story mode.
    async fn fetch_lore(&self, locale: Locale) -> Result<Value, CollaboratorError>;
}

/// The external, mutable store of derived entries.
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Create the named book if needed and bind it to the current chat.
    async fn ensure_book(&self, book: &str) -> Result<(), CollaboratorError>;

    /// List every entry in a book.
    async fn list(&self, book: &str) -> Result<Vec<DerivedEntry>, CollaboratorError>;

    /// Create or fully replace one entry.
    async fn upsert(&self, book: &str, entry: &EntryUpsert) -> Result<(), CollaboratorError>;

    /// Remove entries by name in one batch.
    async fn remove_batch(&self, book: &str, names: &[String]) -> Result<(), CollaboratorError>;
}

/// The chat front-end narratives are dispatched into.
#[async_trait]
pub trait ChatSession: Send + Sync {
    /// Switch the chat to the session bound to a timeline.
    async fn rebind_session(
        &self,
        world_id: &WorldId,
        timeline_id: TimelineId,
        session: &SessionKey,
    ) -> Result<(), CollaboratorError>;

    /// Send narrative text as a user turn and trigger generation.
    async fn dispatch_narrative(&self, text: &str) -> Result<(), CollaboratorError>;
}

// ---------------------------------------------------------------------------
// In-memory game state
// ---------------------------------------------------------------------------

/// A [`GameStateSource`] serving fixed documents.
///
/// An unset document is reported as a transport failure, which is what a
/// game that is not running looks like.
#[derive(Debug, Default)]
pub struct StaticGameState {
    snapshot: RwLock<Option<Value>>,
    lore: RwLock<Option<Value>>,
    snapshot_fetches: AtomicUsize,
}

impl StaticGameState {
    /// Create a source serving `snapshot`.
    pub fn new(snapshot: Value) -> Self {
        Self {
            snapshot: RwLock::new(Some(snapshot)),
            ..Self::default()
        }
    }

    /// Replace the served snapshot; `None` makes fetches fail.
    pub async fn set_snapshot(&self, snapshot: Option<Value>) {
        *self.snapshot.write().await = snapshot;
    }

    /// Replace the served lore document.
    pub async fn set_lore(&self, lore: Option<Value>) {
        *self.lore.write().await = lore;
    }

    /// Number of snapshot fetches so far.
    pub fn snapshot_fetches(&self) -> usize {
        self.snapshot_fetches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl GameStateSource for StaticGameState {
    async fn fetch_snapshot(&self, _locale: Locale) -> Result<Value, CollaboratorError> {
        self.snapshot_fetches.fetch_add(1, Ordering::Relaxed);
        self.snapshot
            .read()
            .await
            .clone()
            .ok_or_else(|| CollaboratorError::Transport("game state unavailable".to_owned()))
    }

    async fn fetch_lore(&self, _locale: Locale) -> Result<Value, CollaboratorError> {
        self.lore
            .read()
            .await
            .clone()
            .ok_or_else(|| CollaboratorError::Transport("lore unavailable".to_owned()))
    }
}

// ---------------------------------------------------------------------------
// In-memory entry store
// ---------------------------------------------------------------------------

/// A write observed by [`MemoryEntryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreWrite {
    /// An upsert of the named entry.
    Upsert(String),
    /// A batch removal.
    Remove(Vec<String>),
}

/// An [`EntryStore`] held in memory, with failure injection for tests.
#[derive(Debug, Default)]
pub struct MemoryEntryStore {
    books: RwLock<BTreeMap<String, BTreeMap<String, DerivedEntry>>>,
    writes: RwLock<Vec<StoreWrite>>,
    fail_list: AtomicBool,
    fail_remove: AtomicBool,
    fail_upserts: RwLock<BTreeSet<String>>,
}

impl MemoryEntryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an entry without recording a write.
    pub async fn seed(&self, book: &str, entry: DerivedEntry) {
        self.books
            .write()
            .await
            .entry(book.to_owned())
            .or_default()
            .insert(entry.name.clone(), entry);
    }

    /// Current entries of a book, in name order.
    pub async fn entries(&self, book: &str) -> Vec<DerivedEntry> {
        self.books
            .read()
            .await
            .get(book)
            .map(|entries| entries.values().cloned().collect())
            .unwrap_or_default()
    }

    /// One entry by name.
    pub async fn entry(&self, book: &str, name: &str) -> Option<DerivedEntry> {
        self.books
            .read()
            .await
            .get(book)
            .and_then(|entries| entries.get(name).cloned())
    }

    /// Every write recorded so far.
    pub async fn writes(&self) -> Vec<StoreWrite> {
        self.writes.read().await.clone()
    }

    /// Forget recorded writes.
    pub async fn clear_writes(&self) {
        self.writes.write().await.clear();
    }

    /// Make `list` fail.
    pub fn fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::Relaxed);
    }

    /// Make `remove_batch` fail.
    pub fn fail_remove(&self, fail: bool) {
        self.fail_remove.store(fail, Ordering::Relaxed);
    }

    /// Make upserts of the named entry fail.
    pub async fn fail_upsert_of(&self, name: &str) {
        self.fail_upserts.write().await.insert(name.to_owned());
    }
}

#[async_trait]
impl EntryStore for MemoryEntryStore {
    async fn ensure_book(&self, book: &str) -> Result<(), CollaboratorError> {
        self.books.write().await.entry(book.to_owned()).or_default();
        Ok(())
    }

    async fn list(&self, book: &str) -> Result<Vec<DerivedEntry>, CollaboratorError> {
        if self.fail_list.load(Ordering::Relaxed) {
            return Err(CollaboratorError::Transport("list failed".to_owned()));
        }
        Ok(self.entries(book).await)
    }

    async fn upsert(&self, book: &str, entry: &EntryUpsert) -> Result<(), CollaboratorError> {
        if self.fail_upserts.read().await.contains(&entry.name) {
            return Err(CollaboratorError::Rejected(format!("upsert of {} refused", entry.name)));
        }
        self.books
            .write()
            .await
            .entry(book.to_owned())
            .or_default()
            .insert(entry.name.clone(), entry.to_entry());
        self.writes
            .write()
            .await
            .push(StoreWrite::Upsert(entry.name.clone()));
        Ok(())
    }

    async fn remove_batch(&self, book: &str, names: &[String]) -> Result<(), CollaboratorError> {
        if self.fail_remove.load(Ordering::Relaxed) {
            return Err(CollaboratorError::Transport("remove failed".to_owned()));
        }
        if let Some(entries) = self.books.write().await.get_mut(book) {
            for name in names {
                entries.remove(name);
            }
        }
        self.writes
            .write()
            .await
            .push(StoreWrite::Remove(names.to_vec()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Recording chat
// ---------------------------------------------------------------------------

/// A [`ChatSession`] that records calls.
#[derive(Debug, Default)]
pub struct RecordingChat {
    rebinds: RwLock<Vec<SessionKey>>,
    dispatched: RwLock<Vec<String>>,
    fail_dispatch: AtomicBool,
    fail_rebind: AtomicBool,
}

impl RecordingChat {
    /// Create a recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sessions rebound to, in order.
    pub async fn rebinds(&self) -> Vec<SessionKey> {
        self.rebinds.read().await.clone()
    }

    /// Narratives dispatched, in order.
    pub async fn dispatched(&self) -> Vec<String> {
        self.dispatched.read().await.clone()
    }

    /// Make dispatch fail.
    pub fn fail_dispatch(&self, fail: bool) {
        self.fail_dispatch.store(fail, Ordering::Relaxed);
    }

    /// Make rebinding fail.
    pub fn fail_rebind(&self, fail: bool) {
        self.fail_rebind.store(fail, Ordering::Relaxed);
    }
}

#[async_trait]
impl ChatSession for RecordingChat {
    async fn rebind_session(
        &self,
        _world_id: &WorldId,
        _timeline_id: TimelineId,
        session: &SessionKey,
    ) -> Result<(), CollaboratorError> {
        if self.fail_rebind.load(Ordering::Relaxed) {
            return Err(CollaboratorError::Transport("chat unavailable".to_owned()));
        }
        self.rebinds.write().await.push(session.clone());
        Ok(())
    }

    async fn dispatch_narrative(&self, text: &str) -> Result<(), CollaboratorError> {
        if self.fail_dispatch.load(Ordering::Relaxed) {
            return Err(CollaboratorError::Transport("chat unavailable".to_owned()));
        }
        self.dispatched.write().await.push(text.to_owned());
        Ok(())
    }
}
