//! Shared type definitions for the Sillyworld bridge.
//!
//! Every crate in the workspace speaks these types: the game-facing wire
//! shapes (events, stream envelopes), the identifiers of worlds and
//! timelines, and the entries projected into the external entry store.
//!
//! # Modules
//!
//! - [`ids`] -- World, timeline and chat session identifiers
//! - [`events`] -- Simulation events and time-windowed summaries
//! - [`stream`] -- Envelopes arriving on the game's event socket
//! - [`entries`] -- Derived entries and typed upsert options
//! - [`locale`] -- Output language selection

pub mod entries;
pub mod events;
pub mod ids;
pub mod locale;
pub mod stream;

// Re-export all public types at crate root for convenience.
pub use entries::{
    ActivationStrategy, DerivedEntry, EntryName, EntryPlacement, EntryPosition, EntryUpsert,
    UpsertOptions, dedup_keywords, entry_name,
};
pub use events::{EventKind, EventSummary, GameEvent, Participant};
pub use ids::{SESSION_GROUP_PREFIX, SessionKey, TimelineId, WorldId};
pub use locale::{Locale, UnknownLocale};
pub use stream::{SaveLoaded, StreamDecodeError, StreamEnvelope, StreamMessage};
