//! Timeline resolution, flush scheduling, and entry reconciliation for the
//! Sillyworld bridge.
//!
//! The game streams time-windowed event summaries and announces save
//! loads. This crate decides which causal branch of a world each load
//! belongs to, buffers summaries until roughly four in-game hours have
//! passed, turns them into narrative text, and keeps the per-world entry
//! book in step with the latest state snapshot.
//!
//! # Modules
//!
//! - [`bridge`] -- The [`Bridge`] session context wiring everything below
//!   to the collaborators.
//! - [`collab`] -- Collaborator traits (game state, entry store, chat) and
//!   in-memory implementations.
//! - [`config`] -- Configuration loading from `sillyworld-config.yaml`.
//! - [`flush`] -- Buffer append, flush threshold, and drain.
//! - [`gate`] -- Single-flight reconciliation per world.
//! - [`lore`] -- Lore document rendering via `minijinja`.
//! - [`reconcile`] -- Desired-vs-existing entry planning and application.
//! - [`timeline`] -- Worlds, timelines, and the continuity resolver.
//! - [`transform`] -- Snapshot slimming and keyword extraction.
//! - [`translate`] -- Event summaries to narrative text.
//!
//! [`Bridge`]: bridge::Bridge

pub mod bridge;
pub mod collab;
pub mod config;
pub mod flush;
pub mod gate;
pub mod lore;
pub mod reconcile;
pub mod timeline;
pub mod transform;
pub mod translate;

pub use bridge::{Bridge, BridgeError, BridgeSettings, Notice, NoticeKind, RuntimeSettings};
