//! Edit engine: applies destroy/build/torch edits to the chunk store.
//!
//! # Invariants
//! - A refused edit changes nothing and emits nothing.
//! - Every accepted local edit is recorded in the ledger, handed to the
//!   persistence collaborator and queued for broadcast.
//! - Remote edits skip the proximity guards and are deferred, never dropped,
//!   when their tile is not loaded.

mod editor;

pub use editor::{DropEvent, EditConfig, EditContext, EditEngine, EditError, EditReport, Viewpoints};
