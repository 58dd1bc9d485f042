//! Persistence: the mutation ledger and durable edit storage.
//!
//! # Invariants
//! - At most one pending edit per coordinate in the ledger; a later pending
//!   edit supersedes the earlier one (last-write-wins).
//! - Applied edits are kept in order and replayed whenever their coordinate
//!   loads again.
//! - The durable store is append-only; segments are content-hashed and
//!   chained, and loading fails closed on any mismatch.
//! - Records loaded at startup replay the first time their coordinate loads.

mod ledger;
mod store;

pub use ledger::{MutationEntry, MutationLedger};
pub use store::{FileStore, IntegrityManifest, ManifestEntry, StoreError, StoreMeta};

use delve_common::{EditKind, TileCoord};
use serde::{Deserialize, Serialize};

/// One durable edit, as exchanged with the persistence collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationRecord {
    pub kind: EditKind,
    pub coord: TileCoord,
    /// Recorded while the target was unloaded, so it may still be superseded.
    #[serde(default)]
    pub deferred: bool,
}

impl MutationRecord {
    pub fn applied(kind: EditKind, coord: TileCoord) -> Self {
        Self {
            kind,
            coord,
            deferred: false,
        }
    }

    pub fn deferred(kind: EditKind, coord: TileCoord) -> Self {
        Self {
            kind,
            coord,
            deferred: true,
        }
    }
}

/// The persistence collaborator: durable append plus bulk fetch at startup.
pub trait MutationStore {
    /// Append one edit. Callers treat failure as best-effort and do not retry.
    fn save_mutation(&mut self, record: MutationRecord) -> Result<(), StoreError>;

    /// Every saved edit, oldest first.
    fn load_mutations(&self) -> Result<Vec<MutationRecord>, StoreError>;
}

/// Volatile store for tests and offline sessions.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    records: Vec<MutationRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl MutationStore for MemoryStore {
    fn save_mutation(&mut self, record: MutationRecord) -> Result<(), StoreError> {
        self.records.push(record);
        Ok(())
    }

    fn load_mutations(&self) -> Result<Vec<MutationRecord>, StoreError> {
        Ok(self.records.clone())
    }
}
