use std::collections::BTreeMap;

use delve_common::{EditKind, TileCoord};
use serde::{Deserialize, Serialize};

use crate::MutationRecord;

/// Everything recorded against one coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationEntry {
    pub coord: TileCoord,
    /// Edits applied since the tile was synthesized, oldest first. Replayed in
    /// full every time the coordinate materializes.
    pub history: Vec<EditKind>,
    /// Latest edit still waiting for the coordinate to load.
    pub pending: Option<EditKind>,
}

impl MutationEntry {
    fn new(coord: TileCoord) -> Self {
        Self {
            coord,
            history: Vec::new(),
            pending: None,
        }
    }

    /// False while an edit waits for its coordinate to be materialized.
    pub fn is_applied(&self) -> bool {
        self.pending.is_none()
    }

    fn settle(&mut self) -> Option<EditKind> {
        let kind = self.pending.take()?;
        self.history.push(kind);
        Some(kind)
    }
}

/// Deferred-apply log reconciling edits against not-yet-loaded terrain.
///
/// Keyed by coordinate (BTreeMap, so iteration is identical across peers).
/// A coordinate holds at most one pending edit; a later pending edit replaces
/// it. Once applied, an edit joins the coordinate's history, and the chunk
/// store replays that history on top of the synthesized tile whenever the
/// coordinate loads, so multi-step edits survive eviction and restarts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MutationLedger {
    entries: BTreeMap<TileCoord, MutationEntry>,
}

impl MutationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from persisted records, oldest first. Applied records extend the
    /// history; deferred records become pending and supersede one another.
    /// Nothing seeded is live yet, so all of it replays on first load.
    /// Returns the entry count.
    pub fn seed(&mut self, records: impl IntoIterator<Item = MutationRecord>) -> usize {
        for record in records {
            if record.deferred {
                self.record_pending(record.coord, record.kind);
            } else {
                let entry = self.entry(record.coord);
                // A deferred edit followed by an applied one was replayed in between.
                entry.settle();
                entry.history.push(record.kind);
            }
        }
        self.entries.len()
    }

    /// Upsert a pending edit. Returns the edit it superseded, if any.
    pub fn record_pending(&mut self, coord: TileCoord, kind: EditKind) -> Option<EditKind> {
        let superseded = self.entry(coord).pending.replace(kind);
        if let Some(old) = superseded {
            tracing::debug!(%coord, %old, new = %kind, "ledger entry superseded");
        }
        superseded
    }

    /// Record an edit that was already applied to a loaded tile.
    pub fn record_applied(&mut self, coord: TileCoord, kind: EditKind) {
        self.entry(coord).history.push(kind);
    }

    /// Take the pending edit at `coord`, moving it into the history.
    pub fn consume(&mut self, coord: TileCoord) -> Option<EditKind> {
        self.entries.get_mut(&coord)?.settle()
    }

    /// Edits already applied at `coord`, oldest first.
    pub fn history(&self, coord: TileCoord) -> &[EditKind] {
        self.entries
            .get(&coord)
            .map(|e| e.history.as_slice())
            .unwrap_or_default()
    }

    pub fn get(&self, coord: TileCoord) -> Option<&MutationEntry> {
        self.entries.get(&coord)
    }

    /// The pending edit at `coord`, without consuming it.
    pub fn pending(&self, coord: TileCoord) -> Option<EditKind> {
        self.entries.get(&coord).and_then(|e| e.pending)
    }

    pub fn pending_count(&self) -> usize {
        self.entries.values().filter(|e| e.pending.is_some()).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &MutationEntry> {
        self.entries.values()
    }

    fn entry(&mut self, coord: TileCoord) -> &mut MutationEntry {
        self.entries
            .entry(coord)
            .or_insert_with(|| MutationEntry::new(coord))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const C: TileCoord = TileCoord::new(10, -4);

    #[test]
    fn pending_is_consumed_once() {
        let mut ledger = MutationLedger::new();
        ledger.record_pending(C, EditKind::Destroy);
        assert_eq!(ledger.pending_count(), 1);
        assert_eq!(ledger.consume(C), Some(EditKind::Destroy));
        assert_eq!(ledger.consume(C), None);
        assert_eq!(ledger.pending_count(), 0);
        assert!(ledger.get(C).unwrap().is_applied());
        assert_eq!(ledger.history(C), &[EditKind::Destroy]);
    }

    #[test]
    fn later_pending_supersedes() {
        let mut ledger = MutationLedger::new();
        assert_eq!(ledger.record_pending(C, EditKind::Build), None);
        assert_eq!(ledger.record_pending(C, EditKind::Torch), Some(EditKind::Build));
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.consume(C), Some(EditKind::Torch));
        assert_eq!(ledger.history(C), &[EditKind::Torch]);
    }

    #[test]
    fn consume_on_unknown_coord_is_none() {
        let mut ledger = MutationLedger::new();
        assert_eq!(ledger.consume(C), None);
        assert!(ledger.is_empty());
        assert!(ledger.history(C).is_empty());
    }

    #[test]
    fn applied_edits_accumulate_in_order() {
        let mut ledger = MutationLedger::new();
        ledger.record_applied(C, EditKind::Destroy);
        ledger.record_applied(C, EditKind::Torch);
        assert_eq!(ledger.consume(C), None);
        assert_eq!(ledger.history(C), &[EditKind::Destroy, EditKind::Torch]);
        assert!(ledger.get(C).unwrap().is_applied());

        ledger.record_pending(C, EditKind::Build);
        assert!(!ledger.get(C).unwrap().is_applied());
        assert_eq!(ledger.history(C).len(), 2);
    }

    #[test]
    fn seeding_keeps_applied_chain_and_collapses_deferred() {
        let mut ledger = MutationLedger::new();
        let other = TileCoord::new(0, 0);
        let count = ledger.seed([
            MutationRecord::applied(EditKind::Destroy, C),
            MutationRecord::deferred(EditKind::Build, other),
            MutationRecord::applied(EditKind::Torch, C),
            MutationRecord::deferred(EditKind::Torch, other),
        ]);
        assert_eq!(count, 2);
        assert_eq!(ledger.history(C), &[EditKind::Destroy, EditKind::Torch]);
        assert_eq!(ledger.pending(C), None);
        assert!(ledger.history(other).is_empty());
        assert_eq!(ledger.pending(other), Some(EditKind::Torch));
    }

    #[test]
    fn seeding_settles_deferred_before_later_applied() {
        let mut ledger = MutationLedger::new();
        ledger.seed([
            MutationRecord::deferred(EditKind::Destroy, C),
            MutationRecord::applied(EditKind::Torch, C),
        ]);
        assert_eq!(ledger.history(C), &[EditKind::Destroy, EditKind::Torch]);
        assert_eq!(ledger.pending(C), None);
    }

    #[test]
    fn iteration_is_coordinate_ordered() {
        let mut ledger = MutationLedger::new();
        for gx in [5, -3, 9, 0] {
            ledger.record_pending(TileCoord::new(gx, 0), EditKind::Destroy);
        }
        let order: Vec<i32> = ledger.entries().map(|e| e.coord.gx).collect();
        assert_eq!(order, vec![-3, 0, 5, 9]);
    }
}
