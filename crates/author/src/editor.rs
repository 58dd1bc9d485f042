use delve_common::{EditKind, Origin, TileCoord};
use delve_kernel::{Refusal, TileState, Transition};
use delve_persist::{MutationLedger, MutationRecord, MutationStore};
use delve_stream::{ApplyError, ChunkStore, Slot};
use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Edit tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditConfig {
    /// Minimum world-space distance between a viewpoint and the centre of a
    /// tile it builds on, or a floor it digs.
    pub guard_distance: f32,
}

impl Default for EditConfig {
    fn default() -> Self {
        Self {
            guard_distance: 0.6,
        }
    }
}

/// Why a local edit was declined. Informational: nothing changed.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum EditError {
    #[error("target is {distance:.2} units from a viewpoint")]
    TooClose { distance: f32 },
    #[error(transparent)]
    Refused(#[from] Refusal),
}

/// Outcome of an accepted edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditReport {
    /// Applied to a loaded tile.
    Applied(Transition),
    /// Target not loaded; queued in the ledger until it materializes.
    Deferred,
}

/// A collectible produced by a local edit, lying at its tile centre.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DropEvent {
    pub coord: TileCoord,
    pub position: Vec2,
}

/// Positions the proximity guards check against.
#[derive(Debug, Clone, Copy)]
pub struct Viewpoints<'a> {
    pub local: Vec2,
    pub peers: &'a [Vec2],
}

/// The mutable world state an edit touches.
pub struct EditContext<'a> {
    pub chunks: &'a mut ChunkStore,
    pub ledger: &'a mut MutationLedger,
    pub store: &'a mut dyn MutationStore,
}

/// Validates edits, applies them, and queues their side effects.
pub struct EditEngine {
    config: EditConfig,
    outbox: Vec<MutationRecord>,
    drops: Vec<DropEvent>,
}

impl EditEngine {
    pub fn new(config: EditConfig) -> Self {
        Self {
            config,
            outbox: Vec::new(),
            drops: Vec::new(),
        }
    }

    pub fn config(&self) -> &EditConfig {
        &self.config
    }

    /// Apply a player-initiated edit.
    pub fn apply_local(
        &mut self,
        kind: EditKind,
        coord: TileCoord,
        ctx: EditContext<'_>,
        viewpoints: Viewpoints<'_>,
    ) -> Result<EditReport, EditError> {
        let slot = ctx.chunks.slot(coord);
        self.check_guards(kind, coord, slot, ctx.chunks.tile_size(), viewpoints)?;

        let (report, record) = match ctx.chunks.apply(coord, kind) {
            Ok(change) => {
                ctx.ledger.record_applied(coord, kind);
                if change.drops() {
                    self.drops.push(DropEvent {
                        coord,
                        position: coord.to_world(ctx.chunks.tile_size()),
                    });
                }
                (EditReport::Applied(change), MutationRecord::applied(kind, coord))
            }
            Err(ApplyError::Unloaded) => {
                ctx.ledger.record_pending(coord, kind);
                (EditReport::Deferred, MutationRecord::deferred(kind, coord))
            }
            Err(ApplyError::Refused(refusal)) => {
                tracing::debug!(%coord, %kind, %refusal, "local edit refused");
                return Err(refusal.into());
            }
        };

        if let Err(err) = ctx.store.save_mutation(record) {
            tracing::warn!(%coord, %kind, error = %err, "failed to persist edit");
        }
        self.outbox.push(record);
        tracing::debug!(%coord, %kind, origin = ?Origin::Local, ?report, "edit accepted");
        Ok(report)
    }

    /// Apply an edit received from a peer. No guards, no persistence, no
    /// broadcast, no drops.
    pub fn apply_remote(
        &mut self,
        kind: EditKind,
        coord: TileCoord,
        chunks: &mut ChunkStore,
        ledger: &mut MutationLedger,
    ) -> Result<EditReport, EditError> {
        let report = match chunks.apply(coord, kind) {
            Ok(change) => {
                ledger.record_applied(coord, kind);
                EditReport::Applied(change)
            }
            Err(ApplyError::Unloaded) => {
                ledger.record_pending(coord, kind);
                EditReport::Deferred
            }
            Err(ApplyError::Refused(refusal)) => {
                tracing::debug!(%coord, %kind, %refusal, "remote edit refused");
                return Err(refusal.into());
            }
        };
        tracing::debug!(%coord, %kind, origin = ?Origin::Remote, ?report, "edit accepted");
        Ok(report)
    }

    fn check_guards(
        &self,
        kind: EditKind,
        coord: TileCoord,
        slot: Slot,
        tile_size: f32,
        viewpoints: Viewpoints<'_>,
    ) -> Result<(), EditError> {
        let target = coord.to_world(tile_size);
        let guard = self.config.guard_distance;
        let too_close = |p: Vec2| {
            let distance = p.distance(target);
            (distance < guard).then_some(EditError::TooClose { distance })
        };
        match (kind, slot) {
            // Rebuilding the ground is always allowed.
            (EditKind::Build, Slot::Hole) => Ok(()),
            (EditKind::Build, _) => {
                let nearest = std::iter::once(viewpoints.local)
                    .chain(viewpoints.peers.iter().copied())
                    .find_map(too_close);
                match nearest {
                    Some(err) => Err(err),
                    None => Ok(()),
                }
            }
            (EditKind::Destroy, Slot::Tile(TileState::Floor { .. })) => {
                too_close(viewpoints.local).map_or(Ok(()), Err)
            }
            _ => Ok(()),
        }
    }

    /// Accepted local edits waiting to be broadcast, oldest first.
    pub fn drain_outbound(&mut self) -> Vec<MutationRecord> {
        std::mem::take(&mut self.outbox)
    }

    /// Drops produced since the last drain.
    pub fn drain_drops(&mut self) -> Vec<DropEvent> {
        std::mem::take(&mut self.drops)
    }
}

impl Default for EditEngine {
    fn default() -> Self {
        Self::new(EditConfig::default())
    }
}
