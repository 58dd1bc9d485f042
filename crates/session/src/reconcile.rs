use std::collections::BTreeMap;

use delve_author::{EditEngine, EditError, EditReport};
use delve_common::PeerId;
use delve_net::{ActionMessage, PositionUpdate};
use delve_persist::MutationLedger;
use delve_stream::ChunkStore;
use glam::Vec2;

/// What we know about one remote member.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerViewpoint {
    pub id: PeerId,
    pub number: u32,
    /// Smoothed display position. `None` until the first update arrives.
    pub position: Option<Vec2>,
    pub target: Vec2,
    pub facing: Vec2,
    pub moving: bool,
    pub attacking: bool,
    pub facing_right: bool,
}

impl PeerViewpoint {
    fn new(id: PeerId, number: u32) -> Self {
        Self {
            id,
            number,
            position: None,
            target: Vec2::ZERO,
            facing: Vec2::Y,
            moving: false,
            attacking: false,
            facing_right: true,
        }
    }
}

/// Tracks remote members and routes their edits into the edit engine.
#[derive(Debug)]
pub struct RemoteReconciler {
    local: PeerId,
    rate: f32,
    peers: BTreeMap<PeerId, PeerViewpoint>,
}

impl RemoteReconciler {
    pub fn new(local: PeerId, interpolation_rate: f32) -> Self {
        Self {
            local,
            rate: interpolation_rate,
            peers: BTreeMap::new(),
        }
    }

    pub fn join(&mut self, id: PeerId, number: u32) {
        tracing::info!(peer = %id, number, "peer joined");
        self.peers
            .insert(id.clone(), PeerViewpoint::new(id, number));
    }

    pub fn leave(&mut self, id: &PeerId) -> bool {
        let removed = self.peers.remove(id).is_some();
        if removed {
            tracing::info!(peer = %id, "peer left");
        }
        removed
    }

    pub fn get(&self, id: &PeerId) -> Option<&PeerViewpoint> {
        self.peers.get(id)
    }

    pub fn peers(&self) -> impl Iterator<Item = &PeerViewpoint> {
        self.peers.values()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Current display positions of every peer that has reported one.
    pub fn positions(&self) -> Vec<Vec2> {
        self.peers.values().filter_map(|p| p.position).collect()
    }

    /// Record a position update as the interpolation target. The first
    /// update for a peer snaps. Returns false for our own echo or an
    /// unknown sender.
    pub fn on_position(&mut self, update: &PositionUpdate) -> bool {
        if update.id == self.local {
            return false;
        }
        let Some(peer) = self.peers.get_mut(&update.id) else {
            tracing::debug!(peer = %update.id, "position from unknown peer ignored");
            return false;
        };
        let target = Vec2::new(update.x, update.z);
        peer.target = target;
        if peer.position.is_none() {
            peer.position = Some(target);
        }
        peer.facing = Vec2::new(update.dx, update.dy);
        peer.moving = update.moving;
        peer.attacking = update.attacking;
        peer.facing_right = update.facing_right;
        true
    }

    /// Dispatch a peer's edit through the remote path. `None` for our own echo.
    pub fn on_action(
        &mut self,
        action: &ActionMessage,
        edits: &mut EditEngine,
        chunks: &mut ChunkStore,
        ledger: &mut MutationLedger,
    ) -> Option<Result<EditReport, EditError>> {
        if action.id == self.local {
            return None;
        }
        let result = edits.apply_remote(action.kind, action.coord, chunks, ledger);
        if let Err(err) = &result {
            tracing::debug!(
                peer = %action.id,
                coord = %action.coord,
                error = %err,
                "remote edit not applied"
            );
        }
        Some(result)
    }

    /// Advance every peer toward its target by exponential smoothing.
    pub fn interpolate(&mut self, dt: f32) {
        let alpha = 1.0 - (-self.rate * dt.max(0.0)).exp();
        for peer in self.peers.values_mut() {
            if let Some(pos) = peer.position.as_mut() {
                *pos += (peer.target - *pos) * alpha;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use delve_common::{EditKind, TileCoord};
    use delve_kernel::{Terrain, TileState};

    fn update(id: &str, x: f32, z: f32) -> PositionUpdate {
        PositionUpdate {
            id: PeerId::new(id),
            x,
            z,
            dx: 1.0,
            dy: 0.0,
            moving: true,
            attacking: false,
            facing_right: true,
        }
    }

    #[test]
    fn first_update_snaps_then_smooths() {
        let mut rec = RemoteReconciler::new(PeerId::new("me"), 10.0);
        rec.join(PeerId::new("b"), 2);
        assert!(rec.positions().is_empty());

        assert!(rec.on_position(&update("b", 4.0, 2.0)));
        assert_eq!(rec.get(&PeerId::new("b")).unwrap().position, Some(Vec2::new(4.0, 2.0)));

        rec.on_position(&update("b", 5.0, 2.0));
        rec.interpolate(0.1);
        let x = rec.get(&PeerId::new("b")).unwrap().position.unwrap().x;
        assert!(x > 4.0 && x < 5.0, "moved partway, got {x}");
        let expected = 4.0 + (1.0 - (-1.0f32).exp());
        assert!((x - expected).abs() < 1e-4);

        for _ in 0..100 {
            rec.interpolate(0.1);
        }
        let x = rec.get(&PeerId::new("b")).unwrap().position.unwrap().x;
        assert!((x - 5.0).abs() < 1e-3);
    }

    #[test]
    fn own_and_unknown_updates_are_ignored() {
        let mut rec = RemoteReconciler::new(PeerId::new("me"), 10.0);
        assert!(!rec.on_position(&update("me", 1.0, 1.0)));
        assert!(!rec.on_position(&update("stranger", 1.0, 1.0)));
        assert!(rec.is_empty());
    }

    #[test]
    fn leave_removes_peer() {
        let mut rec = RemoteReconciler::new(PeerId::new("me"), 10.0);
        rec.join(PeerId::new("b"), 2);
        rec.on_position(&update("b", 1.0, 1.0));
        assert!(rec.leave(&PeerId::new("b")));
        assert!(!rec.leave(&PeerId::new("b")));
        assert!(rec.positions().is_empty());
    }

    #[test]
    fn actions_route_through_remote_path() {
        let terrain = Terrain::default();
        let mut chunks = ChunkStore::new(terrain.tile_size());
        let mut ledger = MutationLedger::new();
        chunks.load_around(terrain.center(), 4, &terrain, &mut ledger);
        let mut edits = EditEngine::default();
        let mut rec = RemoteReconciler::new(PeerId::new("me"), 10.0);

        let coord = terrain.center();
        let own = ActionMessage {
            id: PeerId::new("me"),
            kind: EditKind::Build,
            coord,
        };
        assert!(rec.on_action(&own, &mut edits, &mut chunks, &mut ledger).is_none());
        assert_eq!(chunks.get(coord), Some(TileState::Floor { hp: 3 }));

        let theirs = ActionMessage {
            id: PeerId::new("b"),
            ..own
        };
        let report = rec.on_action(&theirs, &mut edits, &mut chunks, &mut ledger);
        assert!(matches!(report, Some(Ok(EditReport::Applied(_)))));
        assert_eq!(chunks.get(coord), Some(TileState::Built));

        let far = ActionMessage {
            id: PeerId::new("b"),
            kind: EditKind::Torch,
            coord: TileCoord::new(0, 9000),
        };
        let report = rec.on_action(&far, &mut edits, &mut chunks, &mut ledger);
        assert_eq!(report, Some(Ok(EditReport::Deferred)));
        assert_eq!(ledger.pending(far.coord), Some(EditKind::Torch));
    }
}
