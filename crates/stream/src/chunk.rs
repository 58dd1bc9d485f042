use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use delve_common::{EditKind, TileCoord};
use delve_kernel::{Refusal, Terrain, TileEvent, TileState, Transition, transition};
use delve_persist::MutationLedger;
use glam::Vec2;

/// The square of coordinates most recently requested by `load_around`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadWindow {
    pub center: TileCoord,
    pub radius: i32,
}

/// What the chunk store holds at a coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Never materialized, or evicted.
    Unloaded,
    /// Materialized, then broken. Solid for collision, rebuildable.
    Hole,
    Tile(TileState),
}

/// Errors from applying an edit to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ApplyError {
    #[error("tile is not loaded")]
    Unloaded,
    #[error(transparent)]
    Refused(#[from] Refusal),
}

/// Canonical, comparable copy of the store contents.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChunkSnapshot {
    pub tiles: BTreeMap<TileCoord, TileState>,
    pub holes: BTreeSet<TileCoord>,
}

/// The materialized subset of the infinite tile grid.
///
/// The only holder of live per-tile runtime state. Every change is mirrored
/// as a [`TileEvent`] for the render collaborator.
pub struct ChunkStore {
    tile_size: f32,
    tiles: HashMap<TileCoord, TileState>,
    holes: HashSet<TileCoord>,
    window: Option<LoadWindow>,
    events: Vec<TileEvent>,
}

impl ChunkStore {
    pub fn new(tile_size: f32) -> Self {
        Self {
            tile_size,
            tiles: HashMap::new(),
            holes: HashSet::new(),
            window: None,
            events: Vec::new(),
        }
    }

    pub fn tile_size(&self) -> f32 {
        self.tile_size
    }

    pub fn window(&self) -> Option<LoadWindow> {
        self.window
    }

    /// Materialize every coordinate within `radius` of `center` that is not
    /// already present. Each one replays its ledger history, then its pending
    /// edit if any. Returns the newly materialized coordinates.
    pub fn load_around(
        &mut self,
        center: TileCoord,
        radius: i32,
        terrain: &Terrain,
        ledger: &mut MutationLedger,
    ) -> Vec<TileCoord> {
        let mut loaded = Vec::new();
        for coord in center.square(radius) {
            if self.tiles.contains_key(&coord) || self.holes.contains(&coord) {
                continue;
            }
            let mut state = Some(TileState::fresh(terrain.synthesize(coord)));
            for kind in ledger.history(coord) {
                state = replay(coord, state, *kind);
            }
            if let Some(kind) = ledger.consume(coord) {
                state = replay(coord, state, kind);
            }
            match state {
                Some(s) => {
                    self.tiles.insert(coord, s);
                    self.events.push(TileEvent::Added { coord, state: s });
                }
                None => {
                    self.holes.insert(coord);
                }
            }
            loaded.push(coord);
        }
        self.window = Some(LoadWindow { center, radius });
        loaded
    }

    /// Drop every coordinate farther than `radius` from `center`.
    /// Returns the evicted coordinates, holes included.
    pub fn evict_beyond(&mut self, center: TileCoord, radius: i32) -> Vec<TileCoord> {
        let mut evicted: Vec<TileCoord> = self
            .tiles
            .keys()
            .filter(|c| c.chebyshev(center) > radius)
            .copied()
            .collect();
        for coord in &evicted {
            self.tiles.remove(coord);
            self.events.push(TileEvent::Removed { coord: *coord });
        }
        let stale_holes: Vec<TileCoord> = self
            .holes
            .iter()
            .filter(|c| c.chebyshev(center) > radius)
            .copied()
            .collect();
        for coord in &stale_holes {
            self.holes.remove(coord);
        }
        evicted.extend(stale_holes);
        evicted
    }

    /// Run the edit state machine on a loaded tile or hole.
    pub fn apply(&mut self, coord: TileCoord, kind: EditKind) -> Result<Transition, ApplyError> {
        let current = match self.slot(coord) {
            Slot::Unloaded => return Err(ApplyError::Unloaded),
            Slot::Hole => None,
            Slot::Tile(state) => Some(state),
        };
        let (next, change) = transition(current, kind)?;
        self.set(coord, next);
        tracing::debug!(%coord, %kind, ?change, "tile edited");
        Ok(change)
    }

    fn set(&mut self, coord: TileCoord, next: Option<TileState>) {
        match next {
            Some(state) => {
                let was_hole = self.holes.remove(&coord);
                self.tiles.insert(coord, state);
                if was_hole {
                    self.events.push(TileEvent::Added { coord, state });
                } else {
                    self.events.push(TileEvent::Changed { coord, state });
                }
            }
            None => {
                self.tiles.remove(&coord);
                self.holes.insert(coord);
                self.events.push(TileEvent::Removed { coord });
            }
        }
    }

    pub fn slot(&self, coord: TileCoord) -> Slot {
        if let Some(state) = self.tiles.get(&coord) {
            Slot::Tile(*state)
        } else if self.holes.contains(&coord) {
            Slot::Hole
        } else {
            Slot::Unloaded
        }
    }

    pub fn get(&self, coord: TileCoord) -> Option<TileState> {
        self.tiles.get(&coord).copied()
    }

    /// Whether `coord` is materialized (tile or hole); edits there apply
    /// immediately instead of being deferred.
    pub fn is_resident(&self, coord: TileCoord) -> bool {
        self.tiles.contains_key(&coord) || self.holes.contains(&coord)
    }

    pub fn is_hole(&self, coord: TileCoord) -> bool {
        self.holes.contains(&coord)
    }

    /// Collision query on a continuous XZ position. The void is solid.
    pub fn is_passable(&self, position: Vec2) -> bool {
        let coord = TileCoord::from_world(position, self.tile_size);
        self.tiles.get(&coord).is_some_and(|s| s.is_passable())
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    pub fn hole_count(&self) -> usize {
        self.holes.len()
    }

    /// Drain and return pending tile events.
    pub fn drain_events(&mut self) -> Vec<TileEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[TileEvent] {
        &self.events
    }

    pub fn snapshot(&self) -> ChunkSnapshot {
        ChunkSnapshot {
            tiles: self.tiles.iter().map(|(c, s)| (*c, *s)).collect(),
            holes: self.holes.iter().copied().collect(),
        }
    }

    /// FNV-1a over the canonical (sorted) contents. Two peers that agree on
    /// every loaded tile produce the same hash.
    pub fn state_hash(&self) -> u64 {
        let mut h: u64 = 0xcbf2_9ce4_8422_2325;
        let mix = |h: &mut u64, bytes: &[u8]| {
            for &b in bytes {
                *h ^= b as u64;
                *h = h.wrapping_mul(0x0100_0000_01b3);
            }
        };
        let snapshot = self.snapshot();
        for (coord, state) in &snapshot.tiles {
            mix(&mut h, &coord.gx.to_le_bytes());
            mix(&mut h, &coord.gz.to_le_bytes());
            let (tag, hp) = match state {
                TileState::Floor { hp } => (0u8, *hp),
                TileState::Obstacle => (1, 0),
                TileState::Liquid => (2, 0),
                TileState::Built => (3, 0),
                TileState::Torch => (4, 0),
            };
            mix(&mut h, &[tag, hp]);
        }
        for coord in &snapshot.holes {
            mix(&mut h, &coord.gx.to_le_bytes());
            mix(&mut h, &coord.gz.to_le_bytes());
            mix(&mut h, &[0xff]);
        }
        h
    }
}

fn replay(coord: TileCoord, state: Option<TileState>, kind: EditKind) -> Option<TileState> {
    match transition(state, kind) {
        Ok((next, change)) => {
            tracing::debug!(%coord, %kind, ?change, "ledger entry replayed");
            next
        }
        Err(refusal) => {
            tracing::debug!(%coord, %kind, %refusal, "ledger entry no longer applies");
            state
        }
    }
}
