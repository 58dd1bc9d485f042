use delve_common::EditKind;
use serde::{Deserialize, Serialize};

/// Hit points of a fresh floor tile.
pub const FLOOR_HP: u8 = 3;

/// Procedurally synthesized base type of a tile, before any edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TileKind {
    Floor,
    Obstacle,
    Liquid,
}

/// Runtime state of a materialized tile.
///
/// A hole (a floor broken to zero hp) has no state at all: callers model it
/// as `None` in [`transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TileState {
    Floor { hp: u8 },
    Obstacle,
    Liquid,
    /// Player-built block. Impassable.
    Built,
    /// Torch on floor. Passable, light-emitting.
    Torch,
}

/// Render-facing view of the mutable layer over a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Overlay {
    None,
    Built,
    Torch,
    DamagedFloor { hp: u8 },
}

impl TileState {
    /// Initial runtime state for a freshly synthesized tile.
    pub fn fresh(kind: TileKind) -> Self {
        match kind {
            TileKind::Floor => Self::Floor { hp: FLOOR_HP },
            TileKind::Obstacle => Self::Obstacle,
            TileKind::Liquid => Self::Liquid,
        }
    }

    pub fn is_passable(self) -> bool {
        matches!(self, Self::Floor { .. } | Self::Torch)
    }

    pub fn overlay(self) -> Overlay {
        match self {
            Self::Floor { hp } if hp < FLOOR_HP => Overlay::DamagedFloor { hp },
            Self::Built => Overlay::Built,
            Self::Torch => Overlay::Torch,
            Self::Floor { .. } | Self::Obstacle | Self::Liquid => Overlay::None,
        }
    }
}

/// A successful state change, as reported to callers and the render layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transition {
    /// Obstacle, built block or torch removed; floor restored at full hp.
    Cleared { natural: bool },
    /// Floor lost a hit point but still stands.
    Damaged { hp: u8 },
    /// Floor broke into a hole.
    Broken,
    /// Build on a hole restored the ground.
    Rebuilt,
    /// Build on floor raised a block.
    Built,
    /// Torch placed on floor.
    Lit,
}

impl Transition {
    /// Whether this change yields a collectible (natural rock or broken floor).
    pub fn drops(self) -> bool {
        matches!(self, Self::Cleared { natural: true } | Self::Broken)
    }
}

/// Why the state machine declined an edit. Always non-fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Refusal {
    #[error("nothing to destroy here")]
    NothingToDestroy,
    #[error("liquid cannot be destroyed")]
    Indestructible,
    #[error("tile is occupied")]
    Occupied,
    #[error("torches can only be placed on floor")]
    TorchNeedsFloor,
}

/// The tile edit state machine. `None` is a hole.
pub fn transition(
    current: Option<TileState>,
    kind: EditKind,
) -> Result<(Option<TileState>, Transition), Refusal> {
    let fresh_floor = Some(TileState::Floor { hp: FLOOR_HP });
    match (kind, current) {
        (EditKind::Destroy, Some(TileState::Obstacle)) => {
            Ok((fresh_floor, Transition::Cleared { natural: true }))
        }
        (EditKind::Destroy, Some(TileState::Built | TileState::Torch)) => {
            Ok((fresh_floor, Transition::Cleared { natural: false }))
        }
        (EditKind::Destroy, Some(TileState::Floor { hp })) => {
            let hp = hp.saturating_sub(1);
            if hp == 0 {
                Ok((None, Transition::Broken))
            } else {
                Ok((Some(TileState::Floor { hp }), Transition::Damaged { hp }))
            }
        }
        (EditKind::Destroy, Some(TileState::Liquid)) => Err(Refusal::Indestructible),
        (EditKind::Destroy, None) => Err(Refusal::NothingToDestroy),

        (EditKind::Build, None) => Ok((fresh_floor, Transition::Rebuilt)),
        (EditKind::Build, Some(TileState::Floor { .. })) => {
            Ok((Some(TileState::Built), Transition::Built))
        }
        (EditKind::Build, Some(_)) => Err(Refusal::Occupied),

        (EditKind::Torch, Some(TileState::Floor { .. })) => {
            Ok((Some(TileState::Torch), Transition::Lit))
        }
        (EditKind::Torch, _) => Err(Refusal::TorchNeedsFloor),
    }
}
