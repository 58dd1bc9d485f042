use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Integer tile address on the world grid (`gx`, `gz`).
///
/// Ordering is lexicographic on (`gx`, `gz`) so BTreeMaps keyed by coordinate
/// iterate identically on every peer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct TileCoord {
    pub gx: i32,
    pub gz: i32,
}

impl TileCoord {
    pub const fn new(gx: i32, gz: i32) -> Self {
        Self { gx, gz }
    }

    /// Map a continuous XZ position to the tile containing it.
    pub fn from_world(position: Vec2, tile_size: f32) -> Self {
        Self {
            gx: (position.x / tile_size + 0.5).floor() as i32,
            gz: (position.y / tile_size + 0.5).floor() as i32,
        }
    }

    /// Centre of this tile in world units.
    pub fn to_world(self, tile_size: f32) -> Vec2 {
        Vec2::new(self.gx as f32 * tile_size, self.gz as f32 * tile_size)
    }

    pub fn offset(self, dx: i32, dz: i32) -> Self {
        Self::new(self.gx + dx, self.gz + dz)
    }

    /// Chessboard distance, the metric of the square load window.
    pub fn chebyshev(self, other: Self) -> i32 {
        (self.gx - other.gx).abs().max((self.gz - other.gz).abs())
    }

    /// Squared Euclidean distance in tiles, computed in the integer domain.
    pub fn distance_squared(self, other: Self) -> i64 {
        let dx = (self.gx - other.gx) as i64;
        let dz = (self.gz - other.gz) as i64;
        dx * dx + dz * dz
    }

    /// All coordinates within Chebyshev distance `radius` of `self`, row by row.
    pub fn square(self, radius: i32) -> impl Iterator<Item = TileCoord> {
        (-radius..=radius)
            .flat_map(move |dx| (-radius..=radius).map(move |dz| self.offset(dx, dz)))
    }
}

impl std::fmt::Display for TileCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.gx, self.gz)
    }
}
