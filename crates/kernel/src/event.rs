use delve_common::TileCoord;
use serde::{Deserialize, Serialize};

use crate::tile::TileState;

/// Tile-level change notifications for the render/physics collaborator.
///
/// The core never reads these back; they are a one-way feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TileEvent {
    /// Tile materialized (chunk load) or ground rebuilt over a hole.
    Added { coord: TileCoord, state: TileState },
    /// Tile evicted, or broken into a hole.
    Removed { coord: TileCoord },
    /// Runtime state of a loaded tile changed.
    Changed { coord: TileCoord, state: TileState },
}
