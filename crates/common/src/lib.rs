//! Shared vocabulary for every delve crate.
//!
//! # Invariants
//! - All spatial lookups key off [`TileCoord`], never raw floating positions.
//! - Continuous positions map to tiles by round-half-up on `position / tile_size`.

mod coords;
mod types;

pub use coords::TileCoord;
pub use types::{EditKind, Origin, PeerId};
