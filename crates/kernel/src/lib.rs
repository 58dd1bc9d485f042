//! World Kernel: deterministic terrain synthesis and the tile edit state machine.
//!
//! # Invariants
//! - Synthesis is a pure function of (seed, coordinate). It never consults
//!   mutable state, so an evicted tile regenerates bit-identically.
//! - Lattice hashing is integer-only; floating point is used solely for
//!   interpolation with IEEE-exact operations (no transcendental calls).
//! - Every tile mutation flows through [`tile::transition`].

pub mod biome;
pub mod event;
pub mod noise;
pub mod terrain;
pub mod tile;

pub use biome::{Biome, BiomeClassifier};
pub use event::TileEvent;
pub use terrain::{Terrain, TerrainConfig};
pub use tile::{FLOOR_HP, Overlay, Refusal, TileKind, TileState, Transition, transition};
