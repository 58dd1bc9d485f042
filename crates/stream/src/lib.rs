//! Streaming: the chunk store and throttled load/evict around a viewpoint.
//!
//! # Invariants
//! - A coordinate is either fully loaded, a hole, or absent. Never duplicated.
//! - Pending ledger entries are replayed the moment their coordinate loads.
//! - Unloaded space is solid for collision.
//!
//! Uses a uniform square grid; the load window is a Chebyshev square.

mod chunk;
mod streamer;

pub use chunk::{ApplyError, ChunkSnapshot, ChunkStore, LoadWindow, Slot};
pub use streamer::{StreamConfig, StreamState, StreamStats, StreamUpdate};
