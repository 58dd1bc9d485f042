//! Session layer: the `WorldEngine` context object and its frame loop.
//!
//! # Invariants
//! - All chunk store mutation happens inside `WorldEngine` calls on one thread.
//! - Inbound network traffic is applied only when `tick` drains the inbox.
//! - A member that sorts beyond the member cap stops processing.

mod config;
mod drops;
mod engine;
mod reconcile;
mod viewpoint;

pub use config::{ConfigError, EngineConfig, SessionConfig};
pub use drops::{DropField, DroppedItem};
pub use engine::{EngineError, EngineEvent, WorldEngine};
pub use reconcile::{PeerViewpoint, RemoteReconciler};
pub use viewpoint::Viewpoint;
