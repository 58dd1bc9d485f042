//! Presence & broadcast: the pub/sub collaborator peers share a world through.
//!
//! # Invariants
//! - Inbound traffic is queued, never handled inside transport callbacks.
//!   The frame loop drains the queue on its own turn.
//! - Every broadcast carries its sender id and is echoed to the sender;
//!   receivers filter their own messages.
//! - Position updates are rate-limited, edit actions are not.

mod channel;
mod loopback;
mod presence;
mod protocol;

pub use channel::{
    Broadcast, ChannelError, Inbound, Inbox, InboxSender, NetConfig, RateLimiter, inbox,
};
pub use loopback::{LoopbackHub, LoopbackLink};
pub use presence::{PresenceDiff, PresenceTracker};
pub use protocol::{ActionMessage, Message, PositionUpdate, ProtocolError};
