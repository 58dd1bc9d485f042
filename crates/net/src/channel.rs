use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded};
use delve_common::PeerId;
use serde::{Deserialize, Serialize};

use crate::protocol::{Message, ProtocolError};

/// Channel tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    /// Members beyond this many (by sorted id) must not proceed.
    pub member_cap: usize,
    /// Minimum time between outbound position updates.
    pub position_interval_ms: u64,
    /// Inbound messages buffered between frames.
    pub inbox_capacity: usize,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            member_cap: 2,
            position_interval_ms: 200,
            inbox_capacity: 1024,
        }
    }
}

impl NetConfig {
    pub fn position_interval(&self) -> Duration {
        Duration::from_millis(self.position_interval_ms)
    }
}

/// Errors from the broadcast channel. Callers treat all of them as
/// best-effort failures.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("channel is disconnected")]
    Disconnected,
    #[error("inbound queue is full")]
    InboxFull,
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// The presence/broadcast collaborator, as seen by one member.
pub trait Broadcast {
    /// Our own member id; echoed in every message we send.
    fn local_id(&self) -> &PeerId;

    /// Publish to every member of the topic, ourselves included.
    fn send(&mut self, message: &Message) -> Result<(), ChannelError>;

    fn is_connected(&self) -> bool;
}

/// Something the transport delivered, waiting for the frame loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Full current member set.
    Presence(Vec<PeerId>),
    Message(Message),
}

/// Create a bounded inbound queue.
pub fn inbox(capacity: usize) -> (InboxSender, Inbox) {
    let (tx, rx) = bounded(capacity.max(1));
    (InboxSender { tx }, Inbox { rx })
}

/// Transport-side handle. Safe to call from any thread or callback.
#[derive(Debug, Clone)]
pub struct InboxSender {
    tx: Sender<Inbound>,
}

impl InboxSender {
    pub fn push(&self, inbound: Inbound) -> Result<(), ChannelError> {
        match self.tx.try_send(inbound) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                tracing::warn!("inbound queue full, dropping message");
                Err(ChannelError::InboxFull)
            }
            Err(TrySendError::Disconnected(_)) => Err(ChannelError::Disconnected),
        }
    }

    /// Decode a raw broadcast payload and queue it.
    pub fn push_payload(&self, payload: &str) -> Result<(), ChannelError> {
        let message = Message::decode(payload).inspect_err(|err| {
            tracing::warn!(error = %err, "discarding malformed payload");
        })?;
        self.push(Inbound::Message(message))
    }
}

/// Frame-loop side of the inbound queue.
#[derive(Debug)]
pub struct Inbox {
    rx: Receiver<Inbound>,
}

impl Inbox {
    /// Take up to `max` queued items, oldest first, without blocking.
    pub fn drain(&self, max: usize) -> Vec<Inbound> {
        let mut out = Vec::new();
        while out.len() < max {
            match self.rx.try_recv() {
                Ok(inbound) => out.push(inbound),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Minimum-interval gate on the session clock.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    interval: Duration,
    last: Option<Duration>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Whether a send is allowed at `now`; if so, the send is recorded.
    pub fn ready(&mut self, now: Duration) -> bool {
        let allowed = self
            .last
            .is_none_or(|last| now.saturating_sub(last) >= self.interval);
        if allowed {
            self.last = Some(now);
        }
        allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ActionMessage;
    use delve_common::{EditKind, TileCoord};

    fn action(n: i32) -> Inbound {
        Inbound::Message(Message::Action(ActionMessage {
            id: PeerId::new("p"),
            kind: EditKind::Build,
            coord: TileCoord::new(n, 0),
        }))
    }

    #[test]
    fn inbox_is_fifo_and_bounded_per_drain() {
        let (tx, rx) = inbox(8);
        for n in 0..5 {
            tx.push(action(n)).unwrap();
        }
        let first = rx.drain(3);
        assert_eq!(first, vec![action(0), action(1), action(2)]);
        assert_eq!(rx.len(), 2);
        assert_eq!(rx.drain(100), vec![action(3), action(4)]);
        assert!(rx.is_empty());
    }

    #[test]
    fn full_inbox_rejects() {
        let (tx, _rx) = inbox(1);
        tx.push(action(0)).unwrap();
        assert!(matches!(tx.push(action(1)), Err(ChannelError::InboxFull)));
    }

    #[test]
    fn dropped_inbox_disconnects() {
        let (tx, rx) = inbox(4);
        drop(rx);
        assert!(matches!(tx.push(action(0)), Err(ChannelError::Disconnected)));
    }

    #[test]
    fn push_payload_decodes() {
        let (tx, rx) = inbox(4);
        tx.push_payload(r#"{"event":"action","id":"p","kind":"build","coord":{"gx":0,"gz":0}}"#)
            .unwrap();
        assert!(matches!(tx.push_payload("garbage"), Err(ChannelError::Protocol(_))));
        assert_eq!(rx.drain(10), vec![action(0)]);
    }

    #[test]
    fn rate_limiter_enforces_interval() {
        let mut limiter = RateLimiter::new(Duration::from_millis(200));
        assert!(limiter.ready(Duration::ZERO));
        assert!(!limiter.ready(Duration::from_millis(150)));
        assert!(limiter.ready(Duration::from_millis(200)));
        assert!(!limiter.ready(Duration::from_millis(399)));
        assert!(limiter.ready(Duration::from_millis(1000)));
    }
}
