use std::collections::BTreeMap;
use std::sync::Arc;

use delve_common::PeerId;
use parking_lot::Mutex;

use crate::channel::{Broadcast, ChannelError, Inbound, Inbox, InboxSender, inbox};
use crate::protocol::Message;

struct Member {
    sender: InboxSender,
    connected: bool,
}

#[derive(Default)]
struct HubState {
    members: BTreeMap<PeerId, Member>,
}

impl HubState {
    fn present(&self) -> Vec<PeerId> {
        self.members
            .iter()
            .filter(|(_, m)| m.connected)
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn sync_presence(&self) {
        let present = self.present();
        for (id, member) in self.members.iter().filter(|(_, m)| m.connected) {
            if let Err(err) = member.sender.push(Inbound::Presence(present.clone())) {
                tracing::warn!(peer = %id, error = %err, "presence sync not delivered");
            }
        }
    }
}

/// In-process world topic. Payloads travel as JSON, exactly as over a real
/// transport, and every broadcast is echoed to its sender.
#[derive(Clone, Default)]
pub struct LoopbackHub {
    state: Arc<Mutex<HubState>>,
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a member. Returns its broadcast handle and inbound queue;
    /// every connected member receives a presence sync.
    pub fn join(&self, id: PeerId, capacity: usize) -> (LoopbackLink, Inbox) {
        let (sender, rx) = inbox(capacity);
        let mut state = self.state.lock();
        state.members.insert(
            id.clone(),
            Member {
                sender,
                connected: true,
            },
        );
        state.sync_presence();
        tracing::info!(peer = %id, members = state.members.len(), "joined loopback topic");
        drop(state);
        (
            LoopbackLink {
                hub: self.clone(),
                id,
            },
            rx,
        )
    }

    pub fn leave(&self, id: &PeerId) {
        let mut state = self.state.lock();
        if state.members.remove(id).is_some() {
            tracing::info!(peer = %id, "left loopback topic");
            state.sync_presence();
        }
    }

    /// Simulate a dropped or restored connection. A disconnected member is
    /// absent from presence, receives nothing and cannot send.
    pub fn set_connected(&self, id: &PeerId, connected: bool) {
        let mut state = self.state.lock();
        let Some(member) = state.members.get_mut(id) else {
            return;
        };
        if member.connected != connected {
            member.connected = connected;
            tracing::info!(peer = %id, connected, "loopback connection changed");
            state.sync_presence();
        }
    }

    pub fn members(&self) -> Vec<PeerId> {
        self.state.lock().present()
    }

    fn publish(&self, from: &PeerId, message: &Message) -> Result<(), ChannelError> {
        let payload = message.encode()?;
        let state = self.state.lock();
        match state.members.get(from) {
            Some(member) if member.connected => {}
            _ => return Err(ChannelError::Disconnected),
        }
        for (id, member) in state.members.iter().filter(|(_, m)| m.connected) {
            if let Err(err) = member.sender.push_payload(&payload) {
                tracing::warn!(peer = %id, error = %err, "broadcast not delivered");
            }
        }
        Ok(())
    }

    fn is_connected(&self, id: &PeerId) -> bool {
        self.state
            .lock()
            .members
            .get(id)
            .is_some_and(|m| m.connected)
    }
}

/// One member's handle onto a [`LoopbackHub`]. Leaves the topic on drop.
pub struct LoopbackLink {
    hub: LoopbackHub,
    id: PeerId,
}

impl Broadcast for LoopbackLink {
    fn local_id(&self) -> &PeerId {
        &self.id
    }

    fn send(&mut self, message: &Message) -> Result<(), ChannelError> {
        self.hub.publish(&self.id, message)
    }

    fn is_connected(&self) -> bool {
        self.hub.is_connected(&self.id)
    }
}

impl Drop for LoopbackLink {
    fn drop(&mut self) {
        self.hub.leave(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ActionMessage;
    use delve_common::{EditKind, TileCoord};

    fn action(from: &str) -> Message {
        Message::Action(ActionMessage {
            id: PeerId::new(from),
            kind: EditKind::Destroy,
            coord: TileCoord::new(1, 2),
        })
    }

    fn messages(inbox: &Inbox) -> Vec<Message> {
        inbox
            .drain(usize::MAX)
            .into_iter()
            .filter_map(|i| match i {
                Inbound::Message(m) => Some(m),
                Inbound::Presence(_) => None,
            })
            .collect()
    }

    #[test]
    fn join_syncs_presence_to_everyone() {
        let hub = LoopbackHub::new();
        let (_a, inbox_a) = hub.join(PeerId::new("a"), 16);
        let (_b, inbox_b) = hub.join(PeerId::new("b"), 16);
        let both = vec![PeerId::new("a"), PeerId::new("b")];
        assert_eq!(inbox_a.drain(16).last(), Some(&Inbound::Presence(both.clone())));
        assert_eq!(inbox_b.drain(16), vec![Inbound::Presence(both)]);
    }

    #[test]
    fn broadcast_echoes_to_sender() {
        let hub = LoopbackHub::new();
        let (mut a, inbox_a) = hub.join(PeerId::new("a"), 16);
        let (_b, inbox_b) = hub.join(PeerId::new("b"), 16);
        a.send(&action("a")).unwrap();
        assert_eq!(messages(&inbox_a), vec![action("a")]);
        assert_eq!(messages(&inbox_b), vec![action("a")]);
    }

    #[test]
    fn disconnected_member_cannot_send_or_receive() {
        let hub = LoopbackHub::new();
        let (mut a, inbox_a) = hub.join(PeerId::new("a"), 16);
        let (mut b, _inbox_b) = hub.join(PeerId::new("b"), 16);
        hub.set_connected(&PeerId::new("a"), false);
        assert!(!a.is_connected());
        assert!(matches!(a.send(&action("a")), Err(ChannelError::Disconnected)));
        inbox_a.drain(usize::MAX);
        b.send(&action("b")).unwrap();
        assert!(messages(&inbox_a).is_empty());
        assert_eq!(hub.members(), vec![PeerId::new("b")]);

        hub.set_connected(&PeerId::new("a"), true);
        assert_eq!(hub.members().len(), 2);
    }

    #[test]
    fn dropping_link_leaves_topic() {
        let hub = LoopbackHub::new();
        let (a, _inbox_a) = hub.join(PeerId::new("a"), 16);
        let (_b, inbox_b) = hub.join(PeerId::new("b"), 16);
        inbox_b.drain(usize::MAX);
        drop(a);
        assert_eq!(inbox_b.drain(16), vec![Inbound::Presence(vec![PeerId::new("b")])]);
    }
}
