use std::collections::BTreeMap;

use delve_common::PeerId;

/// Result of diffing one presence sync against the previous one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceDiff {
    /// Newly admitted peers with their 1-based player number.
    pub joined: Vec<(PeerId, u32)>,
    pub left: Vec<PeerId>,
    /// Our own player number, if we appear in the member set.
    pub local_number: Option<u32>,
    /// We sort at or beyond the member cap and must not proceed.
    pub server_full: bool,
}

/// Derives join/leave events from full presence snapshots.
///
/// Members are ordered by id; only the first `cap` are admitted.
#[derive(Debug)]
pub struct PresenceTracker {
    local: PeerId,
    cap: usize,
    known: BTreeMap<PeerId, u32>,
}

impl PresenceTracker {
    pub fn new(local: PeerId, cap: usize) -> Self {
        Self {
            local,
            cap: cap.max(1),
            known: BTreeMap::new(),
        }
    }

    /// Admitted peers (excluding ourselves) with their player numbers.
    pub fn peers(&self) -> impl Iterator<Item = (&PeerId, u32)> {
        self.known.iter().map(|(id, n)| (id, *n))
    }

    pub fn sync(&mut self, members: &[PeerId]) -> PresenceDiff {
        let mut sorted = members.to_vec();
        sorted.sort();
        sorted.dedup();

        let own_index = sorted.iter().position(|id| *id == self.local);
        if own_index.is_some_and(|i| i >= self.cap) {
            tracing::info!(members = sorted.len(), cap = self.cap, "member cap reached");
            return PresenceDiff {
                server_full: true,
                ..PresenceDiff::default()
            };
        }

        let admitted: BTreeMap<PeerId, u32> = sorted
            .into_iter()
            .take(self.cap)
            .enumerate()
            .map(|(i, id)| (id, i as u32 + 1))
            .collect();

        let mut diff = PresenceDiff {
            local_number: own_index.map(|i| i as u32 + 1),
            ..PresenceDiff::default()
        };
        for (id, number) in &admitted {
            if *id != self.local && !self.known.contains_key(id) {
                self.known.insert(id.clone(), *number);
                diff.joined.push((id.clone(), *number));
            }
        }
        let departed: Vec<PeerId> = self
            .known
            .keys()
            .filter(|id| !admitted.contains_key(*id))
            .cloned()
            .collect();
        for id in departed {
            self.known.remove(&id);
            diff.left.push(id);
        }
        diff
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<PeerId> {
        names.iter().map(|n| PeerId::new(*n)).collect()
    }

    #[test]
    fn join_and_leave_are_derived() {
        let mut tracker = PresenceTracker::new(PeerId::new("a"), 2);
        let diff = tracker.sync(&ids(&["a"]));
        assert_eq!(diff.local_number, Some(1));
        assert!(diff.joined.is_empty());

        let diff = tracker.sync(&ids(&["b", "a"]));
        assert_eq!(diff.joined, vec![(PeerId::new("b"), 2)]);
        assert!(diff.left.is_empty());

        let diff = tracker.sync(&ids(&["b", "a"]));
        assert_eq!(diff, PresenceDiff {
            local_number: Some(1),
            ..PresenceDiff::default()
        });

        let diff = tracker.sync(&ids(&["a"]));
        assert_eq!(diff.left, vec![PeerId::new("b")]);
        assert_eq!(tracker.peers().count(), 0);
    }

    #[test]
    fn numbering_follows_sorted_ids() {
        let mut tracker = PresenceTracker::new(PeerId::new("m"), 2);
        let diff = tracker.sync(&ids(&["m", "c"]));
        assert_eq!(diff.local_number, Some(2));
        assert_eq!(diff.joined, vec![(PeerId::new("c"), 1)]);
    }

    #[test]
    fn member_beyond_cap_self_evicts() {
        let mut tracker = PresenceTracker::new(PeerId::new("z"), 2);
        let diff = tracker.sync(&ids(&["a", "b", "z"]));
        assert!(diff.server_full);
        assert!(diff.joined.is_empty());
    }

    #[test]
    fn peers_beyond_cap_are_not_admitted() {
        let mut tracker = PresenceTracker::new(PeerId::new("a"), 2);
        let diff = tracker.sync(&ids(&["a", "b", "c"]));
        assert!(!diff.server_full);
        assert_eq!(diff.joined, vec![(PeerId::new("b"), 2)]);
    }

    #[test]
    fn duplicates_are_ignored() {
        let mut tracker = PresenceTracker::new(PeerId::new("a"), 2);
        let diff = tracker.sync(&ids(&["a", "b", "b"]));
        assert_eq!(diff.joined.len(), 1);
    }
}
