use delve_author::DropEvent;
use delve_common::TileCoord;
use glam::Vec2;

/// A collectible lying in the world.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DroppedItem {
    pub id: u64,
    pub coord: TileCoord,
    pub position: Vec2,
}

/// Uncollected drops plus the running inventory tally.
#[derive(Debug, Default)]
pub struct DropField {
    items: Vec<DroppedItem>,
    next_id: u64,
    collected: u32,
}

impl DropField {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self, event: DropEvent) -> DroppedItem {
        let item = DroppedItem {
            id: self.next_id,
            coord: event.coord,
            position: event.position,
        };
        self.next_id += 1;
        self.items.push(item);
        item
    }

    /// Remove and return every drop strictly within `radius` of `position`.
    pub fn collect(&mut self, position: Vec2, radius: f32) -> Vec<DroppedItem> {
        let (taken, kept): (Vec<_>, Vec<_>) = self
            .items
            .drain(..)
            .partition(|item| item.position.distance(position) < radius);
        self.items = kept;
        self.collected += taken.len() as u32;
        taken
    }

    pub fn items(&self) -> &[DroppedItem] {
        &self.items
    }

    /// Total drops picked up this session.
    pub fn inventory(&self) -> u32 {
        self.collected
    }
}
