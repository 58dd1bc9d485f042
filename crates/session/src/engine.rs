use std::time::Duration;

use delve_author::{EditContext, EditEngine, EditError, EditReport, Viewpoints};
use delve_common::{EditKind, PeerId, TileCoord};
use delve_kernel::{Terrain, TileEvent};
use delve_net::{
    ActionMessage, Broadcast, Inbound, Inbox, Message, PositionUpdate, PresenceTracker, RateLimiter,
};
use delve_persist::{MutationLedger, MutationStore, StoreError};
use delve_stream::{ChunkStore, StreamState};
use glam::Vec2;

use crate::config::{ConfigError, EngineConfig};
use crate::drops::{DropField, DroppedItem};
use crate::reconcile::RemoteReconciler;
use crate::viewpoint::{Viewpoint, frame_duration};

/// Errors from the engine session.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to load persisted edits: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Edit(#[from] EditError),
    #[error("session halted: member cap reached")]
    Halted,
}

/// Everything the render collaborator needs to mirror the session.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Tile(TileEvent),
    PeerJoined { id: PeerId, number: u32 },
    PeerLeft { id: PeerId },
    LocalNumber(u32),
    DropSpawned(DroppedItem),
    DropCollected { item: DroppedItem, inventory: u32 },
    ServerFull,
}

/// One game session: owns the world state and the frame loop that mutates it.
///
/// Every mutation of the chunk store happens inside `tick`, `edit`, `edit_at`
/// or `teleport`. Transport callbacks only ever touch the inbox.
pub struct WorldEngine {
    config: EngineConfig,
    terrain: Terrain,
    chunks: ChunkStore,
    ledger: MutationLedger,
    stream: StreamState,
    edits: EditEngine,
    store: Box<dyn MutationStore>,
    channel: Box<dyn Broadcast>,
    inbox: Inbox,
    presence: PresenceTracker,
    reconciler: RemoteReconciler,
    viewpoint: Viewpoint,
    drops: DropField,
    position_limiter: RateLimiter,
    clock: Duration,
    local_number: Option<u32>,
    halted: bool,
    events: Vec<EngineEvent>,
}

impl WorldEngine {
    /// Validate the configuration, seed the ledger from the store and load
    /// the spawn area.
    pub fn new(
        config: EngineConfig,
        store: Box<dyn MutationStore>,
        channel: Box<dyn Broadcast>,
        inbox: Inbox,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let terrain = Terrain::new(config.terrain.clone());
        let mut ledger = MutationLedger::new();
        let seeded = ledger.seed(store.load_mutations()?);

        let local = channel.local_id().clone();
        let spawn = terrain.center().to_world(terrain.tile_size());
        let _span = tracing::info_span!("engine_start", peer = %local).entered();

        let mut engine = Self {
            chunks: ChunkStore::new(terrain.tile_size()),
            stream: StreamState::new(config.stream.clone()),
            edits: EditEngine::new(config.edit.clone()),
            presence: PresenceTracker::new(local.clone(), config.net.member_cap),
            reconciler: RemoteReconciler::new(local.clone(), config.session.interpolation_rate),
            viewpoint: Viewpoint::new(spawn),
            drops: DropField::new(),
            position_limiter: RateLimiter::new(config.net.position_interval()),
            clock: Duration::ZERO,
            local_number: None,
            halted: false,
            events: Vec::new(),
            config,
            terrain,
            ledger,
            store,
            channel,
            inbox,
        };
        engine.stream_now();
        tracing::info!(
            seed = engine.terrain.seed(),
            ledger_entries = seeded,
            tiles = engine.chunks.tile_count(),
            "session started"
        );
        Ok(engine)
    }

    /// Advance one frame: apply inbound traffic, move, stream, interpolate
    /// peers, collect drops, and (rate-limited) broadcast our position.
    pub fn tick(&mut self, dt: f32, input: Vec2) {
        if self.halted {
            return;
        }
        let _span = tracing::info_span!("engine_tick").entered();
        self.clock += frame_duration(dt);

        self.drain_inbox();
        if self.halted {
            self.flush_tiles();
            return;
        }

        let session = &self.config.session;
        self.viewpoint.step(
            input,
            dt,
            session.move_speed,
            session.collision_half_extent,
            &self.chunks,
        );
        self.stream_now();
        self.reconciler.interpolate(dt);

        let radius = self.config.session.pickup_radius;
        for item in self.drops.collect(self.viewpoint.position(), radius) {
            self.events.push(EngineEvent::DropCollected {
                item,
                inventory: self.drops.inventory(),
            });
        }

        if self.position_limiter.ready(self.clock) {
            self.send_position();
        }
        self.flush_tiles();
    }

    /// Apply `kind` to the tile under the selector.
    pub fn edit(&mut self, kind: EditKind) -> Result<EditReport, EngineError> {
        let target = self.viewpoint.selector(self.terrain.tile_size());
        self.edit_at(kind, target)
    }

    /// Apply a local edit at `coord` and broadcast it immediately.
    pub fn edit_at(&mut self, kind: EditKind, coord: TileCoord) -> Result<EditReport, EngineError> {
        if self.halted {
            return Err(EngineError::Halted);
        }
        if kind == EditKind::Destroy {
            self.viewpoint
                .start_attack(self.config.session.attack_duration());
        }
        let peers = self.reconciler.positions();
        let ctx = EditContext {
            chunks: &mut self.chunks,
            ledger: &mut self.ledger,
            store: &mut *self.store,
        };
        let viewpoints = Viewpoints {
            local: self.viewpoint.position(),
            peers: &peers,
        };
        let result = self.edits.apply_local(kind, coord, ctx, viewpoints);

        for event in self.edits.drain_drops() {
            let item = self.drops.spawn(event);
            self.events.push(EngineEvent::DropSpawned(item));
        }
        let local = self.channel.local_id().clone();
        for record in self.edits.drain_outbound() {
            let message = Message::Action(ActionMessage {
                id: local.clone(),
                kind: record.kind,
                coord: record.coord,
            });
            if let Err(err) = self.channel.send(&message) {
                tracing::warn!(
                    coord = %record.coord,
                    kind = %record.kind,
                    error = %err,
                    "edit broadcast failed"
                );
            }
        }
        self.flush_tiles();
        result.map_err(EngineError::from)
    }

    /// Move the viewpoint instantly and restream around it.
    pub fn teleport(&mut self, position: Vec2) {
        self.viewpoint.teleport(position);
        self.stream.force();
        self.stream_now();
        self.flush_tiles();
    }

    /// Drain and return pending events.
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn terrain(&self) -> &Terrain {
        &self.terrain
    }

    pub fn chunks(&self) -> &ChunkStore {
        &self.chunks
    }

    pub fn ledger(&self) -> &MutationLedger {
        &self.ledger
    }

    pub fn stream(&self) -> &StreamState {
        &self.stream
    }

    pub fn viewpoint(&self) -> &Viewpoint {
        &self.viewpoint
    }

    pub fn reconciler(&self) -> &RemoteReconciler {
        &self.reconciler
    }

    pub fn drops(&self) -> &DropField {
        &self.drops
    }

    pub fn local_id(&self) -> &PeerId {
        self.channel.local_id()
    }

    /// 1-based player number from the last presence sync.
    pub fn local_number(&self) -> Option<u32> {
        self.local_number
    }

    /// Whether this member sorted beyond the member cap and stopped.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Session time accumulated from `tick`.
    pub fn clock(&self) -> Duration {
        self.clock
    }

    fn stream_now(&mut self) {
        let center = TileCoord::from_world(self.viewpoint.position(), self.terrain.tile_size());
        self.stream
            .update(center, &mut self.chunks, &self.terrain, &mut self.ledger);
    }

    fn drain_inbox(&mut self) {
        let batch = self.inbox.drain(self.config.net.inbox_capacity);
        for inbound in batch {
            match inbound {
                Inbound::Presence(members) => {
                    self.on_presence(&members);
                    if self.halted {
                        return;
                    }
                }
                Inbound::Message(Message::Move(update)) => {
                    self.reconciler.on_position(&update);
                }
                Inbound::Message(Message::Action(action)) => {
                    self.reconciler.on_action(
                        &action,
                        &mut self.edits,
                        &mut self.chunks,
                        &mut self.ledger,
                    );
                }
            }
        }
    }

    fn on_presence(&mut self, members: &[PeerId]) {
        let diff = self.presence.sync(members);
        if diff.server_full {
            tracing::info!(peer = %self.channel.local_id(), "server full, halting session");
            self.halted = true;
            self.events.push(EngineEvent::ServerFull);
            return;
        }
        if diff.local_number.is_some() && diff.local_number != self.local_number {
            self.local_number = diff.local_number;
            if let Some(number) = diff.local_number {
                self.events.push(EngineEvent::LocalNumber(number));
            }
        }
        for (id, number) in diff.joined {
            self.reconciler.join(id.clone(), number);
            self.events.push(EngineEvent::PeerJoined { id, number });
        }
        for id in diff.left {
            self.reconciler.leave(&id);
            self.events.push(EngineEvent::PeerLeft { id });
        }
    }

    fn send_position(&mut self) {
        let position = self.viewpoint.position();
        let facing = self.viewpoint.facing();
        let message = Message::Move(PositionUpdate {
            id: self.channel.local_id().clone(),
            x: position.x,
            z: position.y,
            dx: facing.x,
            dy: facing.y,
            moving: self.viewpoint.is_moving(),
            attacking: self.viewpoint.is_attacking(),
            facing_right: self.viewpoint.facing_right(),
        });
        if let Err(err) = self.channel.send(&message) {
            tracing::warn!(error = %err, "position broadcast failed");
        }
    }

    fn flush_tiles(&mut self) {
        self.events
            .extend(self.chunks.drain_events().into_iter().map(EngineEvent::Tile));
    }
}
