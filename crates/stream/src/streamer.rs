use std::time::{Duration, Instant};

use delve_common::TileCoord;
use delve_kernel::Terrain;
use delve_persist::MutationLedger;
use serde::{Deserialize, Serialize};

use crate::chunk::ChunkStore;

/// Streaming configuration: load and evict radii (in tiles) plus the rescan throttle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Chebyshev radius around the viewer that is kept materialized.
    pub load_radius: i32,
    /// Tiles farther than this are dropped. Never smaller than `load_radius`.
    pub evict_radius: i32,
    /// Viewer must move this many tiles (Chebyshev) before the window is rescanned.
    pub rescan_delta: i32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            load_radius: 20,
            evict_radius: 24,
            rescan_delta: 2,
        }
    }
}

/// Result of one streaming pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamUpdate {
    pub loaded: Vec<TileCoord>,
    pub evicted: Vec<TileCoord>,
}

/// Statistics from the last streaming pass.
#[derive(Debug, Clone, Default)]
pub struct StreamStats {
    pub tiles_loaded: usize,
    pub tiles_evicted: usize,
    pub total_resident: usize,
    pub frame_time: Duration,
}

/// Decides when the load window around the viewer is rebuilt.
pub struct StreamState {
    pub config: StreamConfig,
    last_center: Option<TileCoord>,
    stats: StreamStats,
}

impl StreamState {
    pub fn new(config: StreamConfig) -> Self {
        Self {
            config,
            last_center: None,
            stats: StreamStats::default(),
        }
    }

    /// Whether a viewer at `viewer` has moved far enough to trigger a rescan.
    pub fn needs_update(&self, viewer: TileCoord) -> bool {
        match self.last_center {
            None => true,
            Some(last) => last.chebyshev(viewer) >= self.config.rescan_delta,
        }
    }

    /// Forget the last scan center so the next `update` always runs.
    pub fn force(&mut self) {
        self.last_center = None;
    }

    pub fn last_center(&self) -> Option<TileCoord> {
        self.last_center
    }

    /// Evict then load around `viewer` if it moved at least `rescan_delta`.
    pub fn update(
        &mut self,
        viewer: TileCoord,
        chunks: &mut ChunkStore,
        terrain: &Terrain,
        ledger: &mut MutationLedger,
    ) -> Option<StreamUpdate> {
        if !self.needs_update(viewer) {
            return None;
        }
        let _span = tracing::info_span!("stream_update", %viewer).entered();
        let frame_start = Instant::now();

        let evicted = chunks.evict_beyond(viewer, self.config.evict_radius);
        let loaded = chunks.load_around(viewer, self.config.load_radius, terrain, ledger);
        self.last_center = Some(viewer);

        self.stats = StreamStats {
            tiles_loaded: loaded.len(),
            tiles_evicted: evicted.len(),
            total_resident: chunks.tile_count() + chunks.hole_count(),
            frame_time: frame_start.elapsed(),
        };

        tracing::trace!(
            loaded = loaded.len(),
            evicted = evicted.len(),
            total = self.stats.total_resident,
            "stream update complete"
        );

        Some(StreamUpdate { loaded, evicted })
    }

    /// Get statistics from the last update.
    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }
}
