use delve_common::TileCoord;
use serde::{Deserialize, Serialize};

use crate::biome::{Biome, BiomeClassifier};
use crate::noise::{Octave, layer_seed, lattice, layered, noise_value};
use crate::tile::TileKind;

/// Fixed world parameters. Must be identical on every peer sharing a world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    pub seed: u64,
    /// Side length of one tile in world units.
    pub tile_size: f32,
    /// World side length in tiles; the centre is at `world_size / 2`.
    pub world_size: i32,
    /// Thickness of the forced wall at the world boundary, in tiles.
    pub edge_thickness: i32,
    /// Radius of the cleared spawn disk around the centre, in tiles.
    pub spawn_radius: i32,
    pub stone_radius: i32,
    pub grass_radius: i32,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            seed: 12345,
            tile_size: 0.7,
            world_size: 5000,
            edge_thickness: 2,
            spawn_radius: 15,
            stone_radius: 400,
            grass_radius: 1400,
        }
    }
}

// Layer salts. Changing any of these changes every world.
const STONE_COARSE: u64 = 0x51;
const STONE_FINE: u64 = 0x52;
const GRASS_FOREST: u64 = 0x61;
const SAND_POOLS: u64 = 0x71;
const SAND_SPIKES: u64 = 0x72;

const STONE_OCTAVES: [Octave; 2] = [
    Octave {
        frequency: 1.0 / 9.0,
        weight: 2.0,
        layer: STONE_COARSE,
    },
    Octave {
        frequency: 1.0 / 4.5,
        weight: 1.0,
        layer: STONE_FINE,
    },
];
const STONE_THRESHOLD: f64 = 0.55;
const GRASS_FREQUENCY: f64 = 1.0 / 6.0;
const GRASS_THRESHOLD: f64 = 0.7;
const SAND_POOL_FREQUENCY: f64 = 1.0 / 24.0;
const SAND_POOL_THRESHOLD: f64 = 0.3;
const SAND_SPIKE_THRESHOLD: f64 = 0.97;

/// The tile synthesizer: a stateless, re-derivable map from coordinate to
/// [`TileKind`].
#[derive(Debug, Clone)]
pub struct Terrain {
    config: TerrainConfig,
    center: TileCoord,
    biomes: BiomeClassifier,
    spawn_radius_sq: i64,
}

impl Terrain {
    pub fn new(config: TerrainConfig) -> Self {
        let half = config.world_size / 2;
        let center = TileCoord::new(half, half);
        let biomes = BiomeClassifier::new(center, config.stone_radius, config.grass_radius);
        let r = config.spawn_radius as i64;
        tracing::debug!(
            seed = config.seed,
            world_size = config.world_size,
            %center,
            "terrain configured"
        );
        Self {
            config,
            center,
            biomes,
            spawn_radius_sq: r * r,
        }
    }

    pub fn config(&self) -> &TerrainConfig {
        &self.config
    }

    pub fn seed(&self) -> u64 {
        self.config.seed
    }

    pub fn tile_size(&self) -> f32 {
        self.config.tile_size
    }

    /// World centre tile, where players spawn.
    pub fn center(&self) -> TileCoord {
        self.center
    }

    pub fn biome(&self, coord: TileCoord) -> Biome {
        self.biomes.classify(coord)
    }

    /// True for coordinates inside the boundary wall or outside the world.
    pub fn is_boundary(&self, coord: TileCoord) -> bool {
        let lo = self.config.edge_thickness;
        let hi = self.config.world_size - 1 - self.config.edge_thickness;
        coord.gx < lo || coord.gz < lo || coord.gx > hi || coord.gz > hi
    }

    pub fn in_spawn_disk(&self, coord: TileCoord) -> bool {
        coord.distance_squared(self.center) <= self.spawn_radius_sq
    }

    /// Base kind of a tile. Pure in (seed, coordinate).
    pub fn synthesize(&self, coord: TileCoord) -> TileKind {
        if self.is_boundary(coord) {
            return TileKind::Obstacle;
        }
        if self.in_spawn_disk(coord) {
            return TileKind::Floor;
        }
        let seed = self.config.seed;
        let x = coord.gx as f64;
        let z = coord.gz as f64;
        match self.biome(coord) {
            Biome::Stone => {
                if layered(seed, x, z, &STONE_OCTAVES) > STONE_THRESHOLD {
                    TileKind::Obstacle
                } else {
                    TileKind::Floor
                }
            }
            Biome::Grass => {
                let s = layer_seed(seed, GRASS_FOREST);
                if noise_value(s, x * GRASS_FREQUENCY, z * GRASS_FREQUENCY) > GRASS_THRESHOLD {
                    TileKind::Obstacle
                } else {
                    TileKind::Floor
                }
            }
            Biome::Sand => {
                let pools = layer_seed(seed, SAND_POOLS);
                let spikes = layer_seed(seed, SAND_SPIKES);
                if noise_value(pools, x * SAND_POOL_FREQUENCY, z * SAND_POOL_FREQUENCY)
                    < SAND_POOL_THRESHOLD
                {
                    TileKind::Liquid
                } else if lattice(spikes, coord.gx as i64, coord.gz as i64) > SAND_SPIKE_THRESHOLD
                {
                    TileKind::Obstacle
                } else {
                    TileKind::Floor
                }
            }
        }
    }
}

impl Default for Terrain {
    fn default() -> Self {
        Self::new(TerrainConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesis_is_deterministic() {
        let a = Terrain::default();
        let b = Terrain::new(TerrainConfig::default());
        let center = a.center();
        for c in center.square(60) {
            assert_eq!(a.synthesize(c), b.synthesize(c));
            assert_eq!(a.synthesize(c), a.synthesize(c));
        }
    }

    #[test]
    fn boundary_is_always_obstacle() {
        let t = Terrain::default();
        let size = t.config().world_size;
        for i in (-50..size + 50).step_by(7) {
            for edge in [-10_000, -1, 0, 1, size - 2, size - 1, size, size + 10_000] {
                assert_eq!(t.synthesize(TileCoord::new(edge, i)), TileKind::Obstacle);
                assert_eq!(t.synthesize(TileCoord::new(i, edge)), TileKind::Obstacle);
            }
        }
    }

    #[test]
    fn spawn_disk_is_clear_stone_floor() {
        let t = Terrain::default();
        let center = t.center();
        assert_eq!(center, TileCoord::new(2500, 2500));
        assert_eq!(t.synthesize(center), TileKind::Floor);
        assert_eq!(t.biome(center), Biome::Stone);
        for c in center.square(15).filter(|c| t.in_spawn_disk(*c)) {
            assert_eq!(t.synthesize(c), TileKind::Floor, "{c} inside spawn disk");
        }
    }

    #[test]
    fn stone_ring_has_caves() {
        let t = Terrain::default();
        let ring: Vec<_> = t
            .center()
            .square(60)
            .filter(|c| !t.in_spawn_disk(*c))
            .map(|c| t.synthesize(c))
            .collect();
        let walls = ring.iter().filter(|k| **k == TileKind::Obstacle).count();
        assert!(walls > 0 && walls < ring.len(), "{walls} walls of {}", ring.len());
        assert!(!ring.contains(&TileKind::Liquid));
    }

    #[test]
    fn sand_has_pools() {
        let t = Terrain::default();
        let far = TileCoord::new(2500, 2500 + 2000);
        assert_eq!(t.biome(far), Biome::Sand);
        let liquid = far
            .square(60)
            .filter(|c| t.synthesize(*c) == TileKind::Liquid)
            .count();
        assert!(liquid > 0);
    }

    #[test]
    fn different_seeds_produce_different_caves() {
        let a = Terrain::default();
        let b = Terrain::new(TerrainConfig {
            seed: 54321,
            ..TerrainConfig::default()
        });
        let differs = a
            .center()
            .square(60)
            .any(|c| a.synthesize(c) != b.synthesize(c));
        assert!(differs);
    }
}
