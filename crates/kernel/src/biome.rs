use delve_common::TileCoord;
use serde::{Deserialize, Serialize};

/// Broad terrain category, a pure function of distance to the world centre.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Biome {
    Stone,
    Grass,
    Sand,
}

/// Distance-threshold classifier. Comparisons are done on squared integer
/// distances so classification never drifts across platforms.
#[derive(Debug, Clone, Copy)]
pub struct BiomeClassifier {
    center: TileCoord,
    stone_radius_sq: i64,
    grass_radius_sq: i64,
}

impl BiomeClassifier {
    pub fn new(center: TileCoord, stone_radius: i32, grass_radius: i32) -> Self {
        let stone = stone_radius as i64;
        let grass = grass_radius as i64;
        Self {
            center,
            stone_radius_sq: stone * stone,
            grass_radius_sq: grass * grass,
        }
    }

    pub fn classify(&self, coord: TileCoord) -> Biome {
        let d = coord.distance_squared(self.center);
        if d < self.stone_radius_sq {
            Biome::Stone
        } else if d < self.grass_radius_sq {
            Biome::Grass
        } else {
            Biome::Sand
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> BiomeClassifier {
        BiomeClassifier::new(TileCoord::new(100, 100), 10, 30)
    }

    #[test]
    fn rings_by_distance() {
        let c = classifier();
        assert_eq!(c.classify(TileCoord::new(100, 100)), Biome::Stone);
        assert_eq!(c.classify(TileCoord::new(109, 100)), Biome::Stone);
        assert_eq!(c.classify(TileCoord::new(110, 100)), Biome::Grass);
        assert_eq!(c.classify(TileCoord::new(100, 129)), Biome::Grass);
        assert_eq!(c.classify(TileCoord::new(100, 130)), Biome::Sand);
        assert_eq!(c.classify(TileCoord::new(-5000, 9000)), Biome::Sand);
    }

    #[test]
    fn euclidean_not_chebyshev() {
        let c = classifier();
        // (8, 8) offset is within Chebyshev 10 but ~11.3 tiles away.
        assert_eq!(c.classify(TileCoord::new(108, 108)), Biome::Grass);
    }
}
