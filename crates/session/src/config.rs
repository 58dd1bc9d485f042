use std::path::Path;
use std::time::Duration;

use delve_author::EditConfig;
use delve_kernel::TerrainConfig;
use delve_net::NetConfig;
use delve_stream::StreamConfig;
use serde::{Deserialize, Serialize};

/// Errors loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported config format: {0}")]
    UnsupportedFormat(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Local viewpoint and presentation tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Exponential smoothing rate toward peer targets, per second.
    pub interpolation_rate: f32,
    /// World units per second at full input.
    pub move_speed: f32,
    /// Half-width of the square collision footprint.
    pub collision_half_extent: f32,
    pub pickup_radius: f32,
    pub attack_duration_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            interpolation_rate: 10.0,
            move_speed: 1.8,
            collision_half_extent: 0.2,
            pickup_radius: 0.5,
            attack_duration_ms: 480,
        }
    }
}

impl SessionConfig {
    pub fn attack_duration(&self) -> Duration {
        Duration::from_millis(self.attack_duration_ms)
    }
}

/// Everything a [`WorldEngine`](crate::WorldEngine) session is built from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub terrain: TerrainConfig,
    pub stream: StreamConfig,
    pub edit: EditConfig,
    pub net: NetConfig,
    pub session: SessionConfig,
}

impl EngineConfig {
    /// Load from a `.yaml`/`.yml` or `.json` file and validate.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let config: Self = match ext.as_str() {
            "yaml" | "yml" => serde_yaml::from_str(&text)?,
            "json" => serde_json::from_str(&text)?,
            other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));
        let t = &self.terrain;
        let s = &self.stream;
        if t.tile_size.is_nan() || t.tile_size <= 0.0 {
            return invalid("terrain.tile_size must be positive");
        }
        if t.grass_radius <= t.stone_radius {
            return invalid("terrain.grass_radius must exceed terrain.stone_radius");
        }
        if s.load_radius < 0 {
            return invalid("stream.load_radius must not be negative");
        }
        if s.evict_radius < s.load_radius {
            return invalid("stream.evict_radius must be at least stream.load_radius");
        }
        if s.rescan_delta < 1 || s.rescan_delta > s.load_radius.max(1) {
            return invalid("stream.rescan_delta must be between 1 and stream.load_radius");
        }
        if self.net.member_cap < 1 {
            return invalid("net.member_cap must be at least 1");
        }
        if self.edit.guard_distance < 0.0 {
            return invalid("edit.guard_distance must not be negative");
        }
        Ok(())
    }
}
