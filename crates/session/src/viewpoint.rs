use std::time::Duration;

use delve_common::TileCoord;
use delve_stream::ChunkStore;
use glam::Vec2;

const INPUT_DEADZONE: f32 = 0.01;

/// Frame length as a `Duration`. Negative, NaN and out-of-range values count
/// as an empty frame.
pub(crate) fn frame_duration(dt: f32) -> Duration {
    Duration::try_from_secs_f32(dt).unwrap_or(Duration::ZERO)
}

/// The local player's position, facing and animation state.
#[derive(Debug, Clone)]
pub struct Viewpoint {
    position: Vec2,
    facing: Vec2,
    facing_right: bool,
    moving: bool,
    attack_remaining: Duration,
}

impl Viewpoint {
    pub fn new(position: Vec2) -> Self {
        Self {
            position,
            facing: Vec2::Y,
            facing_right: true,
            moving: false,
            attack_remaining: Duration::ZERO,
        }
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    /// Unit vector along the dominant axis of the last non-zero input.
    pub fn facing(&self) -> Vec2 {
        self.facing
    }

    pub fn facing_right(&self) -> bool {
        self.facing_right
    }

    pub fn is_moving(&self) -> bool {
        self.moving
    }

    pub fn is_attacking(&self) -> bool {
        !self.attack_remaining.is_zero()
    }

    /// The tile an edit targets: one tile ahead in the facing direction.
    pub fn selector(&self, tile_size: f32) -> TileCoord {
        TileCoord::from_world(self.position + self.facing * tile_size, tile_size)
    }

    pub fn teleport(&mut self, position: Vec2) {
        self.position = position;
    }

    pub fn start_attack(&mut self, duration: Duration) {
        self.attack_remaining = duration;
    }

    /// Move along `input` (x, z) for `dt` seconds. The move is taken only if
    /// every corner of the collision square around the destination is
    /// passable. Returns whether the position changed.
    pub fn step(
        &mut self,
        input: Vec2,
        dt: f32,
        speed: f32,
        half_extent: f32,
        chunks: &ChunkStore,
    ) -> bool {
        self.attack_remaining = self.attack_remaining.saturating_sub(frame_duration(dt));
        if !dt.is_finite() || dt < 0.0 {
            return false;
        }

        let input = input.clamp_length_max(1.0);
        self.moving = input.x.abs() > 0.0 || input.y.abs() > 0.0;
        if !self.moving {
            return false;
        }

        self.facing = if input.x.abs() > input.y.abs() {
            Vec2::new(input.x.signum(), 0.0)
        } else {
            Vec2::new(0.0, input.y.signum())
        };
        self.facing_right = if input.x < -INPUT_DEADZONE {
            false
        } else if input.x > INPUT_DEADZONE {
            true
        } else {
            self.facing.x >= 0.0
        };

        let next = self.position + input * speed * dt;
        let h = half_extent;
        let corners = [
            Vec2::new(next.x - h, next.y - h),
            Vec2::new(next.x + h, next.y - h),
            Vec2::new(next.x - h, next.y + h),
            Vec2::new(next.x + h, next.y + h),
        ];
        if corners.iter().all(|c| chunks.is_passable(*c)) {
            self.position = next;
            true
        } else {
            tracing::trace!(x = next.x, z = next.y, "move blocked");
            false
        }
    }
}
