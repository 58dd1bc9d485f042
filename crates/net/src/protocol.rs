use delve_common::{EditKind, PeerId, TileCoord};
use serde::{Deserialize, Serialize};

/// Errors decoding a broadcast payload.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Position and animation state of one member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub id: PeerId,
    pub x: f32,
    pub z: f32,
    /// Facing direction.
    pub dx: f32,
    pub dy: f32,
    #[serde(default)]
    pub moving: bool,
    #[serde(default)]
    pub attacking: bool,
    #[serde(default = "default_facing_right")]
    pub facing_right: bool,
}

fn default_facing_right() -> bool {
    true
}

/// One edit, as broadcast by the member that made it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionMessage {
    pub id: PeerId,
    pub kind: EditKind,
    pub coord: TileCoord,
}

/// A broadcast on the world topic, tagged by event name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Message {
    Move(PositionUpdate),
    Action(ActionMessage),
}

impl Message {
    /// The member that sent this message.
    pub fn sender(&self) -> &PeerId {
        match self {
            Self::Move(update) => &update.id,
            Self::Action(action) => &action.id,
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(payload: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(payload)?)
    }
}
