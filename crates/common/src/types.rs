use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A player-initiated mutation of a single tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditKind {
    Destroy,
    Build,
    Torch,
}

impl std::fmt::Display for EditKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Destroy => "destroy",
            Self::Build => "build",
            Self::Torch => "torch",
        };
        f.pad(name)
    }
}

/// Where an edit came from. Remote edits skip proximity guards and are never
/// re-broadcast or re-persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Origin {
    Local,
    Remote,
}

/// Presence key of a member in the shared world topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh random guest id, e.g. `guest_3f9a1c2be`.
    pub fn guest() -> Self {
        let raw = Uuid::new_v4().simple().to_string();
        Self(format!("guest_{}", &raw[..9]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
