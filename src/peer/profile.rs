//! Peer Profile
//!
//! The identity a peer presents to the hub. Persisted as JSON so a restart
//! reconnects under the same identifier.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::world::entity::EntityId;

/// Profile load/save errors.
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    /// File could not be read or written.
    #[error("Profile I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File is not a valid profile.
    #[error("Invalid profile: {0}")]
    Json(#[from] serde_json::Error),
}

/// A persisted peer identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerProfile {
    /// Stable identifier, also the avatar's entity id
    pub identifier: EntityId,
    /// Name shown on the scoreboard
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl PeerProfile {
    /// Fresh profile with a random identifier.
    pub fn generate(display_name: Option<String>) -> Self {
        Self { identifier: EntityId::random(), display_name }
    }

    /// Load the profile at `path`, creating and saving one if it is missing.
    pub fn load_or_create(path: &Path, display_name: Option<String>) -> Result<Self, ProfileError> {
        if path.exists() {
            let mut profile: Self = serde_json::from_str(&std::fs::read_to_string(path)?)?;
            if display_name.is_some() {
                profile.display_name = display_name;
            }
            return Ok(profile);
        }

        let profile = Self::generate(display_name);
        profile.save(path)?;
        info!("Created profile {} at {}", profile.identifier, path.display());
        Ok(profile)
    }

    /// Write the profile to `path`.
    pub fn save(&self, path: &Path) -> Result<(), ProfileError> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
