//! World Model
//!
//! Shared by the hub and the peer.
//!
//! ## Module Structure
//!
//! - `entity`: Avatars, hostiles, partial patches
//! - `effect`: Projectiles and particles with clock catch-up
//! - `pickup`: Collectibles and claim merging
//! - `store`: Hub-side entity store and ownership invariant
//! - `score`: Best/running scores and the scoreboard
//! - `spawn`: Dead-hostile reuse and adaptive difficulty

pub mod entity;
pub mod effect;
pub mod pickup;
pub mod store;
pub mod score;
pub mod spawn;

// Re-export key types
pub use entity::{Entity, EntityId, EntityKind, EntityPatch, OFFSTAGE};
pub use effect::{Effect, EffectKind};
pub use pickup::{Pickup, PickupKind, PickupTable};
pub use store::{EntityStore, MergeOutcome};
pub use score::{Scoreboard, ScoreEntry, ScoreOutcome};
pub use spawn::{spawn_batch, SpawnRates};
