//! # Horde Sync
//!
//! Authoritative entity synchronization for Horde: a hub that reconciles
//! peer-reported state, and the peer runtime that drives its share of the
//! world.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         HORDE SYNC                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Primitives                                │
//! │  ├── vec2.rs     - 2D vector and arena bounds                │
//! │  ├── rng.rs      - Seeded Xorshift PRNG                      │
//! │  └── clock.rs    - Wall clock and offset measurement         │
//! │                                                              │
//! │  world/          - Shared world model                        │
//! │  ├── entity.rs   - Avatars, hostiles, partial patches        │
//! │  ├── effect.rs   - Projectiles with clock catch-up           │
//! │  ├── pickup.rs   - Collectibles                              │
//! │  ├── store.rs    - Entity store and ownership invariant      │
//! │  ├── score.rs    - Scoreboard                                │
//! │  └── spawn.rs    - Spawn batches and difficulty              │
//! │                                                              │
//! │  hub/            - Authoritative side                        │
//! │  ├── config.rs   - Configuration                             │
//! │  ├── connection.rs - Per-peer records                        │
//! │  ├── reconcile.rs  - Connection state machine and fan-out    │
//! │  └── idle.rs     - Simulation of undriven hostiles           │
//! │                                                              │
//! │  peer/           - Peer side                                 │
//! │  ├── view.rs     - Local merged view                         │
//! │  ├── sim.rs      - Drive-set simulation                      │
//! │  ├── collaborators.rs - Render and input seams               │
//! │  └── profile.rs  - Persisted identity                        │
//! │                                                              │
//! │  network/        - Transport                                 │
//! │  ├── protocol.rs - Wire messages                             │
//! │  ├── server.rs   - Hub WebSocket server                      │
//! │  └── client.rs   - Peer WebSocket client                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Authority
//!
//! Each peer is authoritative for its avatar and for the hostiles the hub
//! assigned to it (its drive set). The hub is authoritative for ownership,
//! spawning, difficulty and scores. All hub state is mutated by a single
//! task, so peer messages and idle ticks are applied one at a time.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod world;
pub mod hub;
pub mod peer;
pub mod network;

// Re-export commonly used types
pub use crate::core::vec2::{Bounds, Vec2};
pub use crate::core::rng::DeterministicRng;
pub use world::entity::{Entity, EntityId, EntityKind, EntityPatch};
pub use world::store::EntityStore;
pub use hub::{Hub, HubConfig};
pub use peer::PeerView;
pub use network::{HubServer, PeerClient};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Arena width in world units
pub const ARENA_WIDTH: f32 = 1280.0;

/// Arena height in world units
pub const ARENA_HEIGHT: f32 = 720.0;

/// Peer frame rate (Hz)
pub const FRAME_RATE: u32 = 60;
