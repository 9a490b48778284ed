//! Core primitives.
//!
//! Continuous 2D math, the seeded RNG shared by hub and peer, and the
//! wall-clock helpers used for clock-offset correction.

pub mod vec2;
pub mod rng;
pub mod clock;

// Re-export core types
pub use vec2::{Bounds, Vec2};
pub use rng::DeterministicRng;
pub use clock::{now_secs, ClockService};
