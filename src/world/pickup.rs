//! Pickups
//!
//! Collectibles lying in the arena. Peers claim them by touch; the hub keeps
//! the merged table and relays it.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};

use crate::core::vec2::Vec2;

/// Health restored by a health pickup.
pub const HEALTH_PICKUP_HEAL: i32 = 25;

/// Pickup radius for claiming by touch.
pub const PICKUP_RADIUS: f32 = 16.0;

/// Pickup classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PickupKind {
    /// Restores health.
    Health,
    /// Cosmetic shield.
    Shield,
}

/// A collectible.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pickup {
    /// X position
    pub x: f32,
    /// Y position
    pub y: f32,
    /// Classification
    #[serde(rename = "type")]
    pub kind: PickupKind,
    /// Already collected
    pub complete: bool,
}

impl Pickup {
    /// Uncollected pickup at `position`.
    pub fn new(kind: PickupKind, position: Vec2) -> Self {
        Self { x: position.x, y: position.y, kind, complete: false }
    }

    /// Position as a vector.
    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    /// Whether `point` is close enough to collect this.
    pub fn touches(&self, point: Vec2) -> bool {
        !self.complete && self.position().distance_squared(point) <= PICKUP_RADIUS * PICKUP_RADIUS
    }
}

/// Pickups keyed by identifier.
pub type PickupTable = BTreeMap<String, Pickup>;

/// Merge claims into `table`. Returns how many entries changed.
///
/// A pickup that is already complete stays complete.
pub fn merge_claims(table: &mut PickupTable, claims: &PickupTable) -> usize {
    let mut changed = 0;
    for (id, claim) in claims {
        let mut merged = claim.clone();
        if let Some(existing) = table.get(id) {
            merged.complete |= existing.complete;
        }
        if table.get(id) != Some(&merged) {
            table.insert(id.clone(), merged);
            changed += 1;
        }
    }
    changed
}
