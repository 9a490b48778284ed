//! Transient Effects
//!
//! Projectiles and particles. Immutable after creation apart from elapsed
//! time; position is always derived from the origin and elapsed time.

use serde::{Serialize, Deserialize};

use crate::core::clock::catch_up_elapsed;
use crate::core::vec2::Vec2;
use crate::world::entity::EntityId;

/// Coarse effect classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectKind {
    /// Damages the first hostile it touches.
    Projectile,
    /// Purely visual.
    Particle,
}

/// A short-lived moving effect.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Effect {
    /// Spawn point
    pub origin: Vec2,
    /// Unit travel direction
    pub direction: Vec2,
    /// Units per second
    pub speed: f32,
    /// Creation time in the creator's clock (seconds)
    pub start_time: f64,
    /// Seconds until expiry
    pub lifetime: f64,
    /// Classification
    pub kind: EffectKind,
    /// Creator's clock offset as measured by the hub
    #[serde(default)]
    pub clock_offset: f64,
    /// Avatar that fired it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<EntityId>,
    /// Damage on hit (projectiles)
    #[serde(default)]
    pub damage: i32,
    /// Local bookkeeping, never sent
    #[serde(skip)]
    pub elapsed: f64,
    /// Set once a projectile has hit something
    #[serde(skip)]
    pub spent: bool,
}

impl Effect {
    /// New effect created now in the local clock.
    pub fn new(kind: EffectKind, origin: Vec2, direction: Vec2, speed: f32, start_time: f64, lifetime: f64) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
            speed,
            start_time,
            lifetime,
            kind,
            clock_offset: 0.0,
            source: None,
            damage: 0,
            elapsed: 0.0,
            spent: false,
        }
    }

    /// Fast-forward amount for an effect created at `start` in another clock.
    ///
    /// See [`catch_up_elapsed`].
    pub fn catch_up_elapsed(start: f64, correction: f64, now: f64) -> f64 {
        catch_up_elapsed(start, correction, now)
    }

    /// Jump elapsed time to where this effect should be at local `now`.
    pub fn catch_up(&mut self, now: f64, correction: f64) {
        self.elapsed = Self::catch_up_elapsed(self.start_time, correction, now);
    }

    /// Current position.
    pub fn position(&self) -> Vec2 {
        self.origin + self.direction * (self.speed * self.elapsed as f32)
    }

    /// Advance by `dt` seconds.
    pub fn advance(&mut self, dt: f64) {
        self.elapsed += dt;
    }

    /// Past its lifetime, or consumed by a hit.
    pub fn is_expired(&self) -> bool {
        self.spent || self.elapsed >= self.lifetime
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catch_up_lands_partway_along_path() {
        let mut effect = Effect::new(
            EffectKind::Projectile,
            Vec2::new(100.0, 100.0),
            Vec2::new(1.0, 0.0),
            10.0,
            100.0,
            30.0,
        );
        effect.catch_up(112.0, 5.0);

        assert_eq!(effect.elapsed, 7.0);
        assert_eq!(effect.position(), Vec2::new(170.0, 100.0));
        assert!(!effect.is_expired());
    }

    #[test]
    fn test_direction_normalized_on_creation() {
        let effect = Effect::new(EffectKind::Particle, Vec2::ZERO, Vec2::new(0.0, 5.0), 1.0, 0.0, 1.0);
        assert_eq!(effect.direction, Vec2::new(0.0, 1.0));
    }

    #[test]
    fn test_expiry() {
        let mut effect = Effect::new(EffectKind::Particle, Vec2::ZERO, Vec2::RIGHT, 1.0, 0.0, 0.5);
        effect.advance(0.25);
        assert!(!effect.is_expired());
        effect.advance(0.25);
        assert!(effect.is_expired());
    }

    #[test]
    fn test_wire_shape_skips_local_state() {
        let mut effect = Effect::new(EffectKind::Projectile, Vec2::ZERO, Vec2::RIGHT, 300.0, 42.0, 1.0);
        effect.elapsed = 0.5;
        let json = serde_json::to_value(&effect).unwrap();

        assert_eq!(json["startTime"], 42.0);
        assert_eq!(json["kind"], "projectile");
        assert!(json.get("elapsed").is_none());

        let back: Effect = serde_json::from_value(json).unwrap();
        assert_eq!(back.elapsed, 0.0);
        assert_eq!(back.clock_offset, 0.0);
    }
}
