//! Peer Collaborators
//!
//! Seams to the outside world of a peer: where frames are drawn and where
//! movement intent comes from. Sprites and assets live behind the
//! [`RenderSurface`] implementation.

use crate::core::rng::DeterministicRng;
use crate::core::vec2::Vec2;
use crate::world::effect::EffectKind;
use crate::world::entity::{EntityId, EntityKind};
use crate::world::pickup::Pickup;

/// One entity draw call.
#[derive(Clone, Debug, PartialEq)]
pub struct EntitySprite<'a> {
    /// Entity being drawn
    pub id: &'a EntityId,
    /// Kind, for sprite selection
    pub kind: EntityKind,
    /// Where to draw
    pub position: Vec2,
    /// Mirror horizontally
    pub facing_left: bool,
    /// Current health
    pub hp: i32,
    /// Health cap
    pub max_hp: i32,
    /// Label (avatars)
    pub name: Option<&'a str>,
}

/// Something frames can be drawn onto.
pub trait RenderSurface {
    /// Draw a living entity.
    fn draw_entity(&mut self, sprite: &EntitySprite<'_>);

    /// Draw an effect at its current position.
    fn draw_effect(&mut self, position: Vec2, kind: EffectKind);

    /// Draw an uncollected pickup.
    fn draw_pickup(&mut self, _pickup: &Pickup) {}
}

/// Source of the local player's intent.
pub trait InputSource {
    /// Desired movement direction. Any length; normalized by the caller.
    fn movement(&mut self) -> Vec2;

    /// Whether the player asked to respawn this frame.
    fn respawn_requested(&mut self) -> bool {
        false
    }
}

/// Input that never moves.
#[derive(Clone, Copy, Debug, Default)]
pub struct StillInput;

impl InputSource for StillInput {
    fn movement(&mut self) -> Vec2 {
        Vec2::ZERO
    }
}

/// Headless input: walks in a random direction, turning every so often,
/// and asks to respawn after dying.
#[derive(Clone, Debug)]
pub struct WanderInput {
    rng: DeterministicRng,
    heading: Vec2,
    frames_left: u32,
    turn_every: u32,
}

impl WanderInput {
    /// Wanderer that changes heading every `turn_every` frames.
    pub fn new(seed: u64, turn_every: u32) -> Self {
        Self {
            rng: DeterministicRng::new(seed),
            heading: Vec2::ZERO,
            frames_left: 0,
            turn_every: turn_every.max(1),
        }
    }
}

impl InputSource for WanderInput {
    fn movement(&mut self) -> Vec2 {
        if self.frames_left == 0 {
            let x = self.rng.next_f32_range(-1.0, 1.0);
            let y = self.rng.next_f32_range(-1.0, 1.0);
            self.heading = Vec2::new(x, y);
            self.frames_left = self.turn_every;
        }
        self.frames_left -= 1;
        self.heading
    }

    fn respawn_requested(&mut self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wander_holds_heading_between_turns() {
        let mut input = WanderInput::new(4, 3);
        let first = input.movement();
        assert_eq!(input.movement(), first);
        assert_eq!(input.movement(), first);
        assert!(input.respawn_requested());
    }

    #[test]
    fn test_still_input() {
        let mut input = StillInput;
        assert_eq!(input.movement(), Vec2::ZERO);
        assert!(!input.respawn_requested());
    }
}
