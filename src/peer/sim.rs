//! Local Simulation
//!
//! One frame of the peer's authoritative simulation: the avatar, every
//! hostile in the drive set, effects and pickups. Everything here mutates
//! only the local view; results reach the hub through
//! [`PeerView::outgoing`](crate::peer::view::PeerView::outgoing).

use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::core::vec2::Vec2;
use crate::peer::collaborators::InputSource;
use crate::peer::view::{park, PeerView};
use crate::world::effect::{Effect, EffectKind};
use crate::world::entity::EntityId;
use crate::world::pickup::{PickupKind, HEALTH_PICKUP_HEAL};

/// Seconds between automatic shots.
pub const FIRE_INTERVAL: f64 = 0.5;

/// Projectile speed (units/second).
pub const PROJECTILE_SPEED: f32 = 420.0;

/// Projectile lifetime in seconds.
pub const PROJECTILE_LIFETIME: f64 = 1.2;

/// Damage per projectile hit.
pub const PROJECTILE_DAMAGE: i32 = 50;

/// Projectile hit radius.
pub const HIT_RADIUS: f32 = 14.0;

/// Distance at which a hostile hurts the avatar.
pub const CONTACT_RADIUS: f32 = 18.0;

/// Seconds between contact hits from the same hostile.
pub const CONTACT_COOLDOWN: f32 = 0.5;

/// Score awarded per kill.
pub const KILL_SCORE: u64 = 100;

/// Timers that only matter to the local simulation.
#[derive(Clone, Debug, Default)]
pub struct CombatState {
    pub(crate) fire_cooldown: f64,
    pub(crate) contact_cooldowns: BTreeMap<EntityId, f32>,
}

impl CombatState {
    /// Drop timers for an entity that left the drive set.
    pub fn forget(&mut self, id: &EntityId) {
        self.contact_cooldowns.remove(id);
    }
}

/// What happened during one [`PeerView::step`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepReport {
    /// Hostiles killed by own projectiles
    pub kills: u32,
    /// Projectiles fired
    pub fired: u32,
    /// Pickups claimed
    pub claimed: u32,
    /// The avatar died this frame
    pub died: bool,
    /// The avatar came back this frame
    pub respawned: bool,
}

impl PeerView {
    /// Advance the local simulation by `dt` seconds at local time `now`.
    pub fn step<I: InputSource + ?Sized>(&mut self, dt: f32, now: f64, input: &mut I) -> StepReport {
        let mut report = StepReport::default();

        if !self.avatar.alive && input.respawn_requested() {
            self.respawn_avatar(self.bounds.center());
            report.respawned = true;
            info!("Avatar respawned");
        }

        self.move_avatar(dt, input);
        report.died = self.drive_hostiles(dt);
        report.fired = self.auto_fire(now);
        report.kills = self.resolve_effects(dt, now);
        report.claimed = self.claim_pickups();

        if report.died {
            info!("Avatar died with score {}", self.avatar.score);
        }
        report
    }

    fn move_avatar<I: InputSource + ?Sized>(&mut self, dt: f32, input: &mut I) {
        if !self.avatar.alive {
            self.avatar.velocity = Vec2::ZERO;
            return;
        }
        let intent = input.movement().normalize();
        self.avatar.velocity = intent * self.avatar.max_speed;
        self.avatar.integrate(dt, self.bounds);
    }

    /// Chase the avatar with every driven hostile. Returns true if the
    /// avatar died from contact.
    fn drive_hostiles(&mut self, dt: f32) -> bool {
        for cooldown in self.combat.contact_cooldowns.values_mut() {
            *cooldown -= dt;
        }

        let me = self.identifier().clone();
        let target = self.avatar.position;
        let mut died = false;
        for hostile in self.remote.values_mut() {
            let driven = hostile.is_hostile() && hostile.alive && hostile.drive_owner.as_ref() == Some(&me);
            if !driven {
                continue;
            }
            if !self.avatar.alive {
                hostile.velocity = Vec2::ZERO;
                continue;
            }

            hostile.velocity = (target - hostile.position).normalize() * hostile.max_speed;
            hostile.integrate(dt, self.bounds);

            if hostile.position.distance_squared(self.avatar.position) <= CONTACT_RADIUS * CONTACT_RADIUS {
                let cooldown = self.combat.contact_cooldowns.entry(hostile.id.clone()).or_insert(0.0);
                if *cooldown <= 0.0 {
                    *cooldown = CONTACT_COOLDOWN;
                    died |= self.avatar.damage(hostile.attack_power);
                }
            }
        }
        died
    }

    /// Fire at the nearest living hostile when the gun is ready.
    fn auto_fire(&mut self, now: f64) -> u32 {
        if !self.avatar.alive {
            return 0;
        }
        if self.combat.fire_cooldown > 0.0 {
            return 0;
        }

        let origin = self.avatar.position;
        let nearest = self
            .remote
            .values()
            .filter(|e| e.is_hostile() && e.alive)
            .min_by(|a, b| {
                a.position
                    .distance_squared(origin)
                    .total_cmp(&b.position.distance_squared(origin))
            });
        let Some(target) = nearest else {
            return 0;
        };

        let mut projectile = Effect::new(
            EffectKind::Projectile,
            origin,
            target.position - origin,
            PROJECTILE_SPEED,
            now,
            PROJECTILE_LIFETIME,
        );
        projectile.source = Some(self.identifier().clone());
        projectile.damage = PROJECTILE_DAMAGE;

        let fx_id = uuid::Uuid::new_v4().to_string();
        self.pending.effects.insert(fx_id.clone(), projectile.clone());
        self.effects.insert(fx_id, projectile);
        self.combat.fire_cooldown = FIRE_INTERVAL;
        1
    }

    /// Advance effects and resolve own projectile hits. Returns kills.
    fn resolve_effects(&mut self, dt: f32, now: f64) -> u32 {
        self.combat.fire_cooldown -= f64::from(dt);

        let me = self.identifier().clone();
        let mut kills = 0;
        for effect in self.effects.values_mut() {
            effect.advance(f64::from(dt));
            let owned = effect.kind == EffectKind::Projectile && effect.source.as_ref() == Some(&me);
            if !owned || effect.is_expired() {
                continue;
            }

            let at = effect.position();
            let hit = self
                .remote
                .values_mut()
                .find(|e| e.is_hostile() && e.alive && e.position.distance_squared(at) <= HIT_RADIUS * HIT_RADIUS);
            let Some(hostile) = hit else {
                continue;
            };

            effect.spent = true;
            if hostile.damage(effect.damage) {
                debug!("Killed {}", hostile.id);
                park(hostile);
                self.combat.contact_cooldowns.remove(&hostile.id);
                self.pending.kills.insert(hostile.id.clone(), now);
                self.avatar.score += KILL_SCORE;
                kills += 1;
            }
        }
        self.effects.retain(|_, effect| !effect.is_expired());
        kills
    }

    /// Collect pickups under the avatar.
    fn claim_pickups(&mut self) -> u32 {
        if !self.avatar.alive {
            return 0;
        }
        let mut claimed = 0;
        for (id, pickup) in self.pickups.iter_mut() {
            if !pickup.touches(self.avatar.position) {
                continue;
            }
            pickup.complete = true;
            if pickup.kind == PickupKind::Health {
                self.avatar.heal(HEALTH_PICKUP_HEAL);
            }
            self.pending.claims.insert(id.clone(), pickup.clone());
            claimed += 1;
        }
        claimed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::protocol::{HubMessage, HubPayload};
    use crate::peer::collaborators::StillInput;
    use crate::world::entity::{EntityKind, EntityPatch};
    use crate::world::pickup::Pickup;

    fn view_with_hostile(owner: &str, at: Vec2) -> PeerView {
        let mut view = PeerView::new("p1".into(), None, Vec2::new(640.0, 360.0));
        let patch = EntityPatch {
            kind: Some(EntityKind::Hostile),
            position: Some(at),
            alive: Some(true),
            hp: Some(100),
            target: Some(Some(EntityId::from(owner))),
            ..Default::default()
        };
        let map = [(EntityId::from("h1"), patch)].into_iter().collect();
        view.apply(HubMessage::new(HubPayload::Entities(map), 0.0), 0.0);
        view
    }

    struct Push(Vec2);

    impl InputSource for Push {
        fn movement(&mut self) -> Vec2 {
            self.0
        }
    }

    #[test]
    fn test_avatar_moves_at_max_speed() {
        let mut view = PeerView::new("p1".into(), None, Vec2::new(640.0, 360.0));
        view.step(0.5, 0.0, &mut Push(Vec2::new(10.0, 0.0)));
        let expected = 640.0 + view.avatar().max_speed * 0.5;
        assert_eq!(view.avatar().position, Vec2::new(expected, 360.0));
    }

    #[test]
    fn test_driven_hostile_chases_avatar() {
        let mut view = view_with_hostile("p1", Vec2::new(100.0, 360.0));
        view.step(0.1, 0.0, &mut StillInput);
        let h1 = view.entity(&"h1".into()).unwrap();
        assert!(h1.position.x > 100.0);
        assert_eq!(h1.position.y, 360.0);
    }

    #[test]
    fn test_foreign_hostile_not_simulated() {
        let mut view = view_with_hostile("p2", Vec2::new(100.0, 360.0));
        view.step(0.1, 0.0, &mut StillInput);
        assert_eq!(view.entity(&"h1".into()).unwrap().position, Vec2::new(100.0, 360.0));
    }

    #[test]
    fn test_contact_damage_respects_cooldown() {
        let mut view = view_with_hostile("p1", Vec2::new(640.0, 360.0));
        let full = view.avatar().hp;

        view.step(0.01, 0.0, &mut StillInput);
        let once = view.avatar().hp;
        assert!(once < full);

        view.step(0.01, 0.01, &mut StillInput);
        assert_eq!(view.avatar().hp, once);
    }

    #[test]
    fn test_kill_reported_and_scored() {
        let mut view = view_with_hostile("p2", Vec2::new(700.0, 360.0));
        view.remote.get_mut(&EntityId::from("h1")).unwrap().hp = PROJECTILE_DAMAGE;

        let mut kills = 0;
        for frame in 0..30 {
            let report = view.step(0.02, f64::from(frame) * 0.02, &mut StillInput);
            kills += report.kills;
        }

        assert_eq!(kills, 1);
        let h1 = view.entity(&"h1".into()).unwrap();
        assert!(!h1.alive);
        assert!(h1.drive_owner.is_none());
        assert_eq!(view.avatar().score, KILL_SCORE);

        let update = view.outgoing(1.0);
        assert!(update.kill_reports.contains_key(&EntityId::from("h1")));
        assert_eq!(update.new_effects.len(), 1);
        assert_eq!(update.score, Some(KILL_SCORE));
        assert!(view.outgoing(1.1).kill_reports.is_empty());
    }

    #[test]
    fn test_no_fire_without_targets() {
        let mut view = PeerView::new("p1".into(), None, Vec2::new(640.0, 360.0));
        let report = view.step(0.1, 0.0, &mut StillInput);
        assert_eq!(report.fired, 0);
        assert!(view.effects().is_empty());
    }

    #[test]
    fn test_pickup_claimed_and_heals() {
        let mut view = PeerView::new("p1".into(), None, Vec2::new(640.0, 360.0));
        view.avatar.hp = 50;
        let mut table = crate::world::pickup::PickupTable::new();
        table.insert("med".into(), Pickup::new(PickupKind::Health, Vec2::new(645.0, 360.0)));
        view.apply(HubMessage::new(HubPayload::Pickups(table), 0.0), 0.0);

        let report = view.step(0.01, 0.0, &mut StillInput);
        assert_eq!(report.claimed, 1);
        assert_eq!(view.avatar().hp, 50 + HEALTH_PICKUP_HEAL);
        assert!(view.pickups()["med"].complete);
        assert!(view.outgoing(0.1).pickup_claims["med"].complete);

        assert_eq!(view.step(0.01, 0.1, &mut StillInput).claimed, 0);
    }

    #[test]
    fn test_dead_avatar_respawns_on_request() {
        struct Respawner;
        impl InputSource for Respawner {
            fn movement(&mut self) -> Vec2 {
                Vec2::ZERO
            }
            fn respawn_requested(&mut self) -> bool {
                true
            }
        }

        let mut view = PeerView::new("p1".into(), None, Vec2::new(10.0, 10.0));
        view.avatar.damage(1_000);

        assert!(!view.step(0.1, 0.0, &mut StillInput).respawned);
        let report = view.step(0.1, 0.1, &mut Respawner);
        assert!(report.respawned);
        assert!(view.avatar().alive);
        assert_eq!(view.avatar().position, view.bounds.center());
    }
}
