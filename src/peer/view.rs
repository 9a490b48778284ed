//! Peer View
//!
//! The peer's merged picture of the world: its own avatar, every remote
//! avatar and hostile it has heard about, live effects, pickups and the
//! scoreboard. Hub messages are merged here between frames.
//!
//! The drive set (own avatar plus hostiles the hub assigned to this peer) is
//! locally authoritative: broadcasts never move it, they can only report
//! that it died or changed hands.

use std::collections::BTreeMap;
use tracing::debug;

use crate::core::vec2::{Bounds, Vec2};
use crate::network::protocol::{EffectMap, EntityMap, HubMessage, HubPayload, StateUpdate};
use crate::peer::collaborators::{EntitySprite, RenderSurface};
use crate::peer::sim::CombatState;
use crate::world::effect::Effect;
use crate::world::entity::{Entity, EntityId, EntityPatch, OFFSTAGE};
use crate::world::pickup::{merge_claims, PickupTable};
use crate::world::score::ScoreEntry;

/// Filters score reports down to strictly increasing values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScoreReporter {
    last: Option<u64>,
}

impl ScoreReporter {
    /// Reporter that has not reported anything yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `Some(score)` if it should be sent, i.e. it beats the last
    /// value sent.
    pub fn report(&mut self, score: u64) -> Option<u64> {
        match self.last {
            Some(last) if score <= last => None,
            _ => {
                self.last = Some(score);
                Some(score)
            }
        }
    }

    /// Last value sent.
    pub fn last(&self) -> Option<u64> {
        self.last
    }
}

/// Things created locally since the last outgoing update.
#[derive(Clone, Debug, Default)]
pub(crate) struct Pending {
    pub(crate) effects: EffectMap,
    pub(crate) kills: BTreeMap<EntityId, f64>,
    pub(crate) claims: PickupTable,
}

/// A peer's local view.
#[derive(Clone, Debug)]
pub struct PeerView {
    identifier: EntityId,
    display_name: Option<String>,
    pub(crate) avatar: Entity,
    pub(crate) remote: BTreeMap<EntityId, Entity>,
    pub(crate) effects: BTreeMap<String, Effect>,
    pub(crate) pickups: PickupTable,
    scores: BTreeMap<EntityId, ScoreEntry>,
    hub_offset: f64,
    pub(crate) bounds: Bounds,
    pub(crate) pending: Pending,
    pub(crate) combat: CombatState,
    reporter: ScoreReporter,
}

impl PeerView {
    /// View with a fresh avatar at `spawn_at`.
    pub fn new(identifier: EntityId, display_name: Option<String>, spawn_at: Vec2) -> Self {
        let avatar = Entity::avatar(identifier.clone(), display_name.clone(), spawn_at);
        Self {
            identifier,
            display_name,
            avatar,
            remote: BTreeMap::new(),
            effects: BTreeMap::new(),
            pickups: PickupTable::new(),
            scores: BTreeMap::new(),
            hub_offset: 0.0,
            bounds: Bounds::default(),
            pending: Pending::default(),
            combat: CombatState::default(),
            reporter: ScoreReporter::new(),
        }
    }

    /// This peer's identifier.
    pub fn identifier(&self) -> &EntityId {
        &self.identifier
    }

    /// The local avatar.
    pub fn avatar(&self) -> &Entity {
        &self.avatar
    }

    /// Any entity in the view, including the local avatar.
    pub fn entity(&self, id: &EntityId) -> Option<&Entity> {
        if *id == self.identifier {
            Some(&self.avatar)
        } else {
            self.remote.get(id)
        }
    }

    /// Every remote entity.
    pub fn remote(&self) -> impl Iterator<Item = &Entity> {
        self.remote.values()
    }

    /// Live effects.
    pub fn effects(&self) -> &BTreeMap<String, Effect> {
        &self.effects
    }

    /// Known pickups.
    pub fn pickups(&self) -> &PickupTable {
        &self.pickups
    }

    /// Latest scoreboard.
    pub fn scores(&self) -> &BTreeMap<EntityId, ScoreEntry> {
        &self.scores
    }

    /// Offset attached to the most recent hub message.
    pub fn hub_offset(&self) -> f64 {
        self.hub_offset
    }

    /// Whether `id` is simulated by this peer.
    pub fn is_driven(&self, id: &EntityId) -> bool {
        *id == self.identifier
            || self
                .remote
                .get(id)
                .is_some_and(|e| e.is_hostile() && e.drive_owner.as_ref() == Some(&self.identifier))
    }

    /// Own avatar plus every hostile the hub assigned to this peer.
    pub fn drive_set(&self) -> Vec<EntityId> {
        let mut set = vec![self.identifier.clone()];
        set.extend(
            self.remote
                .values()
                .filter(|e| e.is_hostile() && e.drive_owner.as_ref() == Some(&self.identifier))
                .map(|e| e.id.clone()),
        );
        set
    }

    // =========================================================================
    // Inbound
    // =========================================================================

    /// Merge one hub message. `now` is the local clock.
    pub fn apply(&mut self, message: HubMessage, now: f64) {
        self.hub_offset = message.offset;
        match message.payload {
            HubPayload::Entities(entities) | HubPayload::Spawned(entities) => self.merge_entities(&entities),
            HubPayload::RemovedIdentifiers(ids) => {
                for id in &ids {
                    self.remove(id);
                }
            }
            HubPayload::NewEffects(effects) => {
                for (fx_id, mut effect) in effects {
                    let correction = effect.clock_offset - message.offset;
                    effect.catch_up(now, correction);
                    if !effect.is_expired() {
                        self.effects.insert(fx_id, effect);
                    }
                }
            }
            HubPayload::Scores(scores) => self.scores = scores,
            HubPayload::Pickups(pickups) => {
                merge_claims(&mut self.pickups, &pickups);
            }
        }
    }

    fn merge_entities(&mut self, entities: &EntityMap) {
        for (id, patch) in entities {
            if *id == self.identifier {
                if patch.reports_death() {
                    debug!("Hub reports own avatar dead");
                    self.avatar.apply_patch(&patch.death());
                }
                continue;
            }

            if self.is_driven(id) {
                self.merge_driven(id, patch);
                continue;
            }

            match self.remote.get_mut(id) {
                Some(entity) => entity.apply_patch(patch),
                None => match Entity::from_patch(id.clone(), patch) {
                    Some(entity) => {
                        self.remote.insert(id.clone(), entity);
                    }
                    None => {
                        debug!("Skipped untyped entity {} from hub", id);
                        continue;
                    }
                },
            }
            if let Some(entity) = self.remote.get_mut(id) {
                if entity.is_hostile() && !entity.alive {
                    park(entity);
                }
            }
        }
    }

    /// Patch for a hostile this peer drives. Position and velocity stay
    /// local; death and hand-over are accepted.
    fn merge_driven(&mut self, id: &EntityId, patch: &EntityPatch) {
        let Some(entity) = self.remote.get_mut(id) else {
            return;
        };
        if patch.reports_death() {
            entity.apply_patch(&patch.death());
            park(entity);
            self.combat.forget(id);
            return;
        }
        match &patch.target {
            Some(owner) if owner.as_ref() != Some(&self.identifier) => {
                debug!("Hostile {} handed over to {:?}", id, owner);
                entity.apply_patch(patch);
                self.combat.forget(id);
            }
            _ => {}
        }
    }

    fn remove(&mut self, id: &EntityId) {
        if *id == self.identifier {
            debug!("Ignoring removal of own avatar");
            return;
        }
        if let Some(entity) = self.remote.get_mut(id) {
            entity.alive = false;
            entity.drive_owner = None;
        }
        self.combat.forget(id);
    }

    // =========================================================================
    // Outbound
    // =========================================================================

    /// Package the drive set and everything created since the last call.
    ///
    /// The score is only included when it beats the last one sent.
    pub fn outgoing(&mut self, now: f64) -> StateUpdate {
        let mut update = StateUpdate {
            identifier: Some(self.identifier.clone()),
            display_name: self.display_name.clone(),
            local_time: Some(now),
            ..Default::default()
        };

        update.entities.insert(self.identifier.clone(), self.avatar.to_patch());
        for entity in self.remote.values() {
            if entity.is_hostile() && entity.drive_owner.as_ref() == Some(&self.identifier) {
                let mut patch = entity.to_patch();
                patch.target = None;
                update.entities.insert(entity.id.clone(), patch);
            }
        }

        let pending = std::mem::take(&mut self.pending);
        update.new_effects = pending.effects;
        update.kill_reports = pending.kills;
        update.pickup_claims = pending.claims;

        if let Some(score) = self.reporter.report(self.avatar.score) {
            update.score = Some(score);
            update.score_time = Some(now);
        }
        update
    }

    /// Bring the local avatar back at `position`. The running score is kept.
    pub fn respawn_avatar(&mut self, position: Vec2) {
        self.avatar.alive = true;
        self.avatar.hp = self.avatar.max_hp;
        self.avatar.move_to(position);
        self.combat = CombatState::default();
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    /// Draw pickups, living entities and effects.
    pub fn render<S: RenderSurface + ?Sized>(&self, surface: &mut S) {
        for pickup in self.pickups.values().filter(|p| !p.complete) {
            surface.draw_pickup(pickup);
        }
        for entity in self.remote.values().chain(std::iter::once(&self.avatar)) {
            if !entity.alive {
                continue;
            }
            surface.draw_entity(&EntitySprite {
                id: &entity.id,
                kind: entity.kind,
                position: entity.position,
                facing_left: entity.facing_left,
                hp: entity.hp,
                max_hp: entity.max_hp,
                name: entity.name.as_deref(),
            });
        }
        for effect in self.effects.values() {
            surface.draw_effect(effect.position(), effect.kind);
        }
    }
}

/// Dead hostiles have no owner and sit offstage.
pub(crate) fn park(entity: &mut Entity) {
    entity.alive = false;
    entity.drive_owner = None;
    entity.move_to(OFFSTAGE);
}

// =============================================================================
// TESTS
// =============================================================================
