//! Entity Store
//!
//! Single source of truth for every avatar and hostile the hub knows about.
//! All mutation funnels through the operations here so the ownership
//! invariant is enforced in one place: a dead hostile never has a
//! drive-owner.

use std::collections::BTreeMap;
use tracing::debug;

use crate::core::rng::DeterministicRng;
use crate::core::vec2::Vec2;
use crate::world::entity::{Entity, EntityId, EntityKind, EntityPatch, OFFSTAGE};

/// Result of [`EntityStore::merge_entity`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Unknown identifier, inserted.
    Created,
    /// Known identifier, at least one field changed.
    Updated,
    /// Known identifier, nothing changed.
    Unchanged,
    /// Unknown identifier without a kind tag.
    Rejected,
}

impl MergeOutcome {
    /// Whether the store changed.
    pub fn changed(self) -> bool {
        matches!(self, Self::Created | Self::Updated)
    }
}

/// Entities keyed by identifier.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EntityStore {
    entities: BTreeMap<EntityId, Entity>,
}

impl EntityStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Look up an entity.
    pub fn get(&self, id: &EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    /// Check if an identifier is known.
    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    /// Iterate in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = (&EntityId, &Entity)> {
        self.entities.iter()
    }

    /// Mutable access for movement only. Callers must not touch liveness or
    /// ownership; use the store operations for those.
    pub(crate) fn get_mut(&mut self, id: &EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(id)
    }

    // =========================================================================
    // Merge
    // =========================================================================

    /// Merge a partial update.
    ///
    /// Known identifiers get the carried fields overwritten. Unknown ones are
    /// created when the patch names a kind. Merging the same patch twice is
    /// the same as merging it once.
    pub fn merge_entity(&mut self, id: &EntityId, patch: &EntityPatch) -> MergeOutcome {
        match self.entities.get_mut(id) {
            Some(entity) => {
                let before = entity.clone();
                entity.apply_patch(patch);
                enforce_invariant(entity);
                if *entity == before {
                    MergeOutcome::Unchanged
                } else {
                    MergeOutcome::Updated
                }
            }
            None => match Entity::from_patch(id.clone(), patch) {
                Some(mut entity) => {
                    enforce_invariant(&mut entity);
                    debug!("Created {:?} {} from update", entity.kind, id);
                    self.entities.insert(id.clone(), entity);
                    MergeOutcome::Created
                }
                None => MergeOutcome::Rejected,
            },
        }
    }

    /// Insert or replace a whole entity.
    pub fn insert(&mut self, mut entity: Entity) {
        enforce_invariant(&mut entity);
        self.entities.insert(entity.id.clone(), entity);
    }

    // =========================================================================
    // Life cycle
    // =========================================================================

    /// Kill an entity: not alive, no owner, parked offstage.
    ///
    /// Returns true if anything changed. Killing a dead entity is a no-op.
    pub fn mark_dead(&mut self, id: &EntityId) -> bool {
        let Some(entity) = self.entities.get_mut(id) else {
            return false;
        };
        let changed = entity.alive || entity.drive_owner.is_some() || entity.position != OFFSTAGE;
        entity.alive = false;
        entity.drive_owner = None;
        entity.move_to(OFFSTAGE);
        changed
    }

    /// Kill every hostile driven by `owner`. Returns the affected identifiers.
    pub fn cascade_remove_driven(&mut self, owner: &EntityId) -> Vec<EntityId> {
        let driven = self.driven_by(owner);
        for id in &driven {
            self.mark_dead(id);
        }
        driven
    }

    /// Kill every hostile whose owner fails `is_live`.
    pub fn reap_orphans<F>(&mut self, is_live: F) -> Vec<EntityId>
    where
        F: Fn(&EntityId) -> bool,
    {
        let orphans: Vec<EntityId> = self
            .entities
            .values()
            .filter(|e| e.is_hostile())
            .filter(|e| e.drive_owner.as_ref().is_some_and(|owner| !is_live(owner)))
            .map(|e| e.id.clone())
            .collect();
        for id in &orphans {
            self.mark_dead(id);
        }
        orphans
    }

    /// Bring a dead hostile back under `owner` at `position`.
    ///
    /// Only the spawn policy assigns owners. Returns false if `id` is not a
    /// dead hostile.
    pub(crate) fn assign(&mut self, id: &EntityId, owner: &EntityId, position: Vec2) -> bool {
        match self.entities.get_mut(id) {
            Some(entity) if entity.is_hostile() && !entity.alive => {
                entity.alive = true;
                entity.hp = entity.max_hp;
                entity.drive_owner = Some(owner.clone());
                entity.move_to(position);
                true
            }
            _ => false,
        }
    }

    /// Create the avatar for `id`, or bring an existing one back to life.
    ///
    /// Returns whether the avatar was newly created, or `None` if `id`
    /// already names something other than an avatar.
    pub fn revive_avatar(&mut self, id: &EntityId, name: Option<String>, position: Vec2) -> Option<bool> {
        match self.entities.get_mut(id) {
            Some(other) if !other.is_avatar() => None,
            Some(avatar) => {
                avatar.alive = true;
                avatar.hp = avatar.max_hp;
                avatar.move_to(position);
                if name.is_some() {
                    avatar.name = name;
                }
                Some(false)
            }
            None => {
                self.entities.insert(id.clone(), Entity::avatar(id.clone(), name, position));
                Some(true)
            }
        }
    }

    /// Add `count` dead, unowned hostiles to the pool.
    pub fn seed_hostiles(&mut self, count: usize, rng: &mut DeterministicRng) -> Vec<EntityId> {
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            let mut bytes = [0u8; 16];
            bytes[..8].copy_from_slice(&rng.next_u64().to_le_bytes());
            bytes[8..].copy_from_slice(&rng.next_u64().to_le_bytes());
            let id = EntityId(uuid::Builder::from_random_bytes(bytes).into_uuid().to_string());
            self.entities.insert(id.clone(), Entity::hostile(id.clone()));
            ids.push(id);
        }
        ids
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Dead hostiles in identifier order (spawn candidates).
    pub fn dead_hostiles(&self) -> Vec<EntityId> {
        self.entities
            .values()
            .filter(|e| e.is_hostile() && !e.alive)
            .map(|e| e.id.clone())
            .collect()
    }

    /// Hostiles currently driven by `owner`.
    pub fn driven_by(&self, owner: &EntityId) -> Vec<EntityId> {
        self.entities
            .values()
            .filter(|e| e.is_hostile() && e.drive_owner.as_ref() == Some(owner))
            .map(|e| e.id.clone())
            .collect()
    }

    /// Full-state patches of every living entity.
    pub fn alive_snapshot(&self) -> BTreeMap<EntityId, EntityPatch> {
        self.entities
            .values()
            .filter(|e| e.alive)
            .map(|e| (e.id.clone(), e.to_patch()))
            .collect()
    }

    /// Full-state patches of the named entities (unknown ones skipped).
    pub fn snapshot_of<'a, I>(&self, ids: I) -> BTreeMap<EntityId, EntityPatch>
    where
        I: IntoIterator<Item = &'a EntityId>,
    {
        ids.into_iter()
            .filter_map(|id| self.entities.get(id).map(|e| (id.clone(), e.to_patch())))
            .collect()
    }

    /// Number of entities of `kind` that are alive.
    pub fn alive_count(&self, kind: EntityKind) -> usize {
        self.entities.values().filter(|e| e.kind == kind && e.alive).count()
    }
}

fn enforce_invariant(entity: &mut Entity) {
    if entity.is_hostile() && !entity.alive {
        entity.drive_owner = None;
        entity.move_to(OFFSTAGE);
    }
}

// =============================================================================
// TESTS
// =============================================================================
