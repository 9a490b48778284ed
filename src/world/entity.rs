//! Entity Definitions
//!
//! Avatars, hostiles and the partial projections peers and the hub exchange.

use std::fmt;
use serde::{Serialize, Deserialize};

use crate::core::vec2::{Bounds, Vec2};

/// Where dead entities are parked. Outside every playable area.
pub const OFFSTAGE: Vec2 = Vec2::new(-512.0, -512.0);

/// Starting health for avatars.
pub const AVATAR_HP: i32 = 100;

/// Starting health for hostiles.
pub const HOSTILE_HP: i32 = 100;

/// Contact damage dealt by a hostile.
pub const HOSTILE_ATTACK: i32 = 10;

/// Top speed of an avatar (units per second).
pub const AVATAR_SPEED: f32 = 240.0;

/// Top speed of a chasing hostile (units per second).
pub const HOSTILE_SPEED: f32 = 110.0;

// =============================================================================
// ENTITY ID
// =============================================================================

/// Opaque, globally unique entity identifier.
///
/// Avatars use their peer's durable identifier; hub-created hostiles use a
/// UUID v4. Ordered so stores iterate deterministically.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Wrap an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random identifier.
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow as `&str`.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// =============================================================================
// ENTITY KIND
// =============================================================================

/// Entity classification, carried on the wire under `"type"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// A connected peer's player-controlled actor.
    Avatar,
    /// A non-player actor driven by whichever avatar it targets.
    Hostile,
    /// A short-lived gameplay object.
    Effect,
}

// =============================================================================
// ENTITY
// =============================================================================

/// A simulated actor.
#[derive(Clone, Debug, PartialEq)]
pub struct Entity {
    /// Unique identifier
    pub id: EntityId,
    /// Classification
    pub kind: EntityKind,
    /// Current position
    pub position: Vec2,
    /// Current velocity (units per second)
    pub velocity: Vec2,
    /// Sprite orientation
    pub facing_left: bool,
    /// Alive flag
    pub alive: bool,
    /// Health, never below zero
    pub hp: i32,
    /// Health cap
    pub max_hp: i32,
    /// Avatar currently simulating this hostile
    pub drive_owner: Option<EntityId>,
    /// Display name (avatars)
    pub name: Option<String>,
    /// Running score (avatars)
    pub score: u64,
    /// Movement speed cap
    pub max_speed: f32,
    /// Contact damage
    pub attack_power: i32,
}

impl Entity {
    /// New living avatar at `position`.
    pub fn avatar(id: EntityId, name: Option<String>, position: Vec2) -> Self {
        Self {
            id,
            kind: EntityKind::Avatar,
            position,
            velocity: Vec2::ZERO,
            facing_left: false,
            alive: true,
            hp: AVATAR_HP,
            max_hp: AVATAR_HP,
            drive_owner: None,
            name,
            score: 0,
            max_speed: AVATAR_SPEED,
            attack_power: 0,
        }
    }

    /// New dead, unowned hostile parked offstage.
    pub fn hostile(id: EntityId) -> Self {
        Self {
            id,
            kind: EntityKind::Hostile,
            position: OFFSTAGE,
            velocity: Vec2::ZERO,
            facing_left: false,
            alive: false,
            hp: HOSTILE_HP,
            max_hp: HOSTILE_HP,
            drive_owner: None,
            name: None,
            score: 0,
            max_speed: HOSTILE_SPEED,
            attack_power: HOSTILE_ATTACK,
        }
    }

    /// Build an entity from a patch for an identifier nobody has seen yet.
    ///
    /// Returns `None` when the patch does not say what kind of entity it is.
    pub fn from_patch(id: EntityId, patch: &EntityPatch) -> Option<Self> {
        let mut entity = match patch.kind? {
            EntityKind::Avatar => Self::avatar(id, None, Vec2::ZERO),
            EntityKind::Hostile => Self::hostile(id),
            EntityKind::Effect => Self {
                kind: EntityKind::Effect,
                attack_power: 0,
                ..Self::hostile(id)
            },
        };
        entity.apply_patch(patch);
        Some(entity)
    }

    /// Check if this is a hostile.
    #[inline]
    pub fn is_hostile(&self) -> bool {
        self.kind == EntityKind::Hostile
    }

    /// Check if this is an avatar.
    #[inline]
    pub fn is_avatar(&self) -> bool {
        self.kind == EntityKind::Avatar
    }

    /// Overwrite every field the patch carries.
    ///
    /// The kind of an existing entity never changes. Health is clamped at
    /// zero and zero health means dead.
    pub fn apply_patch(&mut self, patch: &EntityPatch) {
        if let Some(position) = patch.position {
            self.position = position;
        }
        if let Some(velocity) = patch.velocity {
            self.velocity = velocity;
        }
        if let Some(facing_left) = patch.facing_left {
            self.facing_left = facing_left;
        }
        if let Some(alive) = patch.alive {
            self.alive = alive;
        }
        if let Some(max_hp) = patch.max_hp {
            self.max_hp = max_hp.max(1);
        }
        if let Some(hp) = patch.hp {
            self.hp = hp.clamp(0, self.max_hp);
        }
        if self.hp == 0 {
            self.alive = false;
        }
        if let Some(target) = &patch.target {
            if self.is_hostile() {
                self.drive_owner = target.clone();
            }
        }
        if let Some(name) = &patch.name {
            self.name = Some(name.clone());
        }
        if let Some(score) = patch.score {
            self.score = score;
        }
        if let Some(max_speed) = patch.max_speed {
            self.max_speed = max_speed;
        }
        if let Some(attack_power) = patch.attack_power {
            self.attack_power = attack_power;
        }
    }

    /// Full-state projection of this entity.
    pub fn to_patch(&self) -> EntityPatch {
        EntityPatch {
            kind: Some(self.kind),
            position: Some(self.position),
            velocity: Some(self.velocity),
            facing_left: Some(self.facing_left),
            alive: Some(self.alive),
            hp: Some(self.hp),
            max_hp: Some(self.max_hp),
            target: if self.is_hostile() { Some(self.drive_owner.clone()) } else { None },
            name: self.name.clone(),
            score: if self.is_avatar() { Some(self.score) } else { None },
            max_speed: Some(self.max_speed),
            attack_power: Some(self.attack_power),
        }
    }

    /// Apply damage. Returns true if this blow killed the entity.
    pub fn damage(&mut self, amount: i32) -> bool {
        if !self.alive {
            return false;
        }
        self.hp = (self.hp - amount.max(0)).max(0);
        if self.hp == 0 {
            self.alive = false;
            return true;
        }
        false
    }

    /// Restore health without exceeding the cap.
    pub fn heal(&mut self, amount: i32) {
        if self.alive {
            self.hp = (self.hp + amount.max(0)).min(self.max_hp);
        }
    }

    /// Teleport and stop.
    pub fn move_to(&mut self, position: Vec2) {
        self.position = position;
        self.velocity = Vec2::ZERO;
    }

    /// Advance position by `velocity * dt`, clamped to `bounds`.
    pub fn integrate(&mut self, dt: f32, bounds: Bounds) {
        if self.velocity.x != 0.0 {
            self.facing_left = self.velocity.x < 0.0;
        }
        self.position = bounds.clamp(self.position + self.velocity * dt);
    }
}

// =============================================================================
// ENTITY PATCH
// =============================================================================

/// Partial projection of an [`Entity`]. Absent fields leave state untouched.
///
/// `target` distinguishes "not mentioned" (`None`) from "explicitly unowned"
/// (`Some(None)`), since clearing an owner is itself an update.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityPatch {
    /// Kind tag, needed to create an unseen identifier
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<EntityKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Vec2>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<Vec2>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facing_left: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alive: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hp: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_hp: Option<i32>,
    /// Drive-owner of a hostile
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    pub target: Option<Option<EntityId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_speed: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attack_power: Option<i32>,
}

impl EntityPatch {
    /// Whether applying this patch would leave the entity dead.
    pub fn reports_death(&self) -> bool {
        self.alive == Some(false) || self.hp == Some(0)
    }

    /// Patch carrying only the fields that describe a death.
    pub fn death(&self) -> Self {
        Self {
            alive: self.alive,
            hp: self.hp,
            target: self.target.clone(),
            ..Self::default()
        }
    }
}

/// Serde adapter keeping `null` distinct from a missing field.
mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T, S>(value: &Option<Option<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

// =============================================================================
// TESTS
// =============================================================================
