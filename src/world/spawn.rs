//! Spawn Policy and Adaptive Difficulty
//!
//! Hostiles are never allocated after start-up. A spawn request reuses dead
//! hostiles, so the total entity count stays bounded by the seeded pool.

use serde::{Serialize, Deserialize};
use tracing::{info, warn};

use crate::core::rng::DeterministicRng;
use crate::core::vec2::Bounds;
use crate::world::entity::EntityId;
use crate::world::store::EntityStore;

/// Default score interval at difficulty 1.0.
pub const DEFAULT_SCORE_BREAKPOINT: u64 = 2500;

/// Spawn counts and difficulty stepping.
///
/// Same keys as the `spawn_rates.json` file the hub loads at start-up.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnRates {
    /// Upper bound of the batch spawned on connect or respawn.
    pub respawn: u32,
    /// Upper bound of the batch spawned on a score boundary.
    pub score: u32,
    /// Lower bound of every batch.
    pub minimum: u32,
    /// Base difficulty multiplier.
    #[serde(alias = "multiplyer")]
    pub multiplier: f64,
    /// Difficulty step per boundary.
    pub rate: f64,
    /// Difficulty cap. Stepping past it wraps back to `multiplier`.
    pub max: f64,
    /// Score interval at difficulty 1.0.
    #[serde(default = "default_breakpoint")]
    pub score_breakpoint: u64,
}

fn default_breakpoint() -> u64 {
    DEFAULT_SCORE_BREAKPOINT
}

impl Default for SpawnRates {
    fn default() -> Self {
        Self {
            respawn: 3,
            score: 2,
            minimum: 1,
            multiplier: 1.0,
            rate: 0.25,
            max: 2.0,
            score_breakpoint: DEFAULT_SCORE_BREAKPOINT,
        }
    }
}

impl SpawnRates {
    /// Parse from JSON text.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Score interval at the given difficulty.
    pub fn spawn_interval(&self, difficulty: f64) -> u64 {
        if difficulty <= 0.0 {
            return self.score_breakpoint.max(1);
        }
        ((self.score_breakpoint as f64 / difficulty) as u64).max(1)
    }

    /// Difficulty after one boundary crossing.
    ///
    /// Only ever increases, except for the wrap back to the base multiplier.
    pub fn next_difficulty(&self, current: f64) -> f64 {
        let stepped = current + self.rate;
        if stepped > self.max + f64::EPSILON {
            self.multiplier
        } else {
            stepped
        }
    }

    /// Batch size for a connect or respawn.
    pub fn respawn_count(&self, rng: &mut DeterministicRng) -> usize {
        draw(rng, self.minimum, self.respawn)
    }

    /// Batch size for a score boundary.
    pub fn score_count(&self, rng: &mut DeterministicRng) -> usize {
        draw(rng, self.minimum, self.score)
    }
}

fn draw(rng: &mut DeterministicRng, min: u32, max: u32) -> usize {
    rng.next_int_range(min as i32, max.max(min) as i32).max(0) as usize
}

/// Revive up to `count` dead hostiles, driven by `target`.
///
/// Each gets full health, zero velocity and a spawn-band position. Returns
/// the identifiers actually spawned; fewer than `count` is logged, not an
/// error.
pub fn spawn_batch(
    store: &mut EntityStore,
    target: &EntityId,
    count: usize,
    rng: &mut DeterministicRng,
    bounds: Bounds,
) -> Vec<EntityId> {
    let candidates = store.dead_hostiles();
    let mut spawned = Vec::with_capacity(count.min(candidates.len()));

    for id in candidates.into_iter().take(count) {
        let position = rng.spawn_position(bounds);
        if store.assign(&id, target, position) {
            spawned.push(id);
        }
    }

    if spawned.len() < count {
        warn!(
            "Spawn shortfall for {}: requested {}, only {} dead hostiles available",
            target,
            count,
            spawned.len()
        );
    } else {
        info!("Spawned {} hostiles targeting {}", spawned.len(), target);
    }

    spawned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rng::SPAWN_BAND;

    #[test]
    fn test_difficulty_steps_then_wraps() {
        let rates = SpawnRates::default();
        let mut d = rates.multiplier;
        let mut seen = vec![d];
        for _ in 0..5 {
            d = rates.next_difficulty(d);
            seen.push(d);
        }
        assert_eq!(seen, vec![1.0, 1.25, 1.5, 1.75, 2.0, 1.0]);
    }

    #[test]
    fn test_spawn_interval_shrinks_with_difficulty() {
        let rates = SpawnRates::default();
        assert_eq!(rates.spawn_interval(1.0), 2500);
        assert_eq!(rates.spawn_interval(1.25), 2000);
        assert_eq!(rates.spawn_interval(2.0), 1250);
        assert_eq!(rates.spawn_interval(0.0), 2500);
    }

    #[test]
    fn test_counts_within_bounds() {
        let rates = SpawnRates::default();
        let mut rng = DeterministicRng::new(11);
        for _ in 0..200 {
            assert!((1..=3).contains(&rates.respawn_count(&mut rng)));
            assert!((1..=2).contains(&rates.score_count(&mut rng)));
        }
    }

    #[test]
    fn test_rates_file_keys() {
        let json = r#"{"respawn":4,"score":3,"minimum":2,"multiplyer":1,"rate":0.5,"max":3}"#;
        let rates = SpawnRates::from_json(json).unwrap();
        assert_eq!(rates.respawn, 4);
        assert_eq!(rates.multiplier, 1.0);
        assert_eq!(rates.score_breakpoint, DEFAULT_SCORE_BREAKPOINT);
    }

    #[test]
    fn test_spawn_reuses_dead_only() {
        let mut store = EntityStore::new();
        let mut rng = DeterministicRng::new(5);
        store.seed_hostiles(2, &mut rng);
        let before = store.len();
        let target = EntityId::from("p1");

        let spawned = spawn_batch(&mut store, &target, 5, &mut rng, Bounds::default());

        assert_eq!(spawned.len(), 2);
        assert_eq!(store.len(), before);
        assert!(store.dead_hostiles().is_empty());

        for id in &spawned {
            let e = store.get(id).unwrap();
            assert!(e.alive);
            assert_eq!(e.drive_owner.as_ref(), Some(&target));
            assert_eq!(e.hp, e.max_hp);
            let x = e.position.x;
            assert!(x <= SPAWN_BAND || x >= 1280.0 - SPAWN_BAND);
        }

        // Nothing left to reuse
        assert!(spawn_batch(&mut store, &target, 1, &mut rng, Bounds::default()).is_empty());
    }
}
