//! Idle Simulation Tick
//!
//! Low-frequency hub-side simulation for hostiles nobody is driving, so the
//! world never stalls when peers go quiet. Runs on the reconciliation task,
//! between messages, never concurrently with them.

use std::collections::BTreeSet;
use tracing::debug;

use crate::core::vec2::Vec2;
use crate::hub::reconcile::{Hub, Outbound};
use crate::network::protocol::HubPayload;
use crate::world::entity::EntityId;

/// Wander speeds picked per axis each tick.
pub const WANDER_SPEEDS: [f32; 3] = [-200.0, 0.0, 200.0];

impl Hub {
    /// Run one idle tick `dt` seconds after the previous one.
    ///
    /// 1. Hostiles whose owner is gone or dead lose their owner.
    /// 2. If no peer has spoken for the idle window, every live hostile
    ///    without an active driver moves and picks a new wander velocity.
    pub fn idle_tick(&mut self, now: f64, dt: f32) -> Vec<Outbound> {
        let mut touched: Vec<EntityId> = Vec::new();

        // 1. Reap orphans
        let live: BTreeSet<EntityId> = self
            .connections
            .keys()
            .filter(|id| self.store.get(id).is_some_and(|avatar| avatar.alive))
            .cloned()
            .collect();
        let reaped = self.store.reap_orphans(|owner| live.contains(owner));
        if !reaped.is_empty() {
            debug!("Reaped {} orphaned hostiles", reaped.len());
        }
        touched.extend(reaped);

        // 2. Advance undriven hostiles
        if now - self.last_message_at > self.idle_after {
            let undriven: Vec<EntityId> = self
                .store
                .iter()
                .filter(|(_, e)| e.is_hostile() && e.alive)
                .filter(|(_, e)| match &e.drive_owner {
                    None => true,
                    Some(owner) => self
                        .connections
                        .get(owner)
                        .map_or(true, |record| record.is_silent(now, self.idle_after)),
                })
                .map(|(id, _)| id.clone())
                .collect();

            for id in &undriven {
                let x = self.rng.choose(&WANDER_SPEEDS).copied().unwrap_or(0.0);
                let y = self.rng.choose(&WANDER_SPEEDS).copied().unwrap_or(0.0);
                if let Some(hostile) = self.store.get_mut(id) {
                    hostile.integrate(dt, self.bounds);
                    hostile.velocity = Vec2::new(x, y);
                }
            }
            touched.extend(undriven);
        }

        if touched.is_empty() {
            return Vec::new();
        }
        vec![Outbound::all(HubPayload::Entities(self.store.snapshot_of(&touched)))]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::config::HubConfig;
    use crate::hub::connection::ConnectionId;
    use crate::network::protocol::{Hello, StateUpdate};
    use crate::world::entity::{EntityKind, EntityPatch};
    use tokio::sync::mpsc;

    fn hub() -> Hub {
        Hub::new(&HubConfig { rng_seed: Some(8), hostile_pool: 8, ..HubConfig::default() })
    }

    #[tokio::test]
    async fn test_no_owner_survives_dead_avatar() {
        let mut hub = hub();
        let (tx, _rx) = mpsc::channel(64);
        hub.connect(Hello::new("p1".into(), None, 0.0), ConnectionId(1), tx, 0.0);
        let p1 = EntityId::from("p1");
        let driven = hub.store().driven_by(&p1);
        assert!(!driven.is_empty());

        // Avatar killed behind the hub's back, without a cascade
        hub.store.get_mut(&p1).unwrap().alive = false;

        let out = hub.idle_tick(0.05, 0.1);
        assert!(hub.store().driven_by(&p1).is_empty());
        let HubPayload::Entities(map) = &out[0].payload else {
            panic!("Wrong payload");
        };
        for id in &driven {
            assert_eq!(map[id].alive, Some(false));
        }
    }

    #[tokio::test]
    async fn test_quiet_hub_moves_unowned_hostiles() {
        let mut hub = hub();
        let loose = hub.store().dead_hostiles()[0].clone();
        hub.store.merge_entity(&loose, &EntityPatch { alive: Some(true), ..Default::default() });
        hub.store.get_mut(&loose).unwrap().position = Vec2::new(640.0, 360.0);
        hub.store.get_mut(&loose).unwrap().velocity = Vec2::new(200.0, 0.0);

        let out = hub.idle_tick(10.0, 0.1);

        let moved = hub.store().get(&loose).unwrap();
        assert_eq!(moved.position, Vec2::new(660.0, 360.0));
        assert!(WANDER_SPEEDS.contains(&moved.velocity.x));
        assert!(WANDER_SPEEDS.contains(&moved.velocity.y));
        assert_eq!(out.len(), 1);
    }

    #[tokio::test]
    async fn test_busy_hub_leaves_driven_hostiles_alone() {
        let mut hub = hub();
        let (tx, _rx) = mpsc::channel(64);
        hub.connect(Hello::new("p1".into(), None, 0.0), ConnectionId(1), tx, 100.0);
        let driven = hub.store().driven_by(&"p1".into())[0].clone();
        let before = hub.store().get(&driven).unwrap().position;

        hub.apply_update(&"p1".into(), ConnectionId(1), &StateUpdate::default(), 100.0);
        assert!(hub.idle_tick(100.1, 0.1).is_empty());
        assert_eq!(hub.store().get(&driven).unwrap().position, before);

        // Owner goes silent past the idle window: the hub takes over
        hub.idle_tick(101.0, 0.1);
        let after = hub.store().get(&driven).unwrap();
        assert!(after.alive);
        assert_eq!(after.kind, EntityKind::Hostile);
        assert_eq!(after.drive_owner, Some("p1".into()));
    }
}
