//! Hub Reconciliation
//!
//! The hub's canonical state and the per-connection state machine
//! (Connecting, Active, Disconnecting). Everything here is synchronous: one
//! task owns the [`Hub`] and feeds it [`HubEvent`]s in order, so no two
//! updates are ever merged concurrently.
//!
//! Handlers never touch sockets. They return [`Outbound`] messages which the
//! owning task hands to [`Hub::deliver`] (or delays, for deferred removals).

use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::rng::DeterministicRng;
use crate::core::vec2::Bounds;
use crate::hub::config::HubConfig;
use crate::hub::connection::{ConnectionId, ConnectionRecord};
use crate::network::protocol::{EntityMap, Hello, HubMessage, HubPayload, PeerMessage, StateUpdate};
use crate::world::entity::{EntityId, EntityKind};
use crate::world::pickup::{merge_claims, PickupTable};
use crate::world::score::Scoreboard;
use crate::world::spawn::{spawn_batch, SpawnRates};
use crate::world::store::{EntityStore, MergeOutcome};

// =============================================================================
// EVENTS AND OUTBOUND MESSAGES
// =============================================================================

/// Everything that can happen to the hub, in arrival order.
#[derive(Debug)]
pub enum HubEvent {
    /// A connection said hello.
    Connected {
        /// Identity and clock of the new peer.
        hello: Hello,
        /// Transport generation.
        conn_id: ConnectionId,
        /// Frames for this peer's writer task.
        outbox: mpsc::Sender<String>,
        /// Hub clock when the hello arrived.
        arrived_at: f64,
    },
    /// A message from an active connection.
    Inbound {
        /// Sender.
        peer: EntityId,
        /// Transport generation.
        conn_id: ConnectionId,
        /// Parsed message.
        message: PeerMessage,
        /// Hub clock when the message arrived.
        arrived_at: f64,
    },
    /// The transport closed.
    Disconnected {
        /// Peer that left.
        peer: EntityId,
        /// Transport generation that closed.
        conn_id: ConnectionId,
    },
    /// A deferred message whose delay has elapsed.
    Deliver(Outbound),
}

/// Who receives an outbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Recipients {
    /// Every connected peer.
    All,
    /// Every connected peer but one (the sender).
    AllExcept(EntityId),
    /// A single peer.
    Only(EntityId),
}

impl Recipients {
    /// Whether `peer` is addressed.
    pub fn includes(&self, peer: &EntityId) -> bool {
        match self {
            Recipients::All => true,
            Recipients::AllExcept(excluded) => excluded != peer,
            Recipients::Only(target) => target == peer,
        }
    }
}

/// A payload waiting to be fanned out.
#[derive(Clone, Debug, PartialEq)]
pub struct Outbound {
    /// Addressees.
    pub recipients: Recipients,
    /// Payload; the offset is attached per recipient.
    pub payload: HubPayload,
    /// Deliver after the removal delay instead of immediately.
    pub deferred: bool,
}

impl Outbound {
    /// To everyone.
    pub fn all(payload: HubPayload) -> Self {
        Self { recipients: Recipients::All, payload, deferred: false }
    }

    /// To everyone except `sender`.
    pub fn except(sender: &EntityId, payload: HubPayload) -> Self {
        Self { recipients: Recipients::AllExcept(sender.clone()), payload, deferred: false }
    }

    /// To one peer.
    pub fn only(peer: &EntityId, payload: HubPayload) -> Self {
        Self { recipients: Recipients::Only(peer.clone()), payload, deferred: false }
    }

    /// Mark for delayed delivery.
    pub fn deferred(mut self) -> Self {
        self.deferred = true;
        self
    }
}

// =============================================================================
// HUB
// =============================================================================

/// Canonical hub state.
pub struct Hub {
    pub(crate) store: EntityStore,
    pub(crate) connections: BTreeMap<EntityId, ConnectionRecord>,
    pub(crate) scores: Scoreboard,
    pub(crate) pickups: PickupTable,
    pub(crate) rng: DeterministicRng,
    pub(crate) rates: SpawnRates,
    pub(crate) bounds: Bounds,
    /// Seconds of silence before idle simulation starts.
    pub(crate) idle_after: f64,
    /// Hub clock of the most recent peer message.
    pub(crate) last_message_at: f64,
}

impl Hub {
    /// Fresh hub with a seeded pool of dead hostiles.
    pub fn new(config: &HubConfig) -> Self {
        let mut rng = match config.rng_seed {
            Some(seed) => DeterministicRng::new(seed),
            None => DeterministicRng::from_entropy(),
        };
        let mut store = EntityStore::new();
        store.seed_hostiles(config.hostile_pool, &mut rng);
        info!("Hub ready with {} pooled hostiles", config.hostile_pool);

        Self {
            store,
            connections: BTreeMap::new(),
            scores: Scoreboard::new(),
            pickups: PickupTable::new(),
            rng,
            rates: config.spawn_rates.clone(),
            bounds: config.bounds,
            idle_after: config.idle_after.as_secs_f64(),
            last_message_at: 0.0,
        }
    }

    /// The entity store.
    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    /// The scoreboard.
    pub fn scores(&self) -> &Scoreboard {
        &self.scores
    }

    /// The merged pickup table.
    pub fn pickups(&self) -> &PickupTable {
        &self.pickups
    }

    /// Number of connected peers.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Whether `peer` has an active connection.
    pub fn is_connected(&self, peer: &EntityId) -> bool {
        self.connections.contains_key(peer)
    }

    /// Difficulty multiplier of a connected peer.
    pub fn difficulty(&self, peer: &EntityId) -> Option<f64> {
        self.connections.get(peer).map(|c| c.difficulty)
    }

    /// Measured clock offset of a connected peer.
    pub fn clock_offset(&self, peer: &EntityId) -> Option<f64> {
        self.connections.get(peer).map(|c| c.offset())
    }

    /// Dispatch one event.
    pub fn handle(&mut self, event: HubEvent, now: f64) -> Vec<Outbound> {
        match event {
            HubEvent::Connected { hello, conn_id, outbox, arrived_at } => {
                self.connect(hello, conn_id, outbox, arrived_at)
            }
            HubEvent::Inbound { peer, conn_id, message, arrived_at } => match message {
                PeerMessage::Hello(hello) => {
                    self.refresh(&peer, conn_id, &hello, arrived_at);
                    Vec::new()
                }
                PeerMessage::Update(update) => self.apply_update(&peer, conn_id, &update, arrived_at),
            },
            HubEvent::Disconnected { peer, conn_id } => self.disconnect(&peer, conn_id),
            HubEvent::Deliver(mut outbound) => {
                debug!("Deferred {} due at {:.3}", outbound.payload.key(), now);
                outbound.deferred = false;
                vec![outbound]
            }
        }
    }

    // =========================================================================
    // Connecting
    // =========================================================================

    /// Register a peer that said hello.
    ///
    /// Creates or revives its avatar at the centre of the arena, spawns a
    /// batch of hostiles targeting it and announces the new entity set.
    /// A hello naming an existing non-avatar entity is refused; dropping
    /// its outbox closes the socket.
    pub fn connect(
        &mut self,
        hello: Hello,
        conn_id: ConnectionId,
        outbox: mpsc::Sender<String>,
        now: f64,
    ) -> Vec<Outbound> {
        let peer = hello.identifier.clone();
        if let Some(other) = self.store.get(&peer).filter(|e| !e.is_avatar()) {
            warn!("Rejected hello on {}: {} already names a {:?}", conn_id, peer, other.kind);
            return Vec::new();
        }
        self.last_message_at = now;

        let mut record = ConnectionRecord::new(conn_id, outbox, self.rates.multiplier, now);
        record.touch(hello.local_time, now);
        record.display_name = hello.display_name.clone();

        if let Some(previous) = self.connections.insert(peer.clone(), record) {
            warn!("{} reconnected on {}, replacing {}", peer, conn_id, previous.conn_id);
        }
        info!("Peer connected: {} ({})", peer, conn_id);

        if let Some(created) = self.store.revive_avatar(&peer, hello.display_name, self.bounds.center()) {
            debug!("Avatar {} {}", peer, if created { "created" } else { "revived" });
        }

        let count = self.rates.respawn_count(&mut self.rng);
        let spawned = spawn_batch(&mut self.store, &peer, count, &mut self.rng, self.bounds);

        let mut out = Vec::new();
        if !spawned.is_empty() {
            out.push(Outbound::all(HubPayload::Spawned(self.store.snapshot_of(&spawned))));
        }
        out.push(Outbound::all(HubPayload::Entities(self.store.alive_snapshot())));
        out.push(Outbound::only(&peer, HubPayload::Scores(self.scores.snapshot())));
        if !self.pickups.is_empty() {
            out.push(Outbound::only(&peer, HubPayload::Pickups(self.pickups.clone())));
        }
        out
    }

    // =========================================================================
    // Active
    // =========================================================================

    /// Hello on an active connection: refresh clock and name.
    pub fn refresh(&mut self, peer: &EntityId, conn_id: ConnectionId, hello: &Hello, now: f64) {
        let Some(record) = self.active_record(peer, conn_id) else {
            return;
        };
        record.touch(hello.local_time, now);
        if hello.display_name.is_some() {
            record.display_name = hello.display_name.clone();
        }
        self.last_message_at = now;
    }

    /// Apply a state update from an active peer.
    pub fn apply_update(
        &mut self,
        peer: &EntityId,
        conn_id: ConnectionId,
        update: &StateUpdate,
        now: f64,
    ) -> Vec<Outbound> {
        let Some(record) = self.active_record(peer, conn_id) else {
            return Vec::new();
        };
        record.touch(update.local_time, now);
        if update.display_name.is_some() {
            record.display_name = update.display_name.clone();
        }
        self.last_message_at = now;

        let mut out = Vec::new();

        // 1. Entity patches
        if !update.entities.is_empty() {
            self.merge_entities(peer, &update.entities, &mut out);
        }

        // 2. Kill reports
        if !update.kill_reports.is_empty() {
            self.apply_kills(peer, update.kill_reports.keys(), &mut out);
        }

        // 3. New effects, re-stamped with the sender's clock offset
        if !update.new_effects.is_empty() {
            let offset = self.clock_offset(peer).unwrap_or(0.0);
            let mut effects = update.new_effects.clone();
            for effect in effects.values_mut() {
                effect.clock_offset = offset;
            }
            out.push(Outbound::except(peer, HubPayload::NewEffects(effects)));
        }

        // 4. Pickup claims
        if !update.pickup_claims.is_empty() {
            merge_claims(&mut self.pickups, &update.pickup_claims);
            out.push(Outbound::except(peer, HubPayload::Pickups(self.pickups.clone())));
        }

        // 5. Score
        if let Some(score) = update.score {
            self.apply_score(peer, score, &mut out);
        }

        out
    }

    fn merge_entities(&mut self, peer: &EntityId, entities: &EntityMap, out: &mut Vec<Outbound>) {
        let mut accepted = EntityMap::new();
        let mut cascaded = Vec::new();
        let mut spawned = Vec::new();

        for (id, patch) in entities {
            let mut patch = patch.clone();
            if patch.target.take().is_some() {
                debug!("Stripped target from {}'s patch for {}", peer, id);
            }

            let before = self.store.get(id).map(|e| (e.kind, e.alive, e.drive_owner.clone()));
            match &before {
                Some((EntityKind::Hostile, _, owner)) if owner.as_ref() != Some(peer) => {
                    warn!("Ownership discrepancy: {} reported hostile {} driven by {:?}", peer, id, owner);
                    continue;
                }
                Some((EntityKind::Avatar, _, _)) if id != peer => {
                    warn!("Ownership discrepancy: {} reported avatar {}", peer, id);
                    continue;
                }
                _ => {}
            }

            let outcome = self.store.merge_entity(id, &patch);
            if outcome == MergeOutcome::Rejected {
                debug!("Ignored untyped update for unknown entity {} from {}", id, peer);
                continue;
            }

            let Some(now_alive) = self.store.get(id).map(|e| e.alive) else {
                continue;
            };
            match before {
                Some((EntityKind::Avatar, true, _)) if !now_alive => {
                    info!("Avatar {} died", id);
                    cascaded.extend(self.store.cascade_remove_driven(id));
                }
                Some((EntityKind::Avatar, false, _)) if now_alive => {
                    info!("Avatar {} respawned", id);
                    if let Some(record) = self.connections.get_mut(peer) {
                        record.difficulty = self.rates.multiplier;
                    }
                    let count = self.rates.respawn_count(&mut self.rng);
                    spawned.extend(spawn_batch(&mut self.store, peer, count, &mut self.rng, self.bounds));
                }
                Some((EntityKind::Hostile, true, _)) if !now_alive => {
                    // The merge parked it offstage and cleared the owner
                    if let Some(entity) = self.store.get(id) {
                        accepted.insert(id.clone(), entity.to_patch());
                    }
                    continue;
                }
                _ => {}
            }
            accepted.insert(id.clone(), patch);
        }

        if !accepted.is_empty() {
            out.push(Outbound::except(peer, HubPayload::Entities(accepted)));
        }
        if !cascaded.is_empty() {
            out.push(Outbound::all(HubPayload::Entities(self.store.snapshot_of(&cascaded))));
        }
        if !spawned.is_empty() {
            out.push(Outbound::all(HubPayload::Spawned(self.store.snapshot_of(&spawned))));
        }
    }

    fn apply_kills<'a, I>(&mut self, peer: &EntityId, kills: I, out: &mut Vec<Outbound>)
    where
        I: IntoIterator<Item = &'a EntityId>,
    {
        let mut killed = Vec::new();
        for id in kills {
            let Some(hostile) = self.store.get(id).filter(|e| e.is_hostile()) else {
                debug!("Kill report from {} for unknown hostile {}", peer, id);
                continue;
            };
            if let Some(owner) = hostile.drive_owner.as_ref().filter(|owner| *owner != peer) {
                info!("{} killed hostile {} driven by {}", peer, id, owner);
            }
            if self.store.mark_dead(id) {
                killed.push(id.clone());
            }
        }
        if !killed.is_empty() {
            out.push(Outbound::all(HubPayload::Entities(self.store.snapshot_of(&killed))));
        }
    }

    fn apply_score(&mut self, peer: &EntityId, score: u64, out: &mut Vec<Outbound>) {
        let Some(record) = self.connections.get(peer) else {
            return;
        };
        let name = record.display_name.clone().unwrap_or_else(|| peer.to_string());
        let difficulty = record.difficulty;
        let interval = self.rates.spawn_interval(difficulty);

        let outcome = self.scores.record(peer, &name, score, interval);

        if outcome.crossed {
            let next = self.rates.next_difficulty(difficulty);
            if let Some(record) = self.connections.get_mut(peer) {
                record.difficulty = next;
            }
            info!("{} crossed a {} point boundary at {}, difficulty {} -> {}", peer, interval, score, difficulty, next);

            let count = self.rates.score_count(&mut self.rng);
            let spawned = spawn_batch(&mut self.store, peer, count, &mut self.rng, self.bounds);
            if !spawned.is_empty() {
                out.push(Outbound::all(HubPayload::Spawned(self.store.snapshot_of(&spawned))));
            }
        }
        if outcome.new_best {
            out.push(Outbound::all(HubPayload::Scores(self.scores.snapshot())));
        }
    }

    fn active_record(&mut self, peer: &EntityId, conn_id: ConnectionId) -> Option<&mut ConnectionRecord> {
        match self.connections.get_mut(peer) {
            Some(record) if record.conn_id == conn_id => Some(record),
            _ => {
                debug!("Dropped message from stale connection {} of {}", conn_id, peer);
                None
            }
        }
    }

    // =========================================================================
    // Disconnecting
    // =========================================================================

    /// Tear down a closed connection.
    ///
    /// Ignored if `peer` has since reconnected on a newer transport.
    /// Otherwise the avatar and everything it drove are killed and one
    /// combined removal is emitted for delayed delivery.
    pub fn disconnect(&mut self, peer: &EntityId, conn_id: ConnectionId) -> Vec<Outbound> {
        match self.connections.get(peer) {
            Some(record) if record.conn_id == conn_id => {}
            _ => {
                debug!("Ignoring disconnect of superseded {} for {}", conn_id, peer);
                return Vec::new();
            }
        }
        self.connections.remove(peer);

        self.store.mark_dead(peer);
        let cascaded = self.store.cascade_remove_driven(peer);
        info!("Peer disconnected: {} ({} driven hostiles released)", peer, cascaded.len());

        let mut removed = Vec::with_capacity(cascaded.len() + 1);
        removed.push(peer.clone());
        removed.extend(cascaded);

        vec![Outbound::all(HubPayload::RemovedIdentifiers(removed)).deferred()]
    }

    // =========================================================================
    // Fan-out
    // =========================================================================

    /// Send an outbound message to its recipients.
    ///
    /// Each copy carries that recipient's clock offset. A failure to queue
    /// for one peer is logged and does not affect the others. Returns the
    /// number of peers the message was queued for.
    pub fn deliver(&self, outbound: &Outbound) -> usize {
        let mut delivered = 0;
        for (peer, record) in &self.connections {
            if !outbound.recipients.includes(peer) {
                continue;
            }
            let message = HubMessage::new(outbound.payload.clone(), record.offset());
            let frame = match message.to_json() {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("Failed to encode {} for {}: {}", outbound.payload.key(), peer, e);
                    continue;
                }
            };
            match record.send(frame) {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Failed to deliver {} to {}: {}", outbound.payload.key(), peer, e),
            }
        }
        delivered
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vec2::Vec2;
    use crate::world::entity::{EntityPatch, OFFSTAGE};

    fn test_config() -> HubConfig {
        HubConfig { rng_seed: Some(42), hostile_pool: 16, ..HubConfig::default() }
    }

    fn hello(id: &str, local_time: f64) -> Hello {
        Hello::new(id.into(), Some(format!("{id}-name")), local_time)
    }

    fn connect(hub: &mut Hub, id: &str, conn: u64, now: f64) -> (mpsc::Receiver<String>, Vec<Outbound>) {
        let (tx, rx) = mpsc::channel(64);
        let out = hub.connect(hello(id, now), ConnectionId(conn), tx, now);
        (rx, out)
    }

    fn deliver_all(hub: &Hub, out: &[Outbound]) {
        for o in out {
            hub.deliver(o);
        }
    }

    fn drain(rx: &mut mpsc::Receiver<String>) -> Vec<HubMessage> {
        let mut messages = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            messages.push(HubMessage::from_json(&frame).unwrap());
        }
        messages
    }

    #[tokio::test]
    async fn test_connect_spawns_hostiles_for_peer() {
        let mut hub = Hub::new(&test_config());
        let (mut rx, out) = connect(&mut hub, "p1", 1, 1_000.0);
        deliver_all(&hub, &out);

        let p1 = EntityId::from("p1");
        let driven = hub.store().driven_by(&p1);
        assert!((1..=3).contains(&driven.len()));

        let messages = drain(&mut rx);
        let entities = messages
            .iter()
            .find_map(|m| match &m.payload {
                HubPayload::Entities(map) => Some(map.clone()),
                _ => None,
            })
            .unwrap();

        assert!(entities.contains_key(&p1));
        for id in &driven {
            assert_eq!(entities[id].target, Some(Some(p1.clone())));
        }
        assert!(messages.iter().any(|m| matches!(m.payload, HubPayload::Scores(_))));
    }

    #[tokio::test]
    async fn test_kill_report_parks_hostile() {
        let mut hub = Hub::new(&test_config());
        let (_rx, _) = connect(&mut hub, "p1", 1, 10.0);
        let e7 = hub.store().driven_by(&"p1".into())[0].clone();

        let mut update = StateUpdate::default();
        update.kill_reports.insert(e7.clone(), 11.0);
        let out = hub.apply_update(&"p1".into(), ConnectionId(1), &update, 11.0);

        let entity = hub.store().get(&e7).unwrap();
        assert!(!entity.alive);
        assert!(entity.drive_owner.is_none());
        assert!(!hub.bounds.contains(entity.position));

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].recipients, Recipients::All);
        let HubPayload::Entities(map) = &out[0].payload else {
            panic!("Wrong payload");
        };
        assert_eq!(map[&e7].alive, Some(false));
        assert_eq!(map[&e7].target, Some(None));

        // Repeat delivery is a no-op
        let again = hub.apply_update(&"p1".into(), ConnectionId(1), &update, 11.5);
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_cascades_in_one_deferred_removal() {
        let mut hub = Hub::new(&test_config());
        let (_rx1, _) = connect(&mut hub, "p1", 1, 0.0);
        let (mut rx2, _) = connect(&mut hub, "p2", 2, 0.0);
        let p1 = EntityId::from("p1");
        let driven = hub.store().driven_by(&p1);

        let out = hub.disconnect(&p1, ConnectionId(1));
        assert_eq!(out.len(), 1);
        assert!(out[0].deferred);

        let HubPayload::RemovedIdentifiers(removed) = &out[0].payload else {
            panic!("Wrong payload");
        };
        assert_eq!(removed[0], p1);
        for id in &driven {
            assert!(removed.contains(id));
            let e = hub.store().get(id).unwrap();
            assert!(!e.alive);
            assert!(e.drive_owner.is_none());
        }
        assert!(!hub.is_connected(&p1));

        drain(&mut rx2);
        let delivered = hub.handle(HubEvent::Deliver(out[0].clone()), 0.1);
        assert!(!delivered[0].deferred);
        assert_eq!(hub.deliver(&delivered[0]), 1);
        assert_eq!(drain(&mut rx2).len(), 1);
    }

    #[tokio::test]
    async fn test_stale_disconnect_ignored() {
        let mut hub = Hub::new(&test_config());
        let (_old, _) = connect(&mut hub, "p1", 1, 0.0);
        let (_new, _) = connect(&mut hub, "p1", 2, 1.0);

        assert!(hub.disconnect(&"p1".into(), ConnectionId(1)).is_empty());
        assert!(hub.is_connected(&"p1".into()));
        assert!(hub.store().get(&"p1".into()).unwrap().alive);

        // Messages from the old socket are dropped too
        let update = StateUpdate { score: Some(10), ..Default::default() };
        hub.apply_update(&"p1".into(), ConnectionId(1), &update, 2.0);
        assert!(hub.scores().get(&"p1".into()).is_none());
    }

    #[tokio::test]
    async fn test_hello_naming_hostile_refused() {
        let mut hub = Hub::new(&test_config());
        let hostile = hub.store().dead_hostiles()[0].clone();

        let (tx, mut rx) = mpsc::channel(64);
        let out = hub.connect(Hello::new(hostile.clone(), None, 0.0), ConnectionId(1), tx, 0.0);

        assert!(out.is_empty());
        assert!(!hub.is_connected(&hostile));
        let e = hub.store().get(&hostile).unwrap();
        assert_eq!(e.kind, EntityKind::Hostile);
        assert!(!e.alive);
        assert!(hub.store().driven_by(&hostile).is_empty());
        // The outbox was dropped, so the writer sees a closed channel
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_score_crossing_steps_difficulty_once() {
        let mut hub = Hub::new(&test_config());
        let (_rx, _) = connect(&mut hub, "p1", 1, 0.0);
        let p1 = EntityId::from("p1");
        let driven_before = hub.store().driven_by(&p1).len();

        let report = |score| StateUpdate { score: Some(score), ..Default::default() };
        let first = hub.apply_update(&p1, ConnectionId(1), &report(2400), 1.0);
        assert!(!first.iter().any(|o| matches!(o.payload, HubPayload::Spawned(_))));
        assert_eq!(hub.difficulty(&p1), Some(1.0));

        let second = hub.apply_update(&p1, ConnectionId(1), &report(2600), 2.0);
        let spawns = second.iter().filter(|o| matches!(o.payload, HubPayload::Spawned(_))).count();
        assert_eq!(spawns, 1);
        assert_eq!(hub.difficulty(&p1), Some(1.25));

        let driven_after = hub.store().driven_by(&p1).len();
        assert!((driven_before + 1..=driven_before + 2).contains(&driven_after));
        assert!(second.iter().any(|o| matches!(o.payload, HubPayload::Scores(_))));
    }

    #[tokio::test]
    async fn test_effects_restamped_with_sender_offset() {
        let mut hub = Hub::new(&test_config());
        let (tx, _rx) = mpsc::channel(64);
        hub.connect(Hello::new("p1".into(), None, 95.0), ConnectionId(1), tx, 100.0);

        let mut update = StateUpdate::default();
        update.new_effects.insert(
            "fx".into(),
            crate::world::effect::Effect::new(
                crate::world::effect::EffectKind::Projectile,
                Vec2::ZERO,
                Vec2::RIGHT,
                10.0,
                95.0,
                2.0,
            ),
        );
        let out = hub.apply_update(&"p1".into(), ConnectionId(1), &update, 100.0);

        assert_eq!(out[0].recipients, Recipients::AllExcept("p1".into()));
        let HubPayload::NewEffects(effects) = &out[0].payload else {
            panic!("Wrong payload");
        };
        assert_eq!(effects["fx"].clock_offset, 5.0);
    }

    #[tokio::test]
    async fn test_foreign_hostile_update_rejected() {
        let mut hub = Hub::new(&test_config());
        let (_rx1, _) = connect(&mut hub, "p1", 1, 0.0);
        let (_rx2, _) = connect(&mut hub, "p2", 2, 0.0);
        let theirs = hub.store().driven_by(&"p1".into())[0].clone();
        let before = hub.store().get(&theirs).unwrap().clone();

        let mut update = StateUpdate::default();
        update.entities.insert(
            theirs.clone(),
            EntityPatch { position: Some(Vec2::new(1.0, 1.0)), target: Some(Some("p2".into())), ..Default::default() },
        );
        let out = hub.apply_update(&"p2".into(), ConnectionId(2), &update, 1.0);

        assert!(out.is_empty());
        assert_eq!(hub.store().get(&theirs).unwrap(), &before);
    }

    #[tokio::test]
    async fn test_avatar_death_cascades_and_respawn_resets() {
        let mut hub = Hub::new(&test_config());
        let (_rx, _) = connect(&mut hub, "p1", 1, 0.0);
        let p1 = EntityId::from("p1");
        let driven = hub.store().driven_by(&p1);

        // Bump difficulty first
        hub.connections.get_mut(&p1).unwrap().difficulty = 1.75;

        let mut died = StateUpdate::default();
        died.entities.insert(p1.clone(), EntityPatch { alive: Some(false), hp: Some(0), ..Default::default() });
        let out = hub.apply_update(&p1, ConnectionId(1), &died, 1.0);

        assert!(hub.store().driven_by(&p1).is_empty());
        let cascade = out
            .iter()
            .find(|o| o.recipients == Recipients::All)
            .unwrap();
        let HubPayload::Entities(map) = &cascade.payload else {
            panic!("Wrong payload");
        };
        for id in &driven {
            assert_eq!(map[id].alive, Some(false));
        }

        let mut alive = StateUpdate::default();
        alive.entities.insert(p1.clone(), EntityPatch { alive: Some(true), hp: Some(100), ..Default::default() });
        let out = hub.apply_update(&p1, ConnectionId(1), &alive, 2.0);

        assert_eq!(hub.difficulty(&p1), Some(1.0));
        assert!(!hub.store().driven_by(&p1).is_empty());
        assert!(out.iter().any(|o| matches!(o.payload, HubPayload::Spawned(_))));
    }

    #[tokio::test]
    async fn test_owner_reported_hostile_death_broadcasts_parked_state() {
        let mut hub = Hub::new(&test_config());
        let (_rx, _) = connect(&mut hub, "p1", 1, 0.0);
        let mine = hub.store().driven_by(&"p1".into())[0].clone();

        let mut update = StateUpdate::default();
        update.entities.insert(mine.clone(), EntityPatch { hp: Some(0), ..Default::default() });
        let out = hub.apply_update(&"p1".into(), ConnectionId(1), &update, 1.0);

        let HubPayload::Entities(map) = &out[0].payload else {
            panic!("Wrong payload");
        };
        assert_eq!(map[&mine].position, Some(OFFSTAGE));
        assert_eq!(map[&mine].target, Some(None));
    }

    #[tokio::test]
    async fn test_fan_out_survives_dead_recipient() {
        let mut hub = Hub::new(&test_config());
        let (rx1, _) = connect(&mut hub, "p1", 1, 0.0);
        let (mut rx2, _) = connect(&mut hub, "p2", 2, 0.0);
        drop(rx1);
        drain(&mut rx2);

        let delivered = hub.deliver(&Outbound::all(HubPayload::RemovedIdentifiers(vec![])));
        assert_eq!(delivered, 1);
        assert_eq!(drain(&mut rx2).len(), 1);
    }

    #[tokio::test]
    async fn test_offset_attached_per_recipient() {
        let mut hub = Hub::new(&test_config());
        let (tx1, mut rx1) = mpsc::channel(64);
        let (tx2, mut rx2) = mpsc::channel(64);
        hub.connect(Hello::new("p1".into(), None, 90.0), ConnectionId(1), tx1, 100.0);
        hub.connect(Hello::new("p2".into(), None, 103.0), ConnectionId(2), tx2, 100.0);
        drain(&mut rx1);
        drain(&mut rx2);

        hub.deliver(&Outbound::all(HubPayload::RemovedIdentifiers(vec![])));
        assert_eq!(drain(&mut rx1)[0].offset, 10.0);
        assert_eq!(drain(&mut rx2)[0].offset, -3.0);
    }

    #[tokio::test]
    async fn test_pickup_claims_relayed() {
        let mut hub = Hub::new(&test_config());
        let (_rx, _) = connect(&mut hub, "p1", 1, 0.0);

        let mut update = StateUpdate::default();
        let mut claimed = crate::world::pickup::Pickup::new(crate::world::pickup::PickupKind::Health, Vec2::new(5.0, 5.0));
        claimed.complete = true;
        update.pickup_claims.insert("h1".into(), claimed);
        let out = hub.apply_update(&"p1".into(), ConnectionId(1), &update, 1.0);

        assert!(hub.pickups()["h1"].complete);
        assert_eq!(out[0].recipients, Recipients::AllExcept("p1".into()));
    }
}
