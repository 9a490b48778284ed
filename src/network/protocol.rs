//! Protocol Messages
//!
//! Wire format between peers and the hub: one JSON object per WebSocket text
//! frame, camelCase keys.
//!
//! Peer messages are classified by which keys are present. Hub messages carry
//! exactly one payload key plus the recipient's measured clock `offset`.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};
use serde_json::Value;
use thiserror::Error;

use crate::world::effect::Effect;
use crate::world::entity::{EntityId, EntityPatch};
use crate::world::pickup::PickupTable;
use crate::world::score::ScoreEntry;

/// Keys that make a peer message a state update rather than a hello.
const UPDATE_KEYS: [&str; 6] = ["entities", "newEffects", "killReports", "pickupClaims", "score", "scoreTime"];

/// Entity patches keyed by identifier.
pub type EntityMap = BTreeMap<EntityId, EntityPatch>;

/// Effects keyed by effect identifier.
pub type EffectMap = BTreeMap<String, Effect>;

/// Protocol violations. The connection that sent them is closed.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Not valid JSON at all.
    #[error("malformed JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Valid JSON, but not an object.
    #[error("payload is not a JSON object")]
    NotAnObject,

    /// Hello without an identifier.
    #[error("message carries no identifier")]
    MissingIdentifier,

    /// Object whose keys or values match no message shape.
    #[error("unrecognised payload shape: {0}")]
    UnknownShape(String),
}

// =============================================================================
// PEER -> HUB MESSAGES
// =============================================================================

/// First message on every connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Hello {
    /// Durable peer identifier, also the avatar's entity id.
    pub identifier: EntityId,
    /// Name for the scoreboard.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Sender's clock at send time (seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_time: Option<f64>,
}

impl Hello {
    /// Hello stamped with the given clock reading.
    pub fn new(identifier: EntityId, display_name: Option<String>, local_time: f64) -> Self {
        Self { identifier, display_name, local_time: Some(local_time) }
    }
}

/// Partial state sent by a peer each frame. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StateUpdate {
    /// Sender identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<EntityId>,
    /// Sender display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Sender's clock at send time (seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_time: Option<f64>,
    /// Drive-set patches
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub entities: EntityMap,
    /// Effects created since the last update
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub new_effects: EffectMap,
    /// Killed hostiles and when they died (sender clock)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub kill_reports: BTreeMap<EntityId, f64>,
    /// Pickups the sender collected
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub pickup_claims: PickupTable,
    /// Running score
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u64>,
    /// When the score was reached (sender clock)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_time: Option<f64>,
}

impl StateUpdate {
    /// True when nothing but identity/clock fields are set.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
            && self.new_effects.is_empty()
            && self.kill_reports.is_empty()
            && self.pickup_claims.is_empty()
            && self.score.is_none()
    }
}

/// Any message a peer may send.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerMessage {
    /// Identity and clock only.
    Hello(Hello),
    /// State update (may also carry identity and clock).
    Update(StateUpdate),
}

impl PeerMessage {
    /// Parse and classify one text frame.
    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(s)?;
        let object = value.as_object().ok_or(ProtocolError::NotAnObject)?;

        if UPDATE_KEYS.iter().any(|key| object.contains_key(*key)) {
            return serde_json::from_value(value)
                .map(PeerMessage::Update)
                .map_err(|e| ProtocolError::UnknownShape(e.to_string()));
        }
        if !object.contains_key("identifier") {
            return Err(ProtocolError::MissingIdentifier);
        }
        let hello: Hello = serde_json::from_value(value).map_err(|e| ProtocolError::UnknownShape(e.to_string()))?;
        if is_blank(&hello.identifier) {
            return Err(ProtocolError::MissingIdentifier);
        }
        Ok(PeerMessage::Hello(hello))
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        match self {
            PeerMessage::Hello(hello) => serde_json::to_string(hello),
            PeerMessage::Update(update) => serde_json::to_string(update),
        }
    }

    /// Identity carried by the message, if any.
    ///
    /// A connection may open with a state update instead of a bare hello as
    /// long as it names its sender. Blank identifiers name nobody.
    pub fn hello(&self) -> Option<Hello> {
        let hello = match self {
            PeerMessage::Hello(hello) => hello.clone(),
            PeerMessage::Update(update) => Hello {
                identifier: update.identifier.clone()?,
                display_name: update.display_name.clone(),
                local_time: update.local_time,
            },
        };
        (!is_blank(&hello.identifier)).then_some(hello)
    }
}

fn is_blank(identifier: &EntityId) -> bool {
    identifier.as_str().trim().is_empty()
}

// =============================================================================
// HUB -> PEER MESSAGES
// =============================================================================

/// Payload of a hub message. Serialized as a single-key object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HubPayload {
    /// Merged entity state.
    Entities(EntityMap),
    /// Hostiles that just came alive.
    Spawned(EntityMap),
    /// Entities that left play, combined into one list.
    RemovedIdentifiers(Vec<EntityId>),
    /// Scoreboard snapshot.
    Scores(BTreeMap<EntityId, ScoreEntry>),
    /// Effects re-stamped with their creator's clock offset.
    NewEffects(EffectMap),
    /// Full pickup table.
    Pickups(PickupTable),
}

impl HubPayload {
    /// Wire key of this payload.
    pub fn key(&self) -> &'static str {
        match self {
            HubPayload::Entities(_) => "entities",
            HubPayload::Spawned(_) => "spawned",
            HubPayload::RemovedIdentifiers(_) => "removedIdentifiers",
            HubPayload::Scores(_) => "scores",
            HubPayload::NewEffects(_) => "newEffects",
            HubPayload::Pickups(_) => "pickups",
        }
    }
}

/// A hub message addressed to one peer.
#[derive(Debug, Clone, PartialEq)]
pub struct HubMessage {
    /// What is being sent.
    pub payload: HubPayload,
    /// The recipient's measured clock offset (hub minus peer, seconds).
    pub offset: f64,
}

impl HubMessage {
    /// Address a payload to a peer with the given offset.
    pub fn new(payload: HubPayload, offset: f64) -> Self {
        Self { payload, offset }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        let mut value = serde_json::to_value(&self.payload)?;
        let object = value.as_object_mut().ok_or(ProtocolError::NotAnObject)?;
        object.insert("offset".to_string(), Value::from(self.offset));
        Ok(value.to_string())
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        let mut value: Value = serde_json::from_str(s)?;
        let object = value.as_object_mut().ok_or(ProtocolError::NotAnObject)?;
        let offset = object.remove("offset").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let payload = serde_json::from_value(value).map_err(|e| ProtocolError::UnknownShape(e.to_string()))?;
        Ok(Self { payload, offset })
    }
}

// =============================================================================
// TESTS
// =============================================================================
