//! Hub Logic
//!
//! The authoritative side. Owns the entity store and every connection
//! record, merges peer updates, decides spawns and fans out results.
//!
//! - `config`: Hub configuration and environment overrides
//! - `connection`: Per-peer connection records
//! - `reconcile`: Connecting / Active / Disconnecting state machine
//! - `idle`: Hub-side simulation of undriven hostiles

pub mod config;
pub mod connection;
pub mod reconcile;
pub mod idle;

pub use config::{ConfigError, HubConfig};
pub use connection::{ConnectionId, ConnectionRecord};
pub use reconcile::{Hub, HubEvent, Outbound, Recipients};
