//! Network Layer
//!
//! WebSocket transport between peers and the hub. Sockets never touch world
//! state directly: the hub side posts events to the reconciliation loop and
//! the peer side queues messages for the frame loop.

pub mod protocol;
pub mod server;
pub mod client;

pub use protocol::{Hello, HubMessage, HubPayload, PeerMessage, ProtocolError, StateUpdate};
pub use server::{HubError, HubServer};
pub use client::{PeerClient, PeerError};
