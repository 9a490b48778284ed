//! Connection Records
//!
//! Per-peer bookkeeping kept by the hub while a peer is connected.

use std::fmt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::core::clock::ClockService;

/// Generation number of a transport connection.
///
/// A peer that reconnects under the same identifier gets a new id, so a
/// late disconnect from the old socket can be told apart.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// A connected peer.
#[derive(Debug)]
pub struct ConnectionRecord {
    /// Transport generation.
    pub conn_id: ConnectionId,
    /// Latest display name.
    pub display_name: Option<String>,
    /// Serialized frames waiting for the writer task.
    outbox: mpsc::Sender<String>,
    /// Measured clock offset.
    pub clock: ClockService,
    /// Adaptive difficulty multiplier.
    pub difficulty: f64,
    /// Hub time of the last message from this peer (seconds).
    pub last_seen: f64,
}

impl ConnectionRecord {
    /// Record for a peer that just said hello.
    pub fn new(conn_id: ConnectionId, outbox: mpsc::Sender<String>, difficulty: f64, now: f64) -> Self {
        Self {
            conn_id,
            display_name: None,
            outbox,
            clock: ClockService::new(),
            difficulty,
            last_seen: now,
        }
    }

    /// Note activity and refresh the clock offset if the message was stamped.
    pub fn touch(&mut self, local_time: Option<f64>, arrived_at: f64) {
        self.last_seen = arrived_at;
        if let Some(declared) = local_time {
            self.clock.observe(declared, arrived_at);
        }
    }

    /// Measured clock offset (hub minus peer).
    #[inline]
    pub fn offset(&self) -> f64 {
        self.clock.offset()
    }

    /// Silent for longer than `window` seconds.
    pub fn is_silent(&self, now: f64, window: f64) -> bool {
        now - self.last_seen > window
    }

    /// Queue a frame without waiting.
    pub fn send(&self, frame: String) -> Result<(), TrySendError<String>> {
        self.outbox.try_send(frame)
    }

    /// Whether the writer task has gone away.
    pub fn is_closed(&self) -> bool {
        self.outbox.is_closed()
    }
}
