//! WebSocket Peer Client
//!
//! Connects a peer to the hub. A reader task parses hub frames into a queue
//! that the frame loop drains once per frame; a writer task drains the
//! outgoing queue onto the socket.

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error, info, warn};

use crate::network::protocol::{Hello, HubMessage, StateUpdate};
use crate::peer::view::PeerView;

/// Hub messages buffered between frames.
pub const INCOMING_CAPACITY: usize = 1024;

/// Updates buffered for the writer.
pub const OUTGOING_CAPACITY: usize = 100;

/// Peer client errors.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Could not reach the hub.
    #[error("Failed to connect: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),

    /// The connection is gone.
    #[error("Connection closed")]
    Closed,

    /// The writer is not keeping up.
    #[error("Outgoing queue full")]
    QueueFull,

    /// Message could not be encoded.
    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A live connection to the hub.
pub struct PeerClient {
    outgoing: mpsc::Sender<String>,
    incoming: mpsc::Receiver<HubMessage>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl PeerClient {
    /// Connect to `url` and introduce this peer with `hello`.
    pub async fn connect(url: &str, hello: &Hello) -> Result<Self, PeerError> {
        info!("Connecting to {}...", url);
        let (ws_stream, _) = connect_async(url).await?;
        let (mut write, mut read) = ws_stream.split();

        write.send(Message::Text(serde_json::to_string(hello)?)).await?;
        info!("Connected as {}", hello.identifier);

        let (incoming_tx, incoming) = mpsc::channel::<HubMessage>(INCOMING_CAPACITY);
        let (outgoing, mut outgoing_rx) = mpsc::channel::<String>(OUTGOING_CAPACITY);

        // Spawn reader task
        let reader = tokio::spawn(async move {
            while let Some(msg_result) = read.next().await {
                match msg_result {
                    Ok(Message::Text(text)) => match HubMessage::from_json(&text) {
                        Ok(message) => {
                            debug!("Received {}", message.payload.key());
                            if incoming_tx.send(message).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("Failed to parse hub message: {} - {}", e, text);
                        }
                    },
                    Ok(Message::Close(_)) => {
                        info!("Hub closed connection");
                        break;
                    }
                    Err(e) => {
                        error!("WebSocket read error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
            debug!("Reader task ended");
        });

        // Spawn writer task
        let writer = tokio::spawn(async move {
            while let Some(json) = outgoing_rx.recv().await {
                if let Err(e) = write.send(Message::Text(json)).await {
                    error!("Failed to send message: {}", e);
                    break;
                }
            }
            let _ = write.close().await;
            debug!("Writer task ended");
        });

        Ok(Self { outgoing, incoming, reader, writer })
    }

    /// Queue an update without waiting.
    pub fn send(&self, update: &StateUpdate) -> Result<(), PeerError> {
        let json = serde_json::to_string(update)?;
        self.outgoing.try_send(json).map_err(|e| match e {
            TrySendError::Full(_) => PeerError::QueueFull,
            TrySendError::Closed(_) => PeerError::Closed,
        })
    }

    /// Merge every queued hub message into `view`. Returns how many.
    pub fn drain_into(&mut self, view: &mut PeerView, now: f64) -> usize {
        let mut merged = 0;
        while let Ok(message) = self.incoming.try_recv() {
            view.apply(message, now);
            merged += 1;
        }
        merged
    }

    /// Wait for the next hub message. `None` once the connection is gone.
    pub async fn recv(&mut self) -> Option<HubMessage> {
        self.incoming.recv().await
    }

    /// Whether both directions are still running.
    pub fn is_connected(&self) -> bool {
        !self.reader.is_finished() && !self.writer.is_finished()
    }

    /// Close the socket and stop both tasks.
    pub async fn close(self) {
        let Self { outgoing, reader, writer, .. } = self;
        drop(outgoing);
        let _ = writer.await;
        reader.abort();
    }
}
