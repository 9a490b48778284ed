//! WebSocket Hub Server
//!
//! Accepts peer connections and runs the single reconciliation loop.
//!
//! Each connection gets a reader task (this module) and a writer task fed by
//! a bounded outbox. Readers never touch hub state; they parse frames and
//! post [`HubEvent`]s into one bounded queue. The reconciliation task owns
//! the [`Hub`], drains that queue and runs the idle tick as another arm of
//! the same `select!`, so messages and ticks are ordered, never parallel.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error, info, instrument, warn};

use crate::core::clock::now_secs;
use crate::hub::config::HubConfig;
use crate::hub::connection::ConnectionId;
use crate::hub::reconcile::{Hub, HubEvent, Outbound};
use crate::network::protocol::{PeerMessage, ProtocolError, StateUpdate, Hello};

/// Hub server errors.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// Failed to bind or accept.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// No hello within the allowed window.
    #[error("No hello within {0:?}")]
    HelloTimeout(Duration),

    /// Peer broke the protocol.
    #[error("Protocol violation: {0}")]
    Protocol(#[from] ProtocolError),

    /// Transport closed before the hello.
    #[error("Connection closed before hello")]
    ClosedBeforeHello,

    /// The reconciliation loop is gone.
    #[error("Hub stopped")]
    HubStopped,
}

/// The hub server.
pub struct HubServer {
    /// Server configuration.
    config: HubConfig,
    /// Open connections.
    active: Arc<AtomicUsize>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl HubServer {
    /// Create a new hub server.
    pub fn new(config: HubConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            active: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
        }
    }

    /// Bind the configured address and serve until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), HubError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Hub listening on {}", self.config.bind_addr);
        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), HubError> {
        let (event_tx, event_rx) = mpsc::channel(self.config.event_capacity);
        let hub = Hub::new(&self.config);

        let reconcile_handle = tokio::spawn(run_reconciliation(
            hub,
            event_rx,
            event_tx.clone(),
            self.config.clone(),
            self.shutdown_tx.subscribe(),
        ));

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut next_conn = 0u64;

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.active.load(Ordering::Relaxed) >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            next_conn += 1;
                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr, ConnectionId(next_conn), event_tx.clone());
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        if let Err(e) = reconcile_handle.await {
            error!("Reconciliation task failed: {}", e);
        }

        Ok(())
    }

    /// Handle a new connection on its own task.
    fn handle_connection(
        &self,
        stream: TcpStream,
        addr: SocketAddr,
        conn_id: ConnectionId,
        events: mpsc::Sender<HubEvent>,
    ) {
        let config = self.config.clone();
        let active = self.active.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();

        active.fetch_add(1, Ordering::Relaxed);
        tokio::spawn(async move {
            match connection_task(stream, addr, conn_id, events, config, shutdown_rx).await {
                Ok(()) => debug!("Connection {} from {} finished", conn_id, addr),
                Err(e) => warn!("Connection {} from {} closed: {}", conn_id, addr, e),
            }
            active.fetch_sub(1, Ordering::Relaxed);
        });
    }

    /// Signal the accept loop, the reconciliation loop and every connection.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get open connection count.
    pub fn connection_count(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }
}

// =============================================================================
// CONNECTION TASK
// =============================================================================

type PeerReader = SplitStream<WebSocketStream<TcpStream>>;

async fn connection_task(
    stream: TcpStream,
    addr: SocketAddr,
    conn_id: ConnectionId,
    events: mpsc::Sender<HubEvent>,
    config: HubConfig,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), HubError> {
    let ws_stream = accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Connecting: the first frame must name the peer
    let (hello, opening_update, arrived_at) = match await_hello(&mut ws_receiver, config.hello_timeout).await {
        Ok(opened) => opened,
        Err(e) => {
            let _ = ws_sender.send(Message::Close(None)).await;
            return Err(e);
        }
    };
    let peer = hello.identifier.clone();
    info!("{} identified as {} on {}", addr, peer, conn_id);

    let (outbox_tx, mut outbox_rx) = mpsc::channel::<String>(config.outbox_capacity);
    events
        .send(HubEvent::Connected { hello, conn_id, outbox: outbox_tx, arrived_at })
        .await
        .map_err(|_| HubError::HubStopped)?;
    if let Some(update) = opening_update {
        let message = PeerMessage::Update(update);
        events
            .send(HubEvent::Inbound { peer: peer.clone(), conn_id, message, arrived_at })
            .await
            .map_err(|_| HubError::HubStopped)?;
    }

    // Spawn frame writer task
    let writer_task = tokio::spawn(async move {
        while let Some(frame) = outbox_rx.recv().await {
            if ws_sender.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    // Active: forward every frame to the reconciliation loop
    let mut result = Ok(());
    loop {
        tokio::select! {
            msg = ws_receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let arrived_at = now_secs();
                        debug!("Received from {}: {}", peer, text);
                        let message = match PeerMessage::from_json(&text) {
                            Ok(m) => m,
                            Err(e) => {
                                warn!("Protocol violation from {}: {}", peer, e);
                                result = Err(e.into());
                                break;
                            }
                        };
                        let event = HubEvent::Inbound { peer: peer.clone(), conn_id, message, arrived_at };
                        if events.send(event).await.is_err() {
                            result = Err(HubError::HubStopped);
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("{} closed the connection", peer);
                        break;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        warn!("Protocol violation from {}: binary frame", peer);
                        break;
                    }
                    Some(Ok(_)) => {
                        // Ping/pong are answered by tungstenite
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error from {}: {}", peer, e);
                        break;
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                writer_task.abort();
                return Ok(());
            }
        }
    }

    // Disconnecting: the hub drops the outbox, which ends the writer
    let _ = events.send(HubEvent::Disconnected { peer, conn_id }).await;
    result
}

/// Wait for the opening frame and extract the peer's identity.
async fn await_hello(
    reader: &mut PeerReader,
    window: Duration,
) -> Result<(Hello, Option<StateUpdate>, f64), HubError> {
    let frame = timeout(window, reader.next())
        .await
        .map_err(|_| HubError::HelloTimeout(window))?;

    let text = match frame {
        Some(Ok(Message::Text(text))) => text,
        Some(Ok(_)) => return Err(ProtocolError::MissingIdentifier.into()),
        Some(Err(e)) => return Err(e.into()),
        None => return Err(HubError::ClosedBeforeHello),
    };
    let arrived_at = now_secs();

    let message = PeerMessage::from_json(&text)?;
    let hello = message.hello().ok_or(ProtocolError::MissingIdentifier)?;
    let opening_update = match message {
        PeerMessage::Update(update) if !update.is_empty() => Some(update),
        _ => None,
    };
    Ok((hello, opening_update, arrived_at))
}

// =============================================================================
// RECONCILIATION LOOP
// =============================================================================

async fn run_reconciliation(
    mut hub: Hub,
    mut events: mpsc::Receiver<HubEvent>,
    loopback: mpsc::Sender<HubEvent>,
    config: HubConfig,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut ticker = interval(config.idle_tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let dt = config.idle_tick_interval.as_secs_f32();

    loop {
        tokio::select! {
            Some(event) = events.recv() => {
                let outbound = hub.handle(event, now_secs());
                dispatch(&hub, outbound, &loopback, config.removal_delay);
            }
            _ = ticker.tick() => {
                let outbound = hub.idle_tick(now_secs(), dt);
                dispatch(&hub, outbound, &loopback, config.removal_delay);
            }
            _ = shutdown_rx.recv() => {
                info!("Reconciliation loop stopping with {} peers connected", hub.connection_count());
                break;
            }
        }
    }
}

/// Deliver immediate messages now; post deferred ones back after `delay`.
fn dispatch(hub: &Hub, outbound: Vec<Outbound>, loopback: &mpsc::Sender<HubEvent>, delay: Duration) {
    for message in outbound {
        if message.deferred {
            let loopback = loopback.clone();
            tokio::spawn(async move {
                sleep(delay).await;
                let _ = loopback.send(HubEvent::Deliver(message)).await;
            });
        } else {
            hub.deliver(&message);
        }
    }
}
