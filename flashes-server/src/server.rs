//! WebSocket accept loop and signaling handshake.
//!
//! One task per connection plus a writer task per client, with the session
//! state behind a single mutex. Clients that join after both slots are
//! filled get no acknowledgement; the signaling protocol has no rejection
//! frame, silence is the rejection.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::protocol::{ClientMessage, ServerMessage};
use crate::session::{Client, GameSession};

type SharedState = Arc<Mutex<GameSession>>;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".parse().unwrap(),
        }
    }
}

/// Signaling server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Could not bind or query the listening socket.
    #[error("failed to bind: {0}")]
    Bind(#[from] std::io::Error),
}

/// The signaling server. Hosts exactly one session.
pub struct SignalServer {
    listener: TcpListener,
    state: SharedState,
}

impl SignalServer {
    /// Bind the listening socket. The session starts empty on the default
    /// map.
    pub async fn bind(config: &ServerConfig) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        Ok(Self {
            listener,
            state: Arc::new(Mutex::new(GameSession::default())),
        })
    }

    /// The bound address. Useful when binding port 0.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections forever.
    pub async fn run(self) -> Result<(), ServerError> {
        info!("signaling server listening on {}", self.local_addr()?);
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    debug!("new connection from {addr}");
                    tokio::spawn(handle_connection(stream, addr, self.state.clone()));
                }
                Err(e) => error!("accept error: {e}"),
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, addr: SocketAddr, state: SharedState) {
    let socket = match accept_async(stream).await {
        Ok(socket) => socket,
        Err(e) => {
            warn!("websocket handshake failed for {addr}: {e}");
            return;
        }
    };
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    // identity is assigned when the join announcement arrives, not on
    // connect, and is needed afterwards to free the slot
    let mut joined_id: Option<String> = None;

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                handle_frame(&text, addr, &tx, &state, &mut joined_id).await
            }
            Ok(Message::Close(_)) => {
                debug!("{addr} closed the connection");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("connection error for {addr}: {e}");
                break;
            }
        }
    }

    if let Some(id) = joined_id {
        let mut session = state.lock().await;
        if let Some(role) = session.drop_client(&id) {
            info!(%id, ?role, "client left, slot freed");
        }
    }
    writer.abort();
}

async fn handle_frame(
    text: &str,
    addr: SocketAddr,
    tx: &mpsc::UnboundedSender<String>,
    state: &SharedState,
    joined_id: &mut Option<String>,
) {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("malformed frame from {addr}: {e}");
            return;
        }
    };
    let ClientMessage::ClientJoined { peer_addr } = msg;
    if joined_id.is_some() {
        warn!("repeated join announcement from {addr}, ignoring");
        return;
    }

    // a client that advertises a dialable address uses it as its identity,
    // so the remote side can reach it directly
    let id = peer_addr.unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut session = state.lock().await;
    let role = match session.assign(Client {
        id: id.clone(),
        sender: tx.clone(),
    }) {
        Some(role) => role,
        None => {
            info!("session full, turning away {addr}");
            return;
        }
    };
    info!(%id, ?role, "client joined");
    *joined_id = Some(id.clone());

    send_frame(
        tx,
        &ServerMessage::ClientAcknowledged {
            role,
            map: session.map().clone(),
            client_id: id,
        },
    );

    if let Some((player, spectator)) = session.pair() {
        info!("both slots filled, introducing peers");
        send_frame(
            &player.sender,
            &ServerMessage::PeerJoined {
                peer_id: spectator.id.clone(),
            },
        );
        send_frame(
            &spectator.sender,
            &ServerMessage::PeerJoined {
                peer_id: player.id.clone(),
            },
        );
    }
}

fn send_frame(tx: &mpsc::UnboundedSender<String>, msg: &ServerMessage) {
    match serde_json::to_string(msg) {
        // receiver gone means the connection is closing; nothing to do
        Ok(json) => {
            let _ = tx.send(json);
        }
        Err(e) => error!("could not serialize server frame: {e}"),
    }
}
