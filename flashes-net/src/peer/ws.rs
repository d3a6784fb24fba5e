//! Direct WebSocket peer connector.
//!
//! The native stand-in for a brokered WebRTC channel: identities are socket
//! addresses, the local endpoint is a plain WebSocket listener and dialing
//! is a client connect to `ws://<identity>`. For this to work the client
//! must have advertised its listen address during signaling
//! (`SignalingConfig::with_peer_addr`), so the server hands out dialable
//! identities.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, connect_async, WebSocketStream};
use tracing::{debug, warn};

use super::{PeerChannel, PeerConnector, PeerError};

/// Covers the window between both sides learning each other's identity and
/// the listener actually accepting.
const DIAL_ATTEMPTS: u32 = 20;
const DIAL_RETRY: Duration = Duration::from_millis(100);

/// Connector dialing identities as `host:port` WebSocket endpoints.
#[derive(Debug, Default)]
pub struct WsConnector;

impl WsConnector {
    /// New connector.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PeerConnector for WsConnector {
    async fn open(
        &mut self,
        local_id: &str,
    ) -> Result<mpsc::UnboundedReceiver<PeerChannel>, PeerError> {
        let addr: std::net::SocketAddr = local_id
            .parse()
            .map_err(|_| PeerError::BadIdentity(local_id.to_string()))?;
        let listener = TcpListener::bind(addr).await.map_err(PeerError::Open)?;
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            loop {
                let stream = match listener.accept().await {
                    Ok((stream, remote)) => {
                        debug!("inbound peer connection from {remote}");
                        stream
                    }
                    Err(e) => {
                        warn!("peer listener accept failed: {e}");
                        break;
                    }
                };
                let socket = match accept_async(stream).await {
                    Ok(socket) => socket,
                    Err(e) => {
                        warn!("peer websocket handshake failed: {e}");
                        continue;
                    }
                };
                if tx.send(channel_for(socket)).is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }

    async fn dial(&mut self, remote_id: &str) -> Result<PeerChannel, PeerError> {
        let url = format!("ws://{remote_id}");
        for attempt in 0..DIAL_ATTEMPTS {
            match connect_async(url.as_str()).await {
                Ok((socket, _)) => return Ok(channel_for(socket)),
                Err(e) => {
                    debug!("dial attempt {attempt} to {remote_id} failed: {e}");
                    tokio::time::sleep(DIAL_RETRY).await;
                }
            }
        }
        Err(PeerError::Dial(remote_id.to_string()))
    }
}

/// Bridge one WebSocket into a [`PeerChannel`]: a writer task drains the
/// outgoing queue, a reader task forwards text frames until close or error.
fn channel_for<S>(socket: WebSocketStream<S>) -> PeerChannel
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if sink.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    if in_tx.send(text).is_err() {
                        break;
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!("peer socket error: {e}");
                    break;
                }
            }
        }
    });

    PeerChannel {
        tx: out_tx,
        rx: in_rx,
    }
}
