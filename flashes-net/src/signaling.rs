//! Signaling Client
//!
//! One WebSocket to the rendezvous server, used only to obtain a role, a
//! client identity and the remote peer's identity. A background reader task
//! decodes inbound frames and queues them for the connection manager; the
//! connection is discarded as soon as the handshake no longer needs it.

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::protocol::{ClientMessage, SignalingMessage};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Where and how to announce ourselves to the signaling server.
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// Server URL, e.g. `ws://127.0.0.1:8080`.
    pub url: String,
    /// Peer endpoint address advertised in the join announcement, for
    /// connectors that dial identities as socket addresses. `None` for
    /// connectors with their own identity resolution.
    pub peer_addr: Option<String>,
}

impl SignalingConfig {
    /// Config for the given server URL, advertising no peer address.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            peer_addr: None,
        }
    }

    /// Advertise `addr` as this client's dialable peer endpoint.
    pub fn with_peer_addr(mut self, addr: impl Into<String>) -> Self {
        self.peer_addr = Some(addr.into());
        self
    }
}

/// Signaling connection failures. These reach the caller awaiting
/// [`SignalingClient::connect`]; once connected, network trouble only
/// terminates the message sequence.
#[derive(Debug, thiserror::Error)]
pub enum SignalingError {
    /// Could not open the connection or send the join announcement.
    #[error("failed to open signaling connection: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Handle to the open signaling connection.
///
/// Inbound frames flow into the queue handed to [`SignalingClient::connect`]
/// until the server closes the connection or [`SignalingClient::close`] is
/// called; either way the sequence ends cleanly (the queue sender is
/// dropped) and no error is raised for a clean close.
pub struct SignalingClient {
    sink: Option<WsSink>,
    reader: JoinHandle<()>,
}

impl SignalingClient {
    /// Open the connection, send the join announcement, and start the
    /// reader. Resolves once the connection is open, not once the handshake
    /// completes. There is no internal timeout; wrap in
    /// [`tokio::time::timeout`] if a deadline is needed.
    pub async fn connect(
        config: &SignalingConfig,
        queue: mpsc::UnboundedSender<SignalingMessage>,
    ) -> Result<Self, SignalingError> {
        let (mut socket, _) = connect_async(config.url.as_str()).await?;

        let join = ClientMessage::ClientJoined {
            peer_addr: config.peer_addr.clone(),
        };
        let text = serde_json::to_string(&join).expect("join announcement serializes");
        socket.send(Message::Text(text)).await?;

        let (sink, stream) = socket.split();
        let reader = tokio::spawn(read_frames(stream, queue));

        Ok(Self {
            sink: Some(sink),
            reader,
        })
    }

    /// Close the connection and terminate the local message sequence.
    /// Idempotent: safe to call repeatedly or after the remote already
    /// closed.
    pub async fn close(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            let _ = sink.close().await;
        }
        self.reader.abort();
    }

    #[cfg(test)]
    pub(crate) fn stub() -> Self {
        Self {
            sink: None,
            reader: tokio::spawn(async {}),
        }
    }
}

impl Drop for SignalingClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_frames(
    mut stream: futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
    queue: mpsc::UnboundedSender<SignalingMessage>,
) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match SignalingMessage::decode(&text) {
                Ok(msg) => {
                    if queue.send(msg).is_err() {
                        break;
                    }
                }
                Err(e) => warn!("discarding malformed signaling frame: {e}"),
            },
            Ok(Message::Close(_)) => {
                debug!("signaling server closed the connection");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("signaling socket error: {e}");
                break;
            }
        }
    }
    // queue sender drops here; the sequence sees a clean end
}
