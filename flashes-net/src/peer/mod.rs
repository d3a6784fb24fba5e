//! Peer Transport
//!
//! The direct client-to-client channel that carries gameplay messages once
//! signaling has introduced the two sides. NAT traversal and ICE belong to
//! the pluggable [`PeerConnector`]; this module only drives the role split
//! (player dials, spectator adopts the first inbound channel), decodes
//! frames, and tracks link status.

pub mod memory;
pub mod ws;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::protocol::PeerMessage;
use crate::status::{ConnectionStatus, StatusCell};

/// One established bidirectional channel to the remote client. Frames are
/// JSON text; the channel is closed when either half is dropped.
pub struct PeerChannel {
    /// Outgoing frames.
    pub tx: mpsc::UnboundedSender<String>,
    /// Incoming frames. Yields `None` once the channel has closed.
    pub rx: mpsc::UnboundedReceiver<String>,
}

/// Peer transport failures. Dial and open failures surface here; once a
/// channel is up, failures only show as a status transition.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// The identity string is not usable as a local endpoint address.
    #[error("peer identity {0:?} is not a dialable address")]
    BadIdentity(String),

    /// Could not make the local endpoint reachable.
    #[error("failed to open local peer endpoint: {0}")]
    Open(#[source] std::io::Error),

    /// No channel to the remote could be established.
    #[error("failed to dial peer {0:?}")]
    Dial(String),

    /// Transport initialized before the local identity was known. This is a
    /// sequencing bug in the caller, not a network condition.
    #[error("peer transport initialized without a local identity")]
    MissingIdentity,

    /// A second transport initialization for the same session.
    #[error("peer transport already initialized")]
    AlreadyInitialized,
}

/// Seam to the external dial/accept machinery (the WebRTC stand-in).
///
/// Identities are opaque strings assigned during signaling; the connector
/// decides how they resolve to reachable endpoints.
#[async_trait]
pub trait PeerConnector: Send + 'static {
    /// Make the local endpoint reachable at `local_id`. Inbound channels
    /// created by remote dialers arrive on the returned receiver.
    async fn open(
        &mut self,
        local_id: &str,
    ) -> Result<mpsc::UnboundedReceiver<PeerChannel>, PeerError>;

    /// Create one outbound channel to `remote_id`.
    async fn dial(&mut self, remote_id: &str) -> Result<PeerChannel, PeerError>;
}

/// Send half of the active channel, shared with the connection manager so
/// sends stay a synchronous best-effort call.
#[derive(Clone, Default)]
struct PeerLink(Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>);

impl PeerLink {
    fn set(&self, tx: mpsc::UnboundedSender<String>) {
        if let Ok(mut slot) = self.0.lock() {
            *slot = Some(tx);
        }
    }

    fn clear(&self) {
        if let Ok(mut slot) = self.0.lock() {
            *slot = None;
        }
    }

    fn send(&self, frame: String) {
        if let Ok(slot) = self.0.lock() {
            if let Some(tx) = slot.as_ref() {
                // receiver gone means the channel just closed; still a no-op
                let _ = tx.send(frame);
            }
        }
    }
}

/// Running peer transport for one session.
///
/// A background task drives the connector, decodes inbound frames into the
/// given queue, and maintains the status cell. [`PeerTransport::send`] is a
/// silent no-op while no channel is open; callers must treat sends as
/// best-effort and never assume delivery while disconnected.
pub struct PeerTransport {
    link: PeerLink,
    task: JoinHandle<()>,
}

impl PeerTransport {
    /// Start the transport. With `remote_id` (the player side) the
    /// connector dials once open; without it (the spectator side) the first
    /// inbound channel is adopted.
    pub fn start<C: PeerConnector>(
        connector: C,
        local_id: String,
        remote_id: Option<String>,
        inbound: mpsc::UnboundedSender<PeerMessage>,
        status: Arc<StatusCell>,
    ) -> Self {
        let link = PeerLink::default();
        let task = tokio::spawn(run_transport(
            connector,
            local_id,
            remote_id,
            inbound,
            status,
            link.clone(),
        ));
        Self { link, task }
    }

    /// Best-effort send. No-op if no channel is open; never fails.
    pub fn send(&self, msg: &PeerMessage) {
        match msg.encode() {
            Ok(frame) => self.link.send(frame),
            Err(e) => warn!("refusing to send unencodable peer message: {e}"),
        }
    }
}

impl Drop for PeerTransport {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_transport<C: PeerConnector>(
    mut connector: C,
    local_id: String,
    remote_id: Option<String>,
    inbound: mpsc::UnboundedSender<PeerMessage>,
    status: Arc<StatusCell>,
    link: PeerLink,
) {
    let mut accepts = match connector.open(&local_id).await {
        Ok(rx) => rx,
        Err(e) => {
            warn!("could not open peer endpoint {local_id:?}: {e}");
            status.set(ConnectionStatus::Disconnected);
            return;
        }
    };

    let mut channel = match &remote_id {
        Some(remote) => match connector.dial(remote).await {
            Ok(channel) => channel,
            Err(e) => {
                warn!("could not dial peer {remote:?}: {e}");
                status.set(ConnectionStatus::Disconnected);
                return;
            }
        },
        None => match accepts.recv().await {
            Some(channel) => channel,
            None => {
                status.set(ConnectionStatus::Disconnected);
                return;
            }
        },
    };

    // channel open is informational only; status flips on first data
    debug!("peer channel open (dialed: {})", remote_id.is_some());
    link.set(channel.tx.clone());

    while let Some(frame) = channel.rx.recv().await {
        match PeerMessage::decode(&frame) {
            Ok(msg) => {
                status.set(ConnectionStatus::Connected);
                if inbound.send(msg).is_err() {
                    break;
                }
            }
            Err(e) => warn!("discarding malformed peer frame: {e}"),
        }
    }

    link.clear();
    status.set(ConnectionStatus::Disconnected);
    // inbound sender drops here, terminating the peer message sequence
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryHub;
    use super::*;

    #[tokio::test]
    async fn player_dials_and_spectator_adopts() {
        let hub = MemoryHub::new();
        let status_a = StatusCell::new();
        let status_b = StatusCell::new();
        let (a_tx, mut a_rx) = mpsc::unbounded_channel();
        let (b_tx, mut b_rx) = mpsc::unbounded_channel();

        let spectator = PeerTransport::start(
            hub.connector(),
            "spec".to_string(),
            None,
            b_tx,
            status_b.clone(),
        );
        let player = PeerTransport::start(
            hub.connector(),
            "play".to_string(),
            Some("spec".to_string()),
            a_tx,
            status_a.clone(),
        );

        // give both tasks a moment to establish the channel
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        player.send(&PeerMessage::Delta { data: vec![9] });
        assert_eq!(
            b_rx.recv().await.unwrap(),
            PeerMessage::Delta { data: vec![9] }
        );
        assert_eq!(status_b.get(), ConnectionStatus::Connected);

        spectator.send(&PeerMessage::Delta { data: vec![7] });
        assert_eq!(
            a_rx.recv().await.unwrap(),
            PeerMessage::Delta { data: vec![7] }
        );
    }

    #[tokio::test]
    async fn send_before_any_channel_is_a_silent_noop() {
        let hub = MemoryHub::new();
        let status = StatusCell::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let transport = PeerTransport::start(
            hub.connector(),
            "lonely".to_string(),
            None,
            tx,
            status.clone(),
        );

        // no remote ever dials; this must not panic or error
        transport.send(&PeerMessage::Delta { data: vec![1] });
        assert_eq!(status.get(), ConnectionStatus::Waiting);
    }

    #[tokio::test]
    async fn channel_close_disconnects_and_ends_the_sequence() {
        let hub = MemoryHub::new();
        let status = StatusCell::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let spectator = PeerTransport::start(
            hub.connector(),
            "spec".to_string(),
            None,
            tx,
            status.clone(),
        );

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let mut dialer = hub.connector();
        let channel = dialer.dial("spec").await.unwrap();
        channel
            .tx
            .send(PeerMessage::Delta { data: vec![1] }.encode().unwrap())
            .unwrap();
        assert!(rx.recv().await.is_some());
        assert_eq!(status.get(), ConnectionStatus::Connected);

        drop(channel);
        // sequence terminates and status goes terminal
        assert_eq!(rx.recv().await, None);
        assert_eq!(status.get(), ConnectionStatus::Disconnected);

        // sends after the close stay silent no-ops, exactly like before
        // any channel existed
        spectator.send(&PeerMessage::Delta { data: vec![2] });
        spectator.send(&PeerMessage::InitialStateVector { data: vec![3] });
        assert_eq!(status.get(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn failed_dial_goes_straight_to_disconnected() {
        let hub = MemoryHub::new();
        let status = StatusCell::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _player = PeerTransport::start(
            hub.connector(),
            "play".to_string(),
            Some("nobody-home".to_string()),
            tx,
            status.clone(),
        );

        assert_eq!(rx.recv().await, None);
        assert_eq!(status.get(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn malformed_peer_frames_are_dropped_not_fatal() {
        let hub = MemoryHub::new();
        let status = StatusCell::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _spectator = PeerTransport::start(
            hub.connector(),
            "spec".to_string(),
            None,
            tx,
            status.clone(),
        );

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let mut dialer = hub.connector();
        let channel = dialer.dial("spec").await.unwrap();
        channel.tx.send("garbage".to_string()).unwrap();
        channel
            .tx
            .send(PeerMessage::Delta { data: vec![3] }.encode().unwrap())
            .unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            PeerMessage::Delta { data: vec![3] }
        );
    }
}
