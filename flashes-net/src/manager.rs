//! Connection Manager
//!
//! Bridges the two event-driven transports into two independently
//! consumable, strictly ordered message sequences. Events start arriving
//! the moment the signaling connection opens, possibly before the consumer
//! exists; both sequences are backed by unbounded queues created at
//! construction, so a late consumer sees the complete history in arrival
//! order. Each sequence has exactly one consumer and never replays.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::peer::{PeerConnector, PeerError, PeerTransport};
use crate::protocol::{PeerMessage, SignalingMessage};
use crate::signaling::{SignalingClient, SignalingConfig, SignalingError};
use crate::status::{ConnectionStatus, StatusCell};

/// Owns the signaling client and, once initialized, the peer transport.
pub struct ConnectionManager<C: PeerConnector> {
    signaling: SignalingClient,
    connector: Option<C>,
    transport: Option<PeerTransport>,
    status: Arc<StatusCell>,
    server_rx: Option<mpsc::UnboundedReceiver<SignalingMessage>>,
    peer_rx: Option<mpsc::UnboundedReceiver<PeerMessage>>,
    peer_tx: Option<mpsc::UnboundedSender<PeerMessage>>,
}

impl<C: PeerConnector> ConnectionManager<C> {
    /// Open the signaling connection and set up both message queues. The
    /// connector is held until [`ConnectionManager::initialize_peer`].
    pub async fn connect(
        config: &SignalingConfig,
        connector: C,
    ) -> Result<Self, SignalingError> {
        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let signaling = SignalingClient::connect(config, server_tx).await?;

        Ok(Self {
            signaling,
            connector: Some(connector),
            transport: None,
            status: StatusCell::new(),
            server_rx: Some(server_rx),
            peer_rx: Some(peer_rx),
            peer_tx: Some(peer_tx),
        })
    }

    /// Current peer-link status.
    pub fn status(&self) -> ConnectionStatus {
        self.status.get()
    }

    /// Shared handle to the status cell, for observers that outlive
    /// individual reads.
    pub fn status_cell(&self) -> Arc<StatusCell> {
        self.status.clone()
    }

    /// The signaling message sequence. Yields the receiver exactly once;
    /// later calls return `None` (single consumer, no replay).
    pub fn server_messages(&mut self) -> Option<mpsc::UnboundedReceiver<SignalingMessage>> {
        self.server_rx.take()
    }

    /// The peer message sequence. Same take-once contract as
    /// [`ConnectionManager::server_messages`].
    pub fn peer_messages(&mut self) -> Option<mpsc::UnboundedReceiver<PeerMessage>> {
        self.peer_rx.take()
    }

    /// Construct the peer transport. `local_id` must be the identity the
    /// signaling server assigned to this client; `remote_id` is the dial
    /// target for the player side, `None` for the passive spectator side.
    ///
    /// Calling this without a known identity, or twice, is a sequencing bug
    /// in the caller and fails loudly rather than being swallowed.
    pub fn initialize_peer(
        &mut self,
        local_id: &str,
        remote_id: Option<&str>,
    ) -> Result<(), PeerError> {
        if local_id.is_empty() {
            return Err(PeerError::MissingIdentity);
        }
        let connector = self.connector.take().ok_or(PeerError::AlreadyInitialized)?;
        let inbound = self.peer_tx.take().ok_or(PeerError::AlreadyInitialized)?;

        self.transport = Some(PeerTransport::start(
            connector,
            local_id.to_string(),
            remote_id.map(str::to_string),
            inbound,
            self.status.clone(),
        ));
        Ok(())
    }

    /// Best-effort send over the peer channel. No-op before the transport
    /// exists or after the channel closed; never fails.
    pub fn send_to_peer(&self, msg: &PeerMessage) {
        if let Some(transport) = &self.transport {
            transport.send(msg);
        }
    }

    /// Close the signaling connection and terminate its sequence.
    /// Idempotent; has no effect on the peer sequence.
    pub async fn close_signaling(&mut self) {
        self.signaling.close().await;
    }

    #[cfg(test)]
    pub(crate) fn stub(
        connector: C,
    ) -> (
        Self,
        mpsc::UnboundedSender<SignalingMessage>,
        mpsc::UnboundedSender<PeerMessage>,
    ) {
        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let manager = Self {
            signaling: SignalingClient::stub(),
            connector: Some(connector),
            transport: None,
            status: StatusCell::new(),
            server_rx: Some(server_rx),
            peer_rx: Some(peer_rx),
            peer_tx: Some(peer_tx.clone()),
        };
        (manager, server_tx, peer_tx)
    }
}
